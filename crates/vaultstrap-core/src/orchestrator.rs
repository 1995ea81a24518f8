//! The bootstrap state machine and the backup/stop entry points.
//!
//! Stages run strictly in order:
//!
//! ```text
//! CheckDependencies → InitDirectories → EnsureCredential → EnsureCertificate
//!   → RenderDescriptor → StartService → PollHealth → ReportSummary
//! ```
//!
//! Any failure before `PollHealth` aborts the run with no rollback. Every
//! stage is idempotent, so the operator fixes the cause and runs again.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::backup::{BackupManager, BackupRecord};
use crate::cert::{CertificateOutcome, CertificateStore};
use crate::config::{BootstrapConfig, IssuerKind};
use crate::deps::{DependencyResolver, DependencyStatus, HostPackages, PackageInstaller, Resolution, Tool, required_tools};
use crate::descriptor;
use crate::error::BootstrapError;
use crate::fsutil;
use crate::hash::{Argon2Cli, HashFunction};
use crate::issuer::{CertIssuer, OpensslCli, RcgenIssuer};
use crate::prompt::ConfirmationPrompt;
use crate::runtime::{DockerCompose, ServiceRuntime};
use crate::secret::SecretStore;
use crate::service::{HealthStatus, ServiceController};

/// Pipeline stage, for logging and error context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    CheckDependencies,
    InitDirectories,
    EnsureCredential,
    EnsureCertificate,
    RenderDescriptor,
    StartService,
    PollHealth,
    ReportSummary,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CheckDependencies => "check-dependencies",
            Self::InitDirectories => "init-directories",
            Self::EnsureCredential => "ensure-credential",
            Self::EnsureCertificate => "ensure-certificate",
            Self::RenderDescriptor => "render-descriptor",
            Self::StartService => "start-service",
            Self::PollHealth => "poll-health",
            Self::ReportSummary => "report-summary",
        };
        f.write_str(name)
    }
}

/// Every external collaborator the pipeline talks to.
#[derive(Clone)]
pub struct Capabilities {
    pub packages: Arc<dyn PackageInstaller>,
    pub hasher: Arc<dyn HashFunction>,
    pub issuer: Arc<dyn CertIssuer>,
    pub runtime: Arc<dyn ServiceRuntime>,
    pub prompt: Arc<dyn ConfirmationPrompt>,
}

impl Capabilities {
    /// Process-backed capabilities for the local host.
    #[must_use]
    pub fn host(config: &BootstrapConfig, prompt: Arc<dyn ConfirmationPrompt>) -> Self {
        let issuer: Arc<dyn CertIssuer> = match config.issuer {
            IssuerKind::Rcgen => Arc::new(RcgenIssuer),
            IssuerKind::Openssl => Arc::new(OpensslCli::new()),
        };
        Self {
            packages: Arc::new(HostPackages),
            hasher: Arc::new(Argon2Cli::new()),
            issuer,
            runtime: Arc::new(DockerCompose::new()),
            prompt,
        }
    }
}

/// Summary of a completed bootstrap run.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct BootstrapReport {
    pub dependencies: Vec<(Tool, DependencyStatus)>,
    /// Whether a new admin token was generated (and shown) this run.
    pub credential_generated: bool,
    pub certificate: CertificateOutcome,
    pub descriptor_path: PathBuf,
    pub health: HealthStatus,
    pub public_url: String,
}

/// How a bootstrap run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed(BootstrapReport),
    /// The container runtime was installed; re-login and run again.
    RestartRequired,
}

pub struct Orchestrator<'a> {
    config: &'a BootstrapConfig,
    caps: Capabilities,
}

impl<'a> Orchestrator<'a> {
    #[must_use]
    pub fn new(config: &'a BootstrapConfig, caps: Capabilities) -> Self {
        Self { config, caps }
    }

    fn service(&self) -> ServiceController<'_> {
        ServiceController::new(
            self.caps.runtime.as_ref(),
            self.config.descriptor_path(),
            self.config.app_name.as_str(),
        )
    }

    /// Run the full bootstrap pipeline.
    ///
    /// # Errors
    ///
    /// Returns the first fatal [`BootstrapError`]. An unhealthy service is
    /// not an error; it is reported in [`BootstrapReport::health`].
    pub async fn bootstrap(&self) -> Result<Outcome, BootstrapError> {
        let config = self.config;
        config.validate()?;

        enter(Stage::CheckDependencies);
        let resolver = DependencyResolver::new(self.caps.packages.as_ref());
        let dependencies = match resolver.ensure_all(&required_tools(config)).await? {
            Resolution::Ready(statuses) => statuses,
            Resolution::RestartRequired => {
                info!("container runtime installed; log out and back in, then re-run");
                return Ok(Outcome::RestartRequired);
            }
        };

        enter(Stage::InitDirectories);
        for dir in config.directories() {
            fsutil::ensure_dir(dir)?;
        }

        enter(Stage::EnsureCredential);
        let record_path = config.record_path();
        let token = SecretStore::new(config, self.caps.hasher.as_ref(), self.caps.prompt.as_ref())
            .ensure_credential(&record_path)
            .await?;
        let credential_generated = token.is_some();
        drop(token);

        enter(Stage::EnsureCertificate);
        let certificate = CertificateStore::new(self.caps.issuer.as_ref())
            .ensure_certificate(&config.cert_dir, &config.domain)
            .await?;

        enter(Stage::RenderDescriptor);
        let descriptor_path = config.descriptor_path();
        let text = descriptor::render(
            config,
            &record_path,
            &config.cert_dir,
            &config.data_dir,
            config.port,
        )?;
        descriptor::write_descriptor(&descriptor_path, &text)?;

        enter(Stage::StartService);
        let service = self.service();
        service.start().await?;

        enter(Stage::PollHealth);
        let health = service
            .poll_healthy(config.health.max_attempts, config.health.interval)
            .await;

        enter(Stage::ReportSummary);
        Ok(Outcome::Completed(BootstrapReport {
            dependencies,
            credential_generated,
            certificate,
            descriptor_path,
            health,
            public_url: config.public_url(),
        }))
    }

    /// Take one snapshot of the running service and apply retention.
    ///
    /// # Errors
    ///
    /// See [`BackupManager::backup`].
    pub async fn backup(&self, now: DateTime<Utc>) -> Result<BackupRecord, BootstrapError> {
        self.config.validate_service()?;
        let service = self.service();
        BackupManager::new(self.config, &service).backup(now).await
    }

    /// Bring the service down using the existing descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::ServiceStopFailed`] with the runtime's
    /// diagnostic.
    pub async fn stop(&self) -> Result<(), BootstrapError> {
        self.config.validate_service()?;
        self.service().stop().await
    }
}

fn enter(stage: Stage) {
    info!(%stage, "entering stage");
}
