//! Deployment configuration for `vaultstrap`.
//!
//! A [`BootstrapConfig`] is built once at startup (the CLI fills it from
//! flags and `VAULTSTRAP_*` environment variables) and then passed by
//! reference into every component. Nothing in this crate reads ambient
//! global state for paths, ports, or domains.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::BootstrapError;

/// HTTPS port the vault listens on inside the container.
pub const INTERNAL_HTTPS_PORT: u16 = 443;

/// Default externally published port.
pub const DEFAULT_PORT: u16 = 8443;

/// Default container image.
pub const DEFAULT_IMAGE: &str = "vaultwarden/server:latest";

/// File name of the credential record inside the base directory.
pub const RECORD_FILE: &str = ".env";

/// File name of the service descriptor inside the base directory.
pub const DESCRIPTOR_FILE: &str = "docker-compose.yml";

/// Which certificate issuer to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssuerKind {
    /// In-process issuance, no host tool required.
    Rcgen,
    /// Shell out to the `openssl` binary.
    Openssl,
}

/// How long to wait for the service to report healthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            interval: Duration::from_secs(5),
        }
    }
}

/// Immutable deployment configuration.
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    /// Application name, used as compose service and container name.
    pub app_name: String,
    /// Root of everything this tool writes.
    pub base_dir: PathBuf,
    /// Host directory mounted as the vault's `/data`.
    pub data_dir: PathBuf,
    /// Host directory holding `key.pem` and `cert.pem`.
    pub cert_dir: PathBuf,
    /// Host directory receiving database snapshots.
    pub backup_dir: PathBuf,
    /// Externally published HTTPS port.
    pub port: u16,
    /// Public domain name; also the certificate subject.
    pub domain: String,
    /// Container image reference.
    pub image: String,
    pub signups_allowed: bool,
    pub invitations_allowed: bool,
    pub issuer: IssuerKind,
    pub health: HealthPolicy,
}

impl BootstrapConfig {
    /// Build a configuration rooted at `base_dir` with default subdirectories
    /// and settings.
    #[must_use]
    pub fn new(app_name: impl Into<String>, base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            app_name: app_name.into(),
            data_dir: base_dir.join("data"),
            cert_dir: base_dir.join("ssl"),
            backup_dir: base_dir.join("backups"),
            base_dir,
            port: DEFAULT_PORT,
            domain: "localhost".to_owned(),
            image: DEFAULT_IMAGE.to_owned(),
            signups_allowed: false,
            invitations_allowed: true,
            issuer: IssuerKind::Rcgen,
            health: HealthPolicy::default(),
        }
    }

    /// Check the values that would otherwise fail late in the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::InvalidConfig`] naming the offending field.
    pub fn validate(&self) -> Result<(), BootstrapError> {
        self.validate_service()?;
        if self.domain.trim().is_empty() {
            return invalid("domain must not be empty");
        }
        if self.port == 0 {
            return invalid("port must be non-zero");
        }
        if self.image.trim().is_empty() {
            return invalid("image must not be empty");
        }
        if self.health.max_attempts == 0 {
            return invalid("health polling needs at least one attempt");
        }
        Ok(())
    }

    /// Check only what addressing an already running service needs.
    ///
    /// `backup` and `stop` go through here, so flags that only shape a
    /// fresh deployment never block them.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::InvalidConfig`] for an unusable app name.
    pub fn validate_service(&self) -> Result<(), BootstrapError> {
        if self.app_name.trim().is_empty() {
            return invalid("app name must not be empty");
        }
        if self.app_name.chars().any(char::is_whitespace) {
            return invalid("app name must not contain whitespace");
        }
        Ok(())
    }

    /// Path of the credential record.
    #[must_use]
    pub fn record_path(&self) -> PathBuf {
        self.base_dir.join(RECORD_FILE)
    }

    /// Path of the service descriptor.
    #[must_use]
    pub fn descriptor_path(&self) -> PathBuf {
        self.base_dir.join(DESCRIPTOR_FILE)
    }

    /// Public URL the vault is reachable at.
    #[must_use]
    pub fn public_url(&self) -> String {
        format!("https://{}:{}", self.domain, self.port)
    }

    /// Every directory the bootstrap creates before writing files.
    #[must_use]
    pub fn directories(&self) -> [&Path; 4] {
        [
            &self.base_dir,
            &self.data_dir,
            &self.cert_dir,
            &self.backup_dir,
        ]
    }
}

fn invalid(reason: &str) -> Result<(), BootstrapError> {
    Err(BootstrapError::InvalidConfig {
        reason: reason.to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_derives_subdirectories() {
        let config = BootstrapConfig::new("vaultwarden", "/opt/vw");
        assert_eq!(config.data_dir, PathBuf::from("/opt/vw/data"));
        assert_eq!(config.cert_dir, PathBuf::from("/opt/vw/ssl"));
        assert_eq!(config.backup_dir, PathBuf::from("/opt/vw/backups"));
        assert_eq!(config.record_path(), PathBuf::from("/opt/vw/.env"));
        assert_eq!(
            config.descriptor_path(),
            PathBuf::from("/opt/vw/docker-compose.yml")
        );
    }

    #[test]
    fn public_url_combines_domain_and_port() {
        let mut config = BootstrapConfig::new("vaultwarden", "/opt/vw");
        config.domain = "vault.example.com".to_owned();
        config.port = 9443;
        assert_eq!(config.public_url(), "https://vault.example.com:9443");
    }

    #[test]
    fn validate_accepts_defaults() {
        assert!(BootstrapConfig::new("vaultwarden", "/opt/vw").validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_port() {
        let mut config = BootstrapConfig::new("vaultwarden", "/opt/vw");
        config.port = 0;
        assert!(matches!(
            config.validate(),
            Err(BootstrapError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn validate_rejects_blank_domain() {
        let mut config = BootstrapConfig::new("vaultwarden", "/opt/vw");
        config.domain = "  ".to_owned();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_app_name_with_spaces() {
        let config = BootstrapConfig::new("my vault", "/opt/vw");
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_health_attempts() {
        let mut config = BootstrapConfig::new("vaultwarden", "/opt/vw");
        config.health.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_service_ignores_deployment_only_fields() {
        let mut config = BootstrapConfig::new("vaultwarden", "/opt/vw");
        config.port = 0;
        config.domain = String::new();
        config.image = String::new();
        config.health.max_attempts = 0;
        assert!(config.validate_service().is_ok());
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_service_rejects_blank_app_name() {
        let config = BootstrapConfig::new(" ", "/opt/vw");
        assert!(matches!(
            config.validate_service(),
            Err(BootstrapError::InvalidConfig { ref reason }) if reason.contains("app name")
        ));
    }
}
