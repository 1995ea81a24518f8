//! Host dependency resolution.
//!
//! Makes sure every external tool the pipeline shells out to is installed,
//! installing missing ones through the host's package manager. A fresh
//! install of the container runtime is a restart boundary: the operator's
//! login session predates their new `docker` group membership, so nothing
//! after it can talk to the daemon until they log in again.

use std::fmt;

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::{BootstrapConfig, IssuerKind};
use crate::error::{BootstrapError, CapabilityError};
use crate::hardening::is_privileged;
use crate::process::run_captured;

/// An external tool the pipeline needs on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    ContainerRuntime,
    Compose,
    Hasher,
    TlsToolkit,
}

impl Tool {
    /// Executable probed on `PATH`.
    #[must_use]
    pub fn binary(self) -> &'static str {
        match self {
            Self::ContainerRuntime | Self::Compose => "docker",
            Self::Hasher => "argon2",
            Self::TlsToolkit => "openssl",
        }
    }

    /// Candidate packages providing the tool under `manager`, tried in order.
    ///
    /// Compose must come from the same repository as the runtime chosen
    /// above. Ubuntu ships it as `docker-compose-v2` next to `docker.io`,
    /// Debian and Fedora as `docker-compose`.
    #[must_use]
    pub fn packages(self, manager: PackageManager) -> &'static [&'static str] {
        use PackageManager as Pm;
        match (self, manager) {
            (Self::ContainerRuntime, Pm::Apt) => &["docker.io"],
            (Self::ContainerRuntime, Pm::Dnf | Pm::Yum) => &["moby-engine"],
            (Self::ContainerRuntime, _) => &["docker"],
            (Self::Compose, Pm::Apt) => &["docker-compose-v2", "docker-compose"],
            (Self::Compose, Pm::Apk) => &["docker-cli-compose"],
            (Self::Compose, _) => &["docker-compose"],
            (Self::Hasher, _) => &["argon2"],
            (Self::TlsToolkit, _) => &["openssl"],
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ContainerRuntime => "container runtime (docker)",
            Self::Compose => "docker compose",
            Self::Hasher => "argon2",
            Self::TlsToolkit => "openssl",
        })
    }
}

/// Tools required for a bootstrap with `config`, in resolution order.
///
/// The container runtime comes first so a fresh install stops the run before
/// anything else is touched.
#[must_use]
pub fn required_tools(config: &BootstrapConfig) -> Vec<Tool> {
    let mut tools = vec![Tool::ContainerRuntime, Tool::Compose, Tool::Hasher];
    if config.issuer == IssuerKind::Openssl {
        tools.push(Tool::TlsToolkit);
    }
    tools
}

/// Supported host package managers, in detection order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Apt,
    Dnf,
    Yum,
    Pacman,
    Zypper,
    Apk,
    Brew,
}

impl PackageManager {
    pub const ALL: [Self; 7] = [
        Self::Apt,
        Self::Dnf,
        Self::Yum,
        Self::Pacman,
        Self::Zypper,
        Self::Apk,
        Self::Brew,
    ];

    #[must_use]
    pub fn program(self) -> &'static str {
        match self {
            Self::Apt => "apt-get",
            Self::Dnf => "dnf",
            Self::Yum => "yum",
            Self::Pacman => "pacman",
            Self::Zypper => "zypper",
            Self::Apk => "apk",
            Self::Brew => "brew",
        }
    }

    /// Arguments that install `package` non-interactively.
    #[must_use]
    pub fn install_args(self, package: &str) -> Vec<String> {
        let fixed: &[&str] = match self {
            Self::Apt | Self::Dnf | Self::Yum => &["install", "-y"],
            Self::Pacman => &["-S", "--noconfirm", "--needed"],
            Self::Zypper => &["--non-interactive", "install"],
            Self::Apk => &["add", "--no-cache"],
            Self::Brew => &["install"],
        };
        fixed
            .iter()
            .map(|s| (*s).to_owned())
            .chain(std::iter::once(package.to_owned()))
            .collect()
    }

    /// Homebrew refuses to run as root; everything else needs it.
    fn needs_root(self) -> bool {
        self != Self::Brew
    }
}

/// Result of ensuring one tool.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum DependencyStatus {
    Present,
    InstalledThisRun,
    InstallationFailed { reason: String },
}

/// Host operations the resolver needs.
#[async_trait::async_trait]
pub trait PackageInstaller: Send + Sync {
    /// Whether `tool` is usable right now.
    async fn is_present(&self, tool: Tool) -> bool;

    /// The first supported package manager found on the host.
    fn detect_manager(&self) -> Option<PackageManager>;

    /// Install `tool` with `manager`, including any post-install step.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError`] if the package manager fails.
    async fn install(&self, manager: PackageManager, tool: Tool) -> Result<(), CapabilityError>;
}

/// The real host: probes `PATH` and runs the package manager.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostPackages;

impl HostPackages {
    fn privileged(program: &str, elevate: bool) -> Command {
        if elevate && !is_privileged() {
            let mut cmd = Command::new("sudo");
            cmd.arg(program);
            cmd
        } else {
            Command::new(program)
        }
    }

    async fn post_install(tool: Tool) -> Result<(), CapabilityError> {
        if tool != Tool::ContainerRuntime {
            return Ok(());
        }
        if which::which("systemctl").is_ok() {
            let mut enable = Self::privileged("systemctl", true);
            enable.args(["enable", "--now", "docker"]);
            run_captured("systemctl", &mut enable, None).await?;
        }
        match std::env::var("USER") {
            Ok(user) if user != "root" => {
                let mut usermod = Self::privileged("usermod", true);
                usermod.args(["-aG", "docker", user.as_str()]);
                run_captured("usermod", &mut usermod, None).await?;
            }
            _ => {}
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl PackageInstaller for HostPackages {
    async fn is_present(&self, tool: Tool) -> bool {
        if which::which(tool.binary()).is_err() {
            return false;
        }
        if tool != Tool::Compose {
            return true;
        }
        let mut probe = Command::new("docker");
        probe.args(["compose", "version"]);
        run_captured("docker compose version", &mut probe, None)
            .await
            .is_ok()
    }

    fn detect_manager(&self) -> Option<PackageManager> {
        PackageManager::ALL
            .into_iter()
            .find(|pm| which::which(pm.program()).is_ok())
    }

    async fn install(&self, manager: PackageManager, tool: Tool) -> Result<(), CapabilityError> {
        if manager == PackageManager::Apt {
            let mut update = Self::privileged("apt-get", true);
            update.args(["update", "-q"]);
            run_captured("apt-get update", &mut update, None).await?;
        }
        let mut last_err = None;
        for package in tool.packages(manager) {
            let mut cmd = Self::privileged(manager.program(), manager.needs_root());
            cmd.args(manager.install_args(package));
            match run_captured(manager.program(), &mut cmd, None).await {
                Ok(_) => return Self::post_install(tool).await,
                Err(e) => {
                    debug!(%tool, package, error = %e, "package not installable, trying next");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| CapabilityError::Output {
            tool: manager.program().to_owned(),
            reason: format!("no package provides {tool}"),
        }))
    }
}

/// How dependency resolution ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Every tool is usable; statuses in resolution order.
    Ready(Vec<(Tool, DependencyStatus)>),
    /// The container runtime was just installed; the run must stop here.
    RestartRequired,
}

/// Ensures required tools are present.
pub struct DependencyResolver<'a> {
    host: &'a dyn PackageInstaller,
}

impl<'a> DependencyResolver<'a> {
    #[must_use]
    pub fn new(host: &'a dyn PackageInstaller) -> Self {
        Self { host }
    }

    /// Ensure a single tool, installing it if absent.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::UnsupportedPlatform`] if the tool is missing
    /// and no package manager is available. An install failure is reported
    /// as [`DependencyStatus::InstallationFailed`], not as an error.
    pub async fn ensure(&self, tool: Tool) -> Result<DependencyStatus, BootstrapError> {
        if self.host.is_present(tool).await {
            return Ok(DependencyStatus::Present);
        }
        let manager = self
            .host
            .detect_manager()
            .ok_or_else(|| BootstrapError::UnsupportedPlatform {
                tool: tool.to_string(),
            })?;

        info!(%tool, manager = manager.program(), "installing missing dependency");
        match self.host.install(manager, tool).await {
            Ok(()) => Ok(DependencyStatus::InstalledThisRun),
            Err(e) => {
                warn!(%tool, error = %e, "dependency installation failed");
                Ok(DependencyStatus::InstallationFailed {
                    reason: e.diagnostic(),
                })
            }
        }
    }

    /// Ensure every tool in order.
    ///
    /// Stops at the first failed install, and returns
    /// [`Resolution::RestartRequired`] as soon as the container runtime is
    /// installed, without looking at the remaining tools.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::UnsupportedPlatform`] or
    /// [`BootstrapError::DependencyInstallFailed`].
    pub async fn ensure_all(&self, tools: &[Tool]) -> Result<Resolution, BootstrapError> {
        let mut statuses = Vec::with_capacity(tools.len());
        for &tool in tools {
            let status = self.ensure(tool).await?;
            match &status {
                DependencyStatus::InstallationFailed { reason } => {
                    return Err(BootstrapError::DependencyInstallFailed {
                        tool: tool.to_string(),
                        reason: reason.clone(),
                    });
                }
                DependencyStatus::InstalledThisRun if tool == Tool::ContainerRuntime => {
                    return Ok(Resolution::RestartRequired);
                }
                DependencyStatus::Present | DependencyStatus::InstalledThisRun => {}
            }
            statuses.push((tool, status));
        }
        Ok(Resolution::Ready(statuses))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use super::*;

    struct FakeHost {
        present: Mutex<HashSet<Tool>>,
        manager: Option<PackageManager>,
        fail_install: bool,
        installs: Mutex<Vec<Tool>>,
    }

    impl FakeHost {
        fn new(present: &[Tool], manager: Option<PackageManager>) -> Self {
            Self {
                present: Mutex::new(present.iter().copied().collect()),
                manager,
                fail_install: false,
                installs: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl PackageInstaller for FakeHost {
        async fn is_present(&self, tool: Tool) -> bool {
            self.present.lock().unwrap().contains(&tool)
        }

        fn detect_manager(&self) -> Option<PackageManager> {
            self.manager
        }

        async fn install(&self, _: PackageManager, tool: Tool) -> Result<(), CapabilityError> {
            self.installs.lock().unwrap().push(tool);
            if self.fail_install {
                return Err(CapabilityError::Failed {
                    tool: "apt-get".to_owned(),
                    status: "exit status: 100".to_owned(),
                    stderr: "E: Unable to locate package argon2".to_owned(),
                });
            }
            self.present.lock().unwrap().insert(tool);
            Ok(())
        }
    }

    const ALL_TOOLS: [Tool; 3] = [Tool::ContainerRuntime, Tool::Compose, Tool::Hasher];

    #[tokio::test]
    async fn present_tools_are_not_installed() {
        let host = FakeHost::new(&ALL_TOOLS, Some(PackageManager::Apt));
        let resolution = DependencyResolver::new(&host)
            .ensure_all(&ALL_TOOLS)
            .await
            .unwrap();
        assert_eq!(
            resolution,
            Resolution::Ready(ALL_TOOLS.iter().map(|&t| (t, DependencyStatus::Present)).collect())
        );
        assert!(host.installs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_tool_without_package_manager_is_unsupported() {
        let host = FakeHost::new(&[Tool::ContainerRuntime, Tool::Compose], None);
        let err = DependencyResolver::new(&host)
            .ensure_all(&ALL_TOOLS)
            .await
            .unwrap_err();
        assert!(matches!(err, BootstrapError::UnsupportedPlatform { ref tool } if tool == "argon2"));
    }

    #[tokio::test]
    async fn missing_hasher_is_installed() {
        let host = FakeHost::new(&[Tool::ContainerRuntime, Tool::Compose], Some(PackageManager::Dnf));
        let resolution = DependencyResolver::new(&host)
            .ensure_all(&ALL_TOOLS)
            .await
            .unwrap();
        let Resolution::Ready(statuses) = resolution else {
            unreachable!("expected Ready");
        };
        assert_eq!(statuses[2], (Tool::Hasher, DependencyStatus::InstalledThisRun));
        assert_eq!(*host.installs.lock().unwrap(), vec![Tool::Hasher]);
    }

    #[tokio::test]
    async fn fresh_runtime_install_requires_restart_and_stops() {
        let host = FakeHost::new(&[], Some(PackageManager::Apt));
        let resolution = DependencyResolver::new(&host)
            .ensure_all(&ALL_TOOLS)
            .await
            .unwrap();
        assert_eq!(resolution, Resolution::RestartRequired);
        // Nothing after the runtime was looked at.
        assert_eq!(*host.installs.lock().unwrap(), vec![Tool::ContainerRuntime]);
    }

    #[tokio::test]
    async fn failed_install_is_fatal() {
        let mut host = FakeHost::new(&[Tool::ContainerRuntime, Tool::Compose], Some(PackageManager::Apt));
        host.fail_install = true;
        let err = DependencyResolver::new(&host)
            .ensure_all(&ALL_TOOLS)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BootstrapError::DependencyInstallFailed { ref reason, .. }
                if reason == "E: Unable to locate package argon2"
        ));
    }

    #[test]
    fn openssl_required_only_for_openssl_issuer() {
        let mut config = BootstrapConfig::new("vaultwarden", "/opt/vw");
        assert!(!required_tools(&config).contains(&Tool::TlsToolkit));
        config.issuer = IssuerKind::Openssl;
        assert_eq!(required_tools(&config).last(), Some(&Tool::TlsToolkit));
        assert_eq!(required_tools(&config)[0], Tool::ContainerRuntime);
    }

    #[test]
    fn install_args_are_non_interactive() {
        assert_eq!(
            PackageManager::Apt.install_args("argon2"),
            vec!["install", "-y", "argon2"]
        );
        assert_eq!(
            PackageManager::Pacman.install_args("openssl"),
            vec!["-S", "--noconfirm", "--needed", "openssl"]
        );
    }

    #[test]
    fn compose_comes_from_the_runtime_repository() {
        assert_eq!(
            Tool::Compose.packages(PackageManager::Apt),
            ["docker-compose-v2", "docker-compose"]
        );
        assert_eq!(Tool::Compose.packages(PackageManager::Dnf), ["docker-compose"]);
        assert_eq!(Tool::Compose.packages(PackageManager::Apk), ["docker-cli-compose"]);
        for pm in PackageManager::ALL {
            assert!(
                !Tool::Compose.packages(pm).contains(&"docker-compose-plugin"),
                "{pm:?} would need the upstream Docker repository"
            );
            assert!(!Tool::Compose.packages(pm).is_empty());
        }
    }
}
