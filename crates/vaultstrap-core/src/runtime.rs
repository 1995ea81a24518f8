//! Container runtime capability.
//!
//! The vault runs as a compose service. [`ServiceRuntime`] is the narrow set
//! of runtime operations the pipeline needs; [`DockerCompose`] implements it
//! by invoking `docker compose -f <descriptor> ...`.

use std::path::{Path, PathBuf};

use tokio::process::Command;

use crate::error::CapabilityError;
use crate::process::run_captured;

/// Captured output of a command run inside the service container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Start, stop, and exec into the services described by a descriptor file.
#[async_trait::async_trait]
pub trait ServiceRuntime: Send + Sync {
    /// Bring every service in `descriptor` up, detached.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError`] carrying the runtime's diagnostic.
    async fn up(&self, descriptor: &Path) -> Result<(), CapabilityError>;

    /// Stop and remove every service in `descriptor`.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError`] carrying the runtime's diagnostic.
    async fn down(&self, descriptor: &Path) -> Result<(), CapabilityError>;

    /// Run `args` inside the running `service`.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::Failed`] if the command exits non-zero or
    /// the service is not running.
    async fn exec(
        &self,
        descriptor: &Path,
        service: &str,
        args: &[String],
    ) -> Result<ExecOutput, CapabilityError>;
}

/// `docker compose` backed runtime.
#[derive(Debug, Clone)]
pub struct DockerCompose {
    program: PathBuf,
}

impl DockerCompose {
    #[must_use]
    pub fn new() -> Self {
        Self::with_program("docker")
    }

    #[must_use]
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn compose(&self, descriptor: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("compose").arg("-f").arg(descriptor);
        cmd
    }
}

impl Default for DockerCompose {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ServiceRuntime for DockerCompose {
    async fn up(&self, descriptor: &Path) -> Result<(), CapabilityError> {
        let mut cmd = self.compose(descriptor);
        cmd.args(["up", "-d"]);
        run_captured("docker compose up", &mut cmd, None).await?;
        Ok(())
    }

    async fn down(&self, descriptor: &Path) -> Result<(), CapabilityError> {
        let mut cmd = self.compose(descriptor);
        cmd.arg("down");
        run_captured("docker compose down", &mut cmd, None).await?;
        Ok(())
    }

    async fn exec(
        &self,
        descriptor: &Path,
        service: &str,
        args: &[String],
    ) -> Result<ExecOutput, CapabilityError> {
        let mut cmd = self.compose(descriptor);
        cmd.args(["exec", "-T", service]).args(args);
        let output = run_captured("docker compose exec", &mut cmd, None).await?;
        Ok(ExecOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
