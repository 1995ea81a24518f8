//! Error types for `vaultstrap-core`.
//!
//! Every fatal condition of the bootstrap pipeline maps to exactly one
//! [`BootstrapError`] variant. Errors coming out of external tools are first
//! captured as [`CapabilityError`] so the raw diagnostic of the tool survives
//! until it is shown to the operator. Neither type ever carries the raw admin
//! token or private key material.

use std::path::PathBuf;

/// Errors from an external capability (a subprocess or an in-process
/// stand-in for one).
#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    /// The tool could not be launched or its pipes failed.
    #[error("failed to run '{tool}': {source}")]
    Io {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// The tool ran and reported failure.
    #[error("'{tool}' exited with {status}: {stderr}")]
    Failed {
        tool: String,
        status: String,
        stderr: String,
    },

    /// The tool reported success but its output was not usable.
    #[error("'{tool}' produced unusable output: {reason}")]
    Output { tool: String, reason: String },
}

impl CapabilityError {
    /// The tool's own diagnostic, without any wrapping added here.
    ///
    /// For a failed subprocess this is its captured stderr, verbatim.
    #[must_use]
    pub fn diagnostic(&self) -> String {
        match self {
            Self::Failed { stderr, status, .. } if stderr.is_empty() => {
                format!("exited with {status}")
            }
            Self::Failed { stderr, .. } => stderr.clone(),
            Self::Io { .. } | Self::Output { .. } => self.to_string(),
        }
    }
}

/// Fatal errors from the bootstrap and backup pipelines.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    /// A required tool is missing and no supported package manager exists.
    #[error("unsupported platform: '{tool}' is missing and no supported package manager was found")]
    UnsupportedPlatform { tool: String },

    /// The package manager failed to install a required tool.
    #[error("failed to install '{tool}': {reason}")]
    DependencyInstallFailed { tool: String, reason: String },

    /// Salt, token, or hash generation produced malformed output.
    #[error("credential generation failed: {reason}")]
    CredentialGenerationFailed { reason: String },

    /// The operator did not confirm that the admin token was recorded.
    #[error("admin token was not confirmed as recorded; nothing was saved, re-run to generate a new one")]
    UserDidNotConfirmCredential,

    /// The certificate issuer failed.
    #[error("certificate generation failed: {reason}")]
    CertificateGenerationFailed { reason: String },

    /// The service descriptor could not be rendered.
    #[error("failed to render service descriptor: {reason}")]
    DescriptorRender { reason: String },

    /// The container runtime refused to start the service.
    #[error("service failed to start: {diagnostic}")]
    ServiceStartFailed { diagnostic: String },

    /// The container runtime refused to stop the service.
    #[error("service failed to stop: {diagnostic}")]
    ServiceStopFailed { diagnostic: String },

    /// Snapshot or relocation of a backup failed.
    #[error("backup failed: {reason}")]
    BackupFailed { reason: String },

    /// The configuration value is not usable.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// A filesystem operation failed.
    #[error("{action} '{}': {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BootstrapError {
    /// Build a closure that wraps an `io::Error` with the failed action and path.
    pub(crate) fn io(
        action: &'static str,
        path: impl Into<PathBuf>,
    ) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io {
            action,
            path,
            source,
        }
    }
}
