//! Admin-token hashing capability.
//!
//! The vault accepts its admin token as an Argon2id PHC string. Hashing is
//! delegated to the `argon2` command-line utility behind the
//! [`HashFunction`] trait so the pipeline can be exercised with a fake.

use std::path::PathBuf;

use tokio::process::Command;

use crate::error::CapabilityError;
use crate::process::{run_captured, stdout_text};

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Argon2Params {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    /// Number of passes.
    pub time_cost: u32,
    /// Degree of parallelism.
    pub parallelism: u32,
}

/// Parameters used for the admin token. Pinned, not operator-tunable.
pub const ADMIN_TOKEN_PARAMS: Argon2Params = Argon2Params {
    memory_kib: 65_540,
    time_cost: 3,
    parallelism: 4,
};

/// A function from `(secret, salt)` to a tagged hash string.
#[async_trait::async_trait]
pub trait HashFunction: Send + Sync {
    /// Hash `secret` with `salt`, returning the encoded (PHC) form,
    /// e.g. `$argon2id$v=19$m=65540,t=3,p=4$<salt>$<digest>`.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError`] if the hasher fails to run or reports
    /// failure.
    async fn hash(
        &self,
        secret: &[u8],
        salt: &str,
        params: &Argon2Params,
    ) -> Result<String, CapabilityError>;
}

/// Hashes by running the reference `argon2` binary.
///
/// The secret is passed on stdin so it never appears in the process table.
#[derive(Debug, Clone)]
pub struct Argon2Cli {
    program: PathBuf,
}

impl Argon2Cli {
    #[must_use]
    pub fn new() -> Self {
        Self::with_program("argon2")
    }

    #[must_use]
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for Argon2Cli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl HashFunction for Argon2Cli {
    async fn hash(
        &self,
        secret: &[u8],
        salt: &str,
        params: &Argon2Params,
    ) -> Result<String, CapabilityError> {
        let mut cmd = Command::new(&self.program);
        cmd.arg(salt)
            .args(["-e", "-id"])
            .arg("-k")
            .arg(params.memory_kib.to_string())
            .arg("-t")
            .arg(params.time_cost.to_string())
            .arg("-p")
            .arg(params.parallelism.to_string());

        let output = run_captured("argon2", &mut cmd, Some(secret)).await?;
        let encoded = stdout_text("argon2", &output)?;
        if encoded.is_empty() {
            return Err(CapabilityError::Output {
                tool: "argon2".to_owned(),
                reason: "empty hash".to_owned(),
            });
        }
        Ok(encoded)
    }
}

#[cfg(all(test, unix))]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passes_salt_and_pinned_parameters() {
        // `echo` prints its argv, which is exactly what argon2 would receive.
        let hasher = Argon2Cli::with_program("echo");
        let out = hasher
            .hash(b"token", "c2FsdHNhbHQ", &ADMIN_TOKEN_PARAMS)
            .await
            .unwrap();
        assert_eq!(out, "c2FsdHNhbHQ -e -id -k 65540 -t 3 -p 4");
    }

    #[tokio::test]
    async fn secret_is_not_on_the_command_line() {
        let hasher = Argon2Cli::with_program("echo");
        let out = hasher
            .hash(b"do-not-leak", "saltsalt", &ADMIN_TOKEN_PARAMS)
            .await
            .unwrap();
        assert!(!out.contains("do-not-leak"));
    }

    #[tokio::test]
    async fn empty_output_is_rejected() {
        let hasher = Argon2Cli::with_program("true");
        let err = hasher
            .hash(b"token", "saltsalt", &ADMIN_TOKEN_PARAMS)
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::Output { .. }));
    }

    #[tokio::test]
    async fn failing_hasher_is_reported() {
        let hasher = Argon2Cli::with_program("false");
        let err = hasher
            .hash(b"token", "saltsalt", &ADMIN_TOKEN_PARAMS)
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::Failed { .. }));
    }
}
