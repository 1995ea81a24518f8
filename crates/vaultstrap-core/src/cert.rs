//! On-disk TLS key and certificate for the vault's HTTPS listener.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::BootstrapError;
use crate::fsutil;
use crate::issuer::CertIssuer;

pub const KEY_FILE: &str = "key.pem";
pub const CERT_FILE: &str = "cert.pem";

/// Validity of issued certificates (ten years).
pub const CERT_VALIDITY_DAYS: u32 = 3650;

/// What `ensure_certificate` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateOutcome {
    Issued,
    Reused,
}

/// Owns `key.pem` and `cert.pem` in a certificate directory.
pub struct CertificateStore<'a> {
    issuer: &'a dyn CertIssuer,
}

impl<'a> CertificateStore<'a> {
    #[must_use]
    pub fn new(issuer: &'a dyn CertIssuer) -> Self {
        Self { issuer }
    }

    /// Paths of the key and certificate inside `dir`.
    #[must_use]
    pub fn paths(dir: &Path) -> (PathBuf, PathBuf) {
        (dir.join(KEY_FILE), dir.join(CERT_FILE))
    }

    /// Issue a certificate for `subject` unless both files already exist.
    ///
    /// A lone key or certificate is not reusable and is replaced together
    /// with its missing partner.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::CertificateGenerationFailed`] if the issuer
    /// fails, or [`BootstrapError::Io`] if the files cannot be written.
    pub async fn ensure_certificate(
        &self,
        dir: &Path,
        subject: &str,
    ) -> Result<CertificateOutcome, BootstrapError> {
        let (key_path, cert_path) = Self::paths(dir);
        match (key_path.exists(), cert_path.exists()) {
            (true, true) => {
                info!(dir = %dir.display(), "TLS material exists, keeping it");
                return Ok(CertificateOutcome::Reused);
            }
            (false, false) => {}
            _ => warn!(
                dir = %dir.display(),
                "only one of {KEY_FILE}/{CERT_FILE} exists; issuing a new pair"
            ),
        }

        info!(subject, issuer = self.issuer.name(), days = CERT_VALIDITY_DAYS, "issuing TLS certificate");
        let material = self
            .issuer
            .issue(subject, CERT_VALIDITY_DAYS)
            .await
            .map_err(|e| BootstrapError::CertificateGenerationFailed {
                reason: e.diagnostic(),
            })?;

        fsutil::replace_private(&key_path, material.private_key_pem.as_bytes())?;
        fsutil::replace_private(&cert_path, material.certificate_pem.as_bytes())?;
        Ok(CertificateOutcome::Issued)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use zeroize::Zeroizing;

    use super::*;
    use crate::error::CapabilityError;
    use crate::issuer::{CertificateMaterial, RcgenIssuer};

    #[derive(Default)]
    struct CountingIssuer {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl CertIssuer for CountingIssuer {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn issue(&self, subject: &str, days: u32) -> Result<CertificateMaterial, CapabilityError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(CertificateMaterial {
                private_key_pem: Zeroizing::new(format!("key-{n}")),
                certificate_pem: format!("cert-{n}-{subject}-{days}"),
                subject: subject.to_owned(),
                validity_days: days,
            })
        }
    }

    struct FailingIssuer;

    #[async_trait::async_trait]
    impl CertIssuer for FailingIssuer {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn issue(&self, _: &str, _: u32) -> Result<CertificateMaterial, CapabilityError> {
            Err(CapabilityError::Failed {
                tool: "openssl".to_owned(),
                status: "exit status: 1".to_owned(),
                stderr: "req: Cannot open input file /dev/stdin".to_owned(),
            })
        }
    }

    #[tokio::test]
    async fn issues_once_then_reuses() {
        let dir = tempfile::tempdir().unwrap();
        let issuer = CountingIssuer::default();
        let store = CertificateStore::new(&issuer);

        let first = store.ensure_certificate(dir.path(), "localhost").await.unwrap();
        let second = store.ensure_certificate(dir.path(), "localhost").await.unwrap();

        assert_eq!(first, CertificateOutcome::Issued);
        assert_eq!(second, CertificateOutcome::Reused);
        assert_eq!(issuer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            std::fs::read_to_string(dir.path().join(CERT_FILE)).unwrap(),
            "cert-0-localhost-3650"
        );
    }

    #[tokio::test]
    async fn lone_key_is_replaced_with_a_pair() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(KEY_FILE), "orphan").unwrap();
        let issuer = CountingIssuer::default();

        let outcome = CertificateStore::new(&issuer)
            .ensure_certificate(dir.path(), "localhost")
            .await
            .unwrap();

        assert_eq!(outcome, CertificateOutcome::Issued);
        assert_eq!(std::fs::read_to_string(dir.path().join(KEY_FILE)).unwrap(), "key-0");
    }

    #[tokio::test]
    async fn issuer_failure_is_fatal_and_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let err = CertificateStore::new(&FailingIssuer)
            .ensure_certificate(dir.path(), "localhost")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            BootstrapError::CertificateGenerationFailed { ref reason }
                if reason == "req: Cannot open input file /dev/stdin"
        ));
        assert!(!dir.path().join(KEY_FILE).exists());
        assert!(!dir.path().join(CERT_FILE).exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        CertificateStore::new(&RcgenIssuer)
            .ensure_certificate(dir.path(), "vault.example.com")
            .await
            .unwrap();

        for name in [KEY_FILE, CERT_FILE] {
            let mode = std::fs::metadata(dir.path().join(name)).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600, "{name}");
        }
    }
}
