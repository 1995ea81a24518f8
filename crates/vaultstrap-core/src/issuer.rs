//! TLS certificate issuance capability.
//!
//! Produces a self-signed key/certificate pair for the vault's own HTTPS
//! listener. [`RcgenIssuer`] generates the pair in-process using `rcgen`;
//! [`OpensslCli`] shells out to the `openssl` binary for hosts that prefer
//! RSA keys minted by the system toolkit.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Datelike, Utc};
use tokio::process::Command;
use zeroize::Zeroizing;

use crate::error::CapabilityError;
use crate::process::{run_captured, stdout_text};

/// A freshly issued key pair and certificate.
pub struct CertificateMaterial {
    /// PEM-encoded private key. Zeroized on drop.
    pub private_key_pem: Zeroizing<String>,
    /// PEM-encoded self-signed certificate.
    pub certificate_pem: String,
    /// Subject common name (also the single DNS SAN).
    pub subject: String,
    /// Validity in days, counted from issuance.
    pub validity_days: u32,
}

impl fmt::Debug for CertificateMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateMaterial")
            .field("private_key_pem", &"[REDACTED]")
            .field("subject", &self.subject)
            .field("validity_days", &self.validity_days)
            .finish_non_exhaustive()
    }
}

/// Issues a self-signed certificate for a subject.
#[async_trait::async_trait]
pub trait CertIssuer: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Issue a key pair and a certificate for `subject`, valid for
    /// `validity_days` from now.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError`] if key generation or signing fails.
    async fn issue(
        &self,
        subject: &str,
        validity_days: u32,
    ) -> Result<CertificateMaterial, CapabilityError>;
}

/// In-process issuer backed by `rcgen` (ECDSA P-256).
#[derive(Debug, Clone, Copy, Default)]
pub struct RcgenIssuer;

fn rcgen_error(step: &str) -> impl FnOnce(rcgen::Error) -> CapabilityError + '_ {
    move |e| CapabilityError::Output {
        tool: "rcgen".to_owned(),
        reason: format!("{step}: {e}"),
    }
}

fn calendar_day(at: DateTime<Utc>) -> (i32, u8, u8) {
    // month() is 1..=12 and day() is 1..=31, both fit in u8.
    let month = u8::try_from(at.month()).unwrap_or(1);
    let day = u8::try_from(at.day()).unwrap_or(1);
    (at.year(), month, day)
}

#[async_trait::async_trait]
impl CertIssuer for RcgenIssuer {
    fn name(&self) -> &'static str {
        "rcgen"
    }

    async fn issue(
        &self,
        subject: &str,
        validity_days: u32,
    ) -> Result<CertificateMaterial, CapabilityError> {
        let mut params = rcgen::CertificateParams::new(vec![subject.to_owned()])
            .map_err(rcgen_error("invalid subject"))?;

        let mut dn = rcgen::DistinguishedName::new();
        dn.push(rcgen::DnType::CommonName, subject);
        params.distinguished_name = dn;

        let now = Utc::now();
        let until = now + chrono::Duration::days(i64::from(validity_days));
        let (y, m, d) = calendar_day(now);
        params.not_before = rcgen::date_time_ymd(y, m, d);
        let (y, m, d) = calendar_day(until);
        params.not_after = rcgen::date_time_ymd(y, m, d);

        let key_pair = rcgen::KeyPair::generate().map_err(rcgen_error("key generation"))?;
        let cert = params
            .self_signed(&key_pair)
            .map_err(rcgen_error("self-signing"))?;

        Ok(CertificateMaterial {
            private_key_pem: Zeroizing::new(key_pair.serialize_pem()),
            certificate_pem: cert.pem(),
            subject: subject.to_owned(),
            validity_days,
        })
    }
}

/// Issuer that runs `openssl` to mint an RSA-4096 key and a self-signed
/// certificate. Nothing is written to disk: the key is produced on stdout
/// and fed back to the signing step on stdin.
#[derive(Debug, Clone)]
pub struct OpensslCli {
    program: PathBuf,
}

impl OpensslCli {
    #[must_use]
    pub fn new() -> Self {
        Self::with_program("openssl")
    }

    #[must_use]
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for OpensslCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CertIssuer for OpensslCli {
    fn name(&self) -> &'static str {
        "openssl"
    }

    async fn issue(
        &self,
        subject: &str,
        validity_days: u32,
    ) -> Result<CertificateMaterial, CapabilityError> {
        let mut genkey = Command::new(&self.program);
        genkey.args([
            "genpkey",
            "-algorithm",
            "RSA",
            "-pkeyopt",
            "rsa_keygen_bits:4096",
        ]);
        let key_out = run_captured("openssl", &mut genkey, None).await?;
        let private_key_pem = Zeroizing::new(stdout_text("openssl", &key_out)?);

        let mut req = Command::new(&self.program);
        req.args(["req", "-x509", "-new", "-key", "/dev/stdin", "-sha256"])
            .arg("-days")
            .arg(validity_days.to_string())
            .arg("-subj")
            .arg(format!("/CN={subject}"))
            .arg("-addext")
            .arg(format!("subjectAltName=DNS:{subject}"));
        let cert_out = run_captured("openssl", &mut req, Some(private_key_pem.as_bytes())).await?;
        let certificate_pem = stdout_text("openssl", &cert_out)?;

        if !certificate_pem.starts_with("-----BEGIN CERTIFICATE-----") {
            return Err(CapabilityError::Output {
                tool: "openssl".to_owned(),
                reason: "no PEM certificate on stdout".to_owned(),
            });
        }

        Ok(CertificateMaterial {
            private_key_pem,
            certificate_pem,
            subject: subject.to_owned(),
            validity_days,
        })
    }
}
