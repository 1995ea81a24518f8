//! One-time admin credential generation and the on-disk credential record.
//!
//! The raw admin token is generated from the OS CSPRNG, hashed with Argon2id
//! through the [`HashFunction`] capability, shown to the operator exactly
//! once, and then dropped. Only the escaped PHC hash reaches disk, inside an
//! owner-only `KEY=value` record that compose reads as an env file.
//!
//! # Idempotence
//!
//! If the record already exists, nothing is generated, nothing is shown, and
//! the file is never rewritten, even if it looks wrong.
//!
//! # Ordering
//!
//! Everything that can fail (salt, token, hash, format check, operator
//! confirmation) happens before the record is created, so a failed or
//! declined run leaves no record behind and the next run starts clean.

use std::fmt;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::RngCore;
use rand::rngs::OsRng;
use tracing::{info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::config::BootstrapConfig;
use crate::error::BootstrapError;
use crate::fsutil;
use crate::hash::{ADMIN_TOKEN_PARAMS, HashFunction};
use crate::prompt::ConfirmationPrompt;

/// Entropy of the raw token before encoding.
pub const TOKEN_BYTES: usize = 48;

/// Random bytes behind the salt (32 base64 characters).
const SALT_BYTES: usize = 24;

/// Shortest salt the hasher is allowed to see.
pub const MIN_SALT_LEN: usize = 8;

/// Prefix every escaped Argon2id hash must carry.
pub const TAGGED_HASH_PREFIX: &str = "$$argon2id$$";

pub const KEY_ADMIN_TOKEN: &str = "ADMIN_TOKEN";
pub const KEY_SIGNUPS_ALLOWED: &str = "SIGNUPS_ALLOWED";
pub const KEY_INVITATIONS_ALLOWED: &str = "INVITATIONS_ALLOWED";
pub const KEY_DOMAIN: &str = "DOMAIN";

/// The plaintext admin token. Zeroized on drop, never printed by `Debug`.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct RawToken(String);

impl RawToken {
    /// Borrow the token for display. Do not log or persist the result.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RawToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RawToken([REDACTED])")
    }
}

/// A freshly generated credential.
pub struct Credential {
    pub raw_token: RawToken,
    /// Escaped PHC string, ready for the env file.
    pub encoded_hash: String,
    pub salt: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("raw_token", &self.raw_token)
            .field("encoded_hash", &self.encoded_hash)
            .finish_non_exhaustive()
    }
}

/// Generate a salt: base64 of [`SALT_BYTES`] random bytes.
#[must_use]
pub fn generate_salt() -> String {
    let mut bytes = [0u8; SALT_BYTES];
    OsRng.fill_bytes(&mut bytes);
    let salt = BASE64.encode(bytes);
    bytes.zeroize();
    salt
}

/// Generate a raw token: base64 of [`TOKEN_BYTES`] random bytes.
#[must_use]
pub fn generate_token() -> RawToken {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    let token = RawToken(BASE64.encode(bytes));
    bytes.zeroize();
    token
}

/// Check that a salt is long enough and printable on one line.
///
/// # Errors
///
/// Returns [`BootstrapError::CredentialGenerationFailed`].
pub fn validate_salt(salt: &str) -> Result<(), BootstrapError> {
    if salt.len() < MIN_SALT_LEN {
        return Err(BootstrapError::CredentialGenerationFailed {
            reason: format!("salt is {} characters, need at least {MIN_SALT_LEN}", salt.len()),
        });
    }
    if salt.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(BootstrapError::CredentialGenerationFailed {
            reason: "salt contains whitespace or control characters".to_owned(),
        });
    }
    Ok(())
}

/// Escape `$` so compose does not treat parts of the hash as variables.
#[must_use]
pub fn escape_for_env(hash: &str) -> String {
    hash.replace('$', "$$")
}

/// Check the escaped hash is a single-line Argon2id PHC string.
///
/// # Errors
///
/// Returns [`BootstrapError::CredentialGenerationFailed`].
pub fn validate_escaped_hash(escaped: &str) -> Result<(), BootstrapError> {
    if !escaped.starts_with(TAGGED_HASH_PREFIX) {
        return Err(BootstrapError::CredentialGenerationFailed {
            reason: format!("hash does not start with '{TAGGED_HASH_PREFIX}'"),
        });
    }
    if escaped.contains(['\n', '\r']) {
        return Err(BootstrapError::CredentialGenerationFailed {
            reason: "hash spans multiple lines".to_owned(),
        });
    }
    Ok(())
}

/// Contents of the credential record file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    /// Escaped PHC hash, exactly as written to the file.
    pub admin_token: Option<String>,
    pub signups_allowed: bool,
    pub invitations_allowed: bool,
    /// Public URL, `https://<domain>:<port>`.
    pub domain: String,
}

impl CredentialRecord {
    /// Build the record written on first bootstrap.
    #[must_use]
    pub fn new(encoded_hash: String, config: &BootstrapConfig) -> Self {
        Self {
            admin_token: Some(encoded_hash),
            signups_allowed: config.signups_allowed,
            invitations_allowed: config.invitations_allowed,
            domain: config.public_url(),
        }
    }

    /// Render as `KEY=value` lines.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        if let Some(token) = &self.admin_token {
            out.push_str(&format!("{KEY_ADMIN_TOKEN}={token}\n"));
        }
        out.push_str(&format!("{KEY_SIGNUPS_ALLOWED}={}\n", self.signups_allowed));
        out.push_str(&format!(
            "{KEY_INVITATIONS_ALLOWED}={}\n",
            self.invitations_allowed
        ));
        out.push_str(&format!("{KEY_DOMAIN}={}\n", self.domain));
        out
    }

    /// Parse a record. Unknown keys, blank lines, and `#` comments are
    /// ignored; missing flags fall back to the vault's own defaults.
    #[must_use]
    pub fn parse(content: &str) -> Self {
        let mut record = Self {
            admin_token: None,
            signups_allowed: true,
            invitations_allowed: true,
            domain: String::new(),
        };
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                KEY_ADMIN_TOKEN => record.admin_token = Some(value.to_owned()),
                KEY_SIGNUPS_ALLOWED => record.signups_allowed = value == "true",
                KEY_INVITATIONS_ALLOWED => record.invitations_allowed = value == "true",
                KEY_DOMAIN => record.domain = value.to_owned(),
                _ => {}
            }
        }
        record
    }
}

/// Owns the credential record.
pub struct SecretStore<'a> {
    config: &'a BootstrapConfig,
    hasher: &'a dyn HashFunction,
    prompt: &'a dyn ConfirmationPrompt,
}

impl<'a> SecretStore<'a> {
    #[must_use]
    pub fn new(
        config: &'a BootstrapConfig,
        hasher: &'a dyn HashFunction,
        prompt: &'a dyn ConfirmationPrompt,
    ) -> Self {
        Self {
            config,
            hasher,
            prompt,
        }
    }

    /// Make sure the credential record at `path` exists.
    ///
    /// Returns the raw token only when it was generated by this call; it has
    /// already been shown to and acknowledged by the operator.
    ///
    /// # Errors
    ///
    /// - [`BootstrapError::CredentialGenerationFailed`] if the hashing
    ///   pipeline produced malformed output. No file is written.
    /// - [`BootstrapError::UserDidNotConfirmCredential`] if the operator did
    ///   not acknowledge the token. No file is written.
    /// - [`BootstrapError::Io`] if the record cannot be read or created.
    pub async fn ensure_credential(&self, path: &Path) -> Result<Option<RawToken>, BootstrapError> {
        if path.exists() {
            self.check_existing(path)?;
            info!(path = %path.display(), "credential record exists, keeping it");
            return Ok(None);
        }

        let credential = self.generate().await?;

        self.prompt.present_secret("Admin token", &credential.raw_token);
        if !self
            .prompt
            .confirm("Have you stored the admin token somewhere safe? It will not be shown again.")
        {
            warn!("admin token not acknowledged, aborting before it is persisted");
            return Err(BootstrapError::UserDidNotConfirmCredential);
        }

        let record = CredentialRecord::new(credential.encoded_hash, self.config);
        fsutil::create_private(path, record.render().as_bytes())?;
        info!(path = %path.display(), "credential record written");

        Ok(Some(credential.raw_token))
    }

    /// Generate salt and token, hash, escape, and validate.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::CredentialGenerationFailed`] if any step
    /// produces unusable output.
    pub async fn generate(&self) -> Result<Credential, BootstrapError> {
        let salt = generate_salt();
        validate_salt(&salt)?;
        let raw_token = generate_token();

        let hash = self
            .hasher
            .hash(raw_token.expose().as_bytes(), &salt, &ADMIN_TOKEN_PARAMS)
            .await
            .map_err(|e| BootstrapError::CredentialGenerationFailed {
                reason: e.diagnostic(),
            })?;

        let encoded_hash = escape_for_env(hash.trim());
        validate_escaped_hash(&encoded_hash)?;

        Ok(Credential {
            raw_token,
            encoded_hash,
            salt,
        })
    }

    fn check_existing(&self, path: &Path) -> Result<(), BootstrapError> {
        let content = std::fs::read_to_string(path)
            .map_err(BootstrapError::io("failed to read credential record", path))?;
        let record = CredentialRecord::parse(&content);
        match record.admin_token.as_deref() {
            None => warn!(
                path = %path.display(),
                "credential record has no {KEY_ADMIN_TOKEN}; leaving it untouched"
            ),
            Some(token) if validate_escaped_hash(token).is_err() => warn!(
                path = %path.display(),
                "{KEY_ADMIN_TOKEN} is not an escaped Argon2id hash; leaving it untouched"
            ),
            Some(_) => {}
        }
        if record.domain != self.config.public_url() {
            warn!(
                recorded = %record.domain,
                configured = %self.config.public_url(),
                "recorded domain differs from configuration; edit the record to change it"
            );
        }
        Ok(())
    }
}
