//! Compose descriptor for the vault service.
//!
//! The descriptor is rebuilt from configuration on every run and written
//! over whatever was there before. It is never merged or patched, so it
//! always reflects the current configuration. Rendering is a pure function:
//! the same inputs give byte-identical output.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cert::{CERT_FILE, KEY_FILE};
use crate::config::{BootstrapConfig, INTERNAL_HTTPS_PORT};
use crate::error::BootstrapError;

/// Path of the live data directory inside the container.
pub const CONTAINER_DATA_DIR: &str = "/data";

/// Path of the mounted certificate directory inside the container.
pub const CONTAINER_CERT_DIR: &str = "/ssl";

/// Path the health probe requests.
pub const HEALTH_PATH: &str = "/health";

const HEADER: &str = "# Generated by vaultstrap. Rewritten on every run; edit the configuration instead.\n";

/// Top-level compose document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub services: BTreeMap<String, ServiceSpec>,
}

/// One compose service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub image: String,
    pub container_name: String,
    pub restart: String,
    pub security_opt: Vec<String>,
    pub env_file: Vec<String>,
    pub environment: BTreeMap<String, String>,
    pub ports: Vec<String>,
    pub volumes: Vec<String>,
    pub healthcheck: HealthCheck,
}

/// Compose health check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub test: Vec<String>,
    pub interval: String,
    pub timeout: String,
    pub retries: u32,
}

/// Command that succeeds once the vault answers on its own HTTPS port.
///
/// Used both by the runtime's health check and by the bootstrap poller, so
/// the two never disagree about what "healthy" means.
#[must_use]
pub fn health_probe_command() -> Vec<String> {
    vec![
        "curl".to_owned(),
        "-fsk".to_owned(),
        format!("https://localhost:{INTERNAL_HTTPS_PORT}{HEALTH_PATH}"),
    ]
}

/// Build the descriptor value.
#[must_use]
pub fn build(
    config: &BootstrapConfig,
    secret_path: &Path,
    cert_dir: &Path,
    data_dir: &Path,
    port: u16,
) -> ServiceDescriptor {
    let mut environment = BTreeMap::new();
    environment.insert(
        "ROCKET_TLS".to_owned(),
        format!(
            "{{certs=\"{CONTAINER_CERT_DIR}/{CERT_FILE}\",key=\"{CONTAINER_CERT_DIR}/{KEY_FILE}\"}}"
        ),
    );
    environment.insert("ROCKET_PORT".to_owned(), INTERNAL_HTTPS_PORT.to_string());

    let mut test = vec!["CMD".to_owned()];
    test.extend(health_probe_command());

    let spec = ServiceSpec {
        image: config.image.clone(),
        container_name: config.app_name.clone(),
        restart: "unless-stopped".to_owned(),
        security_opt: vec!["no-new-privileges:true".to_owned()],
        env_file: vec![secret_path.display().to_string()],
        environment,
        ports: vec![format!("{port}:{INTERNAL_HTTPS_PORT}")],
        volumes: vec![
            format!("{}:{CONTAINER_DATA_DIR}", data_dir.display()),
            format!("{}:{CONTAINER_CERT_DIR}:ro", cert_dir.display()),
        ],
        healthcheck: HealthCheck {
            test,
            interval: "30s".to_owned(),
            timeout: "10s".to_owned(),
            retries: 3,
        },
    };

    let mut services = BTreeMap::new();
    services.insert(config.app_name.clone(), spec);
    ServiceDescriptor { services }
}

/// Render the descriptor as YAML.
///
/// # Errors
///
/// Returns [`BootstrapError::DescriptorRender`] if serialization fails.
pub fn render(
    config: &BootstrapConfig,
    secret_path: &Path,
    cert_dir: &Path,
    data_dir: &Path,
    port: u16,
) -> Result<String, BootstrapError> {
    let descriptor = build(config, secret_path, cert_dir, data_dir, port);
    let body = serde_yaml::to_string(&descriptor).map_err(|e| BootstrapError::DescriptorRender {
        reason: e.to_string(),
    })?;
    Ok(format!("{HEADER}{body}"))
}

/// Write rendered descriptor text to `path`, replacing any previous file.
///
/// # Errors
///
/// Returns [`BootstrapError::Io`] if the file cannot be written.
pub fn write_descriptor(path: &Path, text: &str) -> Result<(), BootstrapError> {
    std::fs::write(path, text).map_err(BootstrapError::io("failed to write descriptor", path))?;
    info!(path = %path.display(), "service descriptor written");
    Ok(())
}
