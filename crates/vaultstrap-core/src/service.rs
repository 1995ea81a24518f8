//! Service lifecycle: start, stop, health polling, exec.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::descriptor::health_probe_command;
use crate::error::{BootstrapError, CapabilityError};
use crate::runtime::{ExecOutput, ServiceRuntime};

/// Result of health polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum HealthStatus {
    /// The probe succeeded on attempt `attempts`.
    Confirmed { attempts: u32 },
    /// The probe never succeeded within `attempts` tries.
    Unconfirmed { attempts: u32 },
}

impl HealthStatus {
    #[must_use]
    pub fn is_confirmed(self) -> bool {
        matches!(self, Self::Confirmed { .. })
    }
}

/// Drives one compose service through a [`ServiceRuntime`].
pub struct ServiceController<'a> {
    runtime: &'a dyn ServiceRuntime,
    descriptor: PathBuf,
    service: String,
}

impl<'a> ServiceController<'a> {
    #[must_use]
    pub fn new(
        runtime: &'a dyn ServiceRuntime,
        descriptor: impl Into<PathBuf>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            runtime,
            descriptor: descriptor.into(),
            service: service.into(),
        }
    }

    #[must_use]
    pub fn descriptor(&self) -> &Path {
        &self.descriptor
    }

    /// Bring the service up, detached.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::ServiceStartFailed`] with the runtime's own
    /// diagnostic.
    pub async fn start(&self) -> Result<(), BootstrapError> {
        info!(service = %self.service, "starting service");
        self.runtime
            .up(&self.descriptor)
            .await
            .map_err(|e| BootstrapError::ServiceStartFailed {
                diagnostic: e.diagnostic(),
            })
    }

    /// Stop and remove the service.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::ServiceStopFailed`] with the runtime's own
    /// diagnostic.
    pub async fn stop(&self) -> Result<(), BootstrapError> {
        info!(service = %self.service, "stopping service");
        self.runtime
            .down(&self.descriptor)
            .await
            .map_err(|e| BootstrapError::ServiceStopFailed {
                diagnostic: e.diagnostic(),
            })
    }

    /// Probe health up to `max_attempts` times, `interval` apart.
    ///
    /// Returns on the first successful probe. There is no sleep after the
    /// final attempt, so the call never waits longer than
    /// `max_attempts * interval` plus the probes themselves. Never fails:
    /// an unconfirmed result is advisory.
    pub async fn poll_healthy(&self, max_attempts: u32, interval: Duration) -> HealthStatus {
        let probe = health_probe_command();
        for attempt in 1..=max_attempts {
            match self.exec(&probe).await {
                Ok(_) => {
                    info!(service = %self.service, attempt, "service is healthy");
                    return HealthStatus::Confirmed { attempts: attempt };
                }
                Err(e) => debug!(attempt, error = %e, "health probe failed"),
            }
            if attempt < max_attempts {
                tokio::time::sleep(interval).await;
            }
        }
        warn!(
            service = %self.service,
            attempts = max_attempts,
            "service did not report healthy; it may still be starting"
        );
        HealthStatus::Unconfirmed {
            attempts: max_attempts,
        }
    }

    /// Run `args` inside the service container.
    ///
    /// # Errors
    ///
    /// Returns the runtime's [`CapabilityError`] unchanged.
    pub async fn exec(&self, args: &[String]) -> Result<ExecOutput, CapabilityError> {
        self.runtime.exec(&self.descriptor, &self.service, args).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    /// Runtime whose health probe succeeds from attempt `healthy_from` on.
    struct ProbeRuntime {
        healthy_from: Option<u32>,
        probes: AtomicU32,
        up_error: Option<String>,
        commands: Mutex<Vec<Vec<String>>>,
    }

    impl ProbeRuntime {
        fn healthy_from(n: Option<u32>) -> Self {
            Self {
                healthy_from: n,
                probes: AtomicU32::new(0),
                up_error: None,
                commands: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl ServiceRuntime for ProbeRuntime {
        async fn up(&self, _: &Path) -> Result<(), CapabilityError> {
            match &self.up_error {
                Some(stderr) => Err(CapabilityError::Failed {
                    tool: "docker compose up".to_owned(),
                    status: "exit status: 1".to_owned(),
                    stderr: stderr.clone(),
                }),
                None => Ok(()),
            }
        }

        async fn down(&self, _: &Path) -> Result<(), CapabilityError> {
            Ok(())
        }

        async fn exec(&self, _: &Path, _: &str, args: &[String]) -> Result<ExecOutput, CapabilityError> {
            self.commands.lock().unwrap().push(args.to_vec());
            let n = self.probes.fetch_add(1, Ordering::SeqCst) + 1;
            if self.healthy_from.is_some_and(|from| n >= from) {
                Ok(ExecOutput::default())
            } else {
                Err(CapabilityError::Failed {
                    tool: "docker compose exec".to_owned(),
                    status: "exit status: 7".to_owned(),
                    stderr: "curl: (7) Failed to connect".to_owned(),
                })
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stops_polling_on_first_success() {
        let runtime = ProbeRuntime::healthy_from(Some(3));
        let controller = ServiceController::new(&runtime, "compose.yml", "vaultwarden");

        let start = tokio::time::Instant::now();
        let status = controller.poll_healthy(10, Duration::from_secs(5)).await;

        assert_eq!(status, HealthStatus::Confirmed { attempts: 3 });
        assert_eq!(runtime.probes.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_within_the_time_budget() {
        let runtime = ProbeRuntime::healthy_from(None);
        let controller = ServiceController::new(&runtime, "compose.yml", "vaultwarden");

        let start = tokio::time::Instant::now();
        let status = controller.poll_healthy(4, Duration::from_secs(5)).await;

        assert_eq!(status, HealthStatus::Unconfirmed { attempts: 4 });
        assert!(!status.is_confirmed());
        assert_eq!(runtime.probes.load(Ordering::SeqCst), 4);
        assert!(start.elapsed() <= Duration::from_secs(4 * 5));
    }

    #[tokio::test(start_paused = true)]
    async fn probe_is_the_descriptor_health_command() {
        let runtime = ProbeRuntime::healthy_from(Some(1));
        let controller = ServiceController::new(&runtime, "compose.yml", "vaultwarden");
        controller.poll_healthy(1, Duration::from_secs(1)).await;

        assert_eq!(*runtime.commands.lock().unwrap(), vec![health_probe_command()]);
    }

    #[tokio::test]
    async fn start_failure_surfaces_runtime_stderr() {
        let mut runtime = ProbeRuntime::healthy_from(None);
        runtime.up_error = Some("Bind for 0.0.0.0:8443 failed: port is already allocated".to_owned());
        let controller = ServiceController::new(&runtime, "compose.yml", "vaultwarden");

        let err = controller.start().await.unwrap_err();
        assert!(matches!(
            err,
            BootstrapError::ServiceStartFailed { ref diagnostic }
                if diagnostic == "Bind for 0.0.0.0:8443 failed: port is already allocated"
        ));
    }
}
