//! `vaultstrap` CLI: bootstrap, back up and stop a self-hosted Vaultwarden.
//!
//! Parses configuration from flags and `VAULTSTRAP_*` environment variables,
//! sets up logging, and hands off to `vaultstrap-core`. All pipeline logic
//! lives in the core crate; this binary only does I/O with the operator.

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod prompt;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::warn;
use tracing_subscriber::EnvFilter;
use vaultstrap_core::backup::BackupRecord;
use vaultstrap_core::cert::CertificateOutcome;
use vaultstrap_core::config::{DEFAULT_IMAGE, DEFAULT_PORT, HealthPolicy, IssuerKind};
use vaultstrap_core::deps::DependencyStatus;
use vaultstrap_core::prompt::{ConfirmationPrompt, DeclineAll};
use vaultstrap_core::service::HealthStatus;
use vaultstrap_core::{BootstrapConfig, BootstrapReport, Capabilities, Orchestrator, Outcome, hardening};

use crate::prompt::TerminalPrompt;

// ── ANSI color helpers ───────────────────────────────────────────────

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const WHITE: &str = "\x1b[37m";

// ── CLI structure ────────────────────────────────────────────────────

/// vaultstrap: idempotent bootstrap for a self-hosted Vaultwarden.
#[derive(Parser)]
#[command(
    name = "vaultstrap",
    version,
    about = "vaultstrap: idempotent bootstrap for a self-hosted Vaultwarden",
    long_about = None,
    after_help = format!(
        "{DIM}Environment variables:{RESET}\n  \
         VAULTSTRAP_LOG       Log filter (default: info)\n  \
         VAULTSTRAP_BASE_DIR  Install directory (default: $HOME/<app-name>)\n\n\
         {DIM}Examples:{RESET}\n  \
         vaultstrap\n  \
         vaultstrap --domain vault.example.com --port 443\n  \
         vaultstrap backup"
    ),
)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    /// Print the result as JSON on stdout.
    #[arg(long, global = true)]
    json: bool,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    log_json: bool,

    /// Never prompt. A new admin token cannot be confirmed, so a first
    /// bootstrap fails without writing anything.
    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Args)]
struct Settings {
    /// Service and container name.
    #[arg(long, global = true, env = "VAULTSTRAP_APP_NAME", default_value = "vaultwarden")]
    app_name: String,

    /// Install directory.
    #[arg(long, global = true, env = "VAULTSTRAP_BASE_DIR")]
    base_dir: Option<PathBuf>,

    /// Live data directory (default: <base-dir>/data).
    #[arg(long, global = true, env = "VAULTSTRAP_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// TLS material directory (default: <base-dir>/ssl).
    #[arg(long, global = true, env = "VAULTSTRAP_CERT_DIR")]
    cert_dir: Option<PathBuf>,

    /// Snapshot directory (default: <base-dir>/backups).
    #[arg(long, global = true, env = "VAULTSTRAP_BACKUP_DIR")]
    backup_dir: Option<PathBuf>,

    /// Published HTTPS port.
    #[arg(long, global = true, env = "VAULTSTRAP_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Public host name, also the certificate subject.
    #[arg(long, global = true, env = "VAULTSTRAP_DOMAIN", default_value = "localhost")]
    domain: String,

    /// Container image.
    #[arg(long, global = true, env = "VAULTSTRAP_IMAGE", default_value = DEFAULT_IMAGE)]
    image: String,

    /// Allow open user registration.
    #[arg(long, global = true)]
    allow_signups: bool,

    /// Disallow invitations by existing users.
    #[arg(long, global = true)]
    disable_invitations: bool,

    /// Certificate issuer.
    #[arg(long, global = true, value_enum, default_value_t = IssuerArg::Rcgen)]
    issuer: IssuerArg,

    /// Health probes before giving up.
    #[arg(long, global = true, default_value_t = 10)]
    health_attempts: u32,

    /// Seconds between health probes.
    #[arg(long, global = true, default_value_t = 5)]
    health_interval_secs: u64,
}

#[derive(Clone, Copy, ValueEnum)]
enum IssuerArg {
    Rcgen,
    Openssl,
}

impl From<IssuerArg> for IssuerKind {
    fn from(arg: IssuerArg) -> Self {
        match arg {
            IssuerArg::Rcgen => Self::Rcgen,
            IssuerArg::Openssl => Self::Openssl,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Install dependencies, generate secrets, and start the service (default).
    Bootstrap,
    /// Snapshot the database and prune snapshots older than 30 days.
    Backup,
    /// Stop the service.
    Stop,
}

impl Settings {
    fn into_config(self) -> Result<BootstrapConfig> {
        let base_dir = match self.base_dir {
            Some(dir) => dir,
            None => std::env::var_os("HOME")
                .map(PathBuf::from)
                .context("HOME is not set; pass --base-dir")?
                .join(&self.app_name),
        };

        let mut config = BootstrapConfig::new(self.app_name, base_dir);
        if let Some(dir) = self.data_dir {
            config.data_dir = dir;
        }
        if let Some(dir) = self.cert_dir {
            config.cert_dir = dir;
        }
        if let Some(dir) = self.backup_dir {
            config.backup_dir = dir;
        }
        config.port = self.port;
        config.domain = self.domain;
        config.image = self.image;
        config.signups_allowed = self.allow_signups;
        config.invitations_allowed = !self.disable_invitations;
        config.issuer = self.issuer.into();
        config.health = HealthPolicy {
            max_attempts: self.health_attempts,
            interval: Duration::from_secs(self.health_interval_secs),
        };
        Ok(config)
    }
}

// ── Pretty output helpers ────────────────────────────────────────────

fn header(icon: &str, title: &str) {
    println!("{BOLD}{CYAN}{icon} {title}{RESET}");
    println!("{DIM}─────────────────────────────────────────{RESET}");
}

fn kv_line(key: &str, value: &str) {
    println!("  {DIM}{key:<20}{RESET} {WHITE}{value}{RESET}");
}

fn success(msg: &str) {
    println!("{GREEN}{BOLD}✓{RESET} {msg}");
}

fn warning(msg: &str) {
    println!("{YELLOW}{BOLD}⚠{RESET} {YELLOW}{msg}{RESET}");
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("failed to format JSON: {e}"),
    }
}

/// Machine-readable form of [`Outcome::RestartRequired`].
#[derive(serde::Serialize)]
struct RestartNotice {
    restart_required: bool,
    reason: &'static str,
}

const RESTART_REASON: &str = "container runtime installed; log in again to pick up docker group membership";

fn restart_notice() -> RestartNotice {
    RestartNotice {
        restart_required: true,
        reason: RESTART_REASON,
    }
}

fn print_report(report: &BootstrapReport) {
    header("🔐", "Vault ready");
    kv_line("URL", &report.public_url);
    kv_line("Descriptor", &report.descriptor_path.display().to_string());
    for (tool, status) in &report.dependencies {
        let status = match status {
            DependencyStatus::Present => "present",
            DependencyStatus::InstalledThisRun => "installed",
            DependencyStatus::InstallationFailed { .. } => "failed",
        };
        kv_line(&tool.to_string(), status);
    }
    println!();

    if report.credential_generated {
        success("Admin token generated; only its hash was saved");
    } else {
        success("Existing admin credential kept");
    }
    match report.certificate {
        CertificateOutcome::Issued => success("TLS certificate issued"),
        CertificateOutcome::Reused => success("Existing TLS certificate kept"),
    }
    match report.health {
        HealthStatus::Confirmed { attempts } => {
            success(&format!("Service healthy after {attempts} probe(s)"));
        }
        HealthStatus::Unconfirmed { attempts } => warning(&format!(
            "Service not healthy after {attempts} probes; it may still be starting. \
             Check `docker compose -f {} logs`",
            report.descriptor_path.display()
        )),
    }
}

fn print_backup(record: &BackupRecord) {
    header("💾", "Backup complete");
    kv_line("Snapshot", &record.archived_path.display().to_string());
    kv_line("Taken at", &record.created_at.to_rfc3339());
    kv_line("Pruned", &record.pruned.len().to_string());
    for path in &record.pruned {
        println!("  {DIM}  - {}{RESET}", path.display());
    }
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_env("VAULTSTRAP_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

// ── Command dispatch ─────────────────────────────────────────────────

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    if let Err(e) = hardening::disable_core_dumps() {
        warn!(error = %e, "could not disable core dumps");
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("  {RED}{BOLD}✗ Error:{RESET} {e:#}");
            eprintln!();
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = cli.settings.into_config()?;
    let prompt: Arc<dyn ConfirmationPrompt> = if cli.non_interactive {
        Arc::new(DeclineAll)
    } else {
        Arc::new(TerminalPrompt::detect())
    };
    let orchestrator = Orchestrator::new(&config, Capabilities::host(&config, prompt));

    match cli.command.unwrap_or(Commands::Bootstrap) {
        Commands::Bootstrap => match orchestrator.bootstrap().await.context("bootstrap failed")? {
            Outcome::Completed(report) => {
                if cli.json {
                    print_json(&report);
                } else {
                    print_report(&report);
                }
            }
            Outcome::RestartRequired if cli.json => print_json(&restart_notice()),
            Outcome::RestartRequired => {
                warning("Docker was just installed and your user was added to the docker group.");
                println!("  Log out and back in (or run `newgrp docker`), then run vaultstrap again.");
            }
        },
        Commands::Backup => {
            let record = orchestrator
                .backup(chrono::Utc::now())
                .await
                .context("backup failed")?;
            if cli.json {
                print_json(&record);
            } else {
                print_backup(&record);
            }
        }
        Commands::Stop => {
            orchestrator.stop().await.context("stop failed")?;
            success(&format!("{} stopped", config.app_name));
        }
    }
    Ok(())
}
