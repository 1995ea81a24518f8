//! Core library for `vaultstrap`.
//!
//! Contains the idempotent bootstrap pipeline for a self-hosted password
//! vault: dependency resolution, one-time admin credential generation, TLS
//! certificate issuance, compose descriptor rendering, service start and
//! health polling, and snapshot backups with retention. Every external tool
//! sits behind a capability trait so the pipeline can be driven by fakes in
//! tests. This crate does no argument parsing and no terminal output.

pub mod backup;
pub mod cert;
pub mod config;
pub mod deps;
pub mod descriptor;
pub mod error;
pub mod hardening;
pub mod hash;
pub mod issuer;
pub mod orchestrator;
pub mod prompt;
pub mod runtime;
pub mod secret;
pub mod service;

mod fsutil;
mod process;

pub use config::BootstrapConfig;
pub use error::{BootstrapError, CapabilityError};
pub use orchestrator::{BootstrapReport, Capabilities, Orchestrator, Outcome};
