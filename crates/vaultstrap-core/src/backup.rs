//! Database snapshots with age-based retention.
//!
//! A snapshot is taken by `sqlite3 .backup` inside the running service,
//! which writes into the mounted data directory. The file is then moved into
//! the backup directory, narrowed to mode `0600`, and anything older than [`RETENTION_DAYS`] is
//! removed. Snapshot age comes from the UTC timestamp embedded in the file
//! name, never from filesystem metadata.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use tracing::{debug, info};

use crate::config::BootstrapConfig;
use crate::descriptor::CONTAINER_DATA_DIR;
use crate::error::BootstrapError;
use crate::fsutil;
use crate::service::ServiceController;

/// Snapshots older than this many days are pruned.
pub const RETENTION_DAYS: i64 = 30;

const SNAPSHOT_PREFIX: &str = "db_";
const SNAPSHOT_SUFFIX: &str = ".sqlite3";
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const LIVE_DATABASE: &str = "db.sqlite3";

/// What one backup run did.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct BackupRecord {
    pub created_at: DateTime<Utc>,
    /// Where the snapshot was first written, on the host side.
    pub snapshot_path: PathBuf,
    /// Final location in the backup directory.
    pub archived_path: PathBuf,
    /// Expired snapshots removed by this run.
    pub pruned: Vec<PathBuf>,
}

/// `db_<YYYYmmdd_HHMMSS>.sqlite3` for `now`.
#[must_use]
pub fn snapshot_file_name(now: DateTime<Utc>) -> String {
    format!(
        "{SNAPSHOT_PREFIX}{}{SNAPSHOT_SUFFIX}",
        now.format(TIMESTAMP_FORMAT)
    )
}

/// Timestamp embedded in a snapshot file name, or `None` if `name` is not a
/// snapshot.
#[must_use]
pub fn parse_snapshot_timestamp(name: &str) -> Option<DateTime<Utc>> {
    let stamp = name
        .strip_prefix(SNAPSHOT_PREFIX)?
        .strip_suffix(SNAPSHOT_SUFFIX)?;
    NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Delete snapshots in `dir` older than the retention window.
///
/// Only files whose names parse as snapshots are considered. Returns the
/// removed paths, sorted.
///
/// # Errors
///
/// Returns [`BootstrapError::Io`] if the directory cannot be listed or a
/// file cannot be removed.
pub fn prune(dir: &Path, now: DateTime<Utc>) -> Result<Vec<PathBuf>, BootstrapError> {
    let retention = TimeDelta::days(RETENTION_DAYS);
    let entries = std::fs::read_dir(dir).map_err(BootstrapError::io("failed to list", dir))?;

    let mut pruned = Vec::new();
    for entry in entries {
        let entry = entry.map_err(BootstrapError::io("failed to list", dir))?;
        let name = entry.file_name();
        let Some(taken) = name.to_str().and_then(parse_snapshot_timestamp) else {
            continue;
        };
        if now.signed_duration_since(taken) > retention {
            let path = entry.path();
            std::fs::remove_file(&path).map_err(BootstrapError::io("failed to prune", &path))?;
            debug!(path = %path.display(), "pruned expired snapshot");
            pruned.push(path);
        }
    }
    pruned.sort();
    Ok(pruned)
}

/// Takes snapshots through a running service.
pub struct BackupManager<'a> {
    config: &'a BootstrapConfig,
    service: &'a ServiceController<'a>,
}

impl<'a> BackupManager<'a> {
    #[must_use]
    pub fn new(config: &'a BootstrapConfig, service: &'a ServiceController<'a>) -> Self {
        Self { config, service }
    }

    /// Snapshot, archive, then prune.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::BackupFailed`] if the snapshot command
    /// fails or the snapshot cannot be moved, and [`BootstrapError::Io`] for
    /// directory or pruning failures.
    pub async fn backup(&self, now: DateTime<Utc>) -> Result<BackupRecord, BootstrapError> {
        fsutil::ensure_dir(&self.config.backup_dir)?;

        let file_name = snapshot_file_name(now);
        let args = vec![
            "sqlite3".to_owned(),
            format!("{CONTAINER_DATA_DIR}/{LIVE_DATABASE}"),
            format!(".backup '{CONTAINER_DATA_DIR}/{file_name}'"),
        ];
        info!(snapshot = %file_name, "taking database snapshot");
        self.service
            .exec(&args)
            .await
            .map_err(|e| BootstrapError::BackupFailed {
                reason: e.diagnostic(),
            })?;

        let snapshot_path = self.config.data_dir.join(&file_name);
        let archived_path = self.config.backup_dir.join(&file_name);
        fsutil::relocate(&snapshot_path, &archived_path)
            .and_then(|()| fsutil::restrict_to_owner(&archived_path))
            .map_err(|e| BootstrapError::BackupFailed {
                reason: e.to_string(),
            })?;

        let pruned = prune(&self.config.backup_dir, now)?;
        info!(
            archived = %archived_path.display(),
            pruned = pruned.len(),
            "backup complete"
        );
        Ok(BackupRecord {
            created_at: now,
            snapshot_path,
            archived_path,
            pruned,
        })
    }
}
