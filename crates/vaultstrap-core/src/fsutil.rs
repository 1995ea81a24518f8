//! Owner-only file writes and directory helpers.
//!
//! Secret-bearing files are created with mode `0600` at open time, so there
//! is no window in which they exist with wider permissions.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use crate::error::BootstrapError;

/// Create `path` and all parents if missing.
pub(crate) fn ensure_dir(path: &Path) -> Result<(), BootstrapError> {
    if !path.is_dir() {
        fs::create_dir_all(path).map_err(BootstrapError::io("failed to create directory", path))?;
    }
    Ok(())
}

fn private_options() -> OpenOptions {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options
}

fn write_all_synced(mut file: File, contents: &[u8], path: &Path) -> Result<(), BootstrapError> {
    file.write_all(contents)
        .and_then(|()| file.sync_all())
        .map_err(BootstrapError::io("failed to write", path))
}

/// Create a new owner-only file. Fails if `path` already exists.
pub(crate) fn create_private(path: &Path, contents: &[u8]) -> Result<(), BootstrapError> {
    let file = private_options()
        .open(path)
        .map_err(BootstrapError::io("failed to create", path))?;
    write_all_synced(file, contents, path)
}

/// Write an owner-only file, replacing whatever is at `path`.
///
/// The contents go to a sibling temporary file first and are renamed into
/// place, so a crash never leaves a truncated file behind.
pub(crate) fn replace_private(path: &Path, contents: &[u8]) -> Result<(), BootstrapError> {
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    if tmp.exists() {
        fs::remove_file(&tmp).map_err(BootstrapError::io("failed to remove stale", &tmp))?;
    }
    create_private(&tmp, contents)?;
    fs::rename(&tmp, path).map_err(BootstrapError::io("failed to move into place", path))
}

/// Move `from` to `to`.
///
/// Falls back to copy and remove only when the two paths are on different
/// filesystems. Any other rename failure is reported as is.
pub(crate) fn relocate(from: &Path, to: &Path) -> Result<(), BootstrapError> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            fs::copy(from, to).map_err(BootstrapError::io("failed to copy", from))?;
            fs::remove_file(from).map_err(BootstrapError::io("failed to remove", from))
        }
        Err(e) => Err(BootstrapError::io("failed to move", from)(e)),
    }
}

/// Narrow an existing file to owner read and write.
pub(crate) fn restrict_to_owner(path: &Path) -> Result<(), BootstrapError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .map_err(BootstrapError::io("failed to restrict permissions on", path))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}
