//! Subprocess plumbing shared by the process-backed capabilities.

use std::process::{Output, Stdio};

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::CapabilityError;

/// Run `command` to completion, optionally feeding `input` on stdin.
///
/// Success is decided by the exit status alone, never by inspecting output.
/// A non-zero exit becomes [`CapabilityError::Failed`] carrying the captured
/// stderr. `input` is written and then stdin is closed, so tools reading
/// until EOF terminate.
pub(crate) async fn run_captured(
    tool: &str,
    command: &mut Command,
    input: Option<&[u8]>,
) -> Result<Output, CapabilityError> {
    let io_err = |source| CapabilityError::Io {
        tool: tool.to_owned(),
        source,
    };

    command
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(tool, command = ?command.as_std(), "running external command");
    let mut child = command.spawn().map_err(io_err)?;

    if let (Some(bytes), Some(mut stdin)) = (input, child.stdin.take()) {
        // A tool that exits without reading stdin is judged by its exit status.
        match stdin.write_all(bytes).await {
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
            other => other.map_err(io_err)?,
        }
        drop(stdin);
    }

    let output = child.wait_with_output().await.map_err(io_err)?;
    if !output.status.success() {
        return Err(CapabilityError::Failed {
            tool: tool.to_owned(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        });
    }
    Ok(output)
}

/// Decode a tool's stdout as trimmed UTF-8.
pub(crate) fn stdout_text(tool: &str, output: &Output) -> Result<String, CapabilityError> {
    String::from_utf8(output.stdout.clone())
        .map(|s| s.trim().to_owned())
        .map_err(|e| CapabilityError::Output {
            tool: tool.to_owned(),
            reason: format!("stdout is not UTF-8: {e}"),
        })
}
