//! External synchronisation hook.

use crate::error::{BoardError, BoardResult};
use std::path::Path;
use std::process::Command;
use tracing::{info, warn};

/// Runs an external tool (e.g. `vdirsyncer sync`) against a source directory.
#[derive(Debug, Clone)]
pub struct SyncHook {
    command: Vec<String>,
}

impl SyncHook {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }

    /// Run the tool with `dir` as working directory. A non-zero exit is
    /// `SYNC_FAILED`; nothing is retried.
    pub fn run(&self, dir: &Path) -> BoardResult<()> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| BoardError::sync_failed("no sync command configured"))?;

        info!(command = ?self.command, dir = %dir.display(), "running sync");
        let output = Command::new(program)
            .args(args)
            .current_dir(dir)
            .output()
            .map_err(|e| BoardError::sync_failed(format!("could not start {}: {}", program, e)))?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        warn!(status = %output.status, "sync failed");
        let err = BoardError::sync_failed(format!("{} exited with {}", program, output.status));
        Err(if stderr.is_empty() {
            err
        } else {
            err.with_details(stderr)
        })
    }
}
