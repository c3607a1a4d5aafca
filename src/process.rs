//! Process management module
//!
//! Handles PID file management

use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Process management utilities
pub struct ProcessManager;

impl ProcessManager {
    /// Write PID file
    pub fn write_pid_file(pid_path: &str) -> Result<PathBuf> {
        let path = Path::new(pid_path);

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create PID file directory: {parent:?}"))?;
        }

        let pid = std::process::id();

        let mut file =
            fs::File::create(path).with_context(|| format!("Failed to create PID file: {path:?}"))?;

        writeln!(file, "{pid}").with_context(|| format!("Failed to write PID to file: {path:?}"))?;

        info!("PID file written: {:?} (PID: {})", path, pid);
        Ok(path.to_path_buf())
    }

    /// Remove PID file
    pub fn remove_pid_file(path: &Path) {
        if let Err(e) = fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove PID file {:?}: {}", path, e);
            }
        } else {
            info!("PID file removed: {:?}", path);
        }
    }
}

/// Guard to ensure PID file is removed on drop
pub struct PidFileGuard {
    path: PathBuf,
}

impl PidFileGuard {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl Drop for PidFileGuard {
    fn drop(&mut self) {
        ProcessManager::remove_pid_file(&self.path);
    }
}
