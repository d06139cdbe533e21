//! Scratch workspace housekeeping: clearing the scheduler work directory,
//! per-job staging directories and per-pool log files.

use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::DispatchError;

const DISCARD_LOG: &str = "/dev/null";

/// Outcome of clearing a directory. Failures are informational.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ClearReport {
    pub removed: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
    pub preserved: Vec<PathBuf>,
}

impl ClearReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Remove every entry of `dir` except those named in `preserve`.
///
/// A missing directory counts as already clear. Entries that cannot be
/// removed are logged and recorded, never returned as errors.
pub async fn clear_directory(dir: &Path, preserve: &[String]) -> ClearReport {
    let mut report = ClearReport::default();

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("{} does not exist, nothing to clear", dir.display());
            return report;
        }
        Err(e) => {
            warn!("Error listing {}: {}", dir.display(), e);
            report.failed.push((dir.to_path_buf(), e.to_string()));
            return report;
        }
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!("Error reading entry in {}: {}", dir.display(), e);
                report.failed.push((dir.to_path_buf(), e.to_string()));
                break;
            }
        };

        let path = entry.path();
        let name = entry.file_name();
        if preserve.iter().any(|keep| name.to_str() == Some(keep.as_str())) {
            report.preserved.push(path);
            continue;
        }

        let is_dir = entry
            .file_type()
            .await
            .map(|t| t.is_dir())
            .unwrap_or(false);
        let removal = if is_dir {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };

        match removal {
            Ok(()) => {
                debug!("Removed: {}", path.display());
                report.removed.push(path);
            }
            Err(e) => {
                warn!("Error removing {}: {}", path.display(), e);
                report.failed.push((path, e.to_string()));
            }
        }
    }

    if report.removed.is_empty() && report.failed.is_empty() {
        info!("No items to remove, {} is already clean", dir.display());
    } else {
        info!(
            "Cleared {}: {} removed, {} failed, {} preserved",
            dir.display(),
            report.removed.len(),
            report.failed.len(),
            report.preserved.len()
        );
    }
    report
}

/// Pure: `run.log` for pool `bigmem` becomes `run_bigmem.log`.
pub fn log_path_for_pool(log: &Path, pool: &str) -> PathBuf {
    let stem = log
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match log.extension() {
        Some(ext) => format!("{stem}_{pool}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{pool}"),
    };
    log.with_file_name(name)
}

/// Resolve and truncate the log file for one pool.
pub async fn prepare_log(log: Option<&Path>, pool: &str) -> Result<PathBuf, DispatchError> {
    let Some(log) = log else {
        warn!("No log file path provided. Redirecting to {}", DISCARD_LOG);
        return Ok(PathBuf::from(DISCARD_LOG));
    };

    let path = log_path_for_pool(log, pool);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| DispatchError::io(parent, source))?;
    }
    tokio::fs::File::create(&path)
        .await
        .map_err(|source| DispatchError::io(&path, source))?;
    info!("Log file set to {}", path.display());
    Ok(path)
}

/// Staging directory for one scheduler run: `<scratch>/job-XXXXXXXX/`.
#[derive(Debug)]
pub struct JobDir {
    path: PathBuf,
    keep: bool,
}

impl JobDir {
    pub async fn create(scratch: &Path, keep: bool) -> Result<Self, DispatchError> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let path = scratch.join(format!("job-{}", &id[..8]));
        tokio::fs::create_dir_all(path.join("elements"))
            .await
            .map_err(|source| DispatchError::io(&path, source))?;
        debug!("Created job directory {}", path.display());
        Ok(Self { path, keep })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn function_script(&self) -> PathBuf {
        self.path.join("function.py")
    }

    pub fn elements_dir(&self) -> PathBuf {
        self.path.join("elements")
    }

    pub fn workflow_script(&self) -> PathBuf {
        self.path.join("run_function.nf")
    }

    /// Remove the directory unless it was created with `keep`.
    pub async fn finish(self) {
        if self.keep {
            info!("Keeping job directory {}", self.path.display());
            return;
        }
        if let Err(e) = tokio::fs::remove_dir_all(&self.path).await {
            warn!("Error removing {}: {}", self.path.display(), e);
        }
    }
}
