//! Report store: the single latest report, persisted as JSON
//!
//! One writer (the scan loop), any number of readers. Publishing writes a
//! temporary sibling file and renames it over the target, so a reader sees
//! either the previous report or the new one, never a torn write.

use crate::error::{Result, VigilError};
use crate::models::Report;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info};

/// Smallest step the modification marker is pushed forward by when the
/// filesystem clock did not advance between two publishes
const MARKER_STEP: Duration = Duration::from_millis(1);

/// Durable holder of the latest report
#[derive(Debug, Clone)]
pub struct ReportStore {
    path: PathBuf,
}

impl ReportStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the directory the report lives in
    pub fn prepare(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| VigilError::PersistError {
                    path: self.path.clone(),
                    reason: format!("cannot create {}: {e}", parent.display()),
                })?;
            }
        }
        Ok(())
    }

    /// Atomically replaces the stored report.
    ///
    /// After a successful publish the marker is strictly greater than it was
    /// before. On failure the previous report is left untouched.
    pub fn publish(&self, report: &Report) -> Result<()> {
        let json = serde_json::to_vec_pretty(report)?;
        let tmp = self.temp_path();

        let result = self.write_and_swap(&tmp, &json);
        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result?;

        info!(
            "Report {} saved to {}",
            report.scan_id,
            self.path.display()
        );
        Ok(())
    }

    /// Reads the current report
    pub fn load(&self) -> Result<Report> {
        let content = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(VigilError::ReportNotFound(self.path.clone()));
            }
            Err(e) => return Err(VigilError::IoError(e)),
        };

        serde_json::from_slice(&content).map_err(|e| VigilError::ReportCorrupt {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }

    /// Modification time of the stored report, `None` if there is none
    pub fn marker(&self) -> Option<SystemTime> {
        fs::metadata(&self.path).and_then(|m| m.modified()).ok()
    }

    fn write_and_swap(&self, tmp: &Path, json: &[u8]) -> Result<()> {
        let persist_err = |stage: &str, e: std::io::Error| VigilError::PersistError {
            path: self.path.clone(),
            reason: format!("{stage}: {e}"),
        };

        let previous = self.marker();

        let mut file = File::create(tmp).map_err(|e| persist_err("create temp file", e))?;
        file.write_all(json)
            .map_err(|e| persist_err("write temp file", e))?;
        file.sync_all().map_err(|e| persist_err("sync temp file", e))?;

        if let Some(prev) = previous {
            let written = file
                .metadata()
                .and_then(|m| m.modified())
                .map_err(|e| persist_err("stat temp file", e))?;
            if written <= prev {
                debug!("Filesystem clock did not advance, bumping report marker");
                file.set_modified(prev + MARKER_STEP)
                    .map_err(|e| persist_err("set marker", e))?;
            }
        }
        drop(file);

        fs::rename(tmp, &self.path).map_err(|e| persist_err("rename into place", e))?;
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "report.json".to_string());
        let suffix = &uuid::Uuid::new_v4().simple().to_string()[..8];
        self.path.with_file_name(format!(".{name}.{suffix}.tmp"))
    }
}
