//! On-disk layout for pipeline artifacts.
//!
//! Layout: `{data_dir}/raw/*.json` for API payloads and
//! `{data_dir}/processed/*.parquet` for transformed tables. Directories are
//! created on demand.
//!
//! All writes go through [`write_atomic`]: write to `{name}.tmp`, then
//! rename into place, so a downstream stage never sees a half-written file.

use crate::error::{EtlError, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Resolved artifact directories for one data root.
#[derive(Debug, Clone)]
pub struct DataLayout {
    data_dir: PathBuf,
}

impl DataLayout {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.data_dir.join("raw")
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.data_dir.join("processed")
    }

    /// `{raw}/energy_YYYYMMDD_HHMMSS.json`
    pub fn timestamped_raw_path(&self, now: DateTime<Utc>) -> PathBuf {
        self.raw_dir()
            .join(format!("energy_{}.json", now.format("%Y%m%d_%H%M%S")))
    }

    /// `{processed}/energy_transformed_YYYYMMDD_HHMMSS.parquet`
    pub fn timestamped_processed_path(&self, now: DateTime<Utc>) -> PathBuf {
        self.processed_dir().join(format!(
            "energy_transformed_{}.parquet",
            now.format("%Y%m%d_%H%M%S")
        ))
    }

    /// `{raw}/energy_{tag}.json` for a scheduled run.
    pub fn run_raw_path(&self, run_tag: &str) -> PathBuf {
        self.raw_dir().join(format!("energy_{run_tag}.json"))
    }

    /// `{processed}/energy_{tag}.parquet` for a scheduled run.
    pub fn run_processed_path(&self, run_tag: &str) -> PathBuf {
        self.processed_dir().join(format!("energy_{run_tag}.parquet"))
    }

    /// Lock file guarding against overlapping pipeline runs.
    pub fn lock_path(&self) -> PathBuf {
        self.data_dir.join(".pipeline.lock")
    }

    /// Most recently modified `*.json` file in the raw directory.
    ///
    /// Degraded mode only: a file still being written by another process can
    /// be picked up. Stages chained by the pipeline pass explicit paths.
    pub fn latest_raw_file(&self) -> Result<PathBuf> {
        latest_json_file(&self.raw_dir())
    }
}

/// Most recently modified `*.json` file directly inside `dir`.
pub fn latest_json_file(dir: &Path) -> Result<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(EtlError::NoRawFiles(dir.to_path_buf()))
        }
        Err(e) => return Err(EtlError::io(dir, e)),
    };

    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for entry in entries {
        let entry = entry.map_err(|e| EtlError::io(dir, e))?;
        let path = entry.path();

        if path.extension().and_then(|e| e.to_str()) != Some("json") || !path.is_file() {
            continue;
        }

        let modified = entry
            .metadata()
            .and_then(|m| m.modified())
            .map_err(|e| EtlError::io(&path, e))?;

        let is_newer = match &newest {
            None => true,
            Some((best, best_path)) => modified > *best || (modified == *best && path > *best_path),
        };
        if is_newer {
            newest = Some((modified, path));
        }
    }

    newest
        .map(|(_, path)| path)
        .ok_or_else(|| EtlError::NoRawFiles(dir.to_path_buf()))
}

/// Turn a scheduler run id into a filename-safe tag.
///
/// Drops `:`, `+` and `.`, which appear in ISO timestamps embedded in run ids.
pub fn run_tag(run_id: &str) -> String {
    run_id
        .chars()
        .filter(|c| !matches!(c, ':' | '+' | '.'))
        .map(|c| if c == '/' || c == '\\' || c.is_whitespace() { '_' } else { c })
        .collect()
}

/// Default run id for manually triggered runs.
pub fn manual_run_id(now: DateTime<Utc>) -> String {
    format!("manual__{}", now.to_rfc3339())
}

/// Create the parent directory of `path` if it has one.
pub fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| EtlError::io(parent, e))?;
        }
    }
    Ok(())
}

/// Temp sibling used while `path` is being written.
pub fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `bytes` to `path` via a temp file and rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    ensure_parent(path)?;
    let tmp = tmp_path(path);
    fs::write(&tmp, bytes).map_err(|e| EtlError::io(&tmp, e))?;
    commit_tmp(&tmp, path)
}

/// Rename a finished temp file into place, cleaning up on failure.
pub fn commit_tmp(tmp: &Path, path: &Path) -> Result<()> {
    fs::rename(tmp, path).map_err(|e| {
        let _ = fs::remove_file(tmp);
        EtlError::io(path, e)
    })
}
