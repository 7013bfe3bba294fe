//! Parquet artifact I/O with atomic writes and a metadata sidecar.
//!
//! Layout per artifact:
//! - `{name}.parquet`: the table
//! - `{name}.parquet.meta.json`: provenance (source hash, counts, VAT rate)
//!
//! The table is written to `{name}.parquet.tmp` and renamed into place.

use crate::error::{EtlError, Result};
use crate::layout::{commit_tmp, ensure_parent, tmp_path, write_atomic};
use chrono::{DateTime, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Provenance sidecar for a transformed artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    pub source: PathBuf,
    /// BLAKE3 hex digest of the raw source bytes.
    pub source_hash: String,
    pub rows: usize,
    pub columns: Vec<String>,
    pub vat_rate: f64,
    pub created_at: DateTime<Utc>,
}

impl ArtifactMeta {
    pub fn new(source: &Path, source_bytes: &[u8], df: &DataFrame, vat_rate: f64) -> Self {
        Self {
            source: source.to_path_buf(),
            source_hash: blake3::hash(source_bytes).to_hex().to_string(),
            rows: df.height(),
            columns: df
                .get_column_names()
                .into_iter()
                .map(|n| n.to_string())
                .collect(),
            vat_rate,
            created_at: Utc::now(),
        }
    }
}

/// Sidecar path for an artifact: `{artifact}.meta.json`.
pub fn meta_path(artifact: &Path) -> PathBuf {
    let mut name = artifact
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".meta.json");
    artifact.with_file_name(name)
}

pub fn write_meta(artifact: &Path, meta: &ArtifactMeta) -> Result<()> {
    let json = serde_json::to_string_pretty(meta)
        .map_err(|e| EtlError::Parquet(format!("meta serialization: {e}")))?;
    write_atomic(&meta_path(artifact), json.as_bytes())
}

/// Read the sidecar for an artifact, if one exists and parses.
pub fn read_meta(artifact: &Path) -> Option<ArtifactMeta> {
    let content = fs::read_to_string(meta_path(artifact)).ok()?;
    serde_json::from_str(&content).ok()
}

/// Write a DataFrame to `path` atomically.
pub fn write_parquet(df: &mut DataFrame, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let tmp = tmp_path(path);

    let file = fs::File::create(&tmp).map_err(|e| EtlError::io(&tmp, e))?;
    if let Err(e) = ParquetWriter::new(file).finish(df) {
        let _ = fs::remove_file(&tmp);
        return Err(EtlError::Parquet(format!("write parquet: {e}")));
    }

    commit_tmp(&tmp, path)
}

/// Read a whole Parquet file into memory.
pub fn read_parquet(path: &Path) -> Result<DataFrame> {
    if !path.is_file() {
        return Err(EtlError::InputNotFound(path.to_path_buf()));
    }
    let file = fs::File::open(path).map_err(|e| EtlError::io(path, e))?;
    ParquetReader::new(file)
        .finish()
        .map_err(|e| EtlError::Parquet(format!("read {}: {e}", path.display())))
}
