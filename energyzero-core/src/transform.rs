//! Transform stage: raw JSON payload → canonical Parquet table.
//!
//! Steps: resolve input, parse JSON, locate records, normalize column
//! names, build the typed table, write it atomically, confirm the file
//! landed, then write the provenance sidecar.

use crate::config::validate_vat_rate;
use crate::data::parquet::{write_meta, write_parquet, ArtifactMeta};
use crate::data::records::{extract_records, RecordTable};
use crate::data::table::build_price_frame;
use crate::error::{EtlError, Result};
use crate::layout::DataLayout;
use crate::schema::{PRICE, READING_DATE};
use polars::prelude::DataFrame;
use std::fs;
use std::path::{Path, PathBuf};

/// What the transform stage wrote.
#[derive(Debug, Clone)]
pub struct TransformOutcome {
    pub source: PathBuf,
    pub output: PathBuf,
    pub rows: usize,
    pub columns: usize,
}

/// Pick the input file: the explicit path, or the newest raw JSON file.
pub fn resolve_input(explicit: Option<&Path>, layout: &DataLayout) -> Result<PathBuf> {
    match explicit {
        Some(path) => {
            if !path.is_file() {
                return Err(EtlError::InputNotFound(path.to_path_buf()));
            }
            Ok(path.to_path_buf())
        }
        None => {
            let latest = layout.latest_raw_file()?;
            tracing::warn!(
                path = %latest.display(),
                "no --input given; using most recently modified raw file"
            );
            Ok(latest)
        }
    }
}

/// Normalize a parsed payload into the canonical table.
pub fn transform_payload(payload: &serde_json::Value, vat_rate: f64) -> Result<DataFrame> {
    validate_vat_rate(vat_rate)?;

    let records = extract_records(payload)?;
    let mut table = RecordTable::from_records(records)?;
    table.normalize_columns();
    table.require_columns(&[READING_DATE, PRICE])?;

    build_price_frame(&table, vat_rate)
}

/// Run the transform stage from `input` to `output`.
pub fn transform_file(input: &Path, output: &Path, vat_rate: f64) -> Result<TransformOutcome> {
    let bytes = fs::read(input).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => EtlError::InputNotFound(input.to_path_buf()),
        _ => EtlError::io(input, e),
    })?;
    let payload: serde_json::Value = serde_json::from_slice(&bytes).map_err(|e| EtlError::Json {
        path: input.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut df = transform_payload(&payload, vat_rate)?;
    write_parquet(&mut df, output)?;

    if !output.is_file() {
        return Err(EtlError::OutputMissing(output.to_path_buf()));
    }

    let meta = ArtifactMeta::new(input, &bytes, &df, vat_rate);
    if let Err(e) = write_meta(output, &meta) {
        tracing::warn!(path = %output.display(), error = %e, "could not write provenance sidecar");
    }

    tracing::info!(path = %input.display(), "source JSON");
    tracing::info!(path = %output.display(), "saved parquet");
    tracing::info!("Rows={} Cols={}", df.height(), df.width());

    Ok(TransformOutcome {
        source: input.to_path_buf(),
        output: output.to_path_buf(),
        rows: df.height(),
        columns: df.width(),
    })
}
