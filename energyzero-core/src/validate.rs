//! Validate stage: schema and data-quality checks on a Parquet artifact.
//!
//! Checks, in order:
//! 1. the file exists and reads as Parquet
//! 2. all canonical columns are present
//! 3. the table has at least one row
//! 4. `Price` and `Price_with_VAT` have no missing values (null or NaN)
//! 5. `Price` and `Price_with_VAT` are numeric
//!
//! Validation never writes to the artifact.

use crate::data::parquet::{read_meta, read_parquet};
use crate::error::{EtlError, Result, MAX_EXAMPLES};
use crate::schema::{PriceSchema, NUMERIC_COLUMNS, READING_DATE};
use chrono::DateTime;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Summary of a table that passed validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub path: PathBuf,
    pub rows: usize,
    pub columns: usize,
    pub column_names: Vec<String>,
    pub reading_date_min: Option<String>,
    pub reading_date_max: Option<String>,
    /// Canonical columns stored with a dtype other than the transformer's.
    pub dtype_drift: Vec<String>,
}

/// Validate the Parquet artifact at `path`.
pub fn validate_file(path: &Path) -> Result<ValidationReport> {
    let df = read_parquet(path)?;
    let report = validate_frame(&df, path)?;

    if let Some(meta) = read_meta(path) {
        tracing::info!(
            source = %meta.source.display(),
            source_hash = %meta.source_hash,
            vat_rate = meta.vat_rate,
            "artifact provenance"
        );
    }

    tracing::info!(path = %path.display(), "validation OK");
    tracing::info!("Rows={} Cols={}", report.rows, report.columns);
    tracing::info!(
        "ReadingDate min={} max={}",
        report.reading_date_min.as_deref().unwrap_or("-"),
        report.reading_date_max.as_deref().unwrap_or("-")
    );

    Ok(report)
}

/// Validate an in-memory table; `path` is only used for reporting.
pub fn validate_frame(df: &DataFrame, path: &Path) -> Result<ValidationReport> {
    let column_names: Vec<String> = df
        .get_column_names()
        .into_iter()
        .map(|n| n.to_string())
        .collect();

    let missing = PriceSchema::missing_columns(df);
    if !missing.is_empty() {
        return Err(EtlError::MissingColumns {
            missing,
            found: column_names,
        });
    }

    if df.height() == 0 {
        return Err(EtlError::EmptyTable(path.to_path_buf()));
    }

    for name in NUMERIC_COLUMNS {
        check_numeric_column(df, name)?;
    }

    let (reading_date_min, reading_date_max) = reading_date_range(df)?;

    let dtype_drift = PriceSchema::dtype_drift(df);
    for drift in &dtype_drift {
        tracing::warn!(path = %path.display(), "dtype drift: {drift}");
    }

    Ok(ValidationReport {
        path: path.to_path_buf(),
        rows: df.height(),
        columns: df.width(),
        column_names,
        reading_date_min,
        reading_date_max,
        dtype_drift,
    })
}

fn series<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Series> {
    df.column(name)
        .map(|c| c.as_materialized_series())
        .map_err(|e| EtlError::Parquet(format!("column {name}: {e}")))
}

fn check_numeric_column(df: &DataFrame, name: &str) -> Result<()> {
    let s = series(df, name)?;
    let dtype = s.dtype();

    let mut missing = s.null_count();
    if dtype.is_float() {
        let floats = s
            .cast(&DataType::Float64)
            .map_err(|e| EtlError::Parquet(format!("{name} cast: {e}")))?;
        let ca = floats
            .f64()
            .map_err(|e| EtlError::Parquet(format!("{name} column type: {e}")))?;
        missing += ca.into_iter().flatten().filter(|v| v.is_nan()).count();
    }
    if missing > 0 {
        return Err(EtlError::NullValues {
            column: name.to_string(),
            count: missing,
        });
    }

    if dtype.is_float() || dtype.is_integer() {
        return Ok(());
    }

    let examples = if dtype == &DataType::String {
        let ca = s
            .str()
            .map_err(|e| EtlError::Parquet(format!("{name} column type: {e}")))?;
        ca.into_iter()
            .flatten()
            .filter(|v| !v.trim().parse::<f64>().is_ok_and(f64::is_finite))
            .take(MAX_EXAMPLES)
            .map(str::to_string)
            .collect::<Vec<_>>()
    } else {
        (0..s.len().min(MAX_EXAMPLES))
            .map(|i| {
                s.get(i)
                    .map(|v| v.to_string())
                    .unwrap_or_else(|_| "?".to_string())
            })
            .collect()
    };

    if examples.is_empty() {
        Ok(())
    } else {
        Err(EtlError::NonNumericValues {
            column: name.to_string(),
            examples,
        })
    }
}

/// Min/max of `ReadingDate`, rendered as RFC 3339 for datetime columns.
fn reading_date_range(df: &DataFrame) -> Result<(Option<String>, Option<String>)> {
    let s = series(df, READING_DATE)?;

    if let DataType::Datetime(unit, _) = s.dtype() {
        let unit = *unit;
        let physical = s
            .cast(&DataType::Int64)
            .map_err(|e| EtlError::Parquet(format!("ReadingDate cast: {e}")))?;
        let ca = physical
            .i64()
            .map_err(|e| EtlError::Parquet(format!("ReadingDate column type: {e}")))?;
        let render = |v: i64| {
            let dt = match unit {
                TimeUnit::Milliseconds => DateTime::from_timestamp_millis(v),
                TimeUnit::Microseconds => DateTime::from_timestamp_micros(v),
                TimeUnit::Nanoseconds => Some(DateTime::from_timestamp_nanos(v)),
            };
            dt.map(|d| d.to_rfc3339()).unwrap_or_else(|| v.to_string())
        };
        return Ok((ca.min().map(render), ca.max().map(render)));
    }

    let text = s
        .cast(&DataType::String)
        .map_err(|e| EtlError::Parquet(format!("ReadingDate cast: {e}")))?;
    let ca = text
        .str()
        .map_err(|e| EtlError::Parquet(format!("ReadingDate column type: {e}")))?;
    let values: Vec<&str> = ca.into_iter().flatten().collect();
    Ok((
        values.iter().min().map(|v| v.to_string()),
        values.iter().max().map(|v| v.to_string()),
    ))
}
