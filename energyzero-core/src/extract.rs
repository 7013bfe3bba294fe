//! Extract stage: fetch one price payload and persist it as raw JSON.

use crate::data::provider::{PriceProvider, PriceQuery};
use crate::data::records::record_count;
use crate::error::{EtlError, Result};
use crate::layout::write_atomic;
use std::path::{Path, PathBuf};

/// What the extract stage wrote.
#[derive(Debug, Clone)]
pub struct ExtractOutcome {
    pub path: PathBuf,
    /// `None` when the payload shape is not one the transformer recognizes.
    pub record_count: Option<usize>,
}

/// Fetch `query` from `provider` and write the payload to `output`.
pub fn extract_to_file(
    provider: &dyn PriceProvider,
    query: &PriceQuery,
    output: &Path,
) -> Result<ExtractOutcome> {
    tracing::info!(
        provider = provider.name(),
        from = %query.from_date(),
        till = %query.till_date(),
        "fetching prices"
    );

    let payload = provider.fetch(query)?;
    save_payload(&payload, output)?;

    let count = record_count(&payload);
    tracing::info!(path = %output.display(), "saved raw payload");
    match count {
        Some(n) => tracing::info!(records = n, "payload records"),
        None => tracing::warn!("payload shape not recognized; transform will reject it"),
    }

    Ok(ExtractOutcome {
        path: output.to_path_buf(),
        record_count: count,
    })
}

/// Pretty-print `payload` as UTF-8 JSON and write it atomically.
pub fn save_payload(payload: &serde_json::Value, output: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(payload).map_err(|e| EtlError::Json {
        path: output.to_path_buf(),
        reason: e.to_string(),
    })?;
    write_atomic(output, json.as_bytes())
}
