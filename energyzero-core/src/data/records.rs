//! Record extraction and column normalization for raw price payloads.
//!
//! Payload shapes seen in the wild:
//! - a bare array of record objects
//! - an object holding that array under one of [`RECORD_KEYS`]
//!
//! Field names also vary (`readingDate` vs `ReadingDate`, `price`/`value`
//! vs `Price`). [`RecordTable::normalize_columns`] maps them onto the
//! canonical names without ever overwriting a canonical column that is
//! already present.

use crate::error::{EtlError, Result};
use crate::schema::{PRICE, READING_DATE};
use serde_json::Value;

/// Keys probed, in priority order, when the payload is an object.
pub const RECORD_KEYS: [&str; 5] = ["Prices", "prices", "data", "results", "items"];

/// Source-name → canonical-name renames, applied in this order.
pub const COLUMN_ALIASES: [(&str, &str); 3] = [
    ("readingDate", READING_DATE),
    ("price", PRICE),
    ("value", PRICE),
];

/// Locate the list of records inside a parsed payload.
pub fn extract_records(payload: &Value) -> Result<&[Value]> {
    match payload {
        Value::Array(records) => Ok(records),
        Value::Object(map) => RECORD_KEYS
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array))
            .map(|records| records.as_slice())
            .ok_or_else(|| {
                let keys: Vec<&str> = map.keys().map(String::as_str).collect();
                EtlError::UnrecognizedPayload(format!("object keys: {keys:?}"))
            }),
        other => Err(EtlError::UnrecognizedPayload(format!(
            "top-level JSON {}",
            json_kind(other)
        ))),
    }
}

/// Number of records if the payload shape is recognized.
pub fn record_count(payload: &Value) -> Option<usize> {
    extract_records(payload).ok().map(<[Value]>::len)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One named column of raw JSON values, one per record.
#[derive(Debug, Clone, PartialEq)]
pub struct RawColumn {
    pub name: String,
    pub values: Vec<Value>,
}

/// Column-oriented view over a list of record objects.
///
/// Columns are the union of all record keys in first-seen order. A record
/// lacking a key contributes `null` to that column.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordTable {
    columns: Vec<RawColumn>,
    rows: usize,
}

impl RecordTable {
    pub fn from_records(records: &[Value]) -> Result<Self> {
        let mut columns: Vec<RawColumn> = Vec::new();

        for (row, record) in records.iter().enumerate() {
            let obj = record.as_object().ok_or_else(|| {
                EtlError::UnrecognizedPayload(format!(
                    "record {row} is a {}, expected an object",
                    json_kind(record)
                ))
            })?;

            for (key, value) in obj {
                match columns.iter_mut().find(|c| c.name == *key) {
                    Some(col) => col.values.push(value.clone()),
                    None => {
                        let mut values = vec![Value::Null; row];
                        values.push(value.clone());
                        columns.push(RawColumn {
                            name: key.clone(),
                            values,
                        });
                    }
                }
            }

            // Pad columns this record did not mention.
            for col in columns.iter_mut() {
                if col.values.len() == row {
                    col.values.push(Value::Null);
                }
            }
        }

        Ok(Self {
            columns,
            rows: records.len(),
        })
    }

    pub fn height(&self) -> usize {
        self.rows
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&RawColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn columns(&self) -> &[RawColumn] {
        &self.columns
    }

    /// Rename `from` to `to` only if `from` exists and `to` does not.
    ///
    /// Returns whether a rename happened.
    pub fn rename_if_absent(&mut self, from: &str, to: &str) -> bool {
        if self.has_column(to) {
            return false;
        }
        match self.columns.iter_mut().find(|c| c.name == from) {
            Some(col) => {
                col.name = to.to_string();
                true
            }
            None => false,
        }
    }

    /// Map source field names onto canonical ones.
    ///
    /// `price` is considered before `value`; once either supplies `Price`,
    /// the other stays a passthrough column.
    pub fn normalize_columns(&mut self) {
        for (from, to) in COLUMN_ALIASES {
            if self.rename_if_absent(from, to) {
                tracing::debug!(from, to, "renamed column");
            }
        }
    }

    /// Fail with the found column list if any of `required` is absent.
    pub fn require_columns(&self, required: &[&str]) -> Result<()> {
        let missing: Vec<String> = required
            .iter()
            .filter(|name| !self.has_column(name))
            .map(|name| name.to_string())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(EtlError::MissingColumns {
                missing,
                found: self.column_names(),
            })
        }
    }
}
