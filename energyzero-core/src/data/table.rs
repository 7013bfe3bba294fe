//! Typed conversion of normalized records into a Polars DataFrame.
//!
//! Canonical columns come first in [`CANONICAL_COLUMNS`] order, then every
//! other source column in its original position. Bad timestamps or prices
//! fail the whole table; no row is ever dropped.

use super::records::{RawColumn, RecordTable};
use crate::error::{EtlError, Result, MAX_EXAMPLES};
use crate::schema::{PriceSchema, DATE, PRICE, PRICE_WITH_VAT, READING_DATE, TIME};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike, Utc};
use polars::prelude::*;
use serde_json::Value;

/// Parse one raw `ReadingDate` value as a UTC timestamp.
///
/// Accepts RFC 3339 with an offset (converted to UTC), naive date-times
/// with `T` or space separator (taken as UTC) and bare dates (midnight UTC).
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let raw = value.as_str()?.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Coerce one raw price value to a finite number.
///
/// JSON numbers and numeric strings pass; nulls, booleans, NaN and
/// infinities do not.
pub fn coerce_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Render a raw value for an error message.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Build the output table from normalized records.
///
/// `ReadingDate` and `Price` must already be present (see
/// [`RecordTable::require_columns`]).
pub fn build_price_frame(table: &RecordTable, vat_rate: f64) -> Result<DataFrame> {
    table.require_columns(&[READING_DATE, PRICE])?;

    let timestamps = parse_timestamps(column(table, READING_DATE)?)?;
    let prices = coerce_prices(column(table, PRICE)?)?;
    let vat_factor = 1.0 + vat_rate;
    let prices_with_vat: Vec<f64> = prices.iter().map(|p| p * vat_factor).collect();

    let epoch = DateTime::UNIX_EPOCH.date_naive();
    let millis: Vec<i64> = timestamps.iter().map(|t| t.timestamp_millis()).collect();
    let days: Vec<i32> = timestamps
        .iter()
        .map(|t| (t.date_naive() - epoch).num_days() as i32)
        .collect();
    let times: Vec<String> = timestamps
        .iter()
        .map(|t| format!("{:02}:{:02}:{:02}", t.hour(), t.minute(), t.second()))
        .collect();

    let mut columns = vec![
        Column::new(READING_DATE.into(), millis)
            .cast(&PriceSchema::reading_date_dtype())
            .map_err(|e| EtlError::Parquet(format!("ReadingDate cast: {e}")))?,
        Column::new(DATE.into(), days)
            .cast(&DataType::Date)
            .map_err(|e| EtlError::Parquet(format!("Date cast: {e}")))?,
        Column::new(TIME.into(), times),
        Column::new(PRICE.into(), prices),
        Column::new(PRICE_WITH_VAT.into(), prices_with_vat),
    ];

    for raw in table.columns() {
        if PriceSchema::is_canonical(&raw.name) {
            continue;
        }
        columns.push(passthrough_column(raw));
    }

    DataFrame::new(columns).map_err(|e| EtlError::Parquet(format!("dataframe creation: {e}")))
}

fn column<'a>(table: &'a RecordTable, name: &str) -> Result<&'a RawColumn> {
    table.column(name).ok_or_else(|| EtlError::MissingColumns {
        missing: vec![name.to_string()],
        found: table.column_names(),
    })
}

fn parse_timestamps(raw: &RawColumn) -> Result<Vec<DateTime<Utc>>> {
    let mut parsed = Vec::with_capacity(raw.values.len());
    let mut bad = Vec::new();

    for value in &raw.values {
        match parse_timestamp(value) {
            Some(ts) => parsed.push(ts),
            None => {
                if bad.len() < MAX_EXAMPLES {
                    bad.push(display_value(value));
                }
            }
        }
    }

    if bad.is_empty() {
        Ok(parsed)
    } else {
        Err(EtlError::UnparseableTimestamps {
            column: raw.name.clone(),
            examples: bad,
        })
    }
}

fn coerce_prices(raw: &RawColumn) -> Result<Vec<f64>> {
    let mut prices = Vec::with_capacity(raw.values.len());
    let mut bad = Vec::new();

    for value in &raw.values {
        match coerce_number(value) {
            Some(p) => prices.push(p),
            None => {
                if bad.len() < MAX_EXAMPLES {
                    bad.push(display_value(value));
                }
            }
        }
    }

    if bad.is_empty() {
        Ok(prices)
    } else {
        Err(EtlError::NonNumericValues {
            column: raw.name.clone(),
            examples: bad,
        })
    }
}

/// Dtype inferred for a passthrough column from its non-null values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassthroughKind {
    Boolean,
    Int64,
    Float64,
    Text,
    Json,
}

fn infer_kind(values: &[Value]) -> PassthroughKind {
    let mut kind: Option<PassthroughKind> = None;

    for value in values.iter().filter(|v| !v.is_null()) {
        let this = match value {
            Value::Bool(_) => PassthroughKind::Boolean,
            Value::Number(n) if n.is_i64() => PassthroughKind::Int64,
            Value::Number(_) => PassthroughKind::Float64,
            Value::String(_) => PassthroughKind::Text,
            _ => return PassthroughKind::Json,
        };
        kind = Some(match (kind, this) {
            (None, k) => k,
            (Some(a), b) if a == b => a,
            (Some(PassthroughKind::Int64), PassthroughKind::Float64)
            | (Some(PassthroughKind::Float64), PassthroughKind::Int64) => PassthroughKind::Float64,
            _ => return PassthroughKind::Json,
        });
    }

    kind.unwrap_or(PassthroughKind::Text)
}

fn passthrough_column(raw: &RawColumn) -> Column {
    let name: PlSmallStr = raw.name.as_str().into();
    let values = &raw.values;

    match infer_kind(values) {
        PassthroughKind::Boolean => {
            let v: Vec<Option<bool>> = values.iter().map(Value::as_bool).collect();
            Column::new(name, v)
        }
        PassthroughKind::Int64 => {
            let v: Vec<Option<i64>> = values.iter().map(Value::as_i64).collect();
            Column::new(name, v)
        }
        PassthroughKind::Float64 => {
            let v: Vec<Option<f64>> = values.iter().map(Value::as_f64).collect();
            Column::new(name, v)
        }
        PassthroughKind::Text => {
            let v: Vec<Option<String>> = values
                .iter()
                .map(|v| v.as_str().map(str::to_string))
                .collect();
            Column::new(name, v)
        }
        PassthroughKind::Json => {
            let v: Vec<Option<String>> = values
                .iter()
                .map(|v| (!v.is_null()).then(|| display_value(v)))
                .collect();
            Column::new(name, v)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn table(records: Vec<Value>) -> RecordTable {
        let mut t = RecordTable::from_records(&records).unwrap();
        t.normalize_columns();
        t
    }

    fn names(df: &DataFrame) -> Vec<String> {
        df.get_column_names()
            .into_iter()
            .map(|n| n.to_string())
            .collect()
    }

    #[test]
    fn parses_supported_timestamp_forms() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        for raw in [
            "2024-03-01T12:00:00Z",
            "2024-03-01T13:00:00+01:00",
            "2024-03-01T12:00:00",
            "2024-03-01 12:00:00.000",
        ] {
            assert_eq!(parse_timestamp(&json!(raw)), Some(expected), "{raw}");
        }
        assert_eq!(
            parse_timestamp(&json!("2024-03-01")),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn rejects_garbage_timestamps() {
        assert_eq!(parse_timestamp(&json!("not-a-date")), None);
        assert_eq!(parse_timestamp(&json!(1_700_000_000)), None);
        assert_eq!(parse_timestamp(&Value::Null), None);
    }

    #[test]
    fn coerces_numbers_and_numeric_strings() {
        assert_eq!(coerce_number(&json!(0.25)), Some(0.25));
        assert_eq!(coerce_number(&json!(3)), Some(3.0));
        assert_eq!(coerce_number(&json!(" 1.5 ")), Some(1.5));
        assert_eq!(coerce_number(&json!("abc")), None);
        assert_eq!(coerce_number(&json!("NaN")), None);
        assert_eq!(coerce_number(&json!(true)), None);
        assert_eq!(coerce_number(&Value::Null), None);
    }

    #[test]
    fn vat_is_applied_exactly() {
        let t = table(vec![json!({"readingDate": "2024-01-01T00:00:00Z", "price": 100})]);
        let df = build_price_frame(&t, 0.21).unwrap();
        let with_vat = df.column(PRICE_WITH_VAT).unwrap().f64().unwrap();
        assert_eq!(with_vat.get(0), Some(121.0));
    }

    #[test]
    fn date_and_time_come_from_parsed_utc_timestamp() {
        let t = table(vec![json!({"readingDate": "2024-01-01T00:30:05+01:00", "price": 1})]);
        let df = build_price_frame(&t, 0.0).unwrap();

        let dates = df.column(DATE).unwrap().date().unwrap();
        let expected_days = (NaiveDate::from_ymd_opt(2023, 12, 31).unwrap()
            - NaiveDate::from_ymd_opt(1970, 1, 1).unwrap())
        .num_days() as i32;
        assert_eq!(dates.get(0), Some(expected_days));

        let times = df.column(TIME).unwrap().str().unwrap();
        assert_eq!(times.get(0), Some("23:30:05"));
    }

    #[test]
    fn canonical_columns_first_then_passthrough_in_order() {
        let t = table(vec![json!({
            "zone": "NL",
            "readingDate": "2024-01-01T00:00:00Z",
            "Date": "stale",
            "price": 0.1,
            "flag": true,
        })]);
        let df = build_price_frame(&t, 0.21).unwrap();
        assert_eq!(
            names(&df),
            vec!["ReadingDate", "Date", "Time", "Price", "Price_with_VAT", "zone", "flag"]
        );
        assert_eq!(df.column("flag").unwrap().dtype(), &DataType::Boolean);
        assert_eq!(df.column(DATE).unwrap().dtype(), &DataType::Date);
    }

    #[test]
    fn unparseable_timestamp_fails_with_examples() {
        let t = table(vec![
            json!({"readingDate": "2024-01-01T00:00:00Z", "price": 1}),
            json!({"readingDate": "not-a-date", "price": 2}),
        ]);
        match build_price_frame(&t, 0.21) {
            Err(EtlError::UnparseableTimestamps { examples, .. }) => {
                assert_eq!(examples, vec!["not-a-date"]);
            }
            other => panic!("expected UnparseableTimestamps, got {other:?}"),
        }
    }

    #[test]
    fn examples_are_capped_at_five() {
        let records: Vec<Value> = (0..8)
            .map(|i| json!({"readingDate": "2024-01-01T00:00:00Z", "price": format!("bad{i}")}))
            .collect();
        match build_price_frame(&table(records), 0.21) {
            Err(EtlError::NonNumericValues { column, examples }) => {
                assert_eq!(column, "Price");
                assert_eq!(examples.len(), MAX_EXAMPLES);
                assert_eq!(examples[0], "bad0");
            }
            other => panic!("expected NonNumericValues, got {other:?}"),
        }
    }

    #[test]
    fn null_price_fails_coercion() {
        let t = table(vec![json!({"readingDate": "2024-01-01T00:00:00Z", "price": null})]);
        assert!(matches!(
            build_price_frame(&t, 0.21),
            Err(EtlError::NonNumericValues { .. })
        ));
    }

    #[test]
    fn passthrough_kinds_are_inferred() {
        assert_eq!(infer_kind(&[json!(1), Value::Null, json!(2)]), PassthroughKind::Int64);
        assert_eq!(infer_kind(&[json!(1), json!(2.5)]), PassthroughKind::Float64);
        assert_eq!(infer_kind(&[json!("a"), json!(1)]), PassthroughKind::Json);
        assert_eq!(infer_kind(&[json!({"k": 1})]), PassthroughKind::Json);
        assert_eq!(infer_kind(&[Value::Null]), PassthroughKind::Text);
    }

    #[test]
    fn nested_passthrough_is_stored_as_json_text() {
        let t = table(vec![json!({
            "readingDate": "2024-01-01T00:00:00Z",
            "price": 1,
            "meta": {"source": "api"},
        })]);
        let df = build_price_frame(&t, 0.21).unwrap();
        let meta = df.column("meta").unwrap().str().unwrap();
        assert_eq!(meta.get(0), Some(r#"{"source":"api"}"#));
    }
}
