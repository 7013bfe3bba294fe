//! Canonical column contract for transformed price tables.

use polars::prelude::*;

pub const READING_DATE: &str = "ReadingDate";
pub const DATE: &str = "Date";
pub const TIME: &str = "Time";
pub const PRICE: &str = "Price";
pub const PRICE_WITH_VAT: &str = "Price_with_VAT";

/// The five canonical columns, in output order.
pub const CANONICAL_COLUMNS: [&str; 5] = [READING_DATE, DATE, TIME, PRICE, PRICE_WITH_VAT];

/// Columns that must carry fully numeric, non-null values.
pub const NUMERIC_COLUMNS: [&str; 2] = [PRICE, PRICE_WITH_VAT];

/// Expected schema for transformed price tables.
pub struct PriceSchema;

impl PriceSchema {
    /// Physical dtypes of the canonical columns as the transformer writes them.
    pub fn schema() -> Schema {
        Schema::from_iter(vec![
            Field::new(READING_DATE.into(), Self::reading_date_dtype()),
            Field::new(DATE.into(), DataType::Date),
            Field::new(TIME.into(), DataType::String),
            Field::new(PRICE.into(), DataType::Float64),
            Field::new(PRICE_WITH_VAT.into(), DataType::Float64),
        ])
    }

    pub fn reading_date_dtype() -> DataType {
        DataType::Datetime(TimeUnit::Milliseconds, Some("UTC".into()))
    }

    /// Canonical columns absent from `df`, in canonical order.
    pub fn missing_columns(df: &DataFrame) -> Vec<String> {
        let actual = df.schema();
        CANONICAL_COLUMNS
            .iter()
            .filter(|name| !actual.contains(name))
            .map(|name| name.to_string())
            .collect()
    }

    /// Canonical columns whose dtype differs from [`PriceSchema::schema`],
    /// as `name: expected X, found Y`. Absent columns are skipped.
    pub fn dtype_drift(df: &DataFrame) -> Vec<String> {
        Self::schema()
            .iter()
            .filter_map(|(name, expected)| {
                let actual = df.column(name.as_str()).ok()?.dtype();
                (actual != expected).then(|| format!("{name}: expected {expected}, found {actual}"))
            })
            .collect()
    }

    /// True if `name` is one of the five canonical columns.
    pub fn is_canonical(name: &str) -> bool {
        CANONICAL_COLUMNS.contains(&name)
    }
}
