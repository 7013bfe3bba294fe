//! Price provider trait and request parameters.
//!
//! The PriceProvider trait abstracts over the price API so the pipeline can
//! be driven by a stub in tests. Providers return the raw JSON payload
//! untouched; shaping happens in the transform stage.

use crate::config::ApiConfig;
use crate::error::{EtlError, Result};
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// One price request: a calendar-day window plus API codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuery {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub interval: u32,
    pub usage_type: u32,
    pub incl_btw: bool,
}

impl PriceQuery {
    /// Window spanning `[now - days, now]` in UTC calendar days.
    ///
    /// Fails with `Config` when the start date falls outside chrono's range.
    pub fn lookback(
        now: DateTime<Utc>,
        days: u32,
        interval: u32,
        usage_type: u32,
        incl_btw: bool,
    ) -> Result<Self> {
        let start = TimeDelta::try_days(i64::from(days))
            .and_then(|span| now.checked_sub_signed(span))
            .ok_or_else(|| {
                EtlError::Config(format!("lookback of {days} days is out of the date range"))
            })?;

        Ok(Self {
            start: start.date_naive(),
            end: now.date_naive(),
            interval,
            usage_type,
            incl_btw,
        })
    }

    /// Lookback query using the window and codes from the API config.
    pub fn from_config(api: &ApiConfig, now: DateTime<Utc>) -> Result<Self> {
        Self::lookback(now, api.days, api.interval, api.usage_type, api.incl_btw)
    }

    /// Start of the first day, e.g. `2026-01-01T00:00:00.000Z`.
    pub fn from_date(&self) -> String {
        format!("{}T00:00:00.000Z", self.start.format("%Y-%m-%d"))
    }

    /// Last millisecond of the final day, e.g. `2026-01-08T23:59:59.999Z`.
    pub fn till_date(&self) -> String {
        format!("{}T23:59:59.999Z", self.end.format("%Y-%m-%d"))
    }

    /// Query-string parameters in the order the API documents them.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("fromDate", self.from_date()),
            ("tillDate", self.till_date()),
            ("interval", self.interval.to_string()),
            ("usageType", self.usage_type.to_string()),
            ("inclBtw", if self.incl_btw { "true" } else { "false" }.to_string()),
        ]
    }
}

/// Trait for price sources.
pub trait PriceProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch the raw JSON payload for a query.
    fn fetch(&self, query: &PriceQuery) -> Result<serde_json::Value>;
}
