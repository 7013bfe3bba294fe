//! EnergyZero price API client.
//!
//! Issues a single GET per query. No retries happen here: a failed fetch
//! fails the extract stage, and the pipeline runner decides whether the
//! whole stage is attempted again.

use super::provider::{PriceProvider, PriceQuery};
use crate::config::ApiConfig;
use crate::error::{EtlError, Result};

/// EnergyZero price provider.
pub struct EnergyZeroClient {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl EnergyZeroClient {
    pub fn new(api: &ApiConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(api.timeout())
            .user_agent(api.user_agent.as_str())
            .build()
            .map_err(|e| EtlError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: api.base_url.clone(),
        })
    }
}

impl PriceProvider for EnergyZeroClient {
    fn name(&self) -> &str {
        "energyzero"
    }

    fn fetch(&self, query: &PriceQuery) -> Result<serde_json::Value> {
        tracing::debug!(
            url = %self.base_url,
            from = %query.from_date(),
            till = %query.till_date(),
            "requesting prices"
        );

        let resp = self
            .client
            .get(&self.base_url)
            .query(&query.query_pairs())
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    EtlError::Network(format!("request timed out: {e}"))
                } else {
                    EtlError::Network(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(EtlError::Http {
                status: status.as_u16(),
                url: resp.url().to_string(),
            });
        }

        let body = resp
            .text()
            .map_err(|e| EtlError::Network(format!("failed to read response body: {e}")))?;

        serde_json::from_str(&body)
            .map_err(|e| EtlError::ResponseFormat(format!("response is not valid JSON: {e}")))
    }
}
