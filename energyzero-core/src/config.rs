//! Pipeline configuration, stored as TOML.
//!
//! Every field has a default so an empty file (or no file at all) yields a
//! working configuration. CLI flags are applied on top by the binary.

use crate::error::{EtlError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://api.energyzero.nl/v1/energyprices";
pub const DEFAULT_USER_AGENT: &str = "energyzero-etl/1.0";
pub const DEFAULT_VAT_RATE: f64 = 0.21;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub api: ApiConfig,
    pub paths: PathsConfig,
    pub transform: TransformConfig,
    pub schedule: ScheduleConfig,
}

/// Price API request settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    /// How many days back from today the request window starts.
    pub days: u32,
    pub interval: u32,
    pub usage_type: u32,
    /// Ask the API for VAT-inclusive prices.
    pub incl_btw: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 30,
            days: 7,
            interval: 4,
            usage_type: 1,
            incl_btw: false,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root holding `raw/` and `processed/`.
    pub data_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    /// VAT rate as a fraction, e.g. 0.21 for 21%.
    pub vat_rate: f64,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            vat_rate: DEFAULT_VAT_RATE,
        }
    }
}

/// Retry and timeout policy for the `run` command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Extra attempts per stage after the first failure.
    pub retries: u32,
    pub retry_delay_secs: u64,
    /// Wall-clock budget for a whole run.
    pub run_timeout_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            retries: 2,
            retry_delay_secs: 300,
            run_timeout_secs: 30 * 60,
        }
    }
}

impl PipelineConfig {
    /// Load a configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| EtlError::io(path, e))?;
        Self::from_toml(&content)
    }

    /// Parse a configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| EtlError::Config(format!("parse pipeline TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| EtlError::Config(format!("serialize pipeline config: {e}")))
    }

    /// Reject settings no stage can run with.
    pub fn validate(&self) -> Result<()> {
        validate_vat_rate(self.transform.vat_rate)?;
        if self.api.timeout_secs == 0 {
            return Err(EtlError::Config("api.timeout_secs must be > 0".into()));
        }
        if self.api.days == 0 {
            return Err(EtlError::Config("api.days must be > 0".into()));
        }
        if self.api.base_url.trim().is_empty() {
            return Err(EtlError::Config("api.base_url must not be empty".into()));
        }
        if self.schedule.run_timeout_secs == 0 {
            return Err(EtlError::Config("schedule.run_timeout_secs must be > 0".into()));
        }
        Ok(())
    }
}

pub fn validate_vat_rate(vat_rate: f64) -> Result<()> {
    if !vat_rate.is_finite() || vat_rate < 0.0 {
        return Err(EtlError::Config(format!(
            "vat rate must be a finite fraction >= 0, got {vat_rate}"
        )));
    }
    Ok(())
}
