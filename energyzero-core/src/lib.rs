//! EnergyZero ETL core: extract, transform and validate energy prices.
//!
//! This crate contains the whole pipeline:
//! - Price API client behind the `PriceProvider` trait
//! - Record extraction and column normalization for varying payload shapes
//! - Canonical Parquet table (`ReadingDate, Date, Time, Price, Price_with_VAT`)
//! - Schema and data-quality validation
//! - Sequential runner with whole-stage retries and a single-run lock

pub mod config;
pub mod data;
pub mod error;
pub mod extract;
pub mod layout;
pub mod pipeline;
pub mod schema;
pub mod transform;
pub mod validate;

pub use config::PipelineConfig;
pub use error::{EtlError, Result};
pub use layout::DataLayout;
pub use pipeline::{run_pipeline, PipelineSummary};
pub use validate::ValidationReport;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: stage outputs can cross thread boundaries.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<EtlError>();
        require_sync::<EtlError>();
        require_send::<PipelineConfig>();
        require_sync::<PipelineConfig>();
        require_send::<ValidationReport>();
        require_sync::<ValidationReport>();
        require_send::<PipelineSummary>();
        require_sync::<PipelineSummary>();
        require_send::<data::EnergyZeroClient>();
        require_sync::<data::EnergyZeroClient>();
        require_send::<data::RecordTable>();
        require_sync::<data::RecordTable>();
    }

    /// Compile-time check: stubs can stand in for the API behind `dyn PriceProvider`.
    #[allow(dead_code)]
    fn assert_provider_object_safe(provider: &dyn data::PriceProvider, query: &data::PriceQuery) {
        let _ = provider.fetch(query);
    }
}
