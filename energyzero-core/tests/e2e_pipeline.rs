//! End-to-end tests: fixture payload → transform → validate, and the full
//! runner driven by a stub provider.

use chrono::{TimeZone, Utc};
use energyzero_core::data::provider::{PriceProvider, PriceQuery};
use energyzero_core::data::read_meta;
use energyzero_core::pipeline::{run_pipeline, Stage};
use energyzero_core::transform::transform_file;
use energyzero_core::validate::validate_file;
use energyzero_core::{EtlError, PipelineConfig, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/energy_3.json")
}

fn fixture_payload() -> Value {
    serde_json::from_str(&std::fs::read_to_string(fixture_path()).unwrap()).unwrap()
}

/// Serves the fixture, failing the first `failures` calls.
struct FixtureProvider {
    failures: u32,
    calls: AtomicU32,
}

impl FixtureProvider {
    fn new(failures: u32) -> Self {
        Self {
            failures,
            calls: AtomicU32::new(0),
        }
    }
}

impl PriceProvider for FixtureProvider {
    fn name(&self) -> &str {
        "fixture"
    }

    fn fetch(&self, _query: &PriceQuery) -> Result<Value> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            return Err(EtlError::Http {
                status: 502,
                url: "http://fixture".into(),
            });
        }
        Ok(fixture_payload())
    }
}

fn test_config(data_dir: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.paths.data_dir = data_dir.to_path_buf();
    config.schedule.retry_delay_secs = 0;
    config
}

#[test]
fn fixture_transforms_and_validates() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("processed/energy_test.parquet");

    let outcome = transform_file(&fixture_path(), &output, 0.21).unwrap();
    assert_eq!(outcome.rows, 3);
    assert!(output.exists());

    let report = validate_file(&output).unwrap();
    assert_eq!(report.rows, 3);
    assert_eq!(
        &report.column_names[..5],
        &["ReadingDate", "Date", "Time", "Price", "Price_with_VAT"]
    );
    assert_eq!(
        report.reading_date_min.as_deref(),
        Some("2026-01-01T00:00:00+00:00")
    );
    assert_eq!(
        report.reading_date_max.as_deref(),
        Some("2026-01-01T02:00:00+00:00")
    );

    let meta = read_meta(&output).unwrap();
    assert_eq!(meta.rows, 3);
    assert_eq!(meta.source, fixture_path());
}

#[test]
fn transformed_prices_carry_vat() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.parquet");
    transform_file(&fixture_path(), &output, 0.21).unwrap();

    let df = energyzero_core::data::read_parquet(&output).unwrap();
    let price = df.column("Price").unwrap().f64().unwrap();
    let with_vat = df.column("Price_with_VAT").unwrap().f64().unwrap();
    for i in 0..df.height() {
        let p = price.get(i).unwrap();
        assert_eq!(with_vat.get(i), Some(p * (1.0 + 0.21)));
    }

    let times = df.column("Time").unwrap().str().unwrap();
    assert_eq!(times.get(2), Some("02:00:00"));
}

#[test]
fn unparseable_reading_date_fails_transform() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("bad.json");
    std::fs::write(
        &input,
        r#"[{"readingDate": "2026-01-01T00:00:00Z", "price": 1},
            {"readingDate": "not-a-date", "price": 2}]"#,
    )
    .unwrap();
    let output = dir.path().join("bad.parquet");

    let err = transform_file(&input, &output, 0.21).unwrap_err();
    assert!(matches!(err, EtlError::UnparseableTimestamps { .. }));
    assert!(err.to_string().contains("not-a-date"));
    assert!(!output.exists());
}

#[test]
fn runner_chains_stages_with_run_tag_paths() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let provider = FixtureProvider::new(0);
    let now = Utc.with_ymd_and_hms(2026, 1, 8, 6, 0, 0).unwrap();

    let summary = run_pipeline(
        &config,
        &provider,
        "scheduled__2026-01-08T06:00:00+00:00",
        now,
    )
    .unwrap();

    assert_eq!(summary.run_tag, "scheduled__2026-01-08T0600000000");
    assert_eq!(
        summary.raw_path(),
        dir.path().join("raw/energy_scheduled__2026-01-08T0600000000.json")
    );
    assert_eq!(
        summary.processed_path(),
        dir.path()
            .join("processed/energy_scheduled__2026-01-08T0600000000.parquet")
    );
    assert_eq!(summary.report.rows, 3);
    assert_eq!(summary.extract.record_count, Some(3));
    assert!(summary.attempts.iter().all(|(_, n)| *n == 1));
    assert!(!dir.path().join(".pipeline.lock").exists());
}

#[test]
fn runner_retries_flaky_extract() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let provider = FixtureProvider::new(2);

    let summary = run_pipeline(&config, &provider, "manual__retry", Utc::now()).unwrap();

    assert_eq!(summary.attempts[0], (Stage::Extract, 3));
    assert_eq!(summary.report.rows, 3);
}

#[test]
fn runner_fails_once_retries_are_exhausted() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.schedule.retries = 1;
    let provider = FixtureProvider::new(5);

    let err = run_pipeline(&config, &provider, "manual__fail", Utc::now()).unwrap_err();

    assert!(matches!(err, EtlError::Http { status: 502, .. }));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    assert!(!dir.path().join("processed").exists());
    assert!(!dir.path().join(".pipeline.lock").exists());
}

#[test]
fn runner_refuses_to_overlap_an_active_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    std::fs::write(dir.path().join(".pipeline.lock"), "other-run").unwrap();

    let err = run_pipeline(&config, &FixtureProvider::new(0), "manual__b", Utc::now())
        .unwrap_err();

    assert!(matches!(err, EtlError::RunInProgress(_)));
    assert!(dir.path().join(".pipeline.lock").exists());
}

#[test]
fn runner_rejects_out_of_range_lookback() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.api.days = 200_000_000;
    let provider = FixtureProvider::new(0);

    let err = run_pipeline(&config, &provider, "manual__far", Utc::now()).unwrap_err();

    assert!(matches!(err, EtlError::Config(_)));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    assert!(!dir.path().join(".pipeline.lock").exists());
}
