//! Pipeline runner: extract → transform → validate with explicit path handoff.
//!
//! One run owns a lock file for its whole duration, so two runs never share
//! a data directory. Each stage is retried as a whole, a bounded number of
//! times with a fixed delay, and the run as a whole has a wall-clock budget.

use crate::config::PipelineConfig;
use crate::data::provider::{PriceProvider, PriceQuery};
use crate::error::{EtlError, Result};
use crate::extract::{extract_to_file, ExtractOutcome};
use crate::layout::{ensure_parent, run_tag, DataLayout};
use crate::transform::{transform_file, TransformOutcome};
use crate::validate::{validate_file, ValidationReport};
use chrono::{DateTime, Utc};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extract,
    Transform,
    Validate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Extract => "extract",
            Stage::Transform => "transform",
            Stage::Validate => "validate",
        };
        f.write_str(name)
    }
}

/// Exclusive marker for an active run. Removed on drop.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Create the lock file, failing if another run already holds it.
    pub fn acquire(path: &Path, run_id: &str) -> Result<Self> {
        ensure_parent(path)?;
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => EtlError::RunInProgress(path.to_path_buf()),
                _ => EtlError::io(path, e),
            })?;
        writeln!(file, "{run_id} pid={}", std::process::id()).map_err(|e| EtlError::io(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release run lock");
        }
    }
}

/// Wall-clock budget for one run.
#[derive(Debug, Clone, Copy)]
pub struct RunBudget {
    started: Instant,
    limit: Duration,
}

impl RunBudget {
    pub fn new(limit: Duration) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.limit.saturating_sub(self.started.elapsed())
    }

    /// Fail with `Timeout` once the budget is spent.
    pub fn check(&self, stage: Stage) -> Result<()> {
        if self.remaining().is_zero() {
            return Err(EtlError::Timeout {
                stage: stage.to_string(),
                budget_secs: self.limit.as_secs(),
            });
        }
        Ok(())
    }
}

/// Whole-stage retry policy.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            retries: config.schedule.retries,
            delay: Duration::from_secs(config.schedule.retry_delay_secs),
        }
    }
}

/// Run `attempt` until it succeeds or the policy/budget is exhausted.
///
/// Returns the value and the number of attempts used.
pub fn with_retries<T>(
    stage: Stage,
    policy: &RetryPolicy,
    budget: &RunBudget,
    mut attempt: impl FnMut() -> Result<T>,
) -> Result<(T, u32)> {
    let mut attempts = 0;
    loop {
        budget.check(stage)?;
        attempts += 1;

        match attempt() {
            Ok(value) => return Ok((value, attempts)),
            Err(e) if attempts <= policy.retries => {
                tracing::warn!(%stage, attempt = attempts, error = %e, "stage failed; retrying");
                if budget.remaining() <= policy.delay {
                    return Err(EtlError::Timeout {
                        stage: stage.to_string(),
                        budget_secs: budget.limit.as_secs(),
                    });
                }
                std::thread::sleep(policy.delay);
            }
            Err(e) => {
                tracing::error!(%stage, attempts, error = %e, "stage failed");
                return Err(e);
            }
        }
    }
}

/// Everything a successful run produced.
#[derive(Debug, Clone)]
pub struct PipelineSummary {
    pub run_id: String,
    pub run_tag: String,
    pub extract: ExtractOutcome,
    pub transform: TransformOutcome,
    pub report: ValidationReport,
    pub attempts: Vec<(Stage, u32)>,
}

impl PipelineSummary {
    pub fn raw_path(&self) -> &Path {
        &self.extract.path
    }

    pub fn processed_path(&self) -> &Path {
        &self.transform.output
    }
}

/// Run all three stages for `run_id`.
pub fn run_pipeline(
    config: &PipelineConfig,
    provider: &dyn PriceProvider,
    run_id: &str,
    now: DateTime<Utc>,
) -> Result<PipelineSummary> {
    config.validate()?;

    let layout = DataLayout::new(&config.paths.data_dir);
    let _lock = RunLock::acquire(&layout.lock_path(), run_id)?;

    let tag = run_tag(run_id);
    let raw_path = layout.run_raw_path(&tag);
    let processed_path = layout.run_processed_path(&tag);
    let query = PriceQuery::from_config(&config.api, now)?;
    let vat_rate = config.transform.vat_rate;

    let policy = RetryPolicy::from_config(config);
    let budget = RunBudget::new(Duration::from_secs(config.schedule.run_timeout_secs));

    tracing::info!(run_id, run_tag = %tag, "pipeline run started");

    let (extract, extract_attempts) = with_retries(Stage::Extract, &policy, &budget, || {
        extract_to_file(provider, &query, &raw_path)
    })?;
    let (transform, transform_attempts) = with_retries(Stage::Transform, &policy, &budget, || {
        transform_file(&raw_path, &processed_path, vat_rate)
    })?;
    let (report, validate_attempts) = with_retries(Stage::Validate, &policy, &budget, || {
        validate_file(&processed_path)
    })?;

    tracing::info!(run_id, rows = report.rows, "pipeline run succeeded");

    Ok(PipelineSummary {
        run_id: run_id.to_string(),
        run_tag: tag,
        extract,
        transform,
        report,
        attempts: vec![
            (Stage::Extract, extract_attempts),
            (Stage::Transform, transform_attempts),
            (Stage::Validate, validate_attempts),
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn no_delay(retries: u32) -> RetryPolicy {
        RetryPolicy {
            retries,
            delay: Duration::ZERO,
        }
    }

    #[test]
    fn retries_until_success() {
        let calls = Cell::new(0);
        let budget = RunBudget::new(Duration::from_secs(60));

        let (value, attempts) = with_retries(Stage::Extract, &no_delay(2), &budget, || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(EtlError::Network("flaky".into()))
            } else {
                Ok(42)
            }
        })
        .unwrap();

        assert_eq!(value, 42);
        assert_eq!(attempts, 3);
    }

    #[test]
    fn gives_up_after_retries_with_last_error() {
        let calls = Cell::new(0);
        let budget = RunBudget::new(Duration::from_secs(60));

        let err = with_retries(Stage::Transform, &no_delay(2), &budget, || -> Result<()> {
            calls.set(calls.get() + 1);
            Err(EtlError::Http {
                status: 503,
                url: "http://x".into(),
            })
        })
        .unwrap_err();

        assert_eq!(calls.get(), 3);
        assert!(matches!(err, EtlError::Http { status: 503, .. }));
    }

    #[test]
    fn spent_budget_stops_before_first_attempt() {
        let budget = RunBudget::new(Duration::ZERO);
        let err = with_retries(Stage::Validate, &no_delay(2), &budget, || Ok(())).unwrap_err();
        assert!(matches!(err, EtlError::Timeout { .. }));
        assert!(err.to_string().contains("validate"));
    }

    #[test]
    fn retry_delay_longer_than_budget_times_out() {
        let budget = RunBudget::new(Duration::from_secs(60));
        let policy = RetryPolicy {
            retries: 1,
            delay: Duration::from_secs(3600),
        };
        let err = with_retries(Stage::Extract, &policy, &budget, || -> Result<()> {
            Err(EtlError::Network("down".into()))
        })
        .unwrap_err();
        assert!(matches!(err, EtlError::Timeout { .. }));
    }

    #[test]
    fn lock_is_exclusive_and_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".pipeline.lock");

        let lock = RunLock::acquire(&path, "run-a").unwrap();
        assert!(matches!(
            RunLock::acquire(&path, "run-b"),
            Err(EtlError::RunInProgress(_))
        ));

        drop(lock);
        assert!(!path.exists());
        assert!(RunLock::acquire(&path, "run-c").is_ok());
    }
}
