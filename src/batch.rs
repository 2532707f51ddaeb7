//! Resumable batch driver.
//!
//! [`run`] walks a list of [`TargetItem`]s one at a time and hands each to an
//! [`ItemOperation`]. The ledger decides what is skipped on resume, transient
//! failures are retried with a linear backoff, permanent failures are recorded
//! and the run moves on, and an authorization failure stops everything. The
//! ledger is flushed after every item so an interrupted run can resume.

use std::thread;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::api::Resource;
use crate::error::{ApiError, LedgerError};
use crate::ledger::{Ledger, LedgerFile};
use crate::ui::Progress;

/// One unit of work, fixed for the duration of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetItem {
    pub identifier: String,
    pub desired_name: String,
    pub desired_slug: String,
    pub payload: Option<Value>,
}

impl TargetItem {
    pub fn new(identifier: impl Into<String>) -> Self {
        let identifier = identifier.into();
        Self {
            desired_name: identifier.clone(),
            desired_slug: identifier.clone(),
            identifier,
            payload: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>, slug: impl Into<String>) -> Self {
        self.desired_name = name.into();
        self.desired_slug = slug.into();
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Item keyed by an existing resource, carrying its current definition.
    pub fn for_resource(resource: &Resource) -> Self {
        let item = Self::new(resource.key()).named(resource.name.clone(), resource.key());
        match snapshot(resource.key(), resource) {
            Some(payload) => item.with_payload(payload),
            None => item,
        }
    }
}

/// JSON copy of a definition; an item without one still runs, it just has
/// nothing to fall back on if the resource vanishes.
fn snapshot<T: Serialize>(key: &str, definition: &T) -> Option<Value> {
    match serde_json::to_value(definition) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(resource = key, error = %err, "cannot snapshot resource definition");
            None
        }
    }
}

/// Retry bound for transient failures. `max_attempts` counts the first try.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Pause after the `attempt`-th failure (1-based): linear backoff.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Report intended actions only; no remote writes, no ledger writes.
    pub dry_run: bool,
    /// Skip items already recorded as fixed.
    pub resume: bool,
    /// Attempt at most this many items. Resume skips do not count.
    pub limit: Option<usize>,
    /// Pause between successive mutating items.
    pub delay: Duration,
    pub retry: RetryPolicy,
    /// Draw a progress bar on the terminal.
    pub progress: bool,
}

/// Result of one successful `execute`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Done(String),
    /// Nothing to do for this item; not recorded in the ledger.
    Skipped(String),
}

#[derive(Debug, Error)]
pub enum ItemError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("gave up after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: ApiError,
    },
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("{0}")]
    Invalid(String),
}

impl ItemError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Api(err) if err.is_retryable())
    }

    /// Errors that stop the run: bad credentials, or a ledger that can no
    /// longer be written.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Api(err) => err.is_fatal(),
            Self::Ledger(_) => true,
            Self::RetriesExhausted { .. } | Self::Invalid(_) => false,
        }
    }
}

/// What a batch command does to one item.
pub trait ItemOperation {
    fn name(&self) -> &'static str;

    /// Whether `execute` writes to a remote service; writes are throttled.
    fn mutating(&self) -> bool {
        true
    }

    /// Human-readable actions `execute` would take, for dry runs.
    fn plan(&self, item: &TargetItem, ledger: &Ledger) -> Vec<String>;

    /// Process one item. The ledger is passed so operations with
    /// intermediate states can persist them before continuing.
    fn execute(&mut self, item: &TargetItem, ledger: &mut LedgerFile)
        -> Result<Outcome, ItemError>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Summary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub planned: usize,
    /// Identifiers handed to `execute`, in order.
    pub attempted: Vec<String>,
    /// `(identifier, reason)` for every failed item.
    pub failures: Vec<(String, String)>,
}

impl Summary {
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("run aborted at {identifier}: {source}")]
    Aborted {
        identifier: String,
        #[source]
        source: ItemError,
        summary: Summary,
    },
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Process `items` in order with `op`, recording outcomes in `ledger`.
pub fn run<O>(
    items: &[TargetItem],
    op: &mut O,
    ledger: &mut LedgerFile,
    options: &BatchOptions,
) -> Result<Summary, BatchError>
where
    O: ItemOperation + ?Sized,
{
    let mut summary = Summary {
        total: items.len(),
        ..Summary::default()
    };
    if !options.dry_run {
        ledger.begin_run()?;
    }

    let progress = Progress::new(items.len() as u64, options.progress, op.name());
    let mut attempted = 0usize;
    let mut wrote_before = false;

    for item in items {
        let id = item.identifier.as_str();

        if options.resume && ledger.ledger().is_fixed(id) {
            summary.skipped += 1;
            progress.line(format!("  {id}: skipped (already done)"));
            progress.inc();
            continue;
        }
        if options.limit.is_some_and(|limit| attempted >= limit) {
            info!(limit = attempted, "limit reached");
            break;
        }
        attempted += 1;

        if options.dry_run {
            for action in op.plan(item, ledger.ledger()) {
                progress.line(format!("  [DRY RUN] {id}: {action}"));
            }
            summary.planned += 1;
            progress.inc();
            continue;
        }

        if op.mutating() && wrote_before && !options.delay.is_zero() {
            thread::sleep(options.delay);
        }
        wrote_before = op.mutating();
        summary.attempted.push(id.to_string());

        let result = execute_with_retry(op, item, ledger, &options.retry);
        let recorded = match result {
            Ok(Outcome::Done(detail)) => {
                progress.line(format!("  {id}: ok ({detail})"));
                summary.succeeded += 1;
                ledger.record_success(id)
            }
            Ok(Outcome::Skipped(reason)) => {
                progress.line(format!("  {id}: skipped ({reason})"));
                summary.skipped += 1;
                Ok(())
            }
            Err(err) if err.is_fatal() => {
                progress.line(format!("  {id}: FATAL ({err})"));
                progress.finish();
                return Err(BatchError::Aborted {
                    identifier: id.to_string(),
                    source: err,
                    summary,
                });
            }
            Err(err) => {
                let reason = err.to_string();
                progress.line(format!("  {id}: failed ({reason})"));
                summary.failed += 1;
                summary.failures.push((id.to_string(), reason.clone()));
                ledger.record_failure(id, &reason)
            }
        };
        if let Err(err) = recorded {
            progress.finish();
            return Err(BatchError::Aborted {
                identifier: id.to_string(),
                source: ItemError::Ledger(err),
                summary,
            });
        }
        progress.inc();
    }

    progress.finish();
    Ok(summary)
}

fn execute_with_retry<O>(
    op: &mut O,
    item: &TargetItem,
    ledger: &mut LedgerFile,
    retry: &RetryPolicy,
) -> Result<Outcome, ItemError>
where
    O: ItemOperation + ?Sized,
{
    let mut attempt = 1;
    loop {
        match op.execute(item, ledger) {
            Err(ItemError::Api(err)) if err.is_retryable() => {
                if attempt >= retry.max_attempts {
                    return Err(ItemError::RetriesExhausted {
                        attempts: attempt,
                        source: err,
                    });
                }
                let delay = retry.delay_for_attempt(attempt);
                warn!(item = %item.identifier, attempt, error = %err, ?delay, "transient failure, retrying");
                thread::sleep(delay);
                attempt += 1;
            }
            other => return other,
        }
    }
}
