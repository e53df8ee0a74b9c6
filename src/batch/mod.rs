//! Sequential batch running with progress and cooperative cancellation.
//!
//! A [`BatchRunner`] drives an async per-item operation over an ordered list
//! of work items, one at a time, with a fixed delay between items to respect
//! upstream rate limits. Per-item failures are recorded and the run
//! continues; cancellation is cooperative: the token is checked once at the
//! top of each iteration, so an item already in flight always finishes.
//!
//! The per-item operation will typically use the
//! [`Dispatcher`](crate::dispatch::Dispatcher) internally, but the runner is
//! agnostic to what the operation does.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::counter;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{KeyfallError, Result};

pub mod types;

pub use types::{
    BatchId, BatchOutcome, BatchProgress, BatchReport, BatchSnapshot, BatchState, ItemFailure,
};

/// Configuration for a batch runner.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Fixed delay between consecutive items (not before the first, not
    /// after the last). Chosen per use case to respect upstream rate
    /// limits; 3 and 5 seconds are typical values.
    pub inter_item_delay: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            inter_item_delay: Duration::from_millis(3000),
        }
    }
}

/// Runs batches of work items sequentially with observable progress.
///
/// At most one batch may be running per runner instance; a second concurrent
/// [`run`](BatchRunner::run) call fails with
/// [`KeyfallError::BatchAlreadyRunning`]. The runner itself holds no work;
/// items and the per-item operation are supplied per run.
///
/// # Example
/// ```ignore
/// let runner = Arc::new(BatchRunner::new(BatchConfig::default()));
/// let cancel = CancellationToken::new();
/// let report = runner
///     .run(ids, |id| generate_explanation(id), |p| render(p), cancel.clone())
///     .await?;
/// ```
#[derive(Debug)]
pub struct BatchRunner {
    config: BatchConfig,
    status: Arc<Mutex<BatchSnapshot>>,
}

impl BatchRunner {
    /// Create a runner with the given configuration.
    pub fn new(config: BatchConfig) -> Self {
        Self {
            config,
            status: Arc::new(Mutex::new(BatchSnapshot::default())),
        }
    }

    /// Current state and progress, for rendering "k of n" in a UI.
    ///
    /// Returns `Idle` with progress `(0, 0)` whenever no batch is running,
    /// including immediately after completion or cancellation.
    pub fn snapshot(&self) -> BatchSnapshot {
        *self.status.lock()
    }

    /// Process `items` in order, invoking `op` for each.
    ///
    /// - `on_progress` fires synchronously after each item (success or
    ///   failure), before the inter-item delay, with strictly increasing
    ///   `current` from 1 to the number of items processed.
    /// - A failing item is recorded in the report and the run continues
    ///   with the next item.
    /// - If `cancel` is observed cancelled at the top of an iteration, no
    ///   further item starts and the run ends with
    ///   [`BatchOutcome::Cancelled`]. Already-processed items are not
    ///   rolled back.
    ///
    /// # Errors
    /// - [`KeyfallError::EmptyBatch`] if `items` is empty
    /// - [`KeyfallError::BatchAlreadyRunning`] if a run is in progress
    pub async fn run<T, F, Fut, P>(
        &self,
        items: Vec<T>,
        mut op: F,
        mut on_progress: P,
        cancel: CancellationToken,
    ) -> Result<BatchReport<T>>
    where
        T: Clone,
        F: FnMut(T) -> Fut,
        Fut: Future<Output = Result<()>>,
        P: FnMut(BatchProgress),
    {
        if items.is_empty() {
            return Err(KeyfallError::EmptyBatch);
        }

        let total = items.len();

        // Claim the runner. The guard resets the snapshot on every exit
        // path, including the run future being dropped mid-run (e.g. the
        // host wrapping it in a timeout or select).
        {
            let mut status = self.status.lock();
            if status.state == BatchState::Running {
                return Err(KeyfallError::BatchAlreadyRunning);
            }
            *status = BatchSnapshot {
                state: BatchState::Running,
                progress: BatchProgress { current: 0, total },
            };
        }
        let _guard = RunGuard {
            status: self.status.clone(),
        };

        let batch_id = BatchId::new();
        let started_at = Utc::now();
        tracing::info!(batch_id = %batch_id, total, "Batch started");

        let mut failures = Vec::new();
        let mut processed = 0usize;
        let mut cancelled = false;
        let last_index = total - 1;

        for (index, item) in items.into_iter().enumerate() {
            // Cooperative cancellation: checked once per iteration, at the
            // top. An in-flight item always finishes.
            if cancel.is_cancelled() {
                cancelled = true;
                tracing::info!(
                    batch_id = %batch_id,
                    processed,
                    total,
                    "Batch cancelled before next item"
                );
                break;
            }

            match op(item.clone()).await {
                Ok(()) => {
                    counter!("keyfall_batch_items_total", "outcome" => "ok").increment(1);
                    tracing::debug!(batch_id = %batch_id, index, "Batch item succeeded");
                }
                Err(e) => {
                    counter!("keyfall_batch_items_total", "outcome" => "failed").increment(1);
                    tracing::warn!(
                        batch_id = %batch_id,
                        index,
                        error = %e,
                        "Batch item failed, continuing with next item"
                    );
                    failures.push(ItemFailure {
                        index,
                        item,
                        error: e.to_string(),
                    });
                }
            }

            processed = index + 1;
            let progress = BatchProgress {
                current: processed,
                total,
            };
            self.status.lock().progress = progress;
            on_progress(progress);

            if index < last_index {
                // Cancellation during the delay just cuts the wait short;
                // the top-of-loop check decides whether to stop.
                tokio::select! {
                    _ = tokio::time::sleep(self.config.inter_item_delay) => {}
                    _ = cancel.cancelled() => {}
                }
            }
        }

        let outcome = if cancelled {
            BatchOutcome::Cancelled
        } else {
            BatchOutcome::Completed
        };
        tracing::info!(
            batch_id = %batch_id,
            ?outcome,
            processed,
            total,
            failed = failures.len(),
            "Batch finished"
        );

        Ok(BatchReport {
            batch_id,
            outcome,
            processed,
            total,
            failures,
            started_at,
            finished_at: Utc::now(),
        })
    }
}

/// Guard that resets the runner's observable state when dropped.
///
/// This hides the progress indicator on normal completion and keeps the
/// runner claimable even if the run future is dropped mid-run.
struct RunGuard {
    status: Arc<Mutex<BatchSnapshot>>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        *self.status.lock() = BatchSnapshot::default();
    }
}
