//! Batch lifecycle types.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Unique identifier for a batch run, used in logs and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct BatchId(pub Uuid);

impl BatchId {
    /// Generate a fresh batch ID.
    pub fn new() -> Self {
        BatchId(Uuid::new_v4())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for BatchId {
    fn from(uuid: Uuid) -> Self {
        BatchId(uuid)
    }
}

impl std::ops::Deref for BatchId {
    type Target = Uuid;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Display only first 8 characters for readability in logs
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Observable lifecycle state of a batch runner.
///
/// The snapshot returns to `Idle` as soon as a run ends, whether it
/// completed or was cancelled, so a UI can hide its progress indicator.
/// The terminal outcome of a run is carried by [`BatchOutcome`] in the
/// [`BatchReport`], not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    Idle,
    Running,
}

/// How a batch run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOutcome {
    /// Every item was processed (some may have failed individually).
    Completed,
    /// Cancellation was observed before all items were processed.
    Cancelled,
}

/// Progress counters for a running batch: "current of total".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchProgress {
    /// Items processed so far (success or failure).
    pub current: usize,
    /// Total items in the batch, fixed at start.
    pub total: usize,
}

/// Point-in-time view of a runner's state and progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchSnapshot {
    pub state: BatchState,
    pub progress: BatchProgress,
}

impl Default for BatchSnapshot {
    fn default() -> Self {
        Self {
            state: BatchState::Idle,
            progress: BatchProgress::default(),
        }
    }
}

/// A recorded per-item failure. Item failures never abort the batch; they
/// accumulate here for the caller to surface.
#[derive(Debug, Clone, Serialize)]
pub struct ItemFailure<T> {
    /// 0-based position of the item in the input list.
    pub index: usize,
    /// The item that failed.
    pub item: T,
    /// Rendered error from the per-item operation.
    pub error: String,
}

/// Final report for one batch run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport<T> {
    pub batch_id: BatchId,
    pub outcome: BatchOutcome,
    /// Items actually processed (equals `total` on Completed).
    pub processed: usize,
    /// Total items in the input list.
    pub total: usize,
    /// Per-item failures, in processing order.
    pub failures: Vec<ItemFailure<T>>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl<T> BatchReport<T> {
    /// True when the run processed every item without being cancelled.
    pub fn is_complete(&self) -> bool {
        self.outcome == BatchOutcome::Completed
    }

    /// Number of items that succeeded.
    pub fn succeeded(&self) -> usize {
        self.processed - self.failures.len()
    }
}
