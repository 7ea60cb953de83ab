//! Reconcilers
//!
//! Periodic passes that close the gaps the ingestion fan-out left behind. The
//! store's marker columns are the work queue: each pass claims a bounded batch
//! under a lease, works through it one submission at a time, and releases
//! every claimed row at the end, whether the pass completed or aborted.

pub mod coverage_status;
pub mod mirror;
pub mod scheduler;
pub mod unregistered;

pub use coverage_status::{BackfillOutcome, CoverageResolution, CoverageStatusReconciler};
pub use mirror::MirrorReconciler;
pub use scheduler::Scheduler;
pub use unregistered::UnregisteredReconciler;

use crate::error::SyncResult;
use async_trait::async_trait;
use canvass_common::{Lease, Submission, SubmissionStore};
use serde::Serialize;
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Counts from one reconciler pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub selected: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl fmt::Display for ReconcileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "selected={} succeeded={} failed={} skipped={}",
            self.selected, self.succeeded, self.failed, self.skipped
        )
    }
}

#[async_trait]
pub trait Reconciler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run one pass. An `Err` means the pass was aborted as a whole; per-submission
    /// failures are counted in the report instead. A cancelled `shutdown` stops
    /// the pass before the next submission.
    async fn run_once(&self, shutdown: &CancellationToken) -> SyncResult<ReconcileReport>;
}

/// Release `lease` on every claimed submission
pub(crate) async fn release_all(store: &SubmissionStore, batch: &[Submission], lease: &Lease) {
    for submission in batch {
        if let Err(e) = store.release(submission.id, lease).await {
            warn!(submission_id = %submission.id, error = %e, "Failed to release claim");
        }
    }
}
