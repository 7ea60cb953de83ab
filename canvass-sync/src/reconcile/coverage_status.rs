//! Coverage-Status Reconciler
//!
//! Polls the coverage service for registered submissions whose check is still
//! open. A terminal result marks the submission finished and is written back
//! to its status-sheet row.
//!
//! Rows come from the store's row index. Only when some submission in the
//! batch is missing from the index is the sheet's identifier column read, once
//! per pass; if that read fails the whole pass is aborted. A submission whose
//! row cannot be found is still marked finished and its backfill is skipped.

use super::{release_all, ReconcileReport, Reconciler};
use crate::coverage::CoverageApi;
use crate::error::SyncResult;
use crate::sheets::MirrorWriter;
use async_trait::async_trait;
use canvass_common::time::now;
use canvass_common::{Lease, Submission, SubmissionStore};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillOutcome {
    Written { row: u32 },
    /// The submission has no row in the status sheet yet
    RowNotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverageResolution {
    /// Result not final yet; the submission stays selected
    Pending,
    Resolved(BackfillOutcome),
}

pub struct CoverageStatusReconciler {
    store: Arc<SubmissionStore>,
    api: Arc<dyn CoverageApi>,
    mirror: Arc<MirrorWriter>,
    batch_size: u32,
    lease: Duration,
}

impl CoverageStatusReconciler {
    pub fn new(
        store: Arc<SubmissionStore>,
        api: Arc<dyn CoverageApi>,
        mirror: Arc<MirrorWriter>,
        batch_size: u32,
        lease: Duration,
    ) -> Self {
        Self {
            store,
            api,
            mirror,
            batch_size,
            lease,
        }
    }

    /// Status-sheet rows for the batch: index first, bulk read for the rest
    async fn resolve_rows(&self, batch: &[Submission]) -> SyncResult<HashMap<Uuid, u32>> {
        let mut rows = HashMap::with_capacity(batch.len());
        let mut unindexed = Vec::new();

        for submission in batch {
            match self.mirror.indexed_status_row(submission.id).await? {
                Some(row) => {
                    rows.insert(submission.id, row);
                }
                None => unindexed.push(submission.id),
            }
        }

        if unindexed.is_empty() {
            return Ok(rows);
        }

        let lookup = self.mirror.lookup_rows().await?;
        for id in unindexed {
            if let Some(row) = lookup.row(id) {
                rows.insert(id, row);
                if let Err(e) = self.mirror.remember_status_row(id, row).await {
                    warn!(submission_id = %id, row, error = %e, "Failed to index status row");
                }
            }
        }

        Ok(rows)
    }

    /// Query one submission's result and apply it
    pub async fn resolve(&self, submission: &Submission, row: Option<u32>) -> SyncResult<CoverageResolution> {
        let Some(correlation_id) = submission.markers.coverage_bot_id.as_deref() else {
            return Ok(CoverageResolution::Pending);
        };

        let status = self.api.status(correlation_id).await?;
        if !status.is_terminal() {
            debug!(submission_id = %submission.id, correlation_id, ?status, "Coverage check still pending");
            return Ok(CoverageResolution::Pending);
        }

        self.store.mark_coverage_finished(submission.id).await?;
        info!(
            submission_id = %submission.id,
            covered = ?status.is_covered,
            homepassed_id = ?status.homepassed_id,
            "Coverage check resolved"
        );

        let Some(row) = row else {
            debug!(submission_id = %submission.id, "Submission not in status sheet; backfill skipped");
            return Ok(CoverageResolution::Resolved(BackfillOutcome::RowNotFound));
        };

        self.mirror.write_status(row, status.status_cells()).await?;
        Ok(CoverageResolution::Resolved(BackfillOutcome::Written { row }))
    }

    async fn process(
        &self,
        batch: &[Submission],
        rows: &HashMap<Uuid, u32>,
        shutdown: &CancellationToken,
    ) -> ReconcileReport {
        let mut report = ReconcileReport {
            selected: batch.len(),
            ..Default::default()
        };

        for submission in batch {
            if shutdown.is_cancelled() {
                break;
            }
            match self.resolve(submission, rows.get(&submission.id).copied()).await {
                Ok(CoverageResolution::Resolved(_)) => report.succeeded += 1,
                Ok(CoverageResolution::Pending) => report.skipped += 1,
                Err(e) => {
                    warn!(submission_id = %submission.id, error = %e, "Coverage status check failed");
                    report.failed += 1;
                }
            }
        }

        report
    }
}

#[async_trait]
impl Reconciler for CoverageStatusReconciler {
    fn name(&self) -> &'static str {
        "coverage-status"
    }

    async fn run_once(&self, shutdown: &CancellationToken) -> SyncResult<ReconcileReport> {
        let lease = Lease::new(now(), self.lease)?;
        let batch = self.store.claim_unresolved(self.batch_size, &lease).await?;
        if batch.is_empty() {
            debug!(reconciler = self.name(), "Nothing to reconcile");
            return Ok(ReconcileReport::default());
        }

        let rows = match self.resolve_rows(&batch).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(reconciler = self.name(), error = %e, "Status row lookup failed; pass aborted");
                release_all(&self.store, &batch, &lease).await;
                return Err(e);
            }
        };

        let report = self.process(&batch, &rows, shutdown).await;
        release_all(&self.store, &batch, &lease).await;

        info!(reconciler = self.name(), %report, "Reconcile pass complete");
        Ok(report)
    }
}
