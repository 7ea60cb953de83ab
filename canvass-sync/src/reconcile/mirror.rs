//! Mirror Reconciler
//!
//! Re-appends submissions whose spreadsheet markers are still unset. A
//! submission counts as succeeded only when every applicable mirror is done.

use super::{release_all, ReconcileReport, Reconciler};
use crate::error::SyncResult;
use crate::sheets::MirrorWriter;
use async_trait::async_trait;
use canvass_common::time::now;
use canvass_common::{Lease, MirrorSheet, Submission, SubmissionStore};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct MirrorReconciler {
    store: Arc<SubmissionStore>,
    mirror: Arc<MirrorWriter>,
    batch_size: u32,
    lease: Duration,
}

impl MirrorReconciler {
    pub fn new(store: Arc<SubmissionStore>, mirror: Arc<MirrorWriter>, batch_size: u32, lease: Duration) -> Self {
        Self {
            store,
            mirror,
            batch_size,
            lease,
        }
    }

    /// Sheets this submission still has to be appended to
    fn pending_sheets(submission: &Submission) -> Vec<MirrorSheet> {
        let mut sheets = Vec::with_capacity(2);
        if submission.markers.all_mirror_written_at.is_none() {
            sheets.push(MirrorSheet::AllOperators);
        }
        if submission.includes_fs() && submission.markers.fs_mirror_written_at.is_none() {
            sheets.push(MirrorSheet::Fs);
        }
        sheets
    }

    async fn process(&self, batch: &[Submission], shutdown: &CancellationToken) -> ReconcileReport {
        let mut report = ReconcileReport {
            selected: batch.len(),
            ..Default::default()
        };

        for submission in batch {
            if shutdown.is_cancelled() {
                break;
            }

            let sheets = Self::pending_sheets(submission);
            if sheets.is_empty() {
                report.skipped += 1;
                continue;
            }

            let mut failed = false;
            for sheet in sheets {
                if let Err(e) = self.mirror.write(submission, sheet).await {
                    warn!(submission_id = %submission.id, sheet = %sheet, error = %e, "Mirror append retry failed");
                    failed = true;
                }
            }

            if failed {
                report.failed += 1;
            } else {
                report.succeeded += 1;
            }
        }

        report
    }
}

#[async_trait]
impl Reconciler for MirrorReconciler {
    fn name(&self) -> &'static str {
        "mirrors"
    }

    async fn run_once(&self, shutdown: &CancellationToken) -> SyncResult<ReconcileReport> {
        let lease = Lease::new(now(), self.lease)?;
        let batch = self.store.claim_unmirrored(self.batch_size, &lease).await?;
        if batch.is_empty() {
            debug!(reconciler = self.name(), "Nothing to reconcile");
            return Ok(ReconcileReport::default());
        }

        let report = self.process(&batch, shutdown).await;
        release_all(&self.store, &batch, &lease).await;

        info!(reconciler = self.name(), %report, "Reconcile pass complete");
        Ok(report)
    }
}
