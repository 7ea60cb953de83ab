//! Unregistered-Submission Reconciler
//!
//! Retries coverage registration for FS submissions that have no correlation
//! id yet. Drives only `unregistered -> registered`.

use super::{release_all, ReconcileReport, Reconciler};
use crate::coverage::registrar::RegistrationOutcome;
use crate::coverage::CoverageRegistrar;
use crate::error::SyncResult;
use async_trait::async_trait;
use canvass_common::time::now;
use canvass_common::{Lease, Submission, SubmissionStore};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct UnregisteredReconciler {
    store: Arc<SubmissionStore>,
    registrar: Arc<CoverageRegistrar>,
    batch_size: u32,
    lease: Duration,
}

impl UnregisteredReconciler {
    pub fn new(
        store: Arc<SubmissionStore>,
        registrar: Arc<CoverageRegistrar>,
        batch_size: u32,
        lease: Duration,
    ) -> Self {
        Self {
            store,
            registrar,
            batch_size,
            lease,
        }
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
            match self.registrar.register(submission).await {
                Ok(RegistrationOutcome::Registered(_)) => report.succeeded += 1,
                Ok(RegistrationOutcome::AlreadyRegistered) => {
                    debug!(submission_id = %submission.id, "Already registered");
                    report.skipped += 1;
                }
                Err(e) => {
                    warn!(submission_id = %submission.id, error = %e, "Coverage registration retry failed");
                    report.failed += 1;
                }
            }
        }

        report
    }
}

#[async_trait]
impl Reconciler for UnregisteredReconciler {
    fn name(&self) -> &'static str {
        "unregistered"
    }

    async fn run_once(&self, shutdown: &CancellationToken) -> SyncResult<ReconcileReport> {
        let lease = Lease::new(now(), self.lease)?;
        let batch = self.store.claim_unregistered(self.batch_size, &lease).await?;
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
