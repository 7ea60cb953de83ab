//! Ingestion Pipeline
//!
//! Persists a validated submission and returns as soon as the store commits.
//! The fan-out to the spreadsheets and the coverage service runs on a spawned
//! task afterwards: each step is independent, failures are logged, and the
//! reconcilers repair whatever is left unset. Nothing here retries.
//!
//! The row is inserted with a lease so the reconcilers leave it alone until
//! the fan-out has had its chance.

use crate::coverage::registrar::RegistrationOutcome;
use crate::coverage::CoverageRegistrar;
use crate::error::{SyncError, SyncResult};
use crate::sheets::MirrorWriter;
use canvass_common::time::now;
use canvass_common::{Lease, MirrorSheet, NewSubmission, Submission, SubmissionStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

/// Result of one fan-out step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Completed,
    /// Step does not apply (non-FS submission) or was already done
    Skipped,
    Failed(String),
}

impl StepOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, StepOutcome::Failed(_))
    }
}

/// What the post-commit fan-out achieved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanOutReport {
    pub submission_id: Uuid,
    pub all_mirror: StepOutcome,
    pub fs_mirror: StepOutcome,
    pub registration: StepOutcome,
}

/// A committed submission plus the handle of its running fan-out
pub struct Ingested {
    pub submission: Submission,
    pub fan_out: JoinHandle<FanOutReport>,
}

#[derive(Clone)]
pub struct IngestionPipeline {
    store: Arc<SubmissionStore>,
    mirror: Arc<MirrorWriter>,
    registrar: Arc<CoverageRegistrar>,
    lease: Duration,
}

impl IngestionPipeline {
    pub fn new(
        store: Arc<SubmissionStore>,
        mirror: Arc<MirrorWriter>,
        registrar: Arc<CoverageRegistrar>,
        lease: Duration,
    ) -> Self {
        Self {
            store,
            mirror,
            registrar,
            lease,
        }
    }

    /// Store the submission and start the fan-out.
    ///
    /// Returns an error only when the submission could not be stored; in that
    /// case no submission exists and no external call is made.
    pub async fn ingest(&self, payload: NewSubmission) -> SyncResult<Ingested> {
        let created_at = now();
        let submission = payload.into_submission(created_at)?;
        let lease = Lease::new(created_at, self.lease)
            .map_err(|e| SyncError::Config(format!("Invalid ingestion lease: {}", e)))?;

        self.store.insert(&submission, Some(&lease)).await?;

        info!(
            submission_id = %submission.id,
            operators = %submission.operators.joined(","),
            photos = submission.photos.len(),
            "Submission ingested"
        );

        let pipeline = self.clone();
        let spawned = submission.clone();
        let fan_out = tokio::spawn(async move { pipeline.fan_out(&spawned, &lease).await });

        Ok(Ingested {
            submission,
            fan_out,
        })
    }

    /// Run the three sync steps concurrently, then release the ingestion lease
    pub async fn fan_out(&self, submission: &Submission, lease: &Lease) -> FanOutReport {
        let includes_fs = submission.includes_fs();

        let all_mirror = async {
            outcome(
                submission.id,
                "all-operators mirror",
                Some(self.mirror.write(submission, MirrorSheet::AllOperators).await.map(|r| r.marker_set)),
            )
        };
        let fs_mirror = async {
            let result = if includes_fs {
                Some(self.mirror.write(submission, MirrorSheet::Fs).await.map(|r| r.marker_set))
            } else {
                None
            };
            outcome(submission.id, "FS mirror", result)
        };
        let registration = async {
            let result = if includes_fs {
                Some(
                    self.registrar
                        .register(submission)
                        .await
                        .map(|r| matches!(r, RegistrationOutcome::Registered(_))),
                )
            } else {
                None
            };
            outcome(submission.id, "coverage registration", result)
        };

        let (all_mirror, fs_mirror, registration) = tokio::join!(all_mirror, fs_mirror, registration);

        if let Err(e) = self.store.release(submission.id, lease).await {
            warn!(submission_id = %submission.id, error = %e, "Failed to release ingestion lease");
        }

        FanOutReport {
            submission_id: submission.id,
            all_mirror,
            fs_mirror,
            registration,
        }
    }
}

/// `None` means not applicable, `Ok(false)` means nothing left to do
fn outcome(id: Uuid, step: &'static str, result: Option<SyncResult<bool>>) -> StepOutcome {
    match result {
        None | Some(Ok(false)) => StepOutcome::Skipped,
        Some(Ok(true)) => StepOutcome::Completed,
        Some(Err(e)) => {
            warn!(submission_id = %id, step, error = %e, "Sync step failed; left for reconciliation");
            StepOutcome::Failed(e.to_string())
        }
    }
}
