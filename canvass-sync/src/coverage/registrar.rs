//! Coverage Registrar
//!
//! Sends an FS submission to the coverage service and records the returned
//! correlation id. The id is write-once: a submission that already has one is
//! never registered again.

use super::{CoverageApi, RegistrationPayload};
use crate::error::{SyncError, SyncResult};
use crate::photos::PhotoUrlTemplate;
use canvass_common::{Submission, SubmissionStore};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// The service accepted the submission and its id was recorded
    Registered(String),
    /// The submission already had a correlation id
    AlreadyRegistered,
}

pub struct CoverageRegistrar {
    api: Arc<dyn CoverageApi>,
    store: Arc<SubmissionStore>,
    photo_urls: PhotoUrlTemplate,
}

impl CoverageRegistrar {
    pub fn new(api: Arc<dyn CoverageApi>, store: Arc<SubmissionStore>, photo_urls: PhotoUrlTemplate) -> Self {
        Self {
            api,
            store,
            photo_urls,
        }
    }

    pub fn payload(&self, submission: &Submission) -> RegistrationPayload {
        RegistrationPayload::from_submission(submission, &self.photo_urls)
    }

    pub async fn register(&self, submission: &Submission) -> SyncResult<RegistrationOutcome> {
        if !submission.includes_fs() {
            return Err(SyncError::Ineligible(format!(
                "submission {} has no FS operator",
                submission.id
            )));
        }
        if submission.markers.coverage_bot_id.is_some() {
            return Ok(RegistrationOutcome::AlreadyRegistered);
        }

        let correlation_id = self.api.register(&self.payload(submission)).await?;

        if self
            .store
            .set_coverage_bot_id(submission.id, &correlation_id)
            .await?
        {
            info!(submission_id = %submission.id, correlation_id = %correlation_id,
                "Registered with coverage service");
            Ok(RegistrationOutcome::Registered(correlation_id))
        } else {
            // Raced with another registration; the stored id wins
            warn!(submission_id = %submission.id, discarded = %correlation_id,
                "Submission was registered concurrently; keeping stored coverage id");
            Ok(RegistrationOutcome::AlreadyRegistered)
        }
    }
}
