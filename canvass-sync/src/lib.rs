//! canvass-sync library interface
//!
//! Submission synchronization: the ingestion pipeline that stores a submission
//! and fans it out to the spreadsheet mirrors and the coverage service, and
//! the reconcilers that repair whatever the fan-out missed.

pub mod config;
pub mod coverage;
pub mod error;
pub mod photos;
pub mod pipeline;
pub mod reconcile;
pub mod sheets;

pub use crate::error::{SyncError, SyncResult};

use crate::config::{ReconcileSettings, SyncSettings};
use crate::coverage::{CoverageApi, CoverageClient, CoverageRegistrar};
use crate::pipeline::IngestionPipeline;
use crate::reconcile::{
    CoverageStatusReconciler, MirrorReconciler, Reconciler, Scheduler, UnregisteredReconciler,
};
use crate::sheets::{MirrorWriter, SheetsClient, SpreadsheetApi};
use canvass_common::SubmissionStore;
use std::sync::Arc;
use std::time::Duration;

/// Shared handles for one process: the store and the wired sync components
#[derive(Clone)]
pub struct SyncContext {
    pub store: Arc<SubmissionStore>,
    pub coverage: Arc<dyn CoverageApi>,
    pub mirror: Arc<MirrorWriter>,
    pub registrar: Arc<CoverageRegistrar>,
    pub reconcile: ReconcileSettings,
}

impl SyncContext {
    /// Wire components around already-built service clients
    pub fn new(
        store: Arc<SubmissionStore>,
        sheets: Arc<dyn SpreadsheetApi>,
        coverage: Arc<dyn CoverageApi>,
        settings: &SyncSettings,
    ) -> Self {
        let mirror = Arc::new(MirrorWriter::new(
            sheets,
            store.clone(),
            settings.sheets.targets.clone(),
            settings.photo_urls.clone(),
            settings.offset,
        ));
        let registrar = Arc::new(CoverageRegistrar::new(
            coverage.clone(),
            store.clone(),
            settings.photo_urls.clone(),
        ));

        Self {
            store,
            coverage,
            mirror,
            registrar,
            reconcile: settings.reconcile.clone(),
        }
    }

    /// Open the store and build the HTTP clients from settings
    pub async fn connect(settings: &SyncSettings) -> SyncResult<Self> {
        let store = Arc::new(SubmissionStore::open(&settings.database_path).await?);
        let sheets = Arc::new(SheetsClient::new(
            &settings.sheets.base_url,
            settings.sheets.access_token.clone(),
            settings.sheets.timeout,
        )?);
        let coverage = Arc::new(CoverageClient::new(
            &settings.coverage.base_url,
            &settings.coverage.api_key_header,
            &settings.coverage.api_key,
            settings.coverage.timeout,
        )?);

        Ok(Self::new(store, sheets, coverage, settings))
    }

    pub fn pipeline(&self) -> IngestionPipeline {
        IngestionPipeline::new(
            self.store.clone(),
            self.mirror.clone(),
            self.registrar.clone(),
            self.reconcile.lease,
        )
    }

    pub fn unregistered_reconciler(&self) -> UnregisteredReconciler {
        UnregisteredReconciler::new(
            self.store.clone(),
            self.registrar.clone(),
            self.reconcile.batch_size,
            self.reconcile.lease,
        )
    }

    pub fn coverage_status_reconciler(&self) -> CoverageStatusReconciler {
        CoverageStatusReconciler::new(
            self.store.clone(),
            self.coverage.clone(),
            self.mirror.clone(),
            self.reconcile.batch_size,
            self.reconcile.lease,
        )
    }

    pub fn mirror_reconciler(&self) -> MirrorReconciler {
        MirrorReconciler::new(
            self.store.clone(),
            self.mirror.clone(),
            self.reconcile.batch_size,
            self.reconcile.lease,
        )
    }

    /// Enabled reconcilers with their periods
    pub fn scheduled_reconcilers(&self) -> Vec<(Arc<dyn Reconciler>, Duration)> {
        let settings = &self.reconcile;
        if !settings.enabled {
            return Vec::new();
        }

        let mut jobs: Vec<(Arc<dyn Reconciler>, Duration)> = vec![
            (Arc::new(self.unregistered_reconciler()), settings.unregistered_interval),
            (Arc::new(self.coverage_status_reconciler()), settings.coverage_status_interval),
        ];
        if settings.mirror_enabled {
            jobs.push((Arc::new(self.mirror_reconciler()), settings.mirror_interval));
        }
        jobs
    }

    /// Spawn every enabled reconciler on its own timer
    pub fn start_reconcilers(&self, scheduler: &mut Scheduler) {
        for (reconciler, period) in self.scheduled_reconcilers() {
            scheduler.spawn(reconciler, period);
        }
    }
}
