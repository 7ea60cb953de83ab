//! Shared fixtures for canvass-sync integration tests
//!
//! In-memory fakes of the spreadsheet and coverage services plus a temporary
//! on-disk store, wired together through `SyncContext`.

#![allow(dead_code)]

use async_trait::async_trait;
use canvass_common::config::TomlConfig;
use canvass_common::{Lease, NewSubmission, Submission, SubmissionStore};
use canvass_sync::config::SyncSettings;
use canvass_sync::coverage::{CoverageApi, CoverageStatus, RegistrationPayload};
use canvass_sync::sheets::{AppendOutcome, SpreadsheetApi};
use canvass_sync::{SyncContext, SyncError, SyncResult};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const ALL_SHEET: &str = "all-sheet";
pub const FS_SHEET: &str = "fs-sheet";

#[derive(Debug, Clone, PartialEq)]
pub struct SheetWrite {
    pub spreadsheet_id: String,
    pub range: String,
    pub row: Vec<String>,
}

#[derive(Default)]
struct SheetsState {
    appends: Vec<SheetWrite>,
    updates: Vec<SheetWrite>,
    reads: Vec<String>,
    next_rows: HashMap<String, u32>,
    status_column: Vec<String>,
    fail_appends: bool,
    failing_cells: HashSet<String>,
    fail_reads: bool,
    omit_updated_range: bool,
}

/// Spreadsheet service fake. Each spreadsheet starts appending at row 2.
#[derive(Default)]
pub struct FakeSheets {
    state: Mutex<SheetsState>,
}

impl FakeSheets {
    pub fn appends(&self) -> Vec<SheetWrite> {
        self.state.lock().unwrap().appends.clone()
    }

    pub fn appends_to(&self, spreadsheet_id: &str) -> Vec<SheetWrite> {
        self.appends()
            .into_iter()
            .filter(|w| w.spreadsheet_id == spreadsheet_id)
            .collect()
    }

    pub fn updates(&self) -> Vec<SheetWrite> {
        self.state.lock().unwrap().updates.clone()
    }

    pub fn read_count(&self) -> usize {
        self.state.lock().unwrap().reads.len()
    }

    pub fn set_status_column(&self, values: Vec<String>) {
        self.state.lock().unwrap().status_column = values;
    }

    pub fn fail_appends(&self, fail: bool) {
        self.state.lock().unwrap().fail_appends = fail;
    }

    /// Reject appends of any row carrying `cell`
    pub fn fail_appends_with(&self, cell: &str) {
        self.state.lock().unwrap().failing_cells.insert(cell.to_string());
    }

    pub fn fail_reads(&self, fail: bool) {
        self.state.lock().unwrap().fail_reads = fail;
    }

    pub fn omit_updated_range(&self, omit: bool) {
        self.state.lock().unwrap().omit_updated_range = omit;
    }
}

fn unavailable(service: &'static str) -> SyncError {
    SyncError::Api {
        service,
        status: 503,
        body: "unavailable".to_string(),
    }
}

#[async_trait]
impl SpreadsheetApi for FakeSheets {
    async fn append_row(&self, spreadsheet_id: &str, range: &str, row: Vec<String>) -> SyncResult<AppendOutcome> {
        let mut state = self.state.lock().unwrap();
        if state.fail_appends || row.iter().any(|cell| state.failing_cells.contains(cell)) {
            return Err(unavailable("spreadsheet"));
        }

        let next = state.next_rows.entry(spreadsheet_id.to_string()).or_insert(2);
        let row_number = *next;
        *next += 1;

        state.appends.push(SheetWrite {
            spreadsheet_id: spreadsheet_id.to_string(),
            range: range.to_string(),
            row,
        });

        if state.omit_updated_range {
            return Ok(AppendOutcome::default());
        }
        let sheet = range.split('!').next().unwrap_or(range);
        Ok(AppendOutcome {
            updated_range: Some(format!("{}!A{}:K{}", sheet, row_number, row_number)),
        })
    }

    async fn read_column(&self, _spreadsheet_id: &str, range: &str) -> SyncResult<Vec<String>> {
        let mut state = self.state.lock().unwrap();
        state.reads.push(range.to_string());
        if state.fail_reads {
            return Err(unavailable("spreadsheet"));
        }
        Ok(state.status_column.clone())
    }

    async fn update_row(&self, spreadsheet_id: &str, range: &str, row: Vec<String>) -> SyncResult<()> {
        self.state.lock().unwrap().updates.push(SheetWrite {
            spreadsheet_id: spreadsheet_id.to_string(),
            range: range.to_string(),
            row,
        });
        Ok(())
    }
}

#[derive(Default)]
struct CoverageState {
    registrations: Vec<RegistrationPayload>,
    status_queries: Vec<String>,
    statuses: HashMap<String, CoverageStatus>,
    failing_customers: HashSet<String>,
    failing_status_ids: HashSet<String>,
    fail_all: bool,
}

/// Coverage service fake. Correlation ids are `bot-1`, `bot-2`, ...
#[derive(Default)]
pub struct FakeCoverage {
    state: Mutex<CoverageState>,
}

impl FakeCoverage {
    pub fn registrations(&self) -> Vec<RegistrationPayload> {
        self.state.lock().unwrap().registrations.clone()
    }

    pub fn status_queries(&self) -> Vec<String> {
        self.state.lock().unwrap().status_queries.clone()
    }

    pub fn set_status(&self, correlation_id: &str, status: CoverageStatus) {
        self.state
            .lock()
            .unwrap()
            .statuses
            .insert(correlation_id.to_string(), status);
    }

    pub fn fail_for_customer(&self, customer_name: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_customers
            .insert(customer_name.to_string());
    }

    pub fn fail_status_for(&self, correlation_id: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_status_ids
            .insert(correlation_id.to_string());
    }

    pub fn fail_all(&self, fail: bool) {
        self.state.lock().unwrap().fail_all = fail;
    }
}

#[async_trait]
impl CoverageApi for FakeCoverage {
    async fn register(&self, payload: &RegistrationPayload) -> SyncResult<String> {
        let mut state = self.state.lock().unwrap();
        if state.fail_all || state.failing_customers.contains(&payload.customer_name) {
            return Err(unavailable("coverage"));
        }
        state.registrations.push(payload.clone());
        Ok(format!("bot-{}", state.registrations.len()))
    }

    async fn status(&self, correlation_id: &str) -> SyncResult<CoverageStatus> {
        let mut state = self.state.lock().unwrap();
        state.status_queries.push(correlation_id.to_string());
        if state.fail_all || state.failing_status_ids.contains(correlation_id) {
            return Err(unavailable("coverage"));
        }
        Ok(state.statuses.get(correlation_id).cloned().unwrap_or_default())
    }
}

/// Store, fakes and wired components for one test
pub struct Harness {
    pub _dir: TempDir,
    pub store: Arc<SubmissionStore>,
    pub sheets: Arc<FakeSheets>,
    pub coverage: Arc<FakeCoverage>,
    pub context: SyncContext,
}

impl Harness {
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = TomlConfig::from_toml_str(&format!(
            r#"
            [sheets]
            access_token = "token"
            all_spreadsheet_id = "{ALL_SHEET}"
            fs_spreadsheet_id = "{FS_SHEET}"

            [coverage]
            api_key = "key"

            [photos]
            api_url = "https://canvass.example.com"
            path_prefix = "api"
            "#
        ))
        .unwrap();
        config.database_path = dir.path().join("canvass.db");

        let settings = SyncSettings::from_toml(&config).unwrap();
        let store = Arc::new(SubmissionStore::open(&settings.database_path).await.unwrap());
        let sheets = Arc::new(FakeSheets::default());
        let coverage = Arc::new(FakeCoverage::default());
        let context = SyncContext::new(store.clone(), sheets.clone(), coverage.clone(), &settings);

        Self {
            _dir: dir,
            store,
            sheets,
            coverage,
            context,
        }
    }

    /// Store a submission directly, bypassing the pipeline
    pub async fn insert(&self, submission: &Submission) {
        self.store.insert(submission, None).await.unwrap();
    }

    /// Store an FS submission that already has a correlation id
    pub async fn insert_registered(&self, correlation_id: &str) -> Submission {
        let mut submission = payload(&["FS"]).into_submission(Utc::now()).unwrap();
        submission.markers.coverage_bot_id = Some(correlation_id.to_string());
        self.insert(&submission).await;
        submission
    }

    pub async fn reload(&self, submission: &Submission) -> Submission {
        self.store.get(submission.id).await.unwrap().unwrap()
    }
}

pub fn payload(operators: &[&str]) -> NewSubmission {
    NewSubmission {
        salesperson: "Dewi".to_string(),
        customer_name: "Budi Santoso".to_string(),
        customer_address: "Jl. Merdeka 5".to_string(),
        house_number: "12A".to_string(),
        locality: "12345,VillageX,DistrictY,CityZ,ProvinceW".to_string(),
        coordinates: "1.0,2.0".to_string(),
        building_type: "House".to_string(),
        operators: operators.iter().map(|s| s.to_string()).collect(),
        remarks: Some("Gate code 42".to_string()),
        photos: vec!["front.jpg".to_string(), "meter.jpg".to_string()],
    }
}

/// A short lease starting now, for claiming rows directly in assertions
pub fn lease() -> Lease {
    Lease::new(Utc::now(), Duration::from_secs(60)).unwrap()
}

pub fn covered(homepassed_id: Option<&str>) -> CoverageStatus {
    CoverageStatus {
        is_covered: Some(true),
        homepassed_id: homepassed_id.map(str::to_string),
        operator_remarks: None,
    }
}

pub fn not_covered() -> CoverageStatus {
    CoverageStatus {
        is_covered: Some(false),
        homepassed_id: None,
        operator_remarks: Some("outside area".to_string()),
    }
}
