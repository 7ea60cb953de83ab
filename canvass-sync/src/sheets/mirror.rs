//! Spreadsheet Mirror Writer
//!
//! Appends a submission's row projection to the all-operators sheet or the FS
//! sheet and stamps the matching marker on the store. Appends are
//! at-least-once: a retry after a lost response produces a duplicate row, which
//! is accepted and never deduplicated here.
//!
//! The FS sheet doubles as the coverage status sheet. Its rows are indexed in
//! the store (`mirror_rows`) from the append response, so status backfill
//! normally needs no full-column read.

use super::{a1, SpreadsheetApi};
use crate::error::{SyncError, SyncResult};
use crate::photos::PhotoUrlTemplate;
use canvass_common::time::{format_local, now};
use canvass_common::{MirrorSheet, Submission, SubmissionStore};
use chrono::FixedOffset;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Separator between photo URLs inside one cell
const PHOTO_URL_SEPARATOR: &str = "\n";
const OPERATOR_SEPARATOR: &str = ", ";

/// Spreadsheet and range that rows are appended to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetTarget {
    pub spreadsheet_id: String,
    pub range: String,
}

/// Where coverage results are written back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusTarget {
    pub spreadsheet_id: String,
    /// Identifier column, e.g. `FS!A:A`
    pub id_range: String,
    /// First of the three status columns, e.g. `K`
    pub first_column: String,
}

impl StatusTarget {
    fn sheet(&self) -> &str {
        a1::sheet_name(&self.id_range).unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorTargets {
    pub all: SheetTarget,
    pub fs: SheetTarget,
    pub status: StatusTarget,
}

impl MirrorTargets {
    fn for_sheet(&self, sheet: MirrorSheet) -> &SheetTarget {
        match sheet {
            MirrorSheet::AllOperators => &self.all,
            MirrorSheet::Fs => &self.fs,
        }
    }
}

/// What a successful append did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorReceipt {
    pub sheet: MirrorSheet,
    /// Row the service reported, when it did
    pub row: Option<u32>,
    /// False when the marker was already set (duplicate append)
    pub marker_set: bool,
}

/// The three status cells written back for a resolved coverage check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusCells {
    pub coverage: String,
    pub homepassed_id: String,
    pub operator_remarks: String,
}

impl StatusCells {
    pub const WIDTH: u32 = 3;

    fn into_row(self) -> Vec<String> {
        vec![self.coverage, self.homepassed_id, self.operator_remarks]
    }
}

/// Identifier -> row number map built from one bulk read of the id column
#[derive(Debug, Clone, Default)]
pub struct RowLookup {
    rows: HashMap<String, u32>,
}

impl RowLookup {
    /// Build from column values where `values[0]` sits on `first_row`.
    /// Duplicate ids (from retried appends) resolve to their first row.
    pub fn from_column(values: Vec<String>, first_row: u32) -> Self {
        let mut rows = HashMap::with_capacity(values.len());
        for (offset, value) in values.into_iter().enumerate() {
            let value = value.trim().to_string();
            if value.is_empty() {
                continue;
            }
            let Some(row) = u32::try_from(offset).ok().and_then(|o| first_row.checked_add(o)) else {
                break;
            };
            rows.entry(value).or_insert(row);
        }
        Self { rows }
    }

    pub fn row(&self, id: Uuid) -> Option<u32> {
        self.rows.get(&id.to_string()).copied()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub struct MirrorWriter {
    api: Arc<dyn SpreadsheetApi>,
    store: Arc<SubmissionStore>,
    targets: MirrorTargets,
    photo_urls: PhotoUrlTemplate,
    offset: FixedOffset,
}

impl MirrorWriter {
    pub fn new(
        api: Arc<dyn SpreadsheetApi>,
        store: Arc<SubmissionStore>,
        targets: MirrorTargets,
        photo_urls: PhotoUrlTemplate,
        offset: FixedOffset,
    ) -> Self {
        Self {
            api,
            store,
            targets,
            photo_urls,
            offset,
        }
    }

    /// Row projection of a submission for `sheet`. Only the all-operators
    /// sheet carries the operator column.
    pub fn project_row(&self, submission: &Submission, sheet: MirrorSheet) -> Vec<String> {
        let mut row = vec![
            submission.id.to_string(),
            format_local(submission.created_at, self.offset),
            submission.customer_name.clone(),
            submission.full_address(),
            submission.house_number.clone(),
            submission.coordinates_raw.clone(),
            submission.salesperson.clone(),
            submission.building_type.clone(),
            self.photo_urls
                .urls(&submission.photos)
                .join(PHOTO_URL_SEPARATOR),
            submission.remarks.clone(),
        ];
        if sheet == MirrorSheet::AllOperators {
            row.push(submission.operators.joined(OPERATOR_SEPARATOR));
        }
        row
    }

    /// Append the submission to `sheet` and stamp its marker.
    ///
    /// Fails without calling the service when `sheet` is the FS sheet and the
    /// submission has no FS operator.
    pub async fn write(&self, submission: &Submission, sheet: MirrorSheet) -> SyncResult<MirrorReceipt> {
        if sheet == MirrorSheet::Fs && !submission.includes_fs() {
            return Err(SyncError::Ineligible(format!(
                "submission {} has no FS operator",
                submission.id
            )));
        }

        let target = self.targets.for_sheet(sheet);
        let outcome = self
            .api
            .append_row(&target.spreadsheet_id, &target.range, self.project_row(submission, sheet))
            .await?;
        let row = outcome.row();

        let marker_set = self
            .store
            .mark_mirror_written(submission.id, sheet, now())
            .await?;

        match row {
            Some(row) => {
                // The marker is already durable; a lost index entry only costs a bulk read later
                if let Err(e) = self.store.record_mirror_row(submission.id, sheet, row).await {
                    warn!(submission_id = %submission.id, sheet = %sheet, row, error = %e,
                        "Failed to index mirror row");
                }
            }
            None => {
                debug!(submission_id = %submission.id, sheet = %sheet,
                    "Append response carried no updated range; row not indexed");
            }
        }

        info!(submission_id = %submission.id, sheet = %sheet, row = ?row, "Mirror row appended");

        Ok(MirrorReceipt {
            sheet,
            row,
            marker_set,
        })
    }

    /// Status-sheet row recorded for a submission at append time
    pub async fn indexed_status_row(&self, id: Uuid) -> SyncResult<Option<u32>> {
        Ok(self.store.mirror_row(id, MirrorSheet::Fs).await?)
    }

    /// Record a status-sheet row found by a bulk read
    pub async fn remember_status_row(&self, id: Uuid, row: u32) -> SyncResult<()> {
        Ok(self.store.record_mirror_row(id, MirrorSheet::Fs, row).await?)
    }

    /// Read the whole identifier column of the status sheet once
    pub async fn lookup_rows(&self) -> SyncResult<RowLookup> {
        let status = &self.targets.status;
        let values = self
            .api
            .read_column(&status.spreadsheet_id, &status.id_range)
            .await?;
        let first_row = a1::start_row(&status.id_range).unwrap_or(1);

        let lookup = RowLookup::from_column(values, first_row);
        debug!(ids = lookup.len(), range = %status.id_range, "Status sheet identifiers loaded");
        Ok(lookup)
    }

    /// Overwrite the status cells of `row`
    pub async fn write_status(&self, row: u32, cells: StatusCells) -> SyncResult<()> {
        let status = &self.targets.status;
        let range = a1::row_span(status.sheet(), &status.first_column, StatusCells::WIDTH, row)
            .ok_or_else(|| {
                SyncError::Config(format!(
                    "Invalid status column '{}' for sheet range '{}'",
                    status.first_column, status.id_range
                ))
            })?;

        self.api
            .update_row(&status.spreadsheet_id, &range, cells.into_row())
            .await
    }
}
