//! Spreadsheet mirrors
//!
//! [`SpreadsheetApi`] is the narrow contract the sync core needs from the
//! spreadsheet service: append a row, bulk-read one column, overwrite a few
//! cells of a known row. [`SheetsClient`] speaks the Google Sheets v4 values
//! API; tests substitute in-memory fakes.

pub mod a1;
pub mod client;
pub mod mirror;

pub use client::SheetsClient;
pub use mirror::{MirrorReceipt, MirrorTargets, MirrorWriter, RowLookup, SheetTarget, StatusCells, StatusTarget};

use crate::error::SyncResult;
use async_trait::async_trait;

/// Result of an append call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppendOutcome {
    /// Range the service reports as written, e.g. `FS!A18:J18`
    pub updated_range: Option<String>,
}

impl AppendOutcome {
    /// Row number the appended values landed on, when the service reported it
    pub fn row(&self) -> Option<u32> {
        self.updated_range.as_deref().and_then(a1::start_row)
    }
}

/// Spreadsheet service operations used by the mirror writer
#[async_trait]
pub trait SpreadsheetApi: Send + Sync {
    /// Append one row after the last row of `range`. Never updates existing rows.
    async fn append_row(
        &self,
        spreadsheet_id: &str,
        range: &str,
        row: Vec<String>,
    ) -> SyncResult<AppendOutcome>;

    /// First cell of every row in `range`, top to bottom
    async fn read_column(&self, spreadsheet_id: &str, range: &str) -> SyncResult<Vec<String>>;

    /// Overwrite the cells of `range` (a single row) with `row`
    async fn update_row(&self, spreadsheet_id: &str, range: &str, row: Vec<String>)
        -> SyncResult<()>;
}
