//! Capabilities the sync engine needs from its collaborators.
//!
//! [`SpreadsheetStore`] is the spreadsheet side (values, structural row
//! deletes, revision history); [`crate::fleet::DeviceFleet`] is the device side.
//! Bundled implementations: [`crate::workbook::LocalWorkbook`] and
//! [`crate::fleet::LocalFleet`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sheetgate_core::{A1Range, Grid};

use crate::SyncError;

/// Zero-based, end-exclusive span of sheet rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowSpan {
    pub start: u32,
    pub end: u32,
}

impl RowSpan {
    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One entry of a document's revision history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionEntry {
    pub id: String,
    pub modified: DateTime<Utc>,
}

pub trait SpreadsheetStore {
    /// Identifier of the backing document.
    fn document_id(&self) -> &str;

    /// Values in `range`. Trailing blank rows and cells may be omitted.
    fn read(&self, range: &A1Range) -> Result<Grid, SyncError>;

    /// Overwrite each range with its values, starting at the range's top-left.
    fn batch_update(&mut self, data: &[(A1Range, Grid)]) -> Result<(), SyncError>;

    /// Insert `rows` after the last non-blank row of `range`. Never overwrites.
    fn append(&mut self, range: &A1Range, rows: &Grid) -> Result<(), SyncError>;

    fn batch_clear(&mut self, ranges: &[A1Range]) -> Result<(), SyncError>;

    /// Delete rows from `sheet`. Spans are applied in order, so each span's
    /// indices must already account for rows removed by the spans before it.
    fn delete_rows(&mut self, sheet: &str, spans: &[RowSpan]) -> Result<(), SyncError>;

    /// Full revision history, all pages.
    fn list_revisions(&self) -> Result<Vec<RevisionEntry>, SyncError>;
}
