//! Local workbook: a JSON file of named sheets implementing
//! [`SpreadsheetStore`].
//!
//! ```json
//! {
//!   "id": "acl-demo",
//!   "revisions": [{ "id": "1", "modified": "2023-05-01T10:00:00Z" }],
//!   "sheets": { "ACL": [["Card Number", "From", "To"], ["6001001", "2023-01-01", "2023-12-31"]] }
//! }
//! ```
//!
//! Opened from a file, every mutation is written back atomically (`.tmp` +
//! rename). [`LocalWorkbook::new`] builds an in-memory workbook.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use sheetgate_core::{A1Range, Cell, Grid};

use crate::error::{io_err, SyncError};
use crate::store::{RevisionEntry, RowSpan, SpreadsheetStore};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkbookFile {
    pub id: String,
    #[serde(default)]
    pub revisions: Vec<RevisionEntry>,
    #[serde(default)]
    pub sheets: BTreeMap<String, Grid>,
}

#[derive(Debug, Clone)]
pub struct LocalWorkbook {
    path: Option<PathBuf>,
    data: WorkbookFile,
}

impl LocalWorkbook {
    /// In-memory workbook with the named, empty sheets.
    pub fn new(id: &str, sheets: &[&str]) -> Self {
        Self {
            path: None,
            data: WorkbookFile {
                id: id.to_string(),
                revisions: Vec::new(),
                sheets: sheets.iter().map(|s| (s.to_string(), Grid::new())).collect(),
            },
        }
    }

    pub fn open(path: &Path) -> Result<Self, SyncError> {
        let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        let data = serde_json::from_str(&contents)?;
        Ok(Self {
            path: Some(path.to_path_buf()),
            data,
        })
    }

    /// Write the workbook to `path` and keep writing back there.
    pub fn save_as(&mut self, path: &Path) -> Result<(), SyncError> {
        self.path = Some(path.to_path_buf());
        self.flush()
    }

    pub fn data(&self) -> &WorkbookFile {
        &self.data
    }

    /// Whole sheet contents, untrimmed.
    pub fn sheet(&self, name: &str) -> Option<&Grid> {
        self.data.sheets.get(name)
    }

    pub fn set_sheet(&mut self, name: &str, grid: Grid) -> Result<(), SyncError> {
        self.data.sheets.insert(name.to_string(), grid);
        self.flush()
    }

    pub fn push_revision(&mut self, entry: RevisionEntry) -> Result<(), SyncError> {
        self.data.revisions.push(entry);
        self.flush()
    }

    fn flush(&self) -> Result<(), SyncError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }
        let json = serde_json::to_string_pretty(&self.data)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| io_err(&tmp, e))?;
        std::fs::rename(&tmp, path).map_err(|e| io_err(path, e))?;
        Ok(())
    }

    fn sheet_mut(&mut self, name: &str, operation: &'static str) -> Result<&mut Grid, SyncError> {
        self.data
            .sheets
            .get_mut(name)
            .ok_or_else(|| no_such_sheet(name, operation))
    }
}

fn no_such_sheet(name: &str, operation: &'static str) -> SyncError {
    SyncError::Spreadsheet {
        operation,
        message: format!("no sheet named '{name}'"),
    }
}

/// Set `grid[row][col]`, growing the grid as needed.
fn put(grid: &mut Grid, row: usize, col: usize, cell: Cell) {
    if grid.len() <= row {
        grid.resize(row + 1, Vec::new());
    }
    let line = &mut grid[row];
    if line.len() <= col {
        line.resize(col + 1, Cell::Empty);
    }
    line[col] = cell;
}

fn bottom_index(range: &A1Range, grid: &Grid) -> usize {
    range
        .bottom
        .map(|b| b as usize)
        .unwrap_or(grid.len())
        .min(grid.len())
}

impl SpreadsheetStore for LocalWorkbook {
    fn document_id(&self) -> &str {
        &self.data.id
    }

    fn read(&self, range: &A1Range) -> Result<Grid, SyncError> {
        let grid = self
            .data
            .sheets
            .get(&range.sheet)
            .ok_or_else(|| no_such_sheet(&range.sheet, "read"))?;

        let top = range.top as usize - 1;
        let bottom = bottom_index(range, grid);
        let mut out: Grid = (top..bottom.max(top))
            .map(|r| {
                let mut line: Vec<Cell> = (range.left..=range.right)
                    .map(|c| grid[r].get(c).cloned().unwrap_or_default())
                    .collect();
                while line.last().is_some_and(|c| *c == Cell::Empty) {
                    line.pop();
                }
                line
            })
            .collect();
        while out.last().is_some_and(|line| line.is_empty()) {
            out.pop();
        }
        Ok(out)
    }

    fn batch_update(&mut self, data: &[(A1Range, Grid)]) -> Result<(), SyncError> {
        for (range, values) in data {
            let grid = self.sheet_mut(&range.sheet, "update")?;
            let top = range.top as usize - 1;
            for (i, line) in values.iter().enumerate() {
                if range.bottom.is_some_and(|b| top + i >= b as usize) {
                    break;
                }
                for (j, cell) in line.iter().enumerate().take(range.width()) {
                    put(grid, top + i, range.left + j, cell.clone());
                }
            }
        }
        self.flush()
    }

    fn append(&mut self, range: &A1Range, rows: &Grid) -> Result<(), SyncError> {
        let grid = self.sheet_mut(&range.sheet, "append")?;
        let top = range.top as usize - 1;
        let bottom = bottom_index(range, grid);

        let last = (top..bottom.max(top)).rev().find(|&r| {
            (range.left..=range.right).any(|c| grid[r].get(c).is_some_and(|cell| !cell.is_blank()))
        });
        let at = last.map(|r| r + 1).unwrap_or(top);
        if grid.len() < at {
            grid.resize(at, Vec::new());
        }

        let inserted = rows.iter().map(|line| {
            let mut out = vec![Cell::Empty; range.left];
            out.extend(line.iter().take(range.width()).cloned());
            out
        });
        let tail = grid.split_off(at);
        grid.extend(inserted);
        grid.extend(tail);
        self.flush()
    }

    fn batch_clear(&mut self, ranges: &[A1Range]) -> Result<(), SyncError> {
        for range in ranges {
            let grid = self.sheet_mut(&range.sheet, "clear")?;
            let top = range.top as usize - 1;
            let bottom = bottom_index(range, grid);
            for line in grid.iter_mut().take(bottom).skip(top) {
                for cell in line.iter_mut().skip(range.left).take(range.width()) {
                    *cell = Cell::Empty;
                }
            }
        }
        self.flush()
    }

    fn delete_rows(&mut self, sheet: &str, spans: &[RowSpan]) -> Result<(), SyncError> {
        let grid = self.sheet_mut(sheet, "delete rows")?;
        for span in spans {
            let start = (span.start as usize).min(grid.len());
            let end = (span.end as usize).min(grid.len());
            grid.drain(start..end.max(start));
        }
        self.flush()
    }

    fn list_revisions(&self) -> Result<Vec<RevisionEntry>, SyncError> {
        Ok(self.data.revisions.clone())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use sheetgate_core::types::row;
    use tempfile::TempDir;

    fn range(s: &str) -> A1Range {
        A1Range::parse(s).expect("range")
    }

    fn grid(rows: &[&[&str]]) -> Grid {
        rows.iter().map(|r| row(r)).collect()
    }

    fn workbook() -> LocalWorkbook {
        let mut wb = LocalWorkbook::new("doc", &["Log"]);
        wb.set_sheet(
            "Log",
            grid(&[
                &["Timestamp", "Device", "Added"],
                &["2023-05-01 10:00:00", "1", "3"],
                &["2023-05-02 10:00:00", "1", "0"],
            ]),
        )
        .expect("set");
        wb
    }

    #[test]
    fn read_trims_trailing_blanks() {
        let mut wb = workbook();
        wb.batch_update(&[(range("Log!A6:C6"), grid(&[&["", "", ""]]))])
            .expect("update");

        let values = wb.read(&range("Log!B1:D")).expect("read");
        assert_eq!(values, grid(&[&["Device", "Added"], &["1", "3"], &["1", "0"]]));
    }

    #[test]
    fn read_unknown_sheet_is_an_error() {
        let err = workbook().read(&range("Nope!A1:B")).unwrap_err();
        assert!(matches!(err, SyncError::Spreadsheet { operation: "read", .. }));
    }

    #[test]
    fn append_inserts_after_last_row() {
        let mut wb = workbook();
        wb.set_sheet(
            "Log",
            grid(&[
                &["Timestamp", "Device"],
                &["a", "1"],
                &[],
                &[],
                &["", "", "", "", "unrelated"],
            ]),
        )
        .expect("set");

        wb.append(&range("Log!A2:B"), &grid(&[&["b", "2"]])).expect("append");

        let sheet = wb.sheet("Log").expect("sheet");
        assert_eq!(sheet[2], row(&["b", "2"]));
        assert_eq!(sheet[5], row(&["", "", "", "", "unrelated"]));
    }

    #[test]
    fn append_to_empty_range_starts_at_top() {
        let mut wb = LocalWorkbook::new("doc", &["Log"]);
        wb.append(&range("Log!B3:C"), &grid(&[&["x", "y"]])).expect("append");
        let sheet = wb.sheet("Log").expect("sheet");
        assert_eq!(sheet.len(), 3);
        assert_eq!(sheet[2], row(&["", "x", "y"]));
    }

    #[test]
    fn clear_blanks_values_but_keeps_rows() {
        let mut wb = workbook();
        wb.batch_clear(&[range("Log!A2:B")]).expect("clear");
        let sheet = wb.sheet("Log").expect("sheet");
        assert_eq!(sheet.len(), 3);
        assert_eq!(sheet[1], row(&["", "", "3"]));
    }

    #[test]
    fn delete_rows_applies_spans_in_order() {
        let mut wb = LocalWorkbook::new("doc", &["S"]);
        wb.set_sheet("S", grid(&[&["0"], &["1"], &["2"], &["3"], &["4"], &["5"]]))
            .expect("set");

        // Rows 1 and 4 of the original sheet; the second span is already shifted.
        wb.delete_rows(
            "S",
            &[RowSpan { start: 1, end: 2 }, RowSpan { start: 3, end: 4 }],
        )
        .expect("delete");

        assert_eq!(
            wb.sheet("S").expect("sheet"),
            &grid(&[&["0"], &["2"], &["3"], &["5"]])
        );
    }

    #[test]
    fn file_backed_workbook_writes_through() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("book.json");

        let mut wb = workbook();
        wb.save_as(&path).expect("save");
        wb.append(&range("Log!A2:C"), &grid(&[&["2023-05-03 10:00:00", "1", "9"]]))
            .expect("append");

        let reopened = LocalWorkbook::open(&path).expect("open");
        assert_eq!(reopened.sheet("Log").expect("sheet").len(), 4);
        assert!(!path.with_extension("json.tmp").exists());
    }
}
