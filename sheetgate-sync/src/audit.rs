//! Audit trail: the operational log and the change report.
//!
//! # Layout
//!
//! ```text
//! log range      Log!A1:H       row 1 header, one row appended per device per run
//! report range   Report!A1:D    row 1 timestamp, row 2 header, data from row 3
//! ```
//!
//! Columns are located by reading the destination's header row every time
//! and matching normalised names against the known [`Field`]s, so operators
//! may reorder, rename-by-case or omit columns. Fields without a column are
//! left out of the written rows.
//!
//! The log is append-only and pruned by age. The report is rewritten each
//! time: rows newer than the report retention are carried over, older ones
//! are dropped. Rows from a dry run carry [`DRY_RUN_MARK`].

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Days, Local, NaiveDateTime};

use sheetgate_core::{normalise, A1Range, Cell, DeviceId, Grid, SystemDiff};

use crate::events::{EventSink, SyncEvent};
use crate::fleet::Report;
use crate::store::{RowSpan, SpreadsheetStore};
use crate::SyncError;

/// `2023-05-01 10:00:00`, local time.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Blank rows written below the report.
pub const REPORT_PADDING: usize = 4;

/// Appended to the log's device id and the report's action on dry runs.
pub const DRY_RUN_MARK: &str = " (dry run)";

// ---------------------------------------------------------------------------
// Fields and column resolution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Timestamp,
    DeviceId,
    Unchanged,
    Updated,
    Added,
    Deleted,
    Failed,
    Errors,
    Action,
    CardNumber,
}

impl Field {
    /// Normalised header name.
    pub fn key(self) -> &'static str {
        match self {
            Field::Timestamp => "timestamp",
            Field::DeviceId => "deviceid",
            Field::Unchanged => "unchanged",
            Field::Updated => "updated",
            Field::Added => "added",
            Field::Deleted => "deleted",
            Field::Failed => "failed",
            Field::Errors => "errors",
            Field::Action => "action",
            Field::CardNumber => "cardnumber",
        }
    }
}

pub const LOG_FIELDS: [Field; 8] = [
    Field::Timestamp,
    Field::DeviceId,
    Field::Unchanged,
    Field::Updated,
    Field::Added,
    Field::Deleted,
    Field::Failed,
    Field::Errors,
];

pub const REPORT_FIELDS: [Field; 4] = [
    Field::Timestamp,
    Field::DeviceId,
    Field::Action,
    Field::CardNumber,
];

/// Report actions, in the order report rows are grouped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Action {
    Updated,
    Added,
    Deleted,
    Failed,
    Error,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::Updated,
        Action::Added,
        Action::Deleted,
        Action::Failed,
        Action::Error,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Action::Updated => "updated",
            Action::Added => "added",
            Action::Deleted => "deleted",
            Action::Failed => "failed",
            Action::Error => "error",
        }
    }

    fn cards(self, report: &Report) -> &BTreeSet<u32> {
        match self {
            Action::Updated => &report.updated,
            Action::Added => &report.added,
            Action::Deleted => &report.deleted,
            Action::Failed => &report.failed,
            Action::Error => &report.errored,
        }
    }
}

/// Resolved addressing for one audit destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRange {
    /// Single cell holding the run time. Reports only.
    pub timestamp_cell: Option<A1Range>,
    pub header_range: A1Range,
    pub data_range: A1Range,
    /// Field → column index relative to the range's left edge.
    pub columns: BTreeMap<Field, usize>,
}

impl AuditRange {
    /// Log layout: header in the first row, data below.
    pub fn for_log(range: &A1Range, header: &[Cell]) -> Self {
        Self {
            timestamp_cell: None,
            header_range: range.row(range.top),
            data_range: range.from_row(range.top + 1),
            columns: resolve(range, header, &LOG_FIELDS),
        }
    }

    /// Report layout: timestamp in the first row, header in the second, data
    /// below.
    pub fn for_report(range: &A1Range, header: &[Cell]) -> Self {
        Self {
            timestamp_cell: Some(range.cell(range.left, range.top)),
            header_range: range.row(range.top + 1),
            data_range: range.from_row(range.top + 2),
            columns: resolve(range, header, &REPORT_FIELDS),
        }
    }

    /// Lay out `values` as a row as wide as the range.
    fn row(&self, values: &[(Field, String)]) -> Vec<Cell> {
        let mut row = vec![Cell::Empty; self.data_range.width()];
        for (field, value) in values {
            if let Some(&ix) = self.columns.get(field) {
                row[ix] = Cell::from(value.as_str());
            }
        }
        row
    }

    fn timestamp_of(&self, row: &[Cell]) -> Option<NaiveDateTime> {
        let ix = *self.columns.get(&Field::Timestamp)?;
        parse_timestamp(row.get(ix)?.as_str())
    }
}

/// Match header cells against `fields`. Cells beyond the range's width are
/// ignored; the first matching cell wins.
pub fn resolve(range: &A1Range, header: &[Cell], fields: &[Field]) -> BTreeMap<Field, usize> {
    let mut columns = BTreeMap::new();
    for (ix, cell) in header.iter().enumerate().take(range.width()) {
        let key = normalise(cell.as_str());
        if let Some(field) = fields.iter().find(|f| f.key() == key) {
            columns.entry(*field).or_insert(ix);
        }
    }
    columns
}

pub fn format_timestamp(now: DateTime<Local>) -> String {
    now.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value.trim(), TIMESTAMP_FORMAT).ok()
}

/// Local midnight `retention_days - 1` days before `now`. Rows stamped
/// earlier than this are expired; a retention of one day keeps today only.
pub fn cutoff(now: DateTime<Local>, retention_days: u32) -> NaiveDateTime {
    let days = u64::from(retention_days.saturating_sub(1));
    now.date_naive()
        .checked_sub_days(Days::new(days))
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .unwrap_or(NaiveDateTime::MIN)
}

/// Collapse sorted, stale row offsets into row deletes.
///
/// `stale` are offsets from the first data row, whose zero-based sheet index
/// is `base`. Each maximal run of consecutive offsets becomes one span; spans
/// are shifted up by the rows removed before them so they can be applied in
/// order.
pub fn prune_spans(stale: &[usize], base: u32) -> Vec<RowSpan> {
    let mut spans: Vec<RowSpan> = Vec::new();
    let mut removed: u32 = 0;
    let mut run: Option<(usize, usize)> = None;

    let mut close = |(first, last): (usize, usize), removed: &mut u32| {
        let start = base + first as u32 - *removed;
        let len = (last - first + 1) as u32;
        spans.push(RowSpan {
            start,
            end: start + len,
        });
        *removed += len;
    };

    for &offset in stale {
        run = match run {
            Some((first, last)) if offset == last + 1 => Some((first, offset)),
            Some(done) => {
                close(done, &mut removed);
                Some((offset, offset))
            }
            None => Some((offset, offset)),
        };
    }
    if let Some(done) = run {
        close(done, &mut removed);
    }
    spans
}

// ---------------------------------------------------------------------------
// Log
// ---------------------------------------------------------------------------

/// Append one row per device to the log, then delete rows older than the
/// retention window.
///
/// Returns the number of rows pruned.
pub fn write_log(
    store: &mut dyn SpreadsheetStore,
    reports: &BTreeMap<DeviceId, Report>,
    range: &A1Range,
    retention_days: u32,
    dry_run: bool,
    now: DateTime<Local>,
    sink: &dyn EventSink,
) -> Result<usize, SyncError> {
    let header = first_row(store.read(&range.row(range.top))?);
    let layout = AuditRange::for_log(range, &header);
    let timestamp = format_timestamp(now);
    let mark = if dry_run { DRY_RUN_MARK } else { "" };

    let rows: Grid = reports
        .iter()
        .map(|(device, report)| {
            layout.row(&[
                (Field::Timestamp, timestamp.clone()),
                (Field::DeviceId, format!("{device}{mark}")),
                (Field::Unchanged, report.unchanged.len().to_string()),
                (Field::Updated, report.updated.len().to_string()),
                (Field::Added, report.added.len().to_string()),
                (Field::Deleted, report.deleted.len().to_string()),
                (Field::Failed, report.failed.len().to_string()),
                (Field::Errors, report.errored.len().to_string()),
            ])
        })
        .collect();

    if !rows.is_empty() {
        store.append(&layout.data_range, &rows)?;
        sink.emit(SyncEvent::LogWritten {
            sheet: range.sheet.clone(),
            rows: rows.len(),
        });
    }

    prune_log(store, &layout, retention_days, now, sink)
}

fn prune_log(
    store: &mut dyn SpreadsheetStore,
    layout: &AuditRange,
    retention_days: u32,
    now: DateTime<Local>,
    sink: &dyn EventSink,
) -> Result<usize, SyncError> {
    if !layout.columns.contains_key(&Field::Timestamp) {
        return Ok(0);
    }

    let expired = cutoff(now, retention_days);
    let data = store.read(&layout.data_range)?;
    let stale: Vec<usize> = data
        .iter()
        .enumerate()
        .filter(|(_, row)| layout.timestamp_of(row).is_some_and(|ts| ts < expired))
        .map(|(ix, _)| ix)
        .collect();

    if stale.is_empty() {
        return Ok(0);
    }

    let spans = prune_spans(&stale, layout.data_range.top - 1);
    store.delete_rows(&layout.data_range.sheet, &spans)?;
    sink.emit(SyncEvent::RowsPruned {
        sheet: layout.data_range.sheet.clone(),
        rows: stale.len(),
        deletes: spans.len(),
    });
    Ok(stale.len())
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Rewrite the report: retained rows first, then one row per card per action.
///
/// Skipped, leaving the previous report in place, when `always` is false and
/// no report has anything to show. Returns whether the report was written.
pub fn write_report(
    store: &mut dyn SpreadsheetStore,
    reports: &BTreeMap<DeviceId, Report>,
    range: &A1Range,
    retention_days: u32,
    always: bool,
    dry_run: bool,
    now: DateTime<Local>,
    sink: &dyn EventSink,
) -> Result<bool, SyncError> {
    if !always && !reports.values().any(Report::is_interesting) {
        sink.emit(SyncEvent::ReportSkipped);
        return Ok(false);
    }

    let header = first_row(store.read(&range.row(range.top + 1))?);
    let layout = AuditRange::for_report(range, &header);
    let timestamp = format_timestamp(now);
    let mark = if dry_run { DRY_RUN_MARK } else { "" };
    let width = layout.data_range.width();

    let keep_from = cutoff(now, retention_days);
    let mut rows: Grid = store
        .read(&layout.data_range)?
        .into_iter()
        .filter(|row| layout.timestamp_of(row).is_some_and(|ts| ts >= keep_from))
        .map(|mut row| {
            row.resize(width, Cell::Empty);
            row
        })
        .collect();

    for action in Action::ALL {
        for (device, report) in reports {
            for card in action.cards(report) {
                rows.push(layout.row(&[
                    (Field::Timestamp, timestamp.clone()),
                    (Field::DeviceId, device.to_string()),
                    (Field::Action, format!("{}{mark}", action.label())),
                    (Field::CardNumber, card.to_string()),
                ]));
            }
        }
    }

    let written = rows.len();
    rewrite(store, &layout, &timestamp, rows)?;
    sink.emit(SyncEvent::ReportWritten {
        sheet: range.sheet.clone(),
        rows: written,
    });
    Ok(true)
}

/// Write a side-by-side comparison: for each device a row with its id, then
/// the updated, added and deleted card numbers in the next three columns.
pub fn write_compare_report(
    store: &mut dyn SpreadsheetStore,
    diff: &SystemDiff,
    range: &A1Range,
    now: DateTime<Local>,
) -> Result<usize, SyncError> {
    let layout = AuditRange {
        timestamp_cell: Some(range.cell(range.left, range.top)),
        header_range: range.row(range.top + 1),
        data_range: range.from_row(range.top + 2),
        columns: BTreeMap::new(),
    };
    let width = layout.data_range.width().max(4);

    let mut rows = Grid::new();
    for (device, d) in diff {
        let top = rows.len();
        let mut first = vec![Cell::Empty; width];
        first[0] = Cell::from(device.to_string());
        for cell in &mut first[1..4] {
            *cell = Cell::from("-");
        }
        rows.push(first);

        let height = d.updated.len().max(d.added.len()).max(d.deleted.len());
        rows.extend((0..height).map(|_| vec![Cell::Empty; width]));

        for (col, cards) in [(1, &d.updated), (2, &d.added), (3, &d.deleted)] {
            for (i, card) in cards.iter().enumerate() {
                rows[top + i][col] = Cell::from(card.card_number.to_string());
            }
        }
    }

    let written = rows.len();
    rewrite(store, &layout, &format_timestamp(now), rows)?;
    Ok(written)
}

/// Clear the data range, write timestamp and rows in one batch, then pad.
fn rewrite(
    store: &mut dyn SpreadsheetStore,
    layout: &AuditRange,
    timestamp: &str,
    rows: Grid,
) -> Result<(), SyncError> {
    let data = &layout.data_range;
    let mut clear = vec![data.clone()];
    clear.extend(layout.timestamp_cell.clone());
    store.batch_clear(&clear)?;

    let height = rows.len() as u32;
    let mut batch = Vec::new();
    if let Some(cell) = &layout.timestamp_cell {
        batch.push((cell.clone(), vec![vec![Cell::from(timestamp)]]));
    }
    if height > 0 {
        let target = A1Range {
            bottom: Some(data.top + height - 1),
            ..data.clone()
        };
        batch.push((target, rows));
    }
    store.batch_update(&batch)?;

    let pad_top = data.top + height;
    let padding = A1Range {
        top: pad_top,
        bottom: Some(pad_top + REPORT_PADDING as u32 - 1),
        ..data.clone()
    };
    store.batch_update(&[(padding, vec![vec![Cell::Empty; data.width()]; REPORT_PADDING])])
}

fn first_row(grid: Grid) -> Vec<Cell> {
    grid.into_iter().next().unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
