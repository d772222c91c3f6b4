//! Structured events emitted by a sync run.
//!
//! The engine reports what it is doing through an injected [`EventSink`]
//! instead of logging directly. [`TracingSink`] forwards to `tracing`;
//! [`MemorySink`] records events for inspection in tests.

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use sheetgate_core::DeviceId;

use crate::fleet::Report;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    LockDenied { path: PathBuf },
    RevisionFetchFailed { message: String },
    /// Latest revision is the one already evaluated.
    RevisionUnchanged { revision: String },
    /// Latest revision is too fresh to act on.
    RevisionTooRecent { revision: String, age: Duration },
    RevisionChanged { revision: String },
    /// Run continues despite a skip decision because it was forced.
    Forced,
    TableWarning { message: String },
    DuplicateCard { card: u32 },
    DeviceUnreachable { device: DeviceId, message: String },
    NoChanges,
    DeviceUpdated { device: DeviceId, report: Report, dry_run: bool },
    LogWritten { sheet: String, rows: usize },
    RowsPruned { sheet: String, rows: usize, deletes: usize },
    ReportWritten { sheet: String, rows: usize },
    ReportSkipped,
    RevisionPersisted { revision: String },
}

impl SyncEvent {
    /// Stable kebab-case name, used as the `event` field in logs.
    pub fn name(&self) -> &'static str {
        match self {
            SyncEvent::LockDenied { .. } => "lock-denied",
            SyncEvent::RevisionFetchFailed { .. } => "revision-fetch-failed",
            SyncEvent::RevisionUnchanged { .. } => "revision-skipped",
            SyncEvent::RevisionTooRecent { .. } => "revision-deferred",
            SyncEvent::RevisionChanged { .. } => "revision-changed",
            SyncEvent::Forced => "forced",
            SyncEvent::TableWarning { .. } => "table-warning",
            SyncEvent::DuplicateCard { .. } => "duplicate-card",
            SyncEvent::DeviceUnreachable { .. } => "device-unreachable",
            SyncEvent::NoChanges => "no-changes",
            SyncEvent::DeviceUpdated { .. } => "device-updated",
            SyncEvent::LogWritten { .. } => "log-written",
            SyncEvent::RowsPruned { .. } => "rows-pruned",
            SyncEvent::ReportWritten { .. } => "report-written",
            SyncEvent::ReportSkipped => "report-skipped",
            SyncEvent::RevisionPersisted { .. } => "revision-persisted",
        }
    }
}

pub trait EventSink {
    fn emit(&self, event: SyncEvent);
}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: SyncEvent) {
        let name = event.name();
        match event {
            SyncEvent::LockDenied { path } => {
                tracing::error!(event = name, path = %path.display(), "another sync is running")
            }
            SyncEvent::RevisionFetchFailed { message } => {
                tracing::warn!(event = name, error = %message, "unable to fetch latest revision")
            }
            SyncEvent::RevisionUnchanged { revision } => {
                tracing::info!(event = name, revision = %revision, "nothing to do")
            }
            SyncEvent::RevisionTooRecent { revision, age } => tracing::info!(
                event = name,
                revision = %revision,
                age_secs = age.as_secs(),
                "revision too recent, deferring"
            ),
            SyncEvent::RevisionChanged { revision } => {
                tracing::info!(event = name, revision = %revision, "spreadsheet changed")
            }
            SyncEvent::Forced => tracing::info!(event = name, "sync forced"),
            SyncEvent::TableWarning { message } => tracing::warn!(event = name, "{message}"),
            SyncEvent::DuplicateCard { card } => {
                tracing::warn!(event = name, card, "duplicate card number ignored")
            }
            SyncEvent::DeviceUnreachable { device, message } => {
                tracing::warn!(event = name, device = %device, error = %message, "device unreachable")
            }
            SyncEvent::NoChanges => tracing::info!(event = name, "no changes"),
            SyncEvent::DeviceUpdated {
                device,
                report,
                dry_run,
            } => tracing::info!(
                event = name,
                device = %device,
                dry_run,
                unchanged = report.unchanged.len(),
                updated = report.updated.len(),
                added = report.added.len(),
                deleted = report.deleted.len(),
                failed = report.failed.len(),
                errors = report.errored.len(),
                "summary"
            ),
            SyncEvent::LogWritten { sheet, rows } => {
                tracing::info!(event = name, sheet = %sheet, rows, "log updated")
            }
            SyncEvent::RowsPruned {
                sheet,
                rows,
                deletes,
            } => tracing::info!(event = name, sheet = %sheet, rows_pruned = rows, deletes, "log pruned"),
            SyncEvent::ReportWritten { sheet, rows } => {
                tracing::info!(event = name, sheet = %sheet, rows, "report updated")
            }
            SyncEvent::ReportSkipped => tracing::info!(event = name, "nothing to report"),
            SyncEvent::RevisionPersisted { revision } => {
                tracing::debug!(event = name, revision = %revision, "revision saved")
            }
        }
    }
}

/// Records events in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<SyncEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SyncEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(SyncEvent::name).collect()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: SyncEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
