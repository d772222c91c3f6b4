//! # sheetgate-sync
//!
//! Revision-gated reconciliation of a spreadsheet ACL with a device fleet.
//!
//! Call [`run`] once per scheduled invocation. The spreadsheet and the
//! devices are reached through the [`SpreadsheetStore`] and [`DeviceFleet`]
//! traits; progress is reported as [`SyncEvent`]s to an [`EventSink`].

pub mod audit;
pub mod error;
pub mod events;
pub mod fleet;
pub mod lock;
pub mod pipeline;
pub mod revision;
pub mod store;
pub mod workbook;

pub use error::SyncError;
pub use events::{EventSink, MemorySink, SyncEvent, TracingSink};
pub use fleet::{DeviceError, DeviceFleet, LocalFleet, PushResult, Report};
pub use lock::LockFile;
pub use pipeline::{run, RunOutcome, SyncSettings};
pub use revision::SyncDecision;
pub use store::{RevisionEntry, RowSpan, SpreadsheetStore};
pub use workbook::LocalWorkbook;
