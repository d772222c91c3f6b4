//! Error types for sheetgate-sync.

use std::path::PathBuf;

use thiserror::Error;

use sheetgate_core::{CoreError, DeviceId, TableError};

/// All errors that can abort a sync run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error (revision file, workbook, fleet snapshots).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Another run holds the lock.
    #[error("locked: {path} exists (remove it if no other sync is running)")]
    Locked { path: PathBuf },

    #[error("no data in spreadsheet range {range}")]
    NoData { range: String },

    #[error("invalid ACL worksheet: {0}")]
    Validation(#[from] TableError),

    #[error("duplicate card number {card} in ACL worksheet")]
    StrictDuplicate { card: u32 },

    /// Current device state could not be read from any device.
    #[error("unable to retrieve the current ACL from any device: {0}")]
    Diff(String),

    #[error("error updating devices: {}", .0.join("; "))]
    HardPush(Vec<String>),

    #[error("unable to identify latest revision: {0}")]
    RevisionFetch(String),

    #[error("spreadsheet {operation} failed: {message}")]
    Spreadsheet {
        operation: &'static str,
        message: String,
    },

    #[error("device {device}: {message}")]
    Device { device: DeviceId, message: String },

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
