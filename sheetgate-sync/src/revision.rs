//! Revision tracking and debounce.
//!
//! The last evaluated [`Revision`] of the spreadsheet is kept in a small JSON
//! file. A run is warranted only when the latest revision differs from it and
//! has been left alone for at least the stability delay.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};

use sheetgate_core::Revision;

pub use sheetgate_core::RevisionFetchPolicy;

use crate::error::{io_err, SyncError};
use crate::store::RevisionEntry;

/// Outcome of comparing a candidate revision against the persisted one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncDecision {
    /// Same revision as the last evaluated one.
    Unchanged,
    /// Edited less than the stability delay ago.
    TooRecent { age: Duration },
    Changed,
}

/// Load the persisted revision. Absent, unreadable or corrupt files all read
/// as `None`.
pub fn load(path: &Path) -> Option<Revision> {
    let contents = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&contents).ok()
}

/// Persist `revision` atomically, creating parent directories.
pub fn save(path: &Path, revision: &Revision) -> Result<(), SyncError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }
    let json = serde_json::to_string_pretty(revision)?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, json).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| io_err(path, e))?;
    Ok(())
}

pub fn evaluate(
    candidate: &Revision,
    last: Option<&Revision>,
    stability_delay: Duration,
    now: DateTime<Utc>,
) -> SyncDecision {
    if last == Some(candidate) {
        return SyncDecision::Unchanged;
    }
    // A modification time in the future counts as just edited.
    let age = (now - candidate.modified_at).to_std().unwrap_or(Duration::ZERO);
    if age < stability_delay {
        return SyncDecision::TooRecent { age };
    }
    SyncDecision::Changed
}

/// `true` iff `candidate` differs from the revision persisted at `path` and is
/// older than `stability_delay`.
pub fn should_sync(
    candidate: &Revision,
    path: &Path,
    stability_delay: Duration,
    now: DateTime<Utc>,
) -> bool {
    evaluate(candidate, load(path).as_ref(), stability_delay, now) == SyncDecision::Changed
}

/// The most recently modified entry of a revision listing.
pub fn latest(document_id: &str, entries: &[RevisionEntry]) -> Option<Revision> {
    entries
        .iter()
        .max_by_key(|entry| entry.modified)
        .map(|entry| Revision {
            document_id: document_id.to_string(),
            revision_id: entry.id.clone(),
            modified_at: entry.modified,
        })
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
