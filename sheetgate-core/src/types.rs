//! Domain types shared across the sheetgate workspace.
//!
//! Spreadsheet values arrive as strings, numbers, booleans or blanks. They are
//! resolved to a [`Cell`] at the grid boundary so that everything downstream
//! works on trimmed strings only.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Serial number of an access controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub u32);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u32> for DeviceId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

// ---------------------------------------------------------------------------
// Cells
// ---------------------------------------------------------------------------

/// A single spreadsheet cell.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<RawCell>", into = "String")]
pub enum Cell {
    #[default]
    Empty,
    Text(String),
}

/// A rectangular-ish block of cells. Rows may be ragged: spreadsheet backends
/// omit trailing blank cells.
pub type Grid = Vec<Vec<Cell>>;

impl Cell {
    /// The cell's text, `""` for an empty cell.
    pub fn as_str(&self) -> &str {
        match self {
            Cell::Empty => "",
            Cell::Text(text) => text,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.as_str().trim().is_empty()
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::from(s.to_owned())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        if s.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(s)
        }
    }
}

impl From<Cell> for String {
    fn from(cell: Cell) -> Self {
        match cell {
            Cell::Empty => String::new(),
            Cell::Text(text) => text,
        }
    }
}

/// Untyped value as returned by spreadsheet backends.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawCell {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

impl From<Option<RawCell>> for Cell {
    fn from(raw: Option<RawCell>) -> Self {
        match raw {
            None => Cell::Empty,
            Some(RawCell::Text(text)) => Cell::from(text),
            Some(RawCell::Integer(n)) => Cell::Text(n.to_string()),
            Some(RawCell::Float(n)) => Cell::Text(n.to_string()),
            Some(RawCell::Bool(b)) => Cell::Text(if b { "TRUE" } else { "FALSE" }.to_string()),
        }
    }
}

/// Build a grid row from string slices.
pub fn row<S: AsRef<str>>(values: &[S]) -> Vec<Cell> {
    values.iter().map(|v| Cell::from(v.as_ref())).collect()
}

// ---------------------------------------------------------------------------
// Revision
// ---------------------------------------------------------------------------

/// Fingerprint of the backing spreadsheet document at a point in time.
///
/// Persisted as `{"file-id": …, "id": …, "modified": …}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    #[serde(rename = "file-id")]
    pub document_id: String,
    #[serde(rename = "id")]
    pub revision_id: String,
    #[serde(rename = "modified")]
    pub modified_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
