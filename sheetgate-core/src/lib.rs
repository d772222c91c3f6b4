//! sheetgate core library: domain types, table extraction, ACL model,
//! spreadsheet range arithmetic and configuration.
//!
//! - [`types`]: cells, grids, device ids, revisions
//! - [`table`]: raw grid → canonical [`Table`]
//! - [`acl`]: [`Table`] ↔ [`Acl`], ACL comparison
//! - [`range`]: A1 notation and column letters
//! - [`config`]: YAML configuration
//! - [`error`]: [`CoreError`], [`TableError`], [`AclError`]

pub mod acl;
pub mod config;
pub mod error;
pub mod range;
pub mod table;
pub mod types;

pub use acl::{
    compare, make_table, parse_table, Acl, Card, Diff, ParseWarning, ParsedAcl, Permission,
    SystemDiff, DOORS,
};
pub use config::{Config, DeviceConfig, RevisionFetchPolicy, SheetsConfig};
pub use error::{AclError, Column, CoreError, TableError};
pub use range::{column_index, column_letters, A1Range};
pub use table::{extract, normalise, parse_tsv, Table};
pub use types::{Cell, DeviceId, Grid, Revision};
