//! Error types for sheetgate-core.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Canonical ACL columns, in the order they must appear in a [`crate::Table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    CardNumber,
    Pin,
    From,
    To,
}

impl Column {
    /// Normalised header key for the column.
    pub fn key(self) -> &'static str {
        match self {
            Column::CardNumber => "cardnumber",
            Column::Pin => "pin",
            Column::From => "from",
            Column::To => "to",
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Column::CardNumber => write!(f, "card number"),
            Column::Pin => write!(f, "PIN"),
            Column::From => write!(f, "from"),
            Column::To => write!(f, "to"),
        }
    }
}

/// Header validation failures raised while extracting a table from a sheet.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("empty sheet")]
    EmptySheet,

    #[error("duplicate column name '{0}'")]
    DuplicateColumn(String),

    #[error("missing '{0}' column")]
    MissingColumn(Column),

    /// Malformed tab-separated text.
    #[error("invalid TSV: {0}")]
    Tsv(String),
}

/// Failures raised while turning a table into an ACL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AclError {
    /// A card number appears on more than one row and strict parsing was requested.
    #[error("duplicate card number {0}")]
    DuplicateCard(u32),

    /// The table does not start with the canonical columns.
    #[error("table is missing the '{0}' column")]
    MissingColumn(Column),
}

/// All errors that can arise from core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Underlying I/O failure (file not found, permission denied, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parse error on load: includes file path and line context from serde_yaml.
    #[error("failed to parse configuration at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Serialization failure while saving configuration.
    #[error("failed to serialize configuration for {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The configuration file did not exist at the expected path.
    #[error("configuration not found at {path}")]
    ConfigNotFound { path: PathBuf },

    /// `dirs::config_dir()` returned `None`.
    #[error("cannot determine configuration directory; set $HOME or equivalent")]
    ConfigDirNotFound,

    #[error("invalid range '{0}' - expected something like 'ACL!A2:E'")]
    InvalidRange(String),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    Acl(#[from] AclError),
}
