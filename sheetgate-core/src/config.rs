//! YAML configuration.
//!
//! ```text
//! <config dir>/sheetgate/sheetgate.yaml
//! ```
//!
//! ```yaml
//! workdir: /var/lib/sheetgate
//! fleet_dir: /var/lib/sheetgate/devices
//! devices:
//!   - id: 405419896
//!     name: Alpha
//!     doors: [Gate, Tower, Dungeon, Lair]
//! sheets:
//!   url: https://docs.google.com/spreadsheets/d/<id>
//!   acl_range: ACL!A1:K
//!   log_range: Log!A1:H
//!   report_range: Report!A1:D
//! ```
//!
//! As with the rest of the workspace, every loader has an `_at` form taking an
//! explicit path; the plain form resolves the default location via `dirs`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::acl::DOORS;
use crate::error::CoreError;
use crate::types::DeviceId;

pub const DEFAULT_LOG_RETENTION_DAYS: u32 = 30;
pub const DEFAULT_REPORT_RETENTION_DAYS: u32 = 7;
pub const DEFAULT_STABILITY_DELAY_SECS: u64 = 15 * 60;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// What to do when the latest spreadsheet revision cannot be fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RevisionFetchPolicy {
    /// Report the failure and carry on as though the sheet had changed.
    #[default]
    Proceed,
    /// Abort the run.
    Abort,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub id: DeviceId,
    #[serde(default)]
    pub name: String,
    /// Door names, in door order. Empty names are unassigned doors.
    #[serde(default)]
    pub doors: Vec<String>,
}

impl DeviceConfig {
    pub fn new(id: u32, name: &str, doors: [&str; DOORS]) -> Self {
        Self {
            id: DeviceId(id),
            name: name.to_string(),
            doors: doors.iter().map(|d| d.to_string()).collect(),
        }
    }
}

/// Spreadsheet side of the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetsConfig {
    /// `https://docs.google.com/spreadsheets/d/<id>`
    pub url: Option<String>,
    /// Local workbook file, used instead of `url` when set.
    pub workbook: Option<PathBuf>,
    pub acl_range: Option<String>,
    pub log_range: Option<String>,
    pub log_retention_days: u32,
    pub report_range: Option<String>,
    pub report_retention_days: u32,
    /// Seconds a revision must have been left alone before it is acted on.
    pub stability_delay_secs: u64,
    pub on_revision_error: RevisionFetchPolicy,
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            url: None,
            workbook: None,
            acl_range: None,
            log_range: None,
            log_retention_days: DEFAULT_LOG_RETENTION_DAYS,
            report_range: None,
            report_retention_days: DEFAULT_REPORT_RETENTION_DAYS,
            stability_delay_secs: DEFAULT_STABILITY_DELAY_SECS,
            on_revision_error: RevisionFetchPolicy::default(),
        }
    }
}

impl SheetsConfig {
    pub fn stability_delay(&self) -> Duration {
        Duration::from_secs(self.stability_delay_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Directory for revision and lock files.
    #[serde(default = "default_workdir")]
    pub workdir: PathBuf,
    /// Directory of per-device card snapshots. Defaults to `<workdir>/devices`.
    #[serde(default)]
    pub fleet_dir: Option<PathBuf>,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
    #[serde(default)]
    pub sheets: SheetsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workdir: default_workdir(),
            fleet_dir: None,
            devices: Vec::new(),
            sheets: SheetsConfig::default(),
        }
    }
}

impl Config {
    pub fn fleet_dir(&self) -> PathBuf {
        self.fleet_dir
            .clone()
            .unwrap_or_else(|| self.workdir.join("devices"))
    }

    /// `<workdir>/sheets/<document>.revision`
    pub fn revision_path(&self, document_id: &str) -> PathBuf {
        self.workdir
            .join("sheets")
            .join(format!("{document_id}.revision"))
    }

    /// `<workdir>/sheets/sheetgate.lock`
    pub fn lock_path(&self) -> PathBuf {
        self.workdir.join("sheets").join("sheetgate.lock")
    }
}

fn default_workdir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("sheetgate"))
        .unwrap_or_else(|| PathBuf::from("."))
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

/// `<config dir>/sheetgate/sheetgate.yaml`
pub fn default_path() -> Result<PathBuf, CoreError> {
    let dir = dirs::config_dir().ok_or(CoreError::ConfigDirNotFound)?;
    Ok(dir.join("sheetgate").join("sheetgate.yaml"))
}

/// Load the configuration at `path`.
///
/// Returns `CoreError::ConfigNotFound` if absent, `CoreError::Parse` (with
/// path and line context) if malformed.
pub fn load_at(path: &Path) -> Result<Config, CoreError> {
    if !path.exists() {
        return Err(CoreError::ConfigNotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&contents).map_err(|e| CoreError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// `load_at` for the default path.
pub fn load() -> Result<Config, CoreError> {
    load_at(&default_path()?)
}

/// Save atomically (`.tmp` + rename), creating parent directories.
pub fn save_at(path: &Path, config: &Config) -> Result<(), CoreError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let yaml = serde_yaml::to_string(config).map_err(|e| CoreError::Serialize {
        path: path.to_path_buf(),
        source: e,
    })?;
    let tmp = path.with_extension("yaml.tmp");
    std::fs::write(&tmp, yaml)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
