//! Subcommands, plus the spreadsheet and range plumbing they share.

pub mod compare;
pub mod get;
pub mod put;
pub mod revision;
pub mod sync;
pub mod upload;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;

use sheetgate_core::{types::row, A1Range, Config, Grid, Table};
use sheetgate_sync::{LocalWorkbook, SpreadsheetStore};

use crate::google::GoogleSheets;

/// Environment variable holding a bearer token when `--token-file` is absent.
pub const TOKEN_ENV: &str = "SHEETGATE_TOKEN";

/// Where the spreadsheet lives. Falls back to `sheets.workbook` / `sheets.url`
/// from the configuration.
#[derive(Args, Debug, Clone, Default)]
pub struct SheetArgs {
    /// Local workbook file (JSON) to use instead of Google Sheets.
    #[arg(long, conflicts_with = "url")]
    pub workbook: Option<PathBuf>,

    /// Google Sheets URL.
    #[arg(long)]
    pub url: Option<String>,

    /// File holding an OAuth bearer token (default: $SHEETGATE_TOKEN).
    #[arg(long)]
    pub token_file: Option<PathBuf>,
}

impl SheetArgs {
    pub fn open(&self, config: &Config) -> Result<Box<dyn SpreadsheetStore>> {
        let workbook = match (&self.workbook, &self.url) {
            (Some(path), _) => Some(path.clone()),
            (None, Some(_)) => None,
            (None, None) => config.sheets.workbook.clone(),
        };
        if let Some(path) = workbook {
            let book = LocalWorkbook::open(&path)
                .with_context(|| format!("failed to open workbook {}", path.display()))?;
            return Ok(Box::new(book));
        }

        let url = self
            .url
            .clone()
            .or_else(|| config.sheets.url.clone())
            .context("no spreadsheet configured; pass --url or --workbook")?;
        let token = self.token()?;
        let sheets = GoogleSheets::new(&url, &token).context("invalid spreadsheet URL")?;
        Ok(Box::new(sheets))
    }

    fn token(&self) -> Result<String> {
        match &self.token_file {
            Some(path) => std::fs::read_to_string(path)
                .with_context(|| format!("failed to read token file {}", path.display())),
            None => std::env::var(TOKEN_ENV)
                .with_context(|| format!("no access token; pass --token-file or set ${TOKEN_ENV}")),
        }
    }
}

/// The range given on the command line, else the configured one.
pub fn resolve_range(arg: Option<&str>, configured: Option<&str>, flag: &str) -> Result<A1Range> {
    let Some(spec) = arg.or(configured) else {
        bail!("no range configured; pass {flag}");
    };
    Ok(A1Range::parse(spec)?)
}

pub fn parse_range(spec: &str) -> Result<A1Range> {
    Ok(A1Range::parse(spec)?)
}

/// Replace the contents of `range` with `table`: header in the first row,
/// records below. The whole range is cleared first. Returns the record count.
pub fn write_table(
    store: &mut dyn SpreadsheetStore,
    range: &A1Range,
    table: &Table,
) -> Result<usize> {
    store
        .batch_clear(&[range.clone()])
        .with_context(|| format!("failed to clear {range}"))?;

    let mut grid: Grid = vec![row(table.header())];
    grid.extend(table.records().iter().map(|record| row(record)));
    let written = grid.len();
    store
        .batch_update(&[(range.clone(), grid)])
        .with_context(|| format!("failed to write {range}"))?;
    Ok(written - 1)
}
