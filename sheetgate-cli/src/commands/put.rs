//! `sheetgate put <file>`: upload a TSV file to the ACL worksheet.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use sheetgate_core::{extract, parse_tsv, Config};

use super::{resolve_range, write_table, SheetArgs};

/// Arguments for `sheetgate put`.
#[derive(Args, Debug)]
pub struct PutArgs {
    /// Tab-separated file with a header row.
    pub file: PathBuf,

    #[command(flatten)]
    pub sheet: SheetArgs,

    /// ACL range, e.g. `ACL!A1:K`.
    #[arg(long)]
    pub range: Option<String>,

    /// The file has a PIN column.
    #[arg(long)]
    pub with_pin: bool,
}

impl PutArgs {
    pub fn run(self, config: &Config) -> Result<()> {
        let text = std::fs::read_to_string(&self.file)
            .with_context(|| format!("failed to read {}", self.file.display()))?;
        let grid = parse_tsv(&text)
            .with_context(|| format!("invalid ACL file {}", self.file.display()))?;
        let table = extract(&grid, self.with_pin)
            .with_context(|| format!("invalid ACL file {}", self.file.display()))?;

        let mut store = self.sheet.open(config)?;
        let range = resolve_range(
            self.range.as_deref(),
            config.sheets.acl_range.as_deref(),
            "--range",
        )?;
        let written = write_table(store.as_mut(), &range, &table)?;

        println!("{} {written} records written to {range}", "✓".green());
        Ok(())
    }
}
