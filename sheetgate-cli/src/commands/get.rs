//! `sheetgate get`: download the ACL worksheet as TSV.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use sheetgate_core::{extract, Config};

use super::{resolve_range, SheetArgs};

/// Arguments for `sheetgate get`.
#[derive(Args, Debug)]
pub struct GetArgs {
    #[command(flatten)]
    pub sheet: SheetArgs,

    /// ACL range, e.g. `ACL!A1:K`.
    #[arg(long)]
    pub range: Option<String>,

    /// Write to this file instead of stdout.
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Keep the PIN column.
    #[arg(long)]
    pub with_pin: bool,
}

impl GetArgs {
    pub fn run(self, config: &Config) -> Result<()> {
        let store = self.sheet.open(config)?;
        let range = resolve_range(
            self.range.as_deref(),
            config.sheets.acl_range.as_deref(),
            "--range",
        )?;

        let grid = store
            .read(&range)
            .with_context(|| format!("failed to read {range}"))?;
        let table = extract(&grid, self.with_pin).context("invalid ACL worksheet")?;
        let tsv = table.to_tsv().context("failed to render TSV")?;

        match &self.file {
            Some(path) => {
                std::fs::write(path, tsv)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                eprintln!("{} records written to {}", table.records().len(), path.display());
            }
            None => print!("{tsv}"),
        }
        Ok(())
    }
}
