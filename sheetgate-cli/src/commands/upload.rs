//! `sheetgate upload`: write the cards held by the devices to a worksheet.

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use sheetgate_core::{make_table, Config};
use sheetgate_sync::{DeviceFleet, LocalFleet};

use super::{resolve_range, write_table, SheetArgs};

/// Arguments for `sheetgate upload`.
#[derive(Args, Debug)]
pub struct UploadArgs {
    #[command(flatten)]
    pub sheet: SheetArgs,

    /// Destination range, e.g. `Devices!A1:K`. Defaults to the ACL range.
    #[arg(long)]
    pub range: Option<String>,

    /// Include a PIN column.
    #[arg(long)]
    pub with_pin: bool,
}

impl UploadArgs {
    pub fn run(self, config: &Config) -> Result<()> {
        let fleet = LocalFleet::new(config.fleet_dir(), &config.devices);
        let (acl, errors) = fleet.get_acl();
        for e in &errors {
            eprintln!("{} {e}", "unreachable:".red());
        }

        let table = make_table(&acl, &config.devices, self.with_pin);
        let mut store = self.sheet.open(config)?;
        let range = resolve_range(
            self.range.as_deref(),
            config.sheets.acl_range.as_deref(),
            "--range",
        )?;
        let written = write_table(store.as_mut(), &range, &table)?;

        println!(
            "{} {written} cards from {} device(s) written to {range}",
            "✓".green(),
            acl.len()
        );
        Ok(())
    }
}
