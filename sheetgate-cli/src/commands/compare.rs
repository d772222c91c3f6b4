//! `sheetgate compare`: diff the spreadsheet ACL against the devices.

use anyhow::{Context, Result};
use chrono::Local;
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use sheetgate_core::{acl::parse_table, compare, extract, Config};
use sheetgate_sync::{audit, DeviceFleet, LocalFleet};

use super::{parse_range, resolve_range, SheetArgs};

/// Arguments for `sheetgate compare`.
#[derive(Args, Debug)]
pub struct CompareArgs {
    #[command(flatten)]
    pub sheet: SheetArgs,

    /// ACL range, e.g. `ACL!A1:K`.
    #[arg(long)]
    pub range: Option<String>,

    /// Also write the comparison to this range.
    #[arg(long)]
    pub report_range: Option<String>,

    /// Fail on duplicate card numbers.
    #[arg(long)]
    pub strict: bool,

    /// The ACL has a PIN column.
    #[arg(long)]
    pub with_pin: bool,
}

#[derive(Tabled)]
struct DiffRow {
    #[tabled(rename = "device")]
    device: String,
    #[tabled(rename = "unchanged")]
    unchanged: usize,
    #[tabled(rename = "updated")]
    updated: usize,
    #[tabled(rename = "added")]
    added: usize,
    #[tabled(rename = "deleted")]
    deleted: usize,
}

impl CompareArgs {
    pub fn run(self, config: &Config) -> Result<()> {
        let mut store = self.sheet.open(config)?;
        let range = resolve_range(
            self.range.as_deref(),
            config.sheets.acl_range.as_deref(),
            "--range",
        )?;

        let grid = store
            .read(&range)
            .with_context(|| format!("failed to read {range}"))?;
        let table = extract(&grid, self.with_pin).context("invalid ACL worksheet")?;
        let parsed =
            parse_table(&table, &config.devices, self.strict).context("invalid ACL worksheet")?;
        for warning in &parsed.warnings {
            eprintln!("{} {warning}", "warning:".yellow());
        }
        for card in &parsed.duplicates {
            eprintln!("{} duplicate card number {card} ignored", "warning:".yellow());
        }

        let fleet = LocalFleet::new(config.fleet_dir(), &config.devices);
        let (current, errors) = fleet.get_acl();
        for e in &errors {
            eprintln!("{} {e}", "unreachable:".red());
        }

        let mut desired = parsed.acl;
        for e in &errors {
            desired.remove(&e.device);
        }
        let diff = compare(&current, &desired, self.with_pin);
        let rows: Vec<DiffRow> = diff
            .iter()
            .map(|(device, d)| DiffRow {
                device: device.to_string(),
                unchanged: d.unchanged.len(),
                updated: d.updated.len(),
                added: d.added.len(),
                deleted: d.deleted.len(),
            })
            .collect();

        if rows.is_empty() {
            println!("No devices configured.");
        } else {
            let mut out = Table::new(rows);
            out.with(Style::rounded());
            println!("{out}");
        }

        if let Some(spec) = &self.report_range {
            let report = parse_range(spec)?;
            audit::write_compare_report(store.as_mut(), &diff, &report, Local::now())
                .with_context(|| format!("failed to write {report}"))?;
            println!("{} comparison written to {report}", "✓".green());
        }

        Ok(())
    }
}
