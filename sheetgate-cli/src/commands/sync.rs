//! `sheetgate sync`: one scheduled reconciliation run.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use sheetgate_core::{Config, DeviceId};
use sheetgate_sync::{run, LocalFleet, Report, RunOutcome, SyncSettings, TracingSink};

use super::{parse_range, resolve_range, SheetArgs};

/// Arguments for `sheetgate sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    #[command(flatten)]
    pub sheet: SheetArgs,

    /// ACL range, e.g. `ACL!A1:K`.
    #[arg(long)]
    pub range: Option<String>,

    /// Log range, e.g. `Log!A1:H`.
    #[arg(long)]
    pub log_range: Option<String>,

    /// Days of log rows to keep.
    #[arg(long)]
    pub log_retention: Option<u32>,

    /// Report range, e.g. `Report!A1:D`.
    #[arg(long)]
    pub report_range: Option<String>,

    /// Days of report rows to keep.
    #[arg(long)]
    pub report_retention: Option<u32>,

    /// Seconds a revision must be left alone before it is synced.
    #[arg(long)]
    pub delay: Option<u64>,

    /// Lock file (default: <workdir>/sheets/sheetgate.lock).
    #[arg(long)]
    pub lockfile: Option<PathBuf>,

    /// Sync even if the spreadsheet and devices look unchanged.
    #[arg(long)]
    pub force: bool,

    /// Fail on duplicate card numbers.
    #[arg(long)]
    pub strict: bool,

    /// Compare and report without updating devices or the spreadsheet.
    #[arg(long)]
    pub dry_run: bool,

    #[arg(long)]
    pub no_log: bool,

    #[arg(long)]
    pub no_report: bool,

    /// Rewrite the report even when nothing changed.
    #[arg(long)]
    pub always_report: bool,

    /// The ACL has a PIN column.
    #[arg(long)]
    pub with_pin: bool,
}

impl SyncArgs {
    pub fn run(self, config: &Config) -> Result<()> {
        let mut store = self.sheet.open(config)?;
        let acl_range = resolve_range(
            self.range.as_deref(),
            config.sheets.acl_range.as_deref(),
            "--range",
        )?;
        let mut settings = SyncSettings::new(config, store.document_id(), acl_range)
            .context("invalid sheets configuration")?;

        if let Some(spec) = &self.log_range {
            settings.log_range = Some(parse_range(spec)?);
        }
        if let Some(spec) = &self.report_range {
            settings.report_range = Some(parse_range(spec)?);
        }
        if let Some(days) = self.log_retention {
            settings.log_retention_days = days;
        }
        if let Some(days) = self.report_retention {
            settings.report_retention_days = days;
        }
        if let Some(secs) = self.delay {
            settings.stability_delay = Duration::from_secs(secs);
        }
        if let Some(path) = self.lockfile {
            settings.lock_path = path;
        }
        settings.force = self.force;
        settings.strict = self.strict;
        settings.dry_run = self.dry_run;
        settings.no_log = self.no_log;
        settings.no_report = self.no_report;
        settings.always_report = self.always_report;
        settings.with_pin = self.with_pin;

        let mut fleet = LocalFleet::new(config.fleet_dir(), &config.devices);
        let outcome = run(
            &settings,
            store.as_mut(),
            &mut fleet,
            &TracingSink,
            Local::now(),
        )
        .context("sync failed")?;

        print_outcome(&outcome);
        Ok(())
    }
}

#[derive(Tabled)]
struct ReportRow {
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
    #[tabled(rename = "failed")]
    failed: usize,
    #[tabled(rename = "errors")]
    errors: usize,
}

fn print_outcome(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::SkippedNoChange => {
            println!("{} spreadsheet unchanged, nothing to do", "✓".green())
        }
        RunOutcome::SkippedNoDiff => {
            println!("{} devices already match the spreadsheet", "✓".green())
        }
        RunOutcome::Synced { reports, dry_run } => {
            let prefix = if *dry_run { "[dry-run] " } else { "" };
            let failures: usize = reports
                .values()
                .map(|r| r.failed.len() + r.errored.len())
                .sum();
            if failures == 0 {
                println!("{prefix}{} synced {} device(s)", "✓".green(), reports.len());
            } else {
                println!(
                    "{prefix}{} synced {} device(s), {failures} card(s) failed",
                    "!".yellow(),
                    reports.len()
                );
            }
            print_reports(reports);
        }
    }
}

fn print_reports(reports: &BTreeMap<DeviceId, Report>) {
    let rows: Vec<ReportRow> = reports
        .iter()
        .map(|(device, r)| ReportRow {
            device: device.to_string(),
            unchanged: r.unchanged.len(),
            updated: r.updated.len(),
            added: r.added.len(),
            deleted: r.deleted.len(),
            failed: r.failed.len(),
            errors: r.errored.len(),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}
