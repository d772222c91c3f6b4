//! sheetgate: keep access controllers in step with a spreadsheet ACL.
//!
//! # Usage
//!
//! ```text
//! sheetgate sync [--range ACL!A1:K] [--force] [--strict] [--dry-run] [--no-log] [--no-report]
//! sheetgate compare [--range ...] [--report-range Diff!A1:D]
//! sheetgate get [--range ...] [--file acl.tsv]
//! sheetgate put <file.tsv> [--range ...]
//! sheetgate upload [--range ...]
//! sheetgate revision [--json]
//! ```
//!
//! Every command takes `--workbook <file>` or `--url <sheet url>`; both
//! default to the configuration file.

mod commands;
mod google;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use commands::{
    compare::CompareArgs, get::GetArgs, put::PutArgs, revision::RevisionArgs, sync::SyncArgs,
    upload::UploadArgs,
};
use sheetgate_core::{config, Config, CoreError};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "sheetgate",
    version,
    about = "Synchronise access controller cards with a spreadsheet ACL",
    long_about = None,
)]
struct Cli {
    /// Configuration file (default: <config dir>/sheetgate/sheetgate.yaml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging. RUST_LOG takes precedence.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Push the spreadsheet ACL to the devices if the sheet has changed.
    Sync(SyncArgs),

    /// Show what a sync would change on each device.
    Compare(CompareArgs),

    /// Download the ACL worksheet as TSV.
    Get(GetArgs),

    /// Upload a TSV file to the ACL worksheet.
    Put(PutArgs),

    /// Write the cards currently on the devices to a worksheet.
    Upload(UploadArgs),

    /// Show the stored and latest spreadsheet revisions.
    Revision(RevisionArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let config = load_config(cli.config.as_deref())?;
    tracing::debug!(
        workdir = %config.workdir.display(),
        devices = config.devices.len(),
        "configuration loaded"
    );
    match cli.command {
        Commands::Sync(args) => args.run(&config),
        Commands::Compare(args) => args.run(&config),
        Commands::Get(args) => args.run(&config),
        Commands::Put(args) => args.run(&config),
        Commands::Upload(args) => args.run(&config),
        Commands::Revision(args) => args.run(&config),
    }
}

/// An explicit `--config` must exist; a missing default file means defaults.
fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => config::load_at(path)
            .with_context(|| format!("failed to load configuration {}", path.display())),
        None => match config::load() {
            Err(CoreError::ConfigNotFound { .. }) => Ok(Config::default()),
            other => other.context("failed to load configuration"),
        },
    }
}

fn init_tracing(debug: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
