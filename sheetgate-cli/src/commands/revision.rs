//! `sheetgate revision`: stored vs. latest spreadsheet revision.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use sheetgate_core::{Config, Revision};
use sheetgate_sync::revision::{self, SyncDecision};

use super::SheetArgs;

/// Arguments for `sheetgate revision`.
#[derive(Args, Debug)]
pub struct RevisionArgs {
    #[command(flatten)]
    pub sheet: SheetArgs,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct RevisionStatus {
    document: String,
    stored: Option<Revision>,
    latest: Option<Revision>,
    decision: &'static str,
    age_secs: Option<u64>,
}

impl RevisionArgs {
    pub fn run(self, config: &Config) -> Result<()> {
        let store = self.sheet.open(config)?;
        let document = store.document_id().to_string();

        let entries = store
            .list_revisions()
            .context("failed to list spreadsheet revisions")?;
        let latest = revision::latest(&document, &entries);
        let stored = revision::load(&config.revision_path(&document));

        let now = Utc::now();
        let decision = latest.as_ref().map(|candidate| {
            revision::evaluate(
                candidate,
                stored.as_ref(),
                config.sheets.stability_delay(),
                now,
            )
        });

        let status = RevisionStatus {
            decision: match &decision {
                None => "unknown",
                Some(SyncDecision::Unchanged) => "unchanged",
                Some(SyncDecision::TooRecent { .. }) => "too-recent",
                Some(SyncDecision::Changed) => "changed",
            },
            age_secs: latest
                .as_ref()
                .and_then(|r| (now - r.modified_at).to_std().ok())
                .map(|age| age.as_secs()),
            document,
            stored,
            latest,
        };

        if self.json {
            println!("{}", serde_json::to_string_pretty(&status)?);
            return Ok(());
        }

        println!("{} {}", "document:".bold(), status.document);
        println!("{} {}", "stored:  ".bold(), describe(status.stored.as_ref()));
        println!("{} {}", "latest:  ".bold(), describe(status.latest.as_ref()));
        let decision = match status.decision {
            "changed" => status.decision.green(),
            "too-recent" => status.decision.yellow(),
            _ => status.decision.normal(),
        };
        println!("{} {decision}", "decision:".bold());
        Ok(())
    }
}

fn describe(revision: Option<&Revision>) -> String {
    match revision {
        Some(r) => format!("{} ({})", r.revision_id, local(r.modified_at)),
        None => "-".to_string(),
    }
}

fn local(at: DateTime<Utc>) -> String {
    at.with_timezone(&chrono::Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}
