//! Sync pipeline entrypoint used by the CLI.
//!
//! One call to [`run`] is one scheduled invocation:
//!
//! ```text
//! lock → revision check → read ACL range → extract → parse → compare
//!      → push → log + report → persist revision → unlock
//! ```
//!
//! Every step after the revision check may end the run early. The lock is
//! released on every exit path. A dry run leaves the devices alone and
//! writes a marked audit trail, but does not persist the revision.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};

use sheetgate_core::{
    acl::parse_table, compare, extract, A1Range, AclError, Cell, Config, DeviceConfig, DeviceId,
    Diff, Revision, RevisionFetchPolicy, TableError,
};

use crate::audit;
use crate::events::{EventSink, SyncEvent};
use crate::fleet::{DeviceFleet, Report};
use crate::lock::LockFile;
use crate::revision::{self, SyncDecision};
use crate::store::SpreadsheetStore;
use crate::SyncError;

/// Everything a run needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub acl_range: A1Range,
    pub log_range: Option<A1Range>,
    pub log_retention_days: u32,
    pub report_range: Option<A1Range>,
    pub report_retention_days: u32,
    pub stability_delay: Duration,
    pub revision_path: PathBuf,
    pub lock_path: PathBuf,
    pub devices: Vec<DeviceConfig>,
    pub on_revision_error: RevisionFetchPolicy,
    /// Sync even when the revision or the diff says there is nothing to do.
    pub force: bool,
    /// Fail on duplicate card numbers instead of reporting them.
    pub strict: bool,
    pub dry_run: bool,
    pub no_log: bool,
    pub no_report: bool,
    /// Rewrite the report even when nothing happened.
    pub always_report: bool,
    pub with_pin: bool,
}

impl SyncSettings {
    /// Settings from configuration, with the log and report ranges parsed and
    /// the revision file keyed by `document_id`. All flags start off.
    pub fn new(config: &Config, document_id: &str, acl_range: A1Range) -> Result<Self, SyncError> {
        let sheets = &config.sheets;
        let parse = |range: &Option<String>| range.as_deref().map(A1Range::parse).transpose();

        Ok(Self {
            acl_range,
            log_range: parse(&sheets.log_range)?,
            log_retention_days: sheets.log_retention_days,
            report_range: parse(&sheets.report_range)?,
            report_retention_days: sheets.report_retention_days,
            stability_delay: sheets.stability_delay(),
            revision_path: config.revision_path(document_id),
            lock_path: config.lock_path(),
            devices: config.devices.clone(),
            on_revision_error: sheets.on_revision_error,
            force: false,
            strict: false,
            dry_run: false,
            no_log: false,
            no_report: false,
            always_report: false,
            with_pin: false,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The spreadsheet has not changed, or changed too recently.
    SkippedNoChange,
    /// The spreadsheet changed but the devices already match it.
    SkippedNoDiff,
    Synced {
        reports: BTreeMap<DeviceId, Report>,
        dry_run: bool,
    },
}

/// Run one sync under the lock at `settings.lock_path`.
pub fn run(
    settings: &SyncSettings,
    sheets: &mut dyn SpreadsheetStore,
    fleet: &mut dyn DeviceFleet,
    sink: &dyn EventSink,
    now: DateTime<Local>,
) -> Result<RunOutcome, SyncError> {
    let lock = match LockFile::acquire(&settings.lock_path) {
        Ok(lock) => lock,
        Err(e) => {
            if let SyncError::Locked { path } = &e {
                sink.emit(SyncEvent::LockDenied { path: path.clone() });
            }
            return Err(e);
        }
    };

    let outcome = execute(settings, sheets, fleet, sink, now);
    let released = lock.release();
    let outcome = outcome?;
    released?;
    Ok(outcome)
}

fn execute(
    settings: &SyncSettings,
    sheets: &mut dyn SpreadsheetStore,
    fleet: &mut dyn DeviceFleet,
    sink: &dyn EventSink,
    now: DateTime<Local>,
) -> Result<RunOutcome, SyncError> {
    // -- revision ------------------------------------------------------------
    let (candidate, decision) = check_revision(settings, &*sheets, sink, now)?;
    match decision {
        SyncDecision::Changed => {}
        _ if settings.force => sink.emit(SyncEvent::Forced),
        SyncDecision::Unchanged => {
            persist(settings, candidate.as_ref(), sink)?;
            return Ok(RunOutcome::SkippedNoChange);
        }
        // Not persisted: a stored TooRecent revision would read as Unchanged
        // once it settles and the edit would never be synced.
        SyncDecision::TooRecent { .. } => return Ok(RunOutcome::SkippedNoChange),
    }

    // -- spreadsheet ---------------------------------------------------------
    let grid = sheets.read(&settings.acl_range)?;
    if grid.iter().flatten().all(Cell::is_blank) {
        return Err(SyncError::NoData {
            range: settings.acl_range.to_string(),
        });
    }
    let table = extract(&grid, settings.with_pin)?;
    let parsed = parse_table(&table, &settings.devices, settings.strict).map_err(|e| match e {
        AclError::DuplicateCard(card) => SyncError::StrictDuplicate { card },
        AclError::MissingColumn(column) => TableError::MissingColumn(column).into(),
    })?;
    for warning in &parsed.warnings {
        sink.emit(SyncEvent::TableWarning {
            message: warning.to_string(),
        });
    }
    for &card in &parsed.duplicates {
        sink.emit(SyncEvent::DuplicateCard { card });
    }

    // -- devices -------------------------------------------------------------
    let (current, unreachable) = fleet.get_acl();
    if current.is_empty() && !unreachable.is_empty() {
        let messages: Vec<String> = unreachable.iter().map(ToString::to_string).collect();
        return Err(SyncError::Diff(messages.join("; ")));
    }

    let mut desired = parsed.acl;
    let mut offline: BTreeMap<DeviceId, Report> = BTreeMap::new();
    for e in unreachable {
        let failed: BTreeSet<u32> = desired
            .remove(&e.device)
            .map(|cards| cards.into_keys().collect())
            .unwrap_or_default();
        offline.insert(
            e.device,
            Report {
                failed,
                ..Report::default()
            },
        );
        sink.emit(SyncEvent::DeviceUnreachable {
            device: e.device,
            message: e.message,
        });
    }

    let diff = compare(&current, &desired, settings.with_pin);
    if !settings.force && !diff.values().any(Diff::has_changes) {
        sink.emit(SyncEvent::NoChanges);
        if !settings.dry_run {
            persist(settings, candidate.as_ref(), sink)?;
        }
        return Ok(RunOutcome::SkippedNoDiff);
    }

    let pushed = fleet.put_acl(&desired, settings.with_pin, settings.dry_run);
    if !pushed.errors.is_empty() {
        return Err(SyncError::HardPush(pushed.errors));
    }

    let mut reports = pushed.reports;
    for (device, report) in offline {
        reports.entry(device).or_default().failed.extend(report.failed);
    }
    merge_duplicates(&mut reports, &parsed.duplicates);

    for (&device, report) in &reports {
        sink.emit(SyncEvent::DeviceUpdated {
            device,
            report: report.clone(),
            dry_run: settings.dry_run,
        });
    }

    // -- audit ---------------------------------------------------------------
    if let Some(range) = settings.log_range.as_ref().filter(|_| !settings.no_log) {
        audit::write_log(
            sheets,
            &reports,
            range,
            settings.log_retention_days,
            settings.dry_run,
            now,
            sink,
        )?;
    }
    if let Some(range) = settings.report_range.as_ref().filter(|_| !settings.no_report) {
        audit::write_report(
            sheets,
            &reports,
            range,
            settings.report_retention_days,
            settings.always_report,
            settings.dry_run,
            now,
            sink,
        )?;
    }

    // A dry run leaves the revision unsynced for the next real run.
    if !settings.dry_run {
        persist(settings, candidate.as_ref(), sink)?;
    }
    Ok(RunOutcome::Synced {
        reports,
        dry_run: settings.dry_run,
    })
}

/// Latest revision of the document and whether it warrants a sync. A failed
/// lookup either aborts or counts as a change, as configured.
fn check_revision(
    settings: &SyncSettings,
    sheets: &dyn SpreadsheetStore,
    sink: &dyn EventSink,
    now: DateTime<Local>,
) -> Result<(Option<Revision>, SyncDecision), SyncError> {
    let latest = sheets.list_revisions().and_then(|entries| {
        revision::latest(sheets.document_id(), &entries)
            .ok_or_else(|| SyncError::RevisionFetch("no revisions listed".to_string()))
    });

    let candidate = match latest {
        Ok(candidate) => candidate,
        Err(e) => {
            sink.emit(SyncEvent::RevisionFetchFailed {
                message: e.to_string(),
            });
            return match settings.on_revision_error {
                RevisionFetchPolicy::Proceed => Ok((None, SyncDecision::Changed)),
                RevisionFetchPolicy::Abort => Err(match e {
                    SyncError::RevisionFetch(_) => e,
                    other => SyncError::RevisionFetch(other.to_string()),
                }),
            };
        }
    };

    let last = revision::load(&settings.revision_path);
    let decision = revision::evaluate(
        &candidate,
        last.as_ref(),
        settings.stability_delay,
        now.with_timezone(&Utc),
    );
    let id = candidate.revision_id.clone();
    sink.emit(match &decision {
        SyncDecision::Unchanged => SyncEvent::RevisionUnchanged { revision: id },
        SyncDecision::TooRecent { age } => SyncEvent::RevisionTooRecent {
            revision: id,
            age: *age,
        },
        SyncDecision::Changed => SyncEvent::RevisionChanged { revision: id },
    });

    Ok((Some(candidate), decision))
}

fn persist(
    settings: &SyncSettings,
    candidate: Option<&Revision>,
    sink: &dyn EventSink,
) -> Result<(), SyncError> {
    let Some(revision) = candidate else {
        return Ok(());
    };
    revision::save(&settings.revision_path, revision)?;
    sink.emit(SyncEvent::RevisionPersisted {
        revision: revision.revision_id.clone(),
    });
    Ok(())
}

/// Duplicate card numbers are errors on every device.
fn merge_duplicates(reports: &mut BTreeMap<DeviceId, Report>, duplicates: &BTreeSet<u32>) {
    if duplicates.is_empty() {
        return;
    }
    for report in reports.values_mut() {
        report.errored.extend(duplicates.iter().copied());
    }
}
