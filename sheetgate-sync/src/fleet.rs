//! Device side of a sync: the [`DeviceFleet`] capability, per-device
//! [`Report`]s and the bundled [`LocalFleet`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use sheetgate_core::{acl::compare, Acl, Card, DeviceConfig, DeviceId};

use crate::error::{io_err, SyncError};

/// Outcome of pushing an ACL to one device. Card numbers only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    pub unchanged: BTreeSet<u32>,
    pub updated: BTreeSet<u32>,
    pub added: BTreeSet<u32>,
    pub deleted: BTreeSet<u32>,
    pub failed: BTreeSet<u32>,
    pub errored: BTreeSet<u32>,
}

impl Report {
    /// Anything worth an audit report entry.
    pub fn is_interesting(&self) -> bool {
        !(self.updated.is_empty()
            && self.added.is_empty()
            && self.deleted.is_empty()
            && self.failed.is_empty()
            && self.errored.is_empty())
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unchanged:{}  updated:{}  added:{}  deleted:{}  failed:{}  errors:{}",
            self.unchanged.len(),
            self.updated.len(),
            self.added.len(),
            self.deleted.len(),
            self.failed.len(),
            self.errored.len()
        )
    }
}

/// A device that could not be read or written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceError {
    pub device: DeviceId,
    pub message: String,
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.device, self.message)
    }
}

impl From<DeviceError> for SyncError {
    fn from(e: DeviceError) -> Self {
        SyncError::Device {
            device: e.device,
            message: e.message,
        }
    }
}

/// Result of [`DeviceFleet::put_acl`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushResult {
    pub reports: BTreeMap<DeviceId, Report>,
    /// Failures not attributable to a single device.
    pub errors: Vec<String>,
}

pub trait DeviceFleet {
    fn device_ids(&self) -> Vec<DeviceId>;

    /// Current cards on every device. Devices that cannot be read are
    /// returned as errors and left out of the ACL.
    fn get_acl(&self) -> (Acl, Vec<DeviceError>);

    /// Bring every device in `acl` in line with it. Per-device failures are
    /// recorded in that device's report.
    fn put_acl(&mut self, acl: &Acl, with_pin: bool, dry_run: bool) -> PushResult;
}

// ---------------------------------------------------------------------------
// Local fleet
// ---------------------------------------------------------------------------

/// Devices backed by card snapshots on disk: `<dir>/<device id>.json`, a JSON
/// array of cards. A device without a snapshot holds no cards.
#[derive(Debug, Clone)]
pub struct LocalFleet {
    dir: PathBuf,
    devices: Vec<DeviceId>,
}

impl LocalFleet {
    pub fn new(dir: impl Into<PathBuf>, devices: &[DeviceConfig]) -> Self {
        Self {
            dir: dir.into(),
            devices: devices.iter().map(|d| d.id).collect(),
        }
    }

    pub fn snapshot_path(&self, device: DeviceId) -> PathBuf {
        self.dir.join(format!("{device}.json"))
    }

    pub fn load(&self, device: DeviceId) -> Result<BTreeMap<u32, Card>, SyncError> {
        let path = self.snapshot_path(device);
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        let cards: Vec<Card> = serde_json::from_str(&contents)?;
        Ok(cards.into_iter().map(|c| (c.card_number, c)).collect())
    }

    pub fn store(&self, device: DeviceId, cards: &BTreeMap<u32, Card>) -> Result<(), SyncError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| io_err(&self.dir, e))?;
        let path = self.snapshot_path(device);
        let list: Vec<&Card> = cards.values().collect();
        let json = serde_json::to_string_pretty(&list)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| io_err(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl DeviceFleet for LocalFleet {
    fn device_ids(&self) -> Vec<DeviceId> {
        self.devices.clone()
    }

    fn get_acl(&self) -> (Acl, Vec<DeviceError>) {
        let mut acl = Acl::new();
        let mut errors = Vec::new();
        for &device in &self.devices {
            match self.load(device) {
                Ok(cards) => {
                    acl.insert(device, cards);
                }
                Err(e) => errors.push(DeviceError {
                    device,
                    message: e.to_string(),
                }),
            }
        }
        (acl, errors)
    }

    fn put_acl(&mut self, acl: &Acl, with_pin: bool, dry_run: bool) -> PushResult {
        let mut result = PushResult::default();

        for (&device, wanted) in acl {
            if !self.devices.contains(&device) {
                result.errors.push(format!("device {device} is not configured"));
                continue;
            }

            let mut report = Report::default();
            let current = match self.load(device) {
                Ok(cards) => cards,
                Err(e) => {
                    tracing::warn!(device = %device, error = %e, "unable to read device");
                    report.failed = wanted.keys().copied().collect();
                    result.reports.insert(device, report);
                    continue;
                }
            };

            let mut stored = wanted.clone();
            if !with_pin {
                for (number, card) in stored.iter_mut() {
                    card.pin = current.get(number).and_then(|held| held.pin);
                }
            }

            let desired = Acl::from([(device, wanted.clone())]);
            let held = Acl::from([(device, current)]);
            let diff = compare(&held, &desired, with_pin);
            let Some(diff) = diff.get(&device) else {
                continue;
            };

            report.unchanged = numbers(&diff.unchanged);
            let changed = [
                numbers(&diff.updated),
                numbers(&diff.added),
                numbers(&diff.deleted),
            ];

            if !dry_run && diff.has_changes() {
                if let Err(e) = self.store(device, &stored) {
                    tracing::warn!(device = %device, error = %e, "unable to update device");
                    report.failed = changed.into_iter().flatten().collect();
                    result.reports.insert(device, report);
                    continue;
                }
            }

            let [updated, added, deleted] = changed;
            report.updated = updated;
            report.added = added;
            report.deleted = deleted;
            result.reports.insert(device, report);
        }

        result
    }
}

fn numbers(cards: &[Card]) -> BTreeSet<u32> {
    cards.iter().map(|c| c.card_number).collect()
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use sheetgate_core::{table::parse_date, Permission};
    use tempfile::TempDir;

    fn card(number: u32, door: Permission) -> Card {
        Card {
            card_number: number,
            pin: None,
            from: parse_date("2023-01-01").expect("from"),
            to: parse_date("2023-12-31").expect("to"),
            doors: [door, Permission::None, Permission::None, Permission::None],
        }
    }

    fn fleet(dir: &Path) -> LocalFleet {
        LocalFleet::new(
            dir,
            &[
                DeviceConfig::new(1, "A", ["Gate", "", "", ""]),
                DeviceConfig::new(2, "B", ["Gate", "", "", ""]),
            ],
        )
    }

    #[test]
    fn devices_without_snapshots_are_empty() {
        let tmp = TempDir::new().expect("tempdir");
        let (acl, errors) = fleet(tmp.path()).get_acl();
        assert!(errors.is_empty());
        assert_eq!(acl.len(), 2);
        assert!(acl.values().all(|cards| cards.is_empty()));
    }

    #[test]
    fn corrupt_snapshot_is_a_device_error() {
        let tmp = TempDir::new().expect("tempdir");
        let fleet = fleet(tmp.path());
        std::fs::write(fleet.snapshot_path(DeviceId(2)), "[{").expect("write");

        let (acl, errors) = fleet.get_acl();
        assert_eq!(acl.keys().copied().collect::<Vec<_>>(), vec![DeviceId(1)]);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].device, DeviceId(2));
    }

    #[test]
    fn put_reports_and_stores_changes() {
        let tmp = TempDir::new().expect("tempdir");
        let mut fleet = fleet(tmp.path());
        fleet
            .store(
                DeviceId(1),
                &BTreeMap::from([
                    (10, card(10, Permission::Allow)),
                    (11, card(11, Permission::Allow)),
                    (12, card(12, Permission::Allow)),
                ]),
            )
            .expect("seed");

        let wanted = BTreeMap::from([
            (10, card(10, Permission::Allow)),
            (11, card(11, Permission::None)),
            (13, card(13, Permission::Allow)),
        ]);
        let result = fleet.put_acl(&Acl::from([(DeviceId(1), wanted.clone())]), false, false);

        assert!(result.errors.is_empty());
        let report = &result.reports[&DeviceId(1)];
        assert_eq!(report.unchanged, BTreeSet::from([10]));
        assert_eq!(report.updated, BTreeSet::from([11]));
        assert_eq!(report.added, BTreeSet::from([13]));
        assert_eq!(report.deleted, BTreeSet::from([12]));
        assert_eq!(fleet.load(DeviceId(1)).expect("load"), wanted);
    }

    #[test]
    fn push_without_pins_keeps_the_pins_on_the_device() {
        let tmp = TempDir::new().expect("tempdir");
        let mut fleet = fleet(tmp.path());
        let with_pin = Card {
            pin: Some(1234),
            ..card(1, Permission::Allow)
        };
        fleet
            .store(
                DeviceId(1),
                &BTreeMap::from([(1, with_pin), (2, card(2, Permission::Allow))]),
            )
            .expect("seed");

        let wanted = BTreeMap::from([
            (1, card(1, Permission::Allow)),
            (2, card(2, Permission::None)),
            (3, card(3, Permission::Allow)),
        ]);
        let result = fleet.put_acl(&Acl::from([(DeviceId(1), wanted)]), false, false);

        let report = &result.reports[&DeviceId(1)];
        assert_eq!(report.unchanged, BTreeSet::from([1]));
        assert_eq!(report.updated, BTreeSet::from([2]));
        let held = fleet.load(DeviceId(1)).expect("load");
        assert_eq!(held[&1].pin, Some(1234));
        assert_eq!(held[&2].doors[0], Permission::None);
        assert_eq!(held[&3].pin, None);
    }

    #[test]
    fn dry_run_leaves_devices_alone() {
        let tmp = TempDir::new().expect("tempdir");
        let mut fleet = fleet(tmp.path());
        let wanted = BTreeMap::from([(10, card(10, Permission::Allow))]);

        let result = fleet.put_acl(&Acl::from([(DeviceId(2), wanted)]), false, true);

        assert_eq!(result.reports[&DeviceId(2)].added, BTreeSet::from([10]));
        assert!(!fleet.snapshot_path(DeviceId(2)).exists());
    }

    #[test]
    fn unknown_device_is_a_hard_error() {
        let tmp = TempDir::new().expect("tempdir");
        let acl = Acl::from([(DeviceId(99), BTreeMap::new())]);
        let result = fleet(tmp.path()).put_acl(&acl, false, false);
        assert_eq!(result.errors, vec!["device 99 is not configured".to_string()]);
        assert!(result.reports.is_empty());
    }
}
