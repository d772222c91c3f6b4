//! Access-control list model.
//!
//! An [`Acl`] maps every configured device to the cards it should hold. A
//! [`Table`] becomes an ACL through [`parse_table`]; [`make_table`] is the
//! inverse and [`compare`] produces the per-device [`Diff`] the sync engine
//! pushes.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::DeviceConfig;
use crate::error::{AclError, Column};
use crate::table::{normalise, parse_date, Table, DATE_FORMAT};
use crate::types::DeviceId;

/// Doors per access controller.
pub const DOORS: usize = 4;

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// Access granted to a card on one door.
///
/// Stored as a single byte: `0` no access, `1` unrestricted, `2..=254` a
/// time profile on the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Permission {
    #[default]
    None,
    Allow,
    Profile(u8),
}

impl Permission {
    /// Parse a spreadsheet cell. Returns `None` for unrecognised values.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        match value {
            "" | "N" | "n" => Some(Permission::None),
            "Y" | "y" => Some(Permission::Allow),
            _ => match value.parse::<u8>() {
                Ok(p @ 2..=254) => Some(Permission::Profile(p)),
                _ => None,
            },
        }
    }

    pub fn is_granted(self) -> bool {
        self != Permission::None
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Permission::None => write!(f, "N"),
            Permission::Allow => write!(f, "Y"),
            Permission::Profile(p) => write!(f, "{p}"),
        }
    }
}

impl From<Permission> for u8 {
    fn from(p: Permission) -> Self {
        match p {
            Permission::None => 0,
            Permission::Allow => 1,
            Permission::Profile(p) => p,
        }
    }
}

impl TryFrom<u8> for Permission {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Permission::None),
            1 => Ok(Permission::Allow),
            2..=254 => Ok(Permission::Profile(v)),
            _ => Err(format!("invalid door permission {v}")),
        }
    }
}

/// A card as held by a controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub card_number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin: Option<u32>,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub doors: [Permission; DOORS],
}

impl Card {
    /// Field-wise equality, ignoring the PIN unless `with_pin`.
    pub fn same_as(&self, other: &Card, with_pin: bool) -> bool {
        self.card_number == other.card_number
            && self.from == other.from
            && self.to == other.to
            && self.doors == other.doors
            && (!with_pin || self.pin == other.pin)
    }
}

/// Cards per device, keyed by card number.
pub type Acl = BTreeMap<DeviceId, BTreeMap<u32, Card>>;

/// Non-fatal problems found while parsing a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseWarning {
    /// A column that is neither canonical nor a configured door.
    UnmatchedColumn(String),
    /// A card number that does not fit a controller's 32-bit card field.
    InvalidCardNumber(String),
    /// A door cell that is not `Y`, `N`, blank or a time profile.
    InvalidPermission {
        card_number: u32,
        door: String,
        value: String,
    },
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseWarning::UnmatchedColumn(column) => {
                write!(f, "column '{column}' does not match any configured door")
            }
            ParseWarning::InvalidCardNumber(value) => write!(f, "invalid card number '{value}'"),
            ParseWarning::InvalidPermission {
                card_number,
                door,
                value,
            } => write!(
                f,
                "card {card_number}: invalid permission '{value}' for door '{door}'"
            ),
        }
    }
}

/// The result of [`parse_table`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedAcl {
    pub acl: Acl,
    /// Card numbers found on more than one row, excluded from `acl`.
    pub duplicates: BTreeSet<u32>,
    pub warnings: Vec<ParseWarning>,
}

/// Changes needed to bring one device in line with the desired ACL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    pub unchanged: Vec<Card>,
    pub updated: Vec<Card>,
    pub added: Vec<Card>,
    pub deleted: Vec<Card>,
}

impl Diff {
    pub fn has_changes(&self) -> bool {
        !(self.updated.is_empty() && self.added.is_empty() && self.deleted.is_empty())
    }
}

pub type SystemDiff = BTreeMap<DeviceId, Diff>;

// ---------------------------------------------------------------------------
// Table → ACL
// ---------------------------------------------------------------------------

/// Build the desired ACL for every device in `devices` from a canonical table.
///
/// Every card is assigned to every device; doors a device does not have a
/// column for are left at [`Permission::None`]. A card number on more than one
/// row fails with [`AclError::DuplicateCard`] when `strict`, otherwise it is
/// dropped and listed in [`ParsedAcl::duplicates`].
pub fn parse_table(
    table: &Table,
    devices: &[DeviceConfig],
    strict: bool,
) -> Result<ParsedAcl, AclError> {
    let header = table.header();
    let with_pin = header.get(1).is_some_and(|h| normalise(h) == Column::Pin.key());
    let offset = usize::from(with_pin);

    let require = |position: usize, column: Column| match header.get(position) {
        Some(h) if normalise(h) == column.key() => Ok(()),
        _ => Err(AclError::MissingColumn(column)),
    };
    require(0, Column::CardNumber)?;
    require(1 + offset, Column::From)?;
    require(2 + offset, Column::To)?;

    let first_door = 3 + offset;
    let mut warnings = Vec::new();

    // door column index -> (device, door slot)
    let mut door_columns: BTreeMap<usize, Vec<(DeviceId, usize)>> = BTreeMap::new();
    for (ix, name) in header.iter().enumerate().skip(first_door) {
        let key = normalise(name);
        let mut targets = Vec::new();
        for device in devices {
            for (slot, door) in device.doors.iter().take(DOORS).enumerate() {
                if !door.trim().is_empty() && normalise(door) == key {
                    targets.push((device.id, slot));
                }
            }
        }
        if targets.is_empty() {
            warnings.push(ParseWarning::UnmatchedColumn(name.clone()));
        } else {
            door_columns.insert(ix, targets);
        }
    }

    let mut rows: Vec<(Card, Vec<[Permission; DOORS]>)> = Vec::new();
    let mut seen = BTreeMap::<u32, usize>::new();

    for record in table.records() {
        let field = |ix: usize| record.get(ix).map(String::as_str).unwrap_or("");

        let Ok(card_number) = field(0).trim().parse::<u32>() else {
            warnings.push(ParseWarning::InvalidCardNumber(field(0).to_string()));
            continue;
        };
        let pin = if with_pin {
            field(1).trim().parse::<u32>().ok()
        } else {
            None
        };
        let (Some(from), Some(to)) = (parse_date(field(1 + offset)), parse_date(field(2 + offset)))
        else {
            continue;
        };

        let mut per_device = vec![[Permission::None; DOORS]; devices.len()];
        for (&ix, targets) in &door_columns {
            let value = field(ix);
            let permission = Permission::parse(value).unwrap_or_else(|| {
                warnings.push(ParseWarning::InvalidPermission {
                    card_number,
                    door: header[ix].clone(),
                    value: value.to_string(),
                });
                Permission::None
            });
            for (device, slot) in targets {
                if let Some(d) = devices.iter().position(|cfg| cfg.id == *device) {
                    per_device[d][*slot] = permission;
                }
            }
        }

        *seen.entry(card_number).or_default() += 1;
        rows.push((
            Card {
                card_number,
                pin,
                from,
                to,
                doors: [Permission::None; DOORS],
            },
            per_device,
        ));
    }

    let duplicates: BTreeSet<u32> = seen
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(card, _)| card)
        .collect();

    if strict {
        if let Some(&card) = duplicates.iter().next() {
            return Err(AclError::DuplicateCard(card));
        }
    }

    let mut acl: Acl = devices.iter().map(|d| (d.id, BTreeMap::new())).collect();
    for (card, per_device) in rows {
        if duplicates.contains(&card.card_number) {
            continue;
        }
        for (device, doors) in devices.iter().zip(per_device) {
            if let Some(cards) = acl.get_mut(&device.id) {
                cards.insert(card.card_number, Card { doors, ..card.clone() });
            }
        }
    }

    Ok(ParsedAcl {
        acl,
        duplicates,
        warnings,
    })
}

// ---------------------------------------------------------------------------
// ACL → Table
// ---------------------------------------------------------------------------

/// Render an ACL as a canonical table, one row per card and one column per
/// distinct door name across `devices`.
///
/// A door shared by several devices shows the first granted permission found.
pub fn make_table(acl: &Acl, devices: &[DeviceConfig], with_pin: bool) -> Table {
    let mut doors: Vec<(String, Vec<(DeviceId, usize)>)> = Vec::new();
    for device in devices {
        for (slot, door) in device.doors.iter().take(DOORS).enumerate() {
            let name = door.trim();
            if name.is_empty() {
                continue;
            }
            let key = normalise(name);
            match doors.iter_mut().find(|(n, _)| normalise(n) == key) {
                Some((_, targets)) => targets.push((device.id, slot)),
                None => doors.push((name.to_string(), vec![(device.id, slot)])),
            }
        }
    }

    let mut header = vec!["Card Number".to_string()];
    if with_pin {
        header.push("PIN".to_string());
    }
    header.push("From".to_string());
    header.push("To".to_string());
    header.extend(doors.iter().map(|(name, _)| name.clone()));

    let mut cards: BTreeMap<u32, &Card> = BTreeMap::new();
    for device in devices {
        if let Some(list) = acl.get(&device.id) {
            for (number, card) in list {
                cards.entry(*number).or_insert(card);
            }
        }
    }

    let records = cards
        .values()
        .map(|card| {
            let mut record = vec![card.card_number.to_string()];
            if with_pin {
                record.push(card.pin.map(|p| p.to_string()).unwrap_or_default());
            }
            record.push(card.from.format(DATE_FORMAT).to_string());
            record.push(card.to.format(DATE_FORMAT).to_string());
            for (_, targets) in &doors {
                let permission = targets
                    .iter()
                    .filter_map(|(device, slot)| {
                        acl.get(device)
                            .and_then(|list| list.get(&card.card_number))
                            .map(|c| c.doors[*slot])
                    })
                    .find(|p| p.is_granted())
                    .unwrap_or_default();
                record.push(permission.to_string());
            }
            record
        })
        .collect();

    Table::from_parts(header, records)
}

// ---------------------------------------------------------------------------
// Compare
// ---------------------------------------------------------------------------

/// Compare the ACL held by the devices (`current`) with the ACL they should
/// hold (`desired`). Only devices present in `desired` are compared.
pub fn compare(current: &Acl, desired: &Acl, with_pin: bool) -> SystemDiff {
    let empty = BTreeMap::new();

    desired
        .iter()
        .map(|(device, wanted)| {
            let held = current.get(device).unwrap_or(&empty);
            let mut diff = Diff::default();

            for (number, card) in wanted {
                match held.get(number) {
                    Some(existing) if existing.same_as(card, with_pin) => {
                        diff.unchanged.push(card.clone())
                    }
                    Some(_) => diff.updated.push(card.clone()),
                    None => diff.added.push(card.clone()),
                }
            }
            diff.deleted.extend(
                held.iter()
                    .filter(|(number, _)| !wanted.contains_key(number))
                    .map(|(_, card)| card.clone()),
            );

            (*device, diff)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::extract;
    use crate::types::row;

    fn devices() -> Vec<DeviceConfig> {
        vec![
            DeviceConfig::new(405419896, "Alpha", ["Gate", "Tower", "Dungeon", "Lair"]),
            DeviceConfig::new(303986753, "Beta", ["Great Hall", "Kitchen", "", ""]),
        ]
    }

    fn date(s: &str) -> NaiveDate {
        parse_date(s).expect("date")
    }

    fn table(rows: &[&[&str]], with_pin: bool) -> Table {
        let grid = rows.iter().map(|r| row(r)).collect();
        extract(&grid, with_pin).expect("extract")
    }

    #[test]
    fn permission_cells() {
        assert_eq!(Permission::parse("Y"), Some(Permission::Allow));
        assert_eq!(Permission::parse("y"), Some(Permission::Allow));
        assert_eq!(Permission::parse("n"), Some(Permission::None));
        assert_eq!(Permission::parse(""), Some(Permission::None));
        assert_eq!(Permission::parse(" 29 "), Some(Permission::Profile(29)));
        assert_eq!(Permission::parse("1"), None);
        assert_eq!(Permission::parse("255"), None);
        assert_eq!(Permission::parse("maybe"), None);
    }

    #[test]
    fn permissions_serialize_as_bytes() {
        let yaml =
            serde_yaml::to_string(&[Permission::None, Permission::Allow, Permission::Profile(29)])
                .expect("serialize");
        let back: Vec<Permission> = serde_yaml::from_str(&yaml).expect("deserialize");
        assert_eq!(back, [Permission::None, Permission::Allow, Permission::Profile(29)]);
        assert!(serde_yaml::from_str::<Permission>("255").is_err());
    }

    #[test]
    fn parse_assigns_doors_per_device() {
        let parsed = parse_table(
            &table(
                &[
                    &["Card Number", "From", "To", "Gate", "Kitchen", "Tower"],
                    &["6001001", "2023-01-01", "2023-12-31", "Y", "Y", "N"],
                    &["6001002", "2023-01-01", "2023-12-31", "N", "", "29"],
                ],
                false,
            ),
            &devices(),
            false,
        )
        .expect("parse");

        assert!(parsed.duplicates.is_empty());
        assert!(parsed.warnings.is_empty());

        let alpha = &parsed.acl[&DeviceId(405419896)];
        let beta = &parsed.acl[&DeviceId(303986753)];
        assert_eq!(alpha.len(), 2);
        assert_eq!(beta.len(), 2);

        assert_eq!(
            alpha[&6001001].doors,
            [Permission::Allow, Permission::None, Permission::None, Permission::None]
        );
        assert_eq!(
            alpha[&6001002].doors,
            [Permission::None, Permission::Profile(29), Permission::None, Permission::None]
        );
        assert_eq!(
            beta[&6001001].doors,
            [Permission::None, Permission::Allow, Permission::None, Permission::None]
        );
        assert_eq!(beta[&6001002].doors, [Permission::None; DOORS]);
        assert_eq!(alpha[&6001001].from, date("2023-01-01"));
    }

    #[test]
    fn unmatched_columns_and_bad_cells_are_warnings() {
        let parsed = parse_table(
            &table(
                &[
                    &["Card Number", "From", "To", "Gate", "Moat"],
                    &["6001001", "2023-01-01", "2023-12-31", "perhaps", "Y"],
                ],
                false,
            ),
            &devices(),
            false,
        )
        .expect("parse");

        assert_eq!(
            parsed.warnings,
            vec![
                ParseWarning::UnmatchedColumn("Moat".to_string()),
                ParseWarning::InvalidPermission {
                    card_number: 6001001,
                    door: "Gate".to_string(),
                    value: "perhaps".to_string(),
                },
            ]
        );
        assert_eq!(
            parsed.acl[&DeviceId(405419896)][&6001001].doors,
            [Permission::None; DOORS]
        );
    }

    #[test]
    fn duplicates_are_excluded_unless_strict() {
        let t = table(
            &[
                &["Card Number", "From", "To", "Gate"],
                &["6001001", "2023-01-01", "2023-12-31", "Y"],
                &["6001002", "2023-01-01", "2023-12-31", "Y"],
                &["6001001", "2023-02-01", "2023-12-31", "N"],
            ],
            false,
        );

        let parsed = parse_table(&t, &devices(), false).expect("parse");
        assert_eq!(parsed.duplicates, BTreeSet::from([6001001]));
        for cards in parsed.acl.values() {
            assert_eq!(cards.keys().copied().collect::<Vec<_>>(), vec![6001002]);
        }

        assert_eq!(
            parse_table(&t, &devices(), true).unwrap_err(),
            AclError::DuplicateCard(6001001)
        );
    }

    #[test]
    fn pins_are_read_when_present() {
        let parsed = parse_table(
            &table(
                &[
                    &["Card Number", "PIN", "From", "To", "Gate"],
                    &["6001001", "7531", "2023-01-01", "2023-12-31", "Y"],
                    &["6001002", "", "2023-01-01", "2023-12-31", "Y"],
                ],
                true,
            ),
            &devices(),
            false,
        )
        .expect("parse");
        let alpha = &parsed.acl[&DeviceId(405419896)];
        assert_eq!(alpha[&6001001].pin, Some(7531));
        assert_eq!(alpha[&6001002].pin, None);
    }

    #[test]
    fn non_canonical_table_is_rejected() {
        let t = Table::from_parts(vec!["From".into(), "Card Number".into()], vec![]);
        assert_eq!(
            parse_table(&t, &devices(), false).unwrap_err(),
            AclError::MissingColumn(Column::CardNumber)
        );
    }

    fn card(number: u32, doors: [Permission; DOORS]) -> Card {
        Card {
            card_number: number,
            pin: None,
            from: date("2023-01-01"),
            to: date("2023-12-31"),
            doors,
        }
    }

    #[test]
    fn compare_classifies_cards() {
        let allow = [Permission::Allow, Permission::None, Permission::None, Permission::None];
        let device = DeviceId(405419896);

        let current: Acl = BTreeMap::from([(
            device,
            BTreeMap::from([
                (1, card(1, allow)),
                (2, card(2, allow)),
                (3, card(3, allow)),
            ]),
        )]);
        let desired: Acl = BTreeMap::from([(
            device,
            BTreeMap::from([
                (1, card(1, allow)),
                (2, card(2, [Permission::None; DOORS])),
                (4, card(4, allow)),
            ]),
        )]);

        let diff = &compare(&current, &desired, false)[&device];
        assert_eq!(diff.unchanged, vec![card(1, allow)]);
        assert_eq!(diff.updated, vec![card(2, [Permission::None; DOORS])]);
        assert_eq!(diff.added, vec![card(4, allow)]);
        assert_eq!(diff.deleted, vec![card(3, allow)]);
        assert!(diff.has_changes());
    }

    #[test]
    fn compare_ignores_pins_unless_requested() {
        let device = DeviceId(1);
        let mut with = card(1, [Permission::Allow; DOORS]);
        with.pin = Some(1234);
        let without = card(1, [Permission::Allow; DOORS]);

        let current: Acl = BTreeMap::from([(device, BTreeMap::from([(1, with)]))]);
        let desired: Acl = BTreeMap::from([(device, BTreeMap::from([(1, without)]))]);

        assert!(!compare(&current, &desired, false)[&device].has_changes());
        assert!(compare(&current, &desired, true)[&device].has_changes());
    }

    #[test]
    fn make_table_merges_shared_door_names() {
        let devices = vec![
            DeviceConfig::new(1, "A", ["Gate", "Tower", "", ""]),
            DeviceConfig::new(2, "B", ["gate", "Moat", "", ""]),
        ];
        let acl: Acl = BTreeMap::from([
            (
                DeviceId(1),
                BTreeMap::from([(7, card(7, [Permission::None, Permission::Allow, Permission::None, Permission::None]))]),
            ),
            (
                DeviceId(2),
                BTreeMap::from([(7, card(7, [Permission::Profile(3), Permission::None, Permission::None, Permission::None]))]),
            ),
        ]);

        let t = make_table(&acl, &devices, false);
        assert_eq!(t.header(), ["Card Number", "From", "To", "Gate", "Tower", "Moat"]);
        assert_eq!(t.records(), [vec!["7", "2023-01-01", "2023-12-31", "3", "Y", "N"]]);
    }
}
