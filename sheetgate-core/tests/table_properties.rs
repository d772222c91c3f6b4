//! Table extraction properties: column order invariance, row filtering and
//! ACL round-trips through the canonical table form.

use std::collections::BTreeMap;

use rstest::rstest;
use sheetgate_core::{
    acl::{make_table, parse_table},
    extract,
    table::parse_date,
    types::row,
    Acl, Card, DeviceConfig, DeviceId, Grid, Permission, TableError,
};

const HEADER: [&str; 5] = ["Card Number", "From", "To", "Gate", "Tower"];
const ROWS: [[&str; 5]; 3] = [
    ["6001001", "2020-01-01", "2020-12-31", "Y", "N"],
    ["6001002", "2020-02-01", "2020-11-30", "N", "Y"],
    ["6001003", "2020-03-01", "2020-10-31", "Y", "Y"],
];

/// Lay out `HEADER`/`ROWS` with columns in the order given by `order`.
fn permuted(order: [usize; 5]) -> Grid {
    fn pick(order: &[usize; 5], values: &[&'static str; 5]) -> Vec<&'static str> {
        order.iter().map(|&i| values[i]).collect()
    }
    std::iter::once(row(&pick(&order, &HEADER)))
        .chain(ROWS.iter().map(|r| row(&pick(&order, r))))
        .collect()
}

fn grid(rows: &[&[&str]]) -> Grid {
    rows.iter().map(|r| row(r)).collect()
}

// ---------------------------------------------------------------------------
// 1. Column order invariance
// ---------------------------------------------------------------------------

#[rstest]
#[case([0, 1, 2, 3, 4])]
#[case([4, 3, 2, 1, 0])]
#[case([3, 0, 4, 2, 1])]
#[case([1, 2, 0, 3, 4])]
#[case([2, 3, 1, 4, 0])]
fn any_column_order_yields_canonical_table(#[case] order: [usize; 5]) {
    let table = extract(&permuted(order), false).expect("extract");

    // Non-canonical columns keep their relative order from the source sheet.
    let gate = order.iter().position(|&i| i == 3).expect("gate");
    let tower = order.iter().position(|&i| i == 4).expect("tower");
    let (first, second) = if gate < tower { (3, 4) } else { (4, 3) };

    let columns = [0, 1, 2, first, second];
    let expected_header: Vec<&str> = columns.iter().map(|&i| HEADER[i]).collect();
    assert_eq!(table.header(), expected_header.as_slice(), "order {order:?}");

    let expected_rows: Vec<Vec<&str>> = ROWS
        .iter()
        .map(|r| columns.iter().map(|&i| r[i]).collect())
        .collect();
    assert_eq!(table.records(), expected_rows.as_slice(), "order {order:?}");
}

#[test]
fn scrambled_header_is_reordered() {
    let table = extract(
        &grid(&[
            &["Gate", "Card Number", "Tower", "To", "From"],
            &["Y", "6001001", "N", "2020-12-31", "2020-01-01"],
        ]),
        false,
    )
    .expect("extract");

    assert_eq!(table.header(), ["Card Number", "From", "To", "Gate", "Tower"]);
    assert_eq!(
        table.records(),
        [vec!["6001001", "2020-01-01", "2020-12-31", "Y", "N"]]
    );
}

#[rstest]
#[case(&["From", "To", "Gate"], "card number")]
#[case(&["Card Number", "To", "Gate"], "from")]
#[case(&["Card Number", "From", "Gate"], "to")]
fn missing_canonical_column_is_named(#[case] header: &[&str], #[case] which: &str) {
    let err = extract(&grid(&[header]), false).unwrap_err();
    assert!(matches!(err, TableError::MissingColumn(_)), "got: {err}");
    assert!(err.to_string().contains(which), "got: {err}");
}

// ---------------------------------------------------------------------------
// 2. Row filtering
// ---------------------------------------------------------------------------

#[test]
fn non_numeric_card_rows_are_dropped_in_place() {
    let table = extract(
        &grid(&[
            &["Card Number", "From", "To"],
            &["6001001", "2020-01-01", "2020-12-31"],
            &["600100X", "2020-01-01", "2020-12-31"],
            &["6001003", "2020-01-01", "2020-12-31"],
            &["", "2020-01-01", "2020-12-31"],
            &["6001005", "2020-01-01", "2020-12-31"],
        ]),
        false,
    )
    .expect("extract");

    let cards: Vec<&str> = table.records().iter().map(|r| r[0].as_str()).collect();
    assert_eq!(cards, ["6001001", "6001003", "6001005"]);
}

#[rstest]
#[case("600100X")]
#[case("-6001001")]
#[case("6001 001")]
#[case("6.001001")]
fn invalid_card_numbers_never_survive(#[case] card: &str) {
    let table = extract(
        &grid(&[
            &["Card Number", "From", "To"],
            &[card, "2020-01-01", "2020-12-31"],
        ]),
        false,
    )
    .expect("extract");
    assert!(table.records().is_empty(), "{card} should be dropped");
}

// ---------------------------------------------------------------------------
// 3. ACL round-trip
// ---------------------------------------------------------------------------

fn devices() -> Vec<DeviceConfig> {
    vec![
        DeviceConfig::new(405419896, "Alpha", ["Gate", "Tower", "Dungeon", "Lair"]),
        DeviceConfig::new(303986753, "Beta", ["Great Hall", "Kitchen", "Pantry", "Cellar"]),
    ]
}

fn card(number: u32, pin: Option<u32>, doors: [Permission; 4]) -> Card {
    Card {
        card_number: number,
        pin,
        from: parse_date("2023-01-01").expect("from"),
        to: parse_date("2023-12-31").expect("to"),
        doors,
    }
}

fn snapshot() -> Acl {
    use Permission as P;
    BTreeMap::from([
        (
            DeviceId(405419896),
            BTreeMap::from([
                (6001001, card(6001001, Some(7531), [P::Allow, P::None, P::Profile(29), P::None])),
                (6001002, card(6001002, None, [P::None; 4])),
            ]),
        ),
        (
            DeviceId(303986753),
            BTreeMap::from([
                (6001001, card(6001001, Some(7531), [P::None, P::Allow, P::None, P::None])),
                (6001002, card(6001002, None, [P::Allow; 4])),
            ]),
        ),
    ])
}

#[rstest]
#[case(false)]
#[case(true)]
fn acl_survives_table_round_trip(#[case] with_pin: bool) {
    let acl = snapshot();
    let table = make_table(&acl, &devices(), with_pin);

    // Back through the raw grid form as a spreadsheet would hold it.
    let raw: Grid = std::iter::once(row(table.header()))
        .chain(table.records().iter().map(|r| row(r)))
        .collect();
    let reparsed = parse_table(&extract(&raw, with_pin).expect("extract"), &devices(), true)
        .expect("parse");

    assert!(reparsed.warnings.is_empty(), "{:?}", reparsed.warnings);

    let mut expected = acl;
    if !with_pin {
        for cards in expected.values_mut() {
            for card in cards.values_mut() {
                card.pin = None;
            }
        }
    }
    assert_eq!(reparsed.acl, expected);
}
