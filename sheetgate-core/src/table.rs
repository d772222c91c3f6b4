//! Table extraction: raw header + rows grid → validated, canonically ordered
//! [`Table`].
//!
//! The canonical header is `card number`, `PIN` (only when requested), `from`,
//! `to`, followed by every other column in its original left-to-right order.
//! Rows with a non-numeric card number, a non-numeric PIN or unparseable
//! dates are dropped silently: they are a data quality filter, not a
//! validation failure.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::error::{Column, TableError};
use crate::types::{Cell, Grid};

/// Date format for the `from` and `to` columns.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Canonically ordered ACL table. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    header: Vec<String>,
    records: Vec<Vec<String>>,
}

impl Table {
    pub(crate) fn from_parts(header: Vec<String>, records: Vec<Vec<String>>) -> Self {
        Self { header, records }
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn records(&self) -> &[Vec<String>] {
        &self.records
    }

    /// Position of the column whose normalised name is `key`.
    pub fn column(&self, key: &str) -> Option<usize> {
        self.header.iter().position(|h| normalise(h) == key)
    }

    /// Tab-separated rendering, header first, one record per line. Fields
    /// holding a tab, quote or line break are double-quoted.
    pub fn to_tsv(&self) -> Result<String, TableError> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());
        for line in std::iter::once(&self.header).chain(self.records.iter()) {
            writer.write_record(line).map_err(tsv_err)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| TableError::Tsv(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| TableError::Tsv(e.to_string()))
    }
}

/// Lowercase and strip all whitespace: `" Card  Number "` → `"cardnumber"`.
pub fn normalise(v: &str) -> String {
    v.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// The canonical column prefix for a table.
pub fn canonical_columns(with_pin: bool) -> Vec<Column> {
    if with_pin {
        vec![Column::CardNumber, Column::Pin, Column::From, Column::To]
    } else {
        vec![Column::CardNumber, Column::From, Column::To]
    }
}

/// Extract a canonical [`Table`] from a raw grid whose first row is the header.
pub fn extract(grid: &Grid, with_pin: bool) -> Result<Table, TableError> {
    let Some((header_row, rows)) = grid.split_first() else {
        return Err(TableError::EmptySheet);
    };

    // Blank header cells do not name a column and are ignored.
    let mut index = HashMap::<String, usize>::new();
    for (i, cell) in header_row.iter().enumerate() {
        let key = normalise(cell.as_str());
        if key.is_empty() {
            continue;
        }
        if index.insert(key, i).is_some() {
            return Err(TableError::DuplicateColumn(cell.as_str().trim().to_string()));
        }
    }

    let required = canonical_columns(with_pin);
    let reserved = [Column::CardNumber, Column::Pin, Column::From, Column::To];

    let mut columns: Vec<usize> = required
        .iter()
        .filter_map(|column| index.get(column.key()).copied())
        .collect();
    columns.extend(header_row.iter().enumerate().filter_map(|(i, cell)| {
        let key = normalise(cell.as_str());
        let canonical = reserved.iter().any(|column| column.key() == key);
        (!key.is_empty() && !canonical).then_some(i)
    }));

    let header: Vec<String> = columns
        .iter()
        .map(|&i| header_row[i].as_str().trim().to_string())
        .collect();

    for (position, column) in required.iter().enumerate() {
        match header.get(position) {
            Some(h) if normalise(h) == column.key() => {}
            _ => return Err(TableError::MissingColumn(*column)),
        }
    }

    let card_ix = index[Column::CardNumber.key()];
    let from_ix = index[Column::From.key()];
    let to_ix = index[Column::To.key()];
    let pin_ix = if with_pin {
        index.get(Column::Pin.key()).copied()
    } else {
        None
    };

    let records = rows
        .iter()
        .filter(|row| is_number(cell_at(row, card_ix)))
        .filter(|row| match pin_ix {
            Some(ix) => {
                let pin = cell_at(row, ix);
                pin.trim().is_empty() || is_number(pin)
            }
            None => true,
        })
        .filter(|row| parse_date(cell_at(row, from_ix)).is_some())
        .filter(|row| parse_date(cell_at(row, to_ix)).is_some())
        .map(|row| {
            columns
                .iter()
                .map(|&i| cell_at(row, i).trim().to_string())
                .collect()
        })
        .collect();

    Ok(Table { header, records })
}

/// Parse a `YYYY-MM-DD` date, ignoring surrounding whitespace.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).ok()
}

/// `^\s*[0-9]+\s*$`
pub fn is_number(value: &str) -> bool {
    let trimmed = value.trim();
    !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit())
}

/// Parse tab-separated text into a grid. Fields may be double-quoted, with
/// `""` for a literal quote, as written by [`Table::to_tsv`]. Rows may differ
/// in length. Blank lines are skipped.
pub fn parse_tsv(text: &str) -> Result<Grid, TableError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut grid = Grid::new();
    for record in reader.records() {
        let record = record.map_err(tsv_err)?;
        let row: Vec<Cell> = record.iter().map(Cell::from).collect();
        if !row.iter().all(Cell::is_blank) {
            grid.push(row);
        }
    }
    Ok(grid)
}

fn tsv_err(e: csv::Error) -> TableError {
    TableError::Tsv(e.to_string())
}

fn cell_at(row: &[Cell], ix: usize) -> &str {
    row.get(ix).map(Cell::as_str).unwrap_or("")
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::row;

    fn grid(rows: &[&[&str]]) -> Grid {
        rows.iter().map(|r| row(r)).collect()
    }

    #[test]
    fn extracts_in_canonical_order() {
        let table = extract(
            &grid(&[
                &["Card Number", "From", "To", "Gate", "Tower", "Dungeon", "Lair"],
                &["6001001", "2020-01-01", "2020-12-31", "Y", "N", "N", "Y"],
                &["6001002", "2020-02-03", "2020-11-30", "Y", "Y", "N", "N"],
            ]),
            false,
        )
        .expect("extract");

        assert_eq!(
            table.header(),
            ["Card Number", "From", "To", "Gate", "Tower", "Dungeon", "Lair"]
        );
        assert_eq!(table.records().len(), 2);
        assert_eq!(
            table.records()[1],
            ["6001002", "2020-02-03", "2020-11-30", "Y", "Y", "N", "N"]
        );
    }

    #[test]
    fn pin_column_follows_card_number() {
        let table = extract(
            &grid(&[
                &["From", "PIN", "Card Number", "To", "Gate"],
                &["2023-01-01", "7531", "6001001", "2023-12-31", "Y"],
                &["2023-01-01", "", "6001002", "2023-12-31", "N"],
                &["2023-01-01", "75x1", "6001003", "2023-12-31", "N"],
            ]),
            true,
        )
        .expect("extract");

        assert_eq!(table.header(), ["Card Number", "PIN", "From", "To", "Gate"]);
        assert_eq!(
            table.records(),
            [
                vec!["6001001", "7531", "2023-01-01", "2023-12-31", "Y"],
                vec!["6001002", "", "2023-01-01", "2023-12-31", "N"],
            ]
        );
    }

    #[test]
    fn pin_column_is_dropped_without_pins() {
        let table = extract(
            &grid(&[
                &["Card Number", "PIN", "From", "To", "Gate"],
                &["6001001", "7531", "2023-01-01", "2023-12-31", "Y"],
            ]),
            false,
        )
        .expect("extract");

        assert_eq!(table.header(), ["Card Number", "From", "To", "Gate"]);
        assert_eq!(table.records()[0], ["6001001", "2023-01-01", "2023-12-31", "Y"]);
    }

    #[test]
    fn missing_pin_column_is_reported() {
        let err = extract(&grid(&[&["Card Number", "From", "To"]]), true).unwrap_err();
        assert_eq!(err, TableError::MissingColumn(Column::Pin));
    }

    #[test]
    fn empty_grid_is_an_error() {
        assert_eq!(extract(&Grid::new(), false).unwrap_err(), TableError::EmptySheet);
    }

    #[test]
    fn empty_header_row_reports_card_number() {
        let err = extract(&vec![vec![]], false).unwrap_err();
        assert_eq!(err, TableError::MissingColumn(Column::CardNumber));
    }

    #[test]
    fn duplicate_unknown_columns_are_rejected() {
        let err = extract(
            &grid(&[&["Card Number", "From", "To", "Gate", " gate "]]),
            false,
        )
        .unwrap_err();
        assert_eq!(err, TableError::DuplicateColumn("gate".to_string()));
    }

    #[test]
    fn duplicate_canonical_columns_ignore_case_and_spacing() {
        let err = extract(
            &grid(&[&["Card Number", "CARDNUMBER", "From", "To"]]),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, TableError::DuplicateColumn(_)));
    }

    #[test]
    fn cells_are_trimmed_and_short_rows_padded() {
        let table = extract(
            &grid(&[
                &["Card Number", "From", "To", "Gate"],
                &[" 6001001 ", "2020-01-01 ", " 2020-12-31"],
            ]),
            false,
        )
        .expect("extract");
        assert_eq!(table.records()[0], ["6001001", "2020-01-01", "2020-12-31", ""]);
    }

    #[test]
    fn rows_with_bad_dates_are_dropped() {
        let table = extract(
            &grid(&[
                &["Card Number", "From", "To"],
                &["6001001", "2020-13-01", "2020-12-31"],
                &["6001002", "2020-01-01", "31/12/2020"],
                &["6001003", "2020-01-01", ""],
                &["6001004", "2020-01-01", "2020-12-31"],
            ]),
            false,
        )
        .expect("extract");
        assert_eq!(table.records().len(), 1);
        assert_eq!(table.records()[0][0], "6001004");
    }

    #[test]
    fn tsv_rendering() {
        let table = extract(
            &grid(&[
                &["Card Number", "From", "To", "Gate"],
                &["6001001", "2020-01-01", "2020-12-31", "Y"],
            ]),
            false,
        )
        .expect("extract");
        assert_eq!(
            table.to_tsv().expect("tsv"),
            "Card Number\tFrom\tTo\tGate\n6001001\t2020-01-01\t2020-12-31\tY\n"
        );
    }

    #[test]
    fn tsv_parses_back_into_the_same_table() {
        let table = extract(
            &grid(&[
                &["Card Number", "From", "To", "Gate \"North\""],
                &["6001001", "2020-01-01", "2020-12-31", "Y"],
                &["6001002", "2020-01-01", "2020-12-31", ""],
            ]),
            false,
        )
        .expect("extract");

        let tsv = table.to_tsv().expect("tsv");
        assert!(tsv.contains("\"Gate \"\"North\"\"\""), "got: {tsv}");

        let reparsed = extract(&parse_tsv(&tsv).expect("parse"), false).expect("reparse");
        assert_eq!(reparsed, table);
    }

    #[test]
    fn tsv_skips_blank_lines_and_handles_crlf() {
        let grid = parse_tsv("Card Number\tFrom\r\n\r\n6001001\t2020-01-01").expect("parse");
        assert_eq!(
            grid,
            vec![row(&["Card Number", "From"]), row(&["6001001", "2020-01-01"])]
        );
    }

    #[test]
    fn tsv_reads_quoted_tabs_and_short_rows() {
        let grid = parse_tsv("Card Number\tName\tGate\n6001001\t\"Smith\tJ\"\n").expect("parse");
        assert_eq!(
            grid,
            vec![row(&["Card Number", "Name", "Gate"]), row(&["6001001", "Smith\tJ"])]
        );
    }

    #[test]
    fn normalise_strips_all_spacing() {
        assert_eq!(normalise(" Card  Number "), "cardnumber");
        assert_eq!(normalise("PIN"), "pin");
    }
}
