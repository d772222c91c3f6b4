//! A1 notation: `Sheet!A2:E` / `Sheet!A2:E40`.
//!
//! Column indices are zero based. Letters use bijective base 26, so there is no
//! zero digit: `A`=0 … `Z`=25, `AA`=26 … `AZ`=51, `BA`=52.

use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Zero-based column index → spreadsheet column letters.
pub fn column_letters(index: usize) -> String {
    let mut letters = Vec::new();
    let mut n = index + 1;
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(char::from(b'A' + rem as u8));
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Spreadsheet column letters → zero-based column index.
///
/// Returns `None` for an empty string, non-ASCII letters, or overflow.
pub fn column_index(letters: &str) -> Option<usize> {
    if letters.is_empty() {
        return None;
    }
    let mut n: usize = 0;
    for c in letters.chars() {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        let digit = (c.to_ascii_uppercase() as u8 - b'A') as usize + 1;
        n = n.checked_mul(26)?.checked_add(digit)?;
    }
    Some(n - 1)
}

/// A rectangular range on a named sheet. Rows are 1-based as displayed by
/// spreadsheets; `bottom == None` means "to the end of the sheet".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct A1Range {
    pub sheet: String,
    pub left: usize,
    pub top: u32,
    pub right: usize,
    pub bottom: Option<u32>,
}

impl A1Range {
    /// Parse `Sheet!<col><row>:<col>[<row>]`.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        let invalid = || CoreError::InvalidRange(s.to_string());
        let (sheet, span) = s.trim().split_once('!').ok_or_else(invalid)?;
        let (from, to) = span.split_once(':').ok_or_else(invalid)?;
        if sheet.is_empty() {
            return Err(invalid());
        }

        let (left, top) = split_cell(from).ok_or_else(invalid)?;
        let (right, bottom) = split_cell(to).ok_or_else(invalid)?;
        let top = top.ok_or_else(invalid)?;

        if top == 0 || right < left || bottom.is_some_and(|b| b < top) {
            return Err(invalid());
        }

        Ok(Self {
            sheet: sheet.to_string(),
            left,
            top,
            right,
            bottom,
        })
    }

    /// Number of columns spanned.
    pub fn width(&self) -> usize {
        self.right - self.left + 1
    }

    /// Same columns and sheet, starting at `top`.
    pub fn from_row(&self, top: u32) -> Self {
        Self {
            top,
            bottom: self.bottom.filter(|b| *b >= top),
            ..self.clone()
        }
    }

    /// Single row `row` spanning the range's columns.
    pub fn row(&self, row: u32) -> Self {
        Self {
            top: row,
            bottom: Some(row),
            ..self.clone()
        }
    }

    /// Single cell at absolute column `col` and row `row`.
    pub fn cell(&self, col: usize, row: u32) -> Self {
        Self {
            sheet: self.sheet.clone(),
            left: col,
            top: row,
            right: col,
            bottom: Some(row),
        }
    }

    /// One column of this range, starting at `top` and open ended below.
    pub fn column(&self, col: usize, top: u32) -> Self {
        Self {
            sheet: self.sheet.clone(),
            left: col,
            top,
            right: col,
            bottom: self.bottom,
        }
    }
}

impl fmt::Display for A1Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}!{}{}:{}",
            self.sheet,
            column_letters(self.left),
            self.top,
            column_letters(self.right)
        )?;
        if let Some(bottom) = self.bottom {
            write!(f, "{bottom}")?;
        }
        Ok(())
    }
}

impl FromStr for A1Range {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// `"AB12"` → `(27, Some(12))`, `"E"` → `(4, None)`.
fn split_cell(cell: &str) -> Option<(usize, Option<u32>)> {
    let split = cell
        .find(|c: char| c.is_ascii_digit())
        .unwrap_or(cell.len());
    let (letters, digits) = cell.split_at(split);
    let col = column_index(letters)?;
    let row = if digits.is_empty() {
        None
    } else {
        Some(digits.parse().ok()?)
    };
    Some((col, row))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letters_for_boundary_indices() {
        assert_eq!(column_letters(0), "A");
        assert_eq!(column_letters(25), "Z");
        assert_eq!(column_letters(26), "AA");
        assert_eq!(column_letters(51), "AZ");
        assert_eq!(column_letters(52), "BA");
        assert_eq!(column_letters(701), "ZZ");
        assert_eq!(column_letters(702), "AAA");
    }

    #[test]
    fn index_for_letters() {
        assert_eq!(column_index("A"), Some(0));
        assert_eq!(column_index("z"), Some(25));
        assert_eq!(column_index("AA"), Some(26));
        assert_eq!(column_index("AAA"), Some(702));
        assert_eq!(column_index(""), None);
        assert_eq!(column_index("A1"), None);
    }

    #[test]
    fn letters_and_index_agree() {
        for i in 0..2000 {
            assert_eq!(column_index(&column_letters(i)), Some(i), "index {i}");
        }
    }

    #[test]
    fn parse_open_ended_range() {
        let range = A1Range::parse("ACL!A2:E").expect("parse");
        assert_eq!(range.sheet, "ACL");
        assert_eq!(range.left, 0);
        assert_eq!(range.top, 2);
        assert_eq!(range.right, 4);
        assert_eq!(range.bottom, None);
        assert_eq!(range.width(), 5);
        assert_eq!(range.to_string(), "ACL!A2:E");
    }

    #[test]
    fn parse_closed_range_with_spaces_in_sheet_name() {
        let range: A1Range = "Class Data!B3:AA40".parse().expect("parse");
        assert_eq!(range.sheet, "Class Data");
        assert_eq!(range.left, 1);
        assert_eq!(range.right, 26);
        assert_eq!(range.bottom, Some(40));
        assert_eq!(range.to_string(), "Class Data!B3:AA40");
    }

    #[test]
    fn rejects_malformed_ranges() {
        for bad in ["ACL", "ACL!A2", "!A1:B", "ACL!A:E", "ACL!E2:A", "ACL!A0:E", "ACL!A5:E2"] {
            assert!(
                matches!(A1Range::parse(bad), Err(CoreError::InvalidRange(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn sub_ranges() {
        let range = A1Range::parse("Log!A1:H").expect("parse");
        assert_eq!(range.row(1).to_string(), "Log!A1:H1");
        assert_eq!(range.from_row(2).to_string(), "Log!A2:H");
        assert_eq!(range.cell(2, 1).to_string(), "Log!C1:C1");
        assert_eq!(range.column(27, 2).to_string(), "Log!AB2:AB");
    }
}
