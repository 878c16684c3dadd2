//! Workbook data structures and cell addressing

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::style::StyleTable;

/// Days subtracted from the proleptic Gregorian ordinal to obtain the
/// spreadsheet serial day number. Calibrated so that modern dates match the
/// 1900 date system of the target applications, leap-year-1900 quirk included.
pub const SERIAL_EPOCH_OFFSET: i64 = 693_594;

/// Cell value types. Null is encoded as cell absence in the package.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Represents a single cell: a value plus an index into the style table.
/// Style 0 is the built-in General style.
#[derive(Debug, Clone, Default)]
pub struct Cell {
    pub value: Value,
    pub style: u32,
}

/// Represents a worksheet with sparse, 1-based cell storage
#[derive(Debug, Clone, Default)]
pub struct Sheet {
    pub title: String,
    cells: BTreeMap<(u32, u32), Cell>,
    /// Rows materialized without any cell, so a row holding only nulls
    /// still leaves a row element in the package
    marked_rows: BTreeSet<u32>,
    column_widths: BTreeMap<u32, f64>,
    /// Populated coordinate bounds, tracked for the `dimension` element:
    /// (min_row, min_col, max_row, max_col)
    bounds: Option<(u32, u32, u32, u32)>,
}

impl Sheet {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Get the cell at (row, col), creating a default (Null, style 0) cell
    /// on first access. Coordinates are 1-based to match spreadsheet
    /// convention; (0, _) and (_, 0) are programming errors.
    pub fn cell_mut(&mut self, row: u32, col: u32) -> &mut Cell {
        assert!(row >= 1 && col >= 1, "cell coordinates are 1-based");
        self.bounds = Some(match self.bounds {
            None => (row, col, row, col),
            Some((r0, c0, r1, c1)) => (r0.min(row), c0.min(col), r1.max(row), c1.max(col)),
        });
        self.cells.entry((row, col)).or_default()
    }

    /// Set a value with a style index in one call
    pub fn set(&mut self, row: u32, col: u32, value: Value, style: u32) {
        let cell = self.cell_mut(row, col);
        cell.value = value;
        cell.style = style;
    }

    pub fn get(&self, row: u32, col: u32) -> Option<&Cell> {
        self.cells.get(&(row, col))
    }

    /// Materialize a row even when no cell in it will be written. A
    /// marked row without cells round-trips as a row of nulls instead of
    /// vanishing.
    pub fn mark_row(&mut self, row: u32) {
        assert!(row >= 1, "row indices are 1-based");
        self.bounds = Some(match self.bounds {
            None => (row, 1, row, 1),
            Some((r0, c0, r1, c1)) => (r0.min(row), c0, r1.max(row), c1),
        });
        self.marked_rows.insert(row);
    }

    pub fn marked_rows(&self) -> impl Iterator<Item = u32> + '_ {
        self.marked_rows.iter().copied()
    }

    /// True if the row was marked or holds at least one cell, even a
    /// null one
    pub fn row_is_present(&self, row: u32) -> bool {
        self.marked_rows.contains(&row)
            || self.cells.range((row, 1)..(row + 1, 1)).next().is_some()
    }

    /// Record a display width hint for a column. Purely cosmetic.
    pub fn set_column_width(&mut self, col: u32, width: f64) {
        self.column_widths.insert(col, width);
    }

    pub fn column_widths(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.column_widths.iter().map(|(&c, &w)| (c, w))
    }

    /// Populated bounds as (min_row, min_col, max_row, max_col)
    pub fn bounds(&self) -> Option<(u32, u32, u32, u32)> {
        self.bounds
    }

    /// Cells in row-major order
    pub fn cells(&self) -> impl Iterator<Item = (u32, u32, &Cell)> {
        self.cells.iter().map(|(&(r, c), cell)| (r, c, cell))
    }

    /// True if no cell in the given row holds a non-null value
    pub fn row_is_empty(&self, row: u32) -> bool {
        self.cells
            .range((row, 1)..(row + 1, 1))
            .all(|(_, cell)| cell.value.is_null())
    }
}

/// Represents a complete in-memory workbook. Built fresh for each encode,
/// parsed whole on each decode; no state survives between calls.
#[derive(Debug, Clone, Default)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
    pub styles: StyleTable,
    pub creator: String,
}

impl Workbook {
    pub fn new() -> Self {
        Self {
            creator: "tabsheet".to_string(),
            ..Self::default()
        }
    }

    /// The data sheet read back from a package
    pub fn active_sheet(&self) -> Option<&Sheet> {
        self.sheets.first()
    }
}

/// Convert a 1-based column index to its letter name (1 -> A, 27 -> AA)
pub fn column_letter(col: u32) -> String {
    assert!(col >= 1, "column indices are 1-based");
    let mut c = col;
    let mut letters = String::new();
    while c > 0 {
        let m = (c - 1) % 26;
        letters.insert(0, (b'A' + m as u8) as char);
        c = (c - m - 1) / 26;
    }
    letters
}

/// Format a 1-based (row, col) pair as an A1-style reference
pub fn cell_ref(row: u32, col: u32) -> String {
    format!("{}{}", column_letter(col), row)
}

/// Parse an A1-style reference into a 1-based (row, col) pair
pub fn parse_cell_ref(reference: &str) -> Option<(u32, u32)> {
    let mut col = 0u32;
    let mut row_digits = String::new();

    for ch in reference.chars() {
        if ch.is_ascii_alphabetic() {
            if !row_digits.is_empty() {
                return None;
            }
            col = col * 26 + (ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
        } else if ch.is_ascii_digit() {
            row_digits.push(ch);
        } else {
            return None;
        }
    }

    if col == 0 || row_digits.is_empty() {
        return None;
    }
    let row = row_digits.parse::<u32>().ok()?;
    if row == 0 {
        return None;
    }
    Some((row, col))
}

/// Serial day number for a calendar date
pub fn date_to_serial(date: NaiveDate) -> f64 {
    (date.num_days_from_ce() as i64 - SERIAL_EPOCH_OFFSET) as f64
}

/// Serial day number with a fractional time-of-day component
pub fn datetime_to_serial(datetime: NaiveDateTime) -> f64 {
    let days = date_to_serial(datetime.date());
    let seconds = datetime.time().num_seconds_from_midnight() as f64;
    days + seconds / 86_400.0
}

/// Calendar date for a serial day number, discarding any time component
pub fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    let days = serial.floor() as i64 + SERIAL_EPOCH_OFFSET;
    NaiveDate::from_num_days_from_ce_opt(i32::try_from(days).ok()?)
}

/// Date-time for a serial day number. With `minute_granularity` the
/// fractional part is rounded to whole minutes, matching number formats
/// that carry no seconds component.
pub fn serial_to_datetime(serial: f64, minute_granularity: bool) -> Option<NaiveDateTime> {
    let mut date = serial_to_date(serial)?;
    let frac = serial - serial.floor();
    let mut seconds = if minute_granularity {
        (frac * 1_440.0).round() as u32 * 60
    } else {
        (frac * 86_400.0).round() as u32
    };
    // Rounding can carry past midnight
    if seconds >= 86_400 {
        seconds -= 86_400;
        date = date.succ_opt()?;
    }
    let time = NaiveTime::from_num_seconds_from_midnight_opt(seconds, 0)?;
    Some(date.and_time(time))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_letters() {
        assert_eq!(column_letter(1), "A");
        assert_eq!(column_letter(26), "Z");
        assert_eq!(column_letter(27), "AA");
        assert_eq!(column_letter(52), "AZ");
        assert_eq!(column_letter(703), "AAA");
    }

    #[test]
    fn test_cell_ref_parsing() {
        assert_eq!(parse_cell_ref("A1"), Some((1, 1)));
        assert_eq!(parse_cell_ref("B7"), Some((7, 2)));
        assert_eq!(parse_cell_ref("AA100"), Some((100, 27)));
        assert_eq!(parse_cell_ref("1A"), None);
        assert_eq!(parse_cell_ref("A0"), None);
        assert_eq!(parse_cell_ref(""), None);
    }

    #[test]
    fn test_date_serial_round_trip() {
        let date = NaiveDate::from_ymd_opt(2023, 8, 1).unwrap();
        let serial = date_to_serial(date);
        assert_eq!(serial, 45139.0);
        assert_eq!(serial_to_date(serial), Some(date));
    }

    #[test]
    fn test_datetime_serial_minute_rounding() {
        let dt = NaiveDate::from_ymd_opt(2021, 12, 31)
            .unwrap()
            .and_hms_opt(13, 45, 0)
            .unwrap();
        let serial = datetime_to_serial(dt);
        assert_eq!(serial_to_datetime(serial, true), Some(dt));
        assert_eq!(serial_to_datetime(serial, false), Some(dt));

        // Seconds survive only on the seconds-capable path
        let with_secs = dt.with_second(42).unwrap();
        let serial = datetime_to_serial(with_secs);
        assert_eq!(serial_to_datetime(serial, false), Some(with_secs));
        let truncated = serial_to_datetime(serial, true).unwrap();
        assert_eq!(truncated.second(), 0);
        assert_eq!(truncated.minute(), 46);
    }

    #[test]
    fn test_datetime_rounding_carries_past_midnight() {
        let dt = NaiveDate::from_ymd_opt(2022, 2, 28)
            .unwrap()
            .and_hms_opt(23, 59, 40)
            .unwrap();
        let serial = datetime_to_serial(dt);
        let rounded = serial_to_datetime(serial, true).unwrap();
        assert_eq!(rounded.date(), NaiveDate::from_ymd_opt(2022, 3, 1).unwrap());
        assert_eq!((rounded.hour(), rounded.minute()), (0, 0));
    }

    #[test]
    fn test_sheet_tracks_bounds() {
        let mut sheet = Sheet::new("data");
        assert_eq!(sheet.bounds(), None);
        sheet.set(3, 2, Value::Int(1), 0);
        sheet.set(1, 5, Value::Int(2), 0);
        assert_eq!(sheet.bounds(), Some((1, 2, 3, 5)));
    }

    #[test]
    fn test_marked_rows_extend_bounds_and_presence() {
        let mut sheet = Sheet::new("data");
        sheet.set(1, 1, Value::Text("a".into()), 0);
        sheet.mark_row(2);
        assert_eq!(sheet.bounds(), Some((1, 1, 2, 1)));
        assert!(sheet.row_is_present(1));
        assert!(sheet.row_is_present(2));
        assert!(!sheet.row_is_present(3));
        assert_eq!(sheet.marked_rows().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn test_row_is_empty_ignores_null_cells() {
        let mut sheet = Sheet::new("data");
        sheet.set(2, 1, Value::Null, 0);
        sheet.set(2, 2, Value::Null, 0);
        assert!(sheet.row_is_empty(2));
        sheet.set(2, 2, Value::Text("x".into()), 0);
        assert!(!sheet.row_is_empty(2));
    }
}
