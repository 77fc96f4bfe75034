use crate::spreadsheet::reference::index_to_reference;
use chrono::NaiveDate;
use chrono::TimeDelta;
use std::fmt::Display;

const MILLISECONDS_PER_DAY: i64 = 86_400_000;

/// Types of cell data in spreadsheet files.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub(crate) enum CellType {
    #[default]
    Empty,
    /// Boolean values, stored as `1`/`0`
    Boolean,
    /// Numeric values
    Number,
    /// Date/time values stored as numbers from 1900 epoch
    NumberDateTime1900,
    /// Date values stored as numbers from 1900 epoch
    NumberDate1900,
    /// Time values stored as numbers from 1900 epoch
    NumberTime1900,
    /// Date/time values stored as numbers from 1904 epoch
    NumberDateTime1904,
    /// Date values stored as numbers from 1904 epoch
    NumberDate1904,
    /// Time values stored as numbers from 1904 epoch
    NumberTime1904,
    /// ISO 8601 date/time strings
    IsoDateTime,
    /// Text, already resolved from the shared string table when needed
    String,
    /// Error literals such as `#N/A`
    Error,
}

impl CellType {
    /// Parses built-in Excel number format IDs to determine cell type.
    pub(crate) fn parse_builtin_number_format_id(id: &str, is_1904: bool) -> Option<Self> {
        match id {
            "22" => Some(if is_1904 { Self::NumberDateTime1904 } else { Self::NumberDateTime1900 }),
            "14" | "15" | "16" | "17" => Some(if is_1904 { Self::NumberDate1904 } else { Self::NumberDate1900 }),
            "18" | "19" | "20" | "21" | "45" | "46" | "47" => Some(if is_1904 { Self::NumberTime1904 } else { Self::NumberTime1900 }),
            _ => None,
        }
    }

    /// Parses custom number format strings to determine cell type.
    /// Date and time letters inside quoted literals, brackets or escapes are ignored.
    pub(crate) fn parse_custom_number_format(format: &str, is_1904: bool) -> Self {
        let mut is_escaped = false;
        let mut is_literal = false;
        let mut is_date = false;
        let mut is_time = false;
        let mut is_bracket = false;
        for character in format.chars() {
            match character {
                _ if is_escaped => is_escaped = false,
                '_' | '\\' if !is_literal => is_escaped = true,

                '"' if is_literal => is_literal = false,
                '"' if !is_literal && !is_bracket => is_literal = true,

                ']' if is_bracket => is_bracket = false,
                '[' if !is_bracket && !is_literal => is_bracket = true,
                _ if is_literal || is_bracket => (),

                'Y' | 'y' | 'D' | 'd' => is_date = true,
                'H' | 'h' | 'S' | 's' => is_time = true,
                _ => (),
            }
        }

        match (is_date, is_time, is_1904) {
            (true, true, false) => Self::NumberDateTime1900,
            (true, true, true) => Self::NumberDateTime1904,
            (true, false, false) => Self::NumberDate1900,
            (true, false, true) => Self::NumberDate1904,
            (false, true, false) => Self::NumberTime1900,
            (false, true, true) => Self::NumberTime1904,
            (false, false, _) => Self::Number,
        }
    }
}

/// Converts Excel error codes to their literal form.
pub(crate) fn to_error_value(value: u8) -> &'static str {
    match value {
        0x00 => "#NULL!",
        0x07 => "#DIV/0!",
        0x0F => "#VALUE!",
        0x17 => "#REF!",
        0x1D => "#NAME?",
        0x24 => "#NUM!",
        0x2A => "#N/A",
        0x2B => "#GETTING_DATA",
        _ => "#ERROR!",
    }
}

/// A single non-empty cell: position, type and raw value.
///
/// `Display` renders the value the way lookups compare it: booleans as
/// `true`/`false`, numbers in shortest form, date-formatted numbers as ISO text.
#[derive(Clone, Debug)]
pub struct Cell {
    /// Row index (0-based)
    pub(crate) row: usize,
    /// Column index (0-based)
    pub(crate) col: usize,
    pub(crate) kind: CellType,
    /// Raw value as stored in the file
    pub(crate) value: String,
}

impl Cell {
    pub fn row(&self) -> usize {
        self.row
    }

    pub fn col(&self) -> usize {
        self.col
    }

    /// Returns the Excel-style cell reference (e.g., "A1", "B2").
    pub fn reference(&self) -> String {
        index_to_reference(self.row, self.col)
    }

    /// True for error cells such as `#N/A`.
    pub fn is_error(&self) -> bool {
        self.kind == CellType::Error
    }

    fn render(&self) -> Option<String> {
        match self.kind {
            CellType::Boolean => Some(if self.value == "1" { "true" } else { "false" }.to_owned()),
            CellType::Number => self.value.parse::<f64>().ok().map(|number| number.to_string()),
            CellType::NumberDate1900 => to_date_string(&self.value, false),
            CellType::NumberDate1904 => to_date_string(&self.value, true),
            CellType::NumberDateTime1900 => to_datetime_string(&self.value, false),
            CellType::NumberDateTime1904 => to_datetime_string(&self.value, true),
            CellType::NumberTime1900 | CellType::NumberTime1904 => to_time_string(&self.value),
            CellType::IsoDateTime => Some(self.value.replace('T', " ")),
            CellType::Empty | CellType::String | CellType::Error => None,
        }
    }
}

impl Display for Cell {
    /// Falls back to the raw value when a typed rendering is impossible.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.render() {
            Some(value) => write!(f, "{}", value),
            None => write!(f, "{}", self.value),
        }
    }
}

/// Splits a serial date number into whole days and milliseconds since midnight.
fn split_serial(value: &str) -> Option<(i64, i64)> {
    let serial = value.parse::<f64>().ok().filter(|serial| serial.is_finite())?;
    let milliseconds = (serial * MILLISECONDS_PER_DAY as f64).round() as i64;
    Some((
        milliseconds.div_euclid(MILLISECONDS_PER_DAY),
        milliseconds.rem_euclid(MILLISECONDS_PER_DAY),
    ))
}

/// Serial day to calendar date. In the 1900 system serials below 60 are shifted
/// one day to absorb the fictitious 1900-02-29 inherited from Lotus 1-2-3.
fn to_date(days: i64, is_1904: bool) -> Option<NaiveDate> {
    let offset = if is_1904 {
        1462
    } else if days < 60 {
        1
    } else {
        0
    };
    NaiveDate::from_ymd_opt(1899, 12, 30)?.checked_add_signed(TimeDelta::try_days(days + offset)?)
}

fn format_time(milliseconds: i64) -> String {
    let mut rest = milliseconds;
    let millis = rest % 1_000;
    rest /= 1_000;
    let seconds = rest % 60;
    rest /= 60;
    let minutes = rest % 60;
    let hours = rest / 60;
    if millis > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}.{millis:03}")
    } else {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    }
}

/// Converts an Excel serial date to `YYYY-MM-DD`.
pub(crate) fn to_date_string(value: &str, is_1904: bool) -> Option<String> {
    let (days, _) = split_serial(value)?;
    Some(to_date(days, is_1904)?.format("%Y-%m-%d").to_string())
}

/// Converts the fractional part of an Excel serial to `HH:MM:SS[.mmm]`.
pub(crate) fn to_time_string(value: &str) -> Option<String> {
    let (_, milliseconds) = split_serial(value)?;
    Some(format_time(milliseconds))
}

/// Converts an Excel serial to `YYYY-MM-DD HH:MM:SS[.mmm]`.
pub(crate) fn to_datetime_string(value: &str, is_1904: bool) -> Option<String> {
    let (days, milliseconds) = split_serial(value)?;
    let date = to_date(days, is_1904)?;
    Some(format!("{} {}", date.format("%Y-%m-%d"), format_time(milliseconds)))
}
