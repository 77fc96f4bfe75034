use crate::config::ConfigError;
use crate::spreadsheet::reference::row_to_index;
use regex::Regex;

/// Inclusive, 0-based data row bounds parsed from an Excel-style range.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct RowRange {
    pub(crate) lower: usize,
    pub(crate) upper: usize,
}

impl TryFrom<&str> for RowRange {
    type Error = ConfigError;

    /// Parses `"2:242"` or `"A2:D242"` (1-based rows, columns ignored).
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let pattern = Regex::new(r"^([A-Z]*)(\d+):([A-Z]*)(\d+)$").expect("Hardcode regex pattern");
        let text = value.trim().replace('$', "").to_ascii_uppercase();
        let captures = pattern
            .captures(text.as_str())
            .ok_or_else(|| ConfigError::InvalidRange(value.to_owned()))?;
        let invalid = || ConfigError::InvalidRange(value.to_owned());
        let lower = captures
            .get(2)
            .map(|matcher| matcher.as_str())
            .and_then(row_to_index)
            .ok_or_else(invalid)?;
        let upper = captures
            .get(4)
            .map(|matcher| matcher.as_str())
            .and_then(row_to_index)
            .ok_or_else(invalid)?;
        if upper < lower {
            return Err(invalid());
        }
        Ok(RowRange { lower, upper })
    }
}
