//! # Sheet Reader
//!
//! [`SheetReader`] answers lookups against a workbook whose sheets have been
//! described with a [`SheetConfig`]: which row holds the field labels, which
//! rows hold data, and which field identifies a row.
//!
//! Every operation taking `sheet: Option<&str>` works on the active sheet when
//! given `None`. Sheet names and field names match ignoring case.

mod record;

pub use crate::reader::record::Record;

use crate::config::ConfigError;
use crate::config::SheetConfig;
use crate::error::LoadError;
use crate::spreadsheet;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::SpreadsheetError;
use log::debug;
use std::collections::HashMap;
use std::fmt::Display;
use std::path::Path;
use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by [`SheetReader`].
#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("No readable Excel file at '{}': {source}", .path.display())]
    Load { path: PathBuf, source: LoadError },

    #[error("Sheet '{0}' not found in workbook")]
    SheetNotFound(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Coarse category of a [`ReaderError`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Load,
    NotFound,
    Config,
}

impl ReaderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReaderError::Load { .. } => ErrorKind::Load,
            ReaderError::SheetNotFound(_) => ErrorKind::NotFound,
            ReaderError::Config(_) => ErrorKind::Config,
        }
    }
}

/// Fully configured layout of one sheet.
struct Layout<'a> {
    sheet: &'a Sheet,
    fields_row: usize,
    lower: usize,
    upper: usize,
    unique_id_field: &'a str,
}

/// Configuration-driven lookups over the sheets of one workbook.
///
/// ```no_run
/// use sheet_query::{SheetConfig, SheetReader};
///
/// # fn main() -> Result<(), sheet_query::ReaderError> {
/// let mut reader = SheetReader::open("countries.xls")?;
/// let config = SheetConfig::new()
///     .with_fields_row(0)
///     .with_data_rows(1, 241)
///     .with_unique_id_field("numeric_code");
/// reader.set_sheet_config("Countries", config)?;
/// reader.set_active_sheet("Countries")?;
/// let record = reader.query(231, Some(["iso_alpha3_code", "country_or_area_name"].as_slice()), None)?;
/// # Ok(())
/// # }
/// ```
pub struct SheetReader {
    path: PathBuf,
    sheets: Vec<Sheet>,
    /// Keyed by the sheet name as stored in the workbook
    configs: HashMap<String, SheetConfig>,
    active: usize,
}

impl SheetReader {
    /// Loads every sheet of the workbook at `path`. Each sheet starts with an
    /// empty config and the first sheet is active.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<SheetReader, ReaderError> {
        let path = path.as_ref().to_path_buf();
        let load_error = |source: LoadError| ReaderError::Load {
            path: path.clone(),
            source,
        };
        let sheets = spreadsheet::open(&path).map_err(load_error)?;
        if sheets.is_empty() {
            let name = path.to_string_lossy().to_string();
            return Err(load_error(SpreadsheetError::SpreadsheetEmptyError(name).into()));
        }
        let configs = sheets
            .iter()
            .map(|sheet| (sheet.name().to_owned(), SheetConfig::default()))
            .collect();
        debug!("Opened '{}' with {} sheets, active sheet '{}'", path.display(), sheets.len(), sheets[0].name());

        Ok(SheetReader {
            path,
            sheets,
            configs,
            active: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(Sheet::name).collect()
    }

    pub fn active_sheet(&self) -> &Sheet {
        &self.sheets[self.active]
    }

    /// Finds a sheet by name, ignoring case.
    pub fn sheet_by_name(&self, name: &str) -> Result<&Sheet, ReaderError> {
        self.position(name).map(|index| &self.sheets[index])
    }

    /// The current config of a sheet; unset settings are `None`.
    pub fn sheet_config(&self, sheet: Option<&str>) -> Result<&SheetConfig, ReaderError> {
        let index = self.resolve(sheet)?;
        Ok(self.config(index))
    }

    /// Replaces the whole config of a sheet. A config missing any setting is
    /// rejected and the previous config stays in place.
    pub fn set_sheet_config(&mut self, sheet: &str, config: SheetConfig) -> Result<(), ReaderError> {
        let index = self.position(sheet)?;
        let name = self.sheets[index].name().to_owned();
        if let Some(property) = config.missing_property() {
            return Err(ConfigError::MissingProperty { sheet: name, property }.into());
        }
        debug!("Configured sheet '{}': {:?}", name, config);
        self.configs.insert(name, config);
        Ok(())
    }

    pub fn is_configured(&self, sheet: Option<&str>) -> Result<bool, ReaderError> {
        let index = self.resolve(sheet)?;
        Ok(self.config(index).is_complete())
    }

    /// Makes a configured sheet the default for later calls. Unknown and
    /// unconfigured sheets are both config errors.
    pub fn set_active_sheet(&mut self, sheet: &str) -> Result<(), ReaderError> {
        let index = self
            .position(sheet)
            .map_err(|_| ConfigError::UnknownSheet(sheet.to_owned()))?;
        let name = self.sheets[index].name();
        if !self.config(index).is_complete() {
            Err(ConfigError::NotConfigured(name.to_owned()))?
        }
        debug!("Active sheet is now '{}'", name);
        self.active = index;
        Ok(())
    }

    /// The field labels, left to right over every column of the sheet.
    pub fn fields(&self, sheet: Option<&str>) -> Result<Vec<String>, ReaderError> {
        let layout = self.layout(sheet)?;
        Ok(layout.sheet.row_values(layout.fields_row))
    }

    /// The first column whose label equals `field`, ignoring case.
    pub fn col_index_by_field(&self, field: &str, sheet: Option<&str>) -> Result<Option<usize>, ReaderError> {
        let layout = self.layout(sheet)?;
        Ok(find_field(&layout, field))
    }

    /// The first data row whose unique-id cell equals `uid`.
    ///
    /// Values are compared as rendered text, and two values that both read as
    /// numbers also match when numerically equal, so `20`, `"20"` and `20.0`
    /// all find a cell holding 20.
    pub fn row_index_by_uid(&self, uid: impl Display, sheet: Option<&str>) -> Result<Option<usize>, ReaderError> {
        let layout = self.layout(sheet)?;
        Ok(find_row(&layout, &uid.to_string()))
    }

    /// Reads the requested fields (all fields when `None`) of the row identified
    /// by `uid`. Returns `None` when no row matches; fields that match no
    /// label are left out of the record.
    pub fn query(
        &self,
        uid: impl Display,
        fields: Option<&[&str]>,
        sheet: Option<&str>,
    ) -> Result<Option<Record>, ReaderError> {
        let layout = self.layout(sheet)?;
        let row = match find_row(&layout, &uid.to_string()) {
            Some(row) => row,
            None => return Ok(None),
        };
        let all_fields;
        let fields: Vec<&str> = match fields {
            Some(fields) => fields.to_vec(),
            None => {
                all_fields = layout.sheet.row_values(layout.fields_row);
                all_fields.iter().map(String::as_str).collect()
            }
        };

        let mut record = Record::default();
        for field in fields {
            if let Some(col) = find_field(&layout, field) {
                record.insert(field, layout.sheet.cell_value(row, col));
            }
        }
        Ok(Some(record))
    }

    /// Reads a single field of the row identified by `uid`.
    pub fn query_field(&self, uid: impl Display, field: &str, sheet: Option<&str>) -> Result<Option<String>, ReaderError> {
        let layout = self.layout(sheet)?;
        let value = find_row(&layout, &uid.to_string())
            .zip(find_field(&layout, field))
            .map(|(row, col)| layout.sheet.cell_value(row, col));
        Ok(value)
    }

    /// Narrows the data rows later lookups scan. Requires `0 < lower < upper`.
    pub fn set_visible_rows(&mut self, lower: usize, upper: usize, sheet: Option<&str>) -> Result<(), ReaderError> {
        let index = self.resolve(sheet)?;
        if lower == 0 || upper <= lower {
            Err(ConfigError::InvalidVisibleRows { lower, upper })?
        }
        let name = self.sheets[index].name().to_owned();
        debug!("Visible rows of sheet '{}' set to {}..={}", name, lower, upper);
        self.configs.entry(name).or_default().set_visible_rows(lower, upper);
        Ok(())
    }

    /// Switches the unique-id field of a configured sheet. Returns `false`, and
    /// changes nothing, when `field` is not one of the sheet's labels.
    pub fn set_unique_id_field(&mut self, field: &str, sheet: Option<&str>) -> Result<bool, ReaderError> {
        let layout = self.layout(sheet)?;
        if find_field(&layout, field).is_none() {
            return Ok(false);
        }
        let name = layout.sheet.name().to_owned();
        debug!("Unique id field of sheet '{}' set to '{}'", name, field);
        self.configs.entry(name).or_default().set_unique_id_field(field);
        Ok(true)
    }

    fn position(&self, name: &str) -> Result<usize, ReaderError> {
        let lowercase = name.to_lowercase();
        self.sheets
            .iter()
            .position(|sheet| sheet.name().to_lowercase() == lowercase)
            .ok_or_else(|| ReaderError::SheetNotFound(name.to_owned()))
    }

    fn resolve(&self, sheet: Option<&str>) -> Result<usize, ReaderError> {
        match sheet {
            Some(name) => self.position(name),
            None => Ok(self.active),
        }
    }

    fn config(&self, index: usize) -> &SheetConfig {
        static EMPTY: SheetConfig = SheetConfig::EMPTY;
        self.configs.get(self.sheets[index].name()).unwrap_or(&EMPTY)
    }

    fn layout(&self, sheet: Option<&str>) -> Result<Layout<'_>, ReaderError> {
        let index = self.resolve(sheet)?;
        let sheet = &self.sheets[index];
        let (fields_row, lower, upper, unique_id_field) = self
            .config(index)
            .layout()
            .ok_or_else(|| ConfigError::NotConfigured(sheet.name().to_owned()))?;
        Ok(Layout {
            sheet,
            fields_row,
            lower,
            upper,
            unique_id_field,
        })
    }
}

fn find_field(layout: &Layout<'_>, field: &str) -> Option<usize> {
    let field = field.to_lowercase();
    (0..layout.sheet.ncols()).find(|col| layout.sheet.cell_value(layout.fields_row, *col).to_lowercase() == field)
}

/// Scans the data rows that exist in the sheet; bounds past the last row are cut.
fn find_row(layout: &Layout<'_>, uid: &str) -> Option<usize> {
    let col = find_field(layout, layout.unique_id_field)?;
    let last = layout.upper.min(layout.sheet.nrows().checked_sub(1)?);
    (layout.lower..=last).find(|row| uid_matches(&layout.sheet.cell_value(*row, col), uid))
}

fn uid_matches(value: &str, uid: &str) -> bool {
    if value == uid {
        return true;
    }
    match (value.parse::<f64>(), uid.parse::<f64>()) {
        (Ok(value), Ok(uid)) => value == uid,
        _ => false,
    }
}
