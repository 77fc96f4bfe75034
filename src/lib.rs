//! # Sheet Query
//!
//! Field lookups over Excel workbooks, driven by per-sheet configuration.
//!
//! A workbook is loaded once with [`SheetReader::open`]. Each sheet is then
//! described with a [`SheetConfig`]:
//!
//! - `FIELDS_ROW_INDEX`: the row holding the field labels
//! - `DATA_LOWER_INDEX` / `DATA_UPPER_INDEX`: the inclusive data rows
//! - `UNIQUE_ID_FIELD`: the field whose values identify a row
//!
//! After that, [`SheetReader::query`] returns the field values of the row whose
//! unique id matches, as strings.
//!
//! ## Formats
//!
//! - Excel 97-2003 workbooks (`.xls`, BIFF8 in a compound file)
//! - Excel 2007+ workbooks (`.xlsx`, `.xlsm`)
//!
//! The format is detected from the file contents. Everything is read into memory
//! when the workbook is opened; no file handle is kept afterwards.
//!
//! ## Logging
//!
//! The crate logs through the [`log`] facade and never installs a logger.

mod config;
mod error;
mod helpers;
mod reader;
mod spreadsheet;

pub use crate::config::ConfigError;
pub use crate::config::Property;
pub use crate::config::SheetConfig;
pub use crate::error::LoadError;
pub use crate::helpers::biff8::Biff8Error;
pub use crate::helpers::cfb::CfbError;
pub use crate::helpers::xml::XmlError;
pub use crate::reader::ErrorKind;
pub use crate::reader::ReaderError;
pub use crate::reader::Record;
pub use crate::reader::SheetReader;
pub use crate::spreadsheet::cell::Cell;
pub use crate::spreadsheet::sheet::Sheet;
pub use crate::spreadsheet::xls::XlsError;
pub use crate::spreadsheet::SpreadsheetError;
