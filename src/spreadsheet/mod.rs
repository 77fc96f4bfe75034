//! # Spreadsheet Loading
//!
//! Reads Excel workbooks (.xls BIFF8 and .xlsx/.xlsm OOXML) into memory as a list
//! of [`Sheet`]s. The format is detected from the leading bytes of the file, so a
//! misnamed extension is not a problem.

pub(crate) mod cell;
mod excel;
pub(crate) mod reference;
pub(crate) mod sheet;
pub(crate) mod xls;
mod xlsx;

use crate::error::LoadError;
use crate::helpers::cfb;
use crate::helpers::cfb::Cfb;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::xls::XlsSpreadsheet;
use crate::spreadsheet::xlsx::XlsxSpreadsheet;
use log::debug;
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;
use zip::ZipArchive;

const ZIP_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

/// Errors about the workbook as a whole rather than a particular record
#[derive(Error, Debug)]
pub enum SpreadsheetError {
    #[error("Spreadsheet '{0}' has no worksheets")]
    SpreadsheetEmptyError(String),

    #[error("Spreadsheet '{0}' is password protected")]
    SpreadsheetPasswordProtectedError(String),

    #[error("Missing part '{0}'")]
    FileError(String),

    #[error("'{0}' is not an Excel workbook")]
    FileFormatError(String),

    #[error("Shared string index {0} out of range")]
    SharedStringIndexError(usize),
}

/// A workbook whose globals are parsed and whose sheets can be read.
pub(crate) trait Spreadsheet {
    /// Returns the file name for identification in messages
    fn name(&self) -> String;

    /// Reads every worksheet, in workbook order
    fn read_sheets(&mut self) -> Result<Vec<Sheet>, LoadError>;
}

/// Reads a workbook file fully into memory and returns its worksheets.
pub(crate) fn open(path: &Path) -> Result<Vec<Sheet>, LoadError> {
    let file_name = path.to_string_lossy().to_string();
    let data = std::fs::read(path)?;
    let mut spreadsheet = detect(&file_name, data)?;
    let sheets = spreadsheet.read_sheets()?;
    debug!("Loaded {} sheets from '{}'", sheets.len(), spreadsheet.name());
    Ok(sheets)
}

/// Picks the reader from the file signature.
fn detect(file_name: &str, data: Vec<u8>) -> Result<Box<dyn Spreadsheet>, LoadError> {
    if data.starts_with(&cfb::SIGNATURE) {
        let cfb = Cfb::new(&mut Cursor::new(data))?;
        if cfb.exists("EncryptedPackage") {
            Err(SpreadsheetError::SpreadsheetPasswordProtectedError(file_name.to_owned()))?
        }
        Ok(Box::new(XlsSpreadsheet::open(file_name, cfb)?))
    } else if data.starts_with(&ZIP_SIGNATURE) {
        let zip = ZipArchive::new(Cursor::new(data))?;
        Ok(Box::new(XlsxSpreadsheet::open(file_name, zip)?))
    } else {
        Err(SpreadsheetError::FileFormatError(file_name.to_owned()))?
    }
}
