//! Excel 97-2003 (.xls) workbooks: BIFF8 records inside a compound file.
use crate::error::ResultMessage;
use crate::error::ResultOptionChain;
use crate::error::LoadError;
use crate::helpers::biff8::Biff8Reader;
use crate::helpers::cfb::Cfb;
use crate::match_biff8_record;
use crate::spreadsheet::cell::to_error_value;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::excel::load_number_formats;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::Spreadsheet;
use crate::spreadsheet::SpreadsheetError;
use either::Either;
use log::debug;
use log::warn;
use std::collections::HashMap;
use thiserror::Error;

// BIFF8 record type identifiers
const FORMULA: u16 = 6;        // Cell formula with its cached result
const EOF: u16 = 10;           // End of a substream
const DATE1904: u16 = 34;      // Date system flag (1904 vs 1900 base)
const FILE_PASS: u16 = 47;     // Encryption header
const CODE_PAGE: u16 = 66;     // Code page of 8-bit strings
const BOUND_SHEET8: u16 = 133; // Sheet name, type and substream position
const MUL_RK: u16 = 189;       // Run of RK numbers in one row
const XF: u16 = 224;           // Extended format, points at a number format
const SST: u16 = 252;          // Shared string table
const LABEL_SST: u16 = 253;    // Cell referencing the shared string table
const NUMBER: u16 = 515;       // Cell with an f64
const LABEL: u16 = 516;        // Cell with an inline string
const BOOL_ERR: u16 = 517;     // Cell with a boolean or an error code
const STRING: u16 = 519;       // String result of the preceding formula
const RK: u16 = 638;           // Cell with a compressed number
const FORMAT: u16 = 1054;      // Custom number format definition
const BOF: u16 = 2057;         // Start of a substream

const BIFF8_VERSION: u16 = 0x0600;
const WORKSHEET: u8 = 0;

/// Error types specific to XLS file parsing
#[derive(Error, Debug)]
pub enum XlsError {
    #[error("Unsupported BIFF version 0x{0:04X}, only BIFF8 is supported")]
    BiffVersionError(u16),

    #[error("Invalid Formula value '{0}'")]
    FormulaValueError(u64),
}

/// Cell type known from the record itself, or an XF index still to be resolved.
type CellKind = Either<CellType, usize>;

/// An opened XLS workbook with its globals substream already parsed.
pub(crate) struct XlsSpreadsheet {
    pub(crate) name: String,
    reader: Biff8Reader,
    shared_strings: Vec<String>,
    number_formats: Vec<CellType>,
    /// Worksheets with their substream positions
    sheets: Vec<(String, usize)>,
}

impl XlsSpreadsheet {
    /// Reads the `Workbook` (or older `Book`) stream and parses the workbook globals.
    pub(crate) fn open(file_name: &str, cfb: Cfb) -> Result<XlsSpreadsheet, LoadError> {
        let mut reader = cfb
            .read("Workbook")
            .ok_none_else(|| cfb.read("Book"))?
            .map(Biff8Reader::new)
            .ok_or_else(|| SpreadsheetError::SpreadsheetEmptyError(file_name.to_owned()))?;

        match reader.next()? {
            Some(BOF) => {
                let version = reader.read_u16()?;
                if version != BIFF8_VERSION {
                    Err(XlsError::BiffVersionError(version))?
                }
            }
            _ => Err(SpreadsheetError::FileFormatError(file_name.to_owned()))?,
        }

        let mut is_1904 = false;
        let mut shared_strings = Vec::new();
        let mut custom_formats: HashMap<String, CellType> = HashMap::new();
        let mut format_indexes: Vec<String> = Vec::new();
        let mut sheets: Vec<(String, usize)> = Vec::new();
        match_biff8_record!(reader => {
            EOF => break,
            FILE_PASS => Err(SpreadsheetError::SpreadsheetPasswordProtectedError(file_name.to_owned()))?,
            DATE1904 => is_1904 = reader.read_u16()? == 1,
            CODE_PAGE => {
                let code_page = reader.read_u16()?;
                match codepage::to_encoding(code_page) {
                    Some(encoding) => reader.encoding = encoding,
                    None => warn!("Unknown code page {} in '{}', reading 8-bit strings as Latin-1", code_page, file_name),
                }
            }
            FORMAT => {
                let id = reader.read_u16()?;
                let format = reader.read_xl_unicode_string()?;
                custom_formats.insert(id.to_string(), CellType::parse_custom_number_format(&format, false));
            }
            XF => {
                reader.skip(2)?;
                let id = reader.read_u16()?;
                format_indexes.push(id.to_string());
            }
            SST => shared_strings = load_shared_strings(&mut reader)?,
            BOUND_SHEET8 => {
                let pointer = reader.read_usize()?;
                reader.skip(1)?;
                let kind = reader.read_u8()?;
                let sheet_name = reader.read_short_xl_unicode_string()?;
                if kind == WORKSHEET {
                    sheets.push((sheet_name, pointer));
                } else {
                    warn!("Skipping sheet '{}' of type {} in '{}': not a worksheet", sheet_name, kind, file_name);
                }
            }
        });
        if sheets.is_empty() {
            Err(SpreadsheetError::SpreadsheetEmptyError(file_name.to_owned()))?
        }

        // DATE1904 may follow FORMAT records
        let custom_formats = if is_1904 {
            custom_formats.into_iter().map(|(id, kind)| (id, to_1904(kind))).collect()
        } else {
            custom_formats
        };
        let number_formats = load_number_formats(format_indexes, custom_formats, is_1904);
        debug!("Opened xls '{}': {} worksheets, {} shared strings", file_name, sheets.len(), shared_strings.len());

        Ok(XlsSpreadsheet {
            name: file_name.to_owned(),
            reader,
            shared_strings,
            number_formats,
            sheets,
        })
    }

    fn resolve(&self, kind: CellKind) -> CellType {
        match kind {
            Either::Left(kind) => kind,
            Either::Right(index) => self.number_formats.get(index).copied().unwrap_or_else(|| {
                warn!("XF index {} out of range in '{}', treating cell as a number", index, self.name);
                CellType::Number
            }),
        }
    }

    fn read_sheet(&mut self, sheet_name: &str, pointer: usize) -> Result<Sheet, LoadError> {
        let mut sheet = Sheet::new(sheet_name);
        let mut pending_string: Option<(usize, usize)> = None;
        self.reader.goto(pointer);
        self.reader.next()?;
        while let Some(tag) = self.reader.next()? {
            match tag {
                BOF | EOF => break,
                MUL_RK => {
                    pending_string = None;
                    let row = self.reader.read_u16()? as usize;
                    let col_lower_bound = self.reader.read_u16()? as usize;
                    let col_upper_bound = self.reader.get_u16_back(2)? as usize;
                    for col in col_lower_bound..=col_upper_bound {
                        let index = self.reader.read_u16()? as usize;
                        let value = self.reader.read_rk_number()?;
                        let kind = self.resolve(Either::Right(index));
                        sheet.push(Cell {
                            row,
                            col,
                            kind,
                            value: value.to_string(),
                        });
                    }
                }
                BOOL_ERR | NUMBER | RK | LABEL_SST | LABEL | FORMULA => {
                    pending_string = None;
                    let row = self.reader.read_u16()? as usize;
                    let col = self.reader.read_u16()? as usize;
                    let cell = match tag {
                        BOOL_ERR => Some(read_bool_or_error_cell(&mut self.reader)?),
                        NUMBER => Some(read_number_cell(&mut self.reader)?),
                        RK => Some(read_rk_cell(&mut self.reader)?),
                        LABEL_SST => Some(self.read_label_sst_cell()?),
                        LABEL => Some(read_label_cell(&mut self.reader)?),
                        _ => {
                            let result = read_formula_cell(&mut self.reader)?;
                            if let FormulaResult::PendingString = result {
                                pending_string = Some((row, col));
                            }
                            result.into_cell()
                        }
                    };
                    if let Some((kind, value)) = cell {
                        let kind = self.resolve(kind);
                        sheet.push(Cell { row, col, kind, value });
                    }
                }
                STRING => {
                    if let Some((row, col)) = pending_string.take() {
                        let value = self.reader.read_xl_unicode_string()?;
                        sheet.push(Cell {
                            row,
                            col,
                            kind: CellType::String,
                            value,
                        });
                    }
                }
                _ => (),
            }
        }
        debug!("Loaded sheet '{}': {} rows x {} columns", sheet_name, sheet.nrows(), sheet.ncols());
        Ok(sheet)
    }

    fn read_label_sst_cell(&mut self) -> Result<(CellKind, String), LoadError> {
        self.reader.skip(2)?;
        let index = self.reader.read_usize()?;
        let value = self
            .shared_strings
            .get(index)
            .ok_or(SpreadsheetError::SharedStringIndexError(index))?;
        Ok((Either::Left(CellType::String), value.to_owned()))
    }
}

impl Spreadsheet for XlsSpreadsheet {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn read_sheets(&mut self) -> Result<Vec<Sheet>, LoadError> {
        let mut sheets = Vec::<Sheet>::new();
        for (sheet_name, pointer) in self.sheets.clone() {
            let sheet = self
                .read_sheet(&sheet_name, pointer)
                .with_prefix(&format!("Sheet '{}'", sheet_name))?;
            sheets.push(sheet);
        }
        Ok(sheets)
    }
}

/// Moves a 1900-based date type to its 1904 counterpart.
fn to_1904(kind: CellType) -> CellType {
    match kind {
        CellType::NumberDate1900 => CellType::NumberDate1904,
        CellType::NumberDateTime1900 => CellType::NumberDateTime1904,
        CellType::NumberTime1900 => CellType::NumberTime1904,
        _ => kind,
    }
}

/// Reads the shared string table; entries may span CONTINUE records.
fn load_shared_strings(reader: &mut Biff8Reader) -> Result<Vec<String>, LoadError> {
    reader.skip(4)?;
    let count = reader.read_usize()?;
    let mut shared_strings: Vec<String> = Vec::with_capacity(count.min(1 << 16));
    for _ in 0..count {
        let string = reader.read_xl_unicode_rich_extended_string()?;
        shared_strings.push(string);
    }
    Ok(shared_strings)
}

/// BOOLERR: a value byte and a flag telling booleans from error codes.
fn read_bool_or_error_cell(reader: &mut Biff8Reader) -> Result<(CellKind, String), LoadError> {
    reader.skip(2)?;
    let value = reader.read_u8()?;
    let flag = reader.read_u8()?;
    if flag == 0 {
        Ok((Either::Left(CellType::Boolean), value.to_string()))
    } else {
        Ok((Either::Left(CellType::Error), to_error_value(value).to_owned()))
    }
}

fn read_number_cell(reader: &mut Biff8Reader) -> Result<(CellKind, String), LoadError> {
    let index = reader.read_u16()? as usize;
    let value = reader.read_f64()?;
    Ok((Either::Right(index), value.to_string()))
}

fn read_rk_cell(reader: &mut Biff8Reader) -> Result<(CellKind, String), LoadError> {
    let index = reader.read_u16()? as usize;
    let value = reader.read_rk_number()?;
    Ok((Either::Right(index), value.to_string()))
}

fn read_label_cell(reader: &mut Biff8Reader) -> Result<(CellKind, String), LoadError> {
    reader.skip(2)?;
    let value = reader.read_xl_unicode_string()?;
    Ok((Either::Left(CellType::String), value))
}

/// Cached result of a FORMULA record.
enum FormulaResult {
    Value(CellKind, String),
    /// The text arrives in the next STRING record
    PendingString,
    EmptyString,
}

impl FormulaResult {
    fn into_cell(self) -> Option<(CellKind, String)> {
        match self {
            FormulaResult::Value(kind, value) => Some((kind, value)),
            FormulaResult::PendingString | FormulaResult::EmptyString => None,
        }
    }
}

/// The 8-byte FormulaValue is an f64 unless its top two bytes are 0xFFFF,
/// in which case the low byte tags a string, boolean, error or empty string.
fn read_formula_cell(reader: &mut Biff8Reader) -> Result<FormulaResult, LoadError> {
    let index = reader.read_u16()? as usize;
    let formula = reader.read_u64()?;
    let is_number = (formula & 0xFFFF000000000000) != 0xFFFF000000000000;
    if is_number {
        return Ok(FormulaResult::Value(Either::Right(index), f64::from_bits(formula).to_string()));
    }
    match formula & 0xFF {
        0 => Ok(FormulaResult::PendingString),
        1 => {
            let value = if (formula & 0xFF0000) > 0 { "1" } else { "0" };
            Ok(FormulaResult::Value(Either::Left(CellType::Boolean), value.to_owned()))
        }
        2 => {
            let code = ((formula >> 16) & 0xFF) as u8;
            Ok(FormulaResult::Value(Either::Left(CellType::Error), to_error_value(code).to_owned()))
        }
        3 => Ok(FormulaResult::EmptyString),
        _ => Err(XlsError::FormulaValueError(formula))?,
    }
}
