use crate::error::LoadError;
use crate::error::ResultMessage;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::xml::XmlReader;
use crate::helpers::xml::XmlTextContextHelper;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::excel;
use crate::spreadsheet::excel::load_relationships;
use crate::spreadsheet::reference::reference_to_index;
use crate::spreadsheet::reference::row_to_index;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::Spreadsheet;
use crate::spreadsheet::SpreadsheetError;
use log::debug;
use log::warn;
use quick_xml::events::Event;
use quick_xml::name::QName;
use std::collections::HashMap;
use std::io::BufReader;
use std::io::Read;
use std::io::Seek;
use zip::read::ZipFile;
use zip::ZipArchive;

// XML tag names for parsing Excel XLSX format
const TAG_CUSTOM_FORMATS: QName = QName(b"numFmts"); // Custom number formats container
const TAG_CUSTOM_FORMAT: QName = QName(b"numFmt");   // Individual custom number format
const TAG_FORMAT_INDEXES: QName = QName(b"cellXfs");  // Cell format indexes container
const TAG_FORMAT_INDEX: QName = QName(b"xf");         // Individual cell format index
const TAG_SHARED_STRING_ITEM: QName = QName(b"si");   // Shared string table item
const TAG_PHONETIC_TEXT: QName = QName(b"rPh");       // Phonetic text for Asian languages
const TAG_TEXT: QName = QName(b"t");                  // Text content within strings
const TAG_WORKBOOK_PROPERTIES: QName = QName(b"workbookPr");
const TAG_SHEET: QName = QName(b"sheet");
const TAG_ROW: QName = QName(b"row");
const TAG_CELL: QName = QName(b"c");
const TAG_INLINE_STRING: QName = QName(b"is");
const TAG_VALUE: QName = QName(b"v");

const WORKBOOK_PATH: &str = "xl/workbook.xml";
const WORKBOOK_RELATIONSHIPS_PATH: &str = "xl/_rels/workbook.xml.rels";
const STYLES_PATH: &str = "xl/styles.xml";
const SHARED_STRINGS_PATH: &str = "xl/sharedStrings.xml";

/// Represents an Excel XLSX (or XLSM) workbook
pub(crate) struct XlsxSpreadsheet<RS: Read + Seek> {
    pub(crate) name: String,
    zip: ZipArchive<RS>,
    /// Cell type of each `cellXfs` entry, indexed by the cell's `s` attribute
    number_formats: Vec<CellType>,
    shared_strings: Vec<String>,
    /// List of worksheets with (name, zip_path) pairs
    sheets: Vec<(String, String)>,
}

impl<RS: Read + Seek> XlsxSpreadsheet<RS> {
    /// Parses the workbook, styles and shared strings parts of an opened package.
    pub(crate) fn open(file_name: &str, mut zip: ZipArchive<RS>) -> Result<XlsxSpreadsheet<RS>, LoadError> {
        let (sheets, is_1904) = load_workbook(&mut zip)?;
        if sheets.is_empty() {
            Err(SpreadsheetError::SpreadsheetEmptyError(file_name.to_owned()))?
        }
        let number_formats = load_number_formats(&mut zip, is_1904)?;
        let shared_strings = load_shared_strings(&mut zip)?;
        debug!("Opened xlsx '{}': {} worksheets, {} shared strings", file_name, sheets.len(), shared_strings.len());

        Ok(XlsxSpreadsheet {
            name: file_name.to_owned(),
            zip,
            number_formats,
            shared_strings,
            sheets,
        })
    }
}

impl<RS: Read + Seek> Spreadsheet for XlsxSpreadsheet<RS> {
    fn name(&self) -> String {
        self.name.to_owned()
    }

    /// Parses every worksheet part. Cells without a value (styled blanks) are skipped.
    fn read_sheets(&mut self) -> Result<Vec<Sheet>, LoadError> {
        let mut sheets = Vec::<Sheet>::new();
        for (sheet_name, zip_path) in &self.sheets {
            let mut reader = self
                .zip
                .xml_reader(zip_path)?
                .ok_or_else(|| SpreadsheetError::FileError(zip_path.to_owned()))?;
            let sheet = read_worksheet(&mut reader, sheet_name, &self.number_formats, &self.shared_strings)
                .with_prefix(&format!("Sheet '{}'", sheet_name))?;
            debug!("Loaded sheet '{}': {} rows x {} columns", sheet_name, sheet.nrows(), sheet.ncols());
            sheets.push(sheet);
        }

        Ok(sheets)
    }
}

/// Reads the cells of one worksheet part.
///
/// Cells without an `r` reference take the next position in their row, and rows
/// without one follow the previous row.
fn read_worksheet<RS: Read + Seek>(
    reader: &mut XmlReader<BufReader<ZipFile<'_, RS>>>,
    sheet_name: &str,
    number_formats: &[CellType],
    shared_strings: &[String],
) -> Result<Sheet, LoadError> {
    let mut sheet = Sheet::new(sheet_name);
    let mut row_count = 0usize;
    let mut col_count = 0usize;
    let mut row = 0usize;
    let mut col = 0usize;
    let mut kind = CellType::default();
    let mut is_shared = false;
    let mut value: Option<String> = None;
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == TAG_ROW => {
            if let Some(index) = event.get_attribute_value("r")?.and_then(|r| row_to_index(&r)) {
                row_count = index;
            }
            col_count = 0;
        }
        Event::End(event) if event.name() == TAG_ROW => {
            row_count = row_count.saturating_add(1);
            col_count = 0;
        }
        Event::Start(event) if event.name() == TAG_CELL => {
            (row, col) = event
                .get_attribute_value("r")?
                .and_then(|reference| reference_to_index(&reference))
                .unwrap_or((row_count, col_count));
            col_count = col.saturating_add(1);
            value = None;
            let cell_type = event.get_attribute_value("t")?;
            is_shared = cell_type.as_deref() == Some("s");
            kind = match cell_type.as_deref() {
                Some("inlineStr") | Some("str") | Some("s") => CellType::String,
                Some("d") => CellType::IsoDateTime,
                Some("b") => CellType::Boolean,
                Some("e") => CellType::Error,
                _ => CellType::Number,
            };
            if let Some(format_id) = event.get_attribute_value("s")? {
                if kind == CellType::Number && !format_id.is_empty() {
                    let index = format_id.parse::<usize>()?;
                    kind = number_formats.get(index).copied().unwrap_or_else(|| {
                        warn!("Style index {} out of range in sheet '{}', treating cell as a number", index, sheet_name);
                        CellType::Number
                    });
                }
            }
        }
        Event::Start(event) if event.name() == TAG_INLINE_STRING => {
            value = Some(read_string_value(reader, TAG_INLINE_STRING, false)?);
        }
        Event::Start(event) if event.name() == TAG_VALUE => {
            let text = read_string_value(reader, TAG_VALUE, true)?;
            if is_shared {
                let index = text.trim().parse::<usize>()?;
                let string = shared_strings
                    .get(index)
                    .ok_or(SpreadsheetError::SharedStringIndexError(index))?;
                value = Some(string.to_owned());
            } else {
                value = Some(text);
            }
        }
        Event::End(event) if event.name() == TAG_CELL => {
            if let Some(value) = value.take() {
                sheet.push(Cell { row, col, kind, value });
            }
        }
    });
    Ok(sheet)
}

/// Loads workbook structure and worksheet information from XLSX file
///
/// Parses the workbook.xml file to extract worksheet names and their corresponding
/// XML file paths, and determines the date system (1900 vs 1904) used in the file.
///
/// # Returns
/// Tuple of (worksheets, is_1904_date_system) where worksheets are (name, zip_path) pairs
fn load_workbook<RS: Read + Seek>(zip: &mut ZipArchive<RS>) -> Result<(Vec<(String, String)>, bool), LoadError> {
    let relationships = load_relationships(zip, WORKBOOK_RELATIONSHIPS_PATH)?;
    let mut reader = zip
        .xml_reader(WORKBOOK_PATH)?
        .ok_or_else(|| SpreadsheetError::FileError(WORKBOOK_PATH.to_string()))?;
    let mut sheets: Vec<(String, String)> = Vec::new();
    let mut is_1904 = false;
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == TAG_SHEET => {
            let name = event.get_attribute_value("name")?;
            let id = event.get_local_attribute_value("id")?;
            if let Some((name, id)) = name.zip(id) {
                match relationships.get(&*id) {
                    Some(path) => sheets.push((name.to_string(), path.to_owned())),
                    None => warn!("Skipping sheet '{}': not a worksheet", name),
                }
            }
        }
        Event::Start(event) if event.name() == TAG_WORKBOOK_PROPERTIES => {
            is_1904 = event.get_attribute_value("date1904")?
                .map(|value| value.eq("1") || value.eq("true"))
                .unwrap_or(false);
        }
    });
    Ok((sheets, is_1904))
}

/// Part of `styles.xml` the styles reader is inside.
#[derive(Copy, Clone, PartialEq, Eq)]
enum StylesSection {
    Other,
    CustomFormats,
    FormatIndexes,
}

/// Maps every `cellXfs` entry to the cell type its number format implies.
///
/// `numFmts` precedes `cellXfs` in the part, so reading stops at the end of `cellXfs`.
fn load_number_formats<RS: Read + Seek>(zip: &mut ZipArchive<RS>, is_1904: bool) -> Result<Vec<CellType>, LoadError> {
    let mut reader = match zip.xml_reader(STYLES_PATH)? {
        Some(reader) => reader,
        None => return Ok(Vec::new()),
    };
    let mut section = StylesSection::Other;
    let mut custom_formats = HashMap::<String, CellType>::new();
    let mut format_indexes = Vec::<String>::new();
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == TAG_CUSTOM_FORMATS => section = StylesSection::CustomFormats,
        Event::Start(event) if event.name() == TAG_FORMAT_INDEXES => section = StylesSection::FormatIndexes,
        Event::End(event) if event.name() == TAG_CUSTOM_FORMATS => section = StylesSection::Other,
        Event::End(event) if event.name() == TAG_FORMAT_INDEXES => break,
        Event::Start(event) if section == StylesSection::CustomFormats && event.name() == TAG_CUSTOM_FORMAT => {
            let id = event.get_attribute_value("numFmtId")?;
            let code = event.get_attribute_value("formatCode")?;
            if let Some((id, code)) = id.zip(code) {
                custom_formats.insert(id.into_owned(), CellType::parse_custom_number_format(&code, is_1904));
            }
        }
        Event::Start(event) if section == StylesSection::FormatIndexes && event.name() == TAG_FORMAT_INDEX => {
            let id = event.get_attribute_value("numFmtId")?;
            format_indexes.push(id.map_or_else(|| "0".to_owned(), |id| id.into_owned()));
        }
    });
    Ok(excel::load_number_formats(format_indexes, custom_formats, is_1904))
}

/// Loads the whole shared string table; a package without one has no shared strings.
fn load_shared_strings<RS: Read + Seek>(zip: &mut ZipArchive<RS>) -> Result<Vec<String>, LoadError> {
    let mut shared_strings = Vec::<String>::new();
    let mut reader = match zip.xml_reader(SHARED_STRINGS_PATH)? {
        Some(reader) => reader,
        None => return Ok(shared_strings),
    };
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == TAG_SHARED_STRING_ITEM => {
            let string = read_string_value(&mut reader, TAG_SHARED_STRING_ITEM, false)?;
            shared_strings.push(string);
        }
    });
    Ok(shared_strings)
}

/// Reads string value from XML content, handling text and CDATA sections
///
/// Extracts string content up to `end_tag`, skipping phonetic text annotations.
/// Rich text runs (`<r><t>..</t></r>`) are concatenated.
///
/// # Arguments
/// * `reader` - XML reader positioned at the start of the string content
/// * `end_tag` - XML tag that marks the end of the string content
/// * `is_text_content` - Whether to treat the content as text by default
fn read_string_value<RS: Read + Seek>(
    reader: &mut XmlReader<BufReader<ZipFile<'_, RS>>>,
    end_tag: QName,
    is_text_content: bool,
) -> Result<String, LoadError> {
    let mut is_phonetic_text = false;
    let mut is_text = is_text_content;
    let mut text = String::new();
    match_xml_events!(reader => {
        Event::End(event) if event.name() == end_tag => break,
        Event::Start(event) if event.name() == TAG_PHONETIC_TEXT => is_phonetic_text = true,
        Event::End(event) if event.name() == TAG_PHONETIC_TEXT => is_phonetic_text = false,
        Event::Start(event) if !is_phonetic_text && event.name() == TAG_TEXT => is_text = true,
        Event::End(event) if is_text && event.name() == TAG_TEXT => is_text = false,
        Event::Text(event) if is_text => text.push_str(&event.xml_content()?),
        Event::CData(event) if is_text => text.push_str(&event.xml_content()?),
        Event::GeneralRef(event) if is_text => text.push_bytes_ref(&event)?,
    });
    Ok(text)
}
