//! Workbook fixtures shared by the integration tests.
//!
//! One [`Workbook`] description is written either as a BIFF8 `.xls` inside a
//! compound file, or as an `.xlsx` through `rust_xlsxwriter`.
#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::io::Write;
use std::path::PathBuf;

use rust_xlsxwriter::Format;
use tempfile::TempDir;

const RECORD_BOF: u16 = 0x0809;
const RECORD_EOF: u16 = 0x000A;
const RECORD_CODEPAGE: u16 = 0x0042;
const RECORD_DATEMODE: u16 = 0x0022;
const RECORD_FORMAT: u16 = 0x041E;
const RECORD_XF: u16 = 0x00E0;
const RECORD_SST: u16 = 0x00FC;
const RECORD_CONTINUE: u16 = 0x003C;
const RECORD_BOUNDSHEET: u16 = 0x0085;
const RECORD_LABELSST: u16 = 0x00FD;
const RECORD_LABEL: u16 = 0x0204;
const RECORD_NUMBER: u16 = 0x0203;
const RECORD_RK: u16 = 0x027E;
const RECORD_MULRK: u16 = 0x00BD;
const RECORD_BOOLERR: u16 = 0x0205;
const RECORD_FORMULA: u16 = 0x0006;
const RECORD_STRING: u16 = 0x0207;
const RECORD_FILEPASS: u16 = 0x002F;

const BOF_DT_WORKBOOK_GLOBALS: u16 = 0x0005;
const BOF_DT_WORKSHEET: u16 = 0x0010;
const BOF_DT_CHART: u16 = 0x0020;

const SHEET_TYPE_WORKSHEET: u8 = 0x00;
const SHEET_TYPE_CHART: u8 = 0x02;

/// Largest record payload before the writer continues in a CONTINUE record.
const MAX_RECORD_DATA: usize = 8224;

const XF_GENERAL: u16 = 0;
const XF_DATE: u16 = 1;
const DATE_FORMAT_ID: u16 = 164;
const DATE_FORMAT: &str = "yyyy-mm-dd";

/// One cell of a fixture sheet.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Blank,
    /// Shared string (LABELSST in xls)
    Text(String),
    /// Inline string (LABEL in xls)
    Label(String),
    Number(f64),
    /// Serial date shown with a `yyyy-mm-dd` format
    Date(f64),
    Bool(bool),
    /// BIFF8 error code, e.g. 0x07 for `#DIV/0!`
    Error(u8),
    /// Formula whose cached result is text (FORMULA then STRING in xls)
    Formula(String),
}

pub fn text(value: &str) -> Value {
    Value::Text(value.to_owned())
}

pub fn number(value: impl Into<f64>) -> Value {
    Value::Number(value.into())
}

#[derive(Clone, Debug)]
pub struct SheetData {
    pub name: String,
    pub rows: Vec<Vec<Value>>,
}

#[derive(Clone, Debug, Default)]
pub struct Workbook {
    pub sheets: Vec<SheetData>,
    /// Chart sheets, listed after the worksheets
    pub charts: Vec<String>,
    pub date1904: bool,
}

impl Workbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sheet(mut self, name: &str, rows: Vec<Vec<Value>>) -> Self {
        self.sheets.push(SheetData {
            name: name.to_owned(),
            rows,
        });
        self
    }

    pub fn chart(mut self, name: &str) -> Self {
        self.charts.push(name.to_owned());
        self
    }

    pub fn date1904(mut self) -> Self {
        self.date1904 = true;
        self
    }
}

/// A small country table on sheet "Countries" plus a second sheet "Notes".
///
/// Row 0 holds the labels, rows 1..=5 the data.
pub fn countries() -> Workbook {
    let rows = vec![
        vec![text("numeric_code"), text("iso_alpha3_code"), text("country_or_area_name"), text("joined"), text("member")],
        vec![number(4), text("AFG"), text("Afghanistan"), Value::Date(17_122.0), Value::Bool(true)],
        vec![number(8), text("ALB"), text("Albania"), Value::Date(20_455.0), Value::Bool(true)],
        vec![number(231), text("ETH"), text("Ethiopia"), Value::Date(17_122.0), Value::Bool(true)],
        vec![number(533), text("ABW"), text("Aruba"), Value::Blank, Value::Bool(false)],
        vec![number(368), text("IRQ"), text("Iraq"), Value::Date(17_816.0), Value::Bool(true)],
    ];
    let notes = vec![
        vec![text("key"), text("note")],
        vec![text("source"), text("UN M49")],
        vec![text("ratio"), number(0.25)],
        vec![text("sizes"), number(10), number(20), number(30)],
    ];
    Workbook::new().sheet("Countries", rows).sheet("Notes", notes)
}

/// Scratch directory that lives as long as the returned guard.
pub fn scratch() -> std::io::Result<TempDir> {
    tempfile::tempdir()
}

pub fn save_xls(dir: &TempDir, name: &str, workbook: &Workbook) -> std::io::Result<PathBuf> {
    let path = dir.path().join(name);
    std::fs::write(&path, xls_bytes(workbook)?)?;
    Ok(path)
}

pub fn save_xlsx(dir: &TempDir, name: &str, workbook: &Workbook) -> anyhow::Result<PathBuf> {
    let path = dir.path().join(name);
    std::fs::write(&path, xlsx_bytes(workbook)?)?;
    Ok(path)
}

pub fn save_bytes(dir: &TempDir, name: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
    let path = dir.path().join(name);
    std::fs::write(&path, bytes)?;
    Ok(path)
}

// ---------------------------------------------------------------------------
// xls
// ---------------------------------------------------------------------------

/// Builds a BIFF8 `Workbook` stream and wraps it in a compound file.
pub fn xls_bytes(workbook: &Workbook) -> std::io::Result<Vec<u8>> {
    wrap_in_cfb("Workbook", &workbook_stream(workbook, false))
}

/// Same as [`xls_bytes`] with a FILEPASS record in the globals.
pub fn encrypted_xls_bytes(workbook: &Workbook) -> std::io::Result<Vec<u8>> {
    wrap_in_cfb("Workbook", &workbook_stream(workbook, true))
}

/// A compound file holding the streams of an encrypted OOXML package.
pub fn encrypted_ooxml_bytes() -> std::io::Result<Vec<u8>> {
    let mut ole = cfb::CompoundFile::create(Cursor::new(Vec::new()))?;
    ole.create_stream("EncryptionInfo")?.write_all(&[4, 0, 4, 0, 0, 0, 0, 0])?;
    ole.create_stream("EncryptedPackage")?.write_all(&[0; 16])?;
    Ok(ole.into_inner().into_inner())
}

/// A compound file without any workbook stream, like a Word document.
pub fn non_workbook_cfb_bytes() -> std::io::Result<Vec<u8>> {
    wrap_in_cfb("WordDocument", &[0; 64])
}

pub fn wrap_in_cfb(stream: &str, bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut ole = cfb::CompoundFile::create(Cursor::new(Vec::new()))?;
    {
        let mut writer = ole.create_stream(stream)?;
        writer.write_all(bytes)?;
    }
    ole.flush()?;
    Ok(ole.into_inner().into_inner())
}

pub fn workbook_stream(workbook: &Workbook, encrypted: bool) -> Vec<u8> {
    let strings = shared_strings(workbook);
    let string_indexes: HashMap<&str, u32> = strings
        .iter()
        .enumerate()
        .map(|(index, string)| (string.as_str(), index as u32))
        .collect();

    let mut globals = Vec::new();
    push_record(&mut globals, RECORD_BOF, &bof(BOF_DT_WORKBOOK_GLOBALS));
    if encrypted {
        push_record(&mut globals, RECORD_FILEPASS, &[0; 6]);
    }
    push_record(&mut globals, RECORD_CODEPAGE, &1200u16.to_le_bytes());
    push_record(&mut globals, RECORD_DATEMODE, &u16::from(workbook.date1904).to_le_bytes());
    let mut format = Vec::new();
    format.extend_from_slice(&DATE_FORMAT_ID.to_le_bytes());
    write_unicode_string(&mut format, DATE_FORMAT);
    push_record(&mut globals, RECORD_FORMAT, &format);
    push_record(&mut globals, RECORD_XF, &xf_record(0, 0, 0xFFF5));
    push_record(&mut globals, RECORD_XF, &xf_record(0, DATE_FORMAT_ID, 0x0001));
    globals.extend(sst_records(&strings));

    let mut substreams: Vec<(Vec<u8>, u8, usize)> = Vec::new();
    for sheet in &workbook.sheets {
        substreams.push((worksheet_stream(sheet, &string_indexes), SHEET_TYPE_WORKSHEET, 0));
    }
    for _ in &workbook.charts {
        let mut chart = Vec::new();
        push_record(&mut chart, RECORD_BOF, &bof(BOF_DT_CHART));
        push_record(&mut chart, RECORD_EOF, &[]);
        substreams.push((chart, SHEET_TYPE_CHART, 0));
    }

    let names = workbook
        .sheets
        .iter()
        .map(|sheet| sheet.name.as_str())
        .chain(workbook.charts.iter().map(String::as_str));
    for ((_, kind, offset_at), name) in substreams.iter_mut().zip(names) {
        let mut data = Vec::new();
        // Patched once the substream positions are known
        data.extend_from_slice(&0u32.to_le_bytes());
        data.push(0);
        data.push(*kind);
        write_short_unicode_string(&mut data, name);
        *offset_at = globals.len() + 4;
        push_record(&mut globals, RECORD_BOUNDSHEET, &data);
    }
    push_record(&mut globals, RECORD_EOF, &[]);

    let mut stream = globals;
    for (substream, _, offset_at) in substreams {
        let position = stream.len() as u32;
        stream[offset_at..offset_at + 4].copy_from_slice(&position.to_le_bytes());
        stream.extend(substream);
    }
    stream
}

fn shared_strings(workbook: &Workbook) -> Vec<String> {
    let mut strings: Vec<String> = Vec::new();
    for sheet in &workbook.sheets {
        for value in sheet.rows.iter().flatten() {
            if let Value::Text(string) = value {
                if !strings.contains(string) {
                    strings.push(string.clone());
                }
            }
        }
    }
    strings
}

fn worksheet_stream(sheet: &SheetData, string_indexes: &HashMap<&str, u32>) -> Vec<u8> {
    let mut out = Vec::new();
    push_record(&mut out, RECORD_BOF, &bof(BOF_DT_WORKSHEET));
    for (row, values) in sheet.rows.iter().enumerate() {
        let row = row as u16;
        let mut col = 0usize;
        while col < values.len() {
            // Runs of small integers go out as MULRK, single ones as RK
            let run: Vec<u32> = values[col..].iter().map_while(rk_value).collect();
            match run.len() {
                0 => {
                    push_cell(&mut out, row, col as u16, &values[col], string_indexes);
                    col += 1;
                }
                1 => {
                    let mut data = cell_header(row, col as u16, XF_GENERAL);
                    data.extend_from_slice(&run[0].to_le_bytes());
                    push_record(&mut out, RECORD_RK, &data);
                    col += 1;
                }
                count => {
                    let mut data = Vec::new();
                    data.extend_from_slice(&row.to_le_bytes());
                    data.extend_from_slice(&(col as u16).to_le_bytes());
                    for rk in &run {
                        data.extend_from_slice(&XF_GENERAL.to_le_bytes());
                        data.extend_from_slice(&rk.to_le_bytes());
                    }
                    data.extend_from_slice(&((col + count - 1) as u16).to_le_bytes());
                    push_record(&mut out, RECORD_MULRK, &data);
                    col += count;
                }
            }
        }
    }
    push_record(&mut out, RECORD_EOF, &[]);
    out
}

fn push_cell(out: &mut Vec<u8>, row: u16, col: u16, value: &Value, string_indexes: &HashMap<&str, u32>) {
    match value {
        Value::Blank => {}
        Value::Text(string) => {
            let mut data = cell_header(row, col, XF_GENERAL);
            data.extend_from_slice(&string_indexes[string.as_str()].to_le_bytes());
            push_record(out, RECORD_LABELSST, &data);
        }
        Value::Label(string) => {
            let mut data = cell_header(row, col, XF_GENERAL);
            write_unicode_string(&mut data, string);
            push_record(out, RECORD_LABEL, &data);
        }
        Value::Number(number) => {
            let mut data = cell_header(row, col, XF_GENERAL);
            data.extend_from_slice(&number.to_le_bytes());
            push_record(out, RECORD_NUMBER, &data);
        }
        Value::Date(serial) => {
            let mut data = cell_header(row, col, XF_DATE);
            data.extend_from_slice(&serial.to_le_bytes());
            push_record(out, RECORD_NUMBER, &data);
        }
        Value::Bool(flag) => {
            let mut data = cell_header(row, col, XF_GENERAL);
            data.extend_from_slice(&[u8::from(*flag), 0]);
            push_record(out, RECORD_BOOLERR, &data);
        }
        Value::Error(code) => {
            let mut data = cell_header(row, col, XF_GENERAL);
            data.extend_from_slice(&[*code, 1]);
            push_record(out, RECORD_BOOLERR, &data);
        }
        Value::Formula(result) => {
            let mut data = cell_header(row, col, XF_GENERAL);
            // FormulaValue tagged as a string result
            data.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0xFF, 0xFF]);
            data.extend_from_slice(&0u16.to_le_bytes());
            data.extend_from_slice(&0u32.to_le_bytes());
            data.extend_from_slice(&0u16.to_le_bytes());
            push_record(out, RECORD_FORMULA, &data);
            let mut string = Vec::new();
            write_unicode_string(&mut string, result);
            push_record(out, RECORD_STRING, &string);
        }
    }
}

fn rk_value(value: &Value) -> Option<u32> {
    match value {
        Value::Number(number) if number.fract() == 0.0 && number.abs() < f64::from(1 << 29) => {
            Some(((*number as i32) << 2) as u32 | 0x02)
        }
        _ => None,
    }
}

fn cell_header(row: u16, col: u16, xf: u16) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(&row.to_le_bytes());
    data.extend_from_slice(&col.to_le_bytes());
    data.extend_from_slice(&xf.to_le_bytes());
    data
}

pub fn push_record(out: &mut Vec<u8>, id: u16, data: &[u8]) {
    out.extend_from_slice(&id.to_le_bytes());
    out.extend_from_slice(&(data.len() as u16).to_le_bytes());
    out.extend_from_slice(data);
}

pub fn bof(dt: u16) -> [u8; 16] {
    let mut out = [0u8; 16];
    out[0..2].copy_from_slice(&0x0600u16.to_le_bytes());
    out[2..4].copy_from_slice(&dt.to_le_bytes());
    out[4..6].copy_from_slice(&0x0DBBu16.to_le_bytes());
    out[6..8].copy_from_slice(&0x07CCu16.to_le_bytes());
    out
}

fn xf_record(font: u16, fmt: u16, style: u16) -> [u8; 20] {
    let mut out = [0u8; 20];
    out[0..2].copy_from_slice(&font.to_le_bytes());
    out[2..4].copy_from_slice(&fmt.to_le_bytes());
    out[4..6].copy_from_slice(&style.to_le_bytes());
    out
}

/// Characters of `value` as stored in BIFF8: one byte each when every
/// character fits, UTF-16LE otherwise.
fn encode_characters(value: &str) -> (bool, usize, Vec<u8>) {
    if value.chars().all(|c| (c as u32) <= 0xFF) {
        (false, value.chars().count(), value.chars().map(|c| c as u8).collect())
    } else {
        let units: Vec<u16> = value.encode_utf16().collect();
        let bytes = units.iter().flat_map(|unit| unit.to_le_bytes()).collect();
        (true, units.len(), bytes)
    }
}

fn write_short_unicode_string(out: &mut Vec<u8>, value: &str) {
    let (is_high_byte, count, bytes) = encode_characters(value);
    out.push(count as u8);
    out.push(u8::from(is_high_byte));
    out.extend(bytes);
}

fn write_unicode_string(out: &mut Vec<u8>, value: &str) {
    let (is_high_byte, count, bytes) = encode_characters(value);
    out.extend_from_slice(&(count as u16).to_le_bytes());
    out.push(u8::from(is_high_byte));
    out.extend(bytes);
}

/// SST followed by as many CONTINUE records as the strings need. A string cut
/// at a record boundary resumes behind a fresh option flag byte.
pub fn sst_records(strings: &[String]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut id = RECORD_SST;
    let mut current = Vec::new();
    current.extend_from_slice(&(strings.len() as u32).to_le_bytes());
    current.extend_from_slice(&(strings.len() as u32).to_le_bytes());

    for string in strings {
        let (is_high_byte, count, bytes) = encode_characters(string);
        let flag = u8::from(is_high_byte);
        // Header plus at least one character must fit
        if current.len() + 3 + if is_high_byte { 2 } else { 1 } > MAX_RECORD_DATA {
            push_record(&mut out, id, &current);
            id = RECORD_CONTINUE;
            current.clear();
        }
        current.extend_from_slice(&(count as u16).to_le_bytes());
        current.push(flag);

        let mut rest = bytes.as_slice();
        loop {
            let room = MAX_RECORD_DATA - current.len();
            let mut take = room.min(rest.len());
            if is_high_byte {
                take &= !1;
            }
            current.extend_from_slice(&rest[..take]);
            rest = &rest[take..];
            if rest.is_empty() {
                break;
            }
            push_record(&mut out, id, &current);
            id = RECORD_CONTINUE;
            current.clear();
            current.push(flag);
        }
    }
    push_record(&mut out, id, &current);
    out
}

// ---------------------------------------------------------------------------
// xlsx
// ---------------------------------------------------------------------------

/// Writes the workbook through `rust_xlsxwriter`. Chart sheets and the 1904
/// date system are not written.
pub fn xlsx_bytes(workbook: &Workbook) -> anyhow::Result<Vec<u8>> {
    let mut book = rust_xlsxwriter::Workbook::new();
    let date_format = Format::new().set_num_format(DATE_FORMAT);
    for sheet in &workbook.sheets {
        let worksheet = book.add_worksheet();
        worksheet.set_name(&sheet.name)?;
        for (row, values) in sheet.rows.iter().enumerate() {
            let row = row as u32;
            for (col, value) in values.iter().enumerate() {
                let col = col as u16;
                match value {
                    Value::Blank => {}
                    Value::Text(string) | Value::Label(string) => {
                        worksheet.write_string(row, col, string)?;
                    }
                    Value::Number(number) => {
                        worksheet.write_number(row, col, *number)?;
                    }
                    Value::Date(serial) => {
                        worksheet.write_number_with_format(row, col, *serial, &date_format)?;
                    }
                    Value::Bool(flag) => {
                        worksheet.write_boolean(row, col, *flag)?;
                    }
                    Value::Error(_) | Value::Formula(_) => {
                        anyhow::bail!("the xlsx fixture writer has no {:?} cells", value)
                    }
                }
            }
        }
    }
    Ok(book.save_to_buffer()?)
}

/// Packs hand-written parts into a zip; used for layouts `rust_xlsxwriter`
/// never produces.
pub fn zip_parts(parts: &[(&str, &str)]) -> anyhow::Result<Vec<u8>> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    for (name, content) in parts {
        zip.start_file(*name, options)?;
        zip.write_all(content.as_bytes())?;
    }
    Ok(zip.finish()?.into_inner())
}

pub const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/></Types>"#;

pub fn workbook_xml(sheets: &[(&str, &str)], date1904: bool) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#,
    );
    if date1904 {
        xml.push_str(r#"<workbookPr date1904="1"/>"#);
    }
    xml.push_str("<sheets>");
    for (index, (name, id)) in sheets.iter().enumerate() {
        xml.push_str(&format!(r#"<sheet name="{}" sheetId="{}" r:id="{}"/>"#, name, index + 1, id));
    }
    xml.push_str("</sheets></workbook>");
    xml
}

/// `(id, type, target)` triples, where type is the last segment of the
/// relationship type URI such as `worksheet` or `chartsheet`.
pub fn relationships_xml(relationships: &[(&str, &str, &str)]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    );
    for (id, kind, target) in relationships {
        xml.push_str(&format!(
            r#"<Relationship Id="{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/{}" Target="{}"/>"#,
            id, kind, target
        ));
    }
    xml.push_str("</Relationships>");
    xml
}

pub fn worksheet_xml(rows: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{}</sheetData></worksheet>"#,
        rows
    )
}

/// Styles with `s="1"` formatted as `yyyy-mm-dd`.
pub const STYLES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><numFmts count="1"><numFmt numFmtId="164" formatCode="yyyy\-mm\-dd"/></numFmts><cellXfs count="2"><xf numFmtId="0" fontId="0"/><xf numFmtId="164" fontId="0" applyNumberFormat="1"/></cellXfs></styleSheet>"#;

