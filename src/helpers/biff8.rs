//! Microsoft Office Binary Interchange File Format (BIFF8)
//! Record reader for the `Workbook` stream of Excel 97-2003 (.xls) files.
//! A record's payload may continue in following CONTINUE records; reads walk those chunks transparently.

use crate::error::LoadError;
use crate::helpers::string::to_f64;
use crate::helpers::string::to_u16;
use crate::helpers::string::to_u32;
use crate::helpers::string::to_u64;
use crate::helpers::string::to_usize;
use encoding_rs::Encoding;
use encoding_rs::UTF_16LE;
use std::borrow::Cow;
use thiserror::Error;

const CONTINUE: u16 = 60;

/// Errors specific to BIFF8 format parsing
#[derive(Error, Debug)]
pub enum Biff8Error {
    #[error("Fewer than {0} bytes remaining")]
    NoEnoughDataError(usize),

    #[error("Record at offset {0} runs past the end of the stream")]
    TruncatedRecordError(usize),
}

/// Reader for BIFF8 (Excel 97-2003) records
pub(crate) struct Biff8Reader {
    /// Code page of compressed 8-bit strings; UTF-16LE (code page 1200) means plain Latin-1 bytes
    pub(crate) encoding: &'static Encoding,
    buffer: Vec<u8>,
    pointer: usize, // Next record position in buffer
    chunks: Vec<(usize, usize)>, // Current record chunks (start, end)
    index: usize,  // Current chunk index
    offset: usize, // Offset within current chunk
}

impl Biff8Reader {
    pub(crate) fn new(data: Vec<u8>) -> Biff8Reader {
        Biff8Reader {
            encoding: UTF_16LE,
            buffer: data,
            pointer: 0,
            chunks: Vec::new(),
            index: 0,
            offset: 0,
        }
    }

    /// Moves to the next record and returns its type, or None at the end of the stream.
    pub(crate) fn next(&mut self) -> Result<Option<u16>, LoadError> {
        if self.pointer + 4 <= self.buffer.len() {
            self.index = 0;
            self.offset = 0;

            let kind = self.get_u16_at(self.pointer)?;
            self.chunks.clear();
            self.push_chunk()?;
            while self.pointer + 4 <= self.buffer.len() && self.get_u16_at(self.pointer)? == CONTINUE {
                self.push_chunk()?;
            }

            Ok(Some(kind))
        } else {
            Ok(None)
        }
    }

    /// Registers the payload behind the record header at `pointer` and advances past it.
    fn push_chunk(&mut self) -> Result<(), LoadError> {
        let size = self.get_u16_at(self.pointer + 2)? as usize;
        let lower = self.pointer + 4;
        let upper = lower + size;
        if upper > self.buffer.len() {
            Err(Biff8Error::TruncatedRecordError(self.pointer))?
        }
        self.pointer = upper;
        self.chunks.push((lower, upper));
        Ok(())
    }

    /// Positions the reader at an absolute stream offset (a sheet's BOF).
    pub(crate) fn goto(&mut self, pointer: usize) {
        self.pointer = pointer;
        self.chunks.clear();
        self.index = 0;
        self.offset = 0;
    }

    /// Bytes left in the current chunk, stepping over chunks that are already consumed.
    fn remaining_in_chunk(&mut self) -> usize {
        while let Some((lower, upper)) = self.chunks.get(self.index).copied() {
            if lower + self.offset < upper {
                return upper - lower - self.offset;
            }
            self.index += 1;
            self.offset = 0;
        }
        0
    }

    /// Reads up to `length` bytes, never crossing into the next chunk.
    fn read(&mut self, length: usize) -> &[u8] {
        let available = self.remaining_in_chunk();
        match self.chunks.get(self.index).copied() {
            Some((lower, _)) => {
                let source = lower + self.offset;
                let size = available.min(length);
                self.offset += size;
                &self.buffer[source..source + size]
            }
            None => &[],
        }
    }

    /// Reads exactly `length` bytes, crossing CONTINUE boundaries when needed.
    fn read_exact(&mut self, length: usize) -> Result<Cow<'_, [u8]>, LoadError> {
        if self.remaining_in_chunk() >= length {
            return Ok(Cow::Borrowed(self.read(length)));
        }

        let mut bytes = Vec::with_capacity(length);
        while bytes.len() < length {
            let data = self.read(length - bytes.len());
            if data.is_empty() {
                Err(Biff8Error::NoEnoughDataError(length))?
            }
            bytes.extend_from_slice(data);
        }
        Ok(Cow::Owned(bytes))
    }

    pub(crate) fn skip(&mut self, length: usize) -> Result<(), LoadError> {
        self.read_exact(length).map(|_| ())
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, LoadError> {
        self.read_exact(1).map(|data| data[0])
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, LoadError> {
        self.read_exact(2).map(|data| to_u16(&data))
    }

    /// Reads a u16 counted back from the end of the current record (MULRK keeps its last column there).
    pub(crate) fn get_u16_back(&self, offset: usize) -> Result<u16, LoadError> {
        let mut offset = offset;
        for (lower, upper) in self.chunks.iter().rev() {
            if *lower + offset <= *upper {
                return self.get_u16_at(*upper - offset);
            } else {
                offset -= *upper - *lower;
            }
        }
        Err(Biff8Error::NoEnoughDataError(2))?
    }

    fn get_u16_at(&self, index: usize) -> Result<u16, LoadError> {
        if index + 2 <= self.buffer.len() {
            Ok(to_u16(&self.buffer[index..index + 2]))
        } else {
            Err(Biff8Error::NoEnoughDataError(2))?
        }
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, LoadError> {
        self.read_exact(4).map(|data| to_u32(&data))
    }

    pub(crate) fn read_usize(&mut self) -> Result<usize, LoadError> {
        self.read_exact(4).map(|data| to_usize(&data))
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64, LoadError> {
        self.read_exact(8).map(|data| to_u64(&data))
    }

    pub(crate) fn read_f64(&mut self) -> Result<f64, LoadError> {
        self.read_exact(8).map(|data| to_f64(&data))
    }

    pub(crate) fn read_rk_number(&mut self) -> Result<f64, LoadError> {
        Ok(decode_rk(self.read_u32()?))
    }

    /// ShortXLUnicodeString (1-byte character count), used for sheet names.
    pub(crate) fn read_short_xl_unicode_string(&mut self) -> Result<String, LoadError> {
        let chars = self.read_u8()? as usize;
        self.read_characters(chars, false)
    }

    /// XLUnicodeString (2-byte character count), used by LABEL, STRING and FORMAT.
    pub(crate) fn read_xl_unicode_string(&mut self) -> Result<String, LoadError> {
        let chars = self.read_u16()? as usize;
        self.read_characters(chars, false)
    }

    /// XLUnicodeRichExtendedString, the SST entry format.
    pub(crate) fn read_xl_unicode_rich_extended_string(&mut self) -> Result<String, LoadError> {
        let chars = self.read_u16()? as usize;
        self.read_characters(chars, true)
    }

    /// Reads the flag byte, optional run/phonetic sizes, then `chars` characters.
    /// Characters that spill into a CONTINUE record resume behind a fresh flag byte.
    fn read_characters(&mut self, chars: usize, is_extend: bool) -> Result<String, LoadError> {
        let flag = self.read_u8()?;
        let mut is_high_byte = (flag & 0x1) > 0;
        let rich_string_count = if is_extend && (flag & 0x8) > 0 {
            self.read_u16()? as usize
        } else {
            0
        };
        let phonetic_size = if is_extend && (flag & 0x4) > 0 {
            self.read_usize()?
        } else {
            0
        };

        let mut content = String::with_capacity(chars);
        let mut remaining = chars;
        loop {
            remaining -= self.read_chars_into(remaining, is_high_byte, &mut content);
            if remaining == 0 {
                break;
            }
            if self.remaining_in_chunk() > 0 {
                Err(Biff8Error::NoEnoughDataError(remaining))? // odd byte left in a UTF-16 run
            }
            is_high_byte = (self.read_u8()? & 0x1) > 0;
        }

        // Skip rgRun
        self.skip(4 * rich_string_count)?;
        // Skip ExtRst
        self.skip(phonetic_size)?;
        Ok(content)
    }

    /// Decodes as many of `chars` characters as the current chunk holds and returns that count.
    fn read_chars_into(&mut self, chars: usize, is_high_byte: bool, content: &mut String) -> usize {
        let encoding = self.encoding;
        let available = self.remaining_in_chunk();
        let wanted = chars_to_bytes(is_high_byte, chars);
        let length = if is_high_byte { available.min(wanted) & !1 } else { available.min(wanted) };
        let bytes = self.read(length);
        if is_high_byte {
            let (string, _, _) = UTF_16LE.decode(bytes);
            content.push_str(&string);
        } else if encoding == UTF_16LE {
            // Compressed UTF-16: every byte is the low half of a code unit
            content.extend(bytes.iter().map(|byte| char::from(*byte)));
        } else {
            let (string, _, _) = encoding.decode(bytes);
            content.push_str(&string);
        }
        bytes_to_chars(is_high_byte, length)
    }
}

/// Decodes an RK number: a 30-bit integer or the high 30 bits of an f64, optionally scaled by 1/100.
pub(crate) fn decode_rk(value: u32) -> f64 {
    let is_percentage = (value & 0x01) != 0;
    let is_integer = (value & 0x02) != 0;

    let value = if is_integer {
        ((value as i32) >> 2) as f64
    } else {
        f64::from_bits(((value & 0xFFFF_FFFC) as u64) << 32)
    };
    if is_percentage {
        value / 100.0
    } else {
        value
    }
}

#[inline]
fn chars_to_bytes(is_high_byte: bool, chars: usize) -> usize {
    if is_high_byte { chars << 1 } else { chars }
}

#[inline]
fn bytes_to_chars(is_high_byte: bool, bytes: usize) -> usize {
    if is_high_byte { bytes >> 1 } else { bytes }
}

#[macro_export]
macro_rules! match_biff8_record {
    ($reader:expr => { $($arms:tt)* }) => {
        while let Some(kind) = $reader.next()? {
            match kind {
                $($arms)*
                _ => (),
            }
        }
    };
}
