//! OLE Compound File Binary (CFB) reader for legacy Excel (.xls) workbooks.
//! Loads the whole container, then serves named streams from the regular or mini sector chains.

use crate::error::LoadError;
use crate::helpers::string::to_u16;
use crate::helpers::string::to_u64;
use crate::helpers::string::to_usize;
use crate::helpers::string::to_usize_iter;
use encoding_rs::UTF_16LE;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use thiserror::Error;

/// Compound file signature (`D0 CF 11 E0 A1 B1 1A E1`).
pub(crate) const SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

// Sector ids at or above this value are markers (DIFSECT, FATSECT, ENDOFCHAIN, FREESECT)
const MAX_REG_SECT: usize = 0xFFFFFFFB;
const END_OF_CHAIN: usize = 0xFFFFFFFE;

const HEADER_SIZE: usize = 512;
const MINI_SECTOR_SIZE: usize = 64;
const DIRECTORY_ENTRY_SIZE: usize = 128;

// Directory entry object types
const UNUSED_ENTRY: u8 = 0;
const ROOT_ENTRY: u8 = 5;

/// Errors specific to Compound File Binary format parsing
#[derive(Error, Debug)]
pub enum CfbError {
    #[error("The file is corrupted or has an invalid CFB structure")]
    FileFormatError,

    #[error("Invalid OLE signature (not an office document?)")]
    OleSignatureError,

    #[error("Invalid Sector size '2 ^ {1}' for major version '{0}'")]
    SectorSizeError(u16, u16),

    #[error("The number of double indirect file allocation table error: expect '{0}', actual '{1}'")]
    DoubleIndirectFileAllocationTableError(usize, usize),

    #[error("The number of file allocation table error: expect '{0}', actual '{1}'")]
    FileAllocationTableError(usize, usize),

    #[error("Sector '{0}' is outside of the file")]
    SectorOutOfRangeError(usize),

    #[error("Sector chain starting at '{0}' never ends")]
    SectorChainLoopError(usize),

    #[error("Empty Root directory")]
    RootDirectoryError,
}

/// A parsed compound file: directory entries plus both allocation tables and their sectors.
pub(crate) struct Cfb {
    directories: Vec<(String, Directory)>,
    file_allocation_table: Vec<usize>,
    sectors: Sectors,
    mini_file_allocation_table: Vec<usize>,
    mini_sectors: Sectors,
    mini_stream_cutoff: usize,
}

impl Cfb {
    /// Reads the whole container into memory and parses its tables.
    pub(crate) fn new<RS: Read + Seek>(reader: &mut RS) -> Result<Cfb, LoadError> {
        let size = reader.seek(SeekFrom::End(0))? as usize;
        if size < HEADER_SIZE {
            Err(CfbError::FileFormatError)?;
        }
        reader.seek(SeekFrom::Start(0))?;
        let mut data: Vec<u8> = vec![0u8; size];
        reader.read_exact(&mut data)?;

        let header = Header::new(&data[..HEADER_SIZE])?;
        let sector_size = header.sector_size()?;
        // The header occupies the first sector slot in both versions
        let sectors = Sectors { data, size: sector_size, offset: sector_size };
        let file_allocation_table = Self::load_file_allocation_table(&sectors, &header)?;
        let directories = Self::load_directories(&file_allocation_table, &sectors, &header)?;
        let mini_file_allocation_table = Self::load_mini_file_allocation_table(&file_allocation_table, &sectors, &header)?;
        let mini_sectors = match directories.iter().find(|(_, directory)| directory.kind == ROOT_ENTRY) {
            Some((_, root)) => Self::load_mini_sectors(&file_allocation_table, &sectors, root)?,
            None => Sectors { data: Vec::new(), size: MINI_SECTOR_SIZE, offset: 0 },
        };

        Ok(Cfb {
            directories,
            file_allocation_table,
            sectors,
            mini_file_allocation_table,
            mini_sectors,
            mini_stream_cutoff: header.mini_stream_cutoff,
        })
    }

    /// Checks whether a stream exists (names compare case-insensitively, as in the format).
    pub(crate) fn exists(&self, name: &str) -> bool {
        self.directory(name).is_some()
    }

    /// Reads a stream's contents, or `None` when no entry has that name.
    pub(crate) fn read(&self, name: &str) -> Result<Option<Vec<u8>>, LoadError> {
        if let Some(directory) = self.directory(name) {
            let mut bytes = if directory.count < self.mini_stream_cutoff {
                Self::read_bytes(&self.mini_file_allocation_table, &self.mini_sectors, directory.index)?
            } else {
                Self::read_bytes(&self.file_allocation_table, &self.sectors, directory.index)?
            };
            bytes.truncate(directory.count);
            Ok(Some(bytes))
        } else {
            Ok(None)
        }
    }

    fn directory(&self, name: &str) -> Option<&Directory> {
        self.directories
            .iter()
            .find(|(entry, directory)| directory.kind != ROOT_ENTRY && entry.eq_ignore_ascii_case(name))
            .map(|(_, directory)| directory)
    }

    /// Collects the FAT sector ids from the header DIFAT and any DIFAT sectors, then loads the FAT.
    fn load_file_allocation_table(sectors: &Sectors, header: &Header) -> Result<Vec<usize>, LoadError> {
        let mut double_indirect_file_allocation_table = Vec::<usize>::new();
        double_indirect_file_allocation_table.extend(to_usize_iter(&sectors.data[76..HEADER_SIZE]));

        let mut count = 0usize;
        let mut index = header.double_indirect_file_allocation_table_shift;
        while index < MAX_REG_SECT {
            if count > header.double_indirect_file_allocation_table_count {
                Err(CfbError::SectorChainLoopError(header.double_indirect_file_allocation_table_shift))?
            }
            double_indirect_file_allocation_table.extend(to_usize_iter(sectors.get(index)?));
            // The last id of every DIFAT sector points at the next one
            index = double_indirect_file_allocation_table.pop().unwrap_or(END_OF_CHAIN);
            count += 1;
        }
        if count != header.double_indirect_file_allocation_table_count {
            Err(CfbError::DoubleIndirectFileAllocationTableError(header.double_indirect_file_allocation_table_count, count))?
        }

        let mut file_allocation_table: Vec<usize> = Vec::new();
        let mut count = 0usize;
        for index in double_indirect_file_allocation_table {
            if index < MAX_REG_SECT {
                file_allocation_table.extend(to_usize_iter(sectors.get(index)?));
                count += 1;
            }
        }
        if count != header.file_allocation_table_count {
            Err(CfbError::FileAllocationTableError(header.file_allocation_table_count, count))?
        }

        Ok(file_allocation_table)
    }

    fn load_directories(file_allocation_table: &[usize], sectors: &Sectors, header: &Header) -> Result<Vec<(String, Directory)>, LoadError> {
        let bytes = Self::read_bytes(file_allocation_table, sectors, header.directory_shift)?;
        let directories: Vec<(String, Directory)> = bytes
            .chunks_exact(DIRECTORY_ENTRY_SIZE)
            .map(|entry| Directory::new(entry, header.major_version))
            .filter(|(_, directory)| directory.kind != UNUSED_ENTRY)
            .collect();
        if directories.is_empty() {
            Err(CfbError::RootDirectoryError)?
        }
        Ok(directories)
    }

    fn load_mini_file_allocation_table(file_allocation_table: &[usize], sectors: &Sectors, header: &Header) -> Result<Vec<usize>, LoadError> {
        Ok(if header.mini_file_allocation_table_sector_count > 0 {
            let bytes = Self::read_bytes(file_allocation_table, sectors, header.mini_file_allocation_table_sector_shift)?;
            to_usize_iter(&bytes).collect()
        } else {
            Vec::new()
        })
    }

    /// The mini stream lives in the regular sectors starting at the root entry.
    fn load_mini_sectors(file_allocation_table: &[usize], sectors: &Sectors, root: &Directory) -> Result<Sectors, LoadError> {
        let mut data = Self::read_bytes(file_allocation_table, sectors, root.index)?;
        data.truncate(root.count);
        Ok(Sectors { data, size: MINI_SECTOR_SIZE, offset: 0 })
    }

    /// Follows an allocation chain from `index` and concatenates its sectors.
    fn read_bytes(file_allocation_table: &[usize], sectors: &Sectors, index: usize) -> Result<Vec<u8>, LoadError> {
        let start = index;
        let mut content: Vec<u8> = Vec::new();
        let mut index = index;
        let mut steps = 0usize;
        while index < MAX_REG_SECT {
            if steps > file_allocation_table.len() {
                Err(CfbError::SectorChainLoopError(start))?
            }
            content.extend_from_slice(sectors.get(index)?);
            index = *file_allocation_table
                .get(index)
                .ok_or(CfbError::SectorOutOfRangeError(index))?;
            steps += 1;
        }
        Ok(content)
    }
}

/// Raw sector storage; sector `i` starts at `offset + i * size`.
#[derive(Debug)]
struct Sectors {
    data: Vec<u8>,
    size: usize,
    offset: usize,
}

impl Sectors {
    fn get(&self, index: usize) -> Result<&[u8], CfbError> {
        let source = index
            .checked_mul(self.size)
            .and_then(|position| position.checked_add(self.offset))
            .filter(|source| *source < self.data.len())
            .ok_or(CfbError::SectorOutOfRangeError(index))?;
        let target = self.data.len().min(source + self.size);
        Ok(&self.data[source..target])
    }
}

#[derive(Debug)]
struct Header {
    major_version: u16,
    sector_shift: u16,
    file_allocation_table_count: usize,
    directory_shift: usize,
    mini_stream_cutoff: usize,
    mini_file_allocation_table_sector_shift: usize,
    mini_file_allocation_table_sector_count: usize,
    double_indirect_file_allocation_table_shift: usize,
    double_indirect_file_allocation_table_count: usize,
}

impl Header {
    /// Parses the fixed 512-byte header.
    fn new(data: &[u8]) -> Result<Self, LoadError> {
        if data[0..8] != SIGNATURE {
            Err(CfbError::OleSignatureError)?;
        }

        Ok(Header {
            major_version: to_u16(&data[26..28]),
            sector_shift: to_u16(&data[30..32]),
            file_allocation_table_count: to_usize(&data[44..48]),
            directory_shift: to_usize(&data[48..52]),
            mini_stream_cutoff: to_usize(&data[56..60]),
            mini_file_allocation_table_sector_shift: to_usize(&data[60..64]),
            mini_file_allocation_table_sector_count: to_usize(&data[64..68]),
            double_indirect_file_allocation_table_shift: to_usize(&data[68..72]),
            double_indirect_file_allocation_table_count: to_usize(&data[72..76]),
        })
    }

    fn sector_size(&self) -> Result<usize, LoadError> {
        if self.major_version == 3 && self.sector_shift == 0x0009 {
            Ok(512) // 2 ^ 9
        } else if self.major_version == 4 && self.sector_shift == 0x000C {
            // Version 4 pads the 512-byte header with zeroes up to a full sector
            Ok(4096) // 2 ^ 12
        } else {
            Err(CfbError::SectorSizeError(self.major_version, self.sector_shift))?
        }
    }
}

#[derive(Debug)]
struct Directory {
    kind: u8,
    index: usize,
    count: usize,
}

impl Directory {
    fn new(bytes: &[u8], major_version: u16) -> (String, Directory) {
        let size = (to_u16(&bytes[64..66]) as usize).min(64);
        let (name, _, _) = UTF_16LE.decode(&bytes[..size]);
        let name = match name.find('\0') {
            Some(position) => name[..position].to_owned(),
            None => name.to_string(),
        };

        let kind = bytes[66];
        let index = to_usize(&bytes[116..120]);
        let count = to_u64(&bytes[120..128]);
        // Version 3 writers may leave garbage in the high half of the size
        let count = if major_version == 3 { count & 0xFFFF_FFFF } else { count } as usize;
        (name, Directory { kind, index, count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn rejects_short_input() {
        let mut reader = Cursor::new(vec![0u8; 100]);
        let error = Cfb::new(&mut reader).err().unwrap();
        assert!(matches!(error, LoadError::CfbHelperError(CfbError::FileFormatError)));
    }

    #[test]
    fn rejects_wrong_signature() {
        let mut data = vec![0u8; 1024];
        data[..4].copy_from_slice(b"PK\x03\x04");
        let error = Cfb::new(&mut Cursor::new(data)).err().unwrap();
        assert!(matches!(error, LoadError::CfbHelperError(CfbError::OleSignatureError)));
    }

    #[test]
    fn sector_offsets() {
        let sectors = Sectors { data: (0..=255u8).collect(), size: 64, offset: 64 };
        assert_eq!(sectors.get(0).unwrap()[0], 64);
        assert_eq!(sectors.get(2).unwrap().len(), 64);
        assert!(sectors.get(3).is_err());
    }
}
