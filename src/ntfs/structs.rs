//! NTFS change-journal wire structures and constants
//!
//! Layouts follow winioctl.h: `USN_JOURNAL_DATA_V0`, `MFT_ENUM_DATA_V0`,
//! `USN_RECORD_V2` and `USN_RECORD_V3`. Everything is little-endian.

use crate::error::{EnumError, Result};
use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use std::io::Cursor;

// ============================================================================
// Constants
// ============================================================================

pub const FSCTL_ENUM_USN_DATA: u32 = 0x000900B3;
pub const FSCTL_QUERY_USN_JOURNAL: u32 = 0x000900F4;

/// Mask selecting the MFT record number from a file reference number
pub const RECORD_NUMBER_MASK: u64 = 0x0000_FFFF_FFFF_FFFF;

/// MFT record number of the volume root directory
pub const ROOT_RECORD_NUMBER: u64 = 5;

/// Size of the resume cursor at the head of every enumeration page
pub const PAGE_HEADER_SIZE: usize = 8;

/// Fixed part of a `USN_RECORD_V2`
pub const USN_RECORD_V2_HEADER: usize = 60;

/// Fixed part of a `USN_RECORD_V3`
pub const USN_RECORD_V3_HEADER: usize = 76;

/// Smallest record the device can return
pub const MIN_RECORD_LENGTH: usize = USN_RECORD_V2_HEADER;

/// Size of `USN_JOURNAL_DATA_V0`
pub const USN_JOURNAL_DATA_V0_SIZE: usize = 0x38;

/// Size of `MFT_ENUM_DATA_V0`
pub const MFT_ENUM_DATA_V0_SIZE: usize = 24;

// ============================================================================
// File Attributes
// ============================================================================

pub mod file_attributes {
    pub const HIDDEN: u32 = 0x00000002;
    pub const SYSTEM: u32 = 0x00000004;
    pub const DIRECTORY: u32 = 0x00000010;
    pub const ARCHIVE: u32 = 0x00000020;
    pub const DEVICE: u32 = 0x00000040;
    pub const REPARSE_POINT: u32 = 0x00000400;
}

/// Extract the MFT record number (lower 48 bits) of a file reference
#[inline]
pub fn record_number(file_reference_number: u64) -> u64 {
    file_reference_number & RECORD_NUMBER_MASK
}

// ============================================================================
// USN Journal Data (from FSCTL_QUERY_USN_JOURNAL)
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct UsnJournalData {
    pub usn_journal_id: u64,
    pub first_usn: u64,
    pub next_usn: u64,
    pub lowest_valid_usn: u64,
    pub max_usn: u64,
    pub maximum_size: u64,
    pub allocation_delta: u64,
}

impl UsnJournalData {
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < USN_JOURNAL_DATA_V0_SIZE {
            return None;
        }

        let mut cursor = Cursor::new(data);

        Some(Self {
            usn_journal_id: cursor.read_u64::<LittleEndian>().ok()?,
            first_usn: cursor.read_u64::<LittleEndian>().ok()?,
            next_usn: cursor.read_u64::<LittleEndian>().ok()?,
            lowest_valid_usn: cursor.read_u64::<LittleEndian>().ok()?,
            max_usn: cursor.read_u64::<LittleEndian>().ok()?,
            maximum_size: cursor.read_u64::<LittleEndian>().ok()?,
            allocation_delta: cursor.read_u64::<LittleEndian>().ok()?,
        })
    }
}

// ============================================================================
// Enumeration request (input of FSCTL_ENUM_USN_DATA)
// ============================================================================

/// `MFT_ENUM_DATA_V0`: resume cursor plus the USN window to enumerate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MftEnumData {
    pub start_file_reference_number: u64,
    pub low_usn: i64,
    pub high_usn: i64,
}

impl MftEnumData {
    /// First request of a run bounded by the journal's `next_usn`
    pub fn bounded_by(journal: &UsnJournalData) -> Self {
        Self {
            start_file_reference_number: 0,
            low_usn: 0,
            high_usn: journal.next_usn as i64,
        }
    }

    pub fn to_bytes(&self) -> [u8; MFT_ENUM_DATA_V0_SIZE] {
        let mut bytes = [0u8; MFT_ENUM_DATA_V0_SIZE];
        LittleEndian::write_u64(&mut bytes[0..8], self.start_file_reference_number);
        LittleEndian::write_i64(&mut bytes[8..16], self.low_usn);
        LittleEndian::write_i64(&mut bytes[16..24], self.high_usn);
        bytes
    }
}

// ============================================================================
// Decoded records
// ============================================================================

/// How an entry takes part in path reconstruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Directory,
    File,
    /// Neither (device entries); never indexed
    Other,
}

impl EntryKind {
    /// Only the directory and device bits matter; reparse points and the
    /// rest of the attribute word do not change the classification.
    pub fn from_attributes(attributes: u32) -> Self {
        if attributes & file_attributes::DIRECTORY != 0 {
            EntryKind::Directory
        } else if attributes & file_attributes::DEVICE != 0 {
            EntryKind::Other
        } else {
            EntryKind::File
        }
    }
}

/// Projection of one USN record returned by FSCTL_ENUM_USN_DATA
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub file_reference_number: u64,
    pub parent_file_reference_number: u64,
    pub name: String,
    pub attributes: u32,
    pub kind: EntryKind,
    pub record_length: u32,
}

impl RawRecord {
    /// Build a directory record (index seeding and tests)
    pub fn directory(file_reference_number: u64, parent: u64, name: impl Into<String>) -> Self {
        Self::with_attributes(file_reference_number, parent, name, file_attributes::DIRECTORY)
    }

    /// Build a regular file record
    pub fn file(file_reference_number: u64, parent: u64, name: impl Into<String>) -> Self {
        Self::with_attributes(file_reference_number, parent, name, file_attributes::ARCHIVE)
    }

    pub fn with_attributes(
        file_reference_number: u64,
        parent: u64,
        name: impl Into<String>,
        attributes: u32,
    ) -> Self {
        Self {
            file_reference_number,
            parent_file_reference_number: parent,
            name: name.into(),
            attributes,
            kind: EntryKind::from_attributes(attributes),
            record_length: 0,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn record_number(&self) -> u64 {
        record_number(self.file_reference_number)
    }

    pub fn parent_record_number(&self) -> u64 {
        record_number(self.parent_file_reference_number)
    }

    /// Decode the USN record starting at `offset` in `page`.
    ///
    /// `page` must end at the last valid byte the device returned, so the
    /// declared record length is checked against the real remaining budget.
    pub fn decode(page: &[u8], offset: usize) -> Result<Self> {
        let remaining = page.len().saturating_sub(offset);
        let corrupt = |length: usize| EnumError::CorruptRecord {
            offset,
            length,
            remaining,
        };

        if remaining < 8 {
            return Err(corrupt(0));
        }

        let data = &page[offset..];
        let record_length = LittleEndian::read_u32(&data[0..4]) as usize;
        let major_version = LittleEndian::read_u16(&data[4..6]);

        if record_length == 0 || record_length > remaining {
            return Err(corrupt(record_length));
        }

        let header = match major_version {
            2 => USN_RECORD_V2_HEADER,
            3 => USN_RECORD_V3_HEADER,
            major => {
                return Err(EnumError::UnsupportedRecordVersion { offset, major });
            }
        };
        if record_length < header {
            return Err(corrupt(record_length));
        }

        let record = &data[..record_length];

        // V3 carries 128-bit references; the low 64 bits hold the NTFS FRN
        let (file_ref, parent_ref, attributes, name_length, name_offset) = if major_version == 3 {
            (
                LittleEndian::read_u64(&record[8..16]),
                LittleEndian::read_u64(&record[24..32]),
                LittleEndian::read_u32(&record[68..72]),
                LittleEndian::read_u16(&record[72..74]),
                LittleEndian::read_u16(&record[74..76]),
            )
        } else {
            (
                LittleEndian::read_u64(&record[8..16]),
                LittleEndian::read_u64(&record[16..24]),
                LittleEndian::read_u32(&record[52..56]),
                LittleEndian::read_u16(&record[56..58]),
                LittleEndian::read_u16(&record[58..60]),
            )
        };

        let name_start = name_offset as usize;
        let name_end = name_start + name_length as usize;
        if name_start < header || name_end > record_length || name_length % 2 != 0 {
            return Err(corrupt(record_length));
        }

        let name_u16: Vec<u16> = record[name_start..name_end]
            .chunks_exact(2)
            .map(|chunk| u16::from_le_bytes([chunk[0], chunk[1]]))
            .collect();

        Ok(Self {
            file_reference_number: file_ref,
            parent_file_reference_number: parent_ref,
            name: String::from_utf16_lossy(&name_u16),
            attributes,
            kind: EntryKind::from_attributes(attributes),
            record_length: record_length as u32,
        })
    }
}
