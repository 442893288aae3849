//! Error types for mftpath
//!
//! Structural failures (open, journal query, record decoding) end the whole
//! enumeration. Per-entry path resolution failures are not errors; the
//! resolver drops those entries and counts them.

use crate::ntfs::structs::{FSCTL_ENUM_USN_DATA, FSCTL_QUERY_USN_JOURNAL};
use std::io;
use thiserror::Error;

/// `FSCTL_ENUM_USN_DATA` ran past the last entry
pub const ERROR_HANDLE_EOF: i32 = 38;
pub const ERROR_JOURNAL_DELETE_IN_PROGRESS: i32 = 1178;
pub const ERROR_JOURNAL_NOT_ACTIVE: i32 = 1179;

/// Main error type for mftpath operations
#[derive(Error, Debug)]
pub enum EnumError {
    #[error("Volume '{0}' is not an NTFS filesystem")]
    Format(String),

    #[error("Failed to open volume '{0}': {1}")]
    Access(String, io::Error),

    #[error("DeviceIoControl(0x{control_code:08X}) failed: {source}")]
    Device {
        control_code: u32,
        #[source]
        source: io::Error,
    },

    #[error("USN Journal not active on volume '{0}'")]
    JournalNotActive(String),

    #[error("Corrupt USN record at offset {offset}: declared length {length}, {remaining} bytes remaining")]
    CorruptRecord {
        offset: usize,
        length: usize,
        remaining: usize,
    },

    #[error("Unsupported USN record version {major} at offset {offset}")]
    UnsupportedRecordVersion { offset: usize, major: u16 },

    #[error("Buffer too small: needed {needed}, got {got}")]
    ShortBuffer { needed: usize, got: usize },

    #[error("Invalid name pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to write output: {0}")]
    Output(#[source] io::Error),
}

/// Result type alias for mftpath operations
pub type Result<T> = std::result::Result<T, EnumError>;

impl EnumError {
    /// Interpret a failed FSCTL_QUERY_USN_JOURNAL on `volume`
    pub fn from_journal_query(volume: &str, source: io::Error) -> Self {
        match source.raw_os_error() {
            Some(ERROR_JOURNAL_NOT_ACTIVE) | Some(ERROR_JOURNAL_DELETE_IN_PROGRESS) => {
                EnumError::JournalNotActive(volume.to_string())
            }
            _ => EnumError::Device {
                control_code: FSCTL_QUERY_USN_JOURNAL,
                source,
            },
        }
    }

    /// Did the device-control channel fail or hand back an unparseable buffer?
    pub fn is_device_error(&self) -> bool {
        matches!(
            self,
            EnumError::Device { .. }
                | EnumError::JournalNotActive(_)
                | EnumError::CorruptRecord { .. }
                | EnumError::UnsupportedRecordVersion { .. }
                | EnumError::ShortBuffer { .. }
        )
    }

    /// Errors that come from the volume rather than from caller input
    pub fn is_fatal(&self) -> bool {
        !matches!(self, EnumError::InvalidPattern(_) | EnumError::Config(_))
    }
}

/// Interpret a failed FSCTL_ENUM_USN_DATA. Running off the end of the
/// volume is not a failure; it reads as an empty page.
pub fn enum_data_outcome(source: io::Error) -> Result<usize> {
    match source.raw_os_error() {
        Some(ERROR_HANDLE_EOF) => Ok(0),
        _ => Err(EnumError::Device {
            control_code: FSCTL_ENUM_USN_DATA,
            source,
        }),
    }
}
