//! NTFS change-journal access
//!
//! - `structs`: wire layouts of the journal requests and USN records
//! - `device`: the device-control seam
//! - `usn`: the lazy FSCTL_ENUM_USN_DATA record stream
//! - `winapi`: the real volume device (Windows only)

pub mod device;
pub mod structs;
pub mod usn;
#[cfg(windows)]
pub mod winapi;

// Re-export commonly used types
pub use device::UsnDevice;
pub use structs::{EntryKind, MftEnumData, RawRecord, UsnJournalData};
pub use usn::{decode_page, RecordStream, StreamStats};
#[cfg(windows)]
pub use winapi::{SafeHandle, VolumeHandle};

use crate::error::Result;
use crate::volume::VolumeId;

/// Open a volume device for enumeration
#[cfg(windows)]
pub fn open_volume(volume: &VolumeId) -> Result<VolumeHandle> {
    winapi::open_volume(volume)
}

/// Stand-in for the volume device on hosts without DeviceIoControl.
/// It has no values, so `open_volume` can only fail there.
#[cfg(not(windows))]
pub enum VolumeHandle {}

#[cfg(not(windows))]
impl UsnDevice for VolumeHandle {
    fn root_label(&self) -> &str {
        match *self {}
    }

    fn query_journal(&mut self) -> Result<UsnJournalData> {
        match *self {}
    }

    fn enum_usn_data(&mut self, _request: &MftEnumData, _buffer: &mut [u8]) -> Result<usize> {
        match *self {}
    }
}

#[cfg(not(windows))]
pub fn open_volume(volume: &VolumeId) -> Result<VolumeHandle> {
    log::warn!("Raw volume access is only available on Windows");
    Err(crate::error::EnumError::Access(
        volume.to_string(),
        std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "raw volume access requires Windows",
        ),
    ))
}
