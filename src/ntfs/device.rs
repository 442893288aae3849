//! The device-control channel the enumerator talks to
//!
//! `VolumeHandle` implements this over DeviceIoControl on Windows. Anything
//! else that speaks the same two requests (a captured dump, a scripted fake)
//! can drive the same decode loop.

use crate::error::Result;
use crate::ntfs::structs::{MftEnumData, UsnJournalData};

pub trait UsnDevice {
    /// Label prefixed to every path resolved from this device, e.g. `C:\`
    fn root_label(&self) -> &str;

    /// FSCTL_QUERY_USN_JOURNAL
    fn query_journal(&mut self) -> Result<UsnJournalData>;

    /// FSCTL_ENUM_USN_DATA
    ///
    /// Fills `buffer` with `[resume cursor][record]*` and returns the number
    /// of valid bytes. Returns 0 once the device reports end of data.
    fn enum_usn_data(&mut self, request: &MftEnumData, buffer: &mut [u8]) -> Result<usize>;
}
