//! Windows API bindings for volume access
//!
//! Safe wrappers around CreateFileW / DeviceIoControl for the two change
//! journal requests the enumerator needs.

use crate::error::{enum_data_outcome, EnumError, Result};
use crate::ntfs::device::UsnDevice;
use crate::ntfs::structs::*;
use crate::volume::VolumeId;
use std::ffi::OsStr;
use std::os::windows::ffi::OsStrExt;
use std::ptr;

// CreateFile flags
pub const GENERIC_READ: u32 = 0x80000000;
pub const FILE_SHARE_READ: u32 = 0x00000001;
pub const FILE_SHARE_WRITE: u32 = 0x00000002;
pub const FILE_FLAG_NO_BUFFERING: u32 = 0x20000000;

pub const INVALID_HANDLE_VALUE: isize = -1;

/// Room for `USN_JOURNAL_DATA_V2`; only the V0 prefix is read
const JOURNAL_BUFFER_SIZE: usize = 0x50;

// ============================================================================
// Safe Handle Wrapper
// ============================================================================

/// RAII wrapper for Windows HANDLE
pub struct SafeHandle {
    handle: isize,
}

impl SafeHandle {
    /// Create from raw handle
    pub fn new(handle: isize) -> Option<Self> {
        if handle == INVALID_HANDLE_VALUE || handle == 0 {
            None
        } else {
            Some(Self { handle })
        }
    }

    fn as_handle(&self) -> windows::Win32::Foundation::HANDLE {
        windows::Win32::Foundation::HANDLE(self.handle as *mut std::ffi::c_void)
    }
}

impl Drop for SafeHandle {
    fn drop(&mut self) {
        unsafe {
            let _ = windows::Win32::Foundation::CloseHandle(self.as_handle());
        }
    }
}

// ============================================================================
// Volume Handle
// ============================================================================

/// Open volume device, closed on drop
pub struct VolumeHandle {
    handle: SafeHandle,
    volume: VolumeId,
}

fn wide(path: &str) -> Vec<u16> {
    OsStr::new(path).encode_wide().chain(std::iter::once(0)).collect()
}

/// Ask the volume root which filesystem it carries
fn filesystem_name(volume: &VolumeId) -> Result<String> {
    use windows::core::PCWSTR;
    use windows::Win32::Storage::FileSystem::GetVolumeInformationW;

    let root = wide(volume.root_path());
    let mut fs_name = [0u16; 261];

    let result = unsafe {
        GetVolumeInformationW(
            PCWSTR::from_raw(root.as_ptr()),
            None,
            None,
            None,
            None,
            Some(&mut fs_name),
        )
    };

    if result.is_err() {
        return Err(EnumError::Access(
            volume.to_string(),
            std::io::Error::last_os_error(),
        ));
    }

    let len = fs_name.iter().position(|&c| c == 0).unwrap_or(fs_name.len());
    Ok(String::from_utf16_lossy(&fs_name[..len]))
}

/// Open a volume for raw read access. Only NTFS volumes are accepted.
pub fn open_volume(volume: &VolumeId) -> Result<VolumeHandle> {
    use windows::core::PCWSTR;
    use windows::Win32::Foundation::HANDLE;
    use windows::Win32::Storage::FileSystem::{
        CreateFileW, FILE_FLAGS_AND_ATTRIBUTES, FILE_SHARE_MODE, OPEN_EXISTING,
    };

    let fs_name = filesystem_name(volume)?;
    volume.check_filesystem(&fs_name)?;

    let device_path = wide(volume.device_path());

    let handle = unsafe {
        CreateFileW(
            PCWSTR::from_raw(device_path.as_ptr()),
            GENERIC_READ,
            FILE_SHARE_MODE(FILE_SHARE_READ | FILE_SHARE_WRITE),
            None,
            OPEN_EXISTING,
            FILE_FLAGS_AND_ATTRIBUTES(FILE_FLAG_NO_BUFFERING),
            HANDLE::default(),
        )
    };

    let handle = match handle {
        Ok(h) => SafeHandle::new(h.0 as isize).ok_or_else(|| {
            EnumError::Access(volume.to_string(), std::io::Error::last_os_error())
        })?,
        Err(_) => {
            return Err(EnumError::Access(
                volume.to_string(),
                std::io::Error::last_os_error(),
            ))
        }
    };

    log::debug!("Opened {} ({})", volume.device_path(), fs_name);

    Ok(VolumeHandle {
        handle,
        volume: volume.clone(),
    })
}

// ============================================================================
// IOCTL Operations
// ============================================================================

/// Send a DeviceIoControl request. The raw OS error is handed back so each
/// request can interpret its own codes.
pub fn device_io_control(
    handle: &SafeHandle,
    control_code: u32,
    in_buffer: Option<&[u8]>,
    out_buffer: &mut [u8],
) -> std::io::Result<u32> {
    use windows::Win32::System::IO::DeviceIoControl;

    let mut bytes_returned: u32 = 0;

    let (in_ptr, in_size) = match in_buffer {
        Some(buf) => (buf.as_ptr() as *const std::ffi::c_void, buf.len() as u32),
        None => (ptr::null(), 0),
    };

    let result = unsafe {
        DeviceIoControl(
            handle.as_handle(),
            control_code,
            Some(in_ptr),
            in_size,
            Some(out_buffer.as_mut_ptr() as *mut std::ffi::c_void),
            out_buffer.len() as u32,
            Some(&mut bytes_returned),
            None,
        )
    };

    if result.is_ok() {
        Ok(bytes_returned)
    } else {
        Err(std::io::Error::last_os_error())
    }
}

/// Query USN Journal information
pub fn query_usn_journal(handle: &VolumeHandle) -> Result<UsnJournalData> {
    let mut buffer = [0u8; JOURNAL_BUFFER_SIZE];

    let returned = device_io_control(&handle.handle, FSCTL_QUERY_USN_JOURNAL, None, &mut buffer)
        .map_err(|e| EnumError::from_journal_query(handle.volume.root_label(), e))?;

    UsnJournalData::from_bytes(&buffer[..returned as usize]).ok_or(EnumError::ShortBuffer {
        needed: USN_JOURNAL_DATA_V0_SIZE,
        got: returned as usize,
    })
}

/// One FSCTL_ENUM_USN_DATA round trip. Returns 0 at end of data.
pub fn enum_usn_data(
    handle: &VolumeHandle,
    request: &MftEnumData,
    buffer: &mut [u8],
) -> Result<usize> {
    let input = request.to_bytes();

    match device_io_control(&handle.handle, FSCTL_ENUM_USN_DATA, Some(&input), buffer) {
        Ok(returned) => Ok(returned as usize),
        Err(e) => enum_data_outcome(e),
    }
}

impl UsnDevice for VolumeHandle {
    fn root_label(&self) -> &str {
        self.volume.root_label()
    }

    fn query_journal(&mut self) -> Result<UsnJournalData> {
        query_usn_journal(self)
    }

    fn enum_usn_data(&mut self, request: &MftEnumData, buffer: &mut [u8]) -> Result<usize> {
        enum_usn_data(self, request, buffer)
    }
}
