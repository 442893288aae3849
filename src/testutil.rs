//! Record encoders and a scripted device for unit tests

use crate::error::{EnumError, Result};
use crate::ntfs::device::UsnDevice;
use crate::ntfs::structs::*;
use byteorder::{ByteOrder, LittleEndian};
use std::collections::VecDeque;

fn padded(len: usize) -> usize {
    (len + 7) & !7
}

fn utf16(name: &str) -> Vec<u8> {
    name.encode_utf16().flat_map(|unit| unit.to_le_bytes()).collect()
}

/// Encode a `USN_RECORD_V2` padded to an 8-byte boundary
pub(crate) fn encode_record(frn: u64, parent: u64, attributes: u32, name: &str) -> Vec<u8> {
    let name_bytes = utf16(name);
    let len = padded(USN_RECORD_V2_HEADER + name_bytes.len());
    let mut buf = vec![0u8; len];

    LittleEndian::write_u32(&mut buf[0..4], len as u32);
    LittleEndian::write_u16(&mut buf[4..6], 2);
    LittleEndian::write_u64(&mut buf[8..16], frn);
    LittleEndian::write_u64(&mut buf[16..24], parent);
    LittleEndian::write_u32(&mut buf[52..56], attributes);
    LittleEndian::write_u16(&mut buf[56..58], name_bytes.len() as u16);
    LittleEndian::write_u16(&mut buf[58..60], USN_RECORD_V2_HEADER as u16);
    buf[USN_RECORD_V2_HEADER..USN_RECORD_V2_HEADER + name_bytes.len()].copy_from_slice(&name_bytes);
    buf
}

/// Encode a `USN_RECORD_V3`; the high halves of both references stay zero
pub(crate) fn encode_record_v3(frn: u64, parent: u64, attributes: u32, name: &str) -> Vec<u8> {
    let name_bytes = utf16(name);
    let len = padded(USN_RECORD_V3_HEADER + name_bytes.len());
    let mut buf = vec![0u8; len];

    LittleEndian::write_u32(&mut buf[0..4], len as u32);
    LittleEndian::write_u16(&mut buf[4..6], 3);
    LittleEndian::write_u64(&mut buf[8..16], frn);
    LittleEndian::write_u64(&mut buf[24..32], parent);
    LittleEndian::write_u32(&mut buf[68..72], attributes);
    LittleEndian::write_u16(&mut buf[72..74], name_bytes.len() as u16);
    LittleEndian::write_u16(&mut buf[74..76], USN_RECORD_V3_HEADER as u16);
    buf[USN_RECORD_V3_HEADER..USN_RECORD_V3_HEADER + name_bytes.len()].copy_from_slice(&name_bytes);
    buf
}

/// `[resume cursor][records...]`
pub(crate) fn encode_page(cursor: u64, records: &[Vec<u8>]) -> Vec<u8> {
    let mut page = cursor.to_le_bytes().to_vec();
    for record in records {
        page.extend_from_slice(record);
    }
    page
}

pub(crate) fn dir(frn: u64, parent: u64, name: &str) -> Vec<u8> {
    encode_record(frn, parent, file_attributes::DIRECTORY, name)
}

pub(crate) fn file(frn: u64, parent: u64, name: &str) -> Vec<u8> {
    encode_record(frn, parent, file_attributes::ARCHIVE, name)
}

pub(crate) enum Step {
    Page(Vec<u8>),
    Fail(i32),
}

/// Replays scripted enumeration responses and records every request
pub(crate) struct ScriptedDevice {
    label: String,
    journal: UsnJournalData,
    steps: VecDeque<Step>,
    pub(crate) requests: Vec<MftEnumData>,
}

impl ScriptedDevice {
    pub(crate) fn new(label: &str, next_usn: u64) -> Self {
        Self {
            label: label.to_string(),
            journal: UsnJournalData {
                usn_journal_id: 0xABCD,
                next_usn,
                ..Default::default()
            },
            steps: VecDeque::new(),
            requests: Vec::new(),
        }
    }

    pub(crate) fn page(mut self, page: Vec<u8>) -> Self {
        self.steps.push_back(Step::Page(page));
        self
    }

    pub(crate) fn fail(mut self, os_error: i32) -> Self {
        self.steps.push_back(Step::Fail(os_error));
        self
    }
}

impl UsnDevice for ScriptedDevice {
    fn root_label(&self) -> &str {
        &self.label
    }

    fn query_journal(&mut self) -> Result<UsnJournalData> {
        Ok(self.journal.clone())
    }

    fn enum_usn_data(&mut self, request: &MftEnumData, buffer: &mut [u8]) -> Result<usize> {
        self.requests.push(*request);
        match self.steps.pop_front() {
            None => Ok(0),
            Some(Step::Fail(code)) => Err(EnumError::Device {
                control_code: FSCTL_ENUM_USN_DATA,
                source: std::io::Error::from_raw_os_error(code),
            }),
            Some(Step::Page(page)) => {
                if page.len() > buffer.len() {
                    return Err(EnumError::ShortBuffer {
                        needed: page.len(),
                        got: buffer.len(),
                    });
                }
                buffer[..page.len()].copy_from_slice(&page);
                Ok(page.len())
            }
        }
    }
}
