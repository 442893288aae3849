//! USN enumeration stream
//!
//! Walks every entry on the volume with FSCTL_ENUM_USN_DATA. Each request
//! returns one page: an 8-byte resume cursor followed by back-to-back USN
//! records. Pages are decoded lazily, one record per `next()`, and the next
//! request resumes from the cursor of the page just consumed.

use crate::error::{EnumError, Result};
use crate::ntfs::device::UsnDevice;
use crate::ntfs::structs::*;
use byteorder::{ByteOrder, LittleEndian};

/// Default page size handed to the device
pub const DEFAULT_BUFFER_SIZE: usize = 10 * 1024;

/// Smallest page that can still carry a record
pub const MIN_PAGE_SIZE: usize = PAGE_HEADER_SIZE + MIN_RECORD_LENGTH;

/// Counters for one pass over the device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub requests: u64,
    pub records: u64,
    pub bytes_decoded: u64,
}

/// Lazy record iterator over one enumeration run.
///
/// Yields `Err` at most once: any device failure or malformed record ends
/// the stream, and nothing after the failure is decoded.
pub struct RecordStream<'d, D: UsnDevice + ?Sized> {
    device: &'d mut D,
    request: MftEnumData,
    buffer: Vec<u8>,
    /// Valid bytes in `buffer`
    filled: usize,
    /// Next record offset inside `buffer`
    offset: usize,
    last_page: bool,
    finished: bool,
    stats: StreamStats,
}

impl<'d, D: UsnDevice + ?Sized> RecordStream<'d, D> {
    pub fn new(device: &'d mut D, journal: &UsnJournalData, buffer_size: usize) -> Result<Self> {
        if buffer_size < MIN_PAGE_SIZE || buffer_size > u32::MAX as usize {
            return Err(EnumError::Config(format!(
                "buffer size {} outside {}..={}",
                buffer_size,
                MIN_PAGE_SIZE,
                u32::MAX
            )));
        }

        Ok(Self {
            device,
            request: MftEnumData::bounded_by(journal),
            buffer: vec![0u8; buffer_size],
            filled: 0,
            offset: 0,
            last_page: false,
            finished: false,
            stats: StreamStats::default(),
        })
    }

    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    /// Issue the next request. Returns false once the device has no more data.
    fn fetch(&mut self) -> Result<bool> {
        let bytes_returned = self.device.enum_usn_data(&self.request, &mut self.buffer)?;
        self.stats.requests += 1;

        if bytes_returned > self.buffer.len() {
            return Err(EnumError::ShortBuffer {
                needed: bytes_returned,
                got: self.buffer.len(),
            });
        }

        if bytes_returned < MIN_PAGE_SIZE {
            log::debug!(
                "ENUM_USN_DATA from 0x{:016X} returned {} bytes, end of data",
                self.request.start_file_reference_number,
                bytes_returned
            );
            return Ok(false);
        }

        let next_frn = LittleEndian::read_u64(&self.buffer[0..PAGE_HEADER_SIZE]);
        log::debug!(
            "ENUM_USN_DATA from 0x{:016X}: {} bytes, resume at 0x{:016X}",
            self.request.start_file_reference_number,
            bytes_returned,
            next_frn
        );

        // A cursor that does not move would replay this page forever
        if next_frn == 0 || next_frn == self.request.start_file_reference_number {
            self.last_page = true;
        } else {
            self.request.start_file_reference_number = next_frn;
        }

        self.filled = bytes_returned;
        self.offset = PAGE_HEADER_SIZE;
        Ok(true)
    }

    fn fail(&mut self, error: EnumError) -> Option<Result<RawRecord>> {
        self.finished = true;
        Some(Err(error))
    }
}

impl<D: UsnDevice + ?Sized> Iterator for RecordStream<'_, D> {
    type Item = Result<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            if self.offset < self.filled {
                return match RawRecord::decode(&self.buffer[..self.filled], self.offset) {
                    Ok(record) => {
                        self.offset += record.record_length as usize;
                        self.stats.records += 1;
                        self.stats.bytes_decoded += record.record_length as u64;
                        Some(Ok(record))
                    }
                    Err(e) => self.fail(e),
                };
            }

            if self.last_page {
                self.finished = true;
                return None;
            }

            match self.fetch() {
                Ok(true) => continue,
                Ok(false) => {
                    self.finished = true;
                    return None;
                }
                Err(e) => return self.fail(e),
            }
        }
    }
}

/// Decode one complete page: the resume cursor and every record in it
pub fn decode_page(page: &[u8]) -> Result<(u64, Vec<RawRecord>)> {
    if page.len() < PAGE_HEADER_SIZE {
        return Err(EnumError::ShortBuffer {
            needed: PAGE_HEADER_SIZE,
            got: page.len(),
        });
    }

    let cursor = LittleEndian::read_u64(&page[0..PAGE_HEADER_SIZE]);
    let mut records = Vec::new();
    let mut offset = PAGE_HEADER_SIZE;

    while offset < page.len() {
        let record = RawRecord::decode(page, offset)?;
        offset += record.record_length as usize;
        records.push(record);
    }

    Ok((cursor, records))
}
