//! Heap-file storage: fixed-width records in slotted pages.
//!
//! A heap file is a header page followed by record pages. Each record page
//! carries a small header, an occupancy bitmap, and a run of fixed-width
//! slots; non-full pages are linked through an intrusive free list whose head
//! lives in the file header. [`RecordFile`] is the mutable handle over one
//! such file; [`RecordScan`] walks its live records exactly once.

pub mod bitmap;
mod file;
mod scan;


pub use file::RecordFile;
pub use scan::RecordScan;

use bincode::config::{self, Config};
use bincode::serde::{decode_from_slice, encode_into_slice};
use common::{DbError, DbResult, PAGE_SIZE};
use serde::{Deserialize, Serialize};
use std::mem::size_of;

const FILE_HEADER_BYTES: usize = size_of::<FileHeader>();
const PAGE_HEADER_BYTES: usize = size_of::<PageHeader>();

fn bincode_config() -> impl Config {
    config::legacy()
}

/// Header persisted on page 0 of every heap file. All fields except
/// `num_pages` and `first_free_page` are fixed at creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHeader {
    pub record_size: u32,
    pub slots_per_page: u32,
    pub bitmap_bytes: u32,
    pub num_pages: u32,
    pub first_free_page: i32,
}

impl FileHeader {
    /// Lay out a fresh file for the given record size, packing as many slots
    /// per page as header + bitmap + slots allow.
    pub fn for_record_size(record_size: usize) -> DbResult<Self> {
        if record_size == 0 {
            return Err(DbError::Internal("record size must be non-zero".into()));
        }
        let usable = PAGE_SIZE - PAGE_HEADER_BYTES;
        let mut slots = usable * 8 / (8 * record_size + 1);
        while slots > 0 && PAGE_HEADER_BYTES + slots.div_ceil(8) + slots * record_size > PAGE_SIZE {
            slots -= 1;
        }
        if slots == 0 {
            return Err(DbError::Internal(format!(
                "record size {record_size} does not fit a {PAGE_SIZE}-byte page"
            )));
        }
        Ok(Self {
            record_size: record_size as u32,
            slots_per_page: slots as u32,
            bitmap_bytes: slots.div_ceil(8) as u32,
            num_pages: 1,
            first_free_page: common::NO_PAGE,
        })
    }

    pub fn decode(page0: &[u8]) -> DbResult<Self> {
        let (header, read) = decode_from_slice(&page0[..FILE_HEADER_BYTES], bincode_config())
            .map_err(|e| DbError::Internal(format!("corrupt file header: {e}")))?;
        debug_assert_eq!(read, FILE_HEADER_BYTES);
        Ok(header)
    }

    pub fn encode_into(&self, page0: &mut [u8]) -> DbResult<()> {
        let written = encode_into_slice(self, &mut page0[..FILE_HEADER_BYTES], bincode_config())
            .map_err(|e| DbError::Internal(format!("encode file header failed: {e}")))?;
        debug_assert_eq!(written, FILE_HEADER_BYTES);
        Ok(())
    }
}

/// Header at the start of every record page.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageHeader {
    /// Next page on the free list. Meaningful only while this page is on the
    /// list; a full page's link must not be walked.
    pub next_free_page: i32,
    pub num_records: u32,
}

/// Byte-level views into a record page: `[header | bitmap | slots]`.
/// Pure offset arithmetic over a pinned page's bytes; no I/O.
#[derive(Clone, Copy, Debug)]
pub struct PageLayout {
    pub record_size: usize,
    pub slots_per_page: usize,
    pub bitmap_bytes: usize,
}

impl From<&FileHeader> for PageLayout {
    fn from(header: &FileHeader) -> Self {
        Self {
            record_size: header.record_size as usize,
            slots_per_page: header.slots_per_page as usize,
            bitmap_bytes: header.bitmap_bytes as usize,
        }
    }
}

impl PageLayout {
    pub fn header(&self, page: &[u8]) -> DbResult<PageHeader> {
        let (header, read) = decode_from_slice(&page[..PAGE_HEADER_BYTES], bincode_config())
            .map_err(|e| DbError::Internal(format!("corrupt page header: {e}")))?;
        debug_assert_eq!(read, PAGE_HEADER_BYTES);
        Ok(header)
    }

    pub fn write_header(&self, page: &mut [u8], header: &PageHeader) -> DbResult<()> {
        let written = encode_into_slice(header, &mut page[..PAGE_HEADER_BYTES], bincode_config())
            .map_err(|e| DbError::Internal(format!("encode page header failed: {e}")))?;
        debug_assert_eq!(written, PAGE_HEADER_BYTES);
        Ok(())
    }

    pub fn bitmap<'a>(&self, page: &'a [u8]) -> &'a [u8] {
        &page[PAGE_HEADER_BYTES..PAGE_HEADER_BYTES + self.bitmap_bytes]
    }

    pub fn bitmap_mut<'a>(&self, page: &'a mut [u8]) -> &'a mut [u8] {
        &mut page[PAGE_HEADER_BYTES..PAGE_HEADER_BYTES + self.bitmap_bytes]
    }

    fn slot_offset(&self, slot: usize) -> usize {
        PAGE_HEADER_BYTES + self.bitmap_bytes + slot * self.record_size
    }

    pub fn slot<'a>(&self, page: &'a [u8], slot: usize) -> &'a [u8] {
        let start = self.slot_offset(slot);
        &page[start..start + self.record_size]
    }

    pub fn slot_mut<'a>(&self, page: &'a mut [u8], slot: usize) -> &'a mut [u8] {
        let start = self.slot_offset(slot);
        &mut page[start..start + self.record_size]
    }
}
