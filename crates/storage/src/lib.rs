//! Fixed-size slotted pages.
//!
//! A page is a 16 KiB byte array. The header grows from the head, the
//! tuples from the tail:
//!
//! ```text
//! | page_id:u32 | tuple_count:u16 | slot 1 | slot 2 | ... | slot N |
//! |                    ... free space ...                          |
//! |                       | tuple N | ... | tuple 2     | tuple 1 |
//! ```
//!
//! Each slot is `{offset:u16, length:u16}`; slot `i` describes tuple
//! `i` in insertion order, so the highest-numbered slot has the
//! smallest offset. All header fields are big-endian. The 16 KiB array
//! itself is the disk and wire form, with no extra framing.


use std::io::Read;

use common::{DbError, DbResult, DiskRead, DiskWrite, PageId};
use tuple::Tuple;

pub const PAGE_SIZE: usize = 16 * 1024;

const HEADER_BASE_BYTES: usize = 6;
const SLOT_BYTES: usize = 4;

/// Largest tuple encoding an empty page can accept, leaving room for
/// the base header and the tuple's slot.
pub const MAX_TUPLE_BYTES: usize = PAGE_SIZE - HEADER_BASE_BYTES - SLOT_BYTES;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Slot {
    offset: u16,
    length: u16,
}

struct PageHeader {
    id: PageId,
    slots: Vec<Slot>,
}

impl PageHeader {
    fn end(&self) -> usize {
        HEADER_BASE_BYTES + self.slots.len() * SLOT_BYTES
    }

    /// Start of the occupied tuple region; `PAGE_SIZE` when empty.
    fn smallest_offset(&self) -> usize {
        self.slots
            .last()
            .map(|s| usize::from(s.offset))
            .unwrap_or(PAGE_SIZE)
    }
}

/// A slotted page holding variable-length tuples.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlottedPage {
    data: Vec<u8>,
}

impl SlottedPage {
    /// An empty page with the given id encoded into its header.
    pub fn init(id: PageId) -> SlottedPage {
        let mut data = vec![0u8; PAGE_SIZE];
        data[0..4].copy_from_slice(&id.0.to_be_bytes());
        SlottedPage { data }
    }

    /// Wraps raw page bytes; the slice must be exactly one page long.
    pub fn from_bytes(data: Vec<u8>) -> DbResult<SlottedPage> {
        if data.len() != PAGE_SIZE {
            return Err(DbError::Codec(format!(
                "page blob is {} bytes, expected {PAGE_SIZE}",
                data.len()
            )));
        }
        Ok(SlottedPage { data })
    }

    pub fn id(&self) -> PageId {
        PageId(u32::from_be_bytes([
            self.data[0],
            self.data[1],
            self.data[2],
            self.data[3],
        ]))
    }

    pub fn tuple_count(&self) -> u16 {
        u16::from_be_bytes([self.data[4], self.data[5]])
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    fn header(&self) -> DbResult<PageHeader> {
        let count = usize::from(self.tuple_count());
        if HEADER_BASE_BYTES + count * SLOT_BYTES > PAGE_SIZE {
            return Err(DbError::Codec(format!(
                "page {} claims {count} slots, more than fit in a page",
                self.id()
            )));
        }

        let mut slots = Vec::with_capacity(count);
        for i in 0..count {
            let at = HEADER_BASE_BYTES + i * SLOT_BYTES;
            let slot = Slot {
                offset: u16::from_be_bytes([self.data[at], self.data[at + 1]]),
                length: u16::from_be_bytes([self.data[at + 2], self.data[at + 3]]),
            };
            if usize::from(slot.offset) + usize::from(slot.length) > PAGE_SIZE {
                return Err(DbError::Codec(format!(
                    "slot {i} of page {} points past the page end",
                    self.id()
                )));
            }
            slots.push(slot);
        }
        Ok(PageHeader { id: self.id(), slots })
    }

    fn write_header(&mut self, header: &PageHeader) {
        self.data[0..4].copy_from_slice(&header.id.0.to_be_bytes());
        self.data[4..6].copy_from_slice(&(header.slots.len() as u16).to_be_bytes());
        for (i, slot) in header.slots.iter().enumerate() {
            let at = HEADER_BASE_BYTES + i * SLOT_BYTES;
            self.data[at..at + 2].copy_from_slice(&slot.offset.to_be_bytes());
            self.data[at + 2..at + 4].copy_from_slice(&slot.length.to_be_bytes());
        }
    }

    /// Bytes still usable for one more tuple and its slot.
    pub fn free_space(&self) -> DbResult<usize> {
        let header = self.header()?;
        Ok(header
            .smallest_offset()
            .saturating_sub(header.end() + SLOT_BYTES))
    }

    /// Appends a tuple at the tail of the used region.
    /// `DbError::NoSpace` when the encoding does not fit.
    pub fn append_tuple(&mut self, tuple: &Tuple) -> DbResult<()> {
        let bytes = tuple.encode()?;
        let mut header = self.header()?;

        let last = header.smallest_offset();
        let available = last.saturating_sub(header.end() + SLOT_BYTES);
        if bytes.len() > available {
            return Err(DbError::NoSpace);
        }

        let start = last - bytes.len();
        self.data[start..last].copy_from_slice(&bytes);
        header.slots.push(Slot {
            offset: start as u16,
            length: bytes.len() as u16,
        });
        self.write_header(&header);
        Ok(())
    }

    /// Every stored tuple, in slot (= insertion) order.
    pub fn tuples(&self) -> DbResult<Vec<Tuple>> {
        let header = self.header()?;
        header
            .slots
            .iter()
            .map(|slot| {
                let start = usize::from(slot.offset);
                Tuple::decode(&self.data[start..start + usize::from(slot.length)])
            })
            .collect()
    }
}

impl DiskWrite for SlottedPage {
    fn to_bytes(&self) -> DbResult<Vec<u8>> {
        Ok(self.data.clone())
    }
}

impl DiskRead for SlottedPage {
    fn load_from(&mut self, reader: &mut dyn Read) -> DbResult<()> {
        reader.read_exact(&mut self.data)?;
        Ok(())
    }
}
