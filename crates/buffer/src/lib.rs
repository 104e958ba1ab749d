//! The buffer pool: a bounded cache of page descriptors plus the
//! in-memory secondary indexes.
//!
//! Pages are cached behind a SHA-256 key derived from table name and
//! page id, so distinct pages cannot collide. A descriptor is marked
//! dirty when it is first installed (a fresh page has never been
//! written through) and whenever a tuple is appended to it; the flag
//! is never cleared while the descriptor is resident. Eviction hands
//! dirty descriptors back to the caller for write-back.


mod cache;

pub use cache::Lru;

use std::fmt;

use btree::TupleIndex;
use common::PageId;
use hashbrown::HashMap;
use log::debug;
use sha2::{Digest, Sha256};
use storage::SlottedPage;
use tuple::Tuple;

/// Stable composite key for one index: `<table>__<index_name>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IndexKey(String);

impl IndexKey {
    pub fn new(table: &str, index: &str) -> IndexKey {
        IndexKey(format!("{table}__{index}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

type FrameKey = [u8; 32];

fn frame_key(table: &str, id: PageId) -> FrameKey {
    Sha256::digest(format!("{table}___{id}").as_bytes()).into()
}

/// Buffer-pool bookkeeping unit: a page, its owning table, and
/// whether it has changed since it was last on disk.
#[derive(Debug)]
pub struct PageDescriptor {
    table: String,
    page: SlottedPage,
    dirty: bool,
}

impl PageDescriptor {
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn page(&self) -> &SlottedPage {
        &self.page
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Surrenders the page for write-back.
    pub fn into_page(self) -> SlottedPage {
        self.page
    }
}

pub struct BufferPool {
    frames: Lru<FrameKey, PageDescriptor>,
    indices: HashMap<IndexKey, TupleIndex>,
}

impl BufferPool {
    pub fn new(entry_count: usize, indices: HashMap<IndexKey, TupleIndex>) -> BufferPool {
        BufferPool {
            frames: Lru::with_capacity(entry_count),
            indices,
        }
    }

    /// Residency probe; a hit refreshes the page's LRU position.
    pub fn find_page(&mut self, table: &str, id: PageId) -> bool {
        self.frames.get(&frame_key(table, id)).is_some()
    }

    pub fn get_page(&mut self, table: &str, id: PageId) -> Option<&SlottedPage> {
        self.frames
            .get(&frame_key(table, id))
            .map(|descriptor| &descriptor.page)
    }

    /// Installs a page behind a fresh dirty descriptor. When the
    /// install evicts a dirty descriptor, that descriptor is returned
    /// so the caller can write its page back before it is dropped.
    pub fn insert_page(&mut self, table: &str, page: SlottedPage) -> Option<PageDescriptor> {
        let key = frame_key(table, page.id());
        let descriptor = PageDescriptor {
            table: table.to_string(),
            page,
            dirty: true,
        };

        let evicted = self.frames.set(key, descriptor)?;
        if !evicted.dirty {
            return None;
        }
        debug!(
            "evicting dirty page {} of table '{}' for write-back",
            evicted.page.id(),
            evicted.table
        );
        Some(evicted)
    }

    /// Appends a tuple to a resident page and marks it dirty. False
    /// when the page is not resident or has no room.
    pub fn append_tuple(&mut self, table: &str, id: PageId, tuple: &Tuple) -> bool {
        let Some(descriptor) = self.frames.get(&frame_key(table, id)) else {
            return false;
        };
        if descriptor.page.append_tuple(tuple).is_err() {
            return false;
        }
        descriptor.dirty = true;
        true
    }

    /// Every resident descriptor; the shutdown sweep walks this.
    pub fn descriptors(&self) -> impl Iterator<Item = &PageDescriptor> {
        self.frames.values()
    }

    pub fn resident_pages(&self) -> usize {
        self.frames.len()
    }

    pub fn read_index(&self, table: &str, index: &str) -> Option<&TupleIndex> {
        self.indices.get(&IndexKey::new(table, index))
    }

    pub fn index_mut(&mut self, table: &str, index: &str) -> Option<&mut TupleIndex> {
        self.indices.get_mut(&IndexKey::new(table, index))
    }

    pub fn install_index(&mut self, table: &str, index: &str, tree: TupleIndex) {
        self.indices.insert(IndexKey::new(table, index), tree);
    }

    pub fn indices(&self) -> impl Iterator<Item = (&IndexKey, &TupleIndex)> {
        self.indices.iter()
    }
}
