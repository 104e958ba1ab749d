//! Maps every `(table, page_id)` to the file and byte offset that
//! holds the page, and decides where newly registered pages land.
//!
//! Pages for a table fill `<table>__1.db`, `<table>__2.db`, ... in
//! order; each file holds at most `MAX_PAGE_COUNT_PER_FILE` pages, one
//! per 16 KiB slot. The whole directory persists as a single JSON
//! document.


use std::io::Read;

use common::{DbError, DbResult, DiskRead, DiskWrite, PageId};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use storage::{PAGE_SIZE, SlottedPage};

pub const MAX_PAGE_COUNT_PER_FILE: usize = 1000;

pub fn page_filename(table: &str, suffix: usize) -> String {
    format!("{table}__{suffix}.db")
}

/// Inverse of [`page_filename`]; `None` when the name does not follow
/// the `<table>__<n>.db` grammar.
pub fn parse_page_filename(name: &str) -> Option<(&str, usize)> {
    let stem = name.strip_suffix(".db")?;
    let (table, suffix) = stem.rsplit_once("__")?;
    let suffix: usize = suffix.parse().ok()?;
    (suffix >= 1).then_some((table, suffix))
}

fn location_key(table: &str, id: PageId) -> String {
    format!("{table}#{id}")
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLocation {
    #[serde(rename = "Filename")]
    pub filename: String,
    #[serde(rename = "Offset")]
    pub offset: u32,
    // length is always PAGE_SIZE
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PageDirectory {
    /// Page ids per table, in allocation order.
    #[serde(rename = "PageIDs")]
    page_ids: HashMap<String, Vec<PageId>>,
    /// `"<table>#<page_id>"` to file location.
    #[serde(rename = "PageLocation")]
    locations: HashMap<String, PageLocation>,
    #[serde(rename = "MaxPageCountPerFile")]
    max_page_count_per_file: usize,
}

impl Default for PageDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl PageDirectory {
    pub fn new() -> PageDirectory {
        Self::with_max_pages_per_file(MAX_PAGE_COUNT_PER_FILE)
    }

    pub fn with_max_pages_per_file(max: usize) -> PageDirectory {
        PageDirectory {
            page_ids: HashMap::new(),
            locations: HashMap::new(),
            max_page_count_per_file: max,
        }
    }

    /// Page ids of a table in allocation order; empty for unknown
    /// tables.
    pub fn page_ids(&self, table: &str) -> &[PageId] {
        self.page_ids
            .get(table)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Assigns the page a slot in the table's file chain: the
    /// highest-suffixed file while it has room, a fresh file once it
    /// is full.
    pub fn register_page(&mut self, table: &str, page: &SlottedPage) {
        let id = page.id();
        let key = location_key(table, id);

        let ids = self.page_ids.entry(table.to_string()).or_default();
        if ids.is_empty() {
            ids.push(id);
            self.locations.insert(
                key,
                PageLocation {
                    filename: page_filename(table, 1),
                    offset: 0,
                },
            );
            return;
        }

        // Latest file among the pages registered so far, and how many
        // pages each file already holds.
        let mut latest: Option<(usize, String)> = None;
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for prior in ids.iter() {
            let Some(loc) = self.locations.get(&location_key(table, *prior)) else {
                continue;
            };
            *counts.entry(loc.filename.as_str()).or_insert(0) += 1;
            let suffix = parse_page_filename(&loc.filename)
                .map(|(_, n)| n)
                .unwrap_or(0);
            if latest.as_ref().is_none_or(|(n, _)| suffix > *n) {
                latest = Some((suffix, loc.filename.clone()));
            }
        }

        let location = match latest {
            Some((suffix, filename)) => {
                let count = counts.get(filename.as_str()).copied().unwrap_or(0);
                if count < self.max_page_count_per_file {
                    PageLocation {
                        filename,
                        offset: (count * PAGE_SIZE) as u32,
                    }
                } else {
                    PageLocation {
                        filename: page_filename(table, suffix + 1),
                        offset: 0,
                    }
                }
            }
            None => PageLocation {
                filename: page_filename(table, 1),
                offset: 0,
            },
        };
        drop(counts);

        self.page_ids
            .entry(table.to_string())
            .or_default()
            .push(id);
        self.locations.insert(key, location);
    }

    pub fn location_of(&self, table: &str, id: PageId) -> DbResult<&PageLocation> {
        self.locations
            .get(&location_key(table, id))
            .ok_or_else(|| DbError::PageNotFound {
                table: table.to_string(),
                page_id: id,
            })
    }
}

impl DiskWrite for PageDirectory {
    fn to_bytes(&self) -> DbResult<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| DbError::Codec(format!("serialize page directory: {e}")))
    }
}

impl DiskRead for PageDirectory {
    fn load_from(&mut self, reader: &mut dyn Read) -> DbResult<()> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        *self = serde_json::from_slice(&buf)
            .map_err(|e| DbError::Codec(format!("deserialize page directory: {e}")))?;
        Ok(())
    }
}
