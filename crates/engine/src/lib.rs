//! The storage engine: orchestrates the buffer pool, page directory,
//! disk manager and secondary indexes across inserts, scans and
//! shutdown.
//!
//! The engine is single-writer: every mutating operation takes
//! `&mut self`, and a coordinator above it owns exclusion between the
//! writer and concurrent readers. There are no locks at this layer.

use std::fs;

use btree::{Key, TupleIndex};
use buffer::{BufferPool, IndexKey, PageDescriptor};
use catalog::Catalog;
use common::{Config, DbError, DbResult, PageId};
use directory::PageDirectory;
use disk::DiskManager;
use hashbrown::HashMap;
use log::{debug, info};
use storage::{MAX_TUPLE_BYTES, SlottedPage};
use tuple::Tuple;

pub const PAGE_DIRECTORY_FILE: &str = "__page_directory.db";
pub const CATALOG_FILE: &str = "__catalog.db";
const INDEX_FILE_SUFFIX: &str = ".idx";

fn index_filename(key: &IndexKey) -> String {
    format!("{key}{INDEX_FILE_SUFFIX}")
}

pub struct Engine {
    pool: BufferPool,
    directory: PageDirectory,
    catalog: Catalog,
    disk: DiskManager,
}

impl Engine {
    /// Builds an engine over `config.data_dir`, warming one tree per
    /// catalog-listed index and loading the page directory. Missing
    /// files yield empty structures (first run).
    pub fn new(config: &Config, catalog: Catalog) -> DbResult<Engine> {
        fs::create_dir_all(&config.data_dir)?;
        let disk = DiskManager::new(&config.data_dir);

        let mut indices = HashMap::new();
        for meta in catalog.list_indices() {
            let key = IndexKey::new(&meta.table, &meta.name);
            let mut tree = TupleIndex::new();
            disk.load(&index_filename(&key), 0, &mut tree)?;
            debug!("warmed index {key} with {} entries", tree.len());
            indices.insert(key, tree);
        }

        let mut pages = PageDirectory::with_max_pages_per_file(config.max_pages_per_file);
        disk.load(PAGE_DIRECTORY_FILE, 0, &mut pages)?;

        Ok(Engine {
            pool: BufferPool::new(config.buffer_pool_entries, indices),
            directory: pages,
            catalog,
            disk,
        })
    }

    /// Convenience constructor that loads the catalog from the data
    /// directory itself.
    pub fn open(config: &Config) -> DbResult<Engine> {
        fs::create_dir_all(&config.data_dir)?;
        let catalog = Catalog::load(&config.data_dir.join(CATALOG_FILE))?;
        Engine::new(config, catalog)
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn create_table(
        &mut self,
        name: &str,
        columns: Vec<catalog::Column>,
        primary_key: usize,
    ) -> DbResult<()> {
        self.catalog.create_table(name, columns, primary_key)
    }

    /// Records the index in the catalog and installs an empty tree.
    pub fn create_index(&mut self, table: &str, index: &str) -> DbResult<()> {
        self.catalog.create_index(table, index)?;
        self.pool.install_index(table, index, TupleIndex::new());
        Ok(())
    }

    /// Upserts `(key, tuple)` into a secondary index; the payload is
    /// the whole row.
    pub fn insert_index(&mut self, table: &str, index: &str, key: Key, tuple: Tuple) -> DbResult<()> {
        let tree = self.pool.index_mut(table, index).ok_or_else(|| {
            DbError::Catalog(format!("unknown index '{index}' on table '{table}'"))
        })?;
        tree.put(key, tuple);
        Ok(())
    }

    pub fn read_index(&self, table: &str, index: &str) -> Option<&TupleIndex> {
        self.pool.read_index(table, index)
    }

    /// Appends a row to the table's most recent page, faulting it in
    /// if needed and allocating fresh pages until the row fits.
    pub fn insert_tuple(&mut self, table: &str, tuple: &Tuple) -> DbResult<()> {
        self.catalog.table(table)?;
        if tuple.encoded_len() > MAX_TUPLE_BYTES {
            return Err(DbError::Codec(format!(
                "tuple of {} bytes cannot fit in a page",
                tuple.encoded_len()
            )));
        }

        let mut page_id = match self.directory.page_ids(table).last().copied() {
            Some(last) => last,
            None => {
                let first = PageId(1);
                self.install_page(table, SlottedPage::init(first))?;
                first
            }
        };

        loop {
            if !self.pool.find_page(table, page_id) {
                self.fault_in(table, page_id)?;
            }

            if self.pool.append_tuple(table, page_id, tuple) {
                return Ok(());
            }

            // Page full: allocate the next one and retry there.
            let next = PageId(page_id.0 + 1);
            self.install_page(table, SlottedPage::init(next))?;
            page_id = next;
        }
    }

    /// Loads a page from its directory location into the pool. A page
    /// the directory does not know reflects a broken invariant between
    /// directory and pool, so it aborts.
    fn fault_in(&mut self, table: &str, page_id: PageId) -> DbResult<()> {
        let location = match self.directory.location_of(table, page_id) {
            Ok(location) => location.clone(),
            Err(err) => panic!("page directory and buffer pool are out of sync: {err}"),
        };

        let mut page = SlottedPage::init(page_id);
        self.disk
            .load(&location.filename, u64::from(location.offset), &mut page)?;
        debug!(
            "faulted in page {page_id} of table '{table}' from {} at {}",
            location.filename, location.offset
        );

        if let Some(evicted) = self.pool.insert_page(table, page) {
            self.write_back(&evicted)?;
        }
        Ok(())
    }

    /// Registers a fresh page with the directory and installs it in
    /// the pool, writing back whatever dirty page the install evicted.
    fn install_page(&mut self, table: &str, page: SlottedPage) -> DbResult<()> {
        self.directory.register_page(table, &page);
        if let Some(evicted) = self.pool.insert_page(table, page) {
            self.write_back(&evicted)?;
        }
        Ok(())
    }

    fn write_back(&self, descriptor: &PageDescriptor) -> DbResult<()> {
        let location = self
            .directory
            .location_of(descriptor.table(), descriptor.page().id())?;
        self.disk.persist(
            &location.filename,
            u64::from(location.offset),
            descriptor.page(),
        )
    }

    /// Every row of the table in key order. Pages the pool holds are
    /// read in place; the rest are loaded from disk without being
    /// installed, so a full scan cannot pollute the cache.
    pub fn read_table(&mut self, table: &str) -> DbResult<Vec<Tuple>> {
        self.catalog.table(table)?;

        let mut tuples = Vec::new();
        for page_id in self.directory.page_ids(table).to_vec() {
            if let Some(page) = self.pool.get_page(table, page_id) {
                tuples.extend(page.tuples()?);
                continue;
            }

            let location = self.directory.location_of(table, page_id)?;
            let mut page = SlottedPage::init(page_id);
            self.disk
                .load(&location.filename, u64::from(location.offset), &mut page)?;
            tuples.extend(page.tuples()?);
        }

        tuples.sort_by(|a, b| a.cmp_by_key(b));
        Ok(tuples)
    }

    /// How many pages the pool currently holds.
    pub fn resident_pages(&self) -> usize {
        self.pool.resident_pages()
    }

    /// Flushes all dirty state: resident dirty pages to their
    /// directory locations, every index to `<table>__<name>.idx`, the
    /// page directory and the catalog to their documents. Consumes the
    /// engine; a clean restart reads everything back.
    pub fn shutdown(self) -> DbResult<()> {
        let mut flushed = 0usize;
        for descriptor in self.pool.descriptors() {
            if descriptor.is_dirty() {
                self.write_back(descriptor)?;
                flushed += 1;
            }
        }

        for (key, index) in self.pool.indices() {
            self.disk.persist(&index_filename(key), 0, index)?;
        }

        self.disk.persist(PAGE_DIRECTORY_FILE, 0, &self.directory)?;
        self.disk.persist(CATALOG_FILE, 0, &self.catalog)?;

        info!("storage engine shut down, {flushed} dirty pages flushed");
        Ok(())
    }
}
