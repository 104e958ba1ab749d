#[cfg(test)]
mod tests;

use std::{fmt, io, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Logical identifier of a page within one table's file chain.
/// Page ids are assigned monotonically per table, starting at 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageId(pub u32);

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Canonical error type shared across the storage engine subsystems.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("catalog: {0}")]
    Catalog(String),
    #[error("codec: {0}")]
    Codec(String),
    #[error("not enough free space on the page")]
    NoSpace,
    #[error("page {page_id} of table '{table}' is not in the page directory")]
    PageNotFound { table: String, page_id: PageId },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result alias that carries a `DbError`.
pub type DbResult<T> = Result<T, DbError>;

/// A structure the disk manager can fill from an open byte stream.
///
/// Loading must replace the receiver's state wholesale; the disk
/// manager never calls it for a missing file, so an untouched receiver
/// means first-run semantics.
pub trait DiskRead {
    fn load_from(&mut self, reader: &mut dyn io::Read) -> DbResult<()>;
}

/// A structure the disk manager can persist as one contiguous blob.
pub trait DiskWrite {
    fn to_bytes(&self) -> DbResult<Vec<u8>>;
}

/// Runtime configuration for the storage engine.
///
/// # Example
/// ```
/// use common::Config;
/// use std::path::PathBuf;
///
/// let config = Config::builder()
///     .data_dir(PathBuf::from("./my_db"))
///     .buffer_pool_entries(512)
///     .build();
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, bon::Builder)]
pub struct Config {
    /// Directory where page files, index blobs, the page directory and
    /// the catalog live.
    #[builder(default = PathBuf::from("./db_data"))]
    pub data_dir: PathBuf,
    /// Number of page descriptors the buffer pool keeps resident.
    #[builder(default = 1000)]
    pub buffer_pool_entries: usize,
    /// Upper bound on pages per table file before a new file is opened.
    #[builder(default = 1000)]
    pub max_pages_per_file: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./db_data"),
            buffer_pool_entries: 1000,
            max_pages_per_file: 1000,
        }
    }
}

/// Convenient re-exports for downstream crates.
pub mod prelude {
    pub use crate::{Config, DbError, DbResult, DiskRead, DiskWrite, PageId};
    pub use types::{DataType, Value};
}
