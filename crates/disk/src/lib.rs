//! Named-file byte I/O for the storage engine.
//!
//! The disk manager owns nothing between calls: it opens the named
//! file under its base directory, seeks to the requested offset, and
//! hands the stream to the blob traits from `common`. Writes are not
//! fsynced per call; durability comes from the engine's shutdown
//! flush.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::PathBuf;

use common::{DbResult, DiskRead, DiskWrite};
use log::trace;

#[derive(Clone, Debug)]
pub struct DiskManager {
    dir: PathBuf,
}

impl DiskManager {
    pub fn new(dir: impl Into<PathBuf>) -> DiskManager {
        DiskManager { dir: dir.into() }
    }

    /// Fills `target` from `name` at `offset`. A missing file is not
    /// an error and leaves `target` unchanged (first-run semantics).
    pub fn load<T: DiskRead + ?Sized>(
        &self,
        name: &str,
        offset: u64,
        target: &mut T,
    ) -> DbResult<()> {
        let path = self.dir.join(name);
        if !path.exists() {
            trace!("no file {name}, leaving target empty");
            return Ok(());
        }

        let mut file = File::open(&path)?;
        file.seek(SeekFrom::Start(offset))?;
        target.load_from(&mut file)
    }

    /// Writes `source`'s blob into `name` at `offset`, creating the
    /// file if needed.
    pub fn persist<T: DiskWrite + ?Sized>(
        &self,
        name: &str,
        offset: u64,
        source: &T,
    ) -> DbResult<()> {
        let bytes = source.to_bytes()?;
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.dir.join(name))?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&bytes)?;
        trace!("persisted {} bytes to {name} at {offset}", bytes.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::tempdir;

    /// Minimal blob: a byte buffer persisted verbatim.
    #[derive(Default)]
    struct Raw(Vec<u8>);

    impl DiskWrite for Raw {
        fn to_bytes(&self) -> DbResult<Vec<u8>> {
            Ok(self.0.clone())
        }
    }

    impl DiskRead for Raw {
        fn load_from(&mut self, reader: &mut dyn Read) -> DbResult<()> {
            self.0.clear();
            reader.read_to_end(&mut self.0)?;
            Ok(())
        }
    }

    #[test]
    fn persist_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let disk = DiskManager::new(dir.path());

        disk.persist("blob.db", 0, &Raw(vec![1, 2, 3])).unwrap();

        let mut restored = Raw::default();
        disk.load("blob.db", 0, &mut restored).unwrap();
        assert_eq!(restored.0, vec![1, 2, 3]);
    }

    #[test]
    fn missing_file_leaves_the_target_unchanged() {
        let dir = tempdir().unwrap();
        let disk = DiskManager::new(dir.path());

        let mut target = Raw(vec![9, 9]);
        disk.load("never_written.db", 0, &mut target).unwrap();
        assert_eq!(target.0, vec![9, 9]);
    }

    #[test]
    fn writes_land_at_the_requested_offset() {
        let dir = tempdir().unwrap();
        let disk = DiskManager::new(dir.path());

        disk.persist("pages.db", 0, &Raw(vec![0xaa; 4])).unwrap();
        disk.persist("pages.db", 4, &Raw(vec![0xbb; 4])).unwrap();

        let mut all = Raw::default();
        disk.load("pages.db", 0, &mut all).unwrap();
        assert_eq!(all.0, [[0xaa; 4], [0xbb; 4]].concat());

        let mut tail = Raw::default();
        disk.load("pages.db", 4, &mut tail).unwrap();
        assert_eq!(tail.0, vec![0xbb; 4]);
    }

    #[test]
    fn rewriting_an_offset_overwrites_in_place() {
        let dir = tempdir().unwrap();
        let disk = DiskManager::new(dir.path());

        disk.persist("x.db", 0, &Raw(vec![1; 8])).unwrap();
        disk.persist("x.db", 2, &Raw(vec![7; 2])).unwrap();

        let mut out = Raw::default();
        disk.load("x.db", 0, &mut out).unwrap();
        assert_eq!(out.0, vec![1, 1, 7, 7, 1, 1, 1, 1]);
    }

    #[test]
    fn writing_past_the_end_grows_the_file() {
        let dir = tempdir().unwrap();
        let disk = DiskManager::new(dir.path());

        disk.persist("sparse.db", 16, &Raw(vec![5; 4])).unwrap();
        let len = std::fs::metadata(dir.path().join("sparse.db")).unwrap().len();
        assert_eq!(len, 20);
    }
}
