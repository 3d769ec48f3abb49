use std::{
    fs::{File, OpenOptions},
    io::{self, prelude::*, SeekFrom},
    path::Path,
};

use tracing::trace;

use crate::error::{Error, Result};

/// Page-granular access to a heap file. A heap file is a sequence of
/// full-size pages; its length is always a positive multiple of the
/// page size.
#[derive(Debug)]
pub struct PagedFile {
    file: File,
    page_size: usize,
}

impl PagedFile {
    /// Create the backing file for a new table. The path must not
    /// already exist; an existing file is left untouched.
    pub fn create<P: AsRef<Path>>(path: P, page_size: usize) -> Result<PagedFile> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| {
                if e.kind() == io::ErrorKind::AlreadyExists {
                    Error::TableAlreadyExists(path.as_ref().to_owned())
                } else {
                    Error::Io(e)
                }
            })?;
        Ok(PagedFile { file, page_size })
    }

    /// Open an existing heap file for scanning.
    pub fn open_read<P: AsRef<Path>>(path: P, page_size: usize) -> Result<PagedFile> {
        let file = File::open(path)?;
        Ok(PagedFile { file, page_size })
    }

    /// Open an existing heap file for appending records.
    pub fn open_rw<P: AsRef<Path>>(path: P, page_size: usize) -> Result<PagedFile> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(PagedFile { file, page_size })
    }

    /// Returns the page size of the PagedFile.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of pages in the file. The length must be a positive
    /// multiple of the page size.
    pub fn page_count(&self) -> Result<u64> {
        let len = self.file.metadata()?.len();
        if len == 0 || len % self.page_size as u64 != 0 {
            return Err(Error::CorruptedStorage(format!(
                "file length {} is not a positive multiple of page size {}",
                len, self.page_size
            )));
        }
        Ok(len / self.page_size as u64)
    }

    /// Read one full page into `buf`. Returns `false` on a clean end of
    /// file (zero bytes available at the page boundary); a torn page is
    /// corruption.
    pub fn read_page(&mut self, page_no: u64, buf: &mut [u8]) -> Result<bool> {
        debug_assert_eq!(buf.len(), self.page_size);
        self.file
            .seek(SeekFrom::Start(page_no * self.page_size as u64))?;
        let mut filled = 0;
        while filled < buf.len() {
            match self.file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Io(e)),
            }
        }
        if filled == 0 {
            Ok(false)
        } else if filled < buf.len() {
            Err(Error::CorruptedStorage(format!(
                "torn page {}: {} of {} bytes",
                page_no, filled, self.page_size
            )))
        } else {
            Ok(true)
        }
    }

    /// Write one page at the given position and flush it to disk.
    pub fn write_page(&mut self, page_no: u64, buf: &[u8]) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(page_no * self.page_size as u64))?;
        self.file.write_all(&buf[..self.page_size])?;
        self.file.sync_data()?;
        trace!(page_no, "page written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::create_test_path;

    #[test]
    fn write_then_read() -> anyhow::Result<()> {
        let filepath = create_test_path("heapdb::storage::write_then_read.dat");
        let mut f = PagedFile::create(&filepath, 128)?;

        for c in [b'A', b'B', b'C'].iter().copied() {
            let page_no = match c {
                b'A' => 0,
                b'B' => 1,
                _ => 2,
            };
            f.write_page(page_no, &vec![c; 128])?;
        }
        assert_eq!(f.page_count()?, 3);

        let mut buf = vec![0; 128];
        for (page_no, c) in [b'A', b'B', b'C'].iter().copied().enumerate() {
            assert!(f.read_page(page_no as u64, &mut buf)?);
            assert!(buf.iter().all(|&b| b == c));
        }

        // overwrite a page in place
        f.write_page(1, &vec![b'z'; 128])?;
        assert!(f.read_page(1, &mut buf)?);
        assert!(buf.iter().all(|&b| b == b'z'));
        assert_eq!(f.page_count()?, 3);
        Ok(())
    }

    #[test]
    fn read_past_end_is_clean_eof() -> anyhow::Result<()> {
        let filepath = create_test_path("heapdb::storage::read_past_end.dat");
        let mut f = PagedFile::create(&filepath, 128)?;
        f.write_page(0, &vec![1; 128])?;

        let mut buf = vec![0; 128];
        assert!(f.read_page(0, &mut buf)?);
        assert!(!f.read_page(1, &mut buf)?);
        Ok(())
    }

    #[test]
    fn torn_page_is_corruption() -> anyhow::Result<()> {
        let filepath = create_test_path("heapdb::storage::torn_page.dat");
        std::fs::write(&filepath, vec![7; 192])?; // 1.5 pages of 128

        let mut f = PagedFile::open_read(&filepath, 128)?;
        f.page_count().expect_err("length is not a page multiple");
        let mut buf = vec![0; 128];
        assert!(f.read_page(0, &mut buf)?);
        f.read_page(1, &mut buf)
            .expect_err("half a page should not read");
        Ok(())
    }

    #[test]
    fn create_refuses_existing_file() -> anyhow::Result<()> {
        let filepath = create_test_path("heapdb::storage::create_existing.dat");
        std::fs::write(&filepath, b"occupied")?;

        let err = PagedFile::create(&filepath, 128).err().expect("create must fail");
        assert!(matches!(err, Error::TableAlreadyExists(_)));
        assert_eq!(std::fs::read(&filepath)?, b"occupied");
        Ok(())
    }
}
