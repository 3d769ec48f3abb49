use std::convert::TryInto;

use crate::error::{Error, Result};
use crate::types::{ColumnType, Row};

/// HeapPage is a slotted page holding variable-sized records of one
/// table's schema. The header is a record count followed by a slot
/// array; records pack downward from the page tail.
///
/// - u16: number of records
/// - \[u16; n\]: start offset of each record
///
/// Overall, the page looks like:
///
/// +--------+-------+------------+-----------------------+
/// | Header | Slots | Free space | rec n-1 | ... | rec 0 |
/// +--------+-------+------------+-----------------------+
///
/// A record's length is implicit: record i ends where record i-1
/// starts, and record 0 ends at the page boundary.
#[derive(Debug)]
pub struct HeapPage<'a> {
    schema: &'a [(String, ColumnType)],
    buf: Vec<u8>,
    // One past the last slot; recomputable, cached for O(1) inserts.
    record_pointers_end: usize,
    // Offset of the lowest record, or the page size when empty.
    records_start: usize,
}

impl<'a> HeapPage<'a> {
    /// Allocate an empty page.
    pub fn new(schema: &'a [(String, ColumnType)], page_size: usize) -> HeapPage<'a> {
        debug_assert!(page_size >= 4 && page_size <= u16::max_value() as usize);
        HeapPage {
            schema,
            buf: vec![0; page_size],
            record_pointers_end: 2,
            records_start: page_size,
        }
    }

    /// Adopt a full-size page image read from disk. Bookkeeping is
    /// rebuilt from the header; inconsistent slots are rejected.
    pub fn from_buffer(schema: &'a [(String, ColumnType)], buf: Vec<u8>) -> Result<HeapPage<'a>> {
        if buf.len() < 2 {
            return Err(Error::CorruptedStorage(format!(
                "page of {} bytes has no header",
                buf.len()
            )));
        }
        let mut page = HeapPage {
            schema,
            buf,
            record_pointers_end: 2,
            records_start: 0,
        };
        let n = page.num_records() as usize;
        page.record_pointers_end = 2 + 2 * n;
        if page.record_pointers_end > page.buf.len() {
            return Err(Error::CorruptedStorage(format!(
                "slot array for {} records exceeds the page",
                n
            )));
        }
        let mut prev_end = page.buf.len();
        for i in 0..n {
            let start = page.slot(i) as usize;
            if start >= prev_end {
                return Err(Error::CorruptedStorage(format!(
                    "slot {} does not decrease ({} >= {})",
                    i, start, prev_end
                )));
            }
            if start < page.record_pointers_end {
                return Err(Error::CorruptedStorage(format!(
                    "record {} overlaps the slot array",
                    i
                )));
            }
            prev_end = start;
        }
        page.records_start = if n == 0 { page.buf.len() } else { prev_end };
        Ok(page)
    }

    pub fn num_records(&self) -> u16 {
        u16::from_le_bytes(self.buf[0..2].try_into().unwrap())
    }

    pub fn free_bytes(&self) -> usize {
        self.records_start - 2 - 2 * self.num_records() as usize
    }

    /// Optimistic record insertion: marshall the row, then fail with
    /// `InsufficientSpace` if the record plus its slot does not fit.
    /// The page is unchanged on failure.
    pub fn insert_record(&mut self, row: &Row) -> Result<()> {
        if row.len() != self.schema.len() {
            return Err(Error::SchemaMismatch {
                want: self.schema.len(),
                got: row.len(),
            });
        }
        let mut record = Vec::new();
        for ((_, dtype), value) in self.schema.iter().zip(row) {
            dtype.marshall(value, &mut record)?;
        }
        if 2 + record.len() > self.free_bytes() {
            return Err(Error::InsufficientSpace {
                record: record.len(),
                free: self.free_bytes(),
            });
        }
        self.records_start -= record.len();
        self.buf[self.records_start..self.records_start + record.len()].copy_from_slice(&record);
        self.write_slot(self.record_pointers_end, self.records_start as u16);
        self.record_pointers_end += 2;
        self.write_num_records(self.num_records() + 1);
        Ok(())
    }

    /// Decode the i-th record (in insertion order) back into a row.
    pub fn decode_record(&self, i: u16) -> Result<Row> {
        debug_assert!(i < self.num_records());
        let start = self.slot(i as usize) as usize;
        let end = if i == 0 {
            self.buf.len()
        } else {
            self.slot(i as usize - 1) as usize
        };
        let mut cursor = &self.buf[start..end];
        let mut row = Vec::with_capacity(self.schema.len());
        for (_, dtype) in self.schema {
            row.push(dtype.unmarshall(&mut cursor)?);
        }
        Ok(row)
    }

    /// Lazily decoded rows in insertion order. A page supports one
    /// active iterator; it is not restartable.
    pub fn iter(&self) -> Records<'_, 'a> {
        Records { page: self, idx: 0 }
    }

    /// The current page image, ready to be written back to disk.
    pub fn marshall(&self) -> Vec<u8> {
        self.buf.clone()
    }
}

/// Low-level private methods for manipulating the header words.
impl HeapPage<'_> {
    fn slot(&self, i: usize) -> u16 {
        let off = 2 + 2 * i;
        u16::from_le_bytes(self.buf[off..off + 2].try_into().unwrap())
    }

    fn write_slot(&mut self, at: usize, offset: u16) {
        self.buf[at..at + 2].copy_from_slice(&offset.to_le_bytes());
    }

    fn write_num_records(&mut self, n: u16) {
        self.buf[0..2].copy_from_slice(&n.to_le_bytes());
    }
}

pub struct Records<'p, 'a> {
    page: &'p HeapPage<'a>,
    idx: u16,
}

impl Iterator for Records<'_, '_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Result<Row>> {
        if self.idx >= self.page.num_records() {
            return None;
        }
        let row = self.page.decode_record(self.idx);
        self.idx += 1;
        Some(row)
    }
}
