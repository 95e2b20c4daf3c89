//! Backward record scanning over band files.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use adjoint_core::Checkpoint;

use crate::StoreError;

/// Reads `{...}` records from the end of a band file towards the start.
///
/// Records are written contiguously with no separators, so the byte before
/// the unconsumed region always closes a record; the scanner searches
/// backwards for the matching opening brace, block by block, and never
/// holds more than one record plus a scan block in memory.
pub(crate) struct ReverseScanner {
    file: File,
    pos: u64,
}

impl ReverseScanner {
    const BLOCK: u64 = 8192;

    pub(crate) fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let pos = file.metadata()?.len();
        Ok(Self { file, pos })
    }

    /// Returns the raw text of the last unconsumed record, or `None` once
    /// the file is exhausted.
    pub(crate) fn next_record(&mut self) -> io::Result<Option<String>> {
        if self.pos == 0 {
            return Ok(None);
        }
        let end = self.pos;
        let mut cursor = end;
        while cursor > 0 {
            let block_start = cursor.saturating_sub(Self::BLOCK);
            let mut block = vec![0u8; (cursor - block_start) as usize];
            self.file.seek(SeekFrom::Start(block_start))?;
            self.file.read_exact(&mut block)?;
            if let Some(offset) = block.iter().rposition(|&b| b == b'{') {
                let start = block_start + offset as u64;
                let mut record = vec![0u8; (end - start) as usize];
                self.file.seek(SeekFrom::Start(start))?;
                self.file.read_exact(&mut record)?;
                self.pos = start;
                return String::from_utf8(record)
                    .map(Some)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e));
            }
            cursor = block_start;
        }
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "checkpoint record has no opening delimiter",
        ))
    }
}

/// Serves the next checkpoint of a descending retrieval pass, opening band
/// files from the highest start iteration downwards.
pub(crate) fn read_descending(
    pending: &mut Vec<u64>,
    scanner: &mut Option<ReverseScanner>,
    path_of: impl Fn(u64) -> PathBuf,
    chunk: u64,
) -> Result<Checkpoint, StoreError> {
    loop {
        if scanner.is_none() {
            let from = pending.pop().ok_or(StoreError::Exhausted { chunk })?;
            *scanner = Some(ReverseScanner::open(&path_of(from))?);
        }
        if let Some(active) = scanner.as_mut() {
            if let Some(text) = active.next_record()? {
                return Ok(text.parse::<Checkpoint>()?);
            }
            *scanner = None;
        }
    }
}
