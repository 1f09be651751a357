//! Streamed output of wire-integer files.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{PosattrError, Result};
use crate::util::byte_order::{decode_ints, write_int};

/// Buffered writer producing a new file of wire integers.
#[derive(Debug)]
pub struct IntFileWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    count: u64,
}

impl IntFileWriter {
    /// Create `path`, which must not exist yet.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| PosattrError::io_at(path, "create", e))?;
        Ok(IntFileWriter {
            path: path.to_path_buf(),
            writer: BufWriter::with_capacity(1 << 16, file),
            count: 0,
        })
    }

    /// Append one integer.
    pub fn push(&mut self, value: u32) -> Result<()> {
        write_int(&mut self.writer, value)
            .map_err(|e| PosattrError::storage(format!("{}: {e}", self.path.display())))?;
        self.count += 1;
        Ok(())
    }

    /// Append a run of integers.
    pub fn push_all(&mut self, values: &[u32]) -> Result<()> {
        values.iter().try_for_each(|&v| self.push(v))
    }

    /// Number of integers written so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Flush and sync the file, returning the number of integers written.
    pub fn finish(mut self) -> Result<u64> {
        self.writer
            .flush()
            .map_err(|e| PosattrError::io_at(&self.path, "flush", e))?;
        self.writer
            .get_ref()
            .sync_all()
            .map_err(|e| PosattrError::io_at(&self.path, "sync", e))?;
        Ok(self.count)
    }
}

/// Write `values` to a new file in one go.
pub fn write_int_file<P: AsRef<Path>>(path: P, values: &[u32]) -> Result<()> {
    let mut writer = IntFileWriter::create(path)?;
    writer.push_all(values)?;
    writer.finish()?;
    Ok(())
}

/// Read a whole wire-integer file into memory.
pub fn read_int_file<P: AsRef<Path>>(path: P) -> Result<Vec<u32>> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| PosattrError::io_at(path, "read", e))?;
    decode_ints(&bytes)
}
