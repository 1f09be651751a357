//! Fixed-width item blocks backed by a memory map or a heap buffer.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ByteOrder};
use log::{debug, warn};
use memmap2::{Mmap, MmapOptions};

use crate::error::{PosattrError, Result};
use crate::util::byte_order::{INT_BYTES, from_wire, to_wire};

/// Size of the anonymous mapping substituted for zero-length files.
const MIN_MAP_BYTES: usize = 8;

/// Width shared by all items of a blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemWidth {
    Bit,
    Byte,
    Short,
    Int,
}

impl ItemWidth {
    /// Number of bytes needed to hold `items` items (bits round up).
    pub fn bytes_for(self, items: usize) -> usize {
        match self {
            ItemWidth::Bit => items.div_ceil(8),
            ItemWidth::Byte => items,
            ItemWidth::Short => items * 2,
            ItemWidth::Int => items * INT_BYTES,
        }
    }

    /// Number of whole items stored in `bytes` bytes.
    pub fn items_in(self, bytes: usize) -> usize {
        match self {
            ItemWidth::Bit => bytes * 8,
            ItemWidth::Byte => bytes,
            ItemWidth::Short => bytes / 2,
            ItemWidth::Int => bytes / INT_BYTES,
        }
    }

    fn item_bytes(self) -> usize {
        match self {
            ItemWidth::Bit | ItemWidth::Byte => 1,
            ItemWidth::Short => 2,
            ItemWidth::Int => INT_BYTES,
        }
    }
}

/// How a blob is acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Read-only memory map of an existing file.
    ReadMap,
    /// Heap copy of an existing file.
    ReadHeap,
    /// Zeroed heap buffer of `items` items, written to a new file by
    /// [`Blob::flush`].
    WriteCreate { items: usize },
}

#[derive(Debug)]
enum Backing {
    Unallocated,
    Mapped(Mmap),
    Heap(Vec<u8>),
}

/// A block of fixed-width items.
///
/// The backing memory is released when the blob is dropped, or earlier via
/// [`Blob::release`].
#[derive(Debug)]
pub struct Blob {
    path: PathBuf,
    width: ItemWidth,
    backing: Backing,
    /// Number of meaningful bytes; may be less than the mapping length.
    len: usize,
    writable: bool,
}

impl Blob {
    /// A zeroed write-create buffer of `items` items, flushed to `path` later.
    pub fn create<P: AsRef<Path>>(path: P, width: ItemWidth, items: usize) -> Result<Self> {
        Self::acquire(path, width, AccessMode::WriteCreate { items })
    }

    /// Acquire a blob for `path` in the given mode.
    pub fn acquire<P: AsRef<Path>>(path: P, width: ItemWidth, mode: AccessMode) -> Result<Self> {
        let path = path.as_ref();
        match mode {
            AccessMode::ReadMap => Self::map(path, width),
            AccessMode::ReadHeap => Self::read_heap(path, width),
            AccessMode::WriteCreate { items } => {
                let len = width.bytes_for(items);
                Ok(Blob {
                    path: path.to_path_buf(),
                    width,
                    backing: Backing::Heap(vec![0u8; len]),
                    len,
                    writable: true,
                })
            }
        }
    }

    fn map(path: &Path, width: ItemWidth) -> Result<Self> {
        let file = File::open(path).map_err(|e| PosattrError::io_at(path, "open", e))?;
        let file_len = file
            .metadata()
            .map_err(|e| PosattrError::io_at(path, "stat", e))?
            .len() as usize;
        Self::check_alignment(path, width, file_len)?;

        let mmap = if file_len == 0 {
            warn!(
                "{} is empty, substituting a {MIN_MAP_BYTES}-byte mapping",
                path.display()
            );
            MmapOptions::new()
                .len(MIN_MAP_BYTES)
                .map_anon()
                .and_then(|m| m.make_read_only())
                .map_err(|e| PosattrError::io_at(path, "map", e))?
        } else {
            // SAFETY: components are write-once; nothing modifies a file
            // after it has been materialized.
            unsafe { MmapOptions::new().map(&file) }.map_err(|e| {
                PosattrError::storage(format!(
                    "failed to map {} ({file_len} bytes, address space exhausted?): {e}",
                    path.display()
                ))
            })?
        };

        debug!("mapped {} ({file_len} bytes)", path.display());
        Ok(Blob {
            path: path.to_path_buf(),
            width,
            backing: Backing::Mapped(mmap),
            len: file_len,
            writable: false,
        })
    }

    fn read_heap(path: &Path, width: ItemWidth) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| PosattrError::io_at(path, "read", e))?;
        Self::check_alignment(path, width, bytes.len())?;
        let len = bytes.len();
        Ok(Blob {
            path: path.to_path_buf(),
            width,
            backing: Backing::Heap(bytes),
            len,
            writable: false,
        })
    }

    fn check_alignment(path: &Path, width: ItemWidth, len: usize) -> Result<()> {
        if len % width.item_bytes() != 0 {
            return Err(PosattrError::corruption(format!(
                "{} has {len} bytes, not a multiple of the {}-byte item width",
                path.display(),
                width.item_bytes()
            )));
        }
        Ok(())
    }

    /// Release the backing memory. Returns whether anything was held.
    pub fn release(&mut self) -> bool {
        let held = !matches!(self.backing, Backing::Unallocated);
        if held {
            debug!("releasing {}", self.path.display());
        }
        self.backing = Backing::Unallocated;
        self.len = 0;
        self.writable = false;
        held
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn width(&self) -> ItemWidth {
        self.width
    }

    pub fn is_loaded(&self) -> bool {
        !matches!(self.backing, Backing::Unallocated)
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self.backing, Backing::Mapped(_))
    }

    /// Number of items in the blob.
    pub fn items(&self) -> usize {
        self.width.items_in(self.len)
    }

    /// Number of meaningful bytes.
    pub fn byte_len(&self) -> usize {
        self.len
    }

    /// The raw bytes of the blob; empty when unloaded.
    pub fn as_bytes(&self) -> &[u8] {
        match &self.backing {
            Backing::Unallocated => &[],
            Backing::Mapped(mmap) => &mmap[..self.len],
            Backing::Heap(bytes) => &bytes[..self.len],
        }
    }

    /// Mutable bytes of a write-create blob.
    pub fn as_mut_bytes(&mut self) -> Result<&mut [u8]> {
        match &mut self.backing {
            Backing::Heap(bytes) if self.writable => Ok(&mut bytes[..]),
            _ => Err(PosattrError::invalid_argument(format!(
                "{} was not acquired for writing",
                self.path.display()
            ))),
        }
    }

    /// Integer item `index`, decoded from wire order.
    pub fn int(&self, index: usize) -> Option<u32> {
        let start = index.checked_mul(INT_BYTES)?;
        self.as_bytes()
            .get(start..start + INT_BYTES)
            .map(from_wire)
    }

    /// Short item `index`, decoded from wire order.
    pub fn short(&self, index: usize) -> Option<u16> {
        let start = index.checked_mul(2)?;
        self.as_bytes()
            .get(start..start + 2)
            .map(BigEndian::read_u16)
    }

    /// Byte item `index`.
    pub fn byte(&self, index: usize) -> Option<u8> {
        self.as_bytes().get(index).copied()
    }

    /// Bit item `index`, most significant bit of each byte first.
    pub fn bit(&self, index: usize) -> Option<bool> {
        self.as_bytes()
            .get(index / 8)
            .map(|byte| (byte >> (7 - index % 8)) & 1 == 1)
    }

    /// Iterate over all integer items in wire order.
    pub fn ints(&self) -> impl Iterator<Item = u32> + '_ {
        self.as_bytes().chunks_exact(INT_BYTES).map(from_wire)
    }

    /// Store integer item `index` in wire order.
    pub fn set_int(&mut self, index: usize, value: u32) -> Result<()> {
        let path = self.path.display().to_string();
        let bytes = self.as_mut_bytes()?;
        let start = index * INT_BYTES;
        let slot = bytes.get_mut(start..start + INT_BYTES).ok_or_else(|| {
            PosattrError::invalid_argument(format!("item {index} is outside {path}"))
        })?;
        slot.copy_from_slice(&to_wire(value));
        Ok(())
    }

    /// Write the buffer of a write-create blob to its (new) file.
    pub fn flush(&self) -> Result<()> {
        if !self.writable {
            return Err(PosattrError::invalid_argument(format!(
                "{} was not acquired for writing",
                self.path.display()
            )));
        }
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .map_err(|e| PosattrError::io_at(&self.path, "create", e))?;
        file.write_all(self.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| PosattrError::io_at(&self.path, "write", e))?;
        debug!("wrote {} ({} bytes)", self.path.display(), self.len);
        Ok(())
    }
}
