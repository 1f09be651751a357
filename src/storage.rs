//! Storage layer for attribute components.
//!
//! Components are flat files of fixed-width items. A [`blob::Blob`] gives
//! uniform item access to such a file whether it is memory-mapped, copied to
//! the heap, or being assembled in memory before it is written. Builders that
//! stream their output instead use [`int_file::IntFileWriter`].
//!
//! # Example
//!
//! ```
//! use posattr::storage::blob::{AccessMode, Blob, ItemWidth};
//!
//! # fn main() -> posattr::error::Result<()> {
//! let dir = tempfile::tempdir()?;
//! let path = dir.path().join("word.corpus.cnt");
//!
//! let mut blob = Blob::acquire(&path, ItemWidth::Int, AccessMode::WriteCreate { items: 3 })?;
//! blob.set_int(0, 2)?;
//! blob.set_int(1, 1)?;
//! blob.set_int(2, 1)?;
//! blob.flush()?;
//!
//! let counts = Blob::acquire(&path, ItemWidth::Int, AccessMode::ReadMap)?;
//! assert_eq!(counts.ints().collect::<Vec<_>>(), vec![2, 1, 1]);
//! # Ok(())
//! # }
//! ```

pub mod blob;
pub mod int_file;

pub use blob::{AccessMode, Blob, ItemWidth};
pub use int_file::IntFileWriter;
