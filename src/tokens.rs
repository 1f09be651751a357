//! Sequential access to a token stream, independent of its encoding.
//!
//! Derivations scan the token stream front to back in blocks. The stream
//! may be the raw wire-integer file or the entropy-coded one; both
//! implement [`TokenSource`].

use byteorder::{BigEndian, ByteOrder};

use crate::error::Result;
use crate::storage::blob::Blob;
use crate::util::byte_order::INT_BYTES;

/// A token stream that can be scanned front to back, any number of times.
pub trait TokenSource {
    /// Number of corpus positions.
    fn token_count(&self) -> usize;

    /// Call `visit(start, ids)` for consecutive blocks of at most `block`
    /// ids, where `start` is the corpus position of `ids[0]`.
    fn scan_blocks(
        &self,
        block: usize,
        visit: &mut dyn FnMut(usize, &[u32]) -> Result<()>,
    ) -> Result<()>;
}

impl TokenSource for Blob {
    fn token_count(&self) -> usize {
        self.items()
    }

    fn scan_blocks(
        &self,
        block: usize,
        visit: &mut dyn FnMut(usize, &[u32]) -> Result<()>,
    ) -> Result<()> {
        let block = block.max(1);
        let mut ids = vec![0u32; block];
        for (n, chunk) in self.as_bytes().chunks(block * INT_BYTES).enumerate() {
            let count = chunk.len() / INT_BYTES;
            BigEndian::read_u32_into(&chunk[..count * INT_BYTES], &mut ids[..count]);
            visit(n * block, &ids[..count])?;
        }
        Ok(())
    }
}

impl TokenSource for Vec<u32> {
    fn token_count(&self) -> usize {
        self.len()
    }

    fn scan_blocks(
        &self,
        block: usize,
        visit: &mut dyn FnMut(usize, &[u32]) -> Result<()>,
    ) -> Result<()> {
        let block = block.max(1);
        for (n, ids) in self.chunks(block).enumerate() {
            visit(n * block, ids)?;
        }
        Ok(())
    }
}

/// Collect a whole token stream into memory.
pub fn collect_tokens(source: &dyn TokenSource) -> Result<Vec<u32>> {
    let mut out = Vec::with_capacity(source.token_count());
    source.scan_blocks(1 << 16, &mut |_, ids| {
        out.extend_from_slice(ids);
        Ok(())
    })?;
    Ok(out)
}
