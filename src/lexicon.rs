//! Lexicon access, the sorted-lexicon index and the frequency table.
//!
//! The lexicon is a flat blob of NUL-terminated strings; the lexicon index
//! holds one byte offset per id into that blob. The sorted-lexicon index is
//! a permutation of ids whose strings ascend in byte order, which makes
//! string-to-id lookup a binary search.

use std::cmp::Ordering;
use std::path::Path;

use log::info;

use crate::config::MAX_WIRE_VALUE;
use crate::error::{PosattrError, Result};
use crate::storage::blob::{Blob, ItemWidth};
use crate::tokens::TokenSource;

/// Read-only view of a lexicon and its offset index.
#[derive(Debug, Clone, Copy)]
pub struct Lexicon<'a> {
    strings: &'a [u8],
    index: &'a Blob,
}

impl<'a> Lexicon<'a> {
    pub fn new(strings: &'a Blob, index: &'a Blob) -> Self {
        Lexicon {
            strings: strings.as_bytes(),
            index,
        }
    }

    /// Number of distinct strings.
    pub fn len(&self) -> usize {
        self.index.items()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The bytes of string `id`, without the terminating NUL.
    pub fn get(&self, id: u32) -> Result<&'a [u8]> {
        let offset = self.index.int(id as usize).ok_or_else(|| {
            PosattrError::invalid_argument(format!(
                "lexicon id {id} out of range (size {})",
                self.len()
            ))
        })? as usize;
        let tail = self.strings.get(offset..).ok_or_else(|| {
            PosattrError::corruption(format!(
                "lexicon offset {offset} of id {id} exceeds lexicon size {}",
                self.strings.len()
            ))
        })?;
        let end = tail.iter().position(|&b| b == 0).ok_or_else(|| {
            PosattrError::corruption(format!("lexicon string {id} is not NUL-terminated"))
        })?;
        Ok(&tail[..end])
    }

    /// String `id` as UTF-8.
    pub fn get_str(&self, id: u32) -> Result<&'a str> {
        std::str::from_utf8(self.get(id)?)
            .map_err(|e| PosattrError::corruption(format!("lexicon string {id}: {e}")))
    }

    /// Find the id of `key` by binary search over the sorted-lexicon index.
    pub fn find(&self, sorted: &Blob, key: &[u8]) -> Result<Option<u32>> {
        let (mut lo, mut hi) = (0usize, sorted.items());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let id = sorted
                .int(mid)
                .ok_or_else(|| PosattrError::corruption("sorted lexicon index truncated"))?;
            match self.get(id)?.cmp(key) {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => return Ok(Some(id)),
            }
        }
        Ok(None)
    }
}

/// Sort the ids of `lexicon` by their strings and persist the permutation.
pub fn compute_sorted_lexicon(lexicon: &Lexicon<'_>, out: &Path) -> Result<Vec<u32>> {
    info!("sorting lexicon of {} entries into {}", lexicon.len(), out.display());

    let strings = (0..lexicon.len() as u32)
        .map(|id| lexicon.get(id))
        .collect::<Result<Vec<_>>>()?;

    let mut permutation: Vec<u32> = (0..lexicon.len() as u32).collect();
    permutation.sort_by(|&a, &b| strings[a as usize].cmp(strings[b as usize]));

    let mut blob = Blob::create(out, ItemWidth::Int, permutation.len())?;
    for (slot, &id) in permutation.iter().enumerate() {
        blob.set_int(slot, id)?;
    }
    blob.flush()?;
    Ok(permutation)
}

/// Count the occurrences of every id and persist the table.
///
/// Any id outside `[0, lexicon_size)` is reported as corruption before the
/// output file is created.
pub fn compute_frequencies(
    tokens: &dyn TokenSource,
    lexicon_size: usize,
    block: usize,
    out: &Path,
) -> Result<Vec<u32>> {
    info!(
        "counting {} tokens over {lexicon_size} ids into {}",
        tokens.token_count(),
        out.display()
    );

    let mut counts = vec![0u32; lexicon_size];
    tokens.scan_blocks(block, &mut |start, ids| {
        for (offset, &id) in ids.iter().enumerate() {
            let slot = counts.get_mut(id as usize).ok_or_else(|| {
                PosattrError::corruption(format!(
                    "token stream holds id {id} at position {} but the lexicon has {lexicon_size} entries",
                    start + offset
                ))
            })?;
            *slot += 1;
        }
        Ok(())
    })?;

    let total: u64 = counts.iter().map(|&c| c as u64).sum();
    if total != tokens.token_count() as u64 {
        return Err(PosattrError::corruption(format!(
            "frequency sum {total} differs from token count {}",
            tokens.token_count()
        )));
    }
    if total > MAX_WIRE_VALUE {
        return Err(PosattrError::limit(format!(
            "corpus of {total} tokens exceeds the maximum of {MAX_WIRE_VALUE}"
        )));
    }

    let mut blob = Blob::create(out, ItemWidth::Int, counts.len())?;
    for (id, &count) in counts.iter().enumerate() {
        blob.set_int(id, count)?;
    }
    blob.flush()?;
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::blob::AccessMode;
    use crate::storage::int_file::read_int_file;
    use crate::util::byte_order::encode_ints;
    use tempfile::TempDir;

    fn lexicon_blobs(dir: &Path, words: &[&str]) -> (Blob, Blob) {
        let mut strings = Vec::new();
        let mut offsets = Vec::new();
        for word in words {
            offsets.push(strings.len() as u32);
            strings.extend_from_slice(word.as_bytes());
            strings.push(0);
        }
        std::fs::write(dir.join("w.lexicon"), &strings).unwrap();
        std::fs::write(dir.join("w.lexicon.idx"), encode_ints(&offsets)).unwrap();
        (
            Blob::acquire(dir.join("w.lexicon"), ItemWidth::Byte, AccessMode::ReadMap).unwrap(),
            Blob::acquire(dir.join("w.lexicon.idx"), ItemWidth::Int, AccessMode::ReadMap)
                .unwrap(),
        )
    }

    #[test]
    fn test_lexicon_lookup() {
        let temp_dir = TempDir::new().unwrap();
        let (strings, index) = lexicon_blobs(temp_dir.path(), &["the", "cat", ""]);
        let lexicon = Lexicon::new(&strings, &index);

        assert_eq!(lexicon.len(), 3);
        assert_eq!(lexicon.get_str(1).unwrap(), "cat");
        assert_eq!(lexicon.get_str(2).unwrap(), "");
        assert!(lexicon.get(3).is_err());
    }

    #[test]
    fn test_sorted_lexicon_orders_strings() {
        let temp_dir = TempDir::new().unwrap();
        let (strings, index) =
            lexicon_blobs(temp_dir.path(), &["pear", "apple", "fig", "Zebra", "apples"]);
        let lexicon = Lexicon::new(&strings, &index);
        let out = temp_dir.path().join("w.corpus.srt");

        let permutation = compute_sorted_lexicon(&lexicon, &out).unwrap();
        assert_eq!(permutation, vec![3, 1, 4, 2, 0]);
        assert_eq!(read_int_file(&out).unwrap(), permutation);

        let sorted = Blob::acquire(&out, ItemWidth::Int, AccessMode::ReadMap).unwrap();
        let words: Vec<_> = sorted.ints().map(|id| lexicon.get(id).unwrap()).collect();
        assert!(words.windows(2).all(|w| w[0] <= w[1]));

        assert_eq!(lexicon.find(&sorted, b"fig").unwrap(), Some(2));
        assert_eq!(lexicon.find(&sorted, b"Zebra").unwrap(), Some(3));
        assert_eq!(lexicon.find(&sorted, b"grape").unwrap(), None);
    }

    #[test]
    fn test_frequencies_sum_to_stream_length() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path().join("w.corpus.cnt");
        let stream = vec![0u32, 1, 0, 2];

        let counts = compute_frequencies(&stream, 3, 2, &out).unwrap();
        assert_eq!(counts, vec![2, 1, 1]);
        assert_eq!(read_int_file(&out).unwrap(), vec![2, 1, 1]);
        assert_eq!(counts.iter().sum::<u32>() as usize, stream.len());
    }

    #[test]
    fn test_out_of_range_id_is_rejected_before_writing() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path().join("w.corpus.cnt");
        let stream = vec![0u32, 1, 3, 2];

        let err = compute_frequencies(&stream, 3, 64, &out).unwrap_err();
        assert!(matches!(err, PosattrError::Corruption(_)));
        assert!(err.to_string().contains("position 2"));
        assert!(!out.exists());
    }
}
