//! The reversed (inverted) index: per id, the ascending positions where it
//! occurs.
//!
//! Postings of all ids are stored back to back in id order; the offset
//! table holds `size + 1` entries with `offset[id + 1] - offset[id] ==
//! frequency[id]`.
//!
//! The builder runs in bounded memory. Each pass handles a window of
//! consecutive ids: the first id of the window (`primus`) is streamed
//! straight to the output while the scan proceeds, and the remaining ids
//! `(primus, secundus]` are collected into an arena holding at most
//! `limit` positions. A pass costs one scan over the whole token stream,
//! so a larger limit means fewer passes; the output does not depend on it.

use std::path::Path;

use log::{debug, info};
use serde::Serialize;

use crate::config::MAX_WIRE_VALUE;
use crate::error::{PosattrError, Result};
use crate::storage::blob::Blob;
use crate::storage::int_file::{IntFileWriter, write_int_file};
use crate::tokens::TokenSource;

const SCAN_BLOCK: usize = 1 << 16;

/// Statistics of a reversed-index build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReversedBuildStats {
    pub passes: usize,
    pub entries: u64,
    pub buffer_items: usize,
}

/// Cumulative offsets of every id's postings.
pub fn compute_offsets(frequencies: &[u32]) -> Result<Vec<u32>> {
    let mut offsets = Vec::with_capacity(frequencies.len() + 1);
    let mut total = 0u64;
    offsets.push(0);
    for &freq in frequencies {
        total += freq as u64;
        if total > MAX_WIRE_VALUE {
            return Err(PosattrError::limit(format!(
                "reversed index offset {total} exceeds {MAX_WIRE_VALUE}"
            )));
        }
        offsets.push(total as u32);
    }
    Ok(offsets)
}

/// Persist the offset table for `frequencies`.
pub fn write_offsets(frequencies: &[u32], out: &Path) -> Result<Vec<u32>> {
    let offsets = compute_offsets(frequencies)?;
    write_int_file(out, &offsets)?;
    debug!("wrote {} offsets to {}", offsets.len(), out.display());
    Ok(offsets)
}

/// Check an offset table against the frequencies and the corpus length.
pub fn validate_offsets(frequencies: &[u32], offsets: &[u32], corpus_len: usize) -> Result<()> {
    if offsets.len() != frequencies.len() + 1 {
        return Err(PosattrError::corruption(format!(
            "offset table has {} entries, expected {}",
            offsets.len(),
            frequencies.len() + 1
        )));
    }
    if offsets[0] != 0 {
        return Err(PosattrError::corruption(format!(
            "first offset is {}, expected 0",
            offsets[0]
        )));
    }
    for (id, &freq) in frequencies.iter().enumerate() {
        let span = offsets[id + 1].checked_sub(offsets[id]);
        if span != Some(freq) {
            return Err(PosattrError::corruption(format!(
                "offsets of id {id} span {:?} entries but its frequency is {freq}",
                span
            )));
        }
    }
    let last = offsets[frequencies.len()] as usize;
    if last != corpus_len {
        return Err(PosattrError::corruption(format!(
            "offsets end at {last} but the corpus has {corpus_len} tokens"
        )));
    }
    Ok(())
}

/// Postings buffer for the ids `(primus, secundus]` of one pass.
///
/// Every id owns a slot sized by its frequency; slots are addressed by
/// `id - first` and filled front to back.
#[derive(Debug)]
struct WindowArena {
    first: usize,
    starts: Vec<usize>,
    cursors: Vec<usize>,
    entries: Vec<u32>,
}

impl WindowArena {
    fn new(first: usize, frequencies: &[u32]) -> Self {
        let mut starts = Vec::with_capacity(frequencies.len() + 1);
        let mut total = 0usize;
        for &freq in frequencies {
            starts.push(total);
            total += freq as usize;
        }
        starts.push(total);
        let cursors = starts[..frequencies.len()].to_vec();
        WindowArena {
            first,
            starts,
            cursors,
            entries: vec![0; total],
        }
    }

    fn ids(&self) -> usize {
        self.cursors.len()
    }

    fn contains(&self, id: usize) -> bool {
        id >= self.first && id < self.first + self.ids()
    }

    fn push(&mut self, id: usize, position: u32) -> Result<()> {
        let slot = id - self.first;
        let cursor = self.cursors[slot];
        if cursor >= self.starts[slot + 1] {
            return Err(PosattrError::corruption(format!(
                "id {id} occurs more often than its frequency {}",
                self.starts[slot + 1] - self.starts[slot]
            )));
        }
        self.entries[cursor] = position;
        self.cursors[slot] = cursor + 1;
        Ok(())
    }

    #[cfg(test)]
    fn slot(&self, id: usize) -> &[u32] {
        let slot = id - self.first;
        &self.entries[self.starts[slot]..self.starts[slot + 1]]
    }

    fn verify(&self) -> Result<()> {
        for (slot, &cursor) in self.cursors.iter().enumerate() {
            if cursor != self.starts[slot + 1] {
                return Err(PosattrError::corruption(format!(
                    "id {} occurs {} times but its frequency is {}",
                    self.first + slot,
                    cursor - self.starts[slot],
                    self.starts[slot + 1] - self.starts[slot]
                )));
            }
        }
        Ok(())
    }
}

/// Build the postings file of the reversed index in bounded memory.
pub fn build_reversed_index(
    tokens: &dyn TokenSource,
    frequencies: &[u32],
    limit: usize,
    out: &Path,
) -> Result<ReversedBuildStats> {
    let size = frequencies.len();
    let capacity = limit.min(tokens.token_count());
    info!(
        "building reversed index of {} tokens over {size} ids into {} (buffer {capacity} items)",
        tokens.token_count(),
        out.display()
    );

    let mut writer = IntFileWriter::create(out)?;
    let mut passes = 0usize;
    let mut primus = 0usize;

    while primus < size {
        let mut secundus = primus;
        let mut buffered = 0usize;
        while secundus + 1 < size && buffered + frequencies[secundus + 1] as usize <= capacity {
            secundus += 1;
            buffered += frequencies[secundus] as usize;
        }

        if frequencies[primus] > 0 || buffered > 0 {
            let mut arena = WindowArena::new(primus + 1, &frequencies[primus + 1..=secundus]);
            let mut direct = 0u32;

            tokens.scan_blocks(SCAN_BLOCK, &mut |start, ids| {
                for (offset, &id) in ids.iter().enumerate() {
                    let id = id as usize;
                    if id == primus {
                        writer.push((start + offset) as u32)?;
                        direct += 1;
                    } else if arena.contains(id) {
                        arena.push(id, (start + offset) as u32)?;
                    } else if id >= size {
                        return Err(PosattrError::corruption(format!(
                            "id {id} at position {} is outside the lexicon of {size} entries",
                            start + offset
                        )));
                    }
                }
                Ok(())
            })?;

            if direct != frequencies[primus] {
                return Err(PosattrError::corruption(format!(
                    "id {primus} occurs {direct} times but its frequency is {}",
                    frequencies[primus]
                )));
            }
            arena.verify()?;
            writer.push_all(&arena.entries)?;
            passes += 1;
            debug!(
                "pass {passes}: ids {primus}..={secundus}, {} buffered entries",
                arena.entries.len()
            );
        }

        primus = secundus + 1;
    }

    let entries = writer.finish()?;
    if entries != tokens.token_count() as u64 {
        return Err(PosattrError::corruption(format!(
            "reversed index holds {entries} entries for {} tokens",
            tokens.token_count()
        )));
    }
    info!("reversed index complete after {passes} passes");
    Ok(ReversedBuildStats {
        passes,
        entries,
        buffer_items: capacity,
    })
}

/// Read access to an uncompressed reversed index.
#[derive(Debug, Clone, Copy)]
pub struct ReversedIndex<'a> {
    postings: &'a Blob,
    offsets: &'a Blob,
}

impl<'a> ReversedIndex<'a> {
    pub fn new(postings: &'a Blob, offsets: &'a Blob) -> Self {
        ReversedIndex { postings, offsets }
    }

    /// Number of ids covered.
    pub fn len(&self) -> usize {
        self.offsets.items().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ascending positions of `id`.
    pub fn postings(&self, id: u32) -> Result<Vec<u32>> {
        let (start, end) = match (
            self.offsets.int(id as usize),
            self.offsets.int(id as usize + 1),
        ) {
            (Some(start), Some(end)) if start <= end => (start as usize, end as usize),
            (Some(_), Some(_)) => {
                return Err(PosattrError::corruption(format!(
                    "offsets of id {id} are decreasing"
                )));
            }
            _ => {
                return Err(PosattrError::invalid_argument(format!(
                    "id {id} is outside the reversed index of {} ids",
                    self.len()
                )));
            }
        };
        (start..end)
            .map(|i| {
                self.postings.int(i).ok_or_else(|| {
                    PosattrError::corruption(format!("reversed index truncated at entry {i}"))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::int_file::read_int_file;
    use tempfile::TempDir;

    #[test]
    fn test_offsets_of_example() {
        let offsets = compute_offsets(&[2, 1, 1]).unwrap();
        assert_eq!(offsets, vec![0, 2, 3, 4]);
        validate_offsets(&[2, 1, 1], &offsets, 4).unwrap();
        assert!(validate_offsets(&[2, 1, 1], &offsets, 5).is_err());
        assert!(validate_offsets(&[2, 1, 1], &[0, 2, 2, 4], 4).is_err());
        assert!(validate_offsets(&[2, 1, 1], &[0, 2, 3], 4).is_err());
    }

    #[test]
    fn test_arena_slots() {
        let mut arena = WindowArena::new(5, &[2, 0, 1]);
        assert!(arena.contains(5));
        assert!(arena.contains(7));
        assert!(!arena.contains(8));
        arena.push(5, 10).unwrap();
        arena.push(7, 11).unwrap();
        assert!(arena.verify().is_err());
        arena.push(5, 12).unwrap();
        arena.verify().unwrap();
        assert_eq!(arena.slot(5), &[10, 12]);
        assert!(arena.slot(6).is_empty());
        assert!(arena.push(7, 13).is_err());
    }

    #[test]
    fn test_example_postings() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path().join("w.corpus.rev");
        let stream = vec![0u32, 1, 0, 2];

        let stats = build_reversed_index(&stream, &[2, 1, 1], 100, &out).unwrap();
        assert_eq!(stats.passes, 1);
        assert_eq!(read_int_file(&out).unwrap(), vec![0, 2, 1, 3]);
    }

    #[test]
    fn test_output_independent_of_memory_limit() {
        let temp_dir = TempDir::new().unwrap();
        let stream: Vec<u32> = (0..500u32).map(|i| (i * 7 + i / 3) % 13).collect();
        let mut freqs = vec![0u32; 15];
        for &id in &stream {
            freqs[id as usize] += 1;
        }

        let small = temp_dir.path().join("small.rev");
        let large = temp_dir.path().join("large.rev");
        let tiny = build_reversed_index(&stream, &freqs, 1, &small).unwrap();
        let huge = build_reversed_index(&stream, &freqs, usize::MAX, &large).unwrap();

        assert!(tiny.passes > huge.passes);
        assert_eq!(huge.passes, 1);
        assert_eq!(std::fs::read(&small).unwrap(), std::fs::read(&large).unwrap());
    }

    #[test]
    fn test_frequency_mismatch_is_corruption() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path().join("w.corpus.rev");
        let stream = vec![0u32, 1, 0, 2];
        let err = build_reversed_index(&stream, &[1, 2, 1], 100, &out).unwrap_err();
        assert!(matches!(err, PosattrError::Corruption(_)));
    }
}
