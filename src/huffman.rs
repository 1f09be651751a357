//! Entropy coding of the token stream with a canonical prefix code.
//!
//! Code lengths come from a Huffman tree over `frequency + 1` per id, built
//! with the two-array heap method of Witten, Moffat and Bell. Codes are then
//! assigned canonically, so the decoder only needs per-length counts, the
//! first code value of each length and the ids ordered by code length; no
//! tree is stored.
//!
//! Every [`SYNC_INTERVAL`] positions the encoder pads to a byte boundary and
//! records the byte offset in the sync table, giving random access to any
//! position after decoding at most `SYNC_INTERVAL - 1` preceding codes.
//!
//! Descriptor file layout (all wire integers):
//! `size, length, min_codelen, max_codelen, lcount[32], symindex[32],
//! min_code[32], symbols[size]`.

use std::fs::{File, OpenOptions};
use std::io::BufWriter;
use std::path::Path;

use log::{debug, info};
use serde::Serialize;

use crate::config::{CODE_LEN_SLOTS, MAX_CODE_LEN, MAX_WIRE_VALUE, SYNC_INTERVAL};
use crate::error::{PosattrError, Result};
use crate::storage::blob::Blob;
use crate::storage::int_file::IntFileWriter;
use crate::tokens::TokenSource;
use crate::util::bits::{BitReader, BitWriter};
use crate::util::byte_order::{INT_BYTES, decode_ints};

/// Decode table of a canonical prefix code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeDescriptor {
    /// Alphabet size.
    pub size: u32,
    /// Number of encoded positions.
    pub length: u32,
    pub min_codelen: u32,
    pub max_codelen: u32,
    /// Number of codes of each length.
    pub lcount: [u32; CODE_LEN_SLOTS],
    /// Index into `symbols` of the first id of each length.
    pub symindex: [u32; CODE_LEN_SLOTS],
    /// Numeric value of the first code of each length.
    pub min_code: [u32; CODE_LEN_SLOTS],
    /// Ids grouped by code length, then by code value.
    pub symbols: Vec<u32>,
}

/// Output statistics of an encoding run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HuffmanStats {
    pub tokens: u64,
    pub bits: u64,
    pub bytes: u64,
    pub checkpoints: u64,
}

/// Compute the Huffman code length of every id, weighting each id by
/// `frequency + 1`.
pub fn code_lengths(frequencies: &[u32]) -> Result<Vec<u32>> {
    let n = frequencies.len();
    match n {
        0 => return Ok(Vec::new()),
        1 => return Ok(vec![1]),
        _ => {}
    }

    // heap[0..h] holds pointers ordered by the weights they point at;
    // heap[n..2n] starts as leaf weights and heap[1..n] receives internal
    // nodes. Merged nodes are overwritten with their parent's index.
    let mut heap = vec![0u64; 2 * n];
    for (i, &freq) in frequencies.iter().enumerate() {
        heap[i] = (n + i) as u64;
        heap[n + i] = freq as u64 + 1;
    }
    for i in (0..n / 2).rev() {
        sift_down(&mut heap, i, n);
    }

    let mut h = n;
    while h > 1 {
        let m1 = heap[0] as usize;
        h -= 1;
        heap[0] = heap[h];
        sift_down(&mut heap, 0, h);
        let m2 = heap[0] as usize;

        heap[h] = heap[m1] + heap[m2];
        heap[m1] = h as u64;
        heap[m2] = h as u64;
        heap[0] = h as u64;
        sift_down(&mut heap, 0, h);
    }

    heap[1] = 0;
    for i in 2..2 * n {
        heap[i] = heap[heap[i] as usize] + 1;
    }

    let lengths: Vec<u32> = heap[n..].iter().map(|&depth| depth as u32).collect();
    if let Some((id, &len)) = lengths
        .iter()
        .enumerate()
        .find(|(_, len)| **len as usize > MAX_CODE_LEN)
    {
        return Err(PosattrError::limit(format!(
            "code length {len} of id {id} exceeds the maximum of {MAX_CODE_LEN} bits"
        )));
    }
    Ok(lengths)
}

fn sift_down(heap: &mut [u64], mut i: usize, len: usize) {
    loop {
        let left = 2 * i + 1;
        if left >= len {
            break;
        }
        let mut child = left;
        if left + 1 < len && heap[heap[left + 1] as usize] < heap[heap[left] as usize] {
            child = left + 1;
        }
        if heap[heap[i] as usize] <= heap[heap[child] as usize] {
            break;
        }
        heap.swap(i, child);
        i = child;
    }
}

impl CodeDescriptor {
    /// Build the code for a frequency table.
    pub fn from_frequencies(frequencies: &[u32]) -> Result<Self> {
        let length: u64 = frequencies.iter().map(|&f| f as u64).sum();
        if length > MAX_WIRE_VALUE {
            return Err(PosattrError::limit(format!(
                "stream of {length} tokens exceeds {MAX_WIRE_VALUE}"
            )));
        }
        let lengths = code_lengths(frequencies)?;
        Self::from_code_lengths(&lengths, length as u32)
    }

    /// Assign canonical codes for the given per-id code lengths.
    pub fn from_code_lengths(lengths: &[u32], length: u32) -> Result<Self> {
        let mut lcount = [0u32; CODE_LEN_SLOTS];
        for (id, &len) in lengths.iter().enumerate() {
            if len == 0 || len as usize > MAX_CODE_LEN {
                return Err(PosattrError::limit(format!(
                    "id {id} has code length {len}, allowed are 1..={MAX_CODE_LEN}"
                )));
            }
            lcount[len as usize] += 1;
        }

        let min_codelen = lengths.iter().copied().min().unwrap_or(0);
        let max_codelen = lengths.iter().copied().max().unwrap_or(0);

        let mut symindex = [0u32; CODE_LEN_SLOTS];
        let mut next = 0u32;
        for len in 1..CODE_LEN_SLOTS {
            symindex[len] = next;
            next += lcount[len];
        }

        let mut symbols = vec![0u32; lengths.len()];
        let mut fill = symindex;
        for (id, &len) in lengths.iter().enumerate() {
            symbols[fill[len as usize] as usize] = id as u32;
            fill[len as usize] += 1;
        }

        let mut min_code = [0u32; CODE_LEN_SLOTS];
        let max = max_codelen as usize;
        if max > 0 {
            for len in (1..max).rev() {
                min_code[len] = (min_code[len + 1] + lcount[len + 1]) / 2;
            }
        }

        Ok(CodeDescriptor {
            size: lengths.len() as u32,
            length,
            min_codelen,
            max_codelen,
            lcount,
            symindex,
            min_code,
            symbols,
        })
    }

    /// `(code, code length)` of every id, for encoding.
    pub fn codes(&self) -> Vec<(u32, u32)> {
        let mut codes = vec![(0u32, 0u32); self.size as usize];
        for len in 1..CODE_LEN_SLOTS {
            let start = self.symindex[len] as usize;
            let count = self.lcount[len] as usize;
            for (rank, &id) in self.symbols[start..start + count].iter().enumerate() {
                codes[id as usize] = (self.min_code[len] + rank as u32, len as u32);
            }
        }
        codes
    }

    /// Total size in bits of a stream with the given id frequencies.
    pub fn compressed_bits(&self, frequencies: &[u32]) -> u64 {
        self.codes()
            .iter()
            .zip(frequencies)
            .map(|(&(_, len), &freq)| len as u64 * freq as u64)
            .sum()
    }

    /// Decode one id starting at the reader's position.
    pub fn decode_symbol(&self, reader: &mut BitReader<'_>) -> Result<u32> {
        if self.max_codelen == 0 {
            return Err(PosattrError::corruption("decoding with an empty code"));
        }
        let mut value = reader.read_bit()?;
        let mut len = 1usize;
        while value < self.min_code[len] {
            len += 1;
            if len > self.max_codelen as usize {
                return Err(PosattrError::corruption(format!(
                    "no code of at most {} bits matches the input",
                    self.max_codelen
                )));
            }
            value = (value << 1) | reader.read_bit()?;
        }
        let index = self.symindex[len] as usize + (value - self.min_code[len]) as usize;
        self.symbols.get(index).copied().ok_or_else(|| {
            PosattrError::corruption(format!("code {value:#b} of length {len} is not assigned"))
        })
    }

    /// Persist the descriptor to a new file.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let mut out = IntFileWriter::create(path)?;
        out.push_all(&[self.size, self.length, self.min_codelen, self.max_codelen])?;
        out.push_all(&self.lcount)?;
        out.push_all(&self.symindex)?;
        out.push_all(&self.min_code)?;
        out.push_all(&self.symbols)?;
        out.finish()?;
        Ok(())
    }

    /// Parse a descriptor from its file contents.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let ints = decode_ints(bytes)?;
        let header = 4 + 3 * CODE_LEN_SLOTS;
        if ints.len() < header {
            return Err(PosattrError::corruption(format!(
                "code descriptor of {} bytes is shorter than its {}-byte header",
                bytes.len(),
                header * INT_BYTES
            )));
        }
        let slots = |n: usize| -> [u32; CODE_LEN_SLOTS] {
            let start = 4 + n * CODE_LEN_SLOTS;
            let mut out = [0u32; CODE_LEN_SLOTS];
            out.copy_from_slice(&ints[start..start + CODE_LEN_SLOTS]);
            out
        };
        let descriptor = CodeDescriptor {
            size: ints[0],
            length: ints[1],
            min_codelen: ints[2],
            max_codelen: ints[3],
            lcount: slots(0),
            symindex: slots(1),
            min_code: slots(2),
            symbols: ints[header..].to_vec(),
        };
        if descriptor.symbols.len() != descriptor.size as usize
            || descriptor.max_codelen as usize > MAX_CODE_LEN
        {
            return Err(PosattrError::corruption(format!(
                "code descriptor declares {} symbols of at most {} bits but holds {}",
                descriptor.size,
                descriptor.max_codelen,
                descriptor.symbols.len()
            )));
        }
        Ok(descriptor)
    }
}

/// Encode `tokens` with `descriptor`, writing the bit stream and sync table.
pub fn encode_stream(
    tokens: &dyn TokenSource,
    descriptor: &CodeDescriptor,
    stream_path: &Path,
    sync_path: &Path,
) -> Result<HuffmanStats> {
    if tokens.token_count() != descriptor.length as usize {
        return Err(PosattrError::corruption(format!(
            "token stream has {} positions but the code was built for {}",
            tokens.token_count(),
            descriptor.length
        )));
    }

    let codes = descriptor.codes();
    let file = create_new(stream_path)?;
    let mut writer = BitWriter::new(BufWriter::with_capacity(1 << 16, file));
    let mut sync = IntFileWriter::create(sync_path)?;

    tokens.scan_blocks(1 << 16, &mut |start, ids| {
        for (offset, &id) in ids.iter().enumerate() {
            let position = start + offset;
            if position % SYNC_INTERVAL == 0 {
                writer.align()?;
                let byte = writer.byte_offset();
                if byte > MAX_WIRE_VALUE {
                    return Err(PosattrError::limit(format!(
                        "compressed stream offset {byte} exceeds {MAX_WIRE_VALUE}"
                    )));
                }
                sync.push(byte as u32)?;
            }
            let &(code, len) = codes.get(id as usize).ok_or_else(|| {
                PosattrError::corruption(format!(
                    "id {id} at position {position} has no code (alphabet size {})",
                    descriptor.size
                ))
            })?;
            writer.write_bits(code, len)?;
        }
        Ok(())
    })?;

    let bits = writer.bit_position();
    let checkpoints = sync.finish()?;
    let file = writer
        .finish()?
        .into_inner()
        .map_err(|e| PosattrError::io_at(stream_path, "flush", e.into_error()))?;
    file.sync_all()
        .map_err(|e| PosattrError::io_at(stream_path, "sync", e))?;

    let stats = HuffmanStats {
        tokens: tokens.token_count() as u64,
        bits,
        bytes: bits.div_ceil(8),
        checkpoints,
    };
    debug!("encoded stream: {stats:?}");
    Ok(stats)
}

fn create_new(path: &Path) -> Result<File> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| PosattrError::io_at(path, "create", e))
}

/// Paths of the three files making up a compressed token stream.
#[derive(Debug, Clone, Copy)]
pub struct HuffmanPaths<'a> {
    pub stream: &'a Path,
    pub descriptor: &'a Path,
    pub sync: &'a Path,
}

/// Build the code from `frequencies`, then write descriptor, stream and
/// sync table.
pub fn compress(
    tokens: &dyn TokenSource,
    frequencies: &[u32],
    paths: HuffmanPaths<'_>,
) -> Result<(CodeDescriptor, HuffmanStats)> {
    info!(
        "compressing {} tokens over {} ids into {}",
        tokens.token_count(),
        frequencies.len(),
        paths.stream.display()
    );
    let descriptor = CodeDescriptor::from_frequencies(frequencies)?;
    info!(
        "code lengths {}..={} bits, expected size {} bytes",
        descriptor.min_codelen,
        descriptor.max_codelen,
        descriptor.compressed_bits(frequencies).div_ceil(8)
    );
    descriptor.write_to(paths.descriptor)?;
    let stats = encode_stream(tokens, &descriptor, paths.stream, paths.sync)?;
    Ok((descriptor, stats))
}

/// Random and sequential access to an entropy-coded token stream.
#[derive(Debug, Clone, Copy)]
pub struct HuffmanReader<'a> {
    descriptor: &'a CodeDescriptor,
    stream: &'a [u8],
    sync: &'a Blob,
}

impl<'a> HuffmanReader<'a> {
    pub fn new(descriptor: &'a CodeDescriptor, stream: &'a Blob, sync: &'a Blob) -> Result<Self> {
        let expected = (descriptor.length as usize).div_ceil(SYNC_INTERVAL);
        if sync.items() != expected {
            return Err(PosattrError::corruption(format!(
                "sync table has {} entries, expected {expected} for {} positions",
                sync.items(),
                descriptor.length
            )));
        }
        Ok(HuffmanReader {
            descriptor,
            stream: stream.as_bytes(),
            sync,
        })
    }

    pub fn len(&self) -> usize {
        self.descriptor.length as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sequential decoder starting at `position`.
    pub fn cursor(&self, position: usize) -> Result<HuffmanCursor<'a>> {
        if position > self.len() {
            return Err(PosattrError::invalid_argument(format!(
                "position {position} is beyond the stream of {} tokens",
                self.len()
            )));
        }
        let checkpoint = position / SYNC_INTERVAL;
        let start = checkpoint * SYNC_INTERVAL;
        let mut cursor = HuffmanCursor {
            descriptor: self.descriptor,
            stream: self.stream,
            reader: BitReader::new(self.stream),
            sync: self.sync,
            position: start,
            length: self.len(),
        };
        for _ in start..position {
            cursor.next_id()?;
        }
        Ok(cursor)
    }

    /// The id at `position`.
    pub fn get(&self, position: usize) -> Result<u32> {
        if position >= self.len() {
            return Err(PosattrError::invalid_argument(format!(
                "position {position} is beyond the stream of {} tokens",
                self.len()
            )));
        }
        self.cursor(position)?
            .next_id()?
            .ok_or_else(|| PosattrError::corruption("compressed stream ended early"))
    }

    /// Ids of positions `start..end`.
    pub fn decode_range(&self, start: usize, end: usize) -> Result<Vec<u32>> {
        let end = end.min(self.len());
        let mut cursor = self.cursor(start.min(end))?;
        let mut ids = Vec::with_capacity(end.saturating_sub(start));
        for _ in start..end {
            match cursor.next_id()? {
                Some(id) => ids.push(id),
                None => break,
            }
        }
        Ok(ids)
    }
}

impl TokenSource for HuffmanReader<'_> {
    fn token_count(&self) -> usize {
        self.len()
    }

    fn scan_blocks(
        &self,
        block: usize,
        visit: &mut dyn FnMut(usize, &[u32]) -> Result<()>,
    ) -> Result<()> {
        let block = block.max(1);
        let mut cursor = self.cursor(0)?;
        let mut ids = Vec::with_capacity(block);
        let mut start = 0usize;
        while let Some(id) = cursor.next_id()? {
            ids.push(id);
            if ids.len() == block {
                visit(start, &ids)?;
                start += ids.len();
                ids.clear();
            }
        }
        if !ids.is_empty() {
            visit(start, &ids)?;
        }
        Ok(())
    }
}

/// Forward decoder over an entropy-coded stream.
#[derive(Debug, Clone)]
pub struct HuffmanCursor<'a> {
    descriptor: &'a CodeDescriptor,
    stream: &'a [u8],
    reader: BitReader<'a>,
    sync: &'a Blob,
    position: usize,
    length: usize,
}

impl HuffmanCursor<'_> {
    /// Position of the next id to be decoded.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Decode the next id, or `None` at the end of the stream.
    pub fn next_id(&mut self) -> Result<Option<u32>> {
        if self.position >= self.length {
            return Ok(None);
        }
        if self.position % SYNC_INTERVAL == 0 {
            let checkpoint = self.position / SYNC_INTERVAL;
            let offset = self.sync.int(checkpoint).ok_or_else(|| {
                PosattrError::corruption(format!("sync table lacks checkpoint {checkpoint}"))
            })?;
            self.reader = BitReader::at(self.stream, offset as usize);
        }
        let id = self.descriptor.decode_symbol(&mut self.reader)?;
        self.position += 1;
        Ok(Some(id))
    }
}

/// Decode the whole compressed stream and compare it with `original`,
/// failing on the first mismatch.
pub fn validate(reader: &HuffmanReader<'_>, original: &dyn TokenSource) -> Result<()> {
    if reader.len() != original.token_count() {
        return Err(PosattrError::corruption(format!(
            "compressed stream has {} positions, original has {}",
            reader.len(),
            original.token_count()
        )));
    }
    let mut cursor = reader.cursor(0)?;
    original.scan_blocks(1 << 16, &mut |start, ids| {
        for (offset, &expected) in ids.iter().enumerate() {
            let decoded = cursor.next_id()?;
            if decoded != Some(expected) {
                return Err(PosattrError::corruption(format!(
                    "compressed stream decodes {decoded:?} at position {}, original has {expected}",
                    start + offset
                )));
            }
        }
        Ok(())
    })?;
    info!("validated {} compressed positions", reader.len());
    Ok(())
}
