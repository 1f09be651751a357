//! Golomb coding of reversed-index postings.
//!
//! Each id's postings are stored as the gaps between consecutive positions
//! (the first gap is measured from position 0). A gap `g` is written as the
//! quotient `g / b` in unary (that many 1 bits, then a 0 bit) followed by the
//! remainder `g % b` in truncated binary. The parameter `b` is never stored;
//! encoder and decoder both derive it from the id's frequency and the corpus
//! size with [`golomb_parameter`].
//!
//! Every id's code starts on a byte boundary. The offset file holds
//! `size + 1` byte offsets into the compressed stream.

use std::fs::OpenOptions;
use std::io::BufWriter;
use std::path::Path;

use log::{debug, info};
use serde::Serialize;

use crate::config::MAX_WIRE_VALUE;
use crate::error::{PosattrError, Result};
use crate::reversed::ReversedIndex;
use crate::storage::blob::Blob;
use crate::storage::int_file::IntFileWriter;
use crate::util::bits::{BitReader, BitWriter};

/// Output statistics of a compression run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GolombStats {
    pub ids: usize,
    pub entries: u64,
    pub bytes: u64,
}

/// Golomb parameter for an id occurring `frequency` times in a corpus of
/// `corpus_size` tokens: `max(1, floor(0.69 * corpus_size / frequency))`.
///
/// Rarer ids get larger parameters. Ids that never occur get 1.
pub fn golomb_parameter(frequency: u32, corpus_size: u32) -> u32 {
    if frequency == 0 {
        return 1;
    }
    let b = (69 * corpus_size as u64) / (100 * frequency as u64);
    b.clamp(1, u32::MAX as u64) as u32
}

/// Number of bits `k` with `2^(k-1) < b <= 2^k`.
fn ceil_log2(b: u32) -> u32 {
    if b <= 1 { 0 } else { 32 - (b - 1).leading_zeros() }
}

/// Write one Golomb code of `value` with parameter `b`.
pub fn write_golomb<W: std::io::Write>(writer: &mut BitWriter<W>, value: u32, b: u32) -> Result<()> {
    let quotient = value / b;
    let remainder = value % b;
    for _ in 0..quotient {
        writer.write_bit(true)?;
    }
    writer.write_bit(false)?;

    let k = ceil_log2(b);
    if k == 0 {
        return Ok(());
    }
    let cutoff = ((1u64 << k) - b as u64) as u32;
    if remainder < cutoff {
        writer.write_bits(remainder, k - 1)
    } else {
        writer.write_bits(remainder + cutoff, k)
    }
}

/// Read one Golomb code with parameter `b`.
pub fn read_golomb(reader: &mut BitReader<'_>, b: u32) -> Result<u32> {
    let mut quotient = 0u64;
    while reader.read_bit()? == 1 {
        quotient += 1;
    }

    let k = ceil_log2(b);
    let remainder = if k == 0 {
        0
    } else {
        let cutoff = ((1u64 << k) - b as u64) as u32;
        let head = reader.read_bits(k - 1)?;
        if head < cutoff {
            head
        } else {
            ((head << 1) | reader.read_bit()?) - cutoff
        }
    };

    let value = quotient * b as u64 + remainder as u64;
    u32::try_from(value)
        .map_err(|_| PosattrError::corruption(format!("decoded gap {value} overflows 32 bits")))
}

/// Encode an ascending postings list as Golomb-coded gaps.
pub fn write_gaps<W: std::io::Write>(
    writer: &mut BitWriter<W>,
    positions: &[u32],
    b: u32,
) -> Result<()> {
    let mut last = 0u32;
    for (i, &position) in positions.iter().enumerate() {
        if i > 0 && position <= last {
            return Err(PosattrError::corruption(format!(
                "postings are not strictly ascending: {position} follows {last}"
            )));
        }
        write_golomb(writer, position - last, b)?;
        last = position;
    }
    Ok(())
}

/// Decode `count` Golomb-coded gaps into positions.
pub fn read_gaps(reader: &mut BitReader<'_>, count: usize, b: u32) -> Result<Vec<u32>> {
    let mut positions = Vec::with_capacity(count);
    let mut last = 0u32;
    for _ in 0..count {
        let gap = read_golomb(reader, b)?;
        last = last.checked_add(gap).ok_or_else(|| {
            PosattrError::corruption(format!("position {last} + {gap} overflows"))
        })?;
        positions.push(last);
    }
    Ok(positions)
}

/// Compress every id's postings of `index`.
pub fn compress_reversed_index(
    index: &ReversedIndex<'_>,
    frequencies: &Blob,
    corpus_size: u32,
    stream_path: &Path,
    offsets_path: &Path,
) -> Result<GolombStats> {
    let size = frequencies.items();
    if index.len() != size {
        return Err(PosattrError::corruption(format!(
            "reversed index covers {} ids, frequency table {size}",
            index.len()
        )));
    }
    info!(
        "compressing reversed index of {size} ids into {}",
        stream_path.display()
    );

    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(stream_path)
        .map_err(|e| PosattrError::io_at(stream_path, "create", e))?;
    let mut writer = BitWriter::new(BufWriter::with_capacity(1 << 16, file));
    let mut offsets = IntFileWriter::create(offsets_path)?;
    let mut entries = 0u64;

    for (id, freq) in frequencies.ints().enumerate() {
        let offset = writer.byte_offset();
        if offset > MAX_WIRE_VALUE {
            return Err(PosattrError::limit(format!(
                "compressed reversed index offset {offset} exceeds {MAX_WIRE_VALUE}"
            )));
        }
        offsets.push(offset as u32)?;

        let positions = index.postings(id as u32)?;
        if positions.len() != freq as usize {
            return Err(PosattrError::corruption(format!(
                "id {id} has {} postings but frequency {freq}",
                positions.len()
            )));
        }
        write_gaps(&mut writer, &positions, golomb_parameter(freq, corpus_size))?;
        writer.align()?;
        entries += positions.len() as u64;
    }

    let bytes = writer.byte_offset();
    if bytes > MAX_WIRE_VALUE {
        return Err(PosattrError::limit(format!(
            "compressed reversed index of {bytes} bytes exceeds {MAX_WIRE_VALUE}"
        )));
    }
    offsets.push(bytes as u32)?;
    offsets.finish()?;
    let file = writer
        .finish()?
        .into_inner()
        .map_err(|e| PosattrError::io_at(stream_path, "flush", e.into_error()))?;
    file.sync_all()
        .map_err(|e| PosattrError::io_at(stream_path, "sync", e))?;

    let stats = GolombStats {
        ids: size,
        entries,
        bytes,
    };
    debug!("compressed reversed index: {stats:?}");
    Ok(stats)
}

/// Read access to a compressed reversed index.
#[derive(Debug, Clone, Copy)]
pub struct CompressedPostings<'a> {
    stream: &'a [u8],
    offsets: &'a Blob,
    frequencies: &'a Blob,
    corpus_size: u32,
}

impl<'a> CompressedPostings<'a> {
    pub fn new(
        stream: &'a Blob,
        offsets: &'a Blob,
        frequencies: &'a Blob,
        corpus_size: u32,
    ) -> Result<Self> {
        if offsets.items() != frequencies.items() + 1 {
            return Err(PosattrError::corruption(format!(
                "compressed offsets hold {} entries for {} ids",
                offsets.items(),
                frequencies.items()
            )));
        }
        Ok(CompressedPostings {
            stream: stream.as_bytes(),
            offsets,
            frequencies,
            corpus_size,
        })
    }

    /// Number of ids covered.
    pub fn len(&self) -> usize {
        self.frequencies.items()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ascending positions of `id`.
    pub fn postings(&self, id: u32) -> Result<Vec<u32>> {
        let freq = self.frequencies.int(id as usize).ok_or_else(|| {
            PosattrError::invalid_argument(format!(
                "id {id} is outside the reversed index of {} ids",
                self.len()
            ))
        })?;
        let offset = self.offsets.int(id as usize).ok_or_else(|| {
            PosattrError::corruption(format!("compressed offsets lack id {id}"))
        })?;
        let mut reader = BitReader::at(self.stream, offset as usize);
        read_gaps(
            &mut reader,
            freq as usize,
            golomb_parameter(freq, self.corpus_size),
        )
    }
}

/// Decode every id's postings and compare them with the uncompressed index.
pub fn validate(compressed: &CompressedPostings<'_>, original: &ReversedIndex<'_>) -> Result<()> {
    if compressed.len() != original.len() {
        return Err(PosattrError::corruption(format!(
            "compressed index covers {} ids, uncompressed {}",
            compressed.len(),
            original.len()
        )));
    }
    for id in 0..compressed.len() as u32 {
        let decoded = compressed.postings(id)?;
        let expected = original.postings(id)?;
        if decoded != expected {
            let at = decoded
                .iter()
                .zip(&expected)
                .position(|(a, b)| a != b)
                .unwrap_or(decoded.len().min(expected.len()));
            return Err(PosattrError::corruption(format!(
                "postings of id {id} differ at entry {at} after compression"
            )));
        }
    }
    info!("validated compressed postings of {} ids", compressed.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::blob::{AccessMode, ItemWidth};
    use crate::storage::int_file::write_int_file;
    use tempfile::TempDir;

    fn round_trip(positions: &[u32], b: u32) -> Vec<u32> {
        let mut writer = BitWriter::new(Vec::new());
        write_gaps(&mut writer, positions, b).unwrap();
        let bytes = writer.finish().unwrap();
        read_gaps(&mut BitReader::new(&bytes), positions.len(), b).unwrap()
    }

    #[test]
    fn test_parameter_is_monotonic() {
        let n = 1_000_000;
        assert_eq!(golomb_parameter(0, n), 1);
        assert_eq!(golomb_parameter(n, n), 1);
        assert_eq!(golomb_parameter(1, n), 690_000);
        let mut last = u32::MAX;
        for f in [1, 2, 10, 100, 1000, 10_000, 500_000] {
            let b = golomb_parameter(f, n);
            assert!(b <= last);
            last = b;
        }
    }

    #[test]
    fn test_truncated_binary_codes() {
        // b = 3: remainders 0 -> "0", 1 -> "10", 2 -> "11"
        let mut writer = BitWriter::new(Vec::new());
        for value in [0, 1, 2, 3] {
            write_golomb(&mut writer, value, 3).unwrap();
        }
        // 0|0  0|10  0|11  10|0
        assert_eq!(writer.bit_position(), 2 + 3 + 3 + 3);
        let bytes = writer.finish().unwrap();
        let mut reader = BitReader::new(&bytes);
        for value in [0, 1, 2, 3] {
            assert_eq!(read_golomb(&mut reader, 3).unwrap(), value);
        }
    }

    #[test]
    fn test_gap_round_trip_for_various_parameters() {
        let positions = [0u32, 1, 5, 6, 100, 1000, 1001, 65_536, 1 << 20];
        for b in [1, 2, 3, 5, 8, 64, 100, 4097, 690_000] {
            assert_eq!(round_trip(&positions, b), positions.to_vec(), "b = {b}");
        }
        assert!(round_trip(&[], 7).is_empty());
    }

    #[test]
    fn test_rejects_unordered_postings() {
        let mut writer = BitWriter::new(Vec::new());
        assert!(write_gaps(&mut writer, &[4, 4], 2).is_err());
        assert!(write_gaps(&mut writer, &[9, 3], 2).is_err());
    }

    #[test]
    fn test_compress_and_validate_example() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        write_int_file(dir.join("w.corpus.rev"), &[0, 2, 1, 3]).unwrap();
        write_int_file(dir.join("w.corpus.rdx"), &[0, 2, 3, 4]).unwrap();
        write_int_file(dir.join("w.corpus.cnt"), &[2, 1, 1]).unwrap();
        let open = |name: &str| {
            Blob::acquire(dir.join(name), ItemWidth::Int, AccessMode::ReadMap).unwrap()
        };
        let (rev, rdx, cnt) = (open("w.corpus.rev"), open("w.corpus.rdx"), open("w.corpus.cnt"));
        let index = ReversedIndex::new(&rev, &rdx);

        let stats =
            compress_reversed_index(&index, &cnt, 4, &dir.join("w.crc"), &dir.join("w.crx"))
                .unwrap();
        assert_eq!(stats.ids, 3);
        assert_eq!(stats.entries, 4);

        let crc = Blob::acquire(dir.join("w.crc"), ItemWidth::Byte, AccessMode::ReadMap).unwrap();
        let crx = open("w.crx");
        assert_eq!(crx.items(), 4);
        assert_eq!(crx.int(3).unwrap() as u64, stats.bytes);

        let compressed = CompressedPostings::new(&crc, &crx, &cnt, 4).unwrap();
        assert_eq!(compressed.postings(0).unwrap(), vec![0, 2]);
        assert_eq!(compressed.postings(1).unwrap(), vec![1]);
        assert_eq!(compressed.postings(2).unwrap(), vec![3]);
        assert!(compressed.postings(3).is_err());
        validate(&compressed, &index).unwrap();
    }

    #[test]
    fn test_validation_reports_mismatch() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        write_int_file(dir.join("w.corpus.rev"), &[0, 2, 1, 3]).unwrap();
        write_int_file(dir.join("w.corpus.rdx"), &[0, 2, 3, 4]).unwrap();
        write_int_file(dir.join("w.corpus.cnt"), &[2, 1, 1]).unwrap();
        write_int_file(dir.join("w.crx"), &[0, 1, 2, 3]).unwrap();
        // id 0 decodes as [0, 3] instead of [0, 2]
        std::fs::write(dir.join("w.crc"), [0b0111_0000, 0b0100_0000, 0b1010_0000]).unwrap();
        let open = |name: &str, width| {
            Blob::acquire(dir.join(name), width, AccessMode::ReadMap).unwrap()
        };
        let rev = open("w.corpus.rev", ItemWidth::Int);
        let rdx = open("w.corpus.rdx", ItemWidth::Int);
        let cnt = open("w.corpus.cnt", ItemWidth::Int);
        let crx = open("w.crx", ItemWidth::Int);
        let crc = open("w.crc", ItemWidth::Byte);
        let index = ReversedIndex::new(&rev, &rdx);
        let compressed = CompressedPostings::new(&crc, &crx, &cnt, 4).unwrap();

        assert_eq!(compressed.postings(0).unwrap(), vec![0, 3]);
        assert_eq!(compressed.postings(2).unwrap(), vec![3]);
        let error = validate(&compressed, &index).unwrap_err();
        assert!(matches!(error, PosattrError::Corruption(_)));
        assert!(error.to_string().contains("postings of id 0 differ at entry 1"));
    }
}
