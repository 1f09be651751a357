//! Bit-level input and output for the compressed streams.
//!
//! Bits are packed most-significant first: the first bit written lands in
//! bit 7 of the first byte. Both codecs rely on this order, and on
//! [`BitWriter::align`] padding with zero bits.

use std::io::Write;

use crate::error::{PosattrError, Result};

/// Writes individual bits to an underlying byte sink.
#[derive(Debug)]
pub struct BitWriter<W: Write> {
    writer: W,
    current: u8,
    filled: u32,
    bytes_written: u64,
}

impl<W: Write> BitWriter<W> {
    /// Create a new bit writer.
    pub fn new(writer: W) -> Self {
        BitWriter {
            writer,
            current: 0,
            filled: 0,
            bytes_written: 0,
        }
    }

    /// Write a single bit.
    pub fn write_bit(&mut self, bit: bool) -> Result<()> {
        self.current = (self.current << 1) | bit as u8;
        self.filled += 1;
        if self.filled == 8 {
            self.emit()?;
        }
        Ok(())
    }

    /// Write the low `count` bits of `value`, most significant first.
    pub fn write_bits(&mut self, value: u32, count: u32) -> Result<()> {
        if count > 32 {
            return Err(PosattrError::invalid_argument(format!(
                "cannot write {count} bits from a 32-bit value"
            )));
        }
        for shift in (0..count).rev() {
            self.write_bit((value >> shift) & 1 == 1)?;
        }
        Ok(())
    }

    /// Pad the current byte with zero bits.
    pub fn align(&mut self) -> Result<()> {
        if self.filled > 0 {
            self.current <<= 8 - self.filled;
            self.emit()?;
        }
        Ok(())
    }

    /// Number of complete bytes handed to the sink so far.
    pub fn byte_offset(&self) -> u64 {
        self.bytes_written
    }

    /// Number of bits written so far, including the pending partial byte.
    pub fn bit_position(&self) -> u64 {
        self.bytes_written * 8 + self.filled as u64
    }

    /// Align, flush and return the sink.
    pub fn finish(mut self) -> Result<W> {
        self.align()?;
        self.writer.flush()?;
        Ok(self.writer)
    }

    fn emit(&mut self) -> Result<()> {
        self.writer.write_all(&[self.current])?;
        self.bytes_written += 1;
        self.current = 0;
        self.filled = 0;
        Ok(())
    }
}

/// Reads individual bits from a byte slice.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    bytes: &'a [u8],
    byte_pos: usize,
    bit_pos: u32,
}

impl<'a> BitReader<'a> {
    /// Create a reader positioned at the first bit of `bytes`.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self::at(bytes, 0)
    }

    /// Create a reader positioned at the first bit of byte `offset`.
    pub fn at(bytes: &'a [u8], offset: usize) -> Self {
        BitReader {
            bytes,
            byte_pos: offset,
            bit_pos: 0,
        }
    }

    /// Read one bit.
    pub fn read_bit(&mut self) -> Result<u32> {
        let byte = *self.bytes.get(self.byte_pos).ok_or_else(|| {
            PosattrError::corruption(format!(
                "bit stream ends at byte {} while decoding",
                self.bytes.len()
            ))
        })?;
        let bit = (byte >> (7 - self.bit_pos)) & 1;
        self.bit_pos += 1;
        if self.bit_pos == 8 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }
        Ok(bit as u32)
    }

    /// Read `count` bits as an unsigned value, most significant first.
    pub fn read_bits(&mut self, count: u32) -> Result<u32> {
        let mut value = 0u32;
        for _ in 0..count {
            value = (value << 1) | self.read_bit()?;
        }
        Ok(value)
    }

    /// Skip to the start of the next byte unless already aligned.
    pub fn align(&mut self) {
        if self.bit_pos > 0 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }
    }

    /// Byte holding the next bit to be read.
    pub fn byte_position(&self) -> usize {
        self.byte_pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_msb_first_packing() {
        let mut writer = BitWriter::new(Vec::new());
        writer.write_bit(true).unwrap();
        writer.write_bits(0b01, 2).unwrap();
        assert_eq!(writer.bit_position(), 3);
        let bytes = writer.finish().unwrap();
        assert_eq!(bytes, vec![0b1010_0000]);
    }

    #[test]
    fn test_align_and_offsets() {
        let mut writer = BitWriter::new(Vec::new());
        writer.write_bits(0xABC, 12).unwrap();
        assert_eq!(writer.byte_offset(), 1);
        writer.align().unwrap();
        assert_eq!(writer.byte_offset(), 2);
        writer.align().unwrap();
        assert_eq!(writer.byte_offset(), 2);
        writer.write_bits(0xFF, 8).unwrap();
        let bytes = writer.finish().unwrap();
        assert_eq!(bytes, vec![0xAB, 0xC0, 0xFF]);

        let mut reader = BitReader::new(&bytes);
        assert_eq!(reader.read_bits(12).unwrap(), 0xABC);
        reader.align();
        assert_eq!(reader.byte_position(), 2);
        assert_eq!(reader.read_bits(8).unwrap(), 0xFF);
    }

    #[test]
    fn test_reader_at_offset() {
        let bytes = [0x00, 0x80];
        let mut reader = BitReader::at(&bytes, 1);
        assert_eq!(reader.read_bit().unwrap(), 1);
        assert_eq!(reader.read_bits(7).unwrap(), 0);
        assert!(matches!(
            reader.read_bit(),
            Err(PosattrError::Corruption(_))
        ));
    }

    #[test]
    fn test_full_width_values() {
        let mut writer = BitWriter::new(Vec::new());
        writer.write_bits(u32::MAX, 32).unwrap();
        writer.write_bits(0, 0).unwrap();
        assert!(writer.write_bits(1, 33).is_err());
        let bytes = writer.finish().unwrap();
        let mut reader = BitReader::new(&bytes);
        assert_eq!(reader.read_bits(32).unwrap(), u32::MAX);
    }
}
