//! Conversion of 32-bit integers to and from the store's wire format.
//!
//! Every integer the store writes to disk is 4 bytes wide and big-endian
//! ("network" order), whatever the host's byte order. All raw integer reads
//! and writes go through this module.

use std::io::{Read, Write};

use byteorder::{BigEndian, ByteOrder, ReadBytesExt, WriteBytesExt};

use crate::error::{PosattrError, Result};

/// Width of one wire integer in bytes.
pub const INT_BYTES: usize = 4;

/// Encode a value in wire order.
pub fn to_wire(value: u32) -> [u8; INT_BYTES] {
    let mut bytes = [0u8; INT_BYTES];
    BigEndian::write_u32(&mut bytes, value);
    bytes
}

/// Decode a wire-order value from the first four bytes of `bytes`.
///
/// Panics if `bytes` holds fewer than four bytes.
pub fn from_wire(bytes: &[u8]) -> u32 {
    BigEndian::read_u32(bytes)
}

/// Reverse the byte order of a value.
pub fn swap(value: u32) -> u32 {
    value.swap_bytes()
}

/// Rewrite a buffer of wire integers in place as little-endian integers.
///
/// Used by utilities that must emit little-endian data. A trailing partial
/// word is rejected.
pub fn swap_buffer(bytes: &mut [u8]) -> Result<()> {
    if bytes.len() % INT_BYTES != 0 {
        return Err(PosattrError::invalid_argument(format!(
            "buffer of {} bytes is not a whole number of integers",
            bytes.len()
        )));
    }
    for word in bytes.chunks_exact_mut(INT_BYTES) {
        word.reverse();
    }
    Ok(())
}

/// Write a single wire integer.
pub fn write_int<W: Write>(writer: &mut W, value: u32) -> Result<()> {
    writer.write_u32::<BigEndian>(value)?;
    Ok(())
}

/// Read a single wire integer.
pub fn read_int<R: Read>(reader: &mut R) -> Result<u32> {
    Ok(reader.read_u32::<BigEndian>()?)
}

/// Write a sequence of wire integers.
pub fn write_ints<W: Write>(writer: &mut W, values: &[u32]) -> Result<()> {
    for &value in values {
        writer.write_u32::<BigEndian>(value)?;
    }
    Ok(())
}

/// Encode a slice of values as a wire-order byte buffer.
pub fn encode_ints(values: &[u32]) -> Vec<u8> {
    let mut bytes = vec![0u8; values.len() * INT_BYTES];
    BigEndian::write_u32_into(values, &mut bytes);
    bytes
}

/// Decode a wire-order byte buffer into native values.
pub fn decode_ints(bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.len() % INT_BYTES != 0 {
        return Err(PosattrError::corruption(format!(
            "integer array of {} bytes is not a multiple of {INT_BYTES}",
            bytes.len()
        )));
    }
    let mut values = vec![0u32; bytes.len() / INT_BYTES];
    BigEndian::read_u32_into(bytes, &mut values);
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_wire_order_is_big_endian() {
        assert_eq!(to_wire(1), [0, 0, 0, 1]);
        assert_eq!(to_wire(0x0102_0304), [1, 2, 3, 4]);
        assert_eq!(from_wire(&[0, 0, 1, 0]), 256);
    }

    #[test]
    fn test_swap() {
        assert_eq!(swap(0x0102_0304), 0x0403_0201);
        assert_eq!(swap(swap(77)), 77);
    }

    #[test]
    fn test_swap_buffer() {
        let mut bytes = encode_ints(&[1, 2]);
        swap_buffer(&mut bytes).unwrap();
        assert_eq!(bytes, vec![1, 0, 0, 0, 2, 0, 0, 0]);

        let mut odd = vec![0u8; 5];
        assert!(swap_buffer(&mut odd).is_err());
    }

    #[test]
    fn test_stream_helpers() {
        let mut buffer = Vec::new();
        write_ints(&mut buffer, &[7, 0, u32::MAX]).unwrap();
        write_int(&mut buffer, 9).unwrap();
        assert_eq!(buffer.len(), 16);

        let mut cursor = Cursor::new(buffer);
        assert_eq!(read_int(&mut cursor).unwrap(), 7);
        assert_eq!(read_int(&mut cursor).unwrap(), 0);
        assert_eq!(read_int(&mut cursor).unwrap(), u32::MAX);
        assert_eq!(read_int(&mut cursor).unwrap(), 9);
        assert!(read_int(&mut cursor).is_err());
    }

    #[test]
    fn test_decode_rejects_partial_words() {
        assert_eq!(decode_ints(&encode_ints(&[3, 4])).unwrap(), vec![3, 4]);
        assert!(matches!(
            decode_ints(&[0, 0, 0]),
            Err(PosattrError::Corruption(_))
        ));
    }
}
