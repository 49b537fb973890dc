// blocks/common.rs
//! Common types, traits, and helper functions for MDF block parsing.
//!
//! This module provides:
//! - [`BlockHeader`]: The 24-byte header present in all MDF blocks
//! - [`BlockParse`]: Trait for parsing blocks from bytes
//! - [`DataType`]: Enum representing MDF data types
//! - Byte parsing helpers and reader helpers that report truncation

use crate::{
    Error, Result,
    blocks::{metadata_block::MetadataBlock, text_block::TextBlock},
};
use std::io::{ErrorKind, Read, Seek, SeekFrom};

// ============================================================================
// Byte Parsing Helpers
// ============================================================================

/// Read a u64 from a byte slice at the given offset (little-endian).
///
/// # Panics
/// Panics if `offset + 8 > bytes.len()`. Callers validate the buffer first.
#[inline]
pub fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
        bytes[offset + 4],
        bytes[offset + 5],
        bytes[offset + 6],
        bytes[offset + 7],
    ])
}

/// Read a u32 from a byte slice at the given offset (little-endian).
#[inline]
pub fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

/// Read a u16 from a byte slice at the given offset (little-endian).
#[inline]
pub fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

/// Read an f64 from a byte slice at the given offset (little-endian).
#[inline]
pub fn read_f64(bytes: &[u8], offset: usize) -> f64 {
    f64::from_bits(read_u64(bytes, offset))
}

/// Read a u8 from a byte slice at the given offset.
#[inline]
pub fn read_u8(bytes: &[u8], offset: usize) -> u8 {
    bytes[offset]
}

// ============================================================================
// Validation Helpers
// ============================================================================

/// Validate that a buffer has at least `expected` bytes.
#[inline]
pub fn validate_buffer_size(bytes: &[u8], expected: usize) -> Result<()> {
    if bytes.len() < expected {
        return Err(Error::TooShortBuffer {
            actual: bytes.len(),
            expected,
            file: file!(),
            line: line!(),
        });
    }
    Ok(())
}

/// Assert that a buffer size is 8-byte aligned (debug builds only).
#[inline]
pub fn debug_assert_aligned(size: usize) {
    debug_assert_eq!(size % 8, 0, "Block size {} is not 8-byte aligned", size);
}

/// Calculate padding needed to reach 8-byte alignment.
#[inline]
pub const fn padding_to_align_8(size: usize) -> usize {
    (8 - (size % 8)) % 8
}

/// Safely convert a u64 offset/address to usize for indexing.
#[inline]
pub fn u64_to_usize(value: u64, context: &str) -> Result<usize> {
    usize::try_from(value).map_err(|_| {
        Error::BlockSerializationError(format!(
            "{} value {} exceeds maximum addressable size on this platform",
            context, value
        ))
    })
}

// ============================================================================
// Reader Helpers
// ============================================================================

/// Fill `buf` from `reader`, returning how many bytes were actually read.
///
/// Stops early only at end of input; interrupted reads are retried.
pub fn read_counted<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::IOError(e)),
        }
    }
    Ok(filled)
}

/// Fill `buf` completely or fail with [`Error::TruncatedIo`].
pub fn read_exact_checked<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    let actual = read_counted(reader, buf)?;
    if actual != buf.len() {
        return Err(Error::TruncatedIo {
            expected: buf.len(),
            actual,
        });
    }
    Ok(())
}

/// Read the complete block starting at `address`.
///
/// Returns `Ok(None)` when `address` is zero. The returned buffer contains
/// the header, the link section and the data section.
pub fn read_block_bytes<R: Read + Seek>(reader: &mut R, address: u64) -> Result<Option<Vec<u8>>> {
    if address == 0 {
        return Ok(None);
    }
    reader.seek(SeekFrom::Start(address))?;

    let mut head = [0u8; 24];
    read_exact_checked(reader, &mut head)?;
    let header = BlockHeader::from_bytes(&head)?;

    let total = u64_to_usize(header.length, "block length")?;
    if total < 24 {
        return Err(Error::BlockSerializationError(format!(
            "Block {} at {:#x} declares length {} which is shorter than its header",
            header.id, address, header.length
        )));
    }
    // a corrupt length must not drive the allocation
    let body_start = address.saturating_add(24);
    let stream_end = reader.seek(SeekFrom::End(0))?;
    reader.seek(SeekFrom::Start(body_start))?;
    let available = stream_end.saturating_sub(body_start);
    if header.length - 24 > available {
        return Err(Error::TruncatedIo {
            expected: total - 24,
            actual: usize::try_from(available).unwrap_or(usize::MAX),
        });
    }

    let mut bytes = vec![0u8; total];
    bytes[..24].copy_from_slice(&head);
    read_exact_checked(reader, &mut bytes[24..])?;
    Ok(Some(bytes))
}

/// Peek at the 4-character block identifier stored at `address`.
///
/// Returns `Ok(None)` when `address` is zero.
pub fn peek_block_id<R: Read + Seek>(reader: &mut R, address: u64) -> Result<Option<String>> {
    if address == 0 {
        return Ok(None);
    }
    reader.seek(SeekFrom::Start(address))?;
    let mut id = [0u8; 4];
    read_exact_checked(reader, &mut id)?;
    Ok(Some(String::from_utf8_lossy(&id).into_owned()))
}

/// Read a text or metadata block at `address` and return its contents.
///
/// # Returns
/// The block's string contents if present or `Ok(None)` if `address` is zero
/// or the block type is neither text nor metadata.
pub fn read_string_block<R: Read + Seek>(reader: &mut R, address: u64) -> Result<Option<String>> {
    let Some(bytes) = read_block_bytes(reader, address)? else {
        return Ok(None);
    };
    match &bytes[0..4] {
        b"##TX" => Ok(Some(TextBlock::from_bytes(&bytes)?.text)),
        b"##MD" => Ok(Some(MetadataBlock::from_bytes(&bytes)?.xml)),
        _ => Ok(None),
    }
}

// ============================================================================
// Block Header
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    /// 4-byte block type identifier (e.g., "##CG", "##CN").
    pub id: String,
    /// Reserved field, always 0.
    pub reserved: u32,
    /// Total length of the block in bytes, including this header.
    pub length: u64,
    /// Number of link fields in this block.
    pub link_count: u64,
}

impl Default for BlockHeader {
    /// Returns a BlockHeader with id 'UNSET' and length 0 as a placeholder.
    /// This is not a valid MDF block header and should be replaced before writing.
    fn default() -> Self {
        BlockHeader {
            id: String::from("UNSET"),
            reserved: 0,
            length: 0,
            link_count: 0,
        }
    }
}

impl BlockHeader {
    /// Creates a header for a block with the given identifier, total length
    /// and number of links.
    pub fn new(id: &str, length: u64, link_count: u64) -> Self {
        BlockHeader {
            id: String::from(id),
            reserved: 0,
            length,
            link_count,
        }
    }

    /// Serializes the BlockHeader to its 24-byte on-disk form.
    ///
    /// - id: 4 bytes (ASCII characters, truncated or zero padded)
    /// - reserved: 4 bytes (always 0)
    /// - length: 8 bytes (total length of the block including this header)
    /// - link_count: 8 bytes (number of links in this block)
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::with_capacity(24);

        let id_bytes = self.id.as_bytes();
        let mut id_field = [0u8; 4];
        let id_len = core::cmp::min(id_bytes.len(), 4);
        id_field[..id_len].copy_from_slice(&id_bytes[..id_len]);
        buffer.extend_from_slice(&id_field);

        buffer.extend_from_slice(&self.reserved.to_le_bytes());
        buffer.extend_from_slice(&self.length.to_le_bytes());
        buffer.extend_from_slice(&self.link_count.to_le_bytes());

        debug_assert_eq!(buffer.len(), 24);
        Ok(buffer)
    }

    /// Parse a block header from the first 24 bytes of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        validate_buffer_size(bytes, 24)?;

        let id = String::from_utf8_lossy(&bytes[0..4]).into_owned();

        Ok(Self {
            id,
            reserved: read_u32(bytes, 4),
            length: read_u64(bytes, 8),
            link_count: read_u64(bytes, 16),
        })
    }

    /// Byte offset of the data section, right after the link array.
    pub fn data_offset(&self) -> Result<usize> {
        let links = u64_to_usize(self.link_count, "link count")?;
        links
            .checked_mul(8)
            .and_then(|l| l.checked_add(24))
            .ok_or_else(|| {
                Error::BlockSerializationError(format!(
                    "Block {} has an unreasonable link count {}",
                    self.id, self.link_count
                ))
            })
    }
}

pub trait BlockParse<'a>: Sized {
    const ID: &'static str;

    fn parse_header(bytes: &[u8]) -> Result<BlockHeader> {
        let header = BlockHeader::from_bytes(bytes)?;
        if header.id != Self::ID {
            return Err(Error::BlockIDError {
                actual: header.id.clone(),
                expected: Self::ID.to_string(),
            });
        }
        Ok(header)
    }

    fn from_bytes(bytes: &'a [u8]) -> Result<Self>;
}

// ============================================================================
// Data Type
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DataType {
    UnsignedIntegerLE,
    UnsignedIntegerBE,
    SignedIntegerLE,
    SignedIntegerBE,
    FloatLE,
    FloatBE,
    StringLatin1,
    StringUtf8,
    StringUtf16LE,
    StringUtf16BE,
    ByteArray,
    MimeSample,
    MimeStream,
    CanOpenDate,
    CanOpenTime,
    ComplexLE,
    ComplexBE,
    Unknown(u8),
}

impl DataType {
    /// Converts the DataType to its `cn_data_type` byte.
    pub fn to_u8(&self) -> u8 {
        match self {
            DataType::UnsignedIntegerLE => 0,
            DataType::UnsignedIntegerBE => 1,
            DataType::SignedIntegerLE => 2,
            DataType::SignedIntegerBE => 3,
            DataType::FloatLE => 4,
            DataType::FloatBE => 5,
            DataType::StringLatin1 => 6,
            DataType::StringUtf8 => 7,
            DataType::StringUtf16LE => 8,
            DataType::StringUtf16BE => 9,
            DataType::ByteArray => 10,
            DataType::MimeSample => 11,
            DataType::MimeStream => 12,
            DataType::CanOpenDate => 13,
            DataType::CanOpenTime => 14,
            DataType::ComplexLE => 15,
            DataType::ComplexBE => 16,
            DataType::Unknown(raw) => *raw,
        }
    }

    /// Convert a `cn_data_type` byte to the corresponding `DataType`.
    /// Values outside the known range are kept verbatim in `DataType::Unknown`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => DataType::UnsignedIntegerLE,
            1 => DataType::UnsignedIntegerBE,
            2 => DataType::SignedIntegerLE,
            3 => DataType::SignedIntegerBE,
            4 => DataType::FloatLE,
            5 => DataType::FloatBE,
            6 => DataType::StringLatin1,
            7 => DataType::StringUtf8,
            8 => DataType::StringUtf16LE,
            9 => DataType::StringUtf16BE,
            10 => DataType::ByteArray,
            11 => DataType::MimeSample,
            12 => DataType::MimeStream,
            13 => DataType::CanOpenDate,
            14 => DataType::CanOpenTime,
            15 => DataType::ComplexLE,
            16 => DataType::ComplexBE,
            other => DataType::Unknown(other),
        }
    }

    /// Returns a typical bit width for this data type.
    /// This is used when creating channels without an explicit bit count.
    pub fn default_bits(&self) -> u32 {
        match self {
            DataType::UnsignedIntegerLE
            | DataType::UnsignedIntegerBE
            | DataType::SignedIntegerLE
            | DataType::SignedIntegerBE => 32,
            DataType::FloatLE | DataType::FloatBE => 32,
            DataType::StringLatin1
            | DataType::StringUtf8
            | DataType::StringUtf16LE
            | DataType::StringUtf16BE
            | DataType::ByteArray
            | DataType::MimeSample
            | DataType::MimeStream => 8,
            DataType::CanOpenDate | DataType::CanOpenTime => 64,
            DataType::ComplexLE | DataType::ComplexBE => 64,
            DataType::Unknown(_) => 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn zero_address_is_no_block() -> Result<()> {
        let mut cursor = Cursor::new(vec![0u8; 64]);
        assert!(read_block_bytes(&mut cursor, 0)?.is_none());
        assert!(read_string_block(&mut cursor, 0)?.is_none());
        assert!(peek_block_id(&mut cursor, 0)?.is_none());
        Ok(())
    }

    #[test]
    fn short_block_reports_truncation() -> Result<()> {
        let header = BlockHeader::new("##TX", 64, 0);
        let mut bytes = vec![0u8; 8];
        bytes.extend_from_slice(&header.to_bytes()?);
        bytes.extend_from_slice(&[b'a'; 10]);
        let mut cursor = Cursor::new(bytes);

        match read_block_bytes(&mut cursor, 8) {
            Err(Error::TruncatedIo { expected, actual }) => {
                assert_eq!(expected, 40);
                assert_eq!(actual, 10);
            }
            other => panic!("expected truncation, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn oversized_length_is_truncation_not_allocation() -> Result<()> {
        let header = BlockHeader::new("##CG", 1 << 46, 6);
        let mut bytes = vec![0u8; 64];
        bytes.extend_from_slice(&header.to_bytes()?);
        bytes.extend_from_slice(&[0u8; 80]);
        let mut cursor = Cursor::new(bytes);

        match read_block_bytes(&mut cursor, 64) {
            Err(Error::TruncatedIo { expected, actual }) => {
                assert_eq!(expected as u64, (1 << 46) - 24);
                assert_eq!(actual, 80);
            }
            other => panic!("expected truncation, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn string_block_of_other_type_is_none() -> Result<()> {
        let header = BlockHeader::new("##SI", 24, 0);
        let mut bytes = vec![0u8; 8];
        bytes.extend_from_slice(&header.to_bytes()?);
        let mut cursor = Cursor::new(bytes);
        assert_eq!(read_string_block(&mut cursor, 8)?, None);
        Ok(())
    }

    #[test]
    fn unknown_data_type_keeps_raw_value() {
        assert_eq!(DataType::from_u8(42).to_u8(), 42);
        assert_eq!(DataType::from_u8(4), DataType::FloatLE);
    }
}
