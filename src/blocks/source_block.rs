use super::SI_BLOCK_SIZE;
use crate::{
    Result,
    blocks::common::{
        BlockHeader, BlockParse, debug_assert_aligned, read_u8, read_u64, validate_buffer_size,
    },
};

/// Source Information Block (##SI) - describes the source of acquired data.
///
/// A source block identifies where data comes from (ECU, bus, I/O device, etc.)
/// and is typically linked from channel groups or channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceBlock {
    pub header: BlockHeader,
    /// Link to text block containing the source name.
    pub name_addr: u64,
    /// Link to text block containing a tool-specific path.
    pub path_addr: u64,
    /// Link to text/metadata block with extended comment.
    pub comment_addr: u64,
    /// Source type (see [`SourceType`]).
    pub source_type: u8,
    /// Bus type (see [`BusType`]).
    pub bus_type: u8,
    /// Flags (bit 0 = simulated source).
    pub flags: u8,
}

impl BlockParse<'_> for SourceBlock {
    const ID: &'static str = "##SI";

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;

        let link_count = header.link_count as usize;
        let data_start = header.data_offset()?;
        validate_buffer_size(bytes, data_start + 3)?;

        let link = |i: usize| if link_count > i { read_u64(bytes, 24 + i * 8) } else { 0 };

        Ok(Self {
            name_addr: link(0),
            path_addr: link(1),
            comment_addr: link(2),
            source_type: read_u8(bytes, data_start),
            bus_type: read_u8(bytes, data_start + 1),
            flags: read_u8(bytes, data_start + 2),
            header,
        })
    }
}

/// Source type constants for SourceBlock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SourceType {
    Other = 0,
    /// Electronic Control Unit
    ECU = 1,
    Bus = 2,
    IO = 3,
    Tool = 4,
    User = 5,
}

/// Bus type constants for SourceBlock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BusType {
    None = 0,
    Other = 1,
    CAN = 2,
    LIN = 3,
    MOST = 4,
    FlexRay = 5,
    KLine = 6,
    Ethernet = 7,
    USB = 8,
}

impl SourceBlock {
    /// Creates a new SourceBlock with the specified source and bus types.
    pub fn new(source_type: SourceType, bus_type: BusType) -> Self {
        Self {
            header: BlockHeader::new("##SI", SI_BLOCK_SIZE as u64, 3),
            name_addr: 0,
            path_addr: 0,
            comment_addr: 0,
            source_type: source_type as u8,
            bus_type: bus_type as u8,
            flags: 0,
        }
    }

    /// Serializes the SourceBlock (always three links and an 8-byte data section).
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::with_capacity(SI_BLOCK_SIZE);

        let header = BlockHeader::new("##SI", SI_BLOCK_SIZE as u64, 3);
        buffer.extend_from_slice(&header.to_bytes()?);

        buffer.extend_from_slice(&self.name_addr.to_le_bytes());
        buffer.extend_from_slice(&self.path_addr.to_le_bytes());
        buffer.extend_from_slice(&self.comment_addr.to_le_bytes());

        buffer.push(self.source_type);
        buffer.push(self.bus_type);
        buffer.push(self.flags);
        buffer.extend_from_slice(&[0u8; 5]); // reserved

        debug_assert_aligned(buffer.len());
        Ok(buffer)
    }
}

impl Default for SourceBlock {
    fn default() -> Self {
        Self::new(SourceType::Other, BusType::None)
    }
}
