use super::{CG_BLOCK_SIZE, CG_MASTER_BLOCK_SIZE};
use crate::{
    Error, Result,
    blocks::common::{
        BlockHeader, BlockParse, debug_assert_aligned, read_u16, read_u32, read_u64,
        validate_buffer_size,
    },
};

/// Link slots of a CGBLOCK, in on-disk order.
pub(crate) const LINK_NEXT: usize = 0;
pub(crate) const LINK_CN: usize = 1;
pub(crate) const LINK_NAME: usize = 2;
pub(crate) const LINK_SI: usize = 3;
pub(crate) const LINK_SR: usize = 4;
pub(crate) const LINK_MD: usize = 5;
pub(crate) const LINK_MASTER: usize = 6;

/// Offsets of the data fields relative to the start of the data section.
pub(crate) const FIELD_CYCLES: u64 = 8;
pub(crate) const FIELD_DATA_BYTES: u64 = 24;
pub(crate) const FIELD_INVALID_BYTES: u64 = 28;

/// Raw CGBLOCK codec.
///
/// The link array has six slots, or seven when the remote-master flag is
/// set. The seventh slot is kept verbatim and never interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelGroupBlock {
    pub header: BlockHeader,
    pub next_cg_addr: u64,
    pub first_ch_addr: u64,
    pub acq_name_addr: u64,
    pub acq_source_addr: u64,
    pub first_sample_reduction_addr: u64,
    pub comment_addr: u64,
    /// Only present when the block has seven links.
    pub master_addr: Option<u64>,
    pub record_id: u64,
    pub cycles_nr: u64,
    pub flags: u16,
    pub path_separator: u16,
    pub reserved1: u32,
    pub samples_byte_nr: u32,
    pub invalidation_bytes_nr: u32,
}

impl BlockParse<'_> for ChannelGroupBlock {
    const ID: &'static str = "##CG";

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;
        if header.link_count < 6 {
            return Err(Error::BlockSerializationError(format!(
                "ChannelGroupBlock needs at least 6 links, found {}",
                header.link_count
            )));
        }
        let data = header.data_offset()?;
        validate_buffer_size(bytes, data + 32)?;

        let link = |i: usize| read_u64(bytes, 24 + i * 8);
        let master_addr = (header.link_count > LINK_MASTER as u64).then(|| link(LINK_MASTER));

        Ok(Self {
            next_cg_addr: link(LINK_NEXT),
            first_ch_addr: link(LINK_CN),
            acq_name_addr: link(LINK_NAME),
            acq_source_addr: link(LINK_SI),
            first_sample_reduction_addr: link(LINK_SR),
            comment_addr: link(LINK_MD),
            master_addr,
            record_id: read_u64(bytes, data),
            cycles_nr: read_u64(bytes, data + 8),
            flags: read_u16(bytes, data + 16),
            path_separator: read_u16(bytes, data + 18),
            reserved1: read_u32(bytes, data + 20),
            samples_byte_nr: read_u32(bytes, data + 24),
            invalidation_bytes_nr: read_u32(bytes, data + 28),
            header,
        })
    }
}

impl ChannelGroupBlock {
    /// Number of link slots this block serializes with.
    pub fn link_count(&self) -> usize {
        if self.master_addr.is_some() { 7 } else { 6 }
    }

    /// Total serialized length: 104 bytes, or 112 with the master slot.
    pub fn block_len(&self) -> usize {
        if self.master_addr.is_some() {
            CG_MASTER_BLOCK_SIZE
        } else {
            CG_BLOCK_SIZE
        }
    }

    /// Offset of the data section relative to the block start.
    pub fn data_offset(&self) -> u64 {
        24 + 8 * self.link_count() as u64
    }

    /// Serializes the ChannelGroupBlock.
    ///
    /// # Structure
    /// - BlockHeader (24 bytes) with id="##CG"
    /// - Link section: next CG, first CN, acquisition name, acquisition
    ///   source, first sample reduction, comment and the optional master link
    /// - Data section (32 bytes): record id, cycle count, flags, path
    ///   separator, reserved, data bytes, invalidation bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let len = self.block_len();
        let mut buffer = Vec::with_capacity(len);

        let header = BlockHeader::new("##CG", len as u64, self.link_count() as u64);
        buffer.extend_from_slice(&header.to_bytes()?);

        buffer.extend_from_slice(&self.next_cg_addr.to_le_bytes());
        buffer.extend_from_slice(&self.first_ch_addr.to_le_bytes());
        buffer.extend_from_slice(&self.acq_name_addr.to_le_bytes());
        buffer.extend_from_slice(&self.acq_source_addr.to_le_bytes());
        buffer.extend_from_slice(&self.first_sample_reduction_addr.to_le_bytes());
        buffer.extend_from_slice(&self.comment_addr.to_le_bytes());
        if let Some(master) = self.master_addr {
            buffer.extend_from_slice(&master.to_le_bytes());
        }

        buffer.extend_from_slice(&self.record_id.to_le_bytes());
        buffer.extend_from_slice(&self.cycles_nr.to_le_bytes());
        buffer.extend_from_slice(&self.flags.to_le_bytes());
        buffer.extend_from_slice(&self.path_separator.to_le_bytes());
        buffer.extend_from_slice(&self.reserved1.to_le_bytes());
        buffer.extend_from_slice(&self.samples_byte_nr.to_le_bytes());
        buffer.extend_from_slice(&self.invalidation_bytes_nr.to_le_bytes());

        if buffer.len() != len {
            return Err(Error::BlockSerializationError(format!(
                "ChannelGroupBlock must be exactly {} bytes, got {}",
                len,
                buffer.len()
            )));
        }
        debug_assert_aligned(buffer.len());

        Ok(buffer)
    }
}

impl Default for ChannelGroupBlock {
    fn default() -> Self {
        ChannelGroupBlock {
            header: BlockHeader::new("##CG", CG_BLOCK_SIZE as u64, 6),
            next_cg_addr: 0,
            first_ch_addr: 0,
            acq_name_addr: 0,
            acq_source_addr: 0,
            first_sample_reduction_addr: 0,
            comment_addr: 0,
            master_addr: None,
            record_id: 0,
            cycles_nr: 0,
            flags: 0,
            path_separator: 0,
            reserved1: 0,
            samples_byte_nr: 0,
            invalidation_bytes_nr: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn master_slot_extends_block() -> Result<()> {
        let cg = ChannelGroupBlock {
            master_addr: Some(0),
            record_id: 3,
            ..Default::default()
        };
        let bytes = cg.to_bytes()?;
        assert_eq!(bytes.len(), 112);

        let parsed = ChannelGroupBlock::from_bytes(&bytes)?;
        assert_eq!(parsed.header.link_count, 7);
        assert_eq!(parsed.master_addr, Some(0));
        assert_eq!(parsed.record_id, 3);
        Ok(())
    }

    #[test]
    fn rejects_other_block_ids() -> Result<()> {
        let mut bytes = ChannelGroupBlock::default().to_bytes()?;
        bytes[2..4].copy_from_slice(b"CN");
        assert!(matches!(
            ChannelGroupBlock::from_bytes(&bytes),
            Err(Error::BlockIDError { .. })
        ));
        Ok(())
    }
}
