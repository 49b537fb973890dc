use super::SR_BLOCK_SIZE;
use crate::{
    Result,
    blocks::common::{
        BlockHeader, BlockParse, debug_assert_aligned, read_f64, read_u8, read_u64,
        validate_buffer_size,
    },
};

/// Sample Reduction Block (##SR) - a pre-computed reduced view of a channel
/// group's samples (mean/min/max per interval).
///
/// Reduction blocks are chained through `next_sr_addr` and owned by the
/// channel group. Their data blocks are opaque to this crate.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleReductionBlock {
    pub header: BlockHeader,
    pub next_sr_addr: u64,
    /// Link to the reduction data (RD, RV, DZ or DL block).
    pub data_addr: u64,
    /// Number of reduced samples.
    pub cycle_count: u64,
    /// Length of one reduction interval, in units of `sync_type`.
    pub interval: f64,
    /// 1 = time, 2 = angle, 3 = distance, 4 = index.
    pub sync_type: u8,
    pub flags: u8,
}

impl BlockParse<'_> for SampleReductionBlock {
    const ID: &'static str = "##SR";

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;
        let data_start = header.data_offset()?;
        validate_buffer_size(bytes, data_start + 18)?;

        let link_count = header.link_count as usize;
        let link = |i: usize| if link_count > i { read_u64(bytes, 24 + i * 8) } else { 0 };

        Ok(Self {
            next_sr_addr: link(0),
            data_addr: link(1),
            cycle_count: read_u64(bytes, data_start),
            interval: read_f64(bytes, data_start + 8),
            sync_type: read_u8(bytes, data_start + 16),
            flags: read_u8(bytes, data_start + 17),
            header,
        })
    }
}

impl SampleReductionBlock {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::with_capacity(SR_BLOCK_SIZE);
        buffer.extend_from_slice(&BlockHeader::new("##SR", SR_BLOCK_SIZE as u64, 2).to_bytes()?);

        buffer.extend_from_slice(&self.next_sr_addr.to_le_bytes());
        buffer.extend_from_slice(&self.data_addr.to_le_bytes());

        buffer.extend_from_slice(&self.cycle_count.to_le_bytes());
        buffer.extend_from_slice(&self.interval.to_le_bytes());
        buffer.push(self.sync_type);
        buffer.push(self.flags);
        buffer.extend_from_slice(&[0u8; 6]);

        debug_assert_aligned(buffer.len());
        Ok(buffer)
    }
}

impl Default for SampleReductionBlock {
    fn default() -> Self {
        Self {
            header: BlockHeader::new("##SR", SR_BLOCK_SIZE as u64, 2),
            next_sr_addr: 0,
            data_addr: 0,
            cycle_count: 0,
            interval: 0.0,
            sync_type: 1,
            flags: 0,
        }
    }
}
