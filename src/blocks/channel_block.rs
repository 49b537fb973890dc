use crate::{
    Result,
    blocks::common::{
        BlockHeader, BlockParse, DataType, debug_assert_aligned, read_f64, read_u8, read_u16,
        read_u32, read_u64, validate_buffer_size,
    },
};

/// Size of the CN data section (format fields plus the six range values).
const CN_DATA_SIZE: usize = 72;

/// `cn_flags` bit: the invalidation bit at `pos_invalidation_bit` is used.
pub const CN_FLAG_INVALIDATION_BIT_VALID: u32 = 0x0002;
/// `cn_flags` bit: the block carries a default X-axis link triple.
pub const CN_FLAG_DEFAULT_X: u32 = 0x1000;

/// CNBLOCK: one signal stored in a channel group record.
///
/// The link section is `next, composition, name, source, conversion, data,
/// unit, comment`, followed by `attachment_count` attachment links and, when
/// [`CN_FLAG_DEFAULT_X`] is set, the `[data group, channel group, channel]`
/// default X-axis triple.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelBlock {
    pub header: BlockHeader,
    pub next_ch_addr: u64,
    pub component_addr: u64,
    pub name_addr: u64,
    pub source_addr: u64,
    pub conversion_addr: u64,
    pub data_addr: u64,
    pub unit_addr: u64,
    pub comment_addr: u64,
    pub attachment_addrs: Vec<u64>,
    pub default_x: Option<[u64; 3]>,
    pub channel_type: u8,
    pub sync_type: u8,
    pub data_type: DataType,
    pub bit_offset: u8,
    pub byte_offset: u32,
    pub bit_count: u32,
    pub flags: u32,
    pub pos_invalidation_bit: u32,
    pub precision: u8,
    pub reserved1: u8,
    pub min_raw_value: f64,
    pub max_raw_value: f64,
    pub lower_limit: f64,
    pub upper_limit: f64,
    pub lower_ext_limit: f64,
    pub upper_ext_limit: f64,
}

impl BlockParse<'_> for ChannelBlock {
    const ID: &'static str = "##CN";

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;
        let link_count = header.link_count as usize;
        let data = header.data_offset()?;
        validate_buffer_size(bytes, data + CN_DATA_SIZE)?;

        let link = |i: usize| if link_count > i { read_u64(bytes, 24 + i * 8) } else { 0 };

        let flags = read_u32(bytes, data + 12);
        let attachment_count = read_u16(bytes, data + 22) as usize;
        let attachment_addrs = (0..attachment_count)
            .map(|i| link(8 + i))
            .collect::<Vec<_>>();
        let x_start = 8 + attachment_count;
        let default_x = if flags & CN_FLAG_DEFAULT_X != 0 && link_count >= x_start + 3 {
            Some([link(x_start), link(x_start + 1), link(x_start + 2)])
        } else {
            None
        };

        Ok(Self {
            next_ch_addr: link(0),
            component_addr: link(1),
            name_addr: link(2),
            source_addr: link(3),
            conversion_addr: link(4),
            data_addr: link(5),
            unit_addr: link(6),
            comment_addr: link(7),
            attachment_addrs,
            default_x,
            channel_type: read_u8(bytes, data),
            sync_type: read_u8(bytes, data + 1),
            data_type: DataType::from_u8(read_u8(bytes, data + 2)),
            bit_offset: read_u8(bytes, data + 3),
            byte_offset: read_u32(bytes, data + 4),
            bit_count: read_u32(bytes, data + 8),
            flags,
            pos_invalidation_bit: read_u32(bytes, data + 16),
            precision: read_u8(bytes, data + 20),
            reserved1: read_u8(bytes, data + 21),
            min_raw_value: read_f64(bytes, data + 24),
            max_raw_value: read_f64(bytes, data + 32),
            lower_limit: read_f64(bytes, data + 40),
            upper_limit: read_f64(bytes, data + 48),
            lower_ext_limit: read_f64(bytes, data + 56),
            upper_ext_limit: read_f64(bytes, data + 64),
            header,
        })
    }
}

impl ChannelBlock {
    /// Number of links this block serializes with.
    pub fn link_count(&self) -> u64 {
        let x_links = if self.default_x.is_some() { 3 } else { 0 };
        (8 + self.attachment_addrs.len() + x_links) as u64
    }

    /// Total serialized length of this block.
    pub fn block_len(&self) -> u64 {
        24 + self.link_count() * 8 + CN_DATA_SIZE as u64
    }

    /// Offset of the `data` link relative to the block start.
    pub const DATA_LINK_OFFSET: u64 = 24 + 5 * 8;

    /// Offset of the `next` link relative to the block start.
    pub const NEXT_LINK_OFFSET: u64 = 24;

    /// Serializes the ChannelBlock. The header length and link count are
    /// derived from the attachment list and the default X-axis triple.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let len = self.block_len() as usize;
        let mut buffer = Vec::with_capacity(len);

        let header = BlockHeader::new("##CN", self.block_len(), self.link_count());
        buffer.extend_from_slice(&header.to_bytes()?);

        for link in [
            self.next_ch_addr,
            self.component_addr,
            self.name_addr,
            self.source_addr,
            self.conversion_addr,
            self.data_addr,
            self.unit_addr,
            self.comment_addr,
        ] {
            buffer.extend_from_slice(&link.to_le_bytes());
        }
        for link in &self.attachment_addrs {
            buffer.extend_from_slice(&link.to_le_bytes());
        }
        if let Some(x) = &self.default_x {
            for link in x {
                buffer.extend_from_slice(&link.to_le_bytes());
            }
        }

        let flags = if self.default_x.is_some() {
            self.flags | CN_FLAG_DEFAULT_X
        } else {
            self.flags & !CN_FLAG_DEFAULT_X
        };

        buffer.push(self.channel_type);
        buffer.push(self.sync_type);
        buffer.push(self.data_type.to_u8());
        buffer.push(self.bit_offset);
        buffer.extend_from_slice(&self.byte_offset.to_le_bytes());
        buffer.extend_from_slice(&self.bit_count.to_le_bytes());
        buffer.extend_from_slice(&flags.to_le_bytes());
        buffer.extend_from_slice(&self.pos_invalidation_bit.to_le_bytes());
        buffer.push(self.precision);
        buffer.push(self.reserved1);
        buffer.extend_from_slice(&(self.attachment_addrs.len() as u16).to_le_bytes());

        buffer.extend_from_slice(&self.min_raw_value.to_le_bytes());
        buffer.extend_from_slice(&self.max_raw_value.to_le_bytes());
        buffer.extend_from_slice(&self.lower_limit.to_le_bytes());
        buffer.extend_from_slice(&self.upper_limit.to_le_bytes());
        buffer.extend_from_slice(&self.lower_ext_limit.to_le_bytes());
        buffer.extend_from_slice(&self.upper_ext_limit.to_le_bytes());

        debug_assert_eq!(buffer.len(), len);
        debug_assert_aligned(buffer.len());
        Ok(buffer)
    }
}

impl Default for ChannelBlock {
    fn default() -> Self {
        Self {
            header: BlockHeader::new("##CN", 160, 8),
            next_ch_addr: 0,
            component_addr: 0,
            name_addr: 0,
            source_addr: 0,
            conversion_addr: 0,
            data_addr: 0,
            unit_addr: 0,
            comment_addr: 0,
            attachment_addrs: Vec::new(),
            default_x: None,
            channel_type: 0,
            sync_type: 0,
            data_type: DataType::UnsignedIntegerLE,
            bit_offset: 0,
            byte_offset: 0,
            bit_count: 0,
            flags: 0,
            pos_invalidation_bit: 0,
            precision: 0,
            reserved1: 0,
            min_raw_value: 0.0,
            max_raw_value: 0.0,
            lower_limit: 0.0,
            upper_limit: 0.0,
            lower_ext_limit: 0.0,
            upper_ext_limit: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_x_adds_three_links() -> Result<()> {
        let ch = ChannelBlock {
            default_x: Some([0x100, 0x200, 0x300]),
            bit_count: 16,
            ..Default::default()
        };
        let bytes = ch.to_bytes()?;
        assert_eq!(bytes.len(), 184);

        let parsed = ChannelBlock::from_bytes(&bytes)?;
        assert_eq!(parsed.header.link_count, 11);
        assert_eq!(parsed.default_x, Some([0x100, 0x200, 0x300]));
        assert_ne!(parsed.flags & CN_FLAG_DEFAULT_X, 0);
        assert_eq!(parsed.bit_count, 16);
        Ok(())
    }

    #[test]
    fn plain_channel_is_160_bytes() -> Result<()> {
        let bytes = ChannelBlock::default().to_bytes()?;
        assert_eq!(bytes.len(), 160);
        assert_eq!(ChannelBlock::from_bytes(&bytes)?.default_x, None);
        Ok(())
    }
}
