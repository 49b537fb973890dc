use std::collections::HashSet;
use std::io::{Read, Seek};

use tracing::{debug, warn};

use crate::{
    Error, Result,
    blocks::{
        BlockParse, CN_FLAG_INVALIDATION_BIT_VALID, ChannelBlock, DataType, TextBlock,
        peek_block_id, read_block_bytes, read_string_block,
    },
    writer::{LinkedBlock, MdfWrite, write_link_list},
};

/// Classification of a channel, stored in `cn_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ChannelType {
    FixedLength,
    /// Values live in a signal data block or a VLSD channel group; the record
    /// holds an offset.
    VariableLength,
    Master,
    VirtualMaster,
    Sync,
    /// Value length is given by a sibling `.DataLength` channel.
    MaxLength,
    VirtualData,
    Unknown(u8),
}

impl ChannelType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => ChannelType::FixedLength,
            1 => ChannelType::VariableLength,
            2 => ChannelType::Master,
            3 => ChannelType::VirtualMaster,
            4 => ChannelType::Sync,
            5 => ChannelType::MaxLength,
            6 => ChannelType::VirtualData,
            other => ChannelType::Unknown(other),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            ChannelType::FixedLength => 0,
            ChannelType::VariableLength => 1,
            ChannelType::Master => 2,
            ChannelType::VirtualMaster => 3,
            ChannelType::Sync => 4,
            ChannelType::MaxLength => 5,
            ChannelType::VirtualData => 6,
            ChannelType::Unknown(raw) => raw,
        }
    }

    /// Master or virtual master: supplies the X axis of its group.
    pub fn is_master(self) -> bool {
        matches!(self, ChannelType::Master | ChannelType::VirtualMaster)
    }

    /// Virtual channels occupy no bytes in the record.
    pub fn is_virtual(self) -> bool {
        matches!(self, ChannelType::VirtualMaster | ChannelType::VirtualData)
    }
}

/// One entry of a channel's composition.
///
/// A composition is either a chain of nested channels (a structure) or an
/// array block. Array and unrecognised blocks are kept by address only.
#[derive(Debug, Clone, PartialEq)]
pub enum Component {
    Channel(Channel),
    Array { address: u64 },
    Other { id: String, address: u64 },
}

impl Component {
    pub fn as_channel(&self) -> Option<&Channel> {
        match self {
            Component::Channel(channel) => Some(channel),
            _ => None,
        }
    }

    fn address(&self) -> u64 {
        match self {
            Component::Channel(channel) => channel.index(),
            Component::Array { address } | Component::Other { address, .. } => *address,
        }
    }
}

/// A signal recorded in a channel group.
///
/// The channel owns its nested composition. Its identity is its file
/// position ([`Channel::index`]), which is also what X-axis links refer to.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    block: ChannelBlock,
    name: String,
    components: Vec<Component>,
    position: Option<u64>,
}

impl Channel {
    /// Creates an unwritten channel.
    ///
    /// A `bit_count` of zero picks [`DataType::default_bits`].
    pub fn new(name: &str, channel_type: ChannelType, data_type: DataType, bit_count: u32) -> Self {
        let bit_count = if bit_count == 0 {
            data_type.default_bits()
        } else {
            bit_count
        };
        let block = ChannelBlock {
            channel_type: channel_type.to_u8(),
            data_type,
            bit_count,
            ..Default::default()
        };
        Self::from_block(block, name)
    }

    /// Wraps an existing block. The channel is treated as unwritten.
    pub fn from_block(block: ChannelBlock, name: &str) -> Self {
        Self {
            block,
            name: name.to_string(),
            components: Vec::new(),
            position: None,
        }
    }

    /// Read the channel at `address` together with its composition.
    ///
    /// Returns `Ok(None)` when `address` is zero or the block there is not a
    /// CNBLOCK.
    pub fn read<R: Read + Seek>(reader: &mut R, address: u64) -> Result<Option<Self>> {
        let mut visited = HashSet::new();
        Self::read_inner(reader, address, &mut visited)
    }

    /// Read the chain of channels starting at `address`, following the `next`
    /// links.
    pub fn read_chain<R: Read + Seek>(reader: &mut R, address: u64) -> Result<Vec<Self>> {
        let mut visited = HashSet::new();
        Self::read_chain_inner(reader, address, &mut visited)
    }

    fn read_chain_inner<R: Read + Seek>(
        reader: &mut R,
        address: u64,
        visited: &mut HashSet<u64>,
    ) -> Result<Vec<Self>> {
        let mut channels = Vec::new();
        let mut next = address;
        while let Some(channel) = Self::read_inner(reader, next, visited)? {
            next = channel.block.next_ch_addr;
            channels.push(channel);
        }
        Ok(channels)
    }

    fn read_inner<R: Read + Seek>(
        reader: &mut R,
        address: u64,
        visited: &mut HashSet<u64>,
    ) -> Result<Option<Self>> {
        let Some(bytes) = read_block_bytes(reader, address)? else {
            return Ok(None);
        };
        if &bytes[0..4] != ChannelBlock::ID.as_bytes() {
            debug!(address, "link does not point to a channel block");
            return Ok(None);
        }
        if !visited.insert(address) {
            return Err(Error::BlockLinkError(format!(
                "channel link cycle detected at {address:#x}"
            )));
        }

        let block = ChannelBlock::from_bytes(&bytes)?;
        let name = read_string_block(reader, block.name_addr)?.unwrap_or_default();
        let components = Self::read_components(reader, block.component_addr, visited)?;

        Ok(Some(Self {
            block,
            name,
            components,
            position: Some(address),
        }))
    }

    fn read_components<R: Read + Seek>(
        reader: &mut R,
        address: u64,
        visited: &mut HashSet<u64>,
    ) -> Result<Vec<Component>> {
        let Some(id) = peek_block_id(reader, address)? else {
            return Ok(Vec::new());
        };
        let components = match id.as_str() {
            "##CN" => Self::read_chain_inner(reader, address, visited)?
                .into_iter()
                .map(Component::Channel)
                .collect(),
            "##CA" => vec![Component::Array { address }],
            _ => {
                warn!(address, id = %id, "unexpected composition block");
                vec![Component::Other { id, address }]
            }
        };
        Ok(components)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn channel_type(&self) -> ChannelType {
        ChannelType::from_u8(self.block.channel_type)
    }

    pub fn set_channel_type(&mut self, channel_type: ChannelType) {
        self.block.channel_type = channel_type.to_u8();
    }

    pub fn data_type(&self) -> DataType {
        self.block.data_type
    }

    pub fn flags(&self) -> u32 {
        self.block.flags
    }

    pub fn set_flags(&mut self, flags: u32) {
        self.block.flags = flags;
    }

    /// True when the channel owns a bit in the record's invalidation bytes.
    pub fn is_invalid_capable(&self) -> bool {
        self.block.flags & CN_FLAG_INVALIDATION_BIT_VALID != 0
    }

    pub fn byte_offset(&self) -> u32 {
        self.block.byte_offset
    }

    pub fn bit_count(&self) -> u32 {
        self.block.bit_count
    }

    pub fn invalid_bit_position(&self) -> u32 {
        self.block.pos_invalidation_bit
    }

    /// Value of the `data` link: signal data, VLSD group or length channel.
    pub fn data_link(&self) -> u64 {
        self.block.data_addr
    }

    /// The `[data group, channel group, channel]` X-axis triple, if any.
    pub fn x_axis(&self) -> Option<[u64; 3]> {
        self.block.default_x
    }

    pub fn set_x_axis(&mut self, x_axis: Option<[u64; 3]>) {
        self.block.default_x = x_axis;
    }

    pub fn block(&self) -> &ChannelBlock {
        &self.block
    }

    /// File position of the channel block, 0 while unwritten.
    pub fn index(&self) -> u64 {
        self.position.unwrap_or(0)
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// Appends a nested channel to this channel's composition.
    pub fn add_component(&mut self, channel: Channel) -> &mut Channel {
        self.components.push(Component::Channel(channel));
        match self.components.last_mut() {
            Some(Component::Channel(channel)) => channel,
            _ => unreachable!("component was just pushed"),
        }
    }

    /// Number of bytes the channel occupies in a record.
    pub fn data_bytes(&self) -> u32 {
        if self.channel_type().is_virtual() {
            return 0;
        }
        let bits = u64::from(self.block.bit_offset) + u64::from(self.block.bit_count);
        // at most (2^32 + 254) / 8, always below u32::MAX
        bits.div_ceil(8) as u32
    }

    /// Places the channel at `byte_offset` in the record.
    pub fn prepare_for_writing(&mut self, byte_offset: u32) {
        self.block.byte_offset = byte_offset;
    }

    /// Assigns the channel's bit in the invalidation bytes.
    pub fn set_invalid_offset(&mut self, bit: u32) {
        self.block.pos_invalidation_bit = bit;
    }

    /// Points the `data` link at `address`, patching the written block in
    /// place when the channel is already in the file.
    pub fn update_data_link<W: MdfWrite + ?Sized>(
        &mut self,
        writer: &mut W,
        address: u64,
    ) -> Result<()> {
        if let Some(position) = self.position {
            writer.patch_u64(position + ChannelBlock::DATA_LINK_OFFSET, address)?;
        }
        self.block.data_addr = address;
        Ok(())
    }

    /// This channel followed by the depth-first expansion of its nested
    /// channels, in declaration order.
    pub fn flatten(&self) -> Vec<&Channel> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }

    pub(crate) fn flatten_into<'a>(&'a self, out: &mut Vec<&'a Channel>) {
        out.push(self);
        for component in &self.components {
            if let Component::Channel(child) = component {
                child.flatten_into(out);
            }
        }
    }

    /// Visits this channel and every nested channel in flattening order.
    pub(crate) fn visit_flattened_mut<F>(&mut self, f: &mut F) -> Result<()>
    where
        F: FnMut(&mut Channel) -> Result<()>,
    {
        f(self)?;
        for component in &mut self.components {
            if let Component::Channel(child) = component {
                child.visit_flattened_mut(f)?;
            }
        }
        Ok(())
    }
}

impl LinkedBlock for Channel {
    const NEXT_LINK_OFFSET: u64 = ChannelBlock::NEXT_LINK_OFFSET;

    fn file_position(&self) -> Option<u64> {
        self.position
    }

    fn next_link(&self) -> u64 {
        self.block.next_ch_addr
    }

    fn set_next_link(&mut self, address: u64) {
        self.block.next_ch_addr = address;
    }

    fn write_once<W: MdfWrite + ?Sized>(&mut self, writer: &mut W) -> Result<u64> {
        if let Some(position) = self.position {
            return Ok(position);
        }

        if self.block.name_addr == 0 && !self.name.is_empty() {
            self.block.name_addr = writer.write_block(&TextBlock::new(&self.name).to_bytes()?)?;
        }

        let first_nested = write_link_list(
            writer,
            self.components.iter_mut().filter_map(|c| match c {
                Component::Channel(channel) => Some(channel),
                _ => None,
            }),
        )?;
        self.block.component_addr = if first_nested != 0 {
            first_nested
        } else {
            self.components.first().map_or(0, Component::address)
        };

        let position = writer.write_block(&self.block.to_bytes()?)?;
        debug!(position, name = %self.name, "wrote channel block");
        self.position = Some(position);
        Ok(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::VecWriter;
    use std::io::Cursor;

    fn fixed(name: &str) -> Channel {
        Channel::new(name, ChannelType::FixedLength, DataType::UnsignedIntegerLE, 8)
    }

    #[test]
    fn flatten_is_depth_first() {
        let mut root = fixed("root");
        root.add_component(fixed("a"));
        let b = root.add_component(fixed("b"));
        b.add_component(fixed("b.x"));

        let names: Vec<_> = root.flatten().iter().map(|c| c.name()).collect();
        assert_eq!(names, ["root", "a", "b", "b.x"]);
    }

    #[test]
    fn flatten_skips_array_components() {
        let mut root = fixed("root");
        root.components.push(Component::Array { address: 0x40 });
        root.add_component(fixed("a"));
        assert_eq!(root.flatten().len(), 2);
    }

    #[test]
    fn data_bytes_round_up() {
        let mut ch = Channel::new("bits", ChannelType::FixedLength, DataType::UnsignedIntegerLE, 12);
        assert_eq!(ch.data_bytes(), 2);
        ch.block.bit_offset = 5;
        assert_eq!(ch.data_bytes(), 3);
        ch.set_channel_type(ChannelType::VirtualMaster);
        assert_eq!(ch.data_bytes(), 0);
    }

    #[test]
    fn nested_channels_roundtrip() -> Result<()> {
        let mut root = fixed("frame");
        let payload = root.add_component(fixed("frame.payload"));
        payload.add_component(fixed("frame.payload.len"));
        root.add_component(fixed("frame.crc"));

        let mut w = VecWriter::new();
        w.write_block(&[0u8; 8])?;
        let position = root.write_once(&mut w)?;

        let mut cursor = Cursor::new(w.into_inner());
        let parsed = Channel::read(&mut cursor, position)?.expect("channel");
        let names: Vec<_> = parsed.flatten().iter().map(|c| c.name().to_string()).collect();
        assert_eq!(
            names,
            ["frame", "frame.payload", "frame.payload.len", "frame.crc"]
        );
        Ok(())
    }

    #[test]
    fn non_channel_address_reads_as_none() -> Result<()> {
        let mut w = VecWriter::new();
        w.write_block(&[0u8; 8])?;
        let tx = w.write_block(&TextBlock::new("not a channel").to_bytes()?)?;
        let mut cursor = Cursor::new(w.into_inner());
        assert!(Channel::read(&mut cursor, tx)?.is_none());
        assert!(Channel::read(&mut cursor, 0)?.is_none());
        Ok(())
    }

    #[test]
    fn data_link_is_patched_after_write() -> Result<()> {
        let mut ch = Channel::new("s", ChannelType::VariableLength, DataType::StringUtf8, 64);
        let mut w = VecWriter::new();
        let position = ch.write_once(&mut w)?;
        ch.update_data_link(&mut w, 0x1234)?;

        let mut cursor = Cursor::new(w.into_inner());
        let parsed = Channel::read(&mut cursor, position)?.expect("channel");
        assert_eq!(parsed.data_link(), 0x1234);
        Ok(())
    }
}
