//! The channel group: record layout authority of a data group.
//!
//! A [`ChannelGroup`] owns the channels recorded together in one record
//! type, its optional source information, sample reductions and comment.
//! It computes the record layout ([`ChannelGroup::prepare_for_writing`]),
//! reads and writes the CGBLOCK with deferred patch-backs, and walks the
//! record stream for decoding, counting and VLSD size accounting.

mod io;
mod layout;
mod records;

pub use layout::invalid_bytes_for_bits;
pub use records::{PayloadPolicy, step_vlsd_record};

use crate::{
    Error, Result,
    blocks::{BusType, ChannelGroupBlock, DataType, SampleReductionBlock, SourceType},
    channel::{Channel, ChannelType},
    sample_reduction::SampleReduction,
    source_info::SourceInformation,
};

/// Records are length-prefixed blobs instead of a fixed layout.
pub const CG_FLAG_VLSD: u16 = 0x0001;
/// The group stores bus events.
pub const CG_FLAG_BUS_EVENT: u16 = 0x0002;
/// Bus events are stored as plain records.
pub const CG_FLAG_PLAIN_RECORD: u16 = 0x0004;
/// The master channel lives in another group; adds a seventh link slot.
pub const CG_FLAG_REMOTE_MASTER: u16 = 0x0008;

/// Name suffix of the channel carrying the length of max-length channels.
pub const DATA_LENGTH_SUFFIX: &str = ".DataLength";

/// Write state of a channel group block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    /// No file position assigned yet.
    Unwritten,
    /// Written once; patch points recorded.
    Written,
    /// Patch points rewritten in place at least once.
    Updated,
}

/// Field overwritten by a patch-back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchField {
    /// `cycles_nr`, 8 bytes.
    SampleCount,
    /// `samples_byte_nr`, 4 bytes (low half of the VLSD size).
    DataBytes,
    /// `invalidation_bytes_nr`, 4 bytes (high half of the VLSD size).
    InvalidBytes,
}

/// Absolute file offset of a field rewritten once its final value is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchPoint {
    pub offset: u64,
    pub field: PatchField,
}

/// A block owned by a channel group, as returned by
/// [`ChannelGroup::find_block`].
#[derive(Debug, Clone, Copy)]
pub enum BlockRef<'a> {
    ChannelGroup(&'a ChannelGroup),
    Channel(&'a Channel),
    SourceInformation(&'a SourceInformation),
    SampleReduction(&'a SampleReduction),
}

/// One record type of a data group.
#[derive(Debug, Clone)]
pub struct ChannelGroup {
    pub(crate) block: ChannelGroupBlock,
    name: String,
    comment: Option<String>,
    channels: Vec<Channel>,
    sample_reductions: Vec<SampleReduction>,
    source_information: Option<SourceInformation>,
    position: Option<u64>,
    state: BlockState,
    patch_points: Vec<PatchPoint>,
    sample: u64,
    sample_buffer: Vec<u8>,
}

impl Default for ChannelGroup {
    fn default() -> Self {
        Self::from_block(ChannelGroupBlock::default())
    }
}

impl ChannelGroup {
    /// Creates an empty, unwritten channel group.
    pub fn new(record_id: u64, name: &str) -> Self {
        let mut group = Self::default();
        group.block.record_id = record_id;
        group.name = name.to_string();
        group
    }

    pub(crate) fn from_block(block: ChannelGroupBlock) -> Self {
        Self {
            block,
            name: String::new(),
            comment: None,
            channels: Vec::new(),
            sample_reductions: Vec::new(),
            source_information: None,
            position: None,
            state: BlockState::Unwritten,
            patch_points: Vec::new(),
            sample: 0,
            sample_buffer: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------

    /// File position of the CGBLOCK, 0 while unwritten. X-axis links refer
    /// to a group by this value.
    pub fn index(&self) -> u64 {
        self.position.unwrap_or(0)
    }

    pub fn state(&self) -> BlockState {
        self.state
    }

    pub fn block(&self) -> &ChannelGroupBlock {
        &self.block
    }

    /// Acquisition name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn set_comment(&mut self, comment: &str) {
        self.comment = Some(comment.to_string());
    }

    pub fn record_id(&self) -> u64 {
        self.block.record_id
    }

    pub fn set_record_id(&mut self, record_id: u64) {
        self.block.record_id = record_id;
    }

    pub fn nof_samples(&self) -> u64 {
        self.block.cycles_nr
    }

    pub fn set_nof_samples(&mut self, nof_samples: u64) {
        self.block.cycles_nr = nof_samples;
    }

    pub fn flags(&self) -> u16 {
        self.block.flags
    }

    /// Sets the flag bits. The remote-master bit only affects the link
    /// count before the first write.
    pub fn set_flags(&mut self, flags: u16) {
        self.block.flags = flags;
    }

    pub fn is_vlsd(&self) -> bool {
        self.block.flags & CG_FLAG_VLSD != 0
    }

    pub fn is_remote_master(&self) -> bool {
        self.block.flags & CG_FLAG_REMOTE_MASTER != 0
    }

    /// Short comma separated description of the set flags, e.g.
    /// `"VLSD,Bus Event"`.
    pub fn flags_description(&self) -> String {
        [
            (CG_FLAG_VLSD, "VLSD"),
            (CG_FLAG_BUS_EVENT, "Bus Event"),
            (CG_FLAG_PLAIN_RECORD, "Plain"),
            (CG_FLAG_REMOTE_MASTER, "Remote Master"),
        ]
        .iter()
        .filter(|(bit, _)| self.block.flags & bit != 0)
        .map(|(_, text)| *text)
        .collect::<Vec<_>>()
        .join(",")
    }

    /// Raw UTF-16 code unit used to join hierarchical channel names.
    pub fn path_separator(&self) -> u16 {
        self.block.path_separator
    }

    pub fn set_path_separator(&mut self, separator: u16) {
        self.block.path_separator = separator;
    }

    /// The path separator as a `char`; `None` when unset or not a scalar
    /// value.
    pub fn path_separator_char(&self) -> Option<char> {
        match self.block.path_separator {
            0 => None,
            unit => char::from_u32(u32::from(unit)),
        }
    }

    /// Payload bytes per record (low half of the VLSD size for VLSD groups).
    pub fn data_bytes(&self) -> u32 {
        self.block.samples_byte_nr
    }

    /// Invalidation bytes per record (high half of the VLSD size for VLSD
    /// groups).
    pub fn invalid_bytes(&self) -> u32 {
        self.block.invalidation_bytes_nr
    }

    /// Total VLSD storage size: `invalid_bytes << 32 | data_bytes`.
    pub fn vlsd_size(&self) -> u64 {
        (u64::from(self.block.invalidation_bytes_nr) << 32)
            | u64::from(self.block.samples_byte_nr)
    }

    pub fn set_vlsd_size(&mut self, size: u64) {
        self.block.samples_byte_nr = (size & 0xFFFF_FFFF) as u32;
        self.block.invalidation_bytes_nr = (size >> 32) as u32;
    }

    /// Patch points recorded by the first write.
    pub fn patch_points(&self) -> &[PatchPoint] {
        &self.patch_points
    }

    /// Scratch buffer holding one fixed-size record.
    pub fn sample_buffer(&self) -> &[u8] {
        &self.sample_buffer
    }

    pub fn sample_buffer_mut(&mut self) -> &mut [u8] {
        &mut self.sample_buffer
    }

    /// Index of the next sample the decoder will report.
    pub fn sample(&self) -> u64 {
        self.sample
    }

    pub fn reset_sample(&mut self) {
        self.sample = 0;
    }

    // ------------------------------------------------------------------
    // Owned blocks
    // ------------------------------------------------------------------

    /// Direct channels, in declaration order. Nested composition channels
    /// are not included; see [`Self::flattened_channels`].
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Adds a channel. Channels can only be added before the first write.
    pub fn add_channel(&mut self, channel: Channel) -> Result<&mut Channel> {
        if self.position.is_some() {
            return Err(Error::BlockLinkError(format!(
                "channel group at {:#x} is already written; cannot add channel {:?}",
                self.index(),
                channel.name()
            )));
        }
        self.channels.push(channel);
        let last = self.channels.len() - 1;
        Ok(&mut self.channels[last])
    }

    /// Adds an unnamed fixed-length channel and returns it for configuration.
    pub fn create_channel(&mut self) -> Result<&mut Channel> {
        self.add_channel(Channel::new(
            "",
            ChannelType::FixedLength,
            DataType::UnsignedIntegerLE,
            0,
        ))
    }

    pub fn source_information(&self) -> Option<&SourceInformation> {
        self.source_information.as_ref()
    }

    /// Replaces the source information with a fresh one and returns it.
    pub fn create_source_information(&mut self) -> &mut SourceInformation {
        self.source_information
            .insert(SourceInformation::new(SourceType::Other, BusType::None))
    }

    pub fn sample_reductions(&self) -> &[SampleReduction] {
        &self.sample_reductions
    }

    pub fn add_sample_reduction(&mut self, block: SampleReductionBlock) {
        self.sample_reductions.push(SampleReduction::new(block));
    }

    // ------------------------------------------------------------------
    // Composite flattening and lookups
    // ------------------------------------------------------------------

    /// Every channel of the group including nested compositions, depth
    /// first in declaration order.
    pub fn flattened_channels(&self) -> Vec<&Channel> {
        let mut out = Vec::with_capacity(self.channels.len());
        for channel in &self.channels {
            channel.flatten_into(&mut out);
        }
        out
    }

    pub(crate) fn visit_flattened_mut<F>(&mut self, mut f: F) -> Result<()>
    where
        F: FnMut(&mut Channel) -> Result<()>,
    {
        for channel in &mut self.channels {
            channel.visit_flattened_mut(&mut f)?;
        }
        Ok(())
    }

    /// First channel (nested ones included) with exactly this name.
    pub fn channel_by_name(&self, name: &str) -> Option<&Channel> {
        self.flattened_channels()
            .into_iter()
            .find(|c| c.name() == name)
    }

    /// The channel holding the length of max-length channels: the first
    /// channel whose name ends with `.DataLength`.
    pub fn data_length_channel(&self) -> Option<&Channel> {
        self.flattened_channels()
            .into_iter()
            .find(|c| c.name().ends_with(DATA_LENGTH_SUFFIX))
    }

    /// Channel (nested ones included) stored at file position `index`.
    pub fn find_channel(&self, index: u64) -> Option<&Channel> {
        if index == 0 {
            return None;
        }
        self.flattened_channels()
            .into_iter()
            .find(|c| c.index() == index)
    }

    /// Looks up any block owned by this group by its file position.
    pub fn find_block(&self, address: u64) -> Option<BlockRef<'_>> {
        if address == 0 {
            return None;
        }
        if self.position == Some(address) {
            return Some(BlockRef::ChannelGroup(self));
        }
        if let Some(si) = &self.source_information {
            if si.index() == address {
                return Some(BlockRef::SourceInformation(si));
            }
        }
        if let Some(channel) = self.find_channel(address) {
            return Some(BlockRef::Channel(channel));
        }
        self.sample_reductions
            .iter()
            .find(|sr| sr.index() == address)
            .map(BlockRef::SampleReduction)
    }

    /// Resolves the channel supplying the X axis of `reference`.
    ///
    /// A default X-axis triple pointing into this group wins; otherwise the
    /// first master or virtual master channel is returned.
    pub fn x_channel(&self, reference: &Channel) -> Option<&Channel> {
        if let Some([_, group, channel]) = reference.x_axis() {
            if group == self.index() && channel != 0 {
                if let Some(found) = self.channels.iter().find(|c| c.index() == channel) {
                    return Some(found);
                }
            }
        }
        self.channels
            .iter()
            .find(|c| c.channel_type().is_master())
    }
}
