// CGBLOCK read, first write and update-in-place
use std::collections::HashSet;
use std::io::{Read, Seek};

use tracing::{debug, trace};

use super::{BlockState, ChannelGroup, PatchField, PatchPoint};
use crate::{
    Error, Result,
    blocks::{
        BlockParse, ChannelGroupBlock, FIELD_CYCLES, FIELD_DATA_BYTES, FIELD_INVALID_BYTES,
        MetadataBlock, TextBlock, read_block_bytes, read_string_block,
    },
    channel::{Channel, ChannelType},
    sample_reduction::SampleReduction,
    source_info::SourceInformation,
    writer::{LinkedBlock, MdfWrite, write_link_list},
};

impl ChannelGroup {
    /// Read the CGBLOCK at `address`.
    ///
    /// Resolves the acquisition name, the source information and the
    /// comment. Channels and sample reductions are left unread; see
    /// [`Self::read_channels`] and [`Self::read_sample_reductions`].
    ///
    /// Returns `Ok(None)` when `address` is zero or does not point at a
    /// CGBLOCK.
    pub fn read<R: Read + Seek>(reader: &mut R, address: u64) -> Result<Option<Self>> {
        let Some(bytes) = read_block_bytes(reader, address)? else {
            return Ok(None);
        };
        if &bytes[0..4] != ChannelGroupBlock::ID.as_bytes() {
            debug!(address, "link does not point to a channel group block");
            return Ok(None);
        }
        let block = ChannelGroupBlock::from_bytes(&bytes)?;

        let mut group = Self::from_block(block);
        group.name = read_string_block(reader, group.block.acq_name_addr)?.unwrap_or_default();
        group.source_information = SourceInformation::read(reader, group.block.acq_source_addr)?;
        group.comment = read_comment(reader, group.block.comment_addr)?;
        group.position = Some(address);
        group.state = BlockState::Written;
        group.patch_points = group.compute_patch_points(address);

        debug!(
            address,
            record_id = group.block.record_id,
            samples = group.block.cycles_nr,
            flags = group.block.flags,
            "read channel group"
        );
        Ok(Some(group))
    }

    /// Read the chain of channel groups starting at `address`.
    pub fn read_chain<R: Read + Seek>(reader: &mut R, address: u64) -> Result<Vec<Self>> {
        let mut groups = Vec::new();
        let mut visited = HashSet::new();
        let mut next = address;
        while next != 0 {
            if !visited.insert(next) {
                return Err(Error::BlockLinkError(format!(
                    "channel group link cycle detected at {next:#x}"
                )));
            }
            let Some(group) = Self::read(reader, next)? else {
                break;
            };
            next = group.block.next_cg_addr;
            groups.push(group);
        }
        Ok(groups)
    }

    /// Reads the channel list, including nested compositions.
    pub fn read_channels<R: Read + Seek>(&mut self, reader: &mut R) -> Result<()> {
        self.channels = Channel::read_chain(reader, self.block.first_ch_addr)?;
        Ok(())
    }

    pub fn read_sample_reductions<R: Read + Seek>(&mut self, reader: &mut R) -> Result<()> {
        self.sample_reductions =
            SampleReduction::read_chain(reader, self.block.first_sample_reduction_addr)?;
        Ok(())
    }

    /// Writes the channel group.
    ///
    /// The first call writes the owned blocks, the CGBLOCK itself and the
    /// VLSD/MLSD back-links, and records the patch points. Every later call
    /// only rewrites the sample count and, for VLSD groups, the data and
    /// invalidation byte counts in place.
    ///
    /// Returns the block length in bytes.
    pub fn write<W: MdfWrite + ?Sized>(&mut self, writer: &mut W) -> Result<usize> {
        match self.position {
            None => self.write_first(writer),
            Some(_) => self.write_update(writer),
        }
    }

    fn write_first<W: MdfWrite + ?Sized>(&mut self, writer: &mut W) -> Result<usize> {
        self.block.master_addr = self.is_remote_master().then_some(0);

        self.block.first_ch_addr = write_link_list(writer, self.channels.iter_mut())?;

        if self.block.acq_name_addr == 0 && !self.name.is_empty() {
            self.block.acq_name_addr =
                writer.write_block(&TextBlock::new(&self.name).to_bytes()?)?;
        }
        if let Some(si) = &mut self.source_information {
            self.block.acq_source_addr = si.write_once(writer)?;
        }
        self.block.first_sample_reduction_addr =
            write_link_list(writer, self.sample_reductions.iter_mut())?;
        if self.block.comment_addr == 0 {
            if let Some(comment) = self.comment.as_deref().filter(|c| !c.is_empty()) {
                self.block.comment_addr =
                    writer.write_block(&MetadataBlock::group_comment(comment).to_bytes()?)?;
            }
        }

        let bytes = self.block.to_bytes()?;
        let position = writer.write_block(&bytes)?;
        self.block.header.length = bytes.len() as u64;
        self.block.header.link_count = self.block.link_count() as u64;
        self.position = Some(position);
        self.state = BlockState::Written;
        self.patch_points = self.compute_patch_points(position);
        debug!(
            position,
            record_id = self.block.record_id,
            length = bytes.len(),
            "wrote channel group block"
        );

        self.link_vlsd_channels(writer, position)?;
        self.link_max_length_channels(writer)?;

        Ok(bytes.len())
    }

    fn write_update<W: MdfWrite + ?Sized>(&mut self, writer: &mut W) -> Result<usize> {
        for point in &self.patch_points {
            if point.offset == 0 {
                continue;
            }
            trace!(offset = point.offset, field = ?point.field, "patching channel group field");
            match point.field {
                PatchField::SampleCount => writer.patch_u64(point.offset, self.block.cycles_nr)?,
                PatchField::DataBytes => {
                    writer.patch_u32(point.offset, self.block.samples_byte_nr)?
                }
                PatchField::InvalidBytes => {
                    writer.patch_u32(point.offset, self.block.invalidation_bytes_nr)?
                }
            }
        }
        self.state = BlockState::Updated;
        Ok(self.block.header.length as usize)
    }

    fn compute_patch_points(&self, position: u64) -> Vec<PatchPoint> {
        let data = position + 24 + 8 * self.block.header.link_count;
        let mut points = vec![PatchPoint {
            offset: data + FIELD_CYCLES,
            field: PatchField::SampleCount,
        }];
        if self.is_vlsd() {
            points.push(PatchPoint {
                offset: data + FIELD_DATA_BYTES,
                field: PatchField::DataBytes,
            });
            points.push(PatchPoint {
                offset: data + FIELD_INVALID_BYTES,
                field: PatchField::InvalidBytes,
            });
        }
        points
    }

    /// Points every variable-length channel at this group.
    fn link_vlsd_channels<W: MdfWrite + ?Sized>(
        &mut self,
        writer: &mut W,
        position: u64,
    ) -> Result<()> {
        if !self.is_vlsd() {
            return Ok(());
        }
        self.visit_flattened_mut(|channel| {
            if channel.channel_type() == ChannelType::VariableLength {
                trace!(channel = %channel.name(), position, "linking VLSD channel");
                channel.update_data_link(writer, position)?;
            }
            Ok(())
        })
    }

    /// Points every max-length channel at the `.DataLength` channel.
    fn link_max_length_channels<W: MdfWrite + ?Sized>(&mut self, writer: &mut W) -> Result<()> {
        let Some(length_position) = self.data_length_channel().map(Channel::index) else {
            return Ok(());
        };
        self.visit_flattened_mut(|channel| {
            if channel.channel_type() == ChannelType::MaxLength {
                trace!(channel = %channel.name(), length_position, "linking MLSD channel");
                channel.update_data_link(writer, length_position)?;
            }
            Ok(())
        })
    }

    /// Sets the `next` link, patching the written block in place.
    pub fn patch_next_link<W: MdfWrite + ?Sized>(
        &mut self,
        writer: &mut W,
        address: u64,
    ) -> Result<()> {
        if let Some(position) = self.position {
            writer.patch_u64(position + <Self as LinkedBlock>::NEXT_LINK_OFFSET, address)?;
        }
        self.block.next_cg_addr = address;
        Ok(())
    }
}

impl LinkedBlock for ChannelGroup {
    fn file_position(&self) -> Option<u64> {
        self.position
    }

    fn next_link(&self) -> u64 {
        self.block.next_cg_addr
    }

    fn set_next_link(&mut self, address: u64) {
        self.block.next_cg_addr = address;
    }

    fn write_once<W: MdfWrite + ?Sized>(&mut self, writer: &mut W) -> Result<u64> {
        if self.position.is_none() {
            self.write_first(writer)?;
        }
        Ok(self.index())
    }
}

/// Resolve a group comment stored as plain text or as XML metadata.
fn read_comment<R: Read + Seek>(reader: &mut R, address: u64) -> Result<Option<String>> {
    let Some(bytes) = read_block_bytes(reader, address)? else {
        return Ok(None);
    };
    match &bytes[0..4] {
        b"##TX" => Ok(Some(TextBlock::from_bytes(&bytes)?.text)),
        b"##MD" => Ok(Some(MetadataBlock::from_bytes(&bytes)?.text())),
        _ => {
            debug!(address, "comment link points to neither TX nor MD");
            Ok(None)
        }
    }
}
