use std::io::{Read, Seek};

use tracing::debug;

use crate::{
    Result,
    blocks::{
        BlockParse, BusType, MetadataBlock, SourceBlock, SourceType, TextBlock, read_block_bytes,
        read_string_block,
    },
    writer::MdfWrite,
};

/// Source information owned by a channel group: the SIBLOCK plus its
/// resolved name, path and comment.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInformation {
    block: SourceBlock,
    /// The source name (si_tx_name)
    pub name: Option<String>,
    /// The tool specific source path (si_tx_path)
    pub path: Option<String>,
    /// Extended comment (si_md_comment)
    pub comment: Option<String>,
    position: Option<u64>,
}

impl SourceInformation {
    pub fn new(source_type: SourceType, bus_type: BusType) -> Self {
        Self {
            block: SourceBlock::new(source_type, bus_type),
            name: None,
            path: None,
            comment: None,
            position: None,
        }
    }

    /// Read the SIBLOCK at `address` and resolve its text links.
    ///
    /// `Ok(None)` when `address` is zero or does not point at an SIBLOCK.
    pub fn read<R: Read + Seek>(reader: &mut R, address: u64) -> Result<Option<Self>> {
        let Some(bytes) = read_block_bytes(reader, address)? else {
            return Ok(None);
        };
        if &bytes[0..4] != SourceBlock::ID.as_bytes() {
            debug!(address, "source link does not point to an SI block");
            return Ok(None);
        }
        let block = SourceBlock::from_bytes(&bytes)?;
        Ok(Some(Self {
            name: read_string_block(reader, block.name_addr)?,
            path: read_string_block(reader, block.path_addr)?,
            comment: read_string_block(reader, block.comment_addr)?,
            block,
            position: Some(address),
        }))
    }

    pub fn source_type(&self) -> u8 {
        self.block.source_type
    }

    pub fn bus_type(&self) -> u8 {
        self.block.bus_type
    }

    pub fn set_simulated(&mut self, simulated: bool) {
        if simulated {
            self.block.flags |= 0x01;
        } else {
            self.block.flags &= !0x01;
        }
    }

    pub fn is_simulated(&self) -> bool {
        self.block.flags & 0x01 != 0
    }

    /// File position of the SIBLOCK, 0 while unwritten.
    pub fn index(&self) -> u64 {
        self.position.unwrap_or(0)
    }

    /// Writes the text children and the SIBLOCK unless already written.
    pub fn write_once<W: MdfWrite + ?Sized>(&mut self, writer: &mut W) -> Result<u64> {
        if let Some(position) = self.position {
            return Ok(position);
        }
        if let Some(name) = self.name.as_deref().filter(|n| !n.is_empty()) {
            self.block.name_addr = writer.write_block(&TextBlock::new(name).to_bytes()?)?;
        }
        if let Some(path) = self.path.as_deref().filter(|p| !p.is_empty()) {
            self.block.path_addr = writer.write_block(&TextBlock::new(path).to_bytes()?)?;
        }
        if let Some(comment) = self.comment.as_deref().filter(|c| !c.is_empty()) {
            self.block.comment_addr = writer.write_block(&MetadataBlock::new(comment).to_bytes()?)?;
        }
        let position = writer.write_block(&self.block.to_bytes()?)?;
        self.position = Some(position);
        Ok(position)
    }
}

impl Default for SourceInformation {
    fn default() -> Self {
        Self::new(SourceType::Other, BusType::None)
    }
}
