use std::collections::HashSet;
use std::io::{Read, Seek};

use crate::{
    Error, Result,
    blocks::{BlockParse, SampleReductionBlock, read_block_bytes},
    writer::{LinkedBlock, MdfWrite},
};

/// A sample reduction owned by a channel group.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleReduction {
    pub block: SampleReductionBlock,
    position: Option<u64>,
}

impl SampleReduction {
    pub fn new(block: SampleReductionBlock) -> Self {
        Self {
            block,
            position: None,
        }
    }

    /// Read the chain of SRBLOCKs starting at `address`.
    ///
    /// The chain ends at a zero link or at a block of another type.
    pub fn read_chain<R: Read + Seek>(reader: &mut R, address: u64) -> Result<Vec<Self>> {
        let mut list = Vec::new();
        let mut visited = HashSet::new();
        let mut next = address;
        while let Some(bytes) = read_block_bytes(reader, next)? {
            if &bytes[0..4] != SampleReductionBlock::ID.as_bytes() {
                break;
            }
            if !visited.insert(next) {
                return Err(Error::BlockLinkError(format!(
                    "sample reduction link cycle detected at {next:#x}"
                )));
            }
            let block = SampleReductionBlock::from_bytes(&bytes)?;
            let position = next;
            next = block.next_sr_addr;
            list.push(Self {
                block,
                position: Some(position),
            });
        }
        Ok(list)
    }

    /// File position of the SRBLOCK, 0 while unwritten.
    pub fn index(&self) -> u64 {
        self.position.unwrap_or(0)
    }
}

impl LinkedBlock for SampleReduction {
    fn file_position(&self) -> Option<u64> {
        self.position
    }

    fn next_link(&self) -> u64 {
        self.block.next_sr_addr
    }

    fn set_next_link(&mut self, address: u64) {
        self.block.next_sr_addr = address;
    }

    fn write_once<W: MdfWrite + ?Sized>(&mut self, writer: &mut W) -> Result<u64> {
        if let Some(position) = self.position {
            return Ok(position);
        }
        let position = writer.write_block(&self.block.to_bytes()?)?;
        self.position = Some(position);
        Ok(position)
    }
}
