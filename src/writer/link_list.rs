// Writing of linked block chains (CN -> CN, SR -> SR, CG -> CG)
use tracing::trace;

use super::MdfWrite;
use crate::Result;

/// A block that is stored in a singly linked chain through its `next` link.
///
/// Blocks are written at most once. Writing a chain again only writes the
/// members that have no file position yet and refreshes the `next` links
/// that changed.
pub trait LinkedBlock {
    /// Offset of the `next` link relative to the block start.
    const NEXT_LINK_OFFSET: u64 = 24;

    /// File position of the block, `None` until first written.
    fn file_position(&self) -> Option<u64>;

    /// Current value of the `next` link.
    fn next_link(&self) -> u64;

    /// Records a new `next` link value without touching the file.
    fn set_next_link(&mut self, address: u64);

    /// Writes the block if it has no file position yet and returns its
    /// position.
    fn write_once<W: MdfWrite + ?Sized>(&mut self, writer: &mut W) -> Result<u64>;
}

/// Writes every member of `blocks` that is not yet in the file and chains
/// them in iteration order.
///
/// Returns the position of the first block, or 0 for an empty chain.
pub fn write_link_list<'a, W, B, I>(writer: &mut W, blocks: I) -> Result<u64>
where
    W: MdfWrite + ?Sized,
    B: LinkedBlock + 'a,
    I: IntoIterator<Item = &'a mut B>,
{
    let mut first = 0;
    let mut prev: Option<&mut B> = None;
    for block in blocks {
        let position = block.write_once(writer)?;
        match prev.take() {
            None => first = position,
            Some(prev_block) => link_next(writer, prev_block, position)?,
        }
        prev = Some(block);
    }
    Ok(first)
}

fn link_next<W, B>(writer: &mut W, block: &mut B, next: u64) -> Result<()>
where
    W: MdfWrite + ?Sized,
    B: LinkedBlock,
{
    if block.next_link() == next {
        return Ok(());
    }
    if let Some(position) = block.file_position() {
        trace!(position, next, "patching next link");
        writer.patch_u64(position + B::NEXT_LINK_OFFSET, next)?;
    }
    block.set_next_link(next);
    Ok(())
}
