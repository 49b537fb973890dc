// src/blocks/mod.rs

// ============================================================================
// Block Size Constants (internal use only)
// ============================================================================
// Fixed sizes for the MDF 4.x blocks handled here. Text-like blocks (TX, MD)
// and channel blocks with attachments or an X-axis triple are sized from
// their contents.

/// Channel group block size (104 bytes) with the six standard links.
pub(crate) const CG_BLOCK_SIZE: usize = 104;

/// Channel group block size (112 bytes) with the remote-master link slot.
pub(crate) const CG_MASTER_BLOCK_SIZE: usize = 112;

/// Source block size (56 bytes) - describes data acquisition source.
pub(crate) const SI_BLOCK_SIZE: usize = 56;

/// Sample reduction block size (64 bytes).
pub(crate) const SR_BLOCK_SIZE: usize = 64;

// ============================================================================
// Submodules
// ============================================================================

mod channel_block;
mod channel_group_block;
mod common;
mod metadata_block;
mod sample_reduction_block;
mod source_block;
mod text_block;

pub use common::{BlockHeader, BlockParse, DataType};
pub(crate) use common::{
    peek_block_id, read_block_bytes, read_counted, read_exact_checked, read_string_block,
};

pub use channel_block::{CN_FLAG_DEFAULT_X, CN_FLAG_INVALIDATION_BIT_VALID, ChannelBlock};
pub use channel_group_block::ChannelGroupBlock;
pub(crate) use channel_group_block::{FIELD_CYCLES, FIELD_DATA_BYTES, FIELD_INVALID_BYTES};
pub use metadata_block::MetadataBlock;
pub use sample_reduction_block::SampleReductionBlock;
pub use source_block::{BusType, SourceBlock, SourceType};
pub use text_block::TextBlock;
