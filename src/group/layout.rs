// Record layout: byte offsets and invalidation bits of the channels
use tracing::debug;

use super::ChannelGroup;
use crate::{Error, Result};

/// Number of invalidation bytes needed for `bits` invalidation bits.
///
/// 0 bits need no bytes; otherwise the bits are rounded up to whole bytes.
pub const fn invalid_bytes_for_bits(bits: u32) -> u32 {
    bits.div_ceil(8)
}

impl ChannelGroup {
    /// Computes the record layout before a new file is written.
    ///
    /// Channels are packed in declaration order, each one starting where the
    /// previous one ended. Every invalidation-capable channel gets the next
    /// free invalidation bit. The scratch sample buffer is sized to one
    /// record.
    ///
    /// VLSD groups carry no fixed layout: both byte counts are reset to zero
    /// and the scratch buffer is cleared.
    ///
    /// Fails without touching the group when the record would not fit the
    /// 32-bit byte counts of the block.
    pub fn prepare_for_writing(&mut self) -> Result<()> {
        if self.is_vlsd() {
            self.block.samples_byte_nr = 0;
            self.block.invalidation_bytes_nr = 0;
            self.sample_buffer.clear();
            return Ok(());
        }

        let mut byte_offset: u32 = 0;
        let mut invalid_bits: u32 = 0;
        for channel in &self.channels {
            byte_offset = byte_offset
                .checked_add(channel.data_bytes())
                .ok_or_else(|| self.record_too_large(channel.name()))?;
            if channel.is_invalid_capable() {
                invalid_bits += 1;
            }
        }
        let invalid_bytes = invalid_bytes_for_bits(invalid_bits);
        let record_size = byte_offset
            .checked_add(invalid_bytes)
            .ok_or_else(|| self.record_too_large("invalidation bytes"))?;

        let mut offset = 0;
        let mut invalid_bit = 0;
        for channel in &mut self.channels {
            channel.prepare_for_writing(offset);
            offset += channel.data_bytes();
            if channel.is_invalid_capable() {
                channel.set_invalid_offset(invalid_bit);
                invalid_bit += 1;
            }
        }

        self.block.samples_byte_nr = byte_offset;
        self.block.invalidation_bytes_nr = invalid_bytes;

        let record_size = record_size as usize;
        if record_size > 0 {
            self.sample_buffer.resize(record_size, 0);
        } else {
            self.sample_buffer.clear();
        }
        debug!(
            record_id = self.block.record_id,
            data_bytes = self.block.samples_byte_nr,
            invalid_bytes = self.block.invalidation_bytes_nr,
            "prepared record layout"
        );
        Ok(())
    }

    fn record_too_large(&self, at: &str) -> Error {
        Error::BlockSerializationError(format!(
            "record of channel group {} exceeds {} bytes at {at:?}",
            self.block.record_id,
            u32::MAX
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Result,
        blocks::{CN_FLAG_INVALIDATION_BIT_VALID, DataType},
        channel::{Channel, ChannelType},
        group::CG_FLAG_VLSD,
    };

    fn channel(bits: u32, invalid: bool) -> Channel {
        let mut ch = Channel::new("c", ChannelType::FixedLength, DataType::UnsignedIntegerLE, bits);
        if invalid {
            ch.set_flags(CN_FLAG_INVALIDATION_BIT_VALID);
        }
        ch
    }

    #[test]
    fn invalid_byte_rounding() {
        assert_eq!(invalid_bytes_for_bits(0), 0);
        assert_eq!(invalid_bytes_for_bits(1), 1);
        assert_eq!(invalid_bytes_for_bits(8), 1);
        assert_eq!(invalid_bytes_for_bits(9), 2);
        assert_eq!(invalid_bytes_for_bits(16), 2);
        assert_eq!(invalid_bytes_for_bits(17), 3);
    }

    #[test]
    fn offsets_follow_declaration_order() -> Result<()> {
        let mut group = ChannelGroup::new(1, "layout");
        group.add_channel(channel(64, false))?;
        group.add_channel(channel(16, true))?;
        group.add_channel(channel(8, false))?;
        group.add_channel(channel(32, true))?;

        group.prepare_for_writing()?;

        let offsets: Vec<_> = group.channels().iter().map(|c| c.byte_offset()).collect();
        assert_eq!(offsets, [0, 8, 10, 11]);
        assert_eq!(group.channels()[1].invalid_bit_position(), 0);
        assert_eq!(group.channels()[3].invalid_bit_position(), 1);
        assert_eq!(group.data_bytes(), 15);
        assert_eq!(group.invalid_bytes(), 1);
        assert_eq!(group.sample_buffer().len(), 16);
        Ok(())
    }

    #[test]
    fn nine_invalid_channels_need_two_bytes() -> Result<()> {
        let mut group = ChannelGroup::new(1, "invalid");
        for _ in 0..9 {
            group.add_channel(channel(8, true))?;
        }
        group.prepare_for_writing()?;
        assert_eq!(group.data_bytes(), 9);
        assert_eq!(group.invalid_bytes(), 2);
        Ok(())
    }

    #[test]
    fn vlsd_group_has_no_layout() -> Result<()> {
        let mut group = ChannelGroup::new(2, "vlsd");
        group.add_channel(channel(64, true))?;
        group.prepare_for_writing()?;
        assert_eq!(group.sample_buffer().len(), 9);

        group.set_flags(CG_FLAG_VLSD);
        group.prepare_for_writing()?;
        assert_eq!(group.data_bytes(), 0);
        assert_eq!(group.invalid_bytes(), 0);
        assert!(group.sample_buffer().is_empty());
        Ok(())
    }

    #[test]
    fn empty_group_has_empty_buffer() -> Result<()> {
        let mut group = ChannelGroup::default();
        group.prepare_for_writing()?;
        assert_eq!(group.data_bytes(), 0);
        assert!(group.sample_buffer().is_empty());
        Ok(())
    }

    #[test]
    fn oversized_record_is_rejected() -> Result<()> {
        let mut group = ChannelGroup::new(3, "huge");
        group.add_channel(channel(8, false))?;
        group.prepare_for_writing()?;

        // each channel takes 2^29 bytes
        for i in 0..8 {
            group.add_channel(channel(u32::MAX, i == 0))?;
        }
        assert!(matches!(
            group.prepare_for_writing(),
            Err(Error::BlockSerializationError(_))
        ));
        // the previous layout is kept
        assert_eq!(group.data_bytes(), 1);
        assert_eq!(group.channels()[1].byte_offset(), 0);
        assert_eq!(group.sample_buffer().len(), 1);
        Ok(())
    }

    #[test]
    fn invalidation_bytes_can_overflow_the_record() -> Result<()> {
        let mut group = ChannelGroup::new(4, "edge");
        for _ in 0..7 {
            group.add_channel(channel(u32::MAX, false))?;
        }
        // data bytes reach exactly u32::MAX, leaving no room for the
        // invalidation byte
        group.add_channel(channel(u32::MAX - 7, true))?;
        assert!(group.prepare_for_writing().is_err());
        assert_eq!(group.data_bytes(), 0);
        Ok(())
    }
}
