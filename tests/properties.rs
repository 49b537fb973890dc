use mdf4_cg::blocks::CN_FLAG_INVALIDATION_BIT_VALID;
use mdf4_cg::{
    CG_FLAG_VLSD, Channel, ChannelGroup, ChannelType, DataType, VecWriter, invalid_bytes_for_bits,
};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use std::io::Cursor;

fn fail(e: mdf4_cg::Error) -> TestCaseError {
    TestCaseError::fail(e.to_string())
}

proptest! {
    /// Invalidation bytes are the bit count rounded up to whole bytes.
    #[test]
    fn invalid_bytes_round_up(bits in 0u32..10_000) {
        let bytes = invalid_bytes_for_bits(bits);
        prop_assert!(bytes * 8 >= bits);
        prop_assert!(bits == 0 || bytes * 8 < bits + 8);
        prop_assert_eq!(bits == 0, bytes == 0);
    }

    /// Packed channels never overlap and the record holds all of them.
    #[test]
    fn layout_packs_channels(
        channels in prop::collection::vec((1u32..=64, any::<bool>()), 0..40)
    ) {
        let mut group = ChannelGroup::new(1, "prop");
        for (i, (bits, invalid)) in channels.iter().enumerate() {
            let channel = group
                .add_channel(Channel::new(
                    &format!("c{i}"),
                    ChannelType::FixedLength,
                    DataType::UnsignedIntegerLE,
                    *bits,
                ))
                .map_err(fail)?;
            if *invalid {
                channel.set_flags(CN_FLAG_INVALIDATION_BIT_VALID);
            }
        }
        group.prepare_for_writing().map_err(fail)?;

        let mut next_offset = 0;
        let mut next_bit = 0;
        for channel in group.channels() {
            prop_assert_eq!(channel.byte_offset(), next_offset);
            next_offset += channel.bit_count().div_ceil(8);
            if channel.is_invalid_capable() {
                prop_assert_eq!(channel.invalid_bit_position(), next_bit);
                next_bit += 1;
            }
        }
        prop_assert_eq!(group.data_bytes(), next_offset);
        prop_assert_eq!(group.invalid_bytes(), invalid_bytes_for_bits(next_bit));
        prop_assert_eq!(
            group.sample_buffer().len() as u32,
            group.data_bytes() + group.invalid_bytes()
        );
    }

    /// The accumulated VLSD size equals the sum of prefix plus payload
    /// lengths, and its halves land in the data and invalidation counts.
    #[test]
    fn vlsd_size_is_sum_of_records(
        lengths in prop::collection::vec(0usize..300, 0..50),
        start in any::<u64>().prop_map(|v| v >> 8)
    ) {
        let mut writer = VecWriter::new();
        let mut group = ChannelGroup::new(2, "vlsd");
        group.set_flags(CG_FLAG_VLSD);
        for len in &lengths {
            group.append_vlsd_record(&mut writer, &vec![0xA5; *len]).map_err(fail)?;
        }

        let mut reread = ChannelGroup::new(2, "vlsd");
        reread.set_flags(CG_FLAG_VLSD);
        reread.set_vlsd_size(start);
        let mut cursor = Cursor::new(writer.into_inner());
        while reread.update_vlsd_size(&mut cursor).map_err(fail)? > 0 {}

        let expected: u64 = lengths.iter().map(|l| 4 + *l as u64).sum();
        prop_assert_eq!(group.vlsd_size(), expected);
        prop_assert_eq!(reread.vlsd_size(), start + expected);
        prop_assert_eq!(reread.nof_samples(), lengths.len() as u64);
        prop_assert_eq!(u64::from(reread.data_bytes()), (start + expected) & 0xFFFF_FFFF);
        prop_assert_eq!(u64::from(reread.invalid_bytes()), (start + expected) >> 32);
    }
}
