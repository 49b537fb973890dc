//! Record index of a channel group.
//!
//! A [`RecordIndex`] stores the file offset of every record of one channel
//! group so single samples can be read later without walking the record
//! stream again. It is built with the counting pass of
//! [`ChannelGroup::update_cycle_counter`] and can be saved as JSON.
//!
//! ```no_run
//! use mdf4_cg::{ChannelGroup, RecordIndex, Result};
//! use std::fs::File;
//!
//! fn index_records(address: u64, start: u64, end: u64) -> Result<()> {
//!     let mut file = File::open("recording.mf4")?;
//!     let Some(mut group) = ChannelGroup::read(&mut file, address)? else {
//!         return Ok(());
//!     };
//!
//!     let index = RecordIndex::build(&mut group, &mut file, start, end)?;
//!     index.save_to_file("recording.index")?;
//!
//!     let index = RecordIndex::load_from_file("recording.index")?;
//!     println!("{} records", index.len());
//!     Ok(())
//! }
//! ```

use std::io::{Read, Seek, SeekFrom};

use tracing::debug;

use crate::{ChannelGroup, Error, Result};

/// File offsets of the records of one channel group.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RecordIndex {
    /// Record id of the indexed group
    pub record_id: u64,
    /// Whether the records are length-prefixed VLSD records
    pub vlsd: bool,
    /// Absolute file offset of each record, in stream order
    pub offsets: Vec<u64>,
}

impl RecordIndex {
    /// Indexes the records stored in `[start, end)`.
    ///
    /// The range must hold records of `group` only, without record id
    /// prefixes. The group's sample count is recounted from the stream.
    pub fn build<R: Read + Seek>(
        group: &mut ChannelGroup,
        reader: &mut R,
        start: u64,
        end: u64,
    ) -> Result<Self> {
        if end < start {
            return Err(Error::BlockSerializationError(format!(
                "record range end {end:#x} lies before its start {start:#x}"
            )));
        }
        if !group.is_vlsd() && group.record_size() == 0 {
            return Err(Error::BlockSerializationError(format!(
                "records of channel group {} are empty and cannot be indexed",
                group.record_id()
            )));
        }
        group.set_nof_samples(0);
        let mut offsets = Vec::new();
        let mut position = reader.seek(SeekFrom::Start(start))?;
        while position < end {
            let consumed = group.update_cycle_counter(reader)?;
            if consumed == 0 {
                break;
            }
            offsets.push(position);
            position += consumed;
        }
        debug!(
            record_id = group.record_id(),
            records = offsets.len(),
            "built record index"
        );
        Ok(Self {
            record_id: group.record_id(),
            vlsd: group.is_vlsd(),
            offsets,
        })
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// File offset of record `sample`.
    pub fn offset(&self, sample: u64) -> Option<u64> {
        usize::try_from(sample)
            .ok()
            .and_then(|i| self.offsets.get(i).copied())
    }

    /// Seeks `reader` to record `sample`.
    ///
    /// Returns false and leaves the reader untouched when the sample is out
    /// of range.
    pub fn seek_to<R: Seek>(&self, reader: &mut R, sample: u64) -> Result<bool> {
        match self.offset(sample) {
            Some(offset) => {
                reader.seek(SeekFrom::Start(offset))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Save the index as pretty-printed JSON.
    ///
    /// Requires the `serde` feature.
    #[cfg(feature = "serde")]
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(|e| {
            Error::BlockSerializationError(format!("JSON serialization failed: {}", e))
        })?;

        std::fs::write(path, json).map_err(Error::IOError)?;

        Ok(())
    }

    /// Load an index saved by [`Self::save_to_file`].
    ///
    /// Requires the `serde` feature.
    #[cfg(feature = "serde")]
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(Error::IOError)?;

        let index: RecordIndex = serde_json::from_str(&json).map_err(|e| {
            Error::BlockSerializationError(format!("JSON deserialization failed: {}", e))
        })?;

        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CG_FLAG_VLSD, Channel, ChannelType, DataType};
    use std::io::Cursor;

    #[test]
    fn fixed_records_are_evenly_spaced() -> Result<()> {
        let mut group = ChannelGroup::new(1, "fixed");
        group.add_channel(Channel::new(
            "v",
            ChannelType::FixedLength,
            DataType::UnsignedIntegerLE,
            32,
        ))?;
        group.prepare_for_writing()?;

        let mut cursor = Cursor::new(vec![0u8; 16 + 12]);
        let index = RecordIndex::build(&mut group, &mut cursor, 16, 28)?;
        assert_eq!(index.offsets, [16, 20, 24]);
        assert_eq!(group.nof_samples(), 3);
        assert!(!index.vlsd);
        Ok(())
    }

    #[test]
    fn vlsd_records_follow_length_prefixes() -> Result<()> {
        let mut group = ChannelGroup::new(2, "vlsd");
        group.set_flags(CG_FLAG_VLSD);

        let mut bytes = Vec::new();
        for payload in [&b"ab"[..], b"", b"xyz"] {
            bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            bytes.extend_from_slice(payload);
        }
        let end = bytes.len() as u64;
        let mut cursor = Cursor::new(bytes);

        let index = RecordIndex::build(&mut group, &mut cursor, 0, end)?;
        assert_eq!(index.offsets, [0, 6, 10]);
        assert_eq!(index.len(), 3);

        assert!(index.seek_to(&mut cursor, 2)?);
        assert_eq!(cursor.position(), 10);
        assert!(!index.seek_to(&mut cursor, 3)?);
        assert_eq!(cursor.position(), 10);
        Ok(())
    }

    #[test]
    fn empty_range_yields_empty_index() -> Result<()> {
        let mut group = ChannelGroup::new(1, "g");
        group.set_flags(CG_FLAG_VLSD);
        let mut cursor = Cursor::new(Vec::new());
        let index = RecordIndex::build(&mut group, &mut cursor, 0, 0)?;
        assert!(index.is_empty());
        assert!(RecordIndex::build(&mut group, &mut cursor, 8, 0).is_err());
        Ok(())
    }

    #[test]
    fn empty_fixed_records_are_not_indexed() -> Result<()> {
        let mut group = ChannelGroup::new(5, "virtual");
        group.add_channel(Channel::new(
            "t",
            ChannelType::VirtualMaster,
            DataType::UnsignedIntegerLE,
            64,
        ))?;
        group.prepare_for_writing()?;
        group.set_nof_samples(3);

        let mut cursor = Cursor::new(vec![0u8; 16]);
        assert!(matches!(
            RecordIndex::build(&mut group, &mut cursor, 0, 16),
            Err(Error::BlockSerializationError(_))
        ));
        assert_eq!(group.nof_samples(), 3);
        Ok(())
    }
}
