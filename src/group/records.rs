// Record stream passes: decode, skip, count and VLSD size accounting
use std::io::{Read, Seek, SeekFrom};

use tracing::{trace, warn};

use super::ChannelGroup;
use crate::{
    Error, Result,
    blocks::{read_counted, read_exact_checked},
    observer::SampleNotifier,
    writer::MdfWrite,
};

/// What a VLSD traversal does with the payload of each record.
#[derive(Debug)]
pub enum PayloadPolicy<'a> {
    /// Read the payload into the buffer, replacing its contents.
    Materialize(&'a mut Vec<u8>),
    /// Seek past the payload.
    Discard,
    /// Seek past the payload and add the consumed bytes (prefix included)
    /// to the counter.
    AccumulateSize(&'a mut u64),
}

/// Steps over one VLSD record at the current reader position.
///
/// Returns the number of bytes consumed (4 + payload length), or `None`
/// when the stream ends cleanly before a new record. A partial length
/// prefix or a short materialized payload is reported as
/// [`Error::TruncatedIo`].
pub fn step_vlsd_record<R: Read + Seek>(
    reader: &mut R,
    policy: PayloadPolicy<'_>,
) -> Result<Option<u64>> {
    let mut prefix = [0u8; 4];
    match read_counted(reader, &mut prefix)? {
        0 => return Ok(None),
        4 => {}
        actual => return Err(Error::TruncatedIo { expected: 4, actual }),
    }
    let length = u32::from_le_bytes(prefix);
    let consumed = 4 + u64::from(length);

    match policy {
        PayloadPolicy::Materialize(buffer) => {
            buffer.clear();
            buffer.resize(length as usize, 0);
            read_exact_checked(reader, buffer)?;
        }
        PayloadPolicy::Discard => {
            reader.seek(SeekFrom::Current(i64::from(length)))?;
        }
        PayloadPolicy::AccumulateSize(size) => {
            reader.seek(SeekFrom::Current(i64::from(length)))?;
            *size += consumed;
        }
    }
    trace!(length, "stepped VLSD record");
    Ok(Some(consumed))
}

impl ChannelGroup {
    pub(crate) fn record_size(&self) -> u64 {
        u64::from(self.block.samples_byte_nr) + u64::from(self.block.invalidation_bytes_nr)
    }

    /// Decodes the record at the current reader position and forwards it to
    /// `notifier`.
    ///
    /// VLSD groups consume a length prefix and its payload; fixed groups
    /// consume `data_bytes + invalid_bytes`. The observers are notified and
    /// the sample cursor advanced only while the cursor is below the sample
    /// count; records beyond it are consumed silently.
    ///
    /// Returns the bytes consumed, 0 at a clean end of stream. Groups whose
    /// channels are all virtual have empty records: every call consumes
    /// nothing and notifies until the sample count is reached.
    pub fn read_data_record<R: Read + Seek>(
        &mut self,
        reader: &mut R,
        notifier: &mut dyn SampleNotifier,
    ) -> Result<u64> {
        let consumed = if self.is_vlsd() {
            match step_vlsd_record(reader, PayloadPolicy::Materialize(&mut self.sample_buffer))? {
                Some(consumed) => consumed,
                None => return Ok(self.end_of_stream()),
            }
        } else {
            let size = self.record_size() as usize;
            self.sample_buffer.resize(size, 0);
            match read_counted(reader, &mut self.sample_buffer)? {
                _ if size == 0 => 0,
                0 => return Ok(self.end_of_stream()),
                actual if actual < size => {
                    return Err(Error::TruncatedIo {
                        expected: size,
                        actual,
                    });
                }
                _ => size as u64,
            }
        };

        if self.sample < self.block.cycles_nr {
            notifier.notify_sample_observers(
                self.sample,
                self.block.record_id,
                &self.sample_buffer,
            );
            self.sample += 1;
        }
        Ok(consumed)
    }

    fn end_of_stream(&self) -> u64 {
        if self.sample < self.block.cycles_nr {
            warn!(
                record_id = self.block.record_id,
                sample = self.sample,
                samples = self.block.cycles_nr,
                "record stream ended before the declared sample count"
            );
        }
        0
    }

    /// Skips the record at the current reader position without touching
    /// the sample cursor or count. Returns the bytes skipped.
    pub fn step_record<R: Read + Seek>(&mut self, reader: &mut R) -> Result<u64> {
        if self.is_vlsd() {
            return Ok(step_vlsd_record(reader, PayloadPolicy::Discard)?.unwrap_or(0));
        }
        let size = self.record_size();
        reader.seek(SeekFrom::Current(size as i64))?;
        Ok(size)
    }

    /// Skips the record at the current reader position and counts it in the
    /// sample count. Used when indexing a file whose sample count was never
    /// finalized.
    pub fn update_cycle_counter<R: Read + Seek>(&mut self, reader: &mut R) -> Result<u64> {
        let consumed = self.step_record(reader)?;
        if consumed > 0 {
            self.block.cycles_nr += 1;
        }
        Ok(consumed)
    }

    /// Like [`Self::update_cycle_counter`], and also adds the bytes of a
    /// VLSD record to the VLSD size stored in the data and invalidation
    /// byte counts.
    pub fn update_vlsd_size<R: Read + Seek>(&mut self, reader: &mut R) -> Result<u64> {
        if !self.is_vlsd() {
            return self.update_cycle_counter(reader);
        }
        let mut size = self.vlsd_size();
        let Some(consumed) = step_vlsd_record(reader, PayloadPolicy::AccumulateSize(&mut size))?
        else {
            return Ok(0);
        };
        self.set_vlsd_size(size);
        self.block.cycles_nr += 1;
        Ok(consumed)
    }

    /// Appends the scratch sample buffer as one record and counts it.
    pub fn append_sample_buffer<W: MdfWrite + ?Sized>(&mut self, writer: &mut W) -> Result<u64> {
        if self.is_vlsd() {
            return Err(Error::BlockSerializationError(format!(
                "channel group {} stores VLSD records; use append_vlsd_record",
                self.block.record_id
            )));
        }
        writer.write_all(&self.sample_buffer)?;
        self.block.cycles_nr += 1;
        Ok(self.sample_buffer.len() as u64)
    }

    /// Appends one length-prefixed VLSD record, counting it in the sample
    /// count and the VLSD size.
    pub fn append_vlsd_record<W: MdfWrite + ?Sized>(
        &mut self,
        writer: &mut W,
        payload: &[u8],
    ) -> Result<u64> {
        if !self.is_vlsd() {
            return Err(Error::BlockSerializationError(format!(
                "channel group {} has a fixed record layout",
                self.block.record_id
            )));
        }
        let length = u32::try_from(payload.len()).map_err(|_| {
            Error::BlockSerializationError(format!(
                "VLSD payload of {} bytes exceeds the 32-bit length prefix",
                payload.len()
            ))
        })?;
        writer.write_all(&length.to_le_bytes())?;
        writer.write_all(payload)?;

        let consumed = 4 + u64::from(length);
        self.set_vlsd_size(self.vlsd_size() + consumed);
        self.block.cycles_nr += 1;
        Ok(consumed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        blocks::DataType,
        channel::{Channel, ChannelType},
        group::CG_FLAG_VLSD,
        observer::SampleObservers,
    };
    use std::io::Cursor;

    fn vlsd_stream(payloads: &[&[u8]]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for payload in payloads {
            bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            bytes.extend_from_slice(payload);
        }
        bytes
    }

    #[test]
    fn vlsd_policies_consume_the_same_bytes() -> Result<()> {
        let bytes = vlsd_stream(&[b"abc", b"", b"defgh"]);

        let mut payload = Vec::new();
        let mut cursor = Cursor::new(bytes.clone());
        assert_eq!(
            step_vlsd_record(&mut cursor, PayloadPolicy::Materialize(&mut payload))?,
            Some(7)
        );
        assert_eq!(payload, b"abc");

        let mut cursor = Cursor::new(bytes);
        let mut size = 0;
        while step_vlsd_record(&mut cursor, PayloadPolicy::AccumulateSize(&mut size))?.is_some() {}
        assert_eq!(size, 7 + 4 + 9);
        assert_eq!(cursor.position(), 20);
        Ok(())
    }

    #[test]
    fn partial_prefix_is_truncated_io() {
        let mut cursor = Cursor::new(vec![1u8, 0]);
        let result = step_vlsd_record(&mut cursor, PayloadPolicy::Discard);
        assert!(matches!(
            result,
            Err(Error::TruncatedIo {
                expected: 4,
                actual: 2
            })
        ));
    }

    #[test]
    fn decode_stops_notifying_at_sample_count() -> Result<()> {
        let mut group = ChannelGroup::new(7, "fixed");
        group.add_channel(Channel::new(
            "v",
            ChannelType::FixedLength,
            DataType::UnsignedIntegerLE,
            16,
        ))?;
        group.prepare_for_writing()?;
        group.set_nof_samples(2);

        let mut seen = Vec::new();
        let mut cursor = Cursor::new(vec![1u8, 1, 2, 2, 3, 3]);
        {
            let mut observers = SampleObservers::new();
            observers.attach(|sample: u64, record_id: u64, record: &[u8]| {
                seen.push((sample, record_id, record.to_vec()));
            });
            for _ in 0..3 {
                assert_eq!(group.read_data_record(&mut cursor, &mut observers)?, 2);
            }
            assert_eq!(group.read_data_record(&mut cursor, &mut observers)?, 0);
        }
        assert_eq!(seen, [(0, 7, vec![1, 1]), (1, 7, vec![2, 2])]);
        assert_eq!(group.sample(), 2);
        Ok(())
    }

    #[test]
    fn virtual_records_notify_up_to_sample_count() -> Result<()> {
        let mut group = ChannelGroup::new(4, "virtual");
        group.add_channel(Channel::new(
            "t",
            ChannelType::VirtualMaster,
            DataType::UnsignedIntegerLE,
            64,
        ))?;
        group.prepare_for_writing()?;
        assert_eq!(group.record_size(), 0);
        group.set_nof_samples(3);

        let mut seen = Vec::new();
        let mut cursor = Cursor::new(Vec::<u8>::new());
        {
            let mut observers = SampleObservers::new();
            observers.attach(|sample: u64, _: u64, record: &[u8]| {
                assert!(record.is_empty());
                seen.push(sample);
            });
            for _ in 0..5 {
                assert_eq!(group.read_data_record(&mut cursor, &mut observers)?, 0);
            }
        }
        assert_eq!(seen, [0, 1, 2]);
        assert_eq!(group.sample(), 3);
        Ok(())
    }

    #[test]
    fn size_accumulation_splits_into_halves() -> Result<()> {
        let mut group = ChannelGroup::new(3, "vlsd");
        group.set_flags(CG_FLAG_VLSD);
        group.set_vlsd_size(0xFFFF_FFFC);

        let mut cursor = Cursor::new(vlsd_stream(&[b"abcd"]));
        assert_eq!(group.update_vlsd_size(&mut cursor)?, 8);
        assert_eq!(group.update_vlsd_size(&mut cursor)?, 0);
        assert_eq!(group.nof_samples(), 1);
        assert_eq!(group.vlsd_size(), 0x1_0000_0004);
        assert_eq!(group.invalid_bytes(), 1);
        assert_eq!(group.data_bytes(), 4);
        Ok(())
    }

    #[test]
    fn append_counts_records() -> Result<()> {
        let mut writer = crate::writer::VecWriter::new();
        let mut group = ChannelGroup::new(1, "vlsd");
        group.set_flags(CG_FLAG_VLSD);
        assert!(group.append_sample_buffer(&mut writer).is_err());

        group.append_vlsd_record(&mut writer, b"hello")?;
        group.append_vlsd_record(&mut writer, b"")?;
        assert_eq!(group.nof_samples(), 2);
        assert_eq!(group.vlsd_size(), 13);
        assert_eq!(writer.as_slice(), vlsd_stream(&[b"hello", b""]).as_slice());
        Ok(())
    }
}
