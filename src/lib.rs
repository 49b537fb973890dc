#![forbid(unsafe_code)]

//! # mdf4-cg
//!
//! The channel group layer of ASAM MDF 4 (Measurement Data Format) files.
//!
//! A channel group (CGBLOCK) describes one record type of a data group: the
//! channels recorded together, their byte and invalidation-bit layout, the
//! number of records and, for VLSD groups, the total size of the
//! length-prefixed records. This crate reads and writes channel groups
//! together with the blocks they own and walks their record streams.
//!
//! ## Features
//!
//! - **Layout**: assigns byte offsets and invalidation bits to channels
//! - **Two-phase writing**: the CGBLOCK is written once, and its sample
//!   count and VLSD size are patched in place after the records are appended
//! - **VLSD / MLSD links**: variable-length channels point at their VLSD
//!   group, max-length channels at the `.DataLength` channel
//! - **Compositions**: nested channels are flattened depth first
//! - **X axis**: resolves the master channel of a signal
//! - **Record passes**: decode to observers, skip, count, VLSD size
//!   accounting and a JSON record index
//!
//! ## Quick Start
//!
//! ### Writing a channel group
//!
//! ```no_run
//! use mdf4_cg::{Channel, ChannelGroup, ChannelType, DataType, FileWriter, MdfWrite, Result};
//!
//! fn main() -> Result<()> {
//!     let mut writer = FileWriter::create("group.mf4")?;
//!
//!     let mut group = ChannelGroup::new(1, "Engine");
//!     group.add_channel(Channel::new("t", ChannelType::Master, DataType::FloatLE, 64))?;
//!     let rpm = Channel::new("rpm", ChannelType::FixedLength, DataType::UnsignedIntegerLE, 16);
//!     group.add_channel(rpm)?;
//!     group.prepare_for_writing()?;
//!     group.write(&mut writer)?;
//!
//!     for (i, rpm) in [800u16, 850, 900].into_iter().enumerate() {
//!         let record = group.sample_buffer_mut();
//!         record[0..8].copy_from_slice(&(i as f64).to_le_bytes());
//!         record[8..10].copy_from_slice(&rpm.to_le_bytes());
//!         group.append_sample_buffer(&mut writer)?;
//!     }
//!
//!     // Patch the sample count in place
//!     group.write(&mut writer)?;
//!     writer.flush()?;
//!     Ok(())
//! }
//! ```
//!
//! ### Reading a channel group
//!
//! ```no_run
//! use mdf4_cg::{ChannelGroup, Result, SampleObservers};
//! use std::fs::File;
//! use std::io::{Seek, SeekFrom};
//!
//! fn main() -> Result<()> {
//!     let mut file = File::open("group.mf4")?;
//!     let Some(mut group) = ChannelGroup::read(&mut file, 0x40)? else {
//!         return Ok(());
//!     };
//!     group.read_channels(&mut file)?;
//!
//!     let mut observers = SampleObservers::new();
//!     observers.attach(|sample: u64, _record_id: u64, record: &[u8]| {
//!         println!("{sample}: {record:02x?}");
//!     });
//!
//!     file.seek(SeekFrom::Start(0x200))?;
//!     while group.read_data_record(&mut file, &mut observers)? > 0 {}
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`blocks`] | Raw block codecs (CG, CN, SI, SR, TX, MD) |
//! | [`writer`] | Output abstraction and linked-list writing |
//! | [`index`] | Record offset index |
//! | [`error`] | Error types and [`Result`] alias |
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T>`]. A zero link or a link to a
//! block of another type is not an error: lookups return `Ok(None)`. Short
//! reads surface as [`Error::TruncatedIo`].

pub mod blocks;
pub mod error;
pub mod index;
pub mod writer;

mod channel;
mod group;
mod observer;
mod sample_reduction;
mod source_info;

// Re-export commonly used types at the crate root
pub use blocks::DataType;
pub use channel::{Channel, ChannelType, Component};
pub use error::{Error, Result};
pub use group::{
    BlockRef, BlockState, CG_FLAG_BUS_EVENT, CG_FLAG_PLAIN_RECORD, CG_FLAG_REMOTE_MASTER,
    CG_FLAG_VLSD, ChannelGroup, DATA_LENGTH_SUFFIX, PatchField, PatchPoint, PayloadPolicy,
    invalid_bytes_for_bits, step_vlsd_record,
};
pub use index::RecordIndex;
pub use observer::{ObserverId, SampleNotifier, SampleObserver, SampleObservers};
pub use sample_reduction::SampleReduction;
pub use source_info::SourceInformation;
pub use writer::{FileWriter, MdfWrite, VecWriter};
