//! Abstract I/O traits for writing blocks.
//!
//! [`MdfWrite`] abstracts the append, seek and patch operations the channel
//! group needs, so the same code writes to a file ([`FileWriter`]) or to an
//! in-memory buffer ([`VecWriter`]).

use crate::Result;

/// Trait for write operations used when emitting blocks.
///
/// Blocks are always appended at the end of the output. Patch operations
/// seek back to an earlier offset, overwrite a fixed-size field and return to
/// the previous position.
pub trait MdfWrite {
    /// Write all bytes to the destination.
    fn write_all(&mut self, bytes: &[u8]) -> Result<()>;

    /// Seek to an absolute position.
    fn seek(&mut self, pos: u64) -> Result<u64>;

    /// Get the current position.
    fn position(&self) -> u64;

    /// Flush any buffered data.
    fn flush(&mut self) -> Result<()>;

    /// Writes a block at the current position, zero padding up to the next
    /// 8-byte boundary first. Returns the starting offset of the block.
    fn write_block(&mut self, block_bytes: &[u8]) -> Result<u64> {
        let align = (8 - (self.position() % 8)) % 8;
        if align != 0 {
            self.write_all(&[0u8; 8][..align as usize])?;
        }
        let block_start = self.position();
        self.write_all(block_bytes)?;
        Ok(block_start)
    }

    /// Overwrites a little-endian u64 at `offset` and restores the position.
    fn patch_u64(&mut self, offset: u64, value: u64) -> Result<()> {
        self.patch_bytes(offset, &value.to_le_bytes())
    }

    /// Overwrites a little-endian u32 at `offset` and restores the position.
    fn patch_u32(&mut self, offset: u64, value: u32) -> Result<()> {
        self.patch_bytes(offset, &value.to_le_bytes())
    }

    /// Overwrites `bytes` at `offset` and restores the position.
    fn patch_bytes(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        let current_pos = self.position();
        self.seek(offset)?;
        self.write_all(bytes)?;
        self.seek(current_pos)?;
        Ok(())
    }
}

/// A writer that writes to an in-memory buffer.
///
/// Useful for building blocks in memory before copying them to external
/// storage, and for tests.
#[derive(Debug, Default)]
pub struct VecWriter {
    buffer: Vec<u8>,
    position: u64,
}

impl VecWriter {
    /// Create a new VecWriter with an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new VecWriter with the given initial capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
            position: 0,
        }
    }

    /// Create a VecWriter that appends to existing file contents.
    pub fn from_bytes(buffer: Vec<u8>) -> Self {
        let position = buffer.len() as u64;
        Self { buffer, position }
    }

    /// Consume the writer and return the underlying buffer.
    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }

    /// Get a reference to the underlying buffer.
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl MdfWrite for VecWriter {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let pos = self.position as usize;
        let end = pos + bytes.len();

        if end > self.buffer.len() {
            self.buffer.resize(end, 0);
        }

        self.buffer[pos..end].copy_from_slice(bytes);
        self.position = end as u64;
        Ok(())
    }

    fn seek(&mut self, pos: u64) -> Result<u64> {
        self.position = pos;
        Ok(self.position)
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

mod std_impl {
    use super::MdfWrite;
    use crate::Result;
    use std::fs::{File, OpenOptions};
    use std::io::{BufWriter, Seek, SeekFrom, Write};
    use std::path::Path;

    /// A wrapper that implements MdfWrite for standard file I/O.
    pub struct FileWriter {
        inner: BufWriter<File>,
        position: u64,
    }

    impl FileWriter {
        /// Create (or truncate) the file at `path` with a 1 MB write buffer.
        pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
            Self::with_capacity(path, 1_048_576)
        }

        /// Create (or truncate) the file at `path` with the specified buffer
        /// capacity.
        pub fn with_capacity<P: AsRef<Path>>(path: P, capacity: usize) -> Result<Self> {
            let file = File::create(path)?;
            let inner = BufWriter::with_capacity(capacity, file);
            Ok(Self { inner, position: 0 })
        }

        /// Open an existing file for appending blocks and patching fields in
        /// place. The position starts at the end of the file.
        pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
            let mut file = OpenOptions::new().read(true).write(true).open(path)?;
            let position = file.seek(SeekFrom::End(0))?;
            Ok(Self {
                inner: BufWriter::with_capacity(1_048_576, file),
                position,
            })
        }
    }

    impl MdfWrite for FileWriter {
        fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
            self.inner.write_all(bytes)?;
            self.position += bytes.len() as u64;
            Ok(())
        }

        fn seek(&mut self, pos: u64) -> Result<u64> {
            self.inner.seek(SeekFrom::Start(pos))?;
            self.position = pos;
            Ok(self.position)
        }

        fn position(&self) -> u64 {
            self.position
        }

        fn flush(&mut self) -> Result<()> {
            self.inner.flush()?;
            Ok(())
        }
    }
}

pub use std_impl::FileWriter;
