//! Error types for channel group operations.
//!
//! This module defines the [`Error`] enum which represents the failures that
//! can occur when reading, writing or traversing channel group blocks.
//!
//! Missing optional blocks (a zero link) are never reported as errors; they
//! surface as `None` or as an empty list. Reads or writes that move fewer
//! bytes than a block requires surface as [`Error::TruncatedIo`] so the file
//! level caller can decide whether the file is still usable.
//!
//! # Example
//!
//! ```no_run
//! use mdf4_cg::{ChannelGroup, Error, Result};
//! use std::io::Cursor;
//!
//! fn load(bytes: Vec<u8>, address: u64) -> Result<Option<ChannelGroup>> {
//!     let mut cursor = Cursor::new(bytes);
//!     match ChannelGroup::read(&mut cursor, address) {
//!         Ok(group) => Ok(group),
//!         Err(Error::TruncatedIo { expected, actual }) => {
//!             eprintln!("file cut short: wanted {expected} bytes, got {actual}");
//!             Ok(None)
//!         }
//!         Err(e) => Err(e),
//!     }
//! }
//! ```

use core::fmt;

/// Errors that can occur during channel group operations.
#[derive(Debug)]
pub enum Error {
    /// Buffer provided for parsing was too small.
    ///
    /// This typically indicates file corruption or an incomplete read.
    TooShortBuffer {
        /// Actual number of bytes available
        actual: usize,
        /// Minimum number of bytes required
        expected: usize,
        /// Source file where the error was detected
        file: &'static str,
        /// Line number where the error was detected
        line: u32,
    },

    /// A block identifier did not match the expected value.
    ///
    /// Each MDF block starts with a 4-character identifier (e.g. "##CG" for
    /// the channel group block).
    BlockIDError {
        /// The identifier that was found
        actual: String,
        /// The identifier that was expected
        expected: String,
    },

    /// An I/O error occurred while reading or writing the file.
    IOError(std::io::Error),

    /// A read or write moved fewer bytes than requested.
    TruncatedIo {
        /// Number of bytes requested
        expected: usize,
        /// Number of bytes actually transferred
        actual: usize,
    },

    /// Failed to link blocks together during file writing.
    BlockLinkError(String),

    /// Failed to serialize or deserialize a block.
    BlockSerializationError(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::TooShortBuffer {
                actual,
                expected,
                file,
                line,
            } => write!(
                f,
                "Buffer too small at {file}:{line}: need at least {expected} bytes, got {actual}"
            ),
            Error::BlockIDError { actual, expected } => {
                write!(
                    f,
                    "Invalid block identifier: Expected {expected:?}, got {actual:?}"
                )
            }
            Error::IOError(e) => write!(f, "I/O error: {e}"),
            Error::TruncatedIo { expected, actual } => {
                write!(f, "Truncated I/O: expected {expected} bytes, got {actual}")
            }
            Error::BlockLinkError(s) => write!(f, "Block linking error: {s}"),
            Error::BlockSerializationError(s) => write!(f, "Block serialization error: {s}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IOError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IOError(err)
    }
}

/// A specialized Result type for channel group operations.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncated_io_display() {
        let err = Error::TruncatedIo {
            expected: 8,
            actual: 3,
        };
        assert_eq!(err.to_string(), "Truncated I/O: expected 8 bytes, got 3");
    }

    #[test]
    fn io_error_keeps_source() {
        let err: Error = std::io::Error::other("boom").into();
        assert!(std::error::Error::source(&err).is_some());
    }
}
