//! # Transfer Error Types

use crate::buffer::BufferError;

/// Errors that can occur while moving data.
///
/// None of these is retried: a repeated transfer would be timed twice.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// The primitive moved fewer bytes than requested
    #[error("Short write: {written} of {expected} bytes")]
    ShortWrite {
        /// Bytes requested
        expected: usize,
        /// Bytes actually written
        written: usize,
    },

    /// The underlying system call failed
    #[error("{op} failed: {source}")]
    Os {
        /// The failing call
        op: &'static str,
        /// The OS error
        #[source]
        source: std::io::Error,
    },

    /// Source and destination shapes disagree
    #[error("Destination too small: need {required} bytes at offset, have {available}")]
    DestinationTooSmall {
        /// End offset the transfer needs
        required: usize,
        /// Destination length
        available: usize,
    },

    /// Slicing a buffer failed
    #[error(transparent)]
    Buffer(#[from] BufferError),
}
