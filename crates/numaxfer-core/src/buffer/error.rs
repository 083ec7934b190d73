//! # Buffer Error Types

/// Errors that can occur while allocating or slicing transfer buffers.
#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    /// Zero-length allocation requested
    #[error("Refusing zero-length allocation")]
    ZeroSize,

    /// Zero repetitions requested
    #[error("Repetition count must be > 0")]
    ZeroReps,

    /// `datasize * reps` does not fit in the address space
    #[error("Buffer size overflows: {datasize} bytes x {reps} reps")]
    SizeOverflow {
        /// Per-transfer size
        datasize: usize,
        /// Repetitions
        reps: usize,
    },

    /// `mmap` failed
    #[error("Failed to map {len} bytes: {source}")]
    MapFailed {
        /// Requested length
        len: usize,
        /// The OS error
        #[source]
        source: std::io::Error,
    },

    /// Repetition index beyond the buffer's slices
    #[error("Repetition {rep} out of range (buffer holds {reps})")]
    SliceOutOfRange {
        /// Requested repetition
        rep: usize,
        /// Repetitions the buffer was sized for
        reps: usize,
    },
}
