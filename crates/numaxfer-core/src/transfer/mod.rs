//! # Transfer Primitive
//!
//! One timed unit of data movement from a source region into a destination,
//! behind a single trait with two strategies:
//!
//! | Strategy | Destination | Mechanism |
//! |----------|-------------|-----------|
//! | [`LocalCopy`] | buffer in this address space | bulk `memcpy` |
//! | [`RemoteWrite`] | buffer in another process | `process_vm_writev` |
//!
//! Timestamps are taken immediately around the data-moving call with the
//! monotonic clock, so the sample is wall time of the transfer alone:
//! barrier waits happen outside the loop.

mod copy;
mod error;
mod remote;

pub use copy::LocalCopy;
pub use error::TransferError;
pub use remote::{RemoteRegion, RemoteWrite};

use crate::buffer::TransferBuffer;

/// Timing of one transfer call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferSample {
    /// Monotonic timestamp immediately before the call
    pub start_ns: u64,
    /// Monotonic timestamp immediately after the call
    pub end_ns: u64,
    /// Bytes moved
    pub bytes: usize,
}

impl TransferSample {
    /// Returns the elapsed wall time in nanoseconds.
    #[must_use]
    pub fn elapsed_ns(&self) -> u64 {
        self.end_ns.saturating_sub(self.start_ns)
    }
}

/// Moves a source region into repetition `rep`'s destination slice.
pub trait TransferPrimitive {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Performs and times one transfer of `source` into the destination
    /// slice used by repetition `rep`.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError`] on a short write or OS failure.
    fn transfer(&mut self, source: &[u8], rep: usize) -> Result<TransferSample, TransferError>;
}

/// Accumulated timings of a source's repetitions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    /// Transfers performed
    pub transfers: usize,
    /// Total bytes moved
    pub bytes: u64,
    /// Sum of per-transfer elapsed times
    pub elapsed_ns: u64,
    /// Start timestamp of the first transfer
    pub first_start_ns: u64,
    /// End timestamp of the last transfer
    pub last_end_ns: u64,
}

impl TransferStats {
    /// Adds one sample.
    pub fn record(&mut self, sample: TransferSample) {
        if self.transfers == 0 {
            self.first_start_ns = sample.start_ns;
        }
        self.transfers += 1;
        self.bytes += sample.bytes as u64;
        self.elapsed_ns += sample.elapsed_ns();
        self.last_end_ns = sample.end_ns;
    }
}

/// Runs one transfer per repetition of `source`, slice by slice.
///
/// # Errors
///
/// Stops at the first failed transfer and returns its error.
pub fn run_timed_loop<P>(
    primitive: &mut P,
    source: &TransferBuffer,
) -> Result<TransferStats, TransferError>
where
    P: TransferPrimitive + ?Sized,
{
    let mut stats = TransferStats::default();
    for rep in 0..source.reps() {
        let region = source.region(rep)?;
        let sample = primitive.transfer(region, rep)?;
        stats.record(sample);
    }
    Ok(stats)
}
