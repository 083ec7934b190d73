//! Intra-address-space strategy: bulk copy into a buffer this participant owns.

use super::{TransferError, TransferPrimitive, TransferSample};
use crate::buffer::TransferBuffer;
use crate::clock;

/// Copies into a destination buffer living in the same process.
///
/// Owns the destination: the destination participant hands its buffer over
/// once allocated, so only one writer ever touches it.
#[derive(Debug)]
pub struct LocalCopy {
    destination: TransferBuffer,
}

impl LocalCopy {
    /// Wraps a destination buffer.
    #[must_use]
    pub fn new(destination: TransferBuffer) -> Self {
        Self { destination }
    }

    /// Releases the destination buffer.
    #[must_use]
    pub fn into_destination(self) -> TransferBuffer {
        self.destination
    }
}

impl TransferPrimitive for LocalCopy {
    fn name(&self) -> &'static str {
        "memcpy"
    }

    fn transfer(&mut self, source: &[u8], rep: usize) -> Result<TransferSample, TransferError> {
        let available = self.destination.datasize();
        if source.len() > available {
            return Err(TransferError::DestinationTooSmall {
                required: source.len(),
                available,
            });
        }
        let target = &mut self.destination.region_mut(rep)?[..source.len()];

        let start_ns = clock::now_ns();
        target.copy_from_slice(source);
        let end_ns = clock::now_ns();
        std::hint::black_box(target.as_ptr());

        Ok(TransferSample {
            start_ns,
            end_ns,
            bytes: source.len(),
        })
    }
}
