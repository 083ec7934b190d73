//! # Buffer Allocator
//!
//! Allocates and pre-faults the regions each participant transfers out of or
//! into.
//!
//! ## Policies
//!
//! ```text
//! Hot  (datasize bytes, reused every repetition)
//! ┌────────────────┐
//! │ rep 0,1,2,...  │
//! └────────────────┘
//!
//! Cold (datasize * reps bytes, one untouched slice per repetition)
//! ┌────────┬────────┬────────┬─────┬──────────┐
//! │ rep 0  │ rep 1  │ rep 2  │ ... │ rep n-1  │
//! └────────┴────────┴────────┴─────┴──────────┘
//! ```
//!
//! Every byte is written at allocation time so the timed window never pays
//! for page faults, only for cache and TLB misses (cold) or hits (hot).

mod error;
mod mapping;
mod shared;

pub use error::BufferError;
pub use mapping::{Mapping, Sharing};
pub use shared::{ProcessShared, SharedArray};

/// Byte pattern written into every freshly allocated buffer.
pub const FILL_BYTE: u8 = 0x01;

/// Cache-state policy for transfer buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferPolicy {
    /// One `datasize` region reused by every repetition (warm caches/TLB)
    #[default]
    Hot,
    /// `reps` disjoint `datasize` slices, one per repetition (cold caches/TLB)
    Cold,
}

impl BufferPolicy {
    /// Returns the number of bytes a buffer of this policy occupies.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::ZeroSize`], [`BufferError::ZeroReps`] or
    /// [`BufferError::SizeOverflow`].
    pub fn total_len(self, datasize: usize, reps: usize) -> Result<usize, BufferError> {
        if datasize == 0 {
            return Err(BufferError::ZeroSize);
        }
        if reps == 0 {
            return Err(BufferError::ZeroReps);
        }
        match self {
            Self::Hot => Ok(datasize),
            Self::Cold => datasize
                .checked_mul(reps)
                .ok_or(BufferError::SizeOverflow { datasize, reps }),
        }
    }

    /// Returns true for [`BufferPolicy::Cold`].
    #[must_use]
    pub fn is_cold(self) -> bool {
        self == Self::Cold
    }
}

impl std::fmt::Display for BufferPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hot => f.write_str("hot"),
            Self::Cold => f.write_str("cold"),
        }
    }
}

/// Placement hints applied to every allocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocOptions {
    /// Advise transparent huge pages
    pub huge_pages: bool,
    /// Bind pages to this NUMA node before first touch
    pub numa_node: Option<usize>,
    /// Swallow advisory failures instead of logging them (forked children)
    pub quiet: bool,
}

/// A participant's exclusively owned transfer region.
///
/// The full region is unmapped on drop regardless of which slice was used last.
#[derive(Debug)]
pub struct TransferBuffer {
    mapping: Mapping,
    policy: BufferPolicy,
    datasize: usize,
    reps: usize,
}

impl TransferBuffer {
    /// Allocates and fills a buffer for `reps` transfers of `datasize` bytes.
    ///
    /// # Errors
    ///
    /// Fails on `datasize == 0`, `reps == 0`, size overflow or `mmap` failure.
    /// There is no degraded mode.
    pub fn allocate(
        policy: BufferPolicy,
        datasize: usize,
        reps: usize,
        options: AllocOptions,
    ) -> Result<Self, BufferError> {
        let len = policy.total_len(datasize, reps)?;
        let mut mapping = Mapping::new(len, Sharing::Private)?;

        if options.huge_pages {
            if let Err(e) = mapping.advise_huge_pages() {
                if !options.quiet {
                    tracing::warn!("madvise(MADV_HUGEPAGE) failed (non-fatal): {e}");
                }
            }
        }
        if let Some(node) = options.numa_node {
            match mapping.bind_to_node(node) {
                Err(e) if e.raw_os_error() == Some(libc::ENOSYS) => {}
                Err(e) if !options.quiet => {
                    tracing::warn!("mbind to node {node} failed (non-fatal): {e}");
                }
                _ => {}
            }
        }

        mapping.as_mut_slice().fill(FILL_BYTE);

        Ok(Self {
            mapping,
            policy,
            datasize,
            reps,
        })
    }

    /// Returns the policy the buffer was allocated with.
    #[must_use]
    pub fn policy(&self) -> BufferPolicy {
        self.policy
    }

    /// Returns the per-transfer size.
    #[must_use]
    pub fn datasize(&self) -> usize {
        self.datasize
    }

    /// Returns the number of repetitions the buffer serves.
    #[must_use]
    pub fn reps(&self) -> usize {
        self.reps
    }

    /// Returns the full region length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    /// Always false: zero-length buffers are rejected at allocation.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Returns the base address, the handle a remote writer targets.
    #[must_use]
    pub fn base_addr(&self) -> usize {
        self.mapping.as_ptr() as usize
    }

    /// Returns the byte offset of the slice used by repetition `rep`.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::SliceOutOfRange`] if `rep >= reps`.
    pub fn offset(&self, rep: usize) -> Result<usize, BufferError> {
        if rep >= self.reps {
            return Err(BufferError::SliceOutOfRange {
                rep,
                reps: self.reps,
            });
        }
        Ok(match self.policy {
            BufferPolicy::Hot => 0,
            BufferPolicy::Cold => rep * self.datasize,
        })
    }

    /// Returns the `datasize` region used by repetition `rep`.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::SliceOutOfRange`] if `rep >= reps`.
    pub fn region(&self, rep: usize) -> Result<&[u8], BufferError> {
        let offset = self.offset(rep)?;
        Ok(&self.mapping.as_slice()[offset..offset + self.datasize])
    }

    /// Returns the mutable `datasize` region used by repetition `rep`.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::SliceOutOfRange`] if `rep >= reps`.
    pub fn region_mut(&mut self, rep: usize) -> Result<&mut [u8], BufferError> {
        let offset = self.offset(rep)?;
        let datasize = self.datasize;
        Ok(&mut self.mapping.as_mut_slice()[offset..offset + datasize])
    }

    /// Returns the whole region.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        self.mapping.as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hot_single_region_reused() {
        let buf = TransferBuffer::allocate(BufferPolicy::Hot, 4096, 10, AllocOptions::default())
            .unwrap();
        assert_eq!(buf.len(), 4096);
        let first = buf.region(0).unwrap().as_ptr();
        for rep in 0..10 {
            let region = buf.region(rep).unwrap();
            assert_eq!(region.as_ptr(), first);
            assert_eq!(region.len(), 4096);
        }
    }

    #[test]
    fn test_cold_disjoint_slices() {
        let datasize = 4096;
        let reps = 8;
        let buf =
            TransferBuffer::allocate(BufferPolicy::Cold, datasize, reps, AllocOptions::default())
                .unwrap();
        assert_eq!(buf.len(), datasize * reps);

        let mut ranges: Vec<(usize, usize)> = (0..reps)
            .map(|rep| {
                let region = buf.region(rep).unwrap();
                assert_eq!(region.len(), datasize);
                let start = region.as_ptr() as usize;
                (start, start + region.len())
            })
            .collect();
        ranges.sort_unstable();
        for window in ranges.windows(2) {
            assert!(window[0].1 <= window[1].0, "slices overlap: {window:?}");
        }
        assert_eq!(ranges[0].0, buf.base_addr());
        assert_eq!(ranges[reps - 1].1, buf.base_addr() + buf.len());
    }

    #[test]
    fn test_filled_with_pattern() {
        let buf = TransferBuffer::allocate(BufferPolicy::Cold, 512, 3, AllocOptions::default())
            .unwrap();
        assert!(buf.as_slice().iter().all(|&b| b == FILL_BYTE));
    }

    #[test]
    fn test_zero_datasize_is_setup_failure() {
        let err = TransferBuffer::allocate(BufferPolicy::Hot, 0, 10, AllocOptions::default())
            .unwrap_err();
        assert!(matches!(err, BufferError::ZeroSize));
        let err = crate::Error::from(err);
        assert_eq!(err.kind(), crate::ErrorKind::SetupFailure);
    }

    #[test]
    fn test_zero_reps_rejected() {
        assert!(matches!(
            TransferBuffer::allocate(BufferPolicy::Hot, 64, 0, AllocOptions::default()),
            Err(BufferError::ZeroReps)
        ));
    }

    #[test]
    fn test_cold_overflow_rejected() {
        assert!(matches!(
            BufferPolicy::Cold.total_len(usize::MAX, 2),
            Err(BufferError::SizeOverflow { .. })
        ));
        assert_eq!(BufferPolicy::Hot.total_len(usize::MAX, 2).unwrap(), usize::MAX);
    }

    #[test]
    fn test_slice_out_of_range() {
        let mut buf =
            TransferBuffer::allocate(BufferPolicy::Hot, 64, 2, AllocOptions::default()).unwrap();
        assert!(matches!(
            buf.region(2),
            Err(BufferError::SliceOutOfRange { rep: 2, reps: 2 })
        ));
        assert!(buf.region_mut(1).is_ok());
    }

    #[test]
    fn test_allocation_with_hints() {
        let options = AllocOptions {
            huge_pages: true,
            numa_node: Some(0),
            quiet: true,
        };
        let buf = TransferBuffer::allocate(BufferPolicy::Hot, 1 << 16, 1, options).unwrap();
        assert_eq!(buf.policy(), BufferPolicy::Hot);
        assert_eq!(buf.datasize(), 1 << 16);
        assert_eq!(buf.reps(), 1);
    }
}
