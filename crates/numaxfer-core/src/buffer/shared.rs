//! # Process-Shared Arrays
//!
//! A fixed-length array of `T` placed in a `MAP_SHARED` anonymous mapping.
//! After `fork`, parent and children address the same physical pages, so
//! atomics inside `T` synchronize across processes exactly as they do across
//! threads.

use std::marker::PhantomData;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU64, AtomicUsize};

use super::mapping::{Mapping, Sharing};
use super::BufferError;

/// Types that stay meaningful when their bytes are visible to another process.
///
/// # Safety
///
/// Implementors must contain no pointers or handles into process-private
/// memory (no `Box`, `Vec`, `Arc`, references...), and must only be mutated
/// through atomic operations.
#[allow(unsafe_code)]
pub unsafe trait ProcessShared: Sync {}

#[allow(unsafe_code)]
unsafe impl ProcessShared for AtomicBool {}
#[allow(unsafe_code)]
unsafe impl ProcessShared for AtomicI32 {}
#[allow(unsafe_code)]
unsafe impl ProcessShared for AtomicU32 {}
#[allow(unsafe_code)]
unsafe impl ProcessShared for AtomicU64 {}
#[allow(unsafe_code)]
unsafe impl ProcessShared for AtomicUsize {}

/// A fixed-length array living in memory shared with forked children.
pub struct SharedArray<T: ProcessShared> {
    mapping: Mapping,
    len: usize,
    _marker: PhantomData<T>,
}

impl<T: ProcessShared> SharedArray<T> {
    /// Maps a shared region and initializes `len` elements with `init(index)`.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::ZeroSize`] for `len == 0` or zero-sized `T`,
    /// [`BufferError::SizeOverflow`] if the byte size overflows, or
    /// [`BufferError::MapFailed`] if the mapping cannot be created.
    ///
    /// # Panics
    ///
    /// Panics if `T` requires an alignment larger than a page.
    pub fn new(len: usize, mut init: impl FnMut(usize) -> T) -> Result<Self, BufferError> {
        let bytes = mem::size_of::<T>()
            .checked_mul(len)
            .ok_or(BufferError::SizeOverflow {
                datasize: mem::size_of::<T>(),
                reps: len,
            })?;
        assert!(mem::align_of::<T>() <= 4096, "alignment exceeds page size");

        let mut mapping = Mapping::new(bytes, Sharing::Shared)?;
        let base = mapping.as_mut_ptr().cast::<T>();
        for idx in 0..len {
            // SAFETY: the mapping is page-aligned and holds `len` elements;
            // each slot is written exactly once before any read.
            #[allow(unsafe_code)]
            unsafe {
                base.add(idx).write(init(idx));
            }
        }

        Ok(Self {
            mapping,
            len,
            _marker: PhantomData,
        })
    }

    /// Returns the number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false: empty arrays are rejected at construction.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Returns the elements as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: all `len` elements were initialized in `new` and the
        // mapping outlives the returned borrow.
        #[allow(unsafe_code)]
        unsafe {
            std::slice::from_raw_parts(self.mapping.as_ptr().cast::<T>(), self.len)
        }
    }
}

impl<T: ProcessShared> std::ops::Deref for SharedArray<T> {
    type Target = [T];

    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl<T: ProcessShared> Drop for SharedArray<T> {
    fn drop(&mut self) {
        let base = self.mapping.as_mut_ptr().cast::<T>();
        for idx in 0..self.len {
            // SAFETY: every element was initialized and is dropped once;
            // the mapping itself is unmapped afterwards by `Mapping::drop`.
            #[allow(unsafe_code)]
            unsafe {
                std::ptr::drop_in_place(base.add(idx));
            }
        }
    }
}

impl<T: ProcessShared + std::fmt::Debug> std::fmt::Debug for SharedArray<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_init_and_read() {
        let array = SharedArray::new(4, |i| AtomicU64::new(i as u64 * 10)).unwrap();
        assert_eq!(array.len(), 4);
        assert_eq!(array[3].load(Ordering::Relaxed), 30);
    }

    #[test]
    fn test_zero_len_rejected() {
        assert!(matches!(
            SharedArray::<AtomicU32>::new(0, |_| AtomicU32::new(0)),
            Err(BufferError::ZeroSize)
        ));
    }

    #[test]
    fn test_visible_across_threads() {
        let array = std::sync::Arc::new(SharedArray::new(1, |_| AtomicUsize::new(0)).unwrap());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let array = std::sync::Arc::clone(&array);
                std::thread::spawn(move || {
                    array[0].fetch_add(1, Ordering::AcqRel);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(array[0].load(Ordering::Acquire), 4);
    }
}
