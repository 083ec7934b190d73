//! # Cache-Line Padding
//!
//! Keeps the barrier's release flag and completion counter on separate cache
//! lines: sources spin on the flag while finishing sources bump the counter,
//! and sharing a line would turn every increment into an invalidation of
//! every spinner.

use crate::buffer::ProcessShared;

/// A value alone on its 64-byte line.
///
/// ```rust
/// use numaxfer_core::sync::CachePadded;
/// use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
///
/// #[repr(C)]
/// struct Gate {
///     release: CachePadded<AtomicU32>,
///     completed: CachePadded<AtomicUsize>,
/// }
///
/// let gate = Gate {
///     release: CachePadded::new(AtomicU32::new(0)),
///     completed: CachePadded::new(AtomicUsize::new(0)),
/// };
/// gate.completed.fetch_add(1, Ordering::AcqRel);
/// assert_eq!(gate.release.load(Ordering::Acquire), 0);
/// assert_eq!(std::mem::size_of::<Gate>(), 128);
/// ```
#[repr(C, align(64))]
pub struct CachePadded<T> {
    value: T,
}

impl<T> CachePadded<T> {
    /// Pads `value`.
    #[must_use]
    pub const fn new(value: T) -> Self {
        Self { value }
    }
}

impl<T> std::ops::Deref for CachePadded<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for CachePadded<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.value.fmt(f)
    }
}

// SAFETY: padding adds no pointers; the inner value decides.
#[allow(unsafe_code)]
unsafe impl<T: ProcessShared> ProcessShared for CachePadded<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

    #[test]
    fn test_flag_and_counter_on_separate_lines() {
        #[repr(C)]
        struct Pair {
            flag: CachePadded<AtomicU32>,
            counter: CachePadded<AtomicUsize>,
        }
        let pair = Pair {
            flag: CachePadded::new(AtomicU32::new(0)),
            counter: CachePadded::new(AtomicUsize::new(0)),
        };
        let flag = std::ptr::addr_of!(pair.flag) as usize;
        let counter = std::ptr::addr_of!(pair.counter) as usize;
        assert_eq!(flag % 64, 0);
        assert!(counter - flag >= 64);
    }

    #[test]
    fn test_derefs_to_inner() {
        let counter = CachePadded::new(AtomicUsize::new(41));
        counter.fetch_add(1, Ordering::Relaxed);
        assert_eq!(counter.load(Ordering::Relaxed), 42);
        assert_eq!(format!("{counter:?}"), "42");
    }
}
