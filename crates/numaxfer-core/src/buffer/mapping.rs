//! # Anonymous Mappings
//!
//! Page-backed memory regions obtained directly from `mmap`, with optional
//! huge-page advice and NUMA node binding through raw `madvise` / `mbind`
//! syscalls (no libnuma dependency).

use std::ptr::{self, NonNull};

use super::BufferError;

/// Sharing mode of a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sharing {
    /// `MAP_PRIVATE`: copy-on-write across `fork`
    Private,
    /// `MAP_SHARED`: the same physical pages in parent and forked children
    Shared,
}

/// An anonymous memory mapping, unmapped on drop.
#[derive(Debug)]
pub struct Mapping {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: The mapping is exclusively owned; moving it to another thread moves
// that ownership with it.
#[allow(unsafe_code)]
unsafe impl Send for Mapping {}

// SAFETY: `&Mapping` only hands out `*const`/`&[u8]` views; mutation requires `&mut`.
#[allow(unsafe_code)]
unsafe impl Sync for Mapping {}

impl Mapping {
    /// Maps `len` bytes of zeroed anonymous memory.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::ZeroSize`] for `len == 0` and
    /// [`BufferError::MapFailed`] if `mmap` fails.
    pub fn new(len: usize, sharing: Sharing) -> Result<Self, BufferError> {
        if len == 0 {
            return Err(BufferError::ZeroSize);
        }

        #[cfg(unix)]
        {
            let visibility = match sharing {
                Sharing::Private => libc::MAP_PRIVATE,
                Sharing::Shared => libc::MAP_SHARED,
            };

            // SAFETY: anonymous mapping with no address hint; the result is
            // checked against MAP_FAILED before use.
            #[allow(unsafe_code)]
            let raw = unsafe {
                libc::mmap(
                    ptr::null_mut(),
                    len,
                    libc::PROT_READ | libc::PROT_WRITE,
                    visibility | libc::MAP_ANONYMOUS,
                    -1,
                    0,
                )
            };

            if raw == libc::MAP_FAILED {
                return Err(BufferError::MapFailed {
                    len,
                    source: std::io::Error::last_os_error(),
                });
            }

            let ptr = NonNull::new(raw.cast::<u8>()).ok_or_else(|| BufferError::MapFailed {
                len,
                source: std::io::Error::other("mmap returned null"),
            })?;

            Ok(Self { ptr, len })
        }

        #[cfg(not(unix))]
        {
            let _ = sharing;
            Err(BufferError::MapFailed {
                len,
                source: std::io::Error::new(
                    std::io::ErrorKind::Unsupported,
                    "anonymous mappings require a unix platform",
                ),
            })
        }
    }

    /// Returns the base pointer.
    #[must_use]
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    /// Returns the mutable base pointer.
    #[must_use]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Returns the mapping length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false: zero-length mappings are rejected at construction.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Returns the whole mapping as a byte slice.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the mapping is `len` bytes of readable memory, zero-filled by
        // the kernel, and lives as long as `self`.
        #[allow(unsafe_code)]
        unsafe {
            std::slice::from_raw_parts(self.ptr.as_ptr(), self.len)
        }
    }

    /// Returns the whole mapping as a mutable byte slice.
    #[must_use]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above, and `&mut self` guarantees exclusive access.
        #[allow(unsafe_code)]
        unsafe {
            std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len)
        }
    }

    /// Asks the kernel to back the mapping with transparent huge pages.
    ///
    /// Advisory only: callers treat failure as non-fatal.
    ///
    /// # Errors
    ///
    /// Returns the OS error from `madvise`.
    pub fn advise_huge_pages(&self) -> std::io::Result<()> {
        #[cfg(target_os = "linux")]
        {
            // SAFETY: `ptr`/`len` describe a live mapping, and MADV_HUGEPAGE
            // is an advisory hint that cannot cause memory unsafety.
            #[allow(unsafe_code)]
            let result =
                unsafe { libc::madvise(self.ptr.as_ptr().cast(), self.len, libc::MADV_HUGEPAGE) };
            if result != 0 {
                return Err(std::io::Error::last_os_error());
            }
        }
        Ok(())
    }

    /// Binds the mapping's pages to a NUMA node using the `mbind` syscall.
    ///
    /// Must run before the pages are first touched to take effect without
    /// migration.
    ///
    /// # Errors
    ///
    /// Returns the OS error from `mbind`, or `InvalidInput` for a node
    /// outside the one-word node mask.
    #[allow(clippy::items_after_statements)]
    pub fn bind_to_node(&self, node: usize) -> std::io::Result<()> {
        #[cfg(target_os = "linux")]
        {
            // MPOL_BIND = 2 - strictly bind to the specified nodes
            const MPOL_BIND: i32 = 2;
            // MPOL_MF_MOVE = 2 - move pages to the node if they're already faulted
            const MPOL_MF_MOVE: u32 = 2;

            if node >= 64 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("NUMA node {node} outside the 64-node mask"),
                ));
            }
            let nodemask: u64 = 1u64 << node;

            // SAFETY: mbind on a live mapping with a valid one-word nodemask
            #[allow(unsafe_code)]
            let result = unsafe {
                libc::syscall(
                    libc::SYS_mbind,
                    self.ptr.as_ptr(),
                    self.len,
                    MPOL_BIND,
                    &raw const nodemask,
                    64usize, // maxnode
                    MPOL_MF_MOVE,
                )
            };
            if result < 0 {
                return Err(std::io::Error::last_os_error());
            }
        }

        #[cfg(not(target_os = "linux"))]
        {
            let _ = node;
        }
        Ok(())
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            // SAFETY: `ptr`/`len` are exactly what mmap returned, unmapped once.
            #[allow(unsafe_code)]
            unsafe {
                libc::munmap(self.ptr.as_ptr().cast(), self.len);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_len_rejected() {
        assert!(matches!(
            Mapping::new(0, Sharing::Private),
            Err(BufferError::ZeroSize)
        ));
    }

    #[test]
    fn test_private_mapping_zeroed_and_writable() {
        let mut mapping = Mapping::new(8192, Sharing::Private).unwrap();
        assert_eq!(mapping.len(), 8192);
        assert!(mapping.as_slice().iter().all(|&b| b == 0));
        mapping.as_mut_slice()[4096] = 7;
        assert_eq!(mapping.as_slice()[4096], 7);
    }

    #[test]
    fn test_advice_is_non_fatal() {
        let mapping = Mapping::new(1 << 21, Sharing::Private).unwrap();
        // Either outcome is acceptable; neither may panic or unmap.
        let _ = mapping.advise_huge_pages();
        let _ = mapping.bind_to_node(0);
        #[cfg(target_os = "linux")]
        assert!(mapping.bind_to_node(100).is_err());
        assert_eq!(mapping.len(), 1 << 21);
    }
}
