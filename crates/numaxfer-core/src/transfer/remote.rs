//! Cross-address-space strategy: `process_vm_writev` into another process.
//!
//! The destination is identified by its pid and the base virtual address of
//! its buffer, both published by the destination process after allocation.
//! The writer needs ptrace-level access to the target; under Yama
//! (`ptrace_scope = 1`) the target must opt in with `PR_SET_PTRACER`.

use super::{TransferError, TransferPrimitive, TransferSample};
use crate::buffer::BufferPolicy;
use crate::clock;

/// Handle to a destination buffer owned by another process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteRegion {
    /// Process owning the buffer
    pub pid: i32,
    /// Base virtual address of the buffer in that process
    pub base_addr: usize,
    /// Full buffer length
    pub len: usize,
    /// Shape of the buffer
    pub policy: BufferPolicy,
    /// Per-transfer size
    pub datasize: usize,
}

impl RemoteRegion {
    /// Returns the byte offset of repetition `rep`'s slice.
    #[must_use]
    pub fn offset(&self, rep: usize) -> usize {
        match self.policy {
            BufferPolicy::Hot => 0,
            BufferPolicy::Cold => rep * self.datasize,
        }
    }
}

/// Writes into a [`RemoteRegion`] with `process_vm_writev`.
#[derive(Debug, Clone)]
pub struct RemoteWrite {
    target: RemoteRegion,
}

impl RemoteWrite {
    /// Creates a writer targeting `target`.
    #[must_use]
    pub fn new(target: RemoteRegion) -> Self {
        Self { target }
    }
}

impl TransferPrimitive for RemoteWrite {
    fn name(&self) -> &'static str {
        "process_vm_writev"
    }

    fn transfer(&mut self, source: &[u8], rep: usize) -> Result<TransferSample, TransferError> {
        let offset = self.target.offset(rep);
        let required = offset + source.len();
        if required > self.target.len {
            return Err(TransferError::DestinationTooSmall {
                required,
                available: self.target.len,
            });
        }

        #[cfg(target_os = "linux")]
        {
            let local = libc::iovec {
                iov_base: source.as_ptr().cast_mut().cast(),
                iov_len: source.len(),
            };
            let remote = libc::iovec {
                iov_base: (self.target.base_addr + offset) as *mut libc::c_void,
                iov_len: source.len(),
            };

            let start_ns = clock::now_ns();
            // SAFETY: `local` describes a live, readable slice. The kernel
            // validates the remote range against the target's address space
            // and reports EFAULT instead of touching our memory.
            #[allow(unsafe_code)]
            let written =
                unsafe { libc::process_vm_writev(self.target.pid, &raw const local, 1, &raw const remote, 1, 0) };
            let end_ns = clock::now_ns();

            if written < 0 {
                return Err(TransferError::Os {
                    op: "process_vm_writev",
                    source: std::io::Error::last_os_error(),
                });
            }
            #[allow(clippy::cast_sign_loss)]
            let written = written as usize;
            if written != source.len() {
                return Err(TransferError::ShortWrite {
                    expected: source.len(),
                    written,
                });
            }

            Ok(TransferSample {
                start_ns,
                end_ns,
                bytes: written,
            })
        }

        #[cfg(not(target_os = "linux"))]
        {
            let _ = clock::now_ns;
            Err(TransferError::Os {
                op: "process_vm_writev",
                source: std::io::Error::new(
                    std::io::ErrorKind::Unsupported,
                    "process_vm_writev is Linux-only",
                ),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{AllocOptions, TransferBuffer};

    fn region_of(buffer: &TransferBuffer) -> RemoteRegion {
        RemoteRegion {
            pid: i32::try_from(std::process::id()).unwrap(),
            base_addr: buffer.base_addr(),
            len: buffer.len(),
            policy: buffer.policy(),
            datasize: buffer.datasize(),
        }
    }

    /// Sandboxes may forbid the syscall outright; that is not what we test.
    fn unsupported(err: &TransferError) -> bool {
        matches!(err, TransferError::Os { source, .. }
            if matches!(source.raw_os_error(), Some(libc::EPERM | libc::ENOSYS | libc::EACCES)))
    }

    #[test]
    fn test_cold_offsets() {
        let region = RemoteRegion {
            pid: 1,
            base_addr: 0x1000,
            len: 300,
            policy: BufferPolicy::Cold,
            datasize: 100,
        };
        assert_eq!(region.offset(0), 0);
        assert_eq!(region.offset(2), 200);
        let hot = RemoteRegion {
            policy: BufferPolicy::Hot,
            ..region
        };
        assert_eq!(hot.offset(2), 0);
    }

    #[test]
    fn test_out_of_range_rejected_before_syscall() {
        let mut writer = RemoteWrite::new(RemoteRegion {
            pid: 1,
            base_addr: 0x1000,
            len: 100,
            policy: BufferPolicy::Cold,
            datasize: 100,
        });
        let err = writer.transfer(&[0u8; 100], 1).unwrap_err();
        assert!(matches!(err, TransferError::DestinationTooSmall { .. }));
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_write_into_own_address_space() {
        let destination =
            TransferBuffer::allocate(BufferPolicy::Cold, 4096, 2, AllocOptions::default())
                .unwrap();
        let mut writer = RemoteWrite::new(region_of(&destination));
        let source = vec![0xABu8; 4096];

        match writer.transfer(&source, 1) {
            Ok(sample) => {
                assert_eq!(sample.bytes, 4096);
                assert!(sample.end_ns >= sample.start_ns);
                assert!(destination.region(1).unwrap().iter().all(|&b| b == 0xAB));
                assert!(destination.region(0).unwrap().iter().all(|&b| b == 0x01));
            }
            Err(e) if unsupported(&e) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
}
