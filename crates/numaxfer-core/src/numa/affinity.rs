//! # CPU Affinity
//!
//! Thin wrappers over `sched_setaffinity` / `sched_getaffinity`.
//!
//! A pid of 0 targets the calling thread, so the same call pins a thread in
//! the threaded model and the (single-threaded) child in the process model.

use std::io;

/// Binds the calling thread to the given set of hardware threads.
///
/// # Errors
///
/// Returns the OS error if the set is empty, contains a CPU the kernel cannot
/// represent, or the binding call fails.
pub fn pin_to_cpus(cpus: &[usize]) -> io::Result<()> {
    if cpus.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "empty cpu set",
        ));
    }

    #[cfg(target_os = "linux")]
    {
        use libc::{cpu_set_t, sched_setaffinity, CPU_SET, CPU_ZERO};
        use std::mem;

        #[allow(clippy::cast_sign_loss)]
        let max = libc::CPU_SETSIZE as usize;
        if let Some(&cpu) = cpus.iter().find(|&&cpu| cpu >= max) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("cpu {cpu} exceeds CPU_SETSIZE ({max})"),
            ));
        }

        // SAFETY: The cpu_set_t is zero-initialized and every index was
        // checked against CPU_SETSIZE. pid 0 refers to the calling thread.
        #[allow(unsafe_code)]
        unsafe {
            let mut set: cpu_set_t = mem::zeroed();
            CPU_ZERO(&mut set);
            for &cpu in cpus {
                CPU_SET(cpu, &mut set);
            }

            if sched_setaffinity(0, mem::size_of::<cpu_set_t>(), &raw const set) != 0 {
                return Err(io::Error::last_os_error());
            }
        }
        Ok(())
    }

    #[cfg(not(target_os = "linux"))]
    {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "sched_setaffinity is Linux-only",
        ))
    }
}

/// Returns the hardware threads the calling thread may run on.
///
/// # Errors
///
/// Returns the OS error if the affinity mask cannot be read.
pub fn allowed_cpus() -> io::Result<Vec<usize>> {
    #[cfg(target_os = "linux")]
    {
        use libc::{cpu_set_t, sched_getaffinity, CPU_ISSET};
        use std::mem;

        // SAFETY: `set` is a valid, writable cpu_set_t of the advertised size.
        #[allow(unsafe_code)]
        unsafe {
            let mut set: cpu_set_t = mem::zeroed();
            if sched_getaffinity(0, mem::size_of::<cpu_set_t>(), &raw mut set) != 0 {
                return Err(io::Error::last_os_error());
            }
            #[allow(clippy::cast_sign_loss)]
            let max = libc::CPU_SETSIZE as usize;
            Ok((0..max).filter(|&cpu| CPU_ISSET(cpu, &set)).collect())
        }
    }

    #[cfg(not(target_os = "linux"))]
    {
        Ok((0..num_cpus::get()).collect())
    }
}
