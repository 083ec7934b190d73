//! # Monotonic Clock
//!
//! Nanosecond timestamps from `CLOCK_MONOTONIC`.
//!
//! `std::time::Instant` cannot cross a `fork` boundary as a plain value, but
//! the raw monotonic clock is shared by every process on the host, so source
//! processes can stamp their transfers and the orchestrator can compare those
//! stamps against its own release timestamp.

/// Nanoseconds per second.
pub const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Returns the current `CLOCK_MONOTONIC` time in nanoseconds.
#[must_use]
#[inline]
pub fn now_ns() -> u64 {
    #[cfg(unix)]
    {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        // SAFETY: `ts` is a valid, writable timespec and CLOCK_MONOTONIC is
        // always supported on Linux.
        #[allow(unsafe_code)]
        unsafe {
            libc::clock_gettime(libc::CLOCK_MONOTONIC, &raw mut ts);
        }
        #[allow(clippy::cast_sign_loss)]
        let secs = ts.tv_sec as u64;
        #[allow(clippy::cast_sign_loss)]
        let nanos = ts.tv_nsec as u64;
        secs * NANOS_PER_SEC + nanos
    }

    #[cfg(not(unix))]
    {
        use std::sync::OnceLock;
        use std::time::Instant;

        static EPOCH: OnceLock<Instant> = OnceLock::new();
        let epoch = EPOCH.get_or_init(Instant::now);
        u64::try_from(epoch.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}

/// Converts a nanosecond span to fractional seconds.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn ns_to_secs(ns: u64) -> f64 {
    ns as f64 / NANOS_PER_SEC as f64
}
