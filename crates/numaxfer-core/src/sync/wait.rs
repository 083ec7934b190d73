//! # Bounded Polling
//!
//! Every coordination wait in the harness polls a condition until it holds,
//! the caller reports a failure, or a deadline passes. Nothing blocks on a
//! condition variable: a blocked waiter's wake-up latency would land inside
//! the measured window.

use std::time::{Duration, Instant};

use super::{SyncError, WaitPhase};

/// Spins before the backoff strategy starts sleeping.
const BACKOFF_SPINS: u32 = 64;
/// Upper bound of a single backoff sleep.
const MAX_BACKOFF: Duration = Duration::from_millis(1);
/// Deadline checks happen once every this many spin-yield iterations.
const DEADLINE_CHECK_INTERVAL: u32 = 64;

/// How a waiter spends time between polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitStrategy {
    /// Busy-poll with `sched_yield` between checks (lowest wake-up latency)
    #[default]
    SpinYield,
    /// Spin briefly, then sleep with exponential backoff capped at 1 ms
    Backoff,
}

impl std::fmt::Display for WaitStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SpinYield => f.write_str("spin"),
            Self::Backoff => f.write_str("backoff"),
        }
    }
}

/// Returns `now + timeout`, saturating far in the future on overflow.
#[must_use]
pub fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + Duration::from_secs(365 * 24 * 3600))
}

/// Polls `poll` until it yields `Some`, fails, or `deadline` passes.
///
/// # Errors
///
/// Propagates the first error returned by `poll`, or
/// [`SyncError::Timeout`] tagged with `phase` once the deadline expires.
pub fn poll_until<T, E, F>(
    strategy: WaitStrategy,
    deadline: Instant,
    phase: WaitPhase,
    mut poll: F,
) -> Result<T, E>
where
    E: From<SyncError>,
    F: FnMut() -> Result<Option<T>, E>,
{
    let started = Instant::now();
    let mut iteration: u32 = 0;
    let mut backoff = Duration::from_micros(1);

    loop {
        if let Some(value) = poll()? {
            return Ok(value);
        }

        iteration = iteration.wrapping_add(1);
        let check_deadline = match strategy {
            WaitStrategy::SpinYield => iteration % DEADLINE_CHECK_INTERVAL == 0,
            WaitStrategy::Backoff => true,
        };
        if check_deadline && Instant::now() >= deadline {
            return Err(SyncError::Timeout {
                phase,
                waited: started.elapsed(),
            }
            .into());
        }

        match strategy {
            WaitStrategy::SpinYield => std::thread::yield_now(),
            WaitStrategy::Backoff => {
                if iteration < BACKOFF_SPINS {
                    std::hint::spin_loop();
                } else {
                    std::thread::sleep(backoff);
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }
}
