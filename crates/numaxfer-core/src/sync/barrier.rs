//! # Rendezvous Barrier
//!
//! Releases every source of a round into its timed window at once and tells
//! the orchestrator when all of them are done.
//!
//! ## State Machine (one barrier per round)
//!
//! ```text
//!     ready == participants
//!     then release()                 completed == participants
//!   HOLD ──────────────► RELEASED ──────────────────────────────► DRAINED
//!     │                      │
//!     └──── abort() ─────────┴──────────► ABORTED
//! ```
//!
//! A source signals ready once it is pinned and its buffer is filled, then
//! spins on the release flag. The orchestrator waits for every ready signal
//! before it releases, so no setup work lands in the release→drain window.
//!
//! The structure holds only atomics and an immutable participant count, so
//! it works unchanged behind an `Arc` (threads) or inside a
//! [`SharedArray`](crate::buffer::SharedArray) (forked processes).
//!
//! - **Ready counter**: `fetch_add` by each source before it starts spinning.
//! - **Release flag**: single writer (the orchestrator), flips 0 → 1 once.
//! - **Completion counter**: `fetch_add` by each finishing source; the
//!   read-modify-write is atomic, so concurrent sources never lose updates.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

use super::wait::{poll_until, WaitStrategy};
use super::{CachePadded, SyncError, WaitPhase};
use crate::buffer::ProcessShared;
use crate::clock;

const HOLD: u32 = 0;
const RELEASED: u32 = 1;

/// Observable barrier state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierState {
    /// Release flag is 0; sources are waiting
    Hold,
    /// Release flag is 1; sources are transferring
    Released,
    /// Every participant has signalled completion
    Drained,
    /// A participant or the orchestrator failed the round
    Aborted,
}

/// Per-round rendezvous point shared by the orchestrator and all sources.
#[repr(C)]
pub struct RendezvousBarrier {
    /// 0 = hold, 1 = go
    release: CachePadded<AtomicU32>,
    /// Number of sources that finished their timed phase
    completed: CachePadded<AtomicUsize>,
    /// Number of sources pinned, allocated and spinning on the release flag
    ready: AtomicUsize,
    /// Non-zero once the round has been failed
    aborted: AtomicU32,
    /// Monotonic timestamp of the release (0 = not yet)
    release_ns: AtomicU64,
    /// Monotonic timestamp at which the drain was observed (0 = not yet)
    drain_ns: AtomicU64,
    /// Sources scheduled for the round
    participants: usize,
}

// SAFETY: only atomics plus an integer that is never written after
// construction; no pointers.
#[allow(unsafe_code)]
unsafe impl ProcessShared for RendezvousBarrier {}

impl RendezvousBarrier {
    /// Creates a barrier in `HOLD` state for `participants` sources.
    #[must_use]
    pub fn new(participants: usize) -> Self {
        Self {
            release: CachePadded::new(AtomicU32::new(HOLD)),
            completed: CachePadded::new(AtomicUsize::new(0)),
            ready: AtomicUsize::new(0),
            aborted: AtomicU32::new(0),
            release_ns: AtomicU64::new(0),
            drain_ns: AtomicU64::new(0),
            participants,
        }
    }

    /// Returns the number of sources scheduled for the round.
    #[must_use]
    pub fn participants(&self) -> usize {
        self.participants
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> BarrierState {
        if self.is_aborted() {
            BarrierState::Aborted
        } else if self.release.load(Ordering::Acquire) == HOLD {
            BarrierState::Hold
        } else if self.completed() >= self.participants {
            BarrierState::Drained
        } else {
            BarrierState::Released
        }
    }

    /// Records one source as ready to transfer; returns the new ready count.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::ReadyOverflow`] if more sources report ready
    /// than participants were scheduled.
    pub fn signal_ready(&self) -> Result<usize, SyncError> {
        let prev = self.ready.fetch_add(1, Ordering::AcqRel);
        if prev >= self.participants {
            return Err(SyncError::ReadyOverflow {
                participants: self.participants,
            });
        }
        Ok(prev + 1)
    }

    /// Returns the number of ready signals so far.
    #[must_use]
    pub fn ready(&self) -> usize {
        self.ready.load(Ordering::Acquire)
    }

    /// Polls the ready counter until every source is spinning on the
    /// release flag.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Aborted`] or [`SyncError::Timeout`].
    pub fn await_all_ready(
        &self,
        strategy: WaitStrategy,
        deadline: Instant,
    ) -> Result<(), SyncError> {
        self.await_all_ready_with(strategy, deadline, || Ok::<(), SyncError>(()))
    }

    /// Like [`await_all_ready`](Self::await_all_ready), calling `liveness`
    /// on every poll.
    ///
    /// # Errors
    ///
    /// Returns the first `liveness` error, [`SyncError::Aborted`] or
    /// [`SyncError::Timeout`].
    pub fn await_all_ready_with<E, F>(
        &self,
        strategy: WaitStrategy,
        deadline: Instant,
        mut liveness: F,
    ) -> Result<(), E>
    where
        E: From<SyncError>,
        F: FnMut() -> Result<(), E>,
    {
        poll_until(strategy, deadline, WaitPhase::SourcesReady, || {
            if self.is_aborted() {
                return Err(SyncError::Aborted {
                    phase: WaitPhase::SourcesReady,
                }
                .into());
            }
            if self.ready() >= self.participants {
                return Ok(Some(()));
            }
            liveness()?;
            Ok(None)
        })
    }

    /// Flips the release flag and returns the release timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotReady`] unless every source has signalled
    /// ready, [`SyncError::AlreadyReleased`] on a second call and
    /// [`SyncError::Aborted`] if the round has already failed.
    pub fn release(&self) -> Result<u64, SyncError> {
        if self.is_aborted() {
            return Err(SyncError::Aborted {
                phase: WaitPhase::Release,
            });
        }
        let ready = self.ready();
        if ready < self.participants {
            return Err(SyncError::NotReady {
                ready,
                participants: self.participants,
            });
        }
        let ts = clock::now_ns();
        self.release_ns
            .compare_exchange(0, ts, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SyncError::AlreadyReleased)?;
        self.release.store(RELEASED, Ordering::Release);
        tracing::trace!(participants = self.participants, "barrier released");
        Ok(ts)
    }

    /// Returns true once the release flag is set.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.release.load(Ordering::Acquire) == RELEASED
    }

    /// Returns the release timestamp, if released.
    #[must_use]
    pub fn release_ns(&self) -> Option<u64> {
        match self.release_ns.load(Ordering::Acquire) {
            0 => None,
            ts => Some(ts),
        }
    }

    /// Polls the release flag until it is set; returns the release timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Aborted`] if the round fails first, or
    /// [`SyncError::Timeout`] at `deadline`.
    pub fn await_release(
        &self,
        strategy: WaitStrategy,
        deadline: Instant,
    ) -> Result<u64, SyncError> {
        poll_until(strategy, deadline, WaitPhase::Release, || {
            if self.is_aborted() {
                return Err(SyncError::Aborted {
                    phase: WaitPhase::Release,
                });
            }
            if self.release.load(Ordering::Acquire) == RELEASED {
                return Ok(self.release_ns());
            }
            Ok(None)
        })
    }

    /// Records one finished source; returns the new completion count.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::CompletionOverflow`] if more completions arrive
    /// than participants were scheduled.
    pub fn signal_completion(&self) -> Result<usize, SyncError> {
        let prev = self.completed.fetch_add(1, Ordering::AcqRel);
        if prev >= self.participants {
            return Err(SyncError::CompletionOverflow {
                participants: self.participants,
            });
        }
        Ok(prev + 1)
    }

    /// Returns the number of completions signalled so far.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }

    /// Fails the round; every waiter returns [`SyncError::Aborted`].
    pub fn abort(&self) {
        self.aborted.store(1, Ordering::Release);
    }

    /// Returns true once the round has been failed.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire) != 0
    }

    /// Polls the completion counter until every participant has finished;
    /// returns the drain timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Aborted`] or [`SyncError::Timeout`].
    pub fn await_all_complete(
        &self,
        strategy: WaitStrategy,
        deadline: Instant,
    ) -> Result<u64, SyncError> {
        self.await_all_complete_with(strategy, deadline, || Ok::<(), SyncError>(()))
    }

    /// Like [`await_all_complete`](Self::await_all_complete), additionally
    /// calling `liveness` on every poll so the caller can surface participant
    /// deaths the counter would never reflect.
    ///
    /// # Errors
    ///
    /// Returns the first `liveness` error, [`SyncError::Aborted`] or
    /// [`SyncError::Timeout`].
    pub fn await_all_complete_with<E, F>(
        &self,
        strategy: WaitStrategy,
        deadline: Instant,
        mut liveness: F,
    ) -> Result<u64, E>
    where
        E: From<SyncError>,
        F: FnMut() -> Result<(), E>,
    {
        poll_until(strategy, deadline, WaitPhase::Drain, || {
            if self.completed() >= self.participants {
                let ts = clock::now_ns();
                self.drain_ns.store(ts, Ordering::Release);
                return Ok(Some(ts));
            }
            if self.is_aborted() {
                return Err(SyncError::Aborted {
                    phase: WaitPhase::Drain,
                }
                .into());
            }
            liveness()?;
            Ok(None)
        })
    }

    /// Returns the drain timestamp, if drained.
    #[must_use]
    pub fn drain_ns(&self) -> Option<u64> {
        match self.drain_ns.load(Ordering::Acquire) {
            0 => None,
            ts => Some(ts),
        }
    }
}

impl std::fmt::Debug for RendezvousBarrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RendezvousBarrier")
            .field("state", &self.state())
            .field("ready", &self.ready())
            .field("completed", &self.completed())
            .field("participants", &self.participants)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::deadline_after;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn soon() -> Instant {
        deadline_after(Duration::from_secs(10))
    }

    /// Barrier whose sources have all signalled ready.
    fn armed(participants: usize) -> RendezvousBarrier {
        let barrier = RendezvousBarrier::new(participants);
        for _ in 0..participants {
            barrier.signal_ready().unwrap();
        }
        barrier
    }

    #[test]
    fn test_state_machine() {
        let barrier = RendezvousBarrier::new(2);
        assert_eq!(barrier.state(), BarrierState::Hold);
        assert!(barrier.release_ns().is_none());
        assert_eq!(barrier.signal_ready().unwrap(), 1);
        assert_eq!(barrier.signal_ready().unwrap(), 2);
        assert_eq!(barrier.state(), BarrierState::Hold);

        let ts = barrier.release().unwrap();
        assert_eq!(barrier.state(), BarrierState::Released);
        assert_eq!(barrier.release_ns(), Some(ts));

        assert_eq!(barrier.signal_completion().unwrap(), 1);
        assert_eq!(barrier.state(), BarrierState::Released);
        assert_eq!(barrier.signal_completion().unwrap(), 2);
        assert_eq!(barrier.state(), BarrierState::Drained);

        let drain = barrier
            .await_all_complete(WaitStrategy::SpinYield, soon())
            .unwrap();
        assert!(drain >= ts);
        assert_eq!(barrier.drain_ns(), Some(drain));
    }

    #[test]
    fn test_release_exactly_once() {
        let barrier = armed(1);
        barrier.release().unwrap();
        assert!(matches!(barrier.release(), Err(SyncError::AlreadyReleased)));
    }

    #[test]
    fn test_release_refused_until_all_ready() {
        let barrier = RendezvousBarrier::new(2);
        barrier.signal_ready().unwrap();
        let err = barrier.release().unwrap_err();
        assert!(matches!(
            err,
            SyncError::NotReady {
                ready: 1,
                participants: 2
            }
        ));
        assert_eq!(err.kind(), crate::ErrorKind::SetupFailure);
        assert!(!barrier.is_released());
        assert!(barrier.release_ns().is_none());

        barrier.signal_ready().unwrap();
        barrier.release().unwrap();
        assert!(matches!(
            barrier.signal_ready(),
            Err(SyncError::ReadyOverflow { participants: 2 })
        ));
    }

    #[test]
    fn test_ready_wait_observes_abort_and_deadline() {
        let barrier = RendezvousBarrier::new(2);
        barrier.signal_ready().unwrap();
        let err = barrier
            .await_all_ready(
                WaitStrategy::Backoff,
                deadline_after(Duration::from_millis(10)),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            SyncError::Timeout {
                phase: WaitPhase::SourcesReady,
                ..
            }
        ));

        barrier.abort();
        assert!(matches!(
            barrier.await_all_ready(WaitStrategy::SpinYield, soon()),
            Err(SyncError::Aborted {
                phase: WaitPhase::SourcesReady
            })
        ));
    }

    #[test]
    fn test_completion_overflow() {
        let barrier = RendezvousBarrier::new(1);
        barrier.signal_completion().unwrap();
        let err = barrier.signal_completion().unwrap_err();
        assert!(matches!(
            err,
            SyncError::CompletionOverflow { participants: 1 }
        ));
    }

    #[test]
    fn test_sources_never_start_before_release() {
        let sources = 4;
        let barrier = Arc::new(RendezvousBarrier::new(sources));

        let handles: Vec<_> = (0..sources)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.signal_ready().unwrap();
                    let release_ts = barrier
                        .await_release(WaitStrategy::SpinYield, soon())
                        .unwrap();
                    let started = clock::now_ns();
                    barrier.signal_completion().unwrap();
                    (release_ts, started)
                })
            })
            .collect();

        barrier
            .await_all_ready(WaitStrategy::SpinYield, soon())
            .unwrap();
        assert_eq!(barrier.ready(), sources);
        assert_eq!(barrier.state(), BarrierState::Hold);
        assert_eq!(barrier.completed(), 0);

        let release_ts = barrier.release().unwrap();
        let drain_ts = barrier
            .await_all_complete(WaitStrategy::SpinYield, soon())
            .unwrap();

        for handle in handles {
            let (observed, started) = handle.join().unwrap();
            assert_eq!(observed, release_ts);
            assert!(started >= release_ts);
            assert!(started <= drain_ts);
        }
        assert_eq!(barrier.completed(), sources);
    }

    #[test]
    fn test_counter_exact_under_contention() {
        let sources = 16;
        let barrier = Arc::new(armed(sources));
        barrier.release().unwrap();

        let handles: Vec<_> = (0..sources)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || barrier.signal_completion().unwrap())
            })
            .collect();
        let mut counts: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        counts.sort_unstable();

        assert_eq!(counts, (1..=sources).collect::<Vec<_>>());
        assert_eq!(barrier.completed(), sources);
    }

    #[test]
    fn test_release_wait_times_out() {
        let barrier = RendezvousBarrier::new(1);
        let err = barrier
            .await_release(
                WaitStrategy::Backoff,
                deadline_after(Duration::from_millis(10)),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            SyncError::Timeout {
                phase: WaitPhase::Release,
                ..
            }
        ));
        assert_eq!(err.kind(), crate::ErrorKind::CoordinationTimeout);
    }

    #[test]
    fn test_drain_wait_times_out() {
        let barrier = armed(2);
        barrier.release().unwrap();
        barrier.signal_completion().unwrap();
        let err = barrier
            .await_all_complete(
                WaitStrategy::SpinYield,
                deadline_after(Duration::from_millis(10)),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            SyncError::Timeout {
                phase: WaitPhase::Drain,
                ..
            }
        ));
    }

    #[test]
    fn test_abort_wakes_waiters() {
        let barrier = Arc::new(RendezvousBarrier::new(1));
        let waiter = {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || barrier.await_release(WaitStrategy::SpinYield, soon()))
        };
        barrier.abort();
        assert!(matches!(
            waiter.join().unwrap(),
            Err(SyncError::Aborted {
                phase: WaitPhase::Release
            })
        ));
        assert_eq!(barrier.state(), BarrierState::Aborted);
        assert!(matches!(barrier.release(), Err(SyncError::Aborted { .. })));
    }

    #[test]
    fn test_liveness_error_surfaces() {
        let barrier = armed(1);
        barrier.release().unwrap();
        let result: Result<u64, SyncError> =
            barrier.await_all_complete_with(WaitStrategy::SpinYield, soon(), || {
                Err(SyncError::Aborted {
                    phase: WaitPhase::Drain,
                })
            });
        assert!(result.is_err());
    }
}
