//! # Rendezvous Synchronization
//!
//! The only shared mutable state of a round: a ready counter and a
//! completion counter incremented by every source, and a release flag
//! written once by the orchestrator.
//!
//! ## Components
//!
//! - [`RendezvousBarrier`] - Per-round ready counter, release flag and completion counter
//! - [`WaitStrategy`] - Spin-yield or backoff polling, always deadline-bounded
//! - [`CachePadded`] - Keeps hot atomics on separate cache lines

mod barrier;
mod error;
mod padded;
mod wait;

pub use barrier::{BarrierState, RendezvousBarrier};
pub use error::{SyncError, WaitPhase};
pub use padded::CachePadded;
pub use wait::{deadline_after, poll_until, WaitStrategy};
