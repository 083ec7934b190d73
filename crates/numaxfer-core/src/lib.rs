//! # `numaxfer` Core
//!
//! Topology-aware, barrier-synchronized harness measuring memory-transfer
//! bandwidth between pairs of CPU cores.
//!
//! This crate provides:
//! - **Topology**: physical core discovery and per-participant core pinning
//! - **Buffers**: hot (reused) and cold (sliced, never re-touched) transfer regions
//! - **Transfer**: timed intra-process copy and cross-process `process_vm_writev`
//! - **Sync**: a rendezvous barrier releasing every pair into the timed window together
//! - **Harness**: round scheduling, participant lifecycles, aggregation and reporting
//!
//! ## Round Lifecycle
//!
//! ```text
//!  orchestrator         destination (per pair)        source (per pair)
//!  ────────────         ──────────────────────        ─────────────────
//!  plan round ───────►  pin + allocate ──► ready
//!       │ (join every destination)                    pin + allocate
//!  await_all_ready() ◄──────────────────────────────  signal_ready()
//!  release() ─────────────────────────────────────►  await_release()
//!       │                                             timed transfers ×reps
//!  await_all_complete() ◄─────────────────────────── signal_completion()
//!  aggregate = bytes / (drain - release)
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use numaxfer_core::harness::{BenchConfig, Harness, Placement, Reporter};
//! use numaxfer_core::numa::Topology;
//!
//! let config = BenchConfig::builder()
//!     .placement(Placement::InterSocket)
//!     .datasize(4 << 20)
//!     .reps(50)
//!     .build()?;
//! let topology = Topology::discover()?;
//!
//! let mut reporter = Reporter::new(std::io::stderr());
//! let reports = Harness::new(&config, &topology).run(&mut reporter)?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)] // Allowed per item where a syscall or raw mapping needs it
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod buffer;
pub mod clock;
pub mod harness;
pub mod numa;
pub mod sync;
pub mod transfer;

pub use harness::{BenchConfig, Harness, RoundReport};
pub use numa::{CoreId, Topology};

/// Result type for numaxfer-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Failure categories reported by the harness.
///
/// Every failure aborts the affected participant and fails its round; none
/// of them is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Topology load, core pin, buffer allocation or configuration
    SetupFailure,
    /// Partial or failed data movement
    TransferFailure,
    /// A bounded coordination wait expired
    CoordinationTimeout,
    /// The participant stopped because another participant failed the round
    ParticipantAborted,
}

impl ErrorKind {
    /// Stable numeric code, used to report failures out of child processes.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::SetupFailure => 1,
            Self::TransferFailure => 2,
            Self::CoordinationTimeout => 3,
            Self::ParticipantAborted => 4,
        }
    }

    /// Inverse of [`ErrorKind::code`].
    #[must_use]
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::SetupFailure),
            2 => Some(Self::TransferFailure),
            3 => Some(Self::CoordinationTimeout),
            4 => Some(Self::ParticipantAborted),
            _ => None,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::SetupFailure => "setup failure",
            Self::TransferFailure => "transfer failure",
            Self::CoordinationTimeout => "coordination timeout",
            Self::ParticipantAborted => "participant aborted",
        };
        f.write_str(name)
    }
}

/// Error types for numaxfer-core
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Topology discovery or pinning errors
    #[error("Topology error: {0}")]
    Numa(#[from] numa::NumaError),

    /// Buffer allocation errors
    #[error("Buffer error: {0}")]
    Buffer(#[from] buffer::BufferError),

    /// Data movement errors
    #[error("Transfer error: {0}")]
    Transfer(#[from] transfer::TransferError),

    /// Rendezvous errors
    #[error("Synchronization error: {0}")]
    Sync(#[from] sync::SyncError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A participant thread failed
    #[error("{role} participant of pair {pair} failed: {source}")]
    Participant {
        /// The pair the participant belonged to
        pair: harness::Pair,
        /// Source or destination side
        role: harness::Role,
        /// The underlying failure
        #[source]
        source: Box<Error>,
    },

    /// A participant child process failed
    #[error("{role} process of pair {pair} failed ({kind}): {detail}")]
    ChildProcess {
        /// The pair the participant belonged to
        pair: harness::Pair,
        /// Source or destination side
        role: harness::Role,
        /// Failure category reported by the child
        kind: ErrorKind,
        /// Description assembled by the orchestrator
        detail: String,
    },

    /// Writing the report failed
    #[error("Report output error: {0}")]
    Report(#[from] std::io::Error),

    /// Spawning a participant failed
    #[error("Failed to spawn {role} participant of pair {pair}: {source}")]
    SpawnFailed {
        /// The pair the participant belonged to
        pair: harness::Pair,
        /// Source or destination side
        role: harness::Role,
        /// The underlying OS error
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Returns the failure category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Numa(_)
            | Self::Buffer(_)
            | Self::InvalidConfig(_)
            | Self::Report(_)
            | Self::SpawnFailed { .. } => ErrorKind::SetupFailure,
            Self::Transfer(_) => ErrorKind::TransferFailure,
            Self::Sync(e) => e.kind(),
            Self::Participant { source, .. } => source.kind(),
            Self::ChildProcess { kind, .. } => *kind,
        }
    }
}
