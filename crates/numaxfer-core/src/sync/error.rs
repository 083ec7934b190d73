//! # Synchronization Error Types

use std::time::Duration;

use crate::ErrorKind;

/// The coordination point a participant or the orchestrator was waiting at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPhase {
    /// Orchestrator waiting for a destination to allocate its buffer
    DestinationReady,
    /// Orchestrator waiting for every source to pin and allocate
    SourcesReady,
    /// Source waiting for the release flag
    Release,
    /// Orchestrator waiting for every source to complete
    Drain,
    /// Destination process waiting for its source to finish writing
    DestinationHold,
}

impl std::fmt::Display for WaitPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::DestinationReady => "destination ready",
            Self::SourcesReady => "sources ready",
            Self::Release => "release",
            Self::Drain => "drain",
            Self::DestinationHold => "destination hold",
        };
        f.write_str(name)
    }
}

/// Errors raised by the rendezvous protocol.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A bounded wait expired
    #[error("Timed out after {waited:?} waiting for {phase}")]
    Timeout {
        /// Where the wait happened
        phase: WaitPhase,
        /// How long it waited
        waited: Duration,
    },

    /// The round was failed by another participant
    #[error("Round aborted while waiting for {phase}")]
    Aborted {
        /// Where the wait happened
        phase: WaitPhase,
    },

    /// `release()` called twice in one round
    #[error("Barrier already released this round")]
    AlreadyReleased,

    /// `release()` called before every source signalled ready
    #[error("Barrier released with {ready} of {participants} sources ready")]
    NotReady {
        /// Sources ready at the time of the call
        ready: usize,
        /// Participants scheduled for the round
        participants: usize,
    },

    /// More ready signals than participants scheduled
    #[error("Ready counter exceeded {participants} participants")]
    ReadyOverflow {
        /// Participants scheduled for the round
        participants: usize,
    },

    /// More completions signalled than participants scheduled
    #[error("Completion counter exceeded {participants} participants")]
    CompletionOverflow {
        /// Participants scheduled for the round
        participants: usize,
    },
}

impl SyncError {
    /// Returns the failure category.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout { .. } => ErrorKind::CoordinationTimeout,
            Self::Aborted { .. } => ErrorKind::ParticipantAborted,
            // Protocol misuse by the orchestrator itself
            Self::AlreadyReleased
            | Self::NotReady { .. }
            | Self::ReadyOverflow { .. }
            | Self::CompletionOverflow { .. } => ErrorKind::SetupFailure,
        }
    }
}
