//! # Topology Error Types
//!
//! Errors raised while discovering cores or pinning a participant.

use super::CoreId;

/// Errors that can occur during topology discovery and core pinning.
#[derive(Debug, thiserror::Error)]
pub enum NumaError {
    /// Topology detection failed
    #[error("Topology detection failed: {0}")]
    TopologyError(String),

    /// Discovery succeeded but no usable core was found
    #[error("No usable physical core found")]
    NoCores,

    /// Core ID outside the discovered range
    #[error("Invalid core: {core} (topology has {available} cores)")]
    InvalidCore {
        /// The requested core
        core: CoreId,
        /// Number of available cores
        available: usize,
    },

    /// Binding the calling thread/process to a core failed
    #[error("Failed to pin to core {core} (cpus {cpus:?}): {source}")]
    PinFailed {
        /// The core that could not be bound
        core: CoreId,
        /// Hardware threads of that core
        cpus: Vec<usize>,
        /// The OS error
        #[source]
        source: std::io::Error,
    },

    /// System call failed
    #[error("System call failed: {0}")]
    SyscallFailed(#[from] std::io::Error),

    /// Core pinning not available on this platform
    #[error("Core pinning not available on this platform")]
    NotAvailable,
}
