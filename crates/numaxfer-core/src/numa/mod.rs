//! # Topology Provider
//!
//! Discovers physical cores and pins participants onto them.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────┐         ┌─────────────────────┐
//! │      Socket 0       │         │      Socket 1       │
//! │  ┌───────────────┐  │         │  ┌───────────────┐  │
//! │  │ Cores 0..N/2  │  │         │  │ Cores N/2..N  │  │
//! │  └───────┬───────┘  │         │  └───────┬───────┘  │
//! │          │ intra    │  inter  │          │          │
//! │  ┌───────▼───────┐  │         │  ┌───────▼───────┐  │
//! │  │  Local DRAM   │◄─┼─────────┼─►│  Local DRAM   │  │
//! │  └───────────────┘  │         │  └───────────────┘  │
//! └─────────────────────┘         └─────────────────────┘
//! ```
//!
//! Core ids are dense and socket-major, which is what lets the round
//! scheduler express "same socket" as neighbouring ids and "other socket" as
//! `id + N/2`.
//!
//! ## Components
//!
//! - [`Topology`] - Discovers physical cores
//! - [`CoreId`] / [`Core`] - Core identity and hardware threads
//! - [`affinity`] - `sched_setaffinity` wrappers
//!
//! ## Platform Support
//!
//! | Platform | Support |
//! |----------|---------|
//! | Linux | Full (sysfs or hwloc discovery, pinning) |
//! | Other | Discovery only; pinning fails |

pub mod affinity;
mod error;
mod topology;

pub use error::NumaError;
pub use topology::{Core, CoreId, Topology};

/// Result type for topology operations.
pub type Result<T> = std::result::Result<T, NumaError>;
