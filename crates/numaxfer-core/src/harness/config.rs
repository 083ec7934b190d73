//! Benchmark configuration.

use std::time::Duration;

use crate::buffer::{AllocOptions, BufferPolicy};
use crate::sync::WaitStrategy;
use crate::{Error, Result};

/// Default per-transfer size: 25 MiB.
pub const DEFAULT_DATASIZE: usize = 25 * 1024 * 1024;
/// Default repetitions per pair.
pub const DEFAULT_REPS: usize = 100;
/// Default bound on every coordination wait.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// How source and destination cores are paired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Placement {
    /// Neighboring cores within one socket half
    #[default]
    IntraSocket,
    /// Core `i` of the first half against core `i` of the second half
    InterSocket,
}

impl Placement {
    /// Returns true for intra-socket placement.
    #[must_use]
    pub fn is_intra(self) -> bool {
        matches!(self, Self::IntraSocket)
    }
}

impl std::fmt::Display for Placement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IntraSocket => f.write_str("intra"),
            Self::InterSocket => f.write_str("inter"),
        }
    }
}

/// What a participant is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionModel {
    /// Threads of this process, bulk copy
    #[default]
    Thread,
    /// Forked processes, `process_vm_writev`
    Process,
}

impl std::fmt::Display for ExecutionModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Thread => f.write_str("thread"),
            Self::Process => f.write_str("process"),
        }
    }
}

/// Immutable benchmark configuration, built once and passed by reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchConfig {
    /// Pairing strategy
    pub placement: Placement,
    /// Hot or cold buffers
    pub policy: BufferPolicy,
    /// Bytes moved per transfer
    pub datasize: usize,
    /// Transfers per pair per round
    pub reps: usize,
    /// Threads or processes
    pub model: ExecutionModel,
    /// How coordination waits poll
    pub wait: WaitStrategy,
    /// Bound on every coordination wait
    pub timeout: Duration,
    /// Advise transparent huge pages on buffers
    pub huge_pages: bool,
    /// Bind each buffer to its owner core's NUMA node
    pub numa_bind: bool,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            placement: Placement::default(),
            policy: BufferPolicy::default(),
            datasize: DEFAULT_DATASIZE,
            reps: DEFAULT_REPS,
            model: ExecutionModel::default(),
            wait: WaitStrategy::default(),
            timeout: DEFAULT_TIMEOUT,
            huge_pages: false,
            numa_bind: false,
        }
    }
}

impl BenchConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> BenchConfigBuilder {
        BenchConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] on a zero size, zero reps, a
    /// buffer length overflow or a zero timeout.
    pub fn validate(&self) -> Result<()> {
        if self.datasize == 0 {
            return Err(Error::InvalidConfig("datasize must be non-zero".to_string()));
        }
        if self.reps == 0 {
            return Err(Error::InvalidConfig("reps must be non-zero".to_string()));
        }
        if self.policy.total_len(self.datasize, self.reps).is_err() {
            return Err(Error::InvalidConfig(format!(
                "datasize {} x reps {} overflows",
                self.datasize, self.reps
            )));
        }
        if self.timeout.is_zero() {
            return Err(Error::InvalidConfig("timeout must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Returns allocation hints for a buffer owned by a participant on
    /// NUMA node `node`.
    #[must_use]
    pub fn alloc_options(&self, node: usize) -> AllocOptions {
        AllocOptions {
            huge_pages: self.huge_pages,
            numa_node: self.numa_bind.then_some(node),
            quiet: false,
        }
    }

    /// Bytes one pair moves in a round.
    #[must_use]
    pub fn bytes_per_pair(&self) -> u64 {
        (self.datasize as u64).saturating_mul(self.reps as u64)
    }
}

/// Builder for [`BenchConfig`].
#[derive(Debug, Default)]
pub struct BenchConfigBuilder {
    placement: Option<Placement>,
    policy: Option<BufferPolicy>,
    datasize: Option<usize>,
    reps: Option<usize>,
    model: Option<ExecutionModel>,
    wait: Option<WaitStrategy>,
    timeout: Option<Duration>,
    huge_pages: Option<bool>,
    numa_bind: Option<bool>,
}

impl BenchConfigBuilder {
    /// Sets the pairing strategy.
    #[must_use]
    pub fn placement(mut self, placement: Placement) -> Self {
        self.placement = Some(placement);
        self
    }

    /// Sets the buffer policy.
    #[must_use]
    pub fn policy(mut self, policy: BufferPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Sets the per-transfer size in bytes.
    #[must_use]
    pub fn datasize(mut self, datasize: usize) -> Self {
        self.datasize = Some(datasize);
        self
    }

    /// Sets repetitions per pair.
    #[must_use]
    pub fn reps(mut self, reps: usize) -> Self {
        self.reps = Some(reps);
        self
    }

    /// Sets the execution model.
    #[must_use]
    pub fn model(mut self, model: ExecutionModel) -> Self {
        self.model = Some(model);
        self
    }

    /// Sets the wait strategy.
    #[must_use]
    pub fn wait(mut self, wait: WaitStrategy) -> Self {
        self.wait = Some(wait);
        self
    }

    /// Sets the coordination timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Enables huge-page advice.
    #[must_use]
    pub fn huge_pages(mut self, enabled: bool) -> Self {
        self.huge_pages = Some(enabled);
        self
    }

    /// Enables NUMA binding of buffers.
    #[must_use]
    pub fn numa_bind(mut self, enabled: bool) -> Self {
        self.numa_bind = Some(enabled);
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the configuration is invalid.
    pub fn build(self) -> Result<BenchConfig> {
        let config = BenchConfig {
            placement: self.placement.unwrap_or_default(),
            policy: self.policy.unwrap_or_default(),
            datasize: self.datasize.unwrap_or(DEFAULT_DATASIZE),
            reps: self.reps.unwrap_or(DEFAULT_REPS),
            model: self.model.unwrap_or_default(),
            wait: self.wait.unwrap_or_default(),
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            huge_pages: self.huge_pages.unwrap_or(false),
            numa_bind: self.numa_bind.unwrap_or(false),
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_default_config() {
        let config = BenchConfig::default();
        assert_eq!(config.placement, Placement::IntraSocket);
        assert_eq!(config.policy, BufferPolicy::Hot);
        assert_eq!(config.datasize, 25 * 1024 * 1024);
        assert_eq!(config.reps, 100);
        assert_eq!(config.model, ExecutionModel::Thread);
        assert_eq!(config.timeout, Duration::from_secs(300));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = BenchConfig::builder()
            .placement(Placement::InterSocket)
            .policy(BufferPolicy::Cold)
            .datasize(4096)
            .reps(10)
            .model(ExecutionModel::Process)
            .wait(WaitStrategy::Backoff)
            .timeout(Duration::from_secs(5))
            .numa_bind(true)
            .build()
            .unwrap();

        assert_eq!(config.placement, Placement::InterSocket);
        assert_eq!(config.policy, BufferPolicy::Cold);
        assert_eq!(config.bytes_per_pair(), 40_960);
        assert_eq!(config.wait, WaitStrategy::Backoff);
        assert_eq!(config.alloc_options(1).numa_node, Some(1));
        assert!(!config.alloc_options(1).huge_pages);
    }

    #[test]
    fn test_zero_datasize_is_setup_failure() {
        let err = BenchConfig::builder().datasize(0).build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SetupFailure);
    }

    #[test]
    fn test_zero_reps_rejected() {
        assert!(BenchConfig::builder().reps(0).build().is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        assert!(BenchConfig::builder()
            .timeout(Duration::ZERO)
            .build()
            .is_err());
    }

    #[test]
    fn test_cold_overflow_rejected() {
        let result = BenchConfig::builder()
            .policy(BufferPolicy::Cold)
            .datasize(usize::MAX / 2)
            .reps(3)
            .build();
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_display_names() {
        assert_eq!(Placement::IntraSocket.to_string(), "intra");
        assert_eq!(ExecutionModel::Process.to_string(), "process");
    }
}
