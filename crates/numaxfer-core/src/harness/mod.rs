//! # Round Harness
//!
//! Plans the rounds of a run, drives each round's participants through the
//! rendezvous barrier, and aggregates their timings.
//!
//! ## Components
//!
//! - [`BenchConfig`] - Immutable run configuration
//! - [`RoundPlan`] - Pairs per round for a placement and core count
//! - [`Harness`] - Runs the plan round by round under the configured model
//! - [`Reporter`] - Human-readable output
//!
//! A round never starts before the previous one has drained, and a failed
//! round ends the run: partial numbers of a failed round are never reported.

mod config;
mod measurement;
#[cfg(target_os = "linux")]
mod process;
mod report;
mod schedule;
mod threaded;

pub use config::{
    BenchConfig, BenchConfigBuilder, ExecutionModel, Placement, DEFAULT_DATASIZE, DEFAULT_REPS,
    DEFAULT_TIMEOUT,
};
pub use measurement::{Measurement, RoundReport, BYTES_PER_GB};
pub use report::Reporter;
pub use schedule::{Pair, Role, Round, RoundPlan};

use std::io::Write;

use tracing::info;

use crate::numa::Topology;
use crate::Result;

/// Runs a configuration against a topology.
#[derive(Debug, Clone, Copy)]
pub struct Harness<'a> {
    config: &'a BenchConfig,
    topology: &'a Topology,
}

impl<'a> Harness<'a> {
    /// Creates a harness.
    #[must_use]
    pub fn new(config: &'a BenchConfig, topology: &'a Topology) -> Self {
        Self { config, topology }
    }

    /// Plans the rounds for this topology.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidConfig`] if the topology has too few
    /// cores for the placement.
    pub fn plan(&self) -> Result<RoundPlan> {
        RoundPlan::new(self.config.placement, self.topology.num_cores())
    }

    /// Runs every round in order, writing the report as rounds drain.
    ///
    /// # Errors
    ///
    /// Returns the first round failure; no later round is started.
    pub fn run<W: Write>(&self, reporter: &mut Reporter<W>) -> Result<Vec<RoundReport>> {
        self.config.validate()?;
        let plan = self.plan()?;
        info!(
            placement = %self.config.placement,
            policy = %self.config.policy,
            model = %self.config.model,
            rounds = plan.len(),
            "starting run"
        );

        if self.config.numa_bind && self.topology.num_nodes() < 2 {
            info!("single NUMA node, buffer binding has no effect");
        }

        reporter.header(self.config, self.topology.num_cores())?;
        let mut reports = Vec::with_capacity(plan.len());
        for round in plan.rounds() {
            let report = self.run_round(round)?;
            reporter.round(&report)?;
            reports.push(report);
        }
        Ok(reports)
    }

    /// Runs a single round and returns its report once it has drained.
    ///
    /// # Errors
    ///
    /// Returns the participant failure that failed the round, or a
    /// coordination timeout.
    pub fn run_round(&self, round: &Round) -> Result<RoundReport> {
        info!(round = round.label, pairs = round.pairs.len(), "round starting");
        let report = match self.config.model {
            ExecutionModel::Thread => threaded::run_round(self.config, self.topology, round),
            #[cfg(target_os = "linux")]
            ExecutionModel::Process => process::run_round(self.config, self.topology, round),
            #[cfg(not(target_os = "linux"))]
            ExecutionModel::Process => Err(crate::Error::InvalidConfig(
                "the process model needs process_vm_writev (Linux only)".to_string(),
            )),
        }?;
        info!(
            round = round.label,
            window_ns = report.window_ns(),
            aggregate_gbps = report.aggregate_bandwidth() / BYTES_PER_GB,
            "round drained"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numa::affinity;

    #[test]
    fn test_plan_follows_topology() {
        let cpus = affinity::allowed_cpus().unwrap();
        let topology = Topology::uniform(8, &cpus).unwrap();
        let config = BenchConfig::builder()
            .placement(Placement::InterSocket)
            .build()
            .unwrap();
        let plan = Harness::new(&config, &topology).plan().unwrap();
        assert_eq!(plan.len(), 4);
        assert_eq!(plan.num_cores(), 8);
    }

    #[test]
    fn test_small_topology_rejected_before_header() {
        let cpus = affinity::allowed_cpus().unwrap();
        let topology = Topology::uniform(2, &cpus).unwrap();
        let config = BenchConfig::default();
        let mut reporter = Reporter::new(Vec::new());
        let err = Harness::new(&config, &topology)
            .run(&mut reporter)
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::SetupFailure);
        assert!(reporter.into_inner().is_empty());
    }
}
