//! numaxfer - core-to-core memory bandwidth harness

use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use numaxfer_core::buffer::BufferPolicy;
use numaxfer_core::harness::{
    BenchConfig, ExecutionModel, Harness, Placement, Reporter, DEFAULT_DATASIZE, DEFAULT_REPS,
};
use numaxfer_core::numa::Topology;
use numaxfer_core::sync::WaitStrategy;

/// Measures memory-transfer bandwidth between pairs of CPU cores
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Intra-socket pairs (neighbouring cores)
    #[arg(short = 'i', overrides_with = "inter")]
    intra: bool,

    /// Inter-socket pairs (core i against core i + N/2)
    #[arg(short = 'I', overrides_with = "intra")]
    inter: bool,

    /// Cold buffers: every repetition touches fresh memory
    #[arg(short = 't', overrides_with = "hot")]
    cold: bool,

    /// Hot buffers: every repetition reuses the same memory
    #[arg(short = 'T', overrides_with = "cold")]
    hot: bool,

    /// Bytes per transfer
    #[arg(short = 's', value_name = "BYTES", default_value_t = DEFAULT_DATASIZE)]
    datasize: usize,

    /// Repetitions per pair
    #[arg(short = 'r', value_name = "COUNT", default_value_t = DEFAULT_REPS)]
    reps: usize,

    /// Participants as threads or forked processes
    #[arg(long, value_enum, default_value_t = Model::Thread)]
    model: Model,

    /// How coordination waits poll
    #[arg(long, value_enum, default_value_t = Wait::Spin)]
    wait: Wait,

    /// Bound on every coordination wait, in seconds
    #[arg(long, value_name = "SECS", default_value_t = 300)]
    timeout: u64,

    /// Advise transparent huge pages on transfer buffers
    #[arg(long)]
    huge_pages: bool,

    /// Bind each buffer to its owner core's NUMA node
    #[arg(long)]
    numa_bind: bool,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Model {
    Thread,
    Process,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Wait {
    Spin,
    Backoff,
}

impl Args {
    fn config(&self) -> Result<BenchConfig> {
        let config = BenchConfig::builder()
            .placement(if self.inter {
                Placement::InterSocket
            } else {
                Placement::IntraSocket
            })
            .policy(if self.cold {
                BufferPolicy::Cold
            } else {
                BufferPolicy::Hot
            })
            .datasize(self.datasize)
            .reps(self.reps)
            .model(match self.model {
                Model::Thread => ExecutionModel::Thread,
                Model::Process => ExecutionModel::Process,
            })
            .wait(match self.wait {
                Wait::Spin => WaitStrategy::SpinYield,
                Wait::Backoff => WaitStrategy::Backoff,
            })
            .timeout(Duration::from_secs(self.timeout))
            .huge_pages(self.huge_pages)
            .numa_bind(self.numa_bind)
            .build()?;
        Ok(config)
    }
}

fn run(args: &Args) -> Result<()> {
    let config = args.config().context("invalid configuration")?;
    let topology = Topology::discover().context("failed to load topology")?;
    topology.log_topology();

    let mut reporter = Reporter::new(std::io::stderr());
    let reports = Harness::new(&config, &topology)
        .run(&mut reporter)
        .context("benchmark run failed")?;
    info!(rounds = reports.len(), "run complete");
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("numaxfer={}", args.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("numaxfer {}", env!("CARGO_PKG_VERSION"));

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
