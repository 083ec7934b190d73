//! Human-readable benchmark report.
//!
//! The report is the measurement output, not diagnostics, so it goes to a
//! plain writer rather than through `tracing`.

use std::io::Write;

use super::config::BenchConfig;
use super::measurement::{RoundReport, BYTES_PER_GB};

const MIB: usize = 1024 * 1024;

/// Writes the run header, then one block per drained round.
#[derive(Debug)]
pub struct Reporter<W: Write> {
    out: W,
}

impl<W: Write> Reporter<W> {
    /// Creates a reporter writing to `out`.
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Writes the configuration header.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from the sink.
    pub fn header(&mut self, config: &BenchConfig, num_cores: usize) -> std::io::Result<()> {
        writeln!(self.out, "# REPS : {}", config.reps)?;
        writeln!(self.out, "# BUFSZ: {} Mb", config.datasize / MIB)?;
        writeln!(
            self.out,
            "# intra: {} / cold: {}",
            u8::from(config.placement.is_intra()),
            u8::from(config.policy.is_cold())
        )?;
        writeln!(self.out, "# model: {} / cores: {num_cores}", config.model)?;
        writeln!(self.out, "# MEASURE as GB/s/core")?;
        self.out.flush()
    }

    /// Writes one round: separator, one line per pair, then the total.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from the sink.
    pub fn round(&mut self, report: &RoundReport) -> std::io::Result<()> {
        writeln!(self.out, "# ====")?;
        for m in &report.measurements {
            writeln!(
                self.out,
                "[{:03}]{}-->{}:{:.6}",
                report.round.label,
                m.pair.source,
                m.pair.destination,
                m.bandwidth() / BYTES_PER_GB
            )?;
        }
        writeln!(
            self.out,
            "[{:03}]TOTAL:{:.6}",
            report.measurements.len(),
            report.aggregate_bandwidth() / BYTES_PER_GB
        )?;
        self.out.flush()
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferPolicy;
    use crate::clock::NANOS_PER_SEC;
    use crate::harness::config::{ExecutionModel, Placement};
    use crate::harness::measurement::Measurement;
    use crate::harness::schedule::{Pair, Round};
    use crate::numa::CoreId;

    #[test]
    fn test_header_format() {
        let config = BenchConfig::builder()
            .placement(Placement::InterSocket)
            .policy(BufferPolicy::Cold)
            .datasize(4 * MIB)
            .reps(7)
            .model(ExecutionModel::Process)
            .build()
            .unwrap();
        let mut reporter = Reporter::new(Vec::new());
        reporter.header(&config, 16).unwrap();
        let text = String::from_utf8(reporter.into_inner()).unwrap();
        assert_eq!(
            text,
            "# REPS : 7\n# BUFSZ: 4 Mb\n# intra: 0 / cold: 1\n# model: process / cores: 16\n# MEASURE as GB/s/core\n"
        );
    }

    #[test]
    fn test_round_format() {
        let pair = Pair::new(CoreId(0), CoreId(4));
        let report = RoundReport {
            round: Round {
                index: 3,
                label: 2,
                pairs: vec![pair],
            },
            measurements: vec![Measurement {
                pair,
                bytes: 1 << 30,
                elapsed_ns: NANOS_PER_SEC / 2,
                first_start_ns: 10,
                last_end_ns: 10 + NANOS_PER_SEC / 2,
            }],
            release_ns: 10,
            drain_ns: 10 + NANOS_PER_SEC,
        };
        let mut reporter = Reporter::new(Vec::new());
        reporter.round(&report).unwrap();
        let text = String::from_utf8(reporter.into_inner()).unwrap();
        assert_eq!(text, "# ====\n[002]000-->004:2.000000\n[001]TOTAL:1.000000\n");
    }
}
