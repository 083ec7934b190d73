//! Per-pair measurements and round aggregation.

use super::schedule::{Pair, Round};
use crate::clock::ns_to_secs;
use crate::transfer::TransferStats;

/// Bytes per GB in the report (binary gigabyte).
#[allow(clippy::cast_precision_loss)]
pub const BYTES_PER_GB: f64 = (1u64 << 30) as f64;

/// `bytes / ns` as bytes per second; a zero duration counts as 1 ns.
#[allow(clippy::cast_precision_loss)]
fn bytes_per_sec(bytes: u64, ns: u64) -> f64 {
    bytes as f64 / ns_to_secs(ns.max(1))
}

/// One pair's result for one round, produced by its source participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Measurement {
    /// The pair measured
    pub pair: Pair,
    /// Bytes moved over all repetitions
    pub bytes: u64,
    /// Sum of per-transfer elapsed times
    pub elapsed_ns: u64,
    /// Start of the first transfer
    pub first_start_ns: u64,
    /// End of the last transfer
    pub last_end_ns: u64,
}

impl Measurement {
    /// Builds a measurement from a source's accumulated stats.
    #[must_use]
    pub fn from_stats(pair: Pair, stats: &TransferStats) -> Self {
        Self {
            pair,
            bytes: stats.bytes,
            elapsed_ns: stats.elapsed_ns,
            first_start_ns: stats.first_start_ns,
            last_end_ns: stats.last_end_ns,
        }
    }

    /// Returns the pair's bandwidth in bytes per second.
    #[must_use]
    pub fn bandwidth(&self) -> f64 {
        bytes_per_sec(self.bytes, self.elapsed_ns)
    }
}

/// Result of one drained round.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundReport {
    /// The round that ran
    pub round: Round,
    /// One measurement per pair, in pair order
    pub measurements: Vec<Measurement>,
    /// Barrier release timestamp
    pub release_ns: u64,
    /// Timestamp at which the last completion was observed
    pub drain_ns: u64,
}

impl RoundReport {
    /// Total bytes moved by every pair.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.measurements.iter().map(|m| m.bytes).sum()
    }

    /// Wall time from release to drain.
    #[must_use]
    pub fn window_ns(&self) -> u64 {
        self.drain_ns.saturating_sub(self.release_ns)
    }

    /// Concurrent throughput of the round in bytes per second.
    ///
    /// Uses the release-to-drain window, never the per-pair sums, so pairs
    /// that contend show up as a lower figure.
    #[must_use]
    pub fn aggregate_bandwidth(&self) -> f64 {
        bytes_per_sec(self.total_bytes(), self.window_ns())
    }

    /// Sum of the individually measured per-pair bandwidths.
    #[must_use]
    pub fn sum_pair_bandwidth(&self) -> f64 {
        self.measurements.iter().map(Measurement::bandwidth).sum()
    }

    /// Returns true if every transfer lies inside the release/drain window.
    #[must_use]
    pub fn timestamps_within_window(&self) -> bool {
        self.measurements.iter().all(|m| {
            m.first_start_ns >= self.release_ns
                && m.last_end_ns <= self.drain_ns
                && m.first_start_ns <= m.last_end_ns
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::NANOS_PER_SEC;
    use crate::numa::CoreId;

    fn measurement(src: usize, dst: usize, elapsed_ns: u64, start: u64) -> Measurement {
        Measurement {
            pair: Pair::new(CoreId(src), CoreId(dst)),
            bytes: 1 << 30,
            elapsed_ns,
            first_start_ns: start,
            last_end_ns: start + elapsed_ns,
        }
    }

    fn report(measurements: Vec<Measurement>, release_ns: u64, drain_ns: u64) -> RoundReport {
        let pairs = measurements.iter().map(|m| m.pair).collect();
        RoundReport {
            round: Round {
                index: 1,
                label: 1,
                pairs,
            },
            measurements,
            release_ns,
            drain_ns,
        }
    }

    #[test]
    fn test_pair_bandwidth() {
        let m = measurement(0, 1, NANOS_PER_SEC, 0);
        assert!((m.bandwidth() - BYTES_PER_GB).abs() < 1.0);
    }

    #[test]
    fn test_aggregate_uses_window() {
        // Two pairs, each 1 GiB in 1 s, but they overlapped only partly: 1.5 s window.
        let r = report(
            vec![
                measurement(0, 2, NANOS_PER_SEC, 100),
                measurement(1, 3, NANOS_PER_SEC, 100 + NANOS_PER_SEC / 2),
            ],
            100,
            100 + NANOS_PER_SEC * 3 / 2,
        );
        assert_eq!(r.total_bytes(), 2 << 30);
        let expected = 2.0 * BYTES_PER_GB / 1.5;
        assert!((r.aggregate_bandwidth() - expected).abs() < 1.0);
        assert!(r.aggregate_bandwidth() <= r.sum_pair_bandwidth());
        assert!(r.timestamps_within_window());
    }

    #[test]
    fn test_start_before_release_detected() {
        let r = report(vec![measurement(0, 1, 10, 50)], 100, 1_000);
        assert!(!r.timestamps_within_window());
    }

    #[test]
    fn test_zero_window_does_not_divide_by_zero() {
        let r = report(vec![measurement(0, 1, 0, 10)], 10, 10);
        assert!(r.aggregate_bandwidth().is_finite());
        assert!(r.aggregate_bandwidth() <= r.sum_pair_bandwidth());
    }
}
