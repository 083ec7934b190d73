//! Thread execution model.
//!
//! Every participant is a thread of this process. The destination thread of
//! a pair pins, allocates, and hands its buffer back through its join
//! handle; the buffer then moves into the source thread, which is the only
//! writer for the rest of the round. Data moves with [`LocalCopy`].
//!
//! Sources pin, fill their own buffer and signal ready before spinning on
//! the release flag. The orchestrator releases only once all of them are
//! ready.
//!
//! Participant threads are not scoped: a participant that never returns is
//! left behind once its wait times out, so the orchestrator always gets back
//! control within the configured bound.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::config::BenchConfig;
use super::measurement::{Measurement, RoundReport};
use super::schedule::{Pair, Role, Round};
use crate::buffer::TransferBuffer;
use crate::numa::Topology;
use crate::sync::{deadline_after, poll_until, RendezvousBarrier, SyncError, WaitPhase, WaitStrategy};
use crate::transfer::{run_timed_loop, LocalCopy, TransferPrimitive};
use crate::{Error, ErrorKind, Result};

/// How long stragglers get to exit once a round has failed.
const ABORT_GRACE: Duration = Duration::from_secs(1);

/// Runs one round with thread participants.
pub(super) fn run_round(
    config: &BenchConfig,
    topology: &Topology,
    round: &Round,
) -> Result<RoundReport> {
    let barrier = Arc::new(RendezvousBarrier::new(round.pairs.len()));
    let topology = Arc::new(topology.clone());
    let mut sources: Vec<(Pair, JoinHandle<Result<Measurement>>)> =
        Vec::with_capacity(round.pairs.len());

    for &pair in &round.pairs {
        let spawned = setup_destination(config, &topology, pair).and_then(|destination| {
            spawn_source(config, &topology, &barrier, pair, destination)
        });
        match spawned {
            Ok(handle) => sources.push((pair, handle)),
            Err(e) => {
                barrier.abort();
                let _ = join_sources(sources, failure_deadline(config));
                return Err(e);
            }
        }
    }

    let ready = barrier
        .await_all_ready(config.wait, deadline_after(config.timeout))
        .and_then(|()| barrier.release());
    let release_ns = match ready {
        Ok(ts) => ts,
        Err(e) => {
            barrier.abort();
            let errors = join_sources(sources, failure_deadline(config)).1;
            return Err(root_cause(primary_error(errors), e.into()));
        }
    };
    debug!(round = round.label, pairs = round.pairs.len(), "released");

    let drained = barrier.await_all_complete(config.wait, deadline_after(config.timeout));
    let join_deadline = if drained.is_ok() {
        deadline_after(config.timeout)
    } else {
        barrier.abort();
        failure_deadline(config)
    };

    let (measurements, errors) = join_sources(sources, join_deadline);
    let drain_ns = match (primary_error(errors), drained) {
        (None, Ok(ts)) => ts,
        (Some(e), Ok(_)) => return Err(e),
        (participant, Err(e)) => return Err(root_cause(participant, e.into())),
    };

    Ok(RoundReport {
        round: round.clone(),
        measurements,
        release_ns,
        drain_ns,
    })
}

fn failure_deadline(config: &BenchConfig) -> Instant {
    deadline_after(config.timeout.min(ABORT_GRACE))
}

fn participant(pair: Pair, role: Role) -> impl Fn(Error) -> Error {
    move |e| Error::Participant {
        pair,
        role,
        source: Box::new(e),
    }
}

/// Spawns the destination thread and joins it, bounded by the timeout.
fn setup_destination(
    config: &BenchConfig,
    topology: &Arc<Topology>,
    pair: Pair,
) -> Result<TransferBuffer> {
    let node = topology.core(pair.destination)?.numa_node;
    let (policy, datasize, reps) = (config.policy, config.datasize, config.reps);
    let options = config.alloc_options(node);
    let topology = Arc::clone(topology);

    let handle = thread::Builder::new()
        .name(format!("dst-{pair}"))
        .spawn(move || -> Result<TransferBuffer> {
            topology.pin_current_unit(pair.destination)?;
            Ok(TransferBuffer::allocate(policy, datasize, reps, options)?)
        })
        .map_err(|source| Error::SpawnFailed {
            pair,
            role: Role::Destination,
            source,
        })?;

    let deadline = deadline_after(config.timeout);
    poll_until(
        WaitStrategy::Backoff,
        deadline,
        WaitPhase::DestinationReady,
        || Ok::<_, SyncError>(handle.is_finished().then_some(())),
    )
    .map_err(|e| participant(pair, Role::Destination)(e.into()))?;

    let buffer = match handle.join() {
        Ok(result) => result.map_err(participant(pair, Role::Destination))?,
        Err(payload) => std::panic::resume_unwind(payload),
    };
    debug!(%pair, bytes = buffer.len(), "destination ready");
    Ok(buffer)
}

fn spawn_source(
    config: &BenchConfig,
    topology: &Arc<Topology>,
    barrier: &Arc<RendezvousBarrier>,
    pair: Pair,
    destination: TransferBuffer,
) -> Result<JoinHandle<Result<Measurement>>> {
    let config = config.clone();
    let topology = Arc::clone(topology);
    let barrier = Arc::clone(barrier);

    thread::Builder::new()
        .name(format!("src-{pair}"))
        .spawn(move || {
            let result = run_source(&config, &topology, &barrier, pair, destination);
            if result.is_err() {
                barrier.abort();
            }
            result.map_err(participant(pair, Role::Source))
        })
        .map_err(|source| Error::SpawnFailed {
            pair,
            role: Role::Source,
            source,
        })
}

fn run_source(
    config: &BenchConfig,
    topology: &Topology,
    barrier: &RendezvousBarrier,
    pair: Pair,
    destination: TransferBuffer,
) -> Result<Measurement> {
    topology.pin_current_unit(pair.source)?;
    let source = TransferBuffer::allocate(
        config.policy,
        config.datasize,
        config.reps,
        config.alloc_options(topology.core(pair.source)?.numa_node),
    )?;
    let mut primitive = LocalCopy::new(destination);

    debug!(%pair, primitive = primitive.name(), "source ready");
    barrier.signal_ready()?;
    barrier.await_release(config.wait, deadline_after(config.timeout))?;
    let stats = run_timed_loop(&mut primitive, &source)?;
    barrier.signal_completion()?;

    Ok(Measurement::from_stats(pair, &stats))
}

/// Joins every source that finishes before `deadline`; the rest are left
/// running and reported as timed out.
fn join_sources(
    sources: Vec<(Pair, JoinHandle<Result<Measurement>>)>,
    deadline: Instant,
) -> (Vec<Measurement>, Vec<Error>) {
    let mut measurements = Vec::with_capacity(sources.len());
    let mut errors = Vec::new();

    for (pair, handle) in sources {
        let finished = poll_until(WaitStrategy::Backoff, deadline, WaitPhase::Drain, || {
            Ok::<_, SyncError>(handle.is_finished().then_some(()))
        });
        if let Err(e) = finished {
            warn!(%pair, "source participant did not exit, leaving it behind");
            errors.push(participant(pair, Role::Source)(e.into()));
            continue;
        }
        match handle.join() {
            Ok(Ok(m)) => measurements.push(m),
            Ok(Err(e)) => errors.push(e),
            Err(payload) => std::panic::resume_unwind(payload),
        }
    }
    (measurements, errors)
}

/// Picks the error that caused the round to fail over the aborts it triggered.
fn primary_error(errors: Vec<Error>) -> Option<Error> {
    let mut errors = errors.into_iter();
    let first = errors.next()?;
    if first.kind() != ErrorKind::ParticipantAborted {
        return Some(first);
    }
    Some(
        errors
            .find(|e| e.kind() != ErrorKind::ParticipantAborted)
            .unwrap_or(first),
    )
}

/// A participant's own failure wins over the orchestrator's; a participant
/// that only saw the abort yields to the orchestrator's error.
fn root_cause(participant: Option<Error>, orchestrator: Error) -> Error {
    match participant {
        Some(e) if e.kind() != ErrorKind::ParticipantAborted => e,
        _ => orchestrator,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferPolicy;
    use crate::harness::schedule::RoundPlan;
    use crate::harness::Placement;
    use crate::numa::{affinity, CoreId};

    fn topology(count: usize) -> Topology {
        let cpus = affinity::allowed_cpus().unwrap();
        Topology::uniform(count, &cpus).unwrap()
    }

    fn config(policy: BufferPolicy) -> BenchConfig {
        BenchConfig::builder()
            .policy(policy)
            .datasize(64 * 1024)
            .reps(8)
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap()
    }

    #[test]
    fn test_round_measures_every_pair() {
        let topology = topology(8);
        let config = config(BufferPolicy::Cold);
        let plan = RoundPlan::new(Placement::IntraSocket, 8).unwrap();
        let round = &plan.rounds()[1];

        let report = run_round(&config, &topology, round).unwrap();
        assert_eq!(report.measurements.len(), 2);
        assert_eq!(report.total_bytes(), 2 * 64 * 1024 * 8);
        assert!(report.timestamps_within_window());
        assert!(report.aggregate_bandwidth() <= report.sum_pair_bandwidth());
    }

    #[test]
    fn test_primary_error_skips_aborts() {
        let pair = Pair::new(CoreId(0), CoreId(1));
        let aborted = participant(pair, Role::Source)(Error::Sync(SyncError::Aborted {
            phase: WaitPhase::Release,
        }));
        let real = participant(pair, Role::Destination)(Error::InvalidConfig("x".into()));
        let picked = primary_error(vec![aborted, real]).unwrap();
        assert_eq!(picked.kind(), ErrorKind::SetupFailure);
        assert!(primary_error(Vec::new()).is_none());
    }

    #[test]
    fn test_orchestrator_timeout_beats_induced_aborts() {
        let pair = Pair::new(CoreId(0), CoreId(1));
        let aborted = participant(pair, Role::Source)(Error::Sync(SyncError::Aborted {
            phase: WaitPhase::Release,
        }));
        let timeout = Error::Sync(SyncError::Timeout {
            phase: WaitPhase::SourcesReady,
            waited: Duration::from_millis(5),
        });
        let err = root_cause(primary_error(vec![aborted]), timeout);
        assert_eq!(err.kind(), ErrorKind::CoordinationTimeout);

        let real = participant(pair, Role::Source)(Error::InvalidConfig("x".into()));
        let timeout = Error::Sync(SyncError::Timeout {
            phase: WaitPhase::Drain,
            waited: Duration::from_millis(5),
        });
        assert_eq!(root_cause(Some(real), timeout).kind(), ErrorKind::SetupFailure);
    }

    #[test]
    fn test_unpinnable_destination_fails_round() {
        let cpus = affinity::allowed_cpus().unwrap();
        let mut cores = Topology::uniform(4, &cpus).unwrap().cores().to_vec();
        cores[1].cpus = vec![1023];
        let topology = Topology::from_cores(cores).unwrap();
        let config = config(BufferPolicy::Hot);
        let round = Round {
            index: 1,
            label: 1,
            pairs: vec![Pair::new(CoreId(0), CoreId(1))],
        };

        let err = run_round(&config, &topology, &round).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SetupFailure);
        assert!(matches!(
            err,
            Error::Participant {
                role: Role::Destination,
                ..
            }
        ));
    }
}
