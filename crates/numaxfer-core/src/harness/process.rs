//! Process execution model.
//!
//! Every participant is a forked child. The round's barrier and one
//! `PairSlot` per pair live in a `MAP_SHARED` mapping created before the
//! first fork, so parent and children address the same physical pages.
//!
//! ```text
//! orchestrator                destination child           source child
//! ────────────                ─────────────────           ────────────
//! fork dst ─────────────────► prctl, pin, allocate
//! wait slot READY ◄────────── publish pid + base addr
//! fork src ─────────────────────────────────────────────► pin, allocate
//! wait all ready ◄────────────────────────────────────── signal_ready
//! release() ────────────────────────────────────────────► await_release
//!                             hold until source done ◄─── process_vm_writev ×reps
//! await_all_complete ◄─────────────────────────────────── stats → slot, signal
//! reap (SIGKILL on failure)
//! ```
//!
//! Children never log and never unwind into the parent's frames: they report
//! through their slot (failure kind, stage, errno) and leave with `_exit`.
//! A panicking child prints nothing and exits with `EXIT_PANICKED`.

use std::io;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicI32, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::config::BenchConfig;
use super::measurement::{Measurement, RoundReport};
use super::schedule::{Pair, Role, Round};
use crate::buffer::{ProcessShared, SharedArray, TransferBuffer};
use crate::numa::Topology;
use crate::sync::{deadline_after, poll_until, RendezvousBarrier, WaitPhase, WaitStrategy};
use crate::transfer::{
    run_timed_loop, RemoteRegion, RemoteWrite, TransferPrimitive, TransferStats,
};
use crate::{Error, ErrorKind, Result};

const PENDING: u32 = 0;
const READY: u32 = 1;
const DONE: u32 = 2;
const FAILED: u32 = 3;

const EXIT_OK: i32 = 0;
const EXIT_FAILED: i32 = 1;
const EXIT_PANICKED: i32 = 101;

/// Drain polls between two child liveness checks.
const LIVENESS_INTERVAL: u32 = 1024;
/// How long children get to exit on their own before being killed.
const REAP_GRACE: Duration = Duration::from_secs(1);

/// Where in its lifecycle a child failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Pin = 1,
    Allocate = 2,
    AwaitRelease = 3,
    Transfer = 4,
    Complete = 5,
    Hold = 6,
    Ready = 7,
}

impl Stage {
    fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            1 => Self::Pin,
            2 => Self::Allocate,
            3 => Self::AwaitRelease,
            4 => Self::Transfer,
            5 => Self::Complete,
            6 => Self::Hold,
            7 => Self::Ready,
            _ => return None,
        })
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pin => "core pinning",
            Self::Allocate => "buffer allocation",
            Self::AwaitRelease => "waiting for release",
            Self::Transfer => "transfer",
            Self::Complete => "completion signal",
            Self::Hold => "buffer hold",
            Self::Ready => "ready signal",
        };
        f.write_str(name)
    }
}

/// A child-side failure before it is flattened into a [`FailureRecord`].
struct Failure {
    stage: Stage,
    error: Error,
}

impl Failure {
    fn at<E: Into<Error>>(stage: Stage) -> impl FnOnce(E) -> Self {
        move |e| Self {
            stage,
            error: e.into(),
        }
    }
}

/// Failure report a child leaves in shared memory before exiting.
#[repr(C)]
#[derive(Debug, Default)]
struct FailureRecord {
    kind: AtomicU32,
    stage: AtomicU32,
    errno: AtomicI32,
}

impl FailureRecord {
    fn store(&self, failure: &Failure) {
        self.stage.store(failure.stage as u32, Ordering::Relaxed);
        self.errno.store(os_errno(&failure.error), Ordering::Relaxed);
        self.kind.store(failure.error.kind().code(), Ordering::Release);
    }

    fn load(&self) -> Option<(ErrorKind, Option<Stage>, i32)> {
        let kind = ErrorKind::from_code(self.kind.load(Ordering::Acquire))?;
        let stage = Stage::from_code(self.stage.load(Ordering::Relaxed));
        Some((kind, stage, self.errno.load(Ordering::Relaxed)))
    }
}

/// Per-pair rendezvous between the orchestrator and the pair's two children.
#[repr(C)]
#[derive(Debug, Default)]
struct PairSlot {
    dest_state: AtomicU32,
    dest_pid: AtomicI32,
    dest_addr: AtomicUsize,
    dest_len: AtomicUsize,
    dest_failure: FailureRecord,
    src_state: AtomicU32,
    src_failure: FailureRecord,
    bytes: AtomicU64,
    elapsed_ns: AtomicU64,
    first_start_ns: AtomicU64,
    last_end_ns: AtomicU64,
}

// SAFETY: atomics only.
#[allow(unsafe_code)]
unsafe impl ProcessShared for PairSlot {}

impl PairSlot {
    fn failure(&self, role: Role) -> &FailureRecord {
        match role {
            Role::Source => &self.src_failure,
            Role::Destination => &self.dest_failure,
        }
    }

    fn store_stats(&self, stats: &TransferStats) {
        self.bytes.store(stats.bytes, Ordering::Relaxed);
        self.elapsed_ns.store(stats.elapsed_ns, Ordering::Relaxed);
        self.first_start_ns
            .store(stats.first_start_ns, Ordering::Relaxed);
        self.last_end_ns.store(stats.last_end_ns, Ordering::Relaxed);
        self.src_state.store(DONE, Ordering::Release);
    }

    fn measurement(&self, pair: Pair) -> Option<Measurement> {
        if self.src_state.load(Ordering::Acquire) != DONE {
            return None;
        }
        Some(Measurement {
            pair,
            bytes: self.bytes.load(Ordering::Relaxed),
            elapsed_ns: self.elapsed_ns.load(Ordering::Relaxed),
            first_start_ns: self.first_start_ns.load(Ordering::Relaxed),
            last_end_ns: self.last_end_ns.load(Ordering::Relaxed),
        })
    }
}

/// Extracts the first OS error code from an error chain, 0 if none.
fn os_errno(error: &Error) -> i32 {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(error);
    while let Some(e) = current {
        if let Some(code) = e.downcast_ref::<io::Error>().and_then(io::Error::raw_os_error) {
            return code;
        }
        current = e.source();
    }
    0
}

/// How a reaped child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Code(i32),
    Signal(i32),
    Unknown,
}

impl std::fmt::Display for Exit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Code(code) => write!(f, "exited with status {code}"),
            Self::Signal(sig) => write!(f, "killed by signal {sig}"),
            Self::Unknown => f.write_str("exit status unavailable"),
        }
    }
}

fn decode_status(status: libc::c_int) -> Exit {
    if libc::WIFEXITED(status) {
        Exit::Code(libc::WEXITSTATUS(status))
    } else if libc::WIFSIGNALED(status) {
        Exit::Signal(libc::WTERMSIG(status))
    } else {
        Exit::Unknown
    }
}

/// One forked participant.
#[derive(Debug)]
struct Child {
    pid: libc::pid_t,
    slot: usize,
    pair: Pair,
    role: Role,
    exit: Option<Exit>,
}

impl Child {
    /// Non-blocking reap; returns the exit once the child is gone.
    #[allow(unsafe_code)]
    fn try_reap(&mut self) -> Option<Exit> {
        if self.exit.is_none() {
            let mut status: libc::c_int = 0;
            // SAFETY: `pid` is our own unreaped child; `status` is writable.
            let ret = unsafe { libc::waitpid(self.pid, &raw mut status, libc::WNOHANG) };
            if ret == self.pid {
                self.exit = Some(decode_status(status));
            } else if ret < 0 {
                self.exit = Some(Exit::Unknown);
            }
        }
        self.exit
    }

    /// Sends `SIGKILL` and blocks until the child is reaped.
    #[allow(unsafe_code)]
    fn kill_and_reap(&mut self) {
        if self.exit.is_some() {
            return;
        }
        // SAFETY: signalling and waiting on our own unreaped child.
        unsafe {
            libc::kill(self.pid, libc::SIGKILL);
        }
        loop {
            let mut status: libc::c_int = 0;
            // SAFETY: as above.
            let ret = unsafe { libc::waitpid(self.pid, &raw mut status, 0) };
            if ret == self.pid {
                self.exit = Some(decode_status(status));
                return;
            }
            if ret < 0 && io::Error::last_os_error().kind() != io::ErrorKind::Interrupted {
                self.exit = Some(Exit::Unknown);
                return;
            }
        }
    }
}

/// Every child of a round. Dropping it kills and reaps whatever is left, so
/// no exit path of the orchestrator leaves a child behind.
#[derive(Debug, Default)]
struct RoundChildren {
    children: Vec<Child>,
}

impl RoundChildren {
    /// Forks a participant running `body`; the child exits with its return
    /// value and never returns into the caller.
    #[allow(unsafe_code)]
    fn fork(
        &mut self,
        slot: usize,
        pair: Pair,
        role: Role,
        body: impl FnOnce() -> i32,
    ) -> Result<usize> {
        // SAFETY: the child only runs `body`, which touches memory mapped
        // before the fork, performs raw syscalls, and leaves via `_exit`
        // without running destructors of state it shares with the parent.
        let pid = unsafe { libc::fork() };
        match pid {
            -1 => Err(Error::SpawnFailed {
                pair,
                role,
                source: io::Error::last_os_error(),
            }),
            0 => {
                // The default hook locks stderr, which a thread of the
                // parent may have held at fork time.
                std::panic::set_hook(Box::new(|_| {}));
                let code =
                    std::panic::catch_unwind(AssertUnwindSafe(body)).unwrap_or(EXIT_PANICKED);
                // SAFETY: terminates the child without unwinding or atexit handlers.
                unsafe { libc::_exit(code) }
            }
            pid => {
                debug!(%pair, %role, pid, "forked participant");
                self.children.push(Child {
                    pid,
                    slot,
                    pair,
                    role,
                    exit: None,
                });
                Ok(self.children.len() - 1)
            }
        }
    }

    /// Waits for every child to exit on its own until `deadline`, then
    /// kills the rest.
    fn reap_all(&mut self, deadline: Instant) {
        let _ = poll_until(WaitStrategy::Backoff, deadline, WaitPhase::Drain, || {
            let mut all = true;
            for child in &mut self.children {
                all &= child.try_reap().is_some();
            }
            Ok::<_, Error>(all.then_some(()))
        });
        self.kill_all();
    }

    fn kill_all(&mut self) {
        for child in &mut self.children {
            if child.exit.is_none() {
                warn!(pair = %child.pair, role = %child.role, pid = child.pid, "killing participant");
            }
            child.kill_and_reap();
        }
    }

    /// Fails if a participant is gone before finishing its part.
    fn check_alive(&mut self, slots: &[PairSlot]) -> Result<()> {
        for child in &mut self.children {
            let already_gone = child.exit.is_some();
            let Some(exit) = child.try_reap() else {
                continue;
            };
            if already_gone {
                continue;
            }
            let slot = &slots[child.slot];
            let finished = match child.role {
                Role::Source => slot.src_state.load(Ordering::Acquire) == DONE,
                Role::Destination => slot.src_state.load(Ordering::Acquire) != PENDING,
            };
            if !finished {
                return Err(child_error(child.pair, child.role, slot, Some(exit)));
            }
        }
        Ok(())
    }
}

impl Drop for RoundChildren {
    fn drop(&mut self) {
        self.kill_all();
    }
}

/// Builds the orchestrator-side error for a failed child.
fn child_error(pair: Pair, role: Role, slot: &PairSlot, exit: Option<Exit>) -> Error {
    if let Some((kind, stage, errno)) = slot.failure(role).load() {
        let stage = stage.map_or_else(|| "participant".to_string(), |s| s.to_string());
        let detail = if errno == 0 {
            format!("{stage} failed")
        } else {
            format!("{stage} failed: {}", io::Error::from_raw_os_error(errno))
        };
        return Error::ChildProcess {
            pair,
            role,
            kind,
            detail,
        };
    }
    let kind = match role {
        Role::Destination => ErrorKind::SetupFailure,
        Role::Source => ErrorKind::TransferFailure,
    };
    let detail = exit.map_or_else(|| "no report".to_string(), |e| format!("{e} without a report"));
    Error::ChildProcess {
        pair,
        role,
        kind,
        detail,
    }
}

/// Picks the failure that caused the round to fail over the aborts it
/// triggered, scanning every slot's reports.
fn reported_failure(slots: &[PairSlot], round: &Round) -> Option<Error> {
    let mut aborted = None;
    for (slot, &pair) in slots.iter().zip(&round.pairs) {
        for role in [Role::Destination, Role::Source] {
            let Some((kind, ..)) = slot.failure(role).load() else {
                continue;
            };
            let error = child_error(pair, role, slot, None);
            if kind != ErrorKind::ParticipantAborted {
                return Some(error);
            }
            aborted.get_or_insert(error);
        }
    }
    aborted
}

/// Attaches pair and role to orchestrator-side wait failures; child
/// reports already carry both.
fn wrap(pair: Pair, role: Role) -> impl FnOnce(Error) -> Error {
    move |e| match e {
        Error::Sync(_) => Error::Participant {
            pair,
            role,
            source: Box::new(e),
        },
        other => other,
    }
}

/// Runs one round with forked participants.
pub(super) fn run_round(
    config: &BenchConfig,
    topology: &Topology,
    round: &Round,
) -> Result<RoundReport> {
    let barrier_mem = SharedArray::new(1, |_| RendezvousBarrier::new(round.pairs.len()))?;
    let barrier = &barrier_mem[0];
    let slots = SharedArray::new(round.pairs.len(), |_| PairSlot::default())?;
    let mut children = RoundChildren::default();

    let result = drive_round(config, topology, round, barrier, &slots, &mut children);
    match result {
        Ok((release_ns, drain_ns)) => {
            children.reap_all(deadline_after(config.timeout.min(REAP_GRACE)));
            let measurements = slots
                .iter()
                .zip(&round.pairs)
                .filter_map(|(slot, &pair)| slot.measurement(pair))
                .collect();
            Ok(RoundReport {
                round: round.clone(),
                measurements,
                release_ns,
                drain_ns,
            })
        }
        Err(e) => {
            barrier.abort();
            children.reap_all(deadline_after(config.timeout.min(REAP_GRACE)));
            Err(reported_failure(&slots, round).unwrap_or(e))
        }
    }
}

fn drive_round(
    config: &BenchConfig,
    topology: &Topology,
    round: &Round,
    barrier: &RendezvousBarrier,
    slots: &[PairSlot],
    children: &mut RoundChildren,
) -> Result<(u64, u64)> {
    let hold_timeout = config
        .timeout
        .saturating_mul(u32::try_from(round.pairs.len() + 2).unwrap_or(u32::MAX));

    for (idx, (slot, &pair)) in slots.iter().zip(&round.pairs).enumerate() {
        let dst = children.fork(idx, pair, Role::Destination, || {
            let outcome = run_destination(config, topology, pair, barrier, slot, hold_timeout);
            exit_code(outcome, slot, Role::Destination, barrier)
        })?;
        let target = await_destination(config, slot, &mut children.children[dst])
            .map_err(wrap(pair, Role::Destination))?;
        let primitive = RemoteWrite::new(target);
        debug!(
            %pair,
            pid = target.pid,
            addr = target.base_addr,
            primitive = primitive.name(),
            "destination ready"
        );

        children.fork(idx, pair, Role::Source, || {
            let outcome = run_source(config, topology, pair, barrier, slot, primitive);
            exit_code(outcome, slot, Role::Source, barrier)
        })?;
    }

    barrier.await_all_ready_with(
        config.wait,
        deadline_after(config.timeout),
        liveness(children, slots),
    )?;
    let release_ns = barrier.release()?;
    debug!(round = round.label, pairs = round.pairs.len(), "released");

    let drain_ns = barrier.await_all_complete_with(
        config.wait,
        deadline_after(config.timeout),
        liveness(children, slots),
    )?;
    Ok((release_ns, drain_ns))
}

/// Poll hook that checks child liveness every `LIVENESS_INTERVAL` calls.
fn liveness<'a>(
    children: &'a mut RoundChildren,
    slots: &'a [PairSlot],
) -> impl FnMut() -> Result<()> + 'a {
    let mut polls: u32 = 0;
    move || {
        polls = polls.wrapping_add(1);
        if polls % LIVENESS_INTERVAL == 0 {
            children.check_alive(slots)
        } else {
            Ok(())
        }
    }
}

/// Waits for the destination to publish its buffer or fail.
fn await_destination(
    config: &BenchConfig,
    slot: &PairSlot,
    child: &mut Child,
) -> Result<RemoteRegion> {
    let read_ready = |slot: &PairSlot| RemoteRegion {
        pid: slot.dest_pid.load(Ordering::Relaxed),
        base_addr: slot.dest_addr.load(Ordering::Relaxed),
        len: slot.dest_len.load(Ordering::Relaxed),
        policy: config.policy,
        datasize: config.datasize,
    };

    poll_until(
        config.wait,
        deadline_after(config.timeout),
        WaitPhase::DestinationReady,
        || {
            match slot.dest_state.load(Ordering::Acquire) {
                READY => return Ok(Some(read_ready(slot))),
                FAILED => return Err(child_error(child.pair, child.role, slot, None)),
                _ => {}
            }
            if let Some(exit) = child.try_reap() {
                return Err(child_error(child.pair, child.role, slot, Some(exit)));
            }
            Ok(None)
        },
    )
}

/// Maps a child body's outcome to its exit code, reporting failures
/// through the slot.
fn exit_code(
    outcome: std::result::Result<(), Failure>,
    slot: &PairSlot,
    role: Role,
    barrier: &RendezvousBarrier,
) -> i32 {
    match outcome {
        Ok(()) => EXIT_OK,
        Err(failure) => {
            slot.failure(role).store(&failure);
            match role {
                Role::Destination => slot.dest_state.store(FAILED, Ordering::Release),
                Role::Source => slot.src_state.store(FAILED, Ordering::Release),
            }
            barrier.abort();
            EXIT_FAILED
        }
    }
}

/// Allows any process to `process_vm_writev` into this one. Source and
/// destination are siblings, which Yama's default scope would refuse.
#[allow(unsafe_code)]
fn allow_any_tracer() {
    // PR_SET_PTRACER_ANY
    let any: libc::c_ulong = libc::c_ulong::MAX;
    let unused: libc::c_ulong = 0;
    // SAFETY: prctl with integer arguments only; failure leaves permissions
    // unchanged and is ignored (no Yama, or already permissive).
    unsafe {
        libc::prctl(libc::PR_SET_PTRACER, any, unused, unused, unused);
    }
}

fn run_destination(
    config: &BenchConfig,
    topology: &Topology,
    pair: Pair,
    barrier: &RendezvousBarrier,
    slot: &PairSlot,
    hold_timeout: Duration,
) -> std::result::Result<(), Failure> {
    allow_any_tracer();
    topology
        .pin_current_unit(pair.destination)
        .map_err(Failure::at(Stage::Pin))?;

    let node = topology
        .core(pair.destination)
        .map_err(Failure::at(Stage::Pin))?
        .numa_node;
    let mut options = config.alloc_options(node);
    options.quiet = true;
    let buffer = TransferBuffer::allocate(config.policy, config.datasize, config.reps, options)
        .map_err(Failure::at(Stage::Allocate))?;

    // SAFETY: getpid has no preconditions and cannot fail.
    #[allow(unsafe_code)]
    let pid = unsafe { libc::getpid() };
    slot.dest_pid.store(pid, Ordering::Relaxed);
    slot.dest_addr.store(buffer.base_addr(), Ordering::Relaxed);
    slot.dest_len.store(buffer.len(), Ordering::Relaxed);
    slot.dest_state.store(READY, Ordering::Release);

    poll_until(
        WaitStrategy::Backoff,
        deadline_after(hold_timeout),
        WaitPhase::DestinationHold,
        || {
            let done = slot.src_state.load(Ordering::Acquire) != PENDING || barrier.is_aborted();
            Ok::<_, Error>(done.then_some(()))
        },
    )
    .map_err(Failure::at(Stage::Hold))?;

    drop(buffer);
    Ok(())
}

fn run_source(
    config: &BenchConfig,
    topology: &Topology,
    pair: Pair,
    barrier: &RendezvousBarrier,
    slot: &PairSlot,
    mut primitive: RemoteWrite,
) -> std::result::Result<(), Failure> {
    topology
        .pin_current_unit(pair.source)
        .map_err(Failure::at(Stage::Pin))?;

    let node = topology
        .core(pair.source)
        .map_err(Failure::at(Stage::Pin))?
        .numa_node;
    let mut options = config.alloc_options(node);
    options.quiet = true;
    let source = TransferBuffer::allocate(config.policy, config.datasize, config.reps, options)
        .map_err(Failure::at(Stage::Allocate))?;

    barrier.signal_ready().map_err(Failure::at(Stage::Ready))?;
    barrier
        .await_release(config.wait, deadline_after(config.timeout))
        .map_err(Failure::at(Stage::AwaitRelease))?;
    let stats = run_timed_loop(&mut primitive, &source).map_err(Failure::at(Stage::Transfer))?;

    slot.store_stats(&stats);
    barrier
        .signal_completion()
        .map_err(Failure::at(Stage::Complete))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numa::CoreId;
    use crate::sync::SyncError;
    use crate::transfer::TransferError;

    #[test]
    fn test_failure_record_roundtrip() {
        let slot = PairSlot::default();
        assert!(slot.failure(Role::Source).load().is_none());

        let failure = Failure::at(Stage::Transfer)(TransferError::Os {
            op: "process_vm_writev",
            source: io::Error::from_raw_os_error(libc::EPERM),
        });
        slot.failure(Role::Source).store(&failure);

        let (kind, stage, errno) = slot.failure(Role::Source).load().unwrap();
        assert_eq!(kind, ErrorKind::TransferFailure);
        assert_eq!(stage, Some(Stage::Transfer));
        assert_eq!(errno, libc::EPERM);
        assert!(slot.failure(Role::Destination).load().is_none());
    }

    #[test]
    fn test_reported_failure_prefers_root_cause() {
        let round = Round {
            index: 1,
            label: 1,
            pairs: vec![Pair::new(CoreId(0), CoreId(2)), Pair::new(CoreId(1), CoreId(3))],
        };
        let slots = [PairSlot::default(), PairSlot::default()];
        slots[0]
            .failure(Role::Source)
            .store(&Failure::at(Stage::AwaitRelease)(SyncError::Aborted {
                phase: WaitPhase::Release,
            }));
        slots[1]
            .failure(Role::Destination)
            .store(&Failure::at(Stage::Allocate)(crate::buffer::BufferError::ZeroSize));

        let err = reported_failure(&slots, &round).unwrap();
        assert_eq!(err.kind(), ErrorKind::SetupFailure);
        assert!(err.to_string().contains("buffer allocation failed"));
        assert!(err.to_string().contains("001->003"));
    }

    #[test]
    fn test_measurement_only_after_done() {
        let slot = PairSlot::default();
        let pair = Pair::new(CoreId(0), CoreId(1));
        assert!(slot.measurement(pair).is_none());
        slot.store_stats(&TransferStats {
            transfers: 2,
            bytes: 200,
            elapsed_ns: 50,
            first_start_ns: 10,
            last_end_ns: 70,
        });
        let m = slot.measurement(pair).unwrap();
        assert_eq!(m.bytes, 200);
        assert_eq!(m.last_end_ns, 70);
    }

    #[test]
    fn test_exit_status_decoding() {
        assert_eq!(decode_status(0), Exit::Code(0));
        assert_eq!(decode_status(1 << 8), Exit::Code(1));
        assert_eq!(decode_status(libc::SIGKILL), Exit::Signal(libc::SIGKILL));
        assert_eq!(Exit::Signal(9).to_string(), "killed by signal 9");
    }

    #[test]
    fn test_panicking_child_exits_quietly() {
        let mut children = RoundChildren::default();
        let pair = Pair::new(CoreId(0), CoreId(1));
        let idx = children
            .fork(0, pair, Role::Source, || -> i32 { panic!("source body failed") })
            .unwrap();
        children.reap_all(deadline_after(Duration::from_secs(10)));
        assert_eq!(children.children[idx].exit, Some(Exit::Code(EXIT_PANICKED)));
    }

    #[test]
    fn test_child_without_report_blames_role() {
        let slot = PairSlot::default();
        let pair = Pair::new(CoreId(0), CoreId(1));
        let err = child_error(pair, Role::Source, &slot, Some(Exit::Signal(9)));
        assert_eq!(err.kind(), ErrorKind::TransferFailure);
        assert!(err.to_string().contains("killed by signal 9 without a report"));
    }
}
