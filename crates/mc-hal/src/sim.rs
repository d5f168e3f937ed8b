//! In-memory model of the replication hardware.
//!
//! `SimHardware` applies each commit to a per-pipe shadow of the hardware
//! tables as soon as it is submitted and tracks acknowledgement separately,
//! so tests can hold commits "in flight" and release them with [`SimHardware::ack`].
//! Every RDM write is checked against the cells already programmed on the
//! pipe: a pointer to a cell that has never been written is recorded as a
//! violation, which is how tests observe make-before-break ordering.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, trace, warn};
use mc_types::{DevId, L2Xid, LagId, PipeId, PortId, PortSet, Rid};
use parking_lot::{Condvar, Mutex, RwLock};

use crate::api::{HwWrite, McHardware, MemChangeHandler, RdmPayload};
use crate::error::{McError, McResult};
use crate::types::{CommitSeq, RdmAddr};

/// Configuration for [`SimHardware`].
#[derive(Debug, Clone)]
pub struct SimHardwareConfig {
    pub dev: DevId,
    pub pipe_count: u8,
    /// Acknowledge every commit as soon as it is applied.
    pub auto_ack: bool,
    /// Raise "memory change confirmed" on every acknowledgement.
    pub raise_interrupts: bool,
}

impl Default for SimHardwareConfig {
    fn default() -> Self {
        Self {
            dev: DevId(0),
            pipe_count: 4,
            auto_ack: true,
            raise_interrupts: true,
        }
    }
}

#[derive(Debug, Default)]
struct PipeState {
    submitted: CommitSeq,
    completed: CommitSeq,
    rdm: HashMap<RdmAddr, RdmPayload>,
    lag: HashMap<LagId, PortSet>,
    remote_lag: HashMap<LagId, (u16, u16)>,
    prune: HashMap<L2Xid, PortSet>,
    global_rid: Rid,
    port_forward: HashMap<PortId, bool>,
    fast_failover: bool,
    ff_cleared: Vec<PortId>,
    protection: bool,
    protection_map: HashMap<PortId, PortId>,
    max_nodes_before_yield: u32,
    max_node_threshold: (u32, u32),
}

impl PipeState {
    fn apply(&mut self, write: &HwWrite, violations: &mut Vec<String>) {
        match write {
            HwWrite::Rdm { addr, payload } => {
                for target in payload.references() {
                    if target != *addr && !self.rdm.contains_key(&target) {
                        violations.push(format!("{} points at unprogrammed {}", addr, target));
                    }
                }
                self.rdm.insert(*addr, payload.clone());
            }
            HwWrite::LagMembership { lag, ports } => {
                self.lag.insert(*lag, ports.clone());
            }
            HwWrite::RemoteLagCount { lag, left, right } => {
                self.remote_lag.insert(*lag, (*left, *right));
            }
            HwWrite::PruneEntry { xid, ports } => {
                self.prune.insert(*xid, ports.clone());
            }
            HwWrite::GlobalRid(rid) => self.global_rid = *rid,
            HwWrite::PortForward { port, active } => {
                self.port_forward.insert(*port, *active);
            }
            HwWrite::FastFailover { enabled } => self.fast_failover = *enabled,
            HwWrite::ClearFastFailover { port } => self.ff_cleared.push(*port),
            HwWrite::Protection { enabled } => self.protection = *enabled,
            HwWrite::ProtectionMap { protected, backup } => match backup {
                Some(backup) => {
                    self.protection_map.insert(*protected, *backup);
                }
                None => {
                    self.protection_map.remove(protected);
                }
            },
            HwWrite::MaxNodesBeforeYield(count) => self.max_nodes_before_yield = *count,
            HwWrite::MaxNodeThreshold {
                node_count,
                port_lag_count,
            } => self.max_node_threshold = (*node_count, *port_lag_count),
        }
    }
}

#[derive(Debug, Default)]
struct SimInner {
    pipes: Vec<PipeState>,
    fail_next_commit: Option<McError>,
    commits: u64,
    writes: u64,
    violations: Vec<String>,
}

/// In-memory hardware for one device.
pub struct SimHardware {
    config: SimHardwareConfig,
    inner: Mutex<SimInner>,
    acked: Condvar,
    handlers: RwLock<Vec<Arc<dyn MemChangeHandler>>>,
}

impl SimHardware {
    pub fn new(config: SimHardwareConfig) -> Self {
        let pipes = (0..config.pipe_count).map(|_| PipeState::default()).collect();
        Self {
            config,
            inner: Mutex::new(SimInner {
                pipes,
                ..Default::default()
            }),
            acked: Condvar::new(),
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Acknowledges everything submitted on `pipe` and raises the interrupt.
    pub fn ack(&self, pipe: PipeId) {
        let seq = {
            let mut inner = self.inner.lock();
            let Some(state) = inner.pipes.get_mut(pipe.index()) else {
                return;
            };
            state.completed = state.submitted;
            state.completed
        };
        self.acked.notify_all();
        self.raise(pipe, seq);
    }

    /// Acknowledges every pipe.
    pub fn ack_all(&self) {
        for pipe in 0..self.config.pipe_count {
            self.ack(PipeId(pipe));
        }
    }

    /// Makes the next commit fail with `err` without applying anything.
    pub fn fail_next_commit(&self, err: McError) {
        self.inner.lock().fail_next_commit = Some(err);
    }

    /// Number of successful commits across all pipes.
    pub fn commit_count(&self) -> u64 {
        self.inner.lock().commits
    }

    /// Number of writes applied across all pipes.
    pub fn write_count(&self) -> u64 {
        self.inner.lock().writes
    }

    /// Ordering violations observed so far.
    pub fn violations(&self) -> Vec<String> {
        self.inner.lock().violations.clone()
    }

    pub fn submitted_seq(&self, pipe: PipeId) -> CommitSeq {
        self.inner
            .lock()
            .pipes
            .get(pipe.index())
            .map(|p| p.submitted)
            .unwrap_or_default()
    }

    /// Number of RDM cells ever programmed on `pipe`.
    pub fn rdm_cell_count(&self, pipe: PipeId) -> usize {
        self.inner
            .lock()
            .pipes
            .get(pipe.index())
            .map(|p| p.rdm.len())
            .unwrap_or(0)
    }

    pub fn global_rid(&self, pipe: PipeId) -> Option<Rid> {
        self.inner.lock().pipes.get(pipe.index()).map(|p| p.global_rid)
    }

    pub fn prune_entry(&self, pipe: PipeId, xid: L2Xid) -> Option<PortSet> {
        self.inner
            .lock()
            .pipes
            .get(pipe.index())
            .and_then(|p| p.prune.get(&xid).cloned())
    }

    pub fn remote_lag_count(&self, pipe: PipeId, lag: LagId) -> Option<(u16, u16)> {
        self.inner
            .lock()
            .pipes
            .get(pipe.index())
            .and_then(|p| p.remote_lag.get(&lag).copied())
    }

    pub fn port_forward(&self, pipe: PipeId, port: PortId) -> Option<bool> {
        self.inner
            .lock()
            .pipes
            .get(pipe.index())
            .and_then(|p| p.port_forward.get(&port).copied())
    }

    pub fn protection_backup(&self, pipe: PipeId, port: PortId) -> Option<PortId> {
        self.inner
            .lock()
            .pipes
            .get(pipe.index())
            .and_then(|p| p.protection_map.get(&port).copied())
    }

    pub fn fast_failover_enabled(&self, pipe: PipeId) -> bool {
        self.inner
            .lock()
            .pipes
            .get(pipe.index())
            .map(|p| p.fast_failover)
            .unwrap_or(false)
    }

    pub fn protection_enabled(&self, pipe: PipeId) -> bool {
        self.inner
            .lock()
            .pipes
            .get(pipe.index())
            .map(|p| p.protection)
            .unwrap_or(false)
    }

    pub fn max_nodes_before_yield(&self, pipe: PipeId) -> Option<u32> {
        self.inner
            .lock()
            .pipes
            .get(pipe.index())
            .map(|p| p.max_nodes_before_yield)
    }

    pub fn max_node_threshold(&self, pipe: PipeId) -> Option<(u32, u32)> {
        self.inner
            .lock()
            .pipes
            .get(pipe.index())
            .map(|p| p.max_node_threshold)
    }

    fn raise(&self, pipe: PipeId, seq: CommitSeq) {
        if !self.config.raise_interrupts || seq == CommitSeq(0) {
            return;
        }
        let handlers: Vec<_> = self.handlers.read().iter().cloned().collect();
        trace!(
            "sim: mem change confirmed dev={} pipe={} seq={}",
            self.config.dev,
            pipe,
            seq
        );
        for handler in handlers {
            handler.on_mem_change_confirmed(self.config.dev, pipe, seq);
        }
    }

    fn check_pipe(&self, pipe: PipeId) -> McResult<()> {
        if pipe.0 >= self.config.pipe_count {
            return Err(McError::invalid_argument(format!(
                "pipe {} out of range (pipes: {})",
                pipe, self.config.pipe_count
            )));
        }
        Ok(())
    }
}

impl McHardware for SimHardware {
    fn dev_id(&self) -> DevId {
        self.config.dev
    }

    fn pipe_count(&self) -> u8 {
        self.config.pipe_count
    }

    fn commit(&self, pipe: PipeId, writes: &[HwWrite]) -> McResult<CommitSeq> {
        self.check_pipe(pipe)?;
        let seq = {
            let mut inner = self.inner.lock();
            if let Some(err) = inner.fail_next_commit.take() {
                warn!("sim: injected commit failure on pipe {}: {}", pipe, err);
                return Err(err);
            }
            let SimInner {
                pipes, violations, ..
            } = &mut *inner;
            let state = &mut pipes[pipe.index()];
            for write in writes {
                state.apply(write, violations);
            }
            state.submitted = CommitSeq(state.submitted.0 + 1);
            let seq = state.submitted;
            if self.config.auto_ack {
                state.completed = seq;
            }
            inner.commits += 1;
            inner.writes += writes.len() as u64;
            seq
        };
        debug!(
            "sim: commit dev={} pipe={} seq={} writes={}",
            self.config.dev,
            pipe,
            seq,
            writes.len()
        );
        if self.config.auto_ack {
            self.acked.notify_all();
            self.raise(pipe, seq);
        }
        Ok(seq)
    }

    fn completed_seq(&self, pipe: PipeId) -> CommitSeq {
        self.inner
            .lock()
            .pipes
            .get(pipe.index())
            .map(|p| p.completed)
            .unwrap_or_default()
    }

    fn wait_complete(&self, pipe: PipeId, seq: CommitSeq, timeout: Duration) -> McResult<()> {
        self.check_pipe(pipe)?;
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        while inner.pipes[pipe.index()].completed < seq {
            if self.acked.wait_until(&mut inner, deadline).timed_out()
                && inner.pipes[pipe.index()].completed < seq
            {
                return Err(McError::hardware_timeout(format!(
                    "wait for {} on pipe {}",
                    seq, pipe
                )));
            }
        }
        Ok(())
    }

    fn read_lag_membership(&self, pipe: PipeId, lag: LagId) -> McResult<PortSet> {
        self.check_pipe(pipe)?;
        Ok(self.inner.lock().pipes[pipe.index()]
            .lag
            .get(&lag)
            .cloned()
            .unwrap_or_default())
    }

    fn read_rdm(&self, pipe: PipeId, addr: RdmAddr) -> McResult<Option<RdmPayload>> {
        self.check_pipe(pipe)?;
        Ok(self.inner.lock().pipes[pipe.index()].rdm.get(&addr).cloned())
    }

    fn register_mem_change_handler(&self, handler: Arc<dyn MemChangeHandler>) {
        self.handlers.write().push(handler);
    }
}
