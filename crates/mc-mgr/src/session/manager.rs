//! Session manager: the single serialization point for hardware writes.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mc_hal::{CommitSeq, McError, McHardware, McResult};
use mc_types::{DevId, PipeId};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use super::committer::{Committer, BATCH, IMMEDIATE};
use super::types::{PipeOps, SessionId, StagedOp};
use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::rdm::GarbageCollector;
use crate::{audit_log, debug_log, error_log};

/// Session manager counters snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionCounters {
    pub sessions_created: u64,
    pub sessions_destroyed: u64,
    pub batches_begun: u64,
    pub batches_ended: u64,
    pub writes_staged: u64,
    pub writes_submitted: u64,
    pub commits: u64,
    pub commit_failures: u64,
}

#[derive(Debug, Default)]
struct SessionStats {
    sessions_created: AtomicU64,
    sessions_destroyed: AtomicU64,
    batches_begun: AtomicU64,
    batches_ended: AtomicU64,
    writes_staged: AtomicU64,
    writes_submitted: AtomicU64,
    commits: AtomicU64,
    commit_failures: AtomicU64,
}

#[derive(Clone)]
struct DeviceLink {
    hw: Arc<dyn McHardware>,
    gc: Arc<GarbageCollector>,
}

struct Session {
    committer: &'static dyn Committer,
    queue: VecDeque<StagedOp>,
    /// Highest submitted sequence per (device, pipe) not yet observed complete.
    outstanding: BTreeMap<(DevId, PipeId), CommitSeq>,
}

impl Session {
    fn new() -> Self {
        Self {
            committer: &IMMEDIATE,
            queue: VecDeque::new(),
            outstanding: BTreeMap::new(),
        }
    }
}

/// Owns all sessions and routes their work to the registered devices.
///
/// Writes of one session reach each pipe in the order they were staged.
/// Nothing orders writes of different sessions against each other.
pub struct SessionManager {
    hw_timeout: Duration,
    devices: RwLock<HashMap<DevId, DeviceLink>>,
    sessions: Mutex<HashMap<SessionId, Session>>,
    next_id: AtomicU32,
    stats: SessionStats,
}

impl SessionManager {
    pub fn new(hw_timeout: Duration) -> Self {
        Self {
            hw_timeout,
            devices: RwLock::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
            next_id: AtomicU32::new(1),
            stats: SessionStats::default(),
        }
    }

    pub fn hw_timeout(&self) -> Duration {
        self.hw_timeout
    }

    /// Attaches a device's hardware and garbage collector.
    pub fn register_device(&self, hw: Arc<dyn McHardware>, gc: Arc<GarbageCollector>) {
        let dev = hw.dev_id();
        self.devices.write().insert(dev, DeviceLink { hw, gc });
        debug_log!("SessionManager", dev = %dev, "device registered");
    }

    pub fn unregister_device(&self, dev: DevId) -> bool {
        self.devices.write().remove(&dev).is_some()
    }

    fn link(&self, dev: DevId) -> McResult<DeviceLink> {
        self.devices
            .read()
            .get(&dev)
            .cloned()
            .ok_or_else(|| McError::invalid_argument(format!("{} is not registered", dev)))
    }

    pub fn create_session(&self) -> SessionId {
        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.sessions.lock().insert(id, Session::new());
        self.stats.sessions_created.fetch_add(1, Ordering::Relaxed);
        audit_log!(
            AuditRecord::new(AuditCategory::SystemLifecycle, "SessionManager", "create_session")
                .with_outcome(AuditOutcome::Success)
                .with_object_id(id.to_string())
                .with_object_type("session")
        );
        id
    }

    /// Destroys a session. Fails `IllegalState` while a batch is open.
    pub fn destroy_session(&self, id: SessionId) -> McResult<()> {
        let mut sessions = self.sessions.lock();
        let session = sessions
            .get(&id)
            .ok_or_else(|| McError::invalid_handle(id))?;
        if session.committer.is_batch() {
            let err = McError::illegal_state(format!("{} has an open batch", id));
            audit_log!(
                AuditRecord::new(AuditCategory::SystemLifecycle, "SessionManager", "destroy_session")
                    .with_object_id(id.to_string())
                    .with_object_type("session")
                    .with_error(err.to_string())
            );
            return Err(err);
        }
        sessions.remove(&id);
        drop(sessions);
        self.stats.sessions_destroyed.fetch_add(1, Ordering::Relaxed);
        audit_log!(
            AuditRecord::new(AuditCategory::SystemLifecycle, "SessionManager", "destroy_session")
                .with_outcome(AuditOutcome::Success)
                .with_object_id(id.to_string())
                .with_object_type("session")
        );
        Ok(())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Fails `InvalidHandle` for an unknown session.
    pub fn check(&self, id: SessionId) -> McResult<()> {
        if self.sessions.lock().contains_key(&id) {
            Ok(())
        } else {
            Err(McError::invalid_handle(id))
        }
    }

    pub fn is_batch_open(&self, id: SessionId) -> McResult<bool> {
        self.sessions
            .lock()
            .get(&id)
            .map(|s| s.committer.is_batch())
            .ok_or_else(|| McError::invalid_handle(id))
    }

    /// Number of calls queued in the session's open batch.
    pub fn queued_ops(&self, id: SessionId) -> McResult<usize> {
        self.sessions
            .lock()
            .get(&id)
            .map(|s| s.queue.len())
            .ok_or_else(|| McError::invalid_handle(id))
    }

    pub fn begin_batch(&self, id: SessionId) -> McResult<()> {
        let mut sessions = self.sessions.lock();
        let session = sessions
            .get_mut(&id)
            .ok_or_else(|| McError::invalid_handle(id))?;
        if session.committer.is_batch() {
            return Err(McError::illegal_state(format!(
                "{} already has an open batch",
                id
            )));
        }
        session.committer = &BATCH;
        self.stats.batches_begun.fetch_add(1, Ordering::Relaxed);
        debug_log!("SessionManager", session = %id, "batch begun");
        Ok(())
    }

    /// Submits everything queued so far; the batch stays open.
    pub fn flush_batch(&self, id: SessionId) -> McResult<()> {
        let queued = {
            let mut sessions = self.sessions.lock();
            let session = sessions
                .get_mut(&id)
                .ok_or_else(|| McError::invalid_handle(id))?;
            if !session.committer.is_batch() {
                return Err(McError::illegal_state(format!("{} has no open batch", id)));
            }
            std::mem::take(&mut session.queue)
        };
        self.submit(id, queued.into())
    }

    /// Flushes and closes the batch. With `hw_synchronous` the call also
    /// blocks until the hardware has acknowledged every write.
    pub fn end_batch(&self, id: SessionId, hw_synchronous: bool) -> McResult<()> {
        let queued = {
            let mut sessions = self.sessions.lock();
            let session = sessions
                .get_mut(&id)
                .ok_or_else(|| McError::invalid_handle(id))?;
            if !session.committer.is_batch() {
                return Err(McError::illegal_state(format!("{} has no open batch", id)));
            }
            session.committer = &IMMEDIATE;
            std::mem::take(&mut session.queue)
        };
        self.stats.batches_ended.fetch_add(1, Ordering::Relaxed);
        debug_log!(
            "SessionManager",
            session = %id,
            queued = queued.len(),
            hw_synchronous = hw_synchronous,
            "batch ended"
        );
        self.submit(id, queued.into())?;
        if hw_synchronous {
            self.complete_operations(id)?;
        }
        Ok(())
    }

    /// Blocks until every commit this session submitted is acknowledged.
    ///
    /// A commit that is not acknowledged within the configured timeout is
    /// fatal and surfaces as `HardwareTimeout`; nothing is retried.
    pub fn complete_operations(&self, id: SessionId) -> McResult<()> {
        let pending: Vec<((DevId, PipeId), CommitSeq)> = {
            let sessions = self.sessions.lock();
            let session = sessions
                .get(&id)
                .ok_or_else(|| McError::invalid_handle(id))?;
            session.outstanding.iter().map(|(k, v)| (*k, *v)).collect()
        };

        for ((dev, pipe), seq) in pending {
            let link = self.link(dev)?;
            if let Err(e) = link.hw.wait_complete(pipe, seq, self.hw_timeout) {
                error_log!(
                    "SessionManager",
                    session = %id,
                    dev = %dev,
                    pipe = %pipe,
                    seq = %seq,
                    error = %e,
                    "completion never observed"
                );
                return Err(e);
            }
            if let Some(session) = self.sessions.lock().get_mut(&id) {
                if session.outstanding.get(&(dev, pipe)).is_some_and(|s| *s <= seq) {
                    session.outstanding.remove(&(dev, pipe));
                }
            }
        }
        Ok(())
    }

    /// Hands the work of one mutating call to the session's committer.
    pub fn stage(&self, id: SessionId, op: StagedOp) -> McResult<()> {
        if op.is_empty() {
            return Ok(());
        }
        self.stats
            .writes_staged
            .fetch_add(op.write_count() as u64, Ordering::Relaxed);
        let ready = {
            let mut sessions = self.sessions.lock();
            let session = sessions
                .get_mut(&id)
                .ok_or_else(|| McError::invalid_handle(id))?;
            let committer = session.committer;
            committer.accept(&mut session.queue, op)
        };
        self.submit(id, ready)
    }

    fn submit(&self, id: SessionId, ops: Vec<StagedOp>) -> McResult<()> {
        let mut merged: BTreeMap<(DevId, PipeId), PipeOps> = BTreeMap::new();
        for op in ops {
            let dev = op.dev;
            for (pipe, work) in op.pipes {
                merged.entry((dev, pipe)).or_default().append(work);
            }
        }

        // A rejected commit is fatal for the call, but the remaining pipes
        // are still attempted so none of their work is dropped.
        let mut first_err: Option<McError> = None;
        for ((dev, pipe), work) in merged {
            if work.is_empty() {
                continue;
            }
            let link = match self.link(dev) {
                Ok(link) => link,
                Err(e) => {
                    first_err.get_or_insert(e);
                    continue;
                }
            };
            let seq = match link.hw.commit(pipe, &work.writes) {
                Ok(seq) => seq,
                Err(e) => {
                    self.stats.commit_failures.fetch_add(1, Ordering::Relaxed);
                    error_log!(
                        "SessionManager",
                        session = %id,
                        dev = %dev,
                        pipe = %pipe,
                        writes = work.writes.len(),
                        retired = work.retire.len(),
                        error = %e,
                        "hardware commit failed"
                    );
                    if let Err(carry_err) =
                        link.gc.allocator().on_commit_failed(pipe, &work.retire)
                    {
                        first_err.get_or_insert(carry_err);
                    }
                    first_err.get_or_insert(e);
                    continue;
                }
            };
            match link
                .gc
                .allocator()
                .on_submitted(pipe, seq, &work.writes, &work.retire)
            {
                Ok(freed) => link.gc.note_reclaimed_on_submit(freed),
                Err(e) => {
                    first_err.get_or_insert(e);
                }
            }

            self.stats.commits.fetch_add(1, Ordering::Relaxed);
            self.stats
                .writes_submitted
                .fetch_add(work.writes.len() as u64, Ordering::Relaxed);
            if let Some(session) = self.sessions.lock().get_mut(&id) {
                let entry = session.outstanding.entry((dev, pipe)).or_default();
                if seq > *entry {
                    *entry = seq;
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn counters(&self) -> SessionCounters {
        let s = &self.stats;
        SessionCounters {
            sessions_created: s.sessions_created.load(Ordering::Relaxed),
            sessions_destroyed: s.sessions_destroyed.load(Ordering::Relaxed),
            batches_begun: s.batches_begun.load(Ordering::Relaxed),
            batches_ended: s.batches_ended.load(Ordering::Relaxed),
            writes_staged: s.writes_staged.load(Ordering::Relaxed),
            writes_submitted: s.writes_submitted.load(Ordering::Relaxed),
            commits: s.commits.load(Ordering::Relaxed),
            commit_failures: s.commit_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdm::{GcMode, RdmAllocator};
    use mc_hal::{HwWrite, McStatus, SimHardware, SimHardwareConfig};
    use mc_types::Rid;
    use pretty_assertions::assert_eq;

    fn setup(auto_ack: bool) -> (SessionManager, Arc<SimHardware>) {
        let hw = Arc::new(SimHardware::new(SimHardwareConfig {
            pipe_count: 2,
            auto_ack,
            ..Default::default()
        }));
        let rdm = Arc::new(RdmAllocator::new(DevId(0), 2, 16, GcMode::Interrupt));
        let gc = Arc::new(GarbageCollector::new(rdm));
        let mgr = SessionManager::new(Duration::from_millis(20));
        mgr.register_device(hw.clone(), gc);
        (mgr, hw)
    }

    fn rid_op(rid: u16) -> StagedOp {
        let mut op = StagedOp::new(DevId(0));
        op.write(PipeId(0), HwWrite::GlobalRid(Rid(rid)));
        op
    }

    #[test]
    fn test_nested_begin_batch_is_illegal() {
        let (mgr, _hw) = setup(true);
        let s = mgr.create_session();
        mgr.begin_batch(s).unwrap();
        assert_eq!(
            mgr.begin_batch(s).unwrap_err().status(),
            McStatus::IllegalState
        );
    }

    #[test]
    fn test_end_without_batch_is_illegal() {
        let (mgr, _hw) = setup(true);
        let s = mgr.create_session();
        assert_eq!(
            mgr.end_batch(s, false).unwrap_err().status(),
            McStatus::IllegalState
        );
        assert_eq!(
            mgr.flush_batch(s).unwrap_err().status(),
            McStatus::IllegalState
        );
    }

    #[test]
    fn test_destroy_with_open_batch_fails() {
        let (mgr, _hw) = setup(true);
        let s = mgr.create_session();
        mgr.begin_batch(s).unwrap();
        assert_eq!(
            mgr.destroy_session(s).unwrap_err().status(),
            McStatus::IllegalState
        );
        mgr.end_batch(s, false).unwrap();
        mgr.destroy_session(s).unwrap();
        assert_eq!(mgr.check(s).unwrap_err().status(), McStatus::InvalidHandle);
    }

    #[test]
    fn test_immediate_mode_commits_each_call() {
        let (mgr, hw) = setup(true);
        let s = mgr.create_session();
        mgr.stage(s, rid_op(1)).unwrap();
        mgr.stage(s, rid_op(2)).unwrap();
        assert_eq!(hw.commit_count(), 2);
        assert_eq!(hw.global_rid(PipeId(0)), Some(Rid(2)));
    }

    #[test]
    fn test_batch_holds_writes_until_flush() {
        let (mgr, hw) = setup(true);
        let s = mgr.create_session();
        mgr.begin_batch(s).unwrap();
        mgr.stage(s, rid_op(1)).unwrap();
        mgr.stage(s, rid_op(2)).unwrap();
        assert_eq!(hw.commit_count(), 0);
        assert_eq!(mgr.queued_ops(s).unwrap(), 2);

        mgr.flush_batch(s).unwrap();
        // Both calls land in one commit, in submission order.
        assert_eq!(hw.commit_count(), 1);
        assert_eq!(hw.global_rid(PipeId(0)), Some(Rid(2)));
        assert!(mgr.is_batch_open(s).unwrap());

        mgr.stage(s, rid_op(3)).unwrap();
        mgr.end_batch(s, true).unwrap();
        assert_eq!(hw.global_rid(PipeId(0)), Some(Rid(3)));
        assert!(!mgr.is_batch_open(s).unwrap());
    }

    #[test]
    fn test_synchronous_end_times_out_without_ack() {
        let (mgr, hw) = setup(false);
        let s = mgr.create_session();
        mgr.begin_batch(s).unwrap();
        mgr.stage(s, rid_op(1)).unwrap();
        let err = mgr.end_batch(s, true).unwrap_err();
        assert_eq!(err.status(), McStatus::HardwareTimeout);

        hw.ack_all();
        mgr.complete_operations(s).unwrap();
    }

    #[test]
    fn test_commit_failure_surfaces() {
        let (mgr, hw) = setup(true);
        let s = mgr.create_session();
        hw.fail_next_commit(McError::hardware("dma"));
        assert_eq!(
            mgr.stage(s, rid_op(1)).unwrap_err().status(),
            McStatus::HardwareError
        );
        assert_eq!(mgr.counters().commit_failures, 1);
    }

    #[test]
    fn test_failed_pipe_does_not_drop_other_pipes() {
        let (mgr, hw) = setup(true);
        let s = mgr.create_session();
        let mut op = rid_op(1);
        op.write(PipeId(1), HwWrite::GlobalRid(Rid(7)));
        hw.fail_next_commit(McError::hardware("dma"));
        assert_eq!(
            mgr.stage(s, op).unwrap_err().status(),
            McStatus::HardwareError
        );
        assert_eq!(hw.global_rid(PipeId(0)), Some(Rid(0)));
        assert_eq!(hw.global_rid(PipeId(1)), Some(Rid(7)));
        assert_eq!(mgr.counters().commits, 1);
    }

    #[test]
    fn test_unknown_session() {
        let (mgr, _hw) = setup(true);
        let err = mgr.stage(SessionId(99), rid_op(1)).unwrap_err();
        assert_eq!(err.status(), McStatus::InvalidHandle);
    }
}
