//! Device-wide RDM allocator over the per-pipe pools.

use log::debug;
use mc_hal::{CommitSeq, HwWrite, McError, McResult, RdmAddr};
use mc_types::{DevId, PipeId};
use parking_lot::{Mutex, RwLock};

use super::pool::RdmPool;
use super::types::{CellOwner, CellState, GcMode, RdmUsage};

/// One pool per pipe plus the device-wide GC mode.
///
/// Each pool has its own lock, so the interrupt handler for one pipe never
/// contends with allocation on another.
#[derive(Debug)]
pub struct RdmAllocator {
    dev: DevId,
    pools: Vec<Mutex<RdmPool>>,
    mode: RwLock<GcMode>,
}

impl RdmAllocator {
    pub fn new(dev: DevId, pipe_count: u8, cells_per_pipe: u32, mode: GcMode) -> Self {
        Self {
            dev,
            pools: (0..pipe_count)
                .map(|p| Mutex::new(RdmPool::new(PipeId(p), cells_per_pipe)))
                .collect(),
            mode: RwLock::new(mode),
        }
    }

    pub fn dev_id(&self) -> DevId {
        self.dev
    }

    pub fn pipe_count(&self) -> usize {
        self.pools.len()
    }

    pub fn mode(&self) -> GcMode {
        *self.mode.read()
    }

    /// Switches the GC mode. Cells already pending keep the mode they were
    /// retired under.
    pub fn set_mode(&self, mode: GcMode) -> GcMode {
        std::mem::replace(&mut *self.mode.write(), mode)
    }

    fn pool(&self, pipe: PipeId) -> McResult<&Mutex<RdmPool>> {
        self.pools
            .get(pipe.index())
            .ok_or_else(|| McError::invalid_argument(format!("{} out of range", pipe)))
    }

    /// Allocates `demand[p]` cells in every pipe `p`, all-or-nothing.
    pub fn alloc_chain(&self, demand: &[usize], owner: CellOwner) -> McResult<Vec<Vec<RdmAddr>>> {
        let mut granted: Vec<Vec<RdmAddr>> = Vec::with_capacity(demand.len());
        for (index, &count) in demand.iter().enumerate() {
            let result = match self.pools.get(index) {
                Some(pool) if count > 0 => pool.lock().alloc(count, owner),
                Some(_) => Ok(Vec::new()),
                None => Err(McError::invalid_argument(format!(
                    "allocation demand for pipe{} on a {}-pipe device",
                    index,
                    self.pools.len()
                ))),
            };
            match result {
                Ok(addrs) => granted.push(addrs),
                Err(err) => {
                    for (p, addrs) in granted.iter().enumerate() {
                        self.pools[p].lock().release_unsubmitted(addrs);
                    }
                    debug!("rdm: chain allocation for {:?} rolled back: {}", owner, err);
                    return Err(err);
                }
            }
        }
        Ok(granted)
    }

    /// Moves cells to `PendingReclaim` under the current GC mode.
    pub fn retire(&self, pipe: PipeId, addrs: &[RdmAddr]) -> McResult<()> {
        let mode = self.mode();
        self.pool(pipe)?.lock().retire(addrs, mode);
        Ok(())
    }

    /// Bookkeeping after commit `seq` was accepted on `pipe`.
    ///
    /// Returns the number of retired cells freed immediately because their
    /// sequence had already been confirmed.
    pub fn on_submitted(
        &self,
        pipe: PipeId,
        seq: CommitSeq,
        writes: &[HwWrite],
        retired: &[RdmAddr],
    ) -> McResult<usize> {
        let mut pool = self.pool(pipe)?.lock();
        pool.mark_submitted(writes.iter().filter_map(HwWrite::rdm_addr), seq);
        Ok(pool.gate(retired, seq))
    }

    /// Bookkeeping after `pipe` rejected a commit.
    ///
    /// Nothing reached the hardware, so the retired cells stay pending and
    /// are gated on the pipe's next accepted commit.
    pub fn on_commit_failed(&self, pipe: PipeId, retired: &[RdmAddr]) -> McResult<()> {
        if !retired.is_empty() {
            debug!(
                "rdm: carrying {} retired cells on {} past a failed commit",
                retired.len(),
                pipe
            );
            self.pool(pipe)?.lock().carry(retired);
        }
        Ok(())
    }

    /// Interrupt path for one pipe.
    pub fn confirm(&self, pipe: PipeId, seq: CommitSeq) -> McResult<usize> {
        Ok(self.pool(pipe)?.lock().confirm(seq))
    }

    /// Periodic path for one pipe.
    pub fn sweep(&self, pipe: PipeId, completed: CommitSeq) -> McResult<usize> {
        Ok(self.pool(pipe)?.lock().sweep(completed))
    }

    pub fn usage(&self, pipe: PipeId) -> McResult<RdmUsage> {
        Ok(self.pool(pipe)?.lock().usage())
    }

    pub fn usage_all(&self) -> Vec<RdmUsage> {
        self.pools.iter().map(|p| p.lock().usage()).collect()
    }

    pub fn cell_state(&self, pipe: PipeId, addr: RdmAddr) -> McResult<Option<CellState>> {
        Ok(self.pool(pipe)?.lock().state(addr))
    }
}
