//! Per-pipe RDM cell pool.

use std::collections::VecDeque;

use log::trace;
use mc_hal::{CommitSeq, McError, McResult, RdmAddr};
use mc_types::PipeId;

use super::types::{CellOwner, CellState, GcMode, RdmUsage, ReclaimGate};

/// Cell pool of one pipe.
///
/// Keeps a state per cell plus two lists: `free` (allocatable, oldest first)
/// and `pending` (retired, waiting for the garbage collector).
#[derive(Debug)]
pub struct RdmPool {
    pipe: PipeId,
    cells: Vec<CellState>,
    free: VecDeque<RdmAddr>,
    pending: Vec<RdmAddr>,
    /// Retired cells whose unlinking commit was rejected; gated on the next
    /// commit the pipe accepts.
    carried: Vec<RdmAddr>,
    allocated: usize,
    /// Highest sequence confirmed by a "memory change confirmed" interrupt.
    confirmed: CommitSeq,
}

impl RdmPool {
    pub fn new(pipe: PipeId, size: u32) -> Self {
        Self {
            pipe,
            cells: vec![CellState::Free; size as usize],
            free: (0..size).map(RdmAddr).collect(),
            pending: Vec::new(),
            carried: Vec::new(),
            allocated: 0,
            confirmed: CommitSeq(0),
        }
    }

    pub fn pipe(&self) -> PipeId {
        self.pipe
    }

    pub fn usage(&self) -> RdmUsage {
        RdmUsage {
            pipe: self.pipe,
            free: self.free.len(),
            allocated: self.allocated,
            pending: self.pending.len(),
        }
    }

    pub fn state(&self, addr: RdmAddr) -> Option<CellState> {
        self.cells.get(addr.0 as usize).copied()
    }

    /// Allocates `count` cells for `owner`, or none at all.
    ///
    /// Pending cells are not allocatable even when the pool looks idle.
    pub fn alloc(&mut self, count: usize, owner: CellOwner) -> McResult<Vec<RdmAddr>> {
        if self.free.len() < count {
            return Err(McError::resource_exhausted(format!(
                "RDM cells on {} (need {}, free {}, pending reclaim {})",
                self.pipe,
                count,
                self.free.len(),
                self.pending.len()
            )));
        }
        let addrs: Vec<RdmAddr> = self.free.drain(..count).collect();
        for addr in &addrs {
            self.cells[addr.0 as usize] = CellState::Allocated {
                owner,
                submitted: None,
            };
        }
        self.allocated += count;
        Ok(addrs)
    }

    /// Returns never-submitted cells straight to the free list.
    ///
    /// Only used to roll back a failed multi-pipe allocation; a cell that
    /// has been written to hardware must go through [`RdmPool::retire`].
    pub fn release_unsubmitted(&mut self, addrs: &[RdmAddr]) {
        for addr in addrs {
            if let Some(cell) = self.cells.get_mut(addr.0 as usize) {
                if matches!(cell, CellState::Allocated { submitted: None, .. }) {
                    *cell = CellState::Free;
                    self.allocated -= 1;
                    self.free.push_front(*addr);
                }
            }
        }
    }

    /// Marks cells as no longer referenced by the shadow tree.
    pub fn retire(&mut self, addrs: &[RdmAddr], mode: GcMode) {
        for addr in addrs {
            let Some(cell) = self.cells.get_mut(addr.0 as usize) else {
                continue;
            };
            if let CellState::Allocated { owner, .. } = *cell {
                *cell = CellState::PendingReclaim {
                    owner,
                    gate: ReclaimGate::AwaitingSubmit,
                    mode,
                };
                self.allocated -= 1;
                self.pending.push(*addr);
            }
        }
    }

    /// Records that commit `seq` carried writes to `addrs`.
    pub fn mark_submitted(&mut self, addrs: impl IntoIterator<Item = RdmAddr>, seq: CommitSeq) {
        for addr in addrs {
            if let Some(CellState::Allocated { submitted, .. }) = self.cells.get_mut(addr.0 as usize)
            {
                *submitted = Some(seq);
            }
        }
    }

    /// Keeps retired cells whose commit failed until the pipe accepts
    /// another one.
    pub fn carry(&mut self, addrs: &[RdmAddr]) {
        self.carried.extend_from_slice(addrs);
    }

    pub fn carried(&self) -> usize {
        self.carried.len()
    }

    /// Gates retired cells on the commit that unlinked them, along with any
    /// cells carried over from a failed commit.
    ///
    /// Interrupt-mode cells whose sequence has already been confirmed are
    /// freed right away. Returns the number of cells freed.
    pub fn gate(&mut self, addrs: &[RdmAddr], seq: CommitSeq) -> usize {
        let carried = std::mem::take(&mut self.carried);
        for addr in addrs.iter().chain(&carried) {
            if let Some(CellState::PendingReclaim { gate, .. }) = self.cells.get_mut(addr.0 as usize)
            {
                if *gate == ReclaimGate::AwaitingSubmit {
                    *gate = ReclaimGate::AfterSeq(seq);
                }
            }
        }
        let confirmed = self.confirmed;
        self.reclaim(|mode, s| mode == GcMode::Interrupt && s <= confirmed)
    }

    /// Interrupt path: the hardware confirmed everything up to `seq`.
    pub fn confirm(&mut self, seq: CommitSeq) -> usize {
        if seq > self.confirmed {
            self.confirmed = seq;
        }
        self.reclaim(|mode, s| mode == GcMode::Interrupt && s <= seq)
    }

    /// Periodic path: frees periodic-mode cells the hardware has completed.
    pub fn sweep(&mut self, completed: CommitSeq) -> usize {
        self.reclaim(|mode, s| mode == GcMode::Periodic && s <= completed)
    }

    fn reclaim(&mut self, eligible: impl Fn(GcMode, CommitSeq) -> bool) -> usize {
        let mut freed = 0;
        let cells = &mut self.cells;
        let free = &mut self.free;
        self.pending.retain(|addr| {
            let cell = &mut cells[addr.0 as usize];
            let state = *cell;
            match state {
                CellState::PendingReclaim {
                    gate: ReclaimGate::AfterSeq(seq),
                    mode,
                    ..
                } if eligible(mode, seq) => {
                    *cell = CellState::Free;
                    free.push_back(*addr);
                    freed += 1;
                    false
                }
                _ => true,
            }
        });
        if freed > 0 {
            trace!("rdm: reclaimed {} cells on {}", freed, self.pipe);
        }
        freed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mc_hal::NodeHandle;
    use mc_types::DevId;
    use pretty_assertions::assert_eq;

    fn owner() -> CellOwner {
        CellOwner::Node(NodeHandle::new(DevId(0), 0, 1))
    }

    #[test]
    fn test_alloc_all_or_nothing() {
        let mut pool = RdmPool::new(PipeId(0), 4);
        let a = pool.alloc(3, owner()).unwrap();
        assert_eq!(a.len(), 3);
        let err = pool.alloc(2, owner()).unwrap_err();
        assert_eq!(err.status(), mc_hal::McStatus::ResourceExhausted);
        assert_eq!(pool.usage().free, 1);
    }

    #[test]
    fn test_retired_cells_are_not_allocatable() {
        let mut pool = RdmPool::new(PipeId(0), 2);
        let a = pool.alloc(2, owner()).unwrap();
        pool.retire(&a, GcMode::Interrupt);
        assert_eq!(
            pool.usage(),
            RdmUsage {
                pipe: PipeId(0),
                free: 0,
                allocated: 0,
                pending: 2
            }
        );
        assert!(pool.alloc(1, owner()).is_err());
    }

    #[test]
    fn test_confirm_frees_only_gated_cells() {
        let mut pool = RdmPool::new(PipeId(0), 4);
        let a = pool.alloc(2, owner()).unwrap();
        pool.retire(&a, GcMode::Interrupt);

        // Not yet submitted: an interrupt must not free it.
        assert_eq!(pool.confirm(CommitSeq(10)), 0);

        pool.gate(&a[..1], CommitSeq(11));
        assert_eq!(pool.confirm(CommitSeq(10)), 0);
        assert_eq!(pool.confirm(CommitSeq(11)), 1);
        assert_eq!(pool.usage().pending, 1);
    }

    #[test]
    fn test_gate_after_confirmation_frees_immediately() {
        let mut pool = RdmPool::new(PipeId(0), 4);
        pool.confirm(CommitSeq(5));
        let a = pool.alloc(1, owner()).unwrap();
        pool.retire(&a, GcMode::Interrupt);
        assert_eq!(pool.gate(&a, CommitSeq(5)), 1);
        assert_eq!(pool.usage().free, 4);
    }

    #[test]
    fn test_mode_is_fixed_at_retire_time() {
        let mut pool = RdmPool::new(PipeId(0), 4);
        let a = pool.alloc(2, owner()).unwrap();
        pool.retire(&a[..1], GcMode::Periodic);
        pool.retire(&a[1..], GcMode::Interrupt);
        pool.gate(&a, CommitSeq(1));

        assert_eq!(pool.confirm(CommitSeq(1)), 1);
        assert_eq!(pool.state(a[0]).map(|s| matches!(s, CellState::Free)), Some(false));
        assert_eq!(pool.sweep(CommitSeq(0)), 0);
        assert_eq!(pool.sweep(CommitSeq(1)), 1);
        assert_eq!(pool.usage().free, 4);
    }

    #[test]
    fn test_carried_cells_gate_on_next_commit() {
        let mut pool = RdmPool::new(PipeId(0), 4);
        let a = pool.alloc(2, owner()).unwrap();
        pool.retire(&a, GcMode::Interrupt);
        pool.carry(&a);
        assert_eq!(pool.confirm(CommitSeq(3)), 0);
        assert_eq!(pool.carried(), 2);

        // The next accepted commit picks them up.
        pool.gate(&[], CommitSeq(4));
        assert_eq!(pool.carried(), 0);
        assert_eq!(pool.confirm(CommitSeq(4)), 2);
        assert_eq!(pool.usage().free, 4);
    }

    #[test]
    fn test_release_unsubmitted() {
        let mut pool = RdmPool::new(PipeId(1), 3);
        let a = pool.alloc(2, owner()).unwrap();
        pool.mark_submitted([a[1]], CommitSeq(1));
        pool.release_unsubmitted(&a);
        // The submitted cell stays allocated.
        assert_eq!(pool.usage().free, 2);
        assert_eq!(pool.usage().allocated, 1);
    }
}
