//! Garbage collector for retired RDM cells.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use mc_hal::{CommitSeq, McHardware, MemChangeHandler};
use mc_types::{DevId, PipeId};
use serde::Serialize;

use super::allocator::RdmAllocator;
use super::types::GcMode;
use crate::{debug_log, warn_log};

/// GC counters snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GcCounters {
    pub interrupts: u64,
    pub sweeps: u64,
    pub reclaimed_by_interrupt: u64,
    pub reclaimed_by_sweep: u64,
}

#[derive(Debug, Default)]
struct GcStats {
    interrupts: AtomicU64,
    sweeps: AtomicU64,
    reclaimed_by_interrupt: AtomicU64,
    reclaimed_by_sweep: AtomicU64,
}

/// Moves `PendingReclaim` cells back to the free lists.
///
/// Registered with the hardware as the "memory change confirmed" handler;
/// it runs on the interrupt thread and only ever takes per-pipe pool locks.
#[derive(Debug)]
pub struct GarbageCollector {
    dev: DevId,
    rdm: Arc<RdmAllocator>,
    stats: GcStats,
}

impl GarbageCollector {
    pub fn new(rdm: Arc<RdmAllocator>) -> Self {
        Self {
            dev: rdm.dev_id(),
            rdm,
            stats: GcStats::default(),
        }
    }

    pub fn mode(&self) -> GcMode {
        self.rdm.mode()
    }

    pub fn set_mode(&self, mode: GcMode) -> GcMode {
        self.rdm.set_mode(mode)
    }

    /// Periodic sweep over every pipe; returns the number of cells freed.
    ///
    /// Only cells retired in periodic mode are considered, and only once the
    /// hardware has acknowledged the commit that unlinked them.
    pub fn sweep(&self, hw: &dyn McHardware) -> usize {
        let mut freed = 0;
        for p in 0..self.rdm.pipe_count() {
            let pipe = PipeId(p as u8);
            let completed = hw.completed_seq(pipe);
            match self.rdm.sweep(pipe, completed) {
                Ok(n) => freed += n,
                Err(e) => warn_log!("GarbageCollector", pipe = %pipe, error = %e, "sweep skipped pipe"),
            }
        }
        self.stats.sweeps.fetch_add(1, Ordering::Relaxed);
        self.stats
            .reclaimed_by_sweep
            .fetch_add(freed as u64, Ordering::Relaxed);
        debug_log!("GarbageCollector", dev = %self.dev, freed = freed, "periodic sweep done");
        freed
    }

    /// Records cells freed on the submission path because their sequence was
    /// already confirmed.
    pub fn note_reclaimed_on_submit(&self, freed: usize) {
        if freed > 0 {
            self.stats
                .reclaimed_by_interrupt
                .fetch_add(freed as u64, Ordering::Relaxed);
        }
    }

    pub fn counters(&self) -> GcCounters {
        GcCounters {
            interrupts: self.stats.interrupts.load(Ordering::Relaxed),
            sweeps: self.stats.sweeps.load(Ordering::Relaxed),
            reclaimed_by_interrupt: self.stats.reclaimed_by_interrupt.load(Ordering::Relaxed),
            reclaimed_by_sweep: self.stats.reclaimed_by_sweep.load(Ordering::Relaxed),
        }
    }

    pub fn allocator(&self) -> &Arc<RdmAllocator> {
        &self.rdm
    }
}

impl MemChangeHandler for GarbageCollector {
    fn on_mem_change_confirmed(&self, dev: DevId, pipe: PipeId, seq: CommitSeq) {
        if dev != self.dev {
            return;
        }
        self.stats.interrupts.fetch_add(1, Ordering::Relaxed);
        match self.rdm.confirm(pipe, seq) {
            Ok(freed) => {
                self.stats
                    .reclaimed_by_interrupt
                    .fetch_add(freed as u64, Ordering::Relaxed);
            }
            Err(e) => {
                warn_log!("GarbageCollector", pipe = %pipe, error = %e, "interrupt for unknown pipe")
            }
        }
    }
}
