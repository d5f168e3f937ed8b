//! Replication memory (RDM) allocation and garbage collection.
//!
//! Every tree entry is backed by cells in a per-pipe RDM pool. A destroyed
//! entry's cells are never freed directly: they become `PendingReclaim` and
//! are moved back to the free list only by the garbage collector, either on
//! the hardware's "memory change confirmed" interrupt or on an explicit
//! periodic sweep.
//!
//! ```text
//!  alloc            retire              commit(seq)            confirm / sweep
//! Free ──> Allocated ──> Pending(awaiting) ──> Pending(after seq) ──────────────> Free
//! ```

mod allocator;
mod gc;
mod pool;
mod types;

pub use allocator::RdmAllocator;
pub use gc::{GarbageCollector, GcCounters};
pub use pool::RdmPool;
pub use types::{CellOwner, CellState, GcMode, ReclaimGate, RdmUsage};
