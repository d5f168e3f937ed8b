//! RDM cell bookkeeping types.

use mc_hal::{CommitSeq, EcmpHandle, MgrpHandle, NodeHandle};
use mc_types::PipeId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Device-wide garbage collection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GcMode {
    /// Cells are freed by the "memory change confirmed" interrupt.
    #[default]
    Interrupt,
    /// Cells are freed only by `do_node_garbage_collection`.
    Periodic,
}

impl fmt::Display for GcMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GcMode::Interrupt => write!(f, "interrupt"),
            GcMode::Periodic => write!(f, "periodic"),
        }
    }
}

impl FromStr for GcMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "interrupt" => Ok(GcMode::Interrupt),
            "periodic" => Ok(GcMode::Periodic),
            other => Err(format!("unknown gc mode: {}", other)),
        }
    }
}

/// Registry entry a cell belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellOwner {
    Mgrp(MgrpHandle),
    Node(NodeHandle),
    Ecmp(EcmpHandle),
    /// L1 pointer cell linking a group's chain to an ECMP group.
    Association { mgrp: MgrpHandle, ecmp: EcmpHandle },
}

/// When a pending cell becomes reclaimable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReclaimGate {
    /// The write that unlinks the cell has not been submitted yet.
    AwaitingSubmit,
    /// Reclaimable once the hardware is done with commit `seq`.
    AfterSeq(CommitSeq),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellState {
    Free,
    Allocated {
        owner: CellOwner,
        /// Commit that last carried a write to this cell, if any.
        submitted: Option<CommitSeq>,
    },
    PendingReclaim {
        owner: CellOwner,
        gate: ReclaimGate,
        /// GC mode in force when the cell was retired.
        mode: GcMode,
    },
}

/// Snapshot of one pipe's pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RdmUsage {
    pub pipe: PipeId,
    pub free: usize,
    pub allocated: usize,
    pub pending: usize,
}

impl RdmUsage {
    pub fn total(&self) -> usize {
        self.free + self.allocated + self.pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gc_mode_parse() {
        assert_eq!("periodic".parse::<GcMode>(), Ok(GcMode::Periodic));
        assert_eq!("Interrupt".parse::<GcMode>(), Ok(GcMode::Interrupt));
        assert!("sometimes".parse::<GcMode>().is_err());
        assert_eq!(GcMode::default(), GcMode::Interrupt);
    }
}
