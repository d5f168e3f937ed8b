//! Session identifiers and staged hardware work.

use std::collections::BTreeMap;
use std::fmt;

use mc_hal::{HwWrite, RdmAddr};
use mc_types::{DevId, PipeId};

/// Caller session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u32);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sess{}", self.0)
    }
}

/// Writes for one pipe plus the cells they unlink.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipeOps {
    pub writes: Vec<HwWrite>,
    /// Cells retired by this work; reclaimable once its commit completes.
    pub retire: Vec<RdmAddr>,
}

impl PipeOps {
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.retire.is_empty()
    }

    pub fn append(&mut self, other: PipeOps) {
        self.writes.extend(other.writes);
        self.retire.extend(other.retire);
    }
}

/// Hardware work produced by one mutating call on one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedOp {
    pub dev: DevId,
    pub pipes: BTreeMap<PipeId, PipeOps>,
}

impl StagedOp {
    pub fn new(dev: DevId) -> Self {
        Self {
            dev,
            pipes: BTreeMap::new(),
        }
    }

    pub fn write(&mut self, pipe: PipeId, write: HwWrite) {
        self.pipes.entry(pipe).or_default().writes.push(write);
    }

    /// Queues the same write on every pipe of the device.
    pub fn write_all(&mut self, pipe_count: u8, write: HwWrite) {
        for p in 0..pipe_count {
            self.write(PipeId(p), write.clone());
        }
    }

    pub fn retire(&mut self, pipe: PipeId, addrs: &[RdmAddr]) {
        if !addrs.is_empty() {
            self.pipes
                .entry(pipe)
                .or_default()
                .retire
                .extend_from_slice(addrs);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pipes.values().all(PipeOps::is_empty)
    }

    pub fn write_count(&self) -> usize {
        self.pipes.values().map(|p| p.writes.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mc_types::Rid;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_staged_op_accumulates_per_pipe() {
        let mut op = StagedOp::new(DevId(0));
        assert!(op.is_empty());
        op.write_all(2, HwWrite::GlobalRid(Rid(1)));
        op.retire(PipeId(1), &[RdmAddr(4)]);
        op.retire(PipeId(0), &[]);
        assert_eq!(op.write_count(), 2);
        assert_eq!(op.pipes[&PipeId(1)].retire, vec![RdmAddr(4)]);
        assert!(op.pipes[&PipeId(0)].retire.is_empty());
    }

    #[test]
    fn test_pipe_ops_append_keeps_order() {
        let mut a = PipeOps {
            writes: vec![HwWrite::GlobalRid(Rid(1))],
            retire: vec![],
        };
        a.append(PipeOps {
            writes: vec![HwWrite::GlobalRid(Rid(2))],
            retire: vec![RdmAddr(1)],
        });
        assert_eq!(
            a.writes,
            vec![HwWrite::GlobalRid(Rid(1)), HwWrite::GlobalRid(Rid(2))]
        );
        assert_eq!(a.retire, vec![RdmAddr(1)]);
    }
}
