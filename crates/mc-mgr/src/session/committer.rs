//! Commit strategies selected by session state.

use std::collections::VecDeque;

use super::types::StagedOp;

/// Decides what happens to the work produced by a mutating call.
pub trait Committer: Send + Sync {
    fn name(&self) -> &'static str;

    /// True when work is held back until the batch is flushed.
    fn is_batch(&self) -> bool;

    /// Takes `op` and returns the work that must be submitted now.
    fn accept(&self, queue: &mut VecDeque<StagedOp>, op: StagedOp) -> Vec<StagedOp>;
}

/// Submits every call's writes as soon as the call returns.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateCommitter;

impl Committer for ImmediateCommitter {
    fn name(&self) -> &'static str {
        "immediate"
    }

    fn is_batch(&self) -> bool {
        false
    }

    fn accept(&self, _queue: &mut VecDeque<StagedOp>, op: StagedOp) -> Vec<StagedOp> {
        vec![op]
    }
}

/// Queues writes in submission order until the batch is flushed.
#[derive(Debug, Default, Clone, Copy)]
pub struct BatchCommitter;

impl Committer for BatchCommitter {
    fn name(&self) -> &'static str {
        "batch"
    }

    fn is_batch(&self) -> bool {
        true
    }

    fn accept(&self, queue: &mut VecDeque<StagedOp>, op: StagedOp) -> Vec<StagedOp> {
        queue.push_back(op);
        Vec::new()
    }
}

pub(crate) static IMMEDIATE: ImmediateCommitter = ImmediateCommitter;
pub(crate) static BATCH: BatchCommitter = BatchCommitter;
