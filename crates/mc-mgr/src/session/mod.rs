//! Sessions and batch staging.
//!
//! Every mutating call on a device runs inside a caller-owned session. The
//! session decides, through its current [`Committer`], whether the hardware
//! writes produced by a call are submitted right away or queued until the
//! batch is flushed.
//!
//! # Batch state machine
//!
//! ```text
//!            begin_batch                 end_batch(sync?)
//! Immediate ────────────> Batch (queue) ─────────────────> Immediate
//!                           │    ▲
//!                           └────┘ flush_batch
//! ```

mod committer;
mod manager;
mod types;

pub use committer::{BatchCommitter, Committer, ImmediateCommitter};
pub use manager::{SessionCounters, SessionManager};
pub use types::{PipeOps, SessionId, StagedOp};
