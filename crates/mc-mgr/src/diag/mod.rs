//! Replication traces, the watch point and counters.

mod orch;
mod trace;
mod types;

pub use types::{McCounters, McOrchStats, PacketInfo, ReplicaCopy, ReplicationTrace};
pub(crate) use types::WatchPoint;
