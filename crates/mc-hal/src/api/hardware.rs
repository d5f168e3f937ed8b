//! The hardware abstraction trait.

use std::sync::Arc;
use std::time::Duration;

use mc_types::{DevId, LagId, PipeId, PortSet};

use super::write::RdmPayload;
use crate::error::McResult;
use crate::types::{CommitSeq, RdmAddr};

/// Receives "memory change confirmed" interrupts.
///
/// The hardware raises one per (device, pipe) once the replication engine
/// can no longer be walking anything that was unlinked by commits up to and
/// including `seq`. The handler runs on the interrupt thread, concurrently
/// with caller threads.
pub trait MemChangeHandler: Send + Sync {
    fn on_mem_change_confirmed(&self, dev: DevId, pipe: PipeId, seq: CommitSeq);
}

/// Opaque hardware commit surface for one device.
pub trait McHardware: Send + Sync {
    /// Device this hardware instance drives.
    fn dev_id(&self) -> DevId;

    /// Number of pipes on the device.
    fn pipe_count(&self) -> u8;

    /// Submits `writes` to `pipe` in order and returns the commit sequence
    /// number. Submission does not wait for the hardware to finish.
    fn commit(&self, pipe: PipeId, writes: &[super::write::HwWrite]) -> McResult<CommitSeq>;

    /// Highest sequence the hardware has acknowledged on `pipe`.
    fn completed_seq(&self, pipe: PipeId) -> CommitSeq;

    /// Blocks until `seq` is acknowledged on `pipe`, or fails with
    /// `HardwareTimeout` after `timeout`.
    fn wait_complete(&self, pipe: PipeId, seq: CommitSeq, timeout: Duration) -> McResult<()>;

    /// Reads a LAG membership entry back from the hardware table.
    fn read_lag_membership(&self, pipe: PipeId, lag: LagId) -> McResult<PortSet>;

    /// Reads one replication memory cell back from the hardware.
    fn read_rdm(&self, pipe: PipeId, addr: RdmAddr) -> McResult<Option<RdmPayload>>;

    /// Registers the interrupt handler for this device.
    fn register_mem_change_handler(&self, handler: Arc<dyn MemChangeHandler>);
}
