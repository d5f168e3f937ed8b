//! Hardware collaborator contract.
//!
//! The tree manager never touches registers. It hands ordered batches of
//! [`HwWrite`]s to a [`McHardware`] implementation per pipe and learns about
//! completion through commit sequence numbers and the "memory change
//! confirmed" interrupt.
//!
//! - [`hardware`]: the commit / ack / read-back / interrupt trait
//! - [`write`]: write records and replication memory payloads

pub mod hardware;
pub mod write;

pub use hardware::{McHardware, MemChangeHandler};
pub use write::{HwWrite, RdmPayload};
