//! Typed handles and the hardware contract for multicast replication trees.
//!
//! This crate sits between the tree manager and the ASIC. It prevents the
//! common mistakes of mixing handle kinds (passing a node handle where a
//! group handle is expected) and of treating a raw status integer as success.
//!
//! # Architecture
//!
//! - [`types`]: type-safe handles, RDM addresses and commit sequence numbers
//! - [`error`]: status codes and the error type shared by every layer
//! - [`api`]: the hardware collaborator contract (commit, ack, interrupts)
//! - [`sim`]: an in-memory model of the hardware for tests and simulation
//!
//! # Example
//!
//! ```ignore
//! use mc_hal::{McHardware, HwWrite, McResult};
//!
//! fn push(hw: &dyn McHardware, pipe: PipeId, writes: &[HwWrite]) -> McResult<()> {
//!     let seq = hw.commit(pipe, writes)?;
//!     hw.wait_complete(pipe, seq, Duration::from_secs(2))
//! }
//! ```

pub mod api;
pub mod error;
pub mod sim;
pub mod types;

pub use api::{HwWrite, McHardware, MemChangeHandler, RdmPayload};
pub use error::{McError, McResult, McStatus};
pub use sim::{SimHardware, SimHardwareConfig};
pub use types::{
    CommitSeq, EcmpHandle, EcmpKind, HandleKind, McHandle, MgrpHandle, MgrpKind, NodeHandle,
    NodeKind, RawHandle, RdmAddr,
};
