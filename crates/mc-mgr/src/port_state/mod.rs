//! Per-port multicast state.

mod orch;
mod types;

pub use types::PortMcState;
pub(crate) use types::PortStateTable;
