//! Multicast groups and their L1 chains.

mod orch;
mod types;

pub(crate) use types::{L1Member, MgrpEntry};
