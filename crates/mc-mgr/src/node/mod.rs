//! Replication nodes: one L1 cell plus an L2 chain of ports and LAGs.

mod orch;
mod types;

pub use types::{NodeAssociation, NodeAttr};
pub(crate) use types::NodeEntry;
