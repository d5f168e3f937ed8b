//! ECMP groups: ordered node vectors selected by hash.

pub mod hash;
mod orch;
mod types;

pub use types::{EcmpAssociation, EcmpSelection, EcmpSummary};
pub(crate) use types::EcmpEntry;
