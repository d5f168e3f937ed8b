//! LAG membership and hash selection.

pub mod hash;
mod orch;
mod types;

pub use types::LagSelection;
pub(crate) use types::LagTable;
