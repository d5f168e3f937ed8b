//! Walk yield budget and hard discard thresholds.

mod orch;
mod types;

pub use types::{ThresholdBreadcrumb, ThresholdKind, DEFAULT_MAX_NODES_BEFORE_YIELD};
pub(crate) use types::AdmissionLimits;
