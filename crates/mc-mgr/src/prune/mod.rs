//! L2 exclusion ids and the global exclusion RID.

mod orch;
mod types;

pub(crate) use types::PruneTable;
