//! Identifier types for the multicast replication tree manager.
//!
//! These are plain, copyable values handed in by the port/topology layer and
//! by control-plane callers. None of them carry hardware state:
//!
//! - [`DevId`], [`PipeId`]: device and pipeline identifiers
//! - [`PortId`], [`PortSet`]: device ports and ordered port sets
//! - [`LagId`], [`LagSet`]: LAG table indices and ordered LAG sets
//! - [`Rid`], [`L1Xid`], [`L2Xid`]: replication id and exclusion ids
//! - [`Mgid`]: external multicast group id

mod ids;
mod lag;
mod port;

pub use ids::{L1Xid, L2Xid, Mgid, Rid};
pub use lag::{LagId, LagSet};
pub use port::{DevId, PipeId, PortId, PortSet};

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid port id: {0}")]
    InvalidPortId(String),

    #[error("invalid LAG id: {0}")]
    InvalidLagId(String),

    #[error("invalid port set: {0}")]
    InvalidPortSet(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),
}
