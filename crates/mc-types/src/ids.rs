//! Replication and exclusion identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Replication ID stamped onto every copy a node emits.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Rid(pub u16);

impl fmt::Display for Rid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rid{}", self.0)
    }
}

/// Level-1 exclusion id, carried on a group association and on the packet.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct L1Xid(pub u16);

impl fmt::Display for L1Xid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "xid{}", self.0)
    }
}

/// Level-2 exclusion id, the key of the port prune table.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct L2Xid(pub u16);

impl L2Xid {
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for L2Xid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "yid{}", self.0)
    }
}

/// Operator-chosen multicast group id, unique per device.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Mgid(pub u16);

impl fmt::Display for Mgid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mgid{}", self.0)
    }
}
