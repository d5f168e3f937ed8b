//! Replication node types.

use mc_hal::{EcmpHandle, MgrpHandle, RdmAddr};
use mc_types::{L1Xid, LagSet, PortSet, Rid};
use serde::Serialize;

/// Where a node currently hangs in the trees.
///
/// A node is a direct L1 member of at most one group or a member of at most
/// one ECMP group, never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeAssociation {
    #[default]
    Unassociated,
    Mgrp {
        mgrp: MgrpHandle,
        xid: Option<L1Xid>,
    },
    Ecmp(EcmpHandle),
}

impl NodeAssociation {
    pub fn is_associated(&self) -> bool {
        !matches!(self, NodeAssociation::Unassociated)
    }
}

/// Caller-visible node attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeAttr {
    pub rid: Rid,
    pub ports: PortSet,
    pub lags: LagSet,
}

/// Shadow of one replication node.
#[derive(Debug, Clone)]
pub(crate) struct NodeEntry {
    pub rid: Rid,
    pub ports: PortSet,
    pub lags: LagSet,
    pub assoc: NodeAssociation,
    /// L1 cell per pipe.
    pub l1: Vec<RdmAddr>,
    /// L2 chain per pipe: the port cell (when the pipe has ports) followed
    /// by one cell per LAG.
    pub l2: Vec<Vec<RdmAddr>>,
}

impl NodeEntry {
    pub fn attr(&self) -> NodeAttr {
        NodeAttr {
            rid: self.rid,
            ports: self.ports.clone(),
            lags: self.lags.clone(),
        }
    }

    /// Every cell the node owns in `pipe`.
    pub fn cells(&self, pipe: usize) -> Vec<RdmAddr> {
        let mut cells: Vec<RdmAddr> = self.l1.get(pipe).copied().into_iter().collect();
        if let Some(l2) = self.l2.get(pipe) {
            cells.extend_from_slice(l2);
        }
        cells
    }
}
