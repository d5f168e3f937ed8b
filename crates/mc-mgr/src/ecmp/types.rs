//! ECMP group types.

use mc_hal::{MgrpHandle, NodeHandle, RdmAddr};
use mc_types::L1Xid;
use serde::Serialize;

/// One group an ECMP group is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EcmpAssociation {
    pub mgrp: MgrpHandle,
    pub xid: Option<L1Xid>,
}

/// Result of a hash lookup on an ECMP group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EcmpSelection {
    /// `None` when the group has no members.
    pub node: Option<NodeHandle>,
    pub is_pruned: bool,
}

/// Per-group membership summary used by diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EcmpSummary {
    pub members: usize,
    pub associations: usize,
}

/// Shadow of one ECMP group.
#[derive(Debug, Clone)]
pub(crate) struct EcmpEntry {
    /// Ordered members; order drives hash selection.
    pub members: Vec<NodeHandle>,
    pub assocs: Vec<EcmpAssociation>,
    /// Header cell per pipe.
    pub header: Vec<RdmAddr>,
    /// Member slot cells per pipe, parallel to `members`.
    pub slots: Vec<Vec<RdmAddr>>,
}

impl EcmpEntry {
    pub fn summary(&self) -> EcmpSummary {
        EcmpSummary {
            members: self.members.len(),
            associations: self.assocs.len(),
        }
    }

    pub fn assoc(&self, mgrp: MgrpHandle) -> Option<&EcmpAssociation> {
        self.assocs.iter().find(|a| a.mgrp == mgrp)
    }
}
