//! Multicast group types.

use mc_hal::{EcmpHandle, NodeHandle, RdmAddr};
use mc_types::{L1Xid, Mgid};

/// One L1 member of a group, in chain order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum L1Member {
    /// A node linked directly; its own L1 cell sits in the chain.
    Node {
        node: NodeHandle,
        xid: Option<L1Xid>,
    },
    /// An ECMP group reached through an L1 pointer cell per pipe.
    Ecmp {
        ecmp: EcmpHandle,
        xid: Option<L1Xid>,
        ptr: Vec<RdmAddr>,
    },
}

impl L1Member {
    pub fn xid(&self) -> Option<L1Xid> {
        match self {
            L1Member::Node { xid, .. } | L1Member::Ecmp { xid, .. } => *xid,
        }
    }
}

/// Shadow of one group.
#[derive(Debug, Clone)]
pub(crate) struct MgrpEntry {
    pub mgid: Mgid,
    /// Root cell per pipe.
    pub root: Vec<RdmAddr>,
    /// L1 chain in insertion order.
    pub members: Vec<L1Member>,
}

impl MgrpEntry {
    pub fn node_position(&self, node: NodeHandle) -> Option<usize> {
        self.members
            .iter()
            .position(|m| matches!(m, L1Member::Node { node: n, .. } if *n == node))
    }

    pub fn ecmp_position(&self, ecmp: EcmpHandle) -> Option<usize> {
        self.members
            .iter()
            .position(|m| matches!(m, L1Member::Ecmp { ecmp: e, .. } if *e == ecmp))
    }

    pub fn node_members(&self) -> Vec<NodeHandle> {
        self.members
            .iter()
            .filter_map(|m| match m {
                L1Member::Node { node, .. } => Some(*node),
                L1Member::Ecmp { .. } => None,
            })
            .collect()
    }

    pub fn ecmp_members(&self) -> Vec<EcmpHandle> {
        self.members
            .iter()
            .filter_map(|m| match m {
                L1Member::Ecmp { ecmp, .. } => Some(*ecmp),
                L1Member::Node { .. } => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mc_types::DevId;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_member_positions() {
        let n1 = NodeHandle::new(DevId(0), 0, 1);
        let n2 = NodeHandle::new(DevId(0), 1, 1);
        let e1 = EcmpHandle::new(DevId(0), 0, 1);
        let entry = MgrpEntry {
            mgid: Mgid(1),
            root: vec![],
            members: vec![
                L1Member::Node { node: n1, xid: None },
                L1Member::Ecmp {
                    ecmp: e1,
                    xid: Some(L1Xid(2)),
                    ptr: vec![],
                },
                L1Member::Node { node: n2, xid: None },
            ],
        };
        assert_eq!(entry.node_position(n2), Some(2));
        assert_eq!(entry.ecmp_position(e1), Some(1));
        assert_eq!(entry.node_members(), vec![n1, n2]);
        assert_eq!(entry.ecmp_members(), vec![e1]);
        assert_eq!(entry.members[1].xid(), Some(L1Xid(2)));
    }
}
