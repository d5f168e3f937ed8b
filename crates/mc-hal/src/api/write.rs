//! Write records handed to the hardware.
//!
//! Register encodings are deliberately abstract: a write names the table
//! or memory cell it targets and the logical content it programs.

use mc_types::{L1Xid, L2Xid, LagId, Mgid, PortId, PortSet, Rid};

use crate::types::RdmAddr;

/// Logical content of one replication memory cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RdmPayload {
    /// Tree root for a group. `first` is the head of the L1 chain.
    MgrpRoot { mgid: Mgid, first: Option<RdmAddr> },
    /// L1 replication node.
    L1Node {
        rid: Rid,
        xid: Option<L1Xid>,
        next: Option<RdmAddr>,
        l2: Option<RdmAddr>,
    },
    /// L1 pointer from a group's chain to an ECMP header.
    L1EcmpPtr {
        xid: Option<L1Xid>,
        next: Option<RdmAddr>,
        header: RdmAddr,
    },
    /// ECMP group header; `vector` is the first member slot.
    EcmpHeader { vector: Option<RdmAddr>, len: u16 },
    /// One ECMP member slot pointing at a member node's L1 cell.
    EcmpSlot {
        node_l1: RdmAddr,
        next: Option<RdmAddr>,
    },
    /// L2 port set of a node, restricted to the pipe.
    L2Ports { ports: PortSet, next: Option<RdmAddr> },
    /// L2 LAG reference of a node.
    L2Lag { lag: LagId, next: Option<RdmAddr> },
}

impl RdmPayload {
    /// Addresses this payload points at.
    pub fn references(&self) -> Vec<RdmAddr> {
        let mut refs = Vec::new();
        match self {
            RdmPayload::MgrpRoot { first, .. } => refs.extend(*first),
            RdmPayload::L1Node { next, l2, .. } => {
                refs.extend(*next);
                refs.extend(*l2);
            }
            RdmPayload::L1EcmpPtr { next, header, .. } => {
                refs.extend(*next);
                refs.push(*header);
            }
            RdmPayload::EcmpHeader { vector, .. } => refs.extend(*vector),
            RdmPayload::EcmpSlot { node_l1, next } => {
                refs.push(*node_l1);
                refs.extend(*next);
            }
            RdmPayload::L2Ports { next, .. } | RdmPayload::L2Lag { next, .. } => {
                refs.extend(*next)
            }
        }
        refs
    }
}

/// One hardware write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HwWrite {
    Rdm { addr: RdmAddr, payload: RdmPayload },
    LagMembership { lag: LagId, ports: PortSet },
    RemoteLagCount { lag: LagId, left: u16, right: u16 },
    PruneEntry { xid: L2Xid, ports: PortSet },
    GlobalRid(Rid),
    PortForward { port: PortId, active: bool },
    FastFailover { enabled: bool },
    ClearFastFailover { port: PortId },
    Protection { enabled: bool },
    ProtectionMap {
        protected: PortId,
        backup: Option<PortId>,
    },
    MaxNodesBeforeYield(u32),
    MaxNodeThreshold { node_count: u32, port_lag_count: u32 },
}

impl HwWrite {
    /// Returns the replication memory cell this write programs, if any.
    pub fn rdm_addr(&self) -> Option<RdmAddr> {
        match self {
            HwWrite::Rdm { addr, .. } => Some(*addr),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_references() {
        let p = RdmPayload::L1Node {
            rid: Rid(1),
            xid: None,
            next: Some(RdmAddr(4)),
            l2: Some(RdmAddr(5)),
        };
        assert_eq!(p.references(), vec![RdmAddr(4), RdmAddr(5)]);

        let root = RdmPayload::MgrpRoot {
            mgid: Mgid(1),
            first: None,
        };
        assert!(root.references().is_empty());
    }

    #[test]
    fn test_rdm_addr() {
        let w = HwWrite::GlobalRid(Rid(3));
        assert_eq!(w.rdm_addr(), None);
        let w = HwWrite::Rdm {
            addr: RdmAddr(9),
            payload: RdmPayload::EcmpHeader {
                vector: None,
                len: 0,
            },
        };
        assert_eq!(w.rdm_addr(), Some(RdmAddr(9)));
    }
}
