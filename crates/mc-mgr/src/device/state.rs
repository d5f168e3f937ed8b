//! In-memory shadow of one device's replication trees.
//!
//! The shadow is the source of truth for validation and for computing the
//! payload of every RDM cell. Payloads are always derived from the current
//! shadow, so a relink after a membership change is just "rewrite the cell
//! at this chain position".

use std::collections::HashMap;

use mc_common::{SlotArena, SlotKey};
use mc_hal::{
    EcmpHandle, HandleKind, HwWrite, McError, McHandle, McResult, MgrpHandle, NodeHandle,
    RdmAddr, RdmPayload,
};
use mc_types::{DevId, LagId, LagSet, Mgid, PipeId, PortId, PortSet};

use crate::diag::{McOrchStats, WatchPoint};
use crate::ecmp::EcmpEntry;
use crate::lag::LagTable;
use crate::limits::AdmissionLimits;
use crate::mgrp::{L1Member, MgrpEntry};
use crate::node::{NodeAssociation, NodeEntry};
use crate::port_state::PortStateTable;
use crate::prune::PruneTable;

pub(crate) fn slot_key<K: HandleKind>(handle: McHandle<K>) -> SlotKey {
    SlotKey::new(handle.index(), handle.generation())
}

pub(crate) fn to_handle<K: HandleKind>(dev: DevId, key: SlotKey) -> McHandle<K> {
    McHandle::new(dev, key.index, key.generation)
}

/// Port and pipe layout of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Geometry {
    pub dev: DevId,
    pub pipe_count: u8,
    pub ports_per_pipe: u16,
}

impl Geometry {
    pub fn pipes(&self) -> impl Iterator<Item = PipeId> {
        (0..self.pipe_count).map(PipeId)
    }

    pub fn port_count(&self) -> u32 {
        u32::from(self.pipe_count) * u32::from(self.ports_per_pipe)
    }

    pub fn check_ports(&self, ports: &PortSet) -> McResult<()> {
        match ports.max() {
            Some(max) if u32::from(max.0) >= self.port_count() => Err(McError::invalid_argument(
                format!("port {} outside a {}-port device", max, self.port_count()),
            )),
            _ => Ok(()),
        }
    }

    pub fn check_port(&self, port: PortId) -> McResult<()> {
        if u32::from(port.0) < self.port_count() {
            Ok(())
        } else {
            Err(McError::invalid_argument(format!(
                "port {} outside a {}-port device",
                port,
                self.port_count()
            )))
        }
    }

    /// Cells a node's L2 chain needs in `pipe`.
    pub fn l2_demand(&self, ports: &PortSet, lags: &LagSet, pipe: PipeId) -> usize {
        let port_cell = usize::from(!ports.in_pipe(pipe, self.ports_per_pipe).is_empty());
        port_cell + lags.len()
    }

    /// Writes for a node's L2 chain in `pipe`, tail first.
    pub fn l2_writes(
        &self,
        ports: &PortSet,
        lags: &LagSet,
        cells: &[RdmAddr],
        pipe: PipeId,
    ) -> Vec<HwWrite> {
        let local = ports.in_pipe(pipe, self.ports_per_pipe);
        let mut payloads = Vec::with_capacity(cells.len());
        if !local.is_empty() {
            payloads.push(RdmPayload::L2Ports {
                ports: local,
                next: None,
            });
        }
        payloads.extend(lags.iter().map(|lag| RdmPayload::L2Lag { lag, next: None }));

        let mut writes: Vec<HwWrite> = payloads
            .into_iter()
            .zip(cells)
            .enumerate()
            .map(|(i, (mut payload, addr))| {
                if let RdmPayload::L2Ports { next, .. } | RdmPayload::L2Lag { next, .. } =
                    &mut payload
                {
                    *next = cells.get(i + 1).copied();
                }
                HwWrite::Rdm {
                    addr: *addr,
                    payload,
                }
            })
            .collect();
        writes.reverse();
        writes
    }
}

pub(crate) struct TreeState {
    pub geo: Geometry,
    pub mgrps: SlotArena<MgrpEntry>,
    pub mgids: HashMap<Mgid, MgrpHandle>,
    pub nodes: SlotArena<NodeEntry>,
    pub ecmps: SlotArena<EcmpEntry>,
    pub lags: LagTable,
    pub prune: PruneTable,
    pub ports: PortStateTable,
    pub limits: AdmissionLimits,
    pub watch: WatchPoint,
    pub stats: McOrchStats,
}

impl TreeState {
    pub fn new(
        geo: Geometry,
        max_mgrps: usize,
        max_nodes: usize,
        max_ecmps: usize,
        lag_table_size: u16,
        reserved_lag: Option<LagId>,
        prune_table_size: u16,
    ) -> Self {
        Self {
            geo,
            mgrps: SlotArena::with_capacity(max_mgrps),
            mgids: HashMap::new(),
            nodes: SlotArena::with_capacity(max_nodes),
            ecmps: SlotArena::with_capacity(max_ecmps),
            lags: LagTable::new(lag_table_size, reserved_lag),
            prune: PruneTable::new(prune_table_size),
            ports: PortStateTable::default(),
            limits: AdmissionLimits::default(),
            watch: WatchPoint::default(),
            stats: McOrchStats::default(),
        }
    }

    fn check_dev<K: HandleKind>(&self, handle: McHandle<K>) -> McResult<SlotKey> {
        if handle.is_valid() && handle.dev() == self.geo.dev {
            Ok(slot_key(handle))
        } else {
            Err(McError::invalid_handle(handle))
        }
    }

    pub fn mgrp(&self, handle: MgrpHandle) -> McResult<&MgrpEntry> {
        let key = self.check_dev(handle)?;
        self.mgrps
            .get(key)
            .ok_or_else(|| McError::invalid_handle(handle))
    }

    pub fn mgrp_mut(&mut self, handle: MgrpHandle) -> McResult<&mut MgrpEntry> {
        let key = self.check_dev(handle)?;
        self.mgrps
            .get_mut(key)
            .ok_or_else(|| McError::invalid_handle(handle))
    }

    pub fn node(&self, handle: NodeHandle) -> McResult<&NodeEntry> {
        let key = self.check_dev(handle)?;
        self.nodes
            .get(key)
            .ok_or_else(|| McError::invalid_handle(handle))
    }

    pub fn node_mut(&mut self, handle: NodeHandle) -> McResult<&mut NodeEntry> {
        let key = self.check_dev(handle)?;
        self.nodes
            .get_mut(key)
            .ok_or_else(|| McError::invalid_handle(handle))
    }

    pub fn ecmp(&self, handle: EcmpHandle) -> McResult<&EcmpEntry> {
        let key = self.check_dev(handle)?;
        self.ecmps
            .get(key)
            .ok_or_else(|| McError::invalid_handle(handle))
    }

    pub fn ecmp_mut(&mut self, handle: EcmpHandle) -> McResult<&mut EcmpEntry> {
        let key = self.check_dev(handle)?;
        self.ecmps
            .get_mut(key)
            .ok_or_else(|| McError::invalid_handle(handle))
    }

    /// L1 cell a group member occupies in `pipe`.
    pub fn member_cell(&self, member: &L1Member, pipe: PipeId) -> Option<RdmAddr> {
        match member {
            L1Member::Node { node, .. } => self
                .nodes
                .get(slot_key(*node))
                .and_then(|n| n.l1.get(pipe.index()).copied()),
            L1Member::Ecmp { ptr, .. } => ptr.get(pipe.index()).copied(),
        }
    }

    /// Write for a cell of a group's chain in `pipe`: the root for `None`,
    /// otherwise the member at `pos`, linked to whatever follows it now.
    pub fn chain_write(&self, group: &MgrpEntry, pos: Option<usize>, pipe: PipeId) -> Option<HwWrite> {
        let p = pipe.index();
        let Some(pos) = pos else {
            let first = group
                .members
                .first()
                .and_then(|m| self.member_cell(m, pipe));
            return Some(HwWrite::Rdm {
                addr: *group.root.get(p)?,
                payload: RdmPayload::MgrpRoot {
                    mgid: group.mgid,
                    first,
                },
            });
        };

        let next = group
            .members
            .get(pos + 1)
            .and_then(|m| self.member_cell(m, pipe));
        match group.members.get(pos)? {
            L1Member::Node { node, xid } => {
                let entry = self.nodes.get(slot_key(*node))?;
                Some(HwWrite::Rdm {
                    addr: *entry.l1.get(p)?,
                    payload: RdmPayload::L1Node {
                        rid: entry.rid,
                        xid: *xid,
                        next,
                        l2: entry.l2.get(p).and_then(|c| c.first().copied()),
                    },
                })
            }
            L1Member::Ecmp { ecmp, xid, ptr } => {
                let entry = self.ecmps.get(slot_key(*ecmp))?;
                Some(HwWrite::Rdm {
                    addr: *ptr.get(p)?,
                    payload: RdmPayload::L1EcmpPtr {
                        xid: *xid,
                        next,
                        header: *entry.header.get(p)?,
                    },
                })
            }
        }
    }

    /// Rewrites the predecessor of chain position `pos` (the root when
    /// `pos` is 0) in every pipe.
    pub fn predecessor_writes(&self, group: &MgrpEntry, pos: usize) -> Vec<(PipeId, HwWrite)> {
        let prev = pos.checked_sub(1);
        self.geo
            .pipes()
            .filter_map(|pipe| self.chain_write(group, prev, pipe).map(|w| (pipe, w)))
            .collect()
    }

    /// Write for a node's L1 cell in `pipe` given its current association.
    pub fn node_l1_write(&self, handle: NodeHandle, pipe: PipeId) -> Option<HwWrite> {
        let entry = self.nodes.get(slot_key(handle))?;
        if let NodeAssociation::Mgrp { mgrp, .. } = entry.assoc {
            let group = self.mgrps.get(slot_key(mgrp))?;
            let pos = group.node_position(handle)?;
            return self.chain_write(group, Some(pos), pipe);
        }
        let p = pipe.index();
        Some(HwWrite::Rdm {
            addr: *entry.l1.get(p)?,
            payload: RdmPayload::L1Node {
                rid: entry.rid,
                xid: None,
                next: None,
                l2: entry.l2.get(p).and_then(|c| c.first().copied()),
            },
        })
    }

    /// Slot writes of an ECMP vector in `pipe`, tail first.
    pub fn ecmp_slot_writes(&self, members: &[NodeHandle], slots: &[RdmAddr], pipe: PipeId) -> Vec<HwWrite> {
        let p = pipe.index();
        let mut writes: Vec<HwWrite> = members
            .iter()
            .zip(slots)
            .enumerate()
            .filter_map(|(i, (node, addr))| {
                let node_l1 = *self.nodes.get(slot_key(*node))?.l1.get(p)?;
                Some(HwWrite::Rdm {
                    addr: *addr,
                    payload: RdmPayload::EcmpSlot {
                        node_l1,
                        next: slots.get(i + 1).copied(),
                    },
                })
            })
            .collect();
        writes.reverse();
        writes
    }

    pub fn ecmp_header_write(header: RdmAddr, slots: &[RdmAddr]) -> HwWrite {
        HwWrite::Rdm {
            addr: header,
            payload: RdmPayload::EcmpHeader {
                vector: slots.first().copied(),
                len: u16::try_from(slots.len()).unwrap_or(u16::MAX),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mc_types::Rid;
    use pretty_assertions::assert_eq;

    fn geo() -> Geometry {
        Geometry {
            dev: DevId(0),
            pipe_count: 2,
            ports_per_pipe: 8,
        }
    }

    #[test]
    fn test_check_ports() {
        assert!(geo().check_ports(&PortSet::from([0, 15])).is_ok());
        assert!(geo().check_ports(&PortSet::from([16])).is_err());
        assert!(geo().check_ports(&PortSet::new()).is_ok());
    }

    #[test]
    fn test_l2_demand_per_pipe() {
        let ports = PortSet::from([1, 2]);
        let lags = LagSet::from([3]);
        assert_eq!(geo().l2_demand(&ports, &lags, PipeId(0)), 2);
        assert_eq!(geo().l2_demand(&ports, &lags, PipeId(1)), 1);
    }

    #[test]
    fn test_l2_writes_are_tail_first() {
        let cells = [RdmAddr(10), RdmAddr(11)];
        let writes = geo().l2_writes(&PortSet::from([1]), &LagSet::from([4]), &cells, PipeId(0));
        assert_eq!(
            writes,
            vec![
                HwWrite::Rdm {
                    addr: RdmAddr(11),
                    payload: RdmPayload::L2Lag {
                        lag: LagId(4),
                        next: None
                    },
                },
                HwWrite::Rdm {
                    addr: RdmAddr(10),
                    payload: RdmPayload::L2Ports {
                        ports: PortSet::from([1]),
                        next: Some(RdmAddr(11))
                    },
                },
            ]
        );
    }

    #[test]
    fn test_chain_write_links_members() {
        let mut state = TreeState::new(geo(), 4, 4, 4, 8, None, 8);
        let key = state
            .nodes
            .insert(NodeEntry {
                rid: Rid(7),
                ports: PortSet::from([1]),
                lags: LagSet::new(),
                assoc: NodeAssociation::Unassociated,
                l1: vec![RdmAddr(1), RdmAddr(1)],
                l2: vec![vec![RdmAddr(2)], vec![]],
            })
            .unwrap();
        let node: NodeHandle = to_handle(DevId(0), key);
        let group = MgrpEntry {
            mgid: Mgid(5),
            root: vec![RdmAddr(0), RdmAddr(0)],
            members: vec![L1Member::Node { node, xid: None }],
        };

        assert_eq!(
            state.chain_write(&group, None, PipeId(0)),
            Some(HwWrite::Rdm {
                addr: RdmAddr(0),
                payload: RdmPayload::MgrpRoot {
                    mgid: Mgid(5),
                    first: Some(RdmAddr(1))
                },
            })
        );
        assert_eq!(
            state.chain_write(&group, Some(0), PipeId(1)),
            Some(HwWrite::Rdm {
                addr: RdmAddr(1),
                payload: RdmPayload::L1Node {
                    rid: Rid(7),
                    xid: None,
                    next: None,
                    l2: None
                },
            })
        );
    }

    #[test]
    fn test_wrong_device_handle_rejected() {
        let state = TreeState::new(geo(), 4, 4, 4, 8, None, 8);
        let foreign = NodeHandle::new(DevId(3), 0, 1);
        assert_eq!(
            state.node(foreign).unwrap_err().status(),
            mc_hal::McStatus::InvalidHandle
        );
    }
}
