//! Replication node operations.

use mc_hal::{McError, McResult, NodeHandle, RdmAddr};
use mc_types::{LagSet, PortSet, Rid};

use super::types::{NodeAssociation, NodeAttr, NodeEntry};
use crate::audit::AuditCategory;
use crate::device::page::{arena_first, arena_next};
use crate::device::state::{slot_key, to_handle, TreeState};
use crate::device::McOrch;
use crate::rdm::CellOwner;
use crate::session::{SessionId, StagedOp};

impl McOrch {
    fn check_node_targets(state: &TreeState, ports: &PortSet, lags: &LagSet) -> McResult<()> {
        state.geo.check_ports(ports)?;
        for lag in lags.iter() {
            state.lags.check(lag)?;
        }
        Ok(())
    }

    /// Creates an unassociated node replicating to `ports` and `lags`.
    ///
    /// The L2 chain is written tail first and the L1 cell last, so the node
    /// is complete in hardware before anything can point at it.
    pub fn node_create(
        &self,
        sess: SessionId,
        rid: Rid,
        ports: PortSet,
        lags: LagSet,
    ) -> McResult<NodeHandle> {
        let result = self.node_create_locked(sess, rid, ports, lags);
        let object = match &result {
            Ok(handle) => format!("{}/{}", handle, rid),
            Err(_) => rid.to_string(),
        };
        self.audit(AuditCategory::ResourceCreate, "node_create", "node", object, sess, &result);
        result
    }

    fn node_create_locked(
        &self,
        sess: SessionId,
        rid: Rid,
        ports: PortSet,
        lags: LagSet,
    ) -> McResult<NodeHandle> {
        let mut state = self.begin(sess)?;
        Self::check_node_targets(&state, &ports, &lags)?;

        let demand: Vec<usize> = state
            .geo
            .pipes()
            .map(|pipe| 1 + state.geo.l2_demand(&ports, &lags, pipe))
            .collect();
        let capacity = state.nodes.capacity();
        let key = state
            .nodes
            .insert(NodeEntry {
                rid,
                ports,
                lags,
                assoc: NodeAssociation::Unassociated,
                l1: Vec::new(),
                l2: Vec::new(),
            })
            .map_err(|_| McError::resource_exhausted(format!("node table ({} entries)", capacity)))?;
        let handle: NodeHandle = to_handle(state.geo.dev, key);

        let chain = match self.alloc_chain(&demand, CellOwner::Node(handle)) {
            Ok(chain) => chain,
            Err(e) => {
                state.nodes.remove(key);
                return Err(e);
            }
        };
        let mut l1 = Vec::with_capacity(chain.len());
        let mut l2 = Vec::with_capacity(chain.len());
        for cells in chain {
            match cells.split_first() {
                Some((first, rest)) => {
                    l1.push(*first);
                    l2.push(rest.to_vec());
                }
                None => {
                    return Err(McError::illegal_state("allocator returned an empty node chain"));
                }
            }
        }
        if let Some(entry) = state.nodes.get_mut(key) {
            entry.l1 = l1;
            entry.l2 = l2;
        }

        let mut op = self.new_op();
        self.node_chain_writes(&state, &mut op, handle)?;
        state.stats.nodes_created += 1;
        self.stage(sess, op)?;
        Ok(handle)
    }

    /// L2 chain writes (tail first) followed by the L1 cell, every pipe.
    fn node_chain_writes(&self, state: &TreeState, op: &mut StagedOp, node: NodeHandle) -> McResult<()> {
        let entry = state.node(node)?;
        for pipe in state.geo.pipes() {
            let cells = entry.l2.get(pipe.index()).map(Vec::as_slice).unwrap_or(&[]);
            for write in state.geo.l2_writes(&entry.ports, &entry.lags, cells, pipe) {
                op.write(pipe, write);
            }
            if let Some(write) = state.node_l1_write(node, pipe) {
                op.write(pipe, write);
            }
        }
        Ok(())
    }

    /// Destroys an unassociated node; its cells go to the reclaim path.
    pub fn node_destroy(&self, sess: SessionId, node: NodeHandle) -> McResult<()> {
        let result = self.node_destroy_locked(sess, node);
        self.audit(AuditCategory::ResourceDelete, "node_destroy", "node", node.to_string(), sess, &result);
        result
    }

    fn node_destroy_locked(&self, sess: SessionId, node: NodeHandle) -> McResult<()> {
        let mut state = self.begin(sess)?;
        let assoc = state.node(node)?.assoc;
        if assoc.is_associated() {
            return Err(McError::in_use(format!("{} is still {:?}", node, assoc)));
        }
        let Some(entry) = state.nodes.remove(slot_key(node)) else {
            return Err(McError::invalid_handle(node));
        };

        let mut op = self.new_op();
        for pipe in state.geo.pipes() {
            self.retire(&mut op, pipe, &entry.cells(pipe.index()))?;
        }
        state.stats.nodes_destroyed += 1;
        self.stage(sess, op)
    }

    /// Replaces a node's ports and LAGs.
    ///
    /// A fresh L2 chain is built and written first, then the L1 cell is
    /// swung onto it and the old chain retired. If the new chain cannot be
    /// allocated the node is left exactly as it was.
    pub fn node_update(&self, sess: SessionId, node: NodeHandle, ports: PortSet, lags: LagSet) -> McResult<()> {
        let result = self.node_update_locked(sess, node, ports, lags);
        self.audit(AuditCategory::ResourceModify, "node_update", "node", node.to_string(), sess, &result);
        result
    }

    fn node_update_locked(&self, sess: SessionId, node: NodeHandle, ports: PortSet, lags: LagSet) -> McResult<()> {
        let mut state = self.begin(sess)?;
        state.node(node)?;
        Self::check_node_targets(&state, &ports, &lags)?;

        let demand: Vec<usize> = state
            .geo
            .pipes()
            .map(|pipe| state.geo.l2_demand(&ports, &lags, pipe))
            .collect();
        let new_l2 = self.alloc_chain(&demand, CellOwner::Node(node))?;

        let entry = state.node_mut(node)?;
        let old_l2: Vec<Vec<RdmAddr>> = std::mem::replace(&mut entry.l2, new_l2);
        entry.ports = ports;
        entry.lags = lags;

        let mut op = self.new_op();
        self.node_chain_writes(&state, &mut op, node)?;
        for pipe in state.geo.pipes() {
            if let Some(cells) = old_l2.get(pipe.index()) {
                self.retire(&mut op, pipe, cells)?;
            }
        }
        state.stats.nodes_updated += 1;
        self.stage(sess, op)
    }

    pub fn node_get_attr(&self, node: NodeHandle) -> McResult<NodeAttr> {
        Ok(self.state.lock().node(node)?.attr())
    }

    /// Whether the node is attached to a group or an ECMP group.
    pub fn node_is_mbr(&self, node: NodeHandle) -> McResult<bool> {
        Ok(self.state.lock().node(node)?.assoc.is_associated())
    }

    pub fn node_get_association(&self, node: NodeHandle) -> McResult<NodeAssociation> {
        Ok(self.state.lock().node(node)?.assoc)
    }

    pub fn node_get_first(&self) -> McResult<NodeHandle> {
        let state = self.state.lock();
        arena_first(&state.nodes, state.geo.dev, "node")
    }

    pub fn node_get_count(&self) -> usize {
        self.state.lock().nodes.len()
    }

    pub fn node_get_next_i(&self, cursor: Option<NodeHandle>, count: usize) -> McResult<Vec<NodeHandle>> {
        let state = self.state.lock();
        arena_next(&state.nodes, state.geo.dev, cursor, count, "node")
    }
}

#[cfg(test)]
mod tests {
    use crate::device::test_support::Harness;
    use crate::node::NodeAssociation;
    use mc_hal::{McStatus, NodeHandle};
    use mc_types::{LagId, LagSet, Mgid, PipeId, PortSet, Rid};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_create_and_read_back() {
        let h = Harness::new();
        let n = h
            .orch
            .node_create(h.sess, Rid(5), PortSet::from([1, 17]), LagSet::from([2]))
            .unwrap();
        let attr = h.orch.node_get_attr(n).unwrap();
        assert_eq!(attr.rid, Rid(5));
        assert_eq!(attr.ports, PortSet::from([1, 17]));
        assert_eq!(attr.lags, LagSet::from([2]));
        assert!(!h.orch.node_is_mbr(n).unwrap());
        assert_eq!(
            h.orch.node_get_association(n).unwrap(),
            NodeAssociation::Unassociated
        );
        // Pipe 0: L1 + port cell + LAG cell. Pipe 1: L1 + port cell + LAG cell.
        assert_eq!(h.orch.rdm.usage(PipeId(0)).unwrap().allocated, 3);
        assert_eq!(h.orch.rdm.usage(PipeId(1)).unwrap().allocated, 3);
        assert!(h.hw.violations().is_empty());
    }

    #[test]
    fn test_create_rejects_bad_targets() {
        let h = Harness::with(|c| c.reserved_lag_id = Some(LagId(15)));
        let err = h
            .orch
            .node_create(h.sess, Rid(1), PortSet::from([32]), LagSet::new())
            .unwrap_err();
        assert_eq!(err.status(), McStatus::InvalidArgument);

        let err = h
            .orch
            .node_create(h.sess, Rid(1), PortSet::new(), LagSet::from([15]))
            .unwrap_err();
        assert_eq!(err.status(), McStatus::InvalidArgument);
        assert_eq!(h.orch.node_get_count(), 0);
    }

    #[test]
    fn test_create_out_of_cells_leaves_no_node() {
        let h = Harness::with(|c| c.cells_per_pipe = 2);
        let err = h
            .orch
            .node_create(h.sess, Rid(1), PortSet::from([1]), LagSet::from([1, 2]))
            .unwrap_err();
        assert_eq!(err.status(), McStatus::ResourceExhausted);
        assert_eq!(h.orch.node_get_count(), 0);
        assert_eq!(h.orch.rdm.usage(PipeId(0)).unwrap().free, 2);
    }

    #[test]
    fn test_update_swings_chain() {
        let h = Harness::new();
        let n = h
            .orch
            .node_create(h.sess, Rid(1), PortSet::from([1]), LagSet::new())
            .unwrap();
        h.orch
            .node_update(h.sess, n, PortSet::from([2, 3]), LagSet::from([4]))
            .unwrap();
        let attr = h.orch.node_get_attr(n).unwrap();
        assert_eq!(attr.ports, PortSet::from([2, 3]));
        assert_eq!(attr.lags, LagSet::from([4]));
        // The old port cell is freed by the interrupt after the commit.
        assert_eq!(h.orch.rdm.usage(PipeId(0)).unwrap().pending, 0);
        assert_eq!(h.orch.rdm.usage(PipeId(0)).unwrap().allocated, 3);
        assert!(h.hw.violations().is_empty());
    }

    #[test]
    fn test_update_failure_keeps_node() {
        let h = Harness::with(|c| c.cells_per_pipe = 3);
        let n = h
            .orch
            .node_create(h.sess, Rid(1), PortSet::from([1]), LagSet::new())
            .unwrap();
        let err = h
            .orch
            .node_update(h.sess, n, PortSet::from([1]), LagSet::from([1, 2]))
            .unwrap_err();
        assert_eq!(err.status(), McStatus::ResourceExhausted);
        assert_eq!(h.orch.node_get_attr(n).unwrap().ports, PortSet::from([1]));
        assert_eq!(h.orch.node_get_attr(n).unwrap().lags, LagSet::new());
    }

    #[test]
    fn test_destroy_associated_node_rejected() {
        let h = Harness::new();
        let g = h.orch.mgrp_create(h.sess, Mgid(1)).unwrap();
        let n = h
            .orch
            .node_create(h.sess, Rid(1), PortSet::from([1]), LagSet::new())
            .unwrap();
        h.orch.associate_node(h.sess, g, n, None).unwrap();
        assert_eq!(
            h.orch.node_destroy(h.sess, n).unwrap_err().status(),
            McStatus::InUse
        );
        h.orch.dissociate_node(h.sess, g, n).unwrap();
        h.orch.node_destroy(h.sess, n).unwrap();
        assert_eq!(
            h.orch.node_get_attr(n).unwrap_err().status(),
            McStatus::InvalidHandle
        );
    }

    #[test]
    fn test_node_iteration_skips_destroyed() {
        let h = Harness::new();
        let nodes: Vec<NodeHandle> = (0..3)
            .map(|i| {
                h.orch
                    .node_create(h.sess, Rid(i), PortSet::new(), LagSet::new())
                    .unwrap()
            })
            .collect();
        h.orch.node_destroy(h.sess, nodes[1]).unwrap();
        assert_eq!(h.orch.node_get_count(), 2);
        assert_eq!(h.orch.node_get_first().unwrap(), nodes[0]);
        assert_eq!(
            h.orch.node_get_next_i(Some(nodes[0]), 2).unwrap(),
            vec![nodes[2], NodeHandle::INVALID]
        );
    }
}
