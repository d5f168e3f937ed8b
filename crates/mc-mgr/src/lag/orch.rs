//! LAG table operations.

use mc_hal::{HwWrite, McError, McResult, NodeHandle};
use mc_types::{L1Xid, L2Xid, LagId, PipeId, PortSet, Rid};

use super::hash::select_lag_member;
use super::types::LagSelection;
use crate::audit::AuditCategory;
use crate::device::McOrch;
use crate::ecmp::hash::is_l1_pruned;
use crate::node::NodeAssociation;
use crate::session::SessionId;

impl McOrch {
    /// Sets the local member ports of `lag` on every pipe.
    pub fn set_lag_membership(&self, sess: SessionId, lag: LagId, ports: PortSet) -> McResult<()> {
        let result = self.set_lag_membership_locked(sess, lag, ports);
        self.audit(AuditCategory::HardwareTable, "set_lag_membership", "lag", lag.to_string(), sess, &result);
        result
    }

    fn set_lag_membership_locked(&self, sess: SessionId, lag: LagId, ports: PortSet) -> McResult<()> {
        let mut state = self.begin(sess)?;
        state.geo.check_ports(&ports)?;
        state.lags.set_membership(lag, ports.clone())?;
        let mut op = self.new_op();
        op.write_all(state.geo.pipe_count, HwWrite::LagMembership { lag, ports });
        self.stage(sess, op)
    }

    /// Member ports of `lag`, from the shadow or read back from pipe 0.
    pub fn get_lag_membership(&self, lag: LagId, from_hw: bool) -> McResult<PortSet> {
        let state = self.state.lock();
        let entry = state.lags.entry(lag)?;
        if from_hw {
            return self.hw.read_lag_membership(PipeId(0), lag);
        }
        Ok(entry.ports.clone())
    }

    pub fn get_lag_table_size(&self) -> usize {
        self.state.lock().lags.size()
    }

    /// Sets how many members of a spanning LAG live on devices to the left
    /// and right of this one.
    pub fn set_remote_lag_member_count(&self, sess: SessionId, lag: LagId, left: u16, right: u16) -> McResult<()> {
        let result = self.set_remote_lag_member_count_locked(sess, lag, left, right);
        self.audit(
            AuditCategory::HardwareTable,
            "set_remote_lag_member_count",
            "lag",
            lag.to_string(),
            sess,
            &result,
        );
        result
    }

    fn set_remote_lag_member_count_locked(&self, sess: SessionId, lag: LagId, left: u16, right: u16) -> McResult<()> {
        let mut state = self.begin(sess)?;
        state.lags.set_remote(lag, left, right)?;
        let mut op = self.new_op();
        op.write_all(state.geo.pipe_count, HwWrite::RemoteLagCount { lag, left, right });
        self.stage(sess, op)
    }

    pub fn get_remote_lag_member_count(&self, lag: LagId) -> McResult<(u16, u16)> {
        let state = self.state.lock();
        let entry = state.lags.entry(lag)?;
        Ok((entry.left, entry.right))
    }

    /// Port the hardware would pick from `lag` when replicating for `node`,
    /// and whether that copy would be pruned.
    ///
    /// L1 pruning uses the exclusion id the node was associated with; a
    /// node reached through an ECMP group has no group context here and is
    /// only checked for L2 pruning.
    pub fn get_lag_member_from_hash(
        &self,
        node: NodeHandle,
        lag: LagId,
        hash: u32,
        l1_xid: Option<L1Xid>,
        l2_xid: Option<L2Xid>,
        rid: Rid,
    ) -> McResult<LagSelection> {
        let state = self.state.lock();
        let entry = state.node(node)?;
        let lag_entry = state.lags.entry(lag)?;
        if !entry.lags.contains(lag) {
            return Err(McError::invalid_argument(format!(
                "{} does not replicate to {}",
                node, lag
            )));
        }

        let candidates = state.ports.lag_candidates(&lag_entry.ports);
        let Some(port) = select_lag_member(&candidates, lag_entry.left, lag_entry.right, hash) else {
            return Ok(LagSelection::default());
        };
        let l1_pruned = match entry.assoc {
            NodeAssociation::Mgrp { xid, .. } => is_l1_pruned(xid, l1_xid),
            _ => false,
        };
        Ok(LagSelection {
            port: Some(port),
            is_pruned: l1_pruned || state.prune.is_pruned(l2_xid, rid, entry.rid, port),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::device::test_support::Harness;
    use mc_hal::McStatus;
    use mc_types::{L1Xid, L2Xid, LagId, LagSet, Mgid, PipeId, PortId, PortSet, Rid};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_membership_programs_every_pipe() {
        let h = Harness::new();
        assert_eq!(h.orch.get_lag_table_size(), 16);
        h.orch
            .set_lag_membership(h.sess, LagId(3), PortSet::from([2, 20]))
            .unwrap();
        assert_eq!(
            h.orch.get_lag_membership(LagId(3), false).unwrap(),
            PortSet::from([2, 20])
        );
        assert_eq!(
            h.orch.get_lag_membership(LagId(3), true).unwrap(),
            PortSet::from([2, 20])
        );
        assert_eq!(
            h.orch
                .set_lag_membership(h.sess, LagId(16), PortSet::new())
                .unwrap_err()
                .status(),
            McStatus::InvalidArgument
        );
    }

    #[test]
    fn test_remote_counts() {
        let h = Harness::new();
        h.orch
            .set_remote_lag_member_count(h.sess, LagId(1), 2, 3)
            .unwrap();
        assert_eq!(h.orch.get_remote_lag_member_count(LagId(1)).unwrap(), (2, 3));
        assert_eq!(h.hw.remote_lag_count(PipeId(1), LagId(1)), Some((2, 3)));
    }

    #[test]
    fn test_hash_selection_with_remote_members() {
        let h = Harness::new();
        h.orch
            .set_lag_membership(h.sess, LagId(1), PortSet::from([4, 5]))
            .unwrap();
        h.orch
            .set_remote_lag_member_count(h.sess, LagId(1), 1, 1)
            .unwrap();
        let n = h
            .orch
            .node_create(h.sess, Rid(9), PortSet::new(), LagSet::from([1]))
            .unwrap();

        // Indexes: 0 remote-left, 1 port 4, 2 port 5, 3 remote-right.
        let pick = |hash| {
            h.orch
                .get_lag_member_from_hash(n, LagId(1), hash, None, None, Rid(0))
                .unwrap()
                .port
        };
        assert_eq!(pick(0), None);
        assert_eq!(pick(1), Some(PortId(4)));
        assert_eq!(pick(2), Some(PortId(5)));
        assert_eq!(pick(3), None);
    }

    #[test]
    fn test_hash_selection_pruning() {
        let h = Harness::new();
        h.orch
            .set_lag_membership(h.sess, LagId(1), PortSet::from([4]))
            .unwrap();
        h.orch
            .set_port_prune_table(h.sess, L2Xid(2), PortSet::from([4]))
            .unwrap();
        let g = h.orch.mgrp_create(h.sess, Mgid(1)).unwrap();
        let n = h
            .orch
            .node_create(h.sess, Rid(9), PortSet::new(), LagSet::from([1]))
            .unwrap();
        h.orch.associate_node(h.sess, g, n, Some(L1Xid(5))).unwrap();

        let sel = h
            .orch
            .get_lag_member_from_hash(n, LagId(1), 0, Some(L1Xid(5)), None, Rid(0))
            .unwrap();
        assert_eq!(sel.port, Some(PortId(4)));
        assert!(sel.is_pruned);

        let sel = h
            .orch
            .get_lag_member_from_hash(n, LagId(1), 0, None, Some(L2Xid(2)), Rid(9))
            .unwrap();
        assert!(sel.is_pruned);

        let sel = h
            .orch
            .get_lag_member_from_hash(n, LagId(1), 0, None, Some(L2Xid(2)), Rid(8))
            .unwrap();
        assert!(!sel.is_pruned);
    }

    #[test]
    fn test_hash_selection_requires_node_lag() {
        let h = Harness::new();
        let n = h
            .orch
            .node_create(h.sess, Rid(1), PortSet::from([1]), LagSet::new())
            .unwrap();
        assert_eq!(
            h.orch
                .get_lag_member_from_hash(n, LagId(2), 0, None, None, Rid(0))
                .unwrap_err()
                .status(),
            McStatus::InvalidArgument
        );
    }
}
