//! L2 exclusion operations.

use mc_hal::{HwWrite, McResult};
use mc_types::{L2Xid, PortSet, Rid};

use crate::audit::AuditCategory;
use crate::device::McOrch;
use crate::session::SessionId;

impl McOrch {
    /// Sets the ports excluded for packets carrying `xid`.
    pub fn set_port_prune_table(&self, sess: SessionId, xid: L2Xid, ports: PortSet) -> McResult<()> {
        let result = self.set_port_prune_table_locked(sess, xid, ports);
        self.audit(AuditCategory::HardwareTable, "set_port_prune_table", "l2_xid", xid.to_string(), sess, &result);
        result
    }

    fn set_port_prune_table_locked(&self, sess: SessionId, xid: L2Xid, ports: PortSet) -> McResult<()> {
        let mut state = self.begin(sess)?;
        state.geo.check_ports(&ports)?;
        state.prune.set(xid, ports.clone())?;
        let mut op = self.new_op();
        op.write_all(state.geo.pipe_count, HwWrite::PruneEntry { xid, ports });
        self.stage(sess, op)
    }

    pub fn get_port_prune_table(&self, xid: L2Xid) -> McResult<PortSet> {
        Ok(self.state.lock().prune.get(xid)?.clone())
    }

    pub fn get_port_prune_table_size(&self) -> usize {
        self.state.lock().prune.size()
    }

    /// RID that triggers L2 pruning on every node regardless of its own RID.
    pub fn set_global_exclusion_rid(&self, sess: SessionId, rid: Rid) -> McResult<()> {
        let result = self.set_global_exclusion_rid_locked(sess, rid);
        self.audit(AuditCategory::HardwareTable, "set_global_exclusion_rid", "rid", rid.to_string(), sess, &result);
        result
    }

    fn set_global_exclusion_rid_locked(&self, sess: SessionId, rid: Rid) -> McResult<()> {
        let mut state = self.begin(sess)?;
        state.prune.set_global_rid(rid);
        let mut op = self.new_op();
        op.write_all(state.geo.pipe_count, HwWrite::GlobalRid(rid));
        self.stage(sess, op)
    }

    pub fn get_global_exclusion_rid(&self) -> Rid {
        self.state.lock().prune.global_rid()
    }
}

#[cfg(test)]
mod tests {
    use crate::device::test_support::Harness;
    use mc_hal::McStatus;
    use mc_types::{L2Xid, PipeId, PortSet, Rid};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_prune_table_round_trip() {
        let h = Harness::new();
        assert_eq!(h.orch.get_port_prune_table_size(), 16);
        h.orch
            .set_port_prune_table(h.sess, L2Xid(4), PortSet::from([1, 30]))
            .unwrap();
        assert_eq!(
            h.orch.get_port_prune_table(L2Xid(4)).unwrap(),
            PortSet::from([1, 30])
        );
        assert_eq!(
            h.hw.prune_entry(PipeId(1), L2Xid(4)),
            Some(PortSet::from([1, 30]))
        );
        assert_eq!(
            h.orch
                .set_port_prune_table(h.sess, L2Xid(16), PortSet::new())
                .unwrap_err()
                .status(),
            McStatus::InvalidArgument
        );
    }

    #[test]
    fn test_global_rid() {
        let h = Harness::new();
        h.orch.set_global_exclusion_rid(h.sess, Rid(77)).unwrap();
        assert_eq!(h.orch.get_global_exclusion_rid(), Rid(77));
        assert_eq!(h.hw.global_rid(PipeId(0)), Some(Rid(77)));
    }
}
