//! Diagnostic operations: replication traces, the watch point and
//! counter snapshots.

use mc_hal::{McResult, MgrpHandle, RdmAddr};
use mc_types::{Mgid, PipeId};

use super::trace::walk;
use super::types::{McCounters, PacketInfo, ReplicationTrace};
use crate::device::McOrch;
use crate::rdm::{CellState, RdmUsage};
use crate::{debug_log, warn_log};

impl McOrch {
    /// Replicates `pkt` through `mgrp` in software and reports the copies
    /// the hardware would produce.
    ///
    /// A walk that crosses a discard threshold produces no copies and, if
    /// no earlier crossing of the same kind is pending, leaves a breadcrumb
    /// for [`McOrch::take_max_node_threshold_exceeded`].
    pub fn trace_replication(&self, mgrp: MgrpHandle, pkt: PacketInfo) -> McResult<ReplicationTrace> {
        let mut state = self.state.lock();
        let group = state.mgrp(mgrp)?;
        let (trace, crumb) = walk(&state, group, &pkt);

        state.stats.traces += 1;
        if let Some(crumb) = crumb {
            if state.limits.latch(crumb) {
                warn_log!(
                    "McOrch",
                    mgid = %crumb.mgid,
                    kind = %crumb.kind,
                    count = crumb.count,
                    limit = crumb.limit,
                    "replication walk crossed discard threshold"
                );
            }
        }
        if state.watch.mgid == Some(trace.mgid) {
            state.watch.captured = Some(trace.clone());
        }
        debug_log!(
            "McOrch",
            mgid = %trace.mgid,
            copies = trace.copies.len(),
            nodes = trace.nodes_visited,
            "replication traced"
        );
        Ok(trace)
    }

    /// Captures the next trace of group `mgid`, replacing any earlier watch.
    pub fn set_watch_point(&self, mgid: Mgid) {
        let mut state = self.state.lock();
        state.watch.mgid = Some(mgid);
        state.watch.captured = None;
    }

    pub fn clear_watch_point(&self) {
        let mut state = self.state.lock();
        state.watch.mgid = None;
        state.watch.captured = None;
    }

    /// Most recent trace captured by the watch point.
    pub fn watch_point_capture(&self) -> Option<ReplicationTrace> {
        self.state.lock().watch.captured.clone()
    }

    pub fn counters(&self) -> McCounters {
        let state = self.state.lock();
        McCounters {
            gc_mode: self.gc.mode(),
            mgrps: state.mgrps.len(),
            nodes: state.nodes.len(),
            ecmps: state.ecmps.len(),
            orch: state.stats,
            sessions: self.sessions.counters(),
            gc: self.gc.counters(),
            rdm: self.rdm.usage_all(),
        }
    }

    pub fn rdm_usage(&self, pipe: PipeId) -> McResult<RdmUsage> {
        self.rdm.usage(pipe)
    }

    pub fn rdm_cell_state(&self, pipe: PipeId, addr: RdmAddr) -> McResult<Option<CellState>> {
        self.rdm.cell_state(pipe, addr)
    }
}

#[cfg(test)]
mod tests {
    use crate::device::test_support::Harness;
    use crate::diag::PacketInfo;
    use crate::limits::ThresholdKind;
    use mc_types::{L1Xid, L2Xid, LagId, LagSet, Mgid, PortId, PortSet, Rid};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_trace_direct_and_lag_ports() {
        let h = Harness::new();
        h.orch
            .set_lag_membership(h.sess, LagId(2), PortSet::from([10, 11]))
            .unwrap();
        let g = h.orch.mgrp_create(h.sess, Mgid(1)).unwrap();
        let n = h
            .orch
            .node_create(h.sess, Rid(1), PortSet::from([3, 20]), LagSet::from([2]))
            .unwrap();
        h.orch.associate_node(h.sess, g, n, None).unwrap();

        let pkt = PacketInfo {
            l2_hash: 1,
            ..PacketInfo::default()
        };
        let trace = h.orch.trace_replication(g, pkt).unwrap();
        assert_eq!(trace.ports(), vec![PortId(3), PortId(20), PortId(11)]);
        assert_eq!(trace.copies[2].lag, Some(LagId(2)));
        assert_eq!(trace.nodes_visited, 1);
        assert_eq!(trace.dropped, None);
    }

    #[test]
    fn test_trace_pruning() {
        let h = Harness::new();
        let g = h.orch.mgrp_create(h.sess, Mgid(1)).unwrap();
        let a = h
            .orch
            .node_create(h.sess, Rid(1), PortSet::from([1, 2]), LagSet::new())
            .unwrap();
        let b = h
            .orch
            .node_create(h.sess, Rid(2), PortSet::from([5]), LagSet::new())
            .unwrap();
        h.orch.associate_node(h.sess, g, a, None).unwrap();
        h.orch.associate_node(h.sess, g, b, Some(L1Xid(7))).unwrap();
        h.orch
            .set_port_prune_table(h.sess, L2Xid(1), PortSet::from([2]))
            .unwrap();

        let pkt = PacketInfo {
            l1_xid: Some(L1Xid(7)),
            l2_xid: Some(L2Xid(1)),
            rid: Rid(1),
            ..PacketInfo::default()
        };
        let trace = h.orch.trace_replication(g, pkt).unwrap();
        assert_eq!(trace.ports(), vec![PortId(1)]);
        assert_eq!(trace.nodes_visited, 2);
    }

    #[test]
    fn test_trace_yields_and_threshold() {
        let h = Harness::new();
        let g = h.orch.mgrp_create(h.sess, Mgid(9)).unwrap();
        for i in 0..5 {
            let n = h
                .orch
                .node_create(h.sess, Rid(i), PortSet::from([i]), LagSet::new())
                .unwrap();
            h.orch.associate_node(h.sess, g, n, None).unwrap();
        }
        h.orch.set_max_nodes_before_yield(h.sess, 2).unwrap();
        let trace = h.orch.trace_replication(g, PacketInfo::default()).unwrap();
        assert_eq!(trace.copies.len(), 5);
        assert_eq!(trace.yields, 2);

        h.orch.set_max_node_threshold(h.sess, 4, u32::MAX).unwrap();
        let trace = h.orch.trace_replication(g, PacketInfo::default()).unwrap();
        assert!(trace.copies.is_empty());
        assert_eq!(trace.dropped, Some(ThresholdKind::NodeCount));

        let crumb = h
            .orch
            .take_max_node_threshold_exceeded(ThresholdKind::NodeCount)
            .unwrap();
        assert_eq!(crumb.mgid, Mgid(9));
        assert_eq!(crumb.count, 5);
        assert_eq!(crumb.limit, 4);
        assert!(h
            .orch
            .take_max_node_threshold_exceeded(ThresholdKind::NodeCount)
            .is_none());
    }

    #[test]
    fn test_port_lag_threshold() {
        let h = Harness::new();
        let g = h.orch.mgrp_create(h.sess, Mgid(3)).unwrap();
        let n = h
            .orch
            .node_create(h.sess, Rid(1), PortSet::from([1, 2, 3]), LagSet::new())
            .unwrap();
        h.orch.associate_node(h.sess, g, n, None).unwrap();
        h.orch.set_max_node_threshold(h.sess, u32::MAX, 2).unwrap();
        let trace = h.orch.trace_replication(g, PacketInfo::default()).unwrap();
        assert_eq!(trace.dropped, Some(ThresholdKind::PortLagCount));
        let crumb = h
            .orch
            .take_max_node_threshold_exceeded(ThresholdKind::PortLagCount)
            .unwrap();
        assert_eq!(crumb.count, 3);
    }

    #[test]
    fn test_watch_point_captures_matching_group() {
        let h = Harness::new();
        let g1 = h.orch.mgrp_create(h.sess, Mgid(1)).unwrap();
        let g2 = h.orch.mgrp_create(h.sess, Mgid(2)).unwrap();
        h.orch.set_watch_point(Mgid(2));
        h.orch.trace_replication(g1, PacketInfo::default()).unwrap();
        assert!(h.orch.watch_point_capture().is_none());
        h.orch.trace_replication(g2, PacketInfo::default()).unwrap();
        assert_eq!(h.orch.watch_point_capture().unwrap().mgid, Mgid(2));
        h.orch.clear_watch_point();
        assert!(h.orch.watch_point_capture().is_none());
    }

    #[test]
    fn test_counters_snapshot() {
        let h = Harness::new();
        h.orch.mgrp_create(h.sess, Mgid(1)).unwrap();
        let counters = h.orch.counters();
        assert_eq!(counters.mgrps, 1);
        assert_eq!(counters.orch.mgrps_created, 1);
        assert_eq!(counters.rdm.len(), 2);
        assert!(counters.to_json().contains("\"mgrps\":1"));
    }
}
