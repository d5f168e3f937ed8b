//! Walk budget and discard threshold operations.

use mc_hal::{HwWrite, McError, McResult};

use super::types::{ThresholdBreadcrumb, ThresholdKind};
use crate::audit::AuditCategory;
use crate::device::McOrch;
use crate::session::SessionId;

impl McOrch {
    /// Number of L1 nodes a walk processes before yielding to other walks.
    pub fn set_max_nodes_before_yield(&self, sess: SessionId, count: u32) -> McResult<()> {
        let result = self.set_max_nodes_before_yield_locked(sess, count);
        self.audit(
            AuditCategory::ConfigurationChange,
            "set_max_nodes_before_yield",
            "device",
            self.dev_id().to_string(),
            sess,
            &result,
        );
        result
    }

    fn set_max_nodes_before_yield_locked(&self, sess: SessionId, count: u32) -> McResult<()> {
        if count == 0 {
            return Err(McError::invalid_argument("max nodes before yield must be > 0"));
        }
        let mut state = self.begin(sess)?;
        state.limits.max_nodes_before_yield = count;
        let mut op = self.new_op();
        op.write_all(state.geo.pipe_count, HwWrite::MaxNodesBeforeYield(count));
        self.stage(sess, op)
    }

    pub fn get_max_nodes_before_yield(&self) -> u32 {
        self.state.lock().limits.max_nodes_before_yield
    }

    /// Hard limits above which a walk drops the packet outright.
    pub fn set_max_node_threshold(&self, sess: SessionId, node_count: u32, port_lag_count: u32) -> McResult<()> {
        let result = self.set_max_node_threshold_locked(sess, node_count, port_lag_count);
        self.audit(
            AuditCategory::ConfigurationChange,
            "set_max_node_threshold",
            "device",
            self.dev_id().to_string(),
            sess,
            &result,
        );
        result
    }

    fn set_max_node_threshold_locked(&self, sess: SessionId, node_count: u32, port_lag_count: u32) -> McResult<()> {
        let mut state = self.begin(sess)?;
        state.limits.node_threshold = node_count;
        state.limits.port_lag_threshold = port_lag_count;
        let mut op = self.new_op();
        op.write_all(
            state.geo.pipe_count,
            HwWrite::MaxNodeThreshold {
                node_count,
                port_lag_count,
            },
        );
        self.stage(sess, op)
    }

    /// `(node_count, port_lag_count)` thresholds.
    pub fn get_max_node_threshold(&self) -> (u32, u32) {
        let state = self.state.lock();
        (
            state.limits.limit(ThresholdKind::NodeCount),
            state.limits.limit(ThresholdKind::PortLagCount),
        )
    }

    /// Takes the breadcrumb left by the first walk that crossed `kind`,
    /// re-arming it for the next one.
    pub fn take_max_node_threshold_exceeded(&self, kind: ThresholdKind) -> Option<ThresholdBreadcrumb> {
        self.state.lock().limits.take(kind)
    }
}
