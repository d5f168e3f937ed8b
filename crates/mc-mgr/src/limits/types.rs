//! Traversal limits and their breadcrumbs.

use mc_types::Mgid;
use serde::Serialize;
use std::fmt;

/// Default number of L1 nodes a walk consumes before yielding.
pub const DEFAULT_MAX_NODES_BEFORE_YIELD: u32 = 16;

/// Hard discard threshold kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdKind {
    /// L1 nodes visited by one walk.
    NodeCount,
    /// Ports plus LAGs across the nodes visited by one walk.
    PortLagCount,
}

impl fmt::Display for ThresholdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThresholdKind::NodeCount => write!(f, "node_count"),
            ThresholdKind::PortLagCount => write!(f, "port_lag_count"),
        }
    }
}

/// What the first over-threshold walk looked like.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThresholdBreadcrumb {
    pub kind: ThresholdKind,
    pub mgid: Mgid,
    pub count: u32,
    pub limit: u32,
}

#[derive(Debug, Clone)]
pub(crate) struct AdmissionLimits {
    pub max_nodes_before_yield: u32,
    pub node_threshold: u32,
    pub port_lag_threshold: u32,
    node_exceeded: Option<ThresholdBreadcrumb>,
    port_lag_exceeded: Option<ThresholdBreadcrumb>,
}

impl Default for AdmissionLimits {
    fn default() -> Self {
        Self {
            max_nodes_before_yield: DEFAULT_MAX_NODES_BEFORE_YIELD,
            node_threshold: u32::MAX,
            port_lag_threshold: u32::MAX,
            node_exceeded: None,
            port_lag_exceeded: None,
        }
    }
}

impl AdmissionLimits {
    pub fn limit(&self, kind: ThresholdKind) -> u32 {
        match kind {
            ThresholdKind::NodeCount => self.node_threshold,
            ThresholdKind::PortLagCount => self.port_lag_threshold,
        }
    }

    fn slot(&mut self, kind: ThresholdKind) -> &mut Option<ThresholdBreadcrumb> {
        match kind {
            ThresholdKind::NodeCount => &mut self.node_exceeded,
            ThresholdKind::PortLagCount => &mut self.port_lag_exceeded,
        }
    }

    /// Keeps the first breadcrumb per kind until it is taken.
    pub fn latch(&mut self, crumb: ThresholdBreadcrumb) -> bool {
        let slot = self.slot(crumb.kind);
        if slot.is_some() {
            return false;
        }
        *slot = Some(crumb);
        true
    }

    pub fn take(&mut self, kind: ThresholdKind) -> Option<ThresholdBreadcrumb> {
        self.slot(kind).take()
    }
}
