//! Diagnostic types: replication traces, watch point and counters.

use mc_hal::NodeHandle;
use mc_types::{L1Xid, L2Xid, LagId, Mgid, PortId, Rid};
use serde::Serialize;

use crate::limits::ThresholdKind;
use crate::rdm::{GcCounters, GcMode, RdmUsage};
use crate::session::SessionCounters;

/// Per-packet inputs to a replication walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PacketInfo {
    /// Hash used for ECMP member selection.
    pub l1_hash: u32,
    /// Hash used for LAG member selection.
    pub l2_hash: u32,
    pub l1_xid: Option<L1Xid>,
    pub l2_xid: Option<L2Xid>,
    /// Ingress replication id.
    pub rid: Rid,
}

/// One copy produced by a walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReplicaCopy {
    pub port: PortId,
    pub rid: Rid,
    #[serde(skip)]
    pub node: NodeHandle,
    /// LAG the port was selected from, if any.
    pub lag: Option<LagId>,
}

/// Outcome of a replication walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplicationTrace {
    pub mgid: Mgid,
    pub copies: Vec<ReplicaCopy>,
    pub nodes_visited: u32,
    pub yields: u32,
    /// Set when a discard threshold dropped the packet; no copies are
    /// produced in that case.
    pub dropped: Option<ThresholdKind>,
}

impl ReplicationTrace {
    pub fn ports(&self) -> Vec<PortId> {
        self.copies.iter().map(|c| c.port).collect()
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct WatchPoint {
    pub mgid: Option<Mgid>,
    pub captured: Option<ReplicationTrace>,
}

/// Object and operation counters kept by the orchestrator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct McOrchStats {
    pub mgrps_created: u64,
    pub mgrps_destroyed: u64,
    pub nodes_created: u64,
    pub nodes_destroyed: u64,
    pub nodes_updated: u64,
    pub ecmps_created: u64,
    pub ecmps_destroyed: u64,
    pub associations: u64,
    pub dissociations: u64,
    pub traces: u64,
}

/// Device-wide counter snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct McCounters {
    pub gc_mode: GcMode,
    pub mgrps: usize,
    pub nodes: usize,
    pub ecmps: usize,
    pub orch: McOrchStats,
    pub sessions: SessionCounters,
    pub gc: GcCounters,
    pub rdm: Vec<RdmUsage>,
}

impl McCounters {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
