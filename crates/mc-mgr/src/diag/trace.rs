//! Software model of one replication walk over the shadow.
//!
//! The walk follows a group's L1 chain in order. Each member costs one
//! node visit; an ECMP member resolves to one node by `l1_hash`. Every
//! replicated node emits its ports directly and one port per LAG chosen by
//! `l2_hash`, after L2 pruning and port-state resolution.

use mc_hal::NodeHandle;
use mc_types::{LagId, PortId};

use super::types::{PacketInfo, ReplicaCopy, ReplicationTrace};
use crate::device::state::{slot_key, TreeState};
use crate::ecmp::hash::{is_l1_pruned, select_member};
use crate::lag::hash::select_lag_member;
use crate::limits::{ThresholdBreadcrumb, ThresholdKind};
use crate::mgrp::{L1Member, MgrpEntry};
use crate::node::NodeEntry;

/// Walks `group` for `pkt`. Returns the trace and, when a discard threshold
/// dropped the packet, the breadcrumb describing it.
pub(crate) fn walk(
    state: &TreeState,
    group: &MgrpEntry,
    pkt: &PacketInfo,
) -> (ReplicationTrace, Option<ThresholdBreadcrumb>) {
    let limits = &state.limits;
    let budget = limits.max_nodes_before_yield.max(1);
    let mut trace = ReplicationTrace {
        mgid: group.mgid,
        copies: Vec::new(),
        nodes_visited: 0,
        yields: 0,
        dropped: None,
    };
    let mut port_lag: u32 = 0;

    for (i, member) in group.members.iter().enumerate() {
        trace.nodes_visited += 1;
        if trace.nodes_visited > limits.node_threshold {
            let count = trace.nodes_visited;
            return drop_packet(trace, ThresholdKind::NodeCount, count, limits.node_threshold);
        }

        if !is_l1_pruned(member.xid(), pkt.l1_xid) {
            let target = match member {
                L1Member::Node { node, .. } => Some(*node),
                L1Member::Ecmp { ecmp, .. } => state
                    .ecmps
                    .get(slot_key(*ecmp))
                    .and_then(|e| select_member(&e.members, pkt.l1_hash)),
            };
            if let Some((node, entry)) = target.and_then(|n| Some((n, state.nodes.get(slot_key(n))?))) {
                let width = u32::try_from(entry.ports.len() + entry.lags.len()).unwrap_or(u32::MAX);
                port_lag = port_lag.saturating_add(width);
                if port_lag > limits.port_lag_threshold {
                    return drop_packet(trace, ThresholdKind::PortLagCount, port_lag, limits.port_lag_threshold);
                }
                replicate(state, node, entry, pkt, &mut trace.copies);
            }
        }

        if i + 1 < group.members.len() && trace.nodes_visited % budget == 0 {
            trace.yields += 1;
        }
    }
    (trace, None)
}

fn drop_packet(
    mut trace: ReplicationTrace,
    kind: ThresholdKind,
    count: u32,
    limit: u32,
) -> (ReplicationTrace, Option<ThresholdBreadcrumb>) {
    trace.copies.clear();
    trace.dropped = Some(kind);
    let crumb = ThresholdBreadcrumb {
        kind,
        mgid: trace.mgid,
        count,
        limit,
    };
    (trace, Some(crumb))
}

fn replicate(state: &TreeState, node: NodeHandle, entry: &NodeEntry, pkt: &PacketInfo, out: &mut Vec<ReplicaCopy>) {
    let mut emit = |port: PortId, lag: Option<LagId>| {
        if state.prune.is_pruned(pkt.l2_xid, pkt.rid, entry.rid, port) {
            return;
        }
        if let Some(port) = state.ports.resolve(port) {
            out.push(ReplicaCopy {
                port,
                rid: entry.rid,
                node,
                lag,
            });
        }
    };

    for port in entry.ports.iter() {
        emit(port, None);
    }
    for lag in entry.lags.iter() {
        let Ok(lag_entry) = state.lags.entry(lag) else {
            continue;
        };
        let candidates = state.ports.lag_candidates(&lag_entry.ports);
        if let Some(port) = select_lag_member(&candidates, lag_entry.left, lag_entry.right, pkt.l2_hash) {
            emit(port, Some(lag));
        }
    }
}
