//! ECMP group operations.
//!
//! The member vector is immutable in hardware: every membership change
//! builds a fresh slot vector, writes it tail first, swings the header and
//! retires the old vector. Walks in flight see either the old vector or the
//! new one, never a mix.

use std::collections::HashSet;

use mc_hal::{EcmpHandle, McError, McResult, MgrpHandle, NodeHandle, RdmAddr};
use mc_types::L1Xid;

use super::hash::{is_l1_pruned, select_member};
use super::types::{EcmpEntry, EcmpSelection, EcmpSummary};
use crate::audit::AuditCategory;
use crate::device::page::{arena_first, arena_next, list_first, list_next};
use crate::device::state::{slot_key, to_handle, TreeState};
use crate::device::McOrch;
use crate::node::NodeAssociation;
use crate::rdm::CellOwner;
use crate::session::{SessionId, StagedOp};
use crate::warn_log;

impl McOrch {
    pub fn ecmp_create(&self, sess: SessionId) -> McResult<EcmpHandle> {
        let result = self.ecmp_create_locked(sess);
        let object = match &result {
            Ok(handle) => handle.to_string(),
            Err(_) => "-".to_string(),
        };
        self.audit(AuditCategory::ResourceCreate, "ecmp_create", "ecmp", object, sess, &result);
        result
    }

    fn ecmp_create_locked(&self, sess: SessionId) -> McResult<EcmpHandle> {
        let mut state = self.begin(sess)?;
        let capacity = state.ecmps.capacity();
        let key = state
            .ecmps
            .insert(EcmpEntry {
                members: Vec::new(),
                assocs: Vec::new(),
                header: Vec::new(),
                slots: Vec::new(),
            })
            .map_err(|_| McError::resource_exhausted(format!("ECMP table ({} entries)", capacity)))?;
        let handle: EcmpHandle = to_handle(state.geo.dev, key);

        let header = match self.alloc_per_pipe(CellOwner::Ecmp(handle)) {
            Ok(cells) => cells,
            Err(e) => {
                state.ecmps.remove(key);
                return Err(e);
            }
        };
        let mut op = self.new_op();
        for pipe in state.geo.pipes() {
            if let Some(addr) = header.get(pipe.index()) {
                op.write(pipe, TreeState::ecmp_header_write(*addr, &[]));
            }
        }
        let pipes = usize::from(state.geo.pipe_count);
        if let Some(entry) = state.ecmps.get_mut(key) {
            entry.header = header;
            entry.slots = vec![Vec::new(); pipes];
        }
        state.stats.ecmps_created += 1;
        self.stage(sess, op)?;
        Ok(handle)
    }

    /// Destroys an ECMP group, detaching it from every group it hangs off
    /// and releasing its members.
    pub fn ecmp_destroy(&self, sess: SessionId, ecmp: EcmpHandle) -> McResult<()> {
        let result = self.ecmp_destroy_locked(sess, ecmp, false);
        self.audit(AuditCategory::ResourceDelete, "ecmp_destroy", "ecmp", ecmp.to_string(), sess, &result);
        result
    }

    /// Like [`McOrch::ecmp_destroy`] but refuses while any group still
    /// references the ECMP group.
    pub fn ecmp_destroy_checked(&self, sess: SessionId, ecmp: EcmpHandle) -> McResult<()> {
        let result = self.ecmp_destroy_locked(sess, ecmp, true);
        self.audit(AuditCategory::ResourceDelete, "ecmp_destroy_checked", "ecmp", ecmp.to_string(), sess, &result);
        result
    }

    fn ecmp_destroy_locked(&self, sess: SessionId, ecmp: EcmpHandle, checked: bool) -> McResult<()> {
        let mut state = self.begin(sess)?;
        let entry = state.ecmp(ecmp)?;
        if checked && !entry.assocs.is_empty() {
            return Err(McError::in_use(format!(
                "{} is attached to {} groups",
                ecmp,
                entry.assocs.len()
            )));
        }
        let groups: Vec<MgrpHandle> = entry.assocs.iter().map(|a| a.mgrp).collect();
        if !groups.is_empty() {
            warn_log!(
                "McOrch",
                ecmp = %ecmp,
                groups = groups.len(),
                "destroying ECMP group still attached to groups"
            );
        }

        let mut op = self.new_op();
        for mgrp in groups {
            self.unlink_ecmp(&mut state, &mut op, mgrp, ecmp)?;
            state.stats.dissociations += 1;
        }
        let Some(entry) = state.ecmps.remove(slot_key(ecmp)) else {
            return Err(McError::invalid_handle(ecmp));
        };
        for node in &entry.members {
            if let Ok(n) = state.node_mut(*node) {
                n.assoc = NodeAssociation::Unassociated;
            }
        }
        for pipe in state.geo.pipes() {
            let p = pipe.index();
            if let Some(header) = entry.header.get(p) {
                self.retire(&mut op, pipe, &[*header])?;
            }
            if let Some(slots) = entry.slots.get(p) {
                self.retire(&mut op, pipe, slots)?;
            }
        }
        state.stats.ecmps_destroyed += 1;
        self.stage(sess, op)
    }

    /// Adds an unassociated node as the last member of an ECMP group.
    pub fn ecmp_mbr_add(&self, sess: SessionId, ecmp: EcmpHandle, node: NodeHandle) -> McResult<()> {
        let result = self.ecmp_mbr_add_locked(sess, ecmp, node);
        self.audit(
            AuditCategory::ResourceModify,
            "ecmp_mbr_add",
            "ecmp",
            format!("{}<-{}", ecmp, node),
            sess,
            &result,
        );
        result
    }

    fn ecmp_mbr_add_locked(&self, sess: SessionId, ecmp: EcmpHandle, node: NodeHandle) -> McResult<()> {
        let mut state = self.begin(sess)?;
        let mut members = state.ecmp(ecmp)?.members.clone();
        let assoc = state.node(node)?.assoc;
        if assoc.is_associated() {
            return Err(McError::already_associated(format!("{} is already {:?}", node, assoc)));
        }
        members.push(node);
        self.ecmp_replace_members(&mut state, sess, ecmp, members)
    }

    pub fn ecmp_mbr_rem(&self, sess: SessionId, ecmp: EcmpHandle, node: NodeHandle) -> McResult<()> {
        let result = self.ecmp_mbr_rem_locked(sess, ecmp, node);
        self.audit(
            AuditCategory::ResourceModify,
            "ecmp_mbr_rem",
            "ecmp",
            format!("{}-/-{}", ecmp, node),
            sess,
            &result,
        );
        result
    }

    fn ecmp_mbr_rem_locked(&self, sess: SessionId, ecmp: EcmpHandle, node: NodeHandle) -> McResult<()> {
        let mut state = self.begin(sess)?;
        state.node(node)?;
        let mut members = state.ecmp(ecmp)?.members.clone();
        let Some(pos) = members.iter().position(|m| *m == node) else {
            return Err(McError::failed_precondition(format!(
                "{} is not a member of {}",
                node, ecmp
            )));
        };
        members.remove(pos);
        self.ecmp_replace_members(&mut state, sess, ecmp, members)
    }

    /// Replaces the whole member list of an ECMP group in one step.
    ///
    /// Nodes may be current members of this group or unassociated; order
    /// in `nodes` becomes the selection order.
    pub fn ecmp_mbr_mod(&self, sess: SessionId, ecmp: EcmpHandle, nodes: &[NodeHandle]) -> McResult<()> {
        let result = self.ecmp_mbr_mod_locked(sess, ecmp, nodes);
        self.audit(AuditCategory::ResourceModify, "ecmp_mbr_mod", "ecmp", ecmp.to_string(), sess, &result);
        result
    }

    fn ecmp_mbr_mod_locked(&self, sess: SessionId, ecmp: EcmpHandle, nodes: &[NodeHandle]) -> McResult<()> {
        let mut state = self.begin(sess)?;
        state.ecmp(ecmp)?;
        let mut seen = HashSet::with_capacity(nodes.len());
        for node in nodes {
            if !seen.insert(*node) {
                return Err(McError::invalid_argument(format!("{} listed twice", node)));
            }
            match state.node(*node)?.assoc {
                NodeAssociation::Unassociated => {}
                NodeAssociation::Ecmp(owner) if owner == ecmp => {}
                other => {
                    return Err(McError::already_associated(format!(
                        "{} is already {:?}",
                        node, other
                    )));
                }
            }
        }
        self.ecmp_replace_members(&mut state, sess, ecmp, nodes.to_vec())
    }

    /// Allocates a new slot vector for `members`, rewires node associations
    /// and stages the whole change.
    ///
    /// Nothing is touched until the allocation has succeeded.
    fn ecmp_replace_members(
        &self,
        state: &mut TreeState,
        sess: SessionId,
        ecmp: EcmpHandle,
        members: Vec<NodeHandle>,
    ) -> McResult<()> {
        let pipes = usize::from(state.geo.pipe_count);
        let new_slots = if members.is_empty() {
            vec![Vec::new(); pipes]
        } else {
            self.alloc_chain(&vec![members.len(); pipes], CellOwner::Ecmp(ecmp))?
        };

        let old_members = state.ecmp(ecmp)?.members.clone();
        let mut op = self.new_op();

        for node in old_members.iter().filter(|n| !members.contains(*n)) {
            if let Ok(entry) = state.node_mut(*node) {
                entry.assoc = NodeAssociation::Unassociated;
            }
        }
        // A node joining the vector is reached through a slot, never by
        // chain order, so its L1 cell must stop pointing anywhere first.
        for node in members.iter().filter(|n| !old_members.contains(*n)) {
            state.node_mut(*node)?.assoc = NodeAssociation::Ecmp(ecmp);
            for pipe in state.geo.pipes() {
                if let Some(write) = state.node_l1_write(*node, pipe) {
                    op.write(pipe, write);
                }
            }
        }

        let entry = state.ecmp_mut(ecmp)?;
        let old_slots: Vec<Vec<RdmAddr>> = std::mem::replace(&mut entry.slots, new_slots);
        entry.members = members;

        self.ecmp_vector_writes(state, &mut op, ecmp)?;
        for pipe in state.geo.pipes() {
            if let Some(cells) = old_slots.get(pipe.index()) {
                self.retire(&mut op, pipe, cells)?;
            }
        }
        self.stage(sess, op)
    }

    /// Slot vector (tail first) then header, every pipe.
    fn ecmp_vector_writes(&self, state: &TreeState, op: &mut StagedOp, ecmp: EcmpHandle) -> McResult<()> {
        let entry = state.ecmp(ecmp)?;
        for pipe in state.geo.pipes() {
            let p = pipe.index();
            let slots = entry.slots.get(p).map(Vec::as_slice).unwrap_or(&[]);
            for write in state.ecmp_slot_writes(&entry.members, slots, pipe) {
                op.write(pipe, write);
            }
            if let Some(header) = entry.header.get(p) {
                op.write(pipe, TreeState::ecmp_header_write(*header, slots));
            }
        }
        Ok(())
    }

    pub fn ecmp_get_members(&self, ecmp: EcmpHandle) -> McResult<Vec<NodeHandle>> {
        Ok(self.state.lock().ecmp(ecmp)?.members.clone())
    }

    pub fn ecmp_get_summary(&self, ecmp: EcmpHandle) -> McResult<EcmpSummary> {
        Ok(self.state.lock().ecmp(ecmp)?.summary())
    }

    pub fn ecmp_get_mbr_first(&self, ecmp: EcmpHandle) -> McResult<NodeHandle> {
        let state = self.state.lock();
        list_first(&state.ecmp(ecmp)?.members, "ECMP member")
    }

    pub fn ecmp_get_mbr_count(&self, ecmp: EcmpHandle) -> McResult<usize> {
        Ok(self.state.lock().ecmp(ecmp)?.members.len())
    }

    pub fn ecmp_get_mbr_next_i(
        &self,
        ecmp: EcmpHandle,
        cursor: Option<NodeHandle>,
        count: usize,
    ) -> McResult<Vec<NodeHandle>> {
        let state = self.state.lock();
        list_next(
            &state.ecmp(ecmp)?.members,
            cursor,
            count,
            NodeHandle::INVALID,
            "ECMP member",
        )
    }

    fn ecmp_assoc_groups(state: &TreeState, ecmp: EcmpHandle) -> McResult<Vec<MgrpHandle>> {
        Ok(state.ecmp(ecmp)?.assocs.iter().map(|a| a.mgrp).collect())
    }

    pub fn ecmp_get_assoc_first(&self, ecmp: EcmpHandle) -> McResult<MgrpHandle> {
        let state = self.state.lock();
        list_first(&Self::ecmp_assoc_groups(&state, ecmp)?, "ECMP association")
    }

    pub fn ecmp_get_assoc_count(&self, ecmp: EcmpHandle) -> McResult<usize> {
        Ok(self.state.lock().ecmp(ecmp)?.assocs.len())
    }

    pub fn ecmp_get_assoc_next_i(
        &self,
        ecmp: EcmpHandle,
        cursor: Option<MgrpHandle>,
        count: usize,
    ) -> McResult<Vec<MgrpHandle>> {
        let state = self.state.lock();
        list_next(
            &Self::ecmp_assoc_groups(&state, ecmp)?,
            cursor,
            count,
            MgrpHandle::INVALID,
            "ECMP association",
        )
    }

    pub fn ecmp_get_first(&self) -> McResult<EcmpHandle> {
        let state = self.state.lock();
        arena_first(&state.ecmps, state.geo.dev, "ECMP")
    }

    pub fn ecmp_get_count(&self) -> usize {
        self.state.lock().ecmps.len()
    }

    pub fn ecmp_get_next_i(&self, cursor: Option<EcmpHandle>, count: usize) -> McResult<Vec<EcmpHandle>> {
        let state = self.state.lock();
        arena_next(&state.ecmps, state.geo.dev, cursor, count, "ECMP")
    }

    /// Member the hardware would pick for `hash`, and whether the copy
    /// would be L1-pruned for a packet carrying `l1_xid`.
    ///
    /// With a group given, pruning uses the exclusion id of that group's
    /// association and the ECMP group must be attached to it. Without one,
    /// the copy is never reported as pruned.
    pub fn ecmp_get_mbr_from_hash(
        &self,
        mgrp: Option<MgrpHandle>,
        ecmp: EcmpHandle,
        hash: u32,
        l1_xid: Option<L1Xid>,
    ) -> McResult<EcmpSelection> {
        let state = self.state.lock();
        let entry = state.ecmp(ecmp)?;
        let assoc_xid = match mgrp {
            Some(mgrp) => {
                state.mgrp(mgrp)?;
                entry
                    .assoc(mgrp)
                    .ok_or_else(|| {
                        McError::failed_precondition(format!("{} is not attached to {}", ecmp, mgrp))
                    })?
                    .xid
            }
            None => None,
        };
        let node = select_member(&entry.members, hash);
        Ok(EcmpSelection {
            node,
            is_pruned: node.is_some() && is_l1_pruned(assoc_xid, l1_xid),
        })
    }
}
