//! Multicast group operations.

use mc_hal::{EcmpHandle, HwWrite, McError, McResult, MgrpHandle, NodeHandle, RdmPayload};
use mc_types::{L1Xid, Mgid};

use super::types::{L1Member, MgrpEntry};
use crate::audit::AuditCategory;
use crate::debug_log;
use crate::device::page::{arena_first, arena_next, list_first, list_next};
use crate::device::state::{slot_key, to_handle, TreeState};
use crate::device::McOrch;
use crate::ecmp::EcmpAssociation;
use crate::node::NodeAssociation;
use crate::rdm::CellOwner;
use crate::session::{SessionId, StagedOp};

impl McOrch {
    /// Creates a group for the external id `mgid`.
    pub fn mgrp_create(&self, sess: SessionId, mgid: Mgid) -> McResult<MgrpHandle> {
        let result = self.mgrp_create_locked(sess, mgid);
        let object = match &result {
            Ok(handle) => format!("{}/{}", mgid, handle),
            Err(_) => mgid.to_string(),
        };
        self.audit(AuditCategory::ResourceCreate, "mgrp_create", "mgrp", object, sess, &result);
        result
    }

    fn mgrp_create_locked(&self, sess: SessionId, mgid: Mgid) -> McResult<MgrpHandle> {
        let mut state = self.begin(sess)?;
        if let Some(existing) = state.mgids.get(&mgid) {
            return Err(McError::already_exists(format!("{} ({})", mgid, existing)));
        }
        let capacity = state.mgrps.capacity();
        let key = state
            .mgrps
            .insert(MgrpEntry {
                mgid,
                root: Vec::new(),
                members: Vec::new(),
            })
            .map_err(|_| {
                McError::resource_exhausted(format!("multicast group table ({} entries)", capacity))
            })?;
        let handle: MgrpHandle = to_handle(state.geo.dev, key);

        let root = match self.alloc_per_pipe(CellOwner::Mgrp(handle)) {
            Ok(cells) => cells,
            Err(e) => {
                state.mgrps.remove(key);
                return Err(e);
            }
        };

        let mut op = self.new_op();
        for pipe in state.geo.pipes() {
            if let Some(addr) = root.get(pipe.index()) {
                op.write(
                    pipe,
                    HwWrite::Rdm {
                        addr: *addr,
                        payload: RdmPayload::MgrpRoot { mgid, first: None },
                    },
                );
            }
        }
        if let Some(entry) = state.mgrps.get_mut(key) {
            entry.root = root;
        }
        state.mgids.insert(mgid, handle);
        state.stats.mgrps_created += 1;
        self.stage(sess, op)?;
        Ok(handle)
    }

    /// Destroys a group. Every L1 member must have been dissociated first.
    pub fn mgrp_destroy(&self, sess: SessionId, mgrp: MgrpHandle) -> McResult<()> {
        let result = self.mgrp_destroy_locked(sess, mgrp);
        self.audit(AuditCategory::ResourceDelete, "mgrp_destroy", "mgrp", mgrp.to_string(), sess, &result);
        result
    }

    fn mgrp_destroy_locked(&self, sess: SessionId, mgrp: MgrpHandle) -> McResult<()> {
        let mut state = self.begin(sess)?;
        let entry = state.mgrp(mgrp)?;
        if !entry.members.is_empty() {
            return Err(McError::in_use(format!(
                "{} ({}) still has {} L1 members",
                mgrp,
                entry.mgid,
                entry.members.len()
            )));
        }
        let Some(entry) = state.mgrps.remove(slot_key(mgrp)) else {
            return Err(McError::invalid_handle(mgrp));
        };
        state.mgids.remove(&entry.mgid);

        let mut op = self.new_op();
        for pipe in state.geo.pipes() {
            if let Some(addr) = entry.root.get(pipe.index()) {
                self.retire(&mut op, pipe, &[*addr])?;
            }
        }
        state.stats.mgrps_destroyed += 1;
        self.stage(sess, op)
    }

    pub fn mgrp_get_attr(&self, mgrp: MgrpHandle) -> McResult<Mgid> {
        Ok(self.state.lock().mgrp(mgrp)?.mgid)
    }

    pub fn mgrp_get_by_id(&self, mgid: Mgid) -> McResult<MgrpHandle> {
        self.state
            .lock()
            .mgids
            .get(&mgid)
            .copied()
            .ok_or_else(|| McError::not_found(mgid.to_string()))
    }

    pub fn mgrp_get_first(&self) -> McResult<MgrpHandle> {
        let state = self.state.lock();
        arena_first(&state.mgrps, state.geo.dev, "mgrp")
    }

    pub fn mgrp_get_count(&self) -> usize {
        self.state.lock().mgrps.len()
    }

    pub fn mgrp_get_next_i(&self, cursor: Option<MgrpHandle>, count: usize) -> McResult<Vec<MgrpHandle>> {
        let state = self.state.lock();
        arena_next(&state.mgrps, state.geo.dev, cursor, count, "mgrp")
    }

    /// Appends `node` to the group's L1 chain.
    ///
    /// The node's own cell is written before its predecessor is relinked,
    /// so a walk never follows a pointer to a half-built member.
    pub fn associate_node(
        &self,
        sess: SessionId,
        mgrp: MgrpHandle,
        node: NodeHandle,
        xid: Option<L1Xid>,
    ) -> McResult<()> {
        let result = self.associate_node_locked(sess, mgrp, node, xid);
        self.audit(
            AuditCategory::ResourceModify,
            "associate_node",
            "mgrp",
            format!("{}<-{}", mgrp, node),
            sess,
            &result,
        );
        result
    }

    fn associate_node_locked(
        &self,
        sess: SessionId,
        mgrp: MgrpHandle,
        node: NodeHandle,
        xid: Option<L1Xid>,
    ) -> McResult<()> {
        let mut state = self.begin(sess)?;
        state.mgrp(mgrp)?;
        let assoc = state.node(node)?.assoc;
        if assoc.is_associated() {
            return Err(McError::already_associated(format!("{} is already {:?}", node, assoc)));
        }

        state.mgrp_mut(mgrp)?.members.push(L1Member::Node { node, xid });
        state.node_mut(node)?.assoc = NodeAssociation::Mgrp { mgrp, xid };
        state.stats.associations += 1;

        let op = self.link_writes(&state, mgrp)?;
        self.stage(sess, op)
    }

    /// Removes `node` from the group's L1 chain by relinking its predecessor.
    pub fn dissociate_node(&self, sess: SessionId, mgrp: MgrpHandle, node: NodeHandle) -> McResult<()> {
        let result = self.dissociate_node_locked(sess, mgrp, node);
        self.audit(
            AuditCategory::ResourceModify,
            "dissociate_node",
            "mgrp",
            format!("{}-/-{}", mgrp, node),
            sess,
            &result,
        );
        result
    }

    fn dissociate_node_locked(&self, sess: SessionId, mgrp: MgrpHandle, node: NodeHandle) -> McResult<()> {
        let mut state = self.begin(sess)?;
        state.node(node)?;
        let pos = state.mgrp(mgrp)?.node_position(node).ok_or_else(|| {
            McError::failed_precondition(format!("{} is not an L1 member of {}", node, mgrp))
        })?;

        state.mgrp_mut(mgrp)?.members.remove(pos);
        state.node_mut(node)?.assoc = NodeAssociation::Unassociated;
        state.stats.dissociations += 1;

        let mut op = self.new_op();
        let group = state.mgrp(mgrp)?;
        for (pipe, write) in state.predecessor_writes(group, pos) {
            op.write(pipe, write);
        }
        self.stage(sess, op)
    }

    /// Attaches an ECMP group to the group's L1 chain through a new pointer
    /// cell. The same ECMP group may hang off many groups, once per group.
    pub fn associate_ecmp(
        &self,
        sess: SessionId,
        mgrp: MgrpHandle,
        ecmp: EcmpHandle,
        xid: Option<L1Xid>,
    ) -> McResult<()> {
        let result = self.associate_ecmp_locked(sess, mgrp, ecmp, xid);
        self.audit(
            AuditCategory::ResourceModify,
            "associate_ecmp",
            "mgrp",
            format!("{}<-{}", mgrp, ecmp),
            sess,
            &result,
        );
        result
    }

    fn associate_ecmp_locked(
        &self,
        sess: SessionId,
        mgrp: MgrpHandle,
        ecmp: EcmpHandle,
        xid: Option<L1Xid>,
    ) -> McResult<()> {
        let mut state = self.begin(sess)?;
        state.mgrp(mgrp)?;
        if state.ecmp(ecmp)?.assoc(mgrp).is_some() {
            return Err(McError::already_associated(format!(
                "{} is already attached to {}",
                ecmp, mgrp
            )));
        }

        let ptr = self.alloc_per_pipe(CellOwner::Association { mgrp, ecmp })?;
        state
            .mgrp_mut(mgrp)?
            .members
            .push(L1Member::Ecmp { ecmp, xid, ptr });
        state
            .ecmp_mut(ecmp)?
            .assocs
            .push(EcmpAssociation { mgrp, xid });
        state.stats.associations += 1;

        let op = self.link_writes(&state, mgrp)?;
        self.stage(sess, op)
    }

    pub fn dissociate_ecmp(&self, sess: SessionId, mgrp: MgrpHandle, ecmp: EcmpHandle) -> McResult<()> {
        let result = self.dissociate_ecmp_locked(sess, mgrp, ecmp);
        self.audit(
            AuditCategory::ResourceModify,
            "dissociate_ecmp",
            "mgrp",
            format!("{}-/-{}", mgrp, ecmp),
            sess,
            &result,
        );
        result
    }

    fn dissociate_ecmp_locked(&self, sess: SessionId, mgrp: MgrpHandle, ecmp: EcmpHandle) -> McResult<()> {
        let mut state = self.begin(sess)?;
        state.ecmp(ecmp)?;
        if state.mgrp(mgrp)?.ecmp_position(ecmp).is_none() {
            return Err(McError::failed_precondition(format!(
                "{} is not attached to {}",
                ecmp, mgrp
            )));
        }
        let mut op = self.new_op();
        self.unlink_ecmp(&mut state, &mut op, mgrp, ecmp)?;
        state.stats.dissociations += 1;
        self.stage(sess, op)
    }

    /// Unhooks `ecmp` from `mgrp`: relinks the predecessor past the pointer
    /// cell, then retires the pointer cells.
    pub(crate) fn unlink_ecmp(
        &self,
        state: &mut TreeState,
        op: &mut StagedOp,
        mgrp: MgrpHandle,
        ecmp: EcmpHandle,
    ) -> McResult<()> {
        let group = state.mgrp_mut(mgrp)?;
        let Some(pos) = group.ecmp_position(ecmp) else {
            return Ok(());
        };
        let removed = group.members.remove(pos);
        if let Ok(entry) = state.ecmp_mut(ecmp) {
            entry.assocs.retain(|a| a.mgrp != mgrp);
        }

        let group = state.mgrp(mgrp)?;
        for (pipe, write) in state.predecessor_writes(group, pos) {
            op.write(pipe, write);
        }
        if let L1Member::Ecmp { ptr, .. } = removed {
            for pipe in state.geo.pipes() {
                if let Some(addr) = ptr.get(pipe.index()) {
                    self.retire(op, pipe, &[*addr])?;
                }
            }
        }
        debug_log!("McOrch", mgrp = %mgrp, ecmp = %ecmp, "ECMP group unlinked");
        Ok(())
    }

    /// Writes for the last member of `mgrp`, then its predecessor.
    fn link_writes(&self, state: &TreeState, mgrp: MgrpHandle) -> McResult<StagedOp> {
        let group = state.mgrp(mgrp)?;
        let pos = group
            .members
            .len()
            .checked_sub(1)
            .ok_or_else(|| McError::illegal_state(format!("{} has no members to link", mgrp)))?;
        let mut op = self.new_op();
        for pipe in state.geo.pipes() {
            if let Some(write) = state.chain_write(group, Some(pos), pipe) {
                op.write(pipe, write);
            }
        }
        for (pipe, write) in state.predecessor_writes(group, pos) {
            op.write(pipe, write);
        }
        Ok(op)
    }

    pub fn mgrp_get_node_mbr_first(&self, mgrp: MgrpHandle) -> McResult<NodeHandle> {
        let state = self.state.lock();
        list_first(&state.mgrp(mgrp)?.node_members(), "node")
    }

    pub fn mgrp_get_node_mbr_count(&self, mgrp: MgrpHandle) -> McResult<usize> {
        Ok(self.state.lock().mgrp(mgrp)?.node_members().len())
    }

    pub fn mgrp_get_node_mbr_next_i(
        &self,
        mgrp: MgrpHandle,
        cursor: Option<NodeHandle>,
        count: usize,
    ) -> McResult<Vec<NodeHandle>> {
        let state = self.state.lock();
        list_next(
            &state.mgrp(mgrp)?.node_members(),
            cursor,
            count,
            NodeHandle::INVALID,
            "node",
        )
    }

    /// L1 exclusion id a node member was associated with.
    pub fn mgrp_get_node_mbr_xid(&self, mgrp: MgrpHandle, node: NodeHandle) -> McResult<Option<L1Xid>> {
        let state = self.state.lock();
        let group = state.mgrp(mgrp)?;
        group
            .node_position(node)
            .and_then(|pos| group.members.get(pos))
            .map(L1Member::xid)
            .ok_or_else(|| McError::not_found(format!("{} in {}", node, mgrp)))
    }

    pub fn mgrp_get_ecmp_mbr_first(&self, mgrp: MgrpHandle) -> McResult<EcmpHandle> {
        let state = self.state.lock();
        list_first(&state.mgrp(mgrp)?.ecmp_members(), "ecmp")
    }

    pub fn mgrp_get_ecmp_mbr_count(&self, mgrp: MgrpHandle) -> McResult<usize> {
        Ok(self.state.lock().mgrp(mgrp)?.ecmp_members().len())
    }

    pub fn mgrp_get_ecmp_mbr_next_i(
        &self,
        mgrp: MgrpHandle,
        cursor: Option<EcmpHandle>,
        count: usize,
    ) -> McResult<Vec<EcmpHandle>> {
        let state = self.state.lock();
        list_next(
            &state.mgrp(mgrp)?.ecmp_members(),
            cursor,
            count,
            EcmpHandle::INVALID,
            "ecmp",
        )
    }
}
