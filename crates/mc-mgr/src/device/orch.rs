//! Per-device multicast orchestrator.

use std::sync::Arc;

use mc_hal::{McError, McHardware, McResult, RdmAddr};
use mc_types::{DevId, LagId, PipeId};
use parking_lot::{Mutex, MutexGuard};

use super::state::{Geometry, TreeState};
use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::config::McMgrConfig;
use crate::rdm::{CellOwner, GarbageCollector, GcMode, RdmAllocator};
use crate::session::{SessionId, SessionManager, StagedOp};
use crate::{audit_log, info_log};

/// Device geometry, table sizes and GC policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct McOrchConfig {
    pub dev: DevId,
    pub pipe_count: u8,
    pub ports_per_pipe: u16,
    pub max_mgrps: usize,
    pub max_nodes: usize,
    pub max_ecmps: usize,
    pub lag_table_size: u16,
    pub reserved_lag_id: Option<LagId>,
    pub prune_table_size: u16,
    pub cells_per_pipe: u32,
    pub gc_mode: GcMode,
}

impl Default for McOrchConfig {
    fn default() -> Self {
        Self::from(&McMgrConfig::default())
    }
}

impl From<&McMgrConfig> for McOrchConfig {
    fn from(config: &McMgrConfig) -> Self {
        Self {
            dev: DevId(config.device.dev_id),
            pipe_count: config.device.pipe_count,
            ports_per_pipe: config.device.ports_per_pipe,
            max_mgrps: config.tables.max_mgrps as usize,
            max_nodes: config.tables.max_nodes as usize,
            max_ecmps: config.tables.max_ecmps as usize,
            lag_table_size: config.tables.lag_table_size,
            reserved_lag_id: config.tables.reserved_lag_id.map(LagId),
            prune_table_size: config.tables.prune_table_size,
            cells_per_pipe: config.rdm.cells_per_pipe,
            gc_mode: config.gc.mode,
        }
    }
}

/// Multicast tree manager for one device.
///
/// Every mutating call validates against the shadow first, so a rejected
/// call never changes state. Accepted calls update the shadow, allocate or
/// retire RDM cells and hand the resulting writes to the caller's session.
///
/// Lock order: tree state, then session manager, then RDM pools. The
/// interrupt thread only ever takes RDM pool locks.
pub struct McOrch {
    pub(crate) config: McOrchConfig,
    pub(crate) hw: Arc<dyn McHardware>,
    pub(crate) sessions: Arc<SessionManager>,
    pub(crate) rdm: Arc<RdmAllocator>,
    pub(crate) gc: Arc<GarbageCollector>,
    pub(crate) state: Mutex<TreeState>,
}

impl McOrch {
    /// Builds the orchestrator, registers its garbage collector as the
    /// device's interrupt handler and attaches the device to `sessions`.
    pub fn new(
        config: McOrchConfig,
        hw: Arc<dyn McHardware>,
        sessions: Arc<SessionManager>,
    ) -> McResult<Self> {
        if hw.dev_id() != config.dev {
            return Err(McError::invalid_argument(format!(
                "hardware drives {} but the orchestrator is configured for {}",
                hw.dev_id(),
                config.dev
            )));
        }
        if hw.pipe_count() != config.pipe_count {
            return Err(McError::invalid_argument(format!(
                "hardware has {} pipes, configuration says {}",
                hw.pipe_count(),
                config.pipe_count
            )));
        }
        if config.pipe_count == 0 || config.ports_per_pipe == 0 {
            return Err(McError::invalid_argument("device has no pipes or ports"));
        }

        let rdm = Arc::new(RdmAllocator::new(
            config.dev,
            config.pipe_count,
            config.cells_per_pipe,
            config.gc_mode,
        ));
        let gc = Arc::new(GarbageCollector::new(rdm.clone()));
        hw.register_mem_change_handler(gc.clone());
        sessions.register_device(hw.clone(), gc.clone());

        let geo = Geometry {
            dev: config.dev,
            pipe_count: config.pipe_count,
            ports_per_pipe: config.ports_per_pipe,
        };
        let state = TreeState::new(
            geo,
            config.max_mgrps,
            config.max_nodes,
            config.max_ecmps,
            config.lag_table_size,
            config.reserved_lag_id,
            config.prune_table_size,
        );

        info_log!(
            "McOrch",
            dev = %config.dev,
            pipes = config.pipe_count,
            cells_per_pipe = config.cells_per_pipe,
            gc_mode = %config.gc_mode,
            "multicast orchestrator ready"
        );

        Ok(Self {
            config,
            hw,
            sessions,
            rdm,
            gc,
            state: Mutex::new(state),
        })
    }

    pub fn config(&self) -> &McOrchConfig {
        &self.config
    }

    pub fn dev_id(&self) -> DevId {
        self.config.dev
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn hardware(&self) -> &Arc<dyn McHardware> {
        &self.hw
    }

    /// Checks the session and takes the tree lock.
    pub(crate) fn begin(&self, sess: SessionId) -> McResult<MutexGuard<'_, TreeState>> {
        self.sessions.check(sess)?;
        Ok(self.state.lock())
    }

    pub(crate) fn new_op(&self) -> StagedOp {
        StagedOp::new(self.config.dev)
    }

    /// One cell in every pipe, all-or-nothing.
    pub(crate) fn alloc_per_pipe(&self, owner: CellOwner) -> McResult<Vec<RdmAddr>> {
        let demand = vec![1; usize::from(self.config.pipe_count)];
        let chain = self.rdm.alloc_chain(&demand, owner)?;
        Ok(chain
            .into_iter()
            .filter_map(|cells| cells.first().copied())
            .collect())
    }

    pub(crate) fn alloc_chain(&self, demand: &[usize], owner: CellOwner) -> McResult<Vec<Vec<RdmAddr>>> {
        self.rdm.alloc_chain(demand, owner)
    }

    /// Marks cells as unlinked by `op`; they become reclaimable once the
    /// commit carrying `op` is done with them.
    pub(crate) fn retire(&self, op: &mut StagedOp, pipe: PipeId, cells: &[RdmAddr]) -> McResult<()> {
        if cells.is_empty() {
            return Ok(());
        }
        self.rdm.retire(pipe, cells)?;
        op.retire(pipe, cells);
        Ok(())
    }

    pub(crate) fn stage(&self, sess: SessionId, op: StagedOp) -> McResult<()> {
        self.sessions.stage(sess, op)
    }

    /// Emits the audit record for a finished mutating call.
    pub(crate) fn audit<T>(
        &self,
        category: AuditCategory,
        action: &str,
        object_type: &str,
        object_id: impl Into<String>,
        sess: SessionId,
        result: &McResult<T>,
    ) {
        let record = AuditRecord::new(category, "McOrch", action)
            .with_object_type(object_type)
            .with_object_id(object_id)
            .with_correlation_id(sess.to_string());
        match result {
            Ok(_) => {
                audit_log!(record.with_outcome(AuditOutcome::Success));
            }
            Err(e) => {
                audit_log!(record.with_error(e.to_string()));
            }
        }
    }

    // ---- garbage collection ----

    pub fn gc_mode(&self) -> GcMode {
        self.gc.mode()
    }

    /// Switches the device-wide GC mode. Cells already pending keep the
    /// mode they were retired under.
    pub fn set_gc_mode(&self, mode: GcMode) -> GcMode {
        let previous = self.gc.set_mode(mode);
        audit_log!(
            AuditRecord::new(AuditCategory::MemoryReclaim, "McOrch", "set_gc_mode")
                .with_outcome(AuditOutcome::Success)
                .with_object_id(self.config.dev.to_string())
                .with_object_type("device")
                .with_details(serde_json::json!({
                    "previous": previous.to_string(),
                    "mode": mode.to_string(),
                }))
        );
        previous
    }

    /// Periodic sweep: frees every cell retired in periodic mode whose
    /// unlinking commit the hardware has completed. Also drains cells left
    /// over from before a switch to interrupt mode. Returns the number of
    /// cells freed.
    pub fn do_node_garbage_collection(&self) -> McResult<usize> {
        let freed = self.gc.sweep(self.hw.as_ref());
        if freed > 0 {
            audit_log!(
                AuditRecord::new(AuditCategory::MemoryReclaim, "McOrch", "do_node_garbage_collection")
                    .with_outcome(AuditOutcome::Success)
                    .with_object_id(self.config.dev.to_string())
                    .with_object_type("device")
                    .with_details(serde_json::json!({ "freed": freed }))
            );
        }
        Ok(freed)
    }
}
