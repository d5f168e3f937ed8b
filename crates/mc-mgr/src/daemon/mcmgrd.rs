//! mcmgrd daemon: owns the device, its session manager and orchestrator,
//! and drives the periodic garbage collection sweep.

use std::future::Future;
use std::sync::Arc;

use mc_hal::{McError, McHardware, SimHardware, SimHardwareConfig};
use mc_types::DevId;
use thiserror::Error;
use tokio::time::MissedTickBehavior;

use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::config::{ConfigError, McMgrConfig};
use crate::device::{McOrch, McOrchConfig};
use crate::session::SessionManager;
use crate::{audit_log, error_log, info_log};

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("device setup: {0}")]
    Device(#[from] McError),
}

pub struct McMgrDaemon {
    config: McMgrConfig,
    hw: Arc<dyn McHardware>,
    sessions: Arc<SessionManager>,
    orch: Arc<McOrch>,
}

impl McMgrDaemon {
    /// Builds the daemon on the in-memory hardware model.
    pub fn new(config: McMgrConfig) -> Result<Self, DaemonError> {
        let hw = Arc::new(SimHardware::new(SimHardwareConfig {
            dev: DevId(config.device.dev_id),
            pipe_count: config.device.pipe_count,
            ..SimHardwareConfig::default()
        }));
        Self::with_hardware(config, hw)
    }

    /// Builds the daemon on caller-supplied hardware.
    pub fn with_hardware(config: McMgrConfig, hw: Arc<dyn McHardware>) -> Result<Self, DaemonError> {
        config.validate()?;
        let sessions = Arc::new(SessionManager::new(config.hw_timeout()));
        let orch = Arc::new(McOrch::new(
            McOrchConfig::from(&config),
            hw.clone(),
            sessions.clone(),
        )?);

        audit_log!(
            AuditRecord::new(AuditCategory::SystemLifecycle, "McMgrDaemon", "daemon_initialized")
                .with_outcome(AuditOutcome::Success)
                .with_object_id(hw.dev_id().to_string())
                .with_object_type("device")
                .with_details(serde_json::json!({
                    "pipes": config.device.pipe_count,
                    "cells_per_pipe": config.rdm.cells_per_pipe,
                    "gc_mode": config.gc.mode.to_string(),
                }))
        );

        Ok(Self {
            config,
            hw,
            sessions,
            orch,
        })
    }

    pub fn config(&self) -> &McMgrConfig {
        &self.config
    }

    pub fn orch(&self) -> &Arc<McOrch> {
        &self.orch
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn hardware(&self) -> &Arc<dyn McHardware> {
        &self.hw
    }

    /// Runs until `shutdown` resolves. In periodic GC mode a sweep runs
    /// every `gc.sweep_interval_ms`; in interrupt mode the timer only
    /// drains cells retired before a mode switch.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        info_log!(
            "McMgrDaemon",
            dev = %self.hw.dev_id(),
            sweep_interval_ms = self.config.gc.sweep_interval_ms,
            "event loop started"
        );
        audit_log!(
            AuditRecord::new(AuditCategory::SystemLifecycle, "McMgrDaemon", "event_loop_started")
                .with_outcome(AuditOutcome::Success)
                .with_details(serde_json::json!({
                    "sweep_interval_ms": self.config.gc.sweep_interval_ms,
                }))
        );

        let mut sweep = tokio::time::interval(self.config.sweep_interval());
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = sweep.tick() => {
                    self.sweep_once();
                }
            }
        }

        let counters = self.orch.counters();
        info_log!(
            "McMgrDaemon",
            mgrps = counters.mgrps,
            nodes = counters.nodes,
            ecmps = counters.ecmps,
            "event loop stopped"
        );
        audit_log!(
            AuditRecord::new(AuditCategory::SystemLifecycle, "McMgrDaemon", "event_loop_stopped")
                .with_outcome(AuditOutcome::Success)
                .with_details(serde_json::json!({ "counters": counters }))
        );
    }

    /// One timer tick. Returns the number of cells freed.
    pub fn sweep_once(&self) -> usize {
        let pending: usize = self.orch.counters().rdm.iter().map(|u| u.pending).sum();
        if pending == 0 {
            return 0;
        }
        match self.orch.do_node_garbage_collection() {
            Ok(freed) => freed,
            Err(e) => {
                error_log!("McMgrDaemon", error = %e, "garbage collection sweep failed");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdm::GcMode;
    use mc_types::{LagSet, PortSet, Rid};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn small_config(mode: GcMode) -> McMgrConfig {
        let mut config = McMgrConfig::default();
        config.device.pipe_count = 2;
        config.tables.max_mgrps = 16;
        config.tables.max_nodes = 16;
        config.tables.max_ecmps = 16;
        config.rdm.cells_per_pipe = 64;
        config.gc.mode = mode;
        config.gc.sweep_interval_ms = 5;
        config
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = small_config(GcMode::Interrupt);
        config.rdm.cells_per_pipe = 0;
        assert!(matches!(
            McMgrDaemon::new(config),
            Err(DaemonError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_periodic_sweep_reclaims() {
        let daemon = McMgrDaemon::new(small_config(GcMode::Periodic)).unwrap();
        let orch = daemon.orch().clone();
        let sess = daemon.sessions().create_session();
        let node = orch
            .node_create(sess, Rid(1), PortSet::from([1]), LagSet::new())
            .unwrap();
        orch.node_destroy(sess, node).unwrap();
        assert_eq!(orch.counters().rdm[0].pending, 2);

        daemon
            .run(tokio::time::sleep(Duration::from_millis(50)))
            .await;
        let usage = orch.counters().rdm;
        assert_eq!(usage[0].pending, 0);
        assert_eq!(usage[0].free, 64);
    }
}
