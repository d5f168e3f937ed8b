//! Port forwarding, fast-failover and protection operations.

use mc_hal::{HwWrite, McError, McResult};
use mc_types::PortId;

use super::types::PortMcState;
use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::device::McOrch;
use crate::session::SessionId;
use crate::{audit_log, info_log, warn_log};

impl McOrch {
    /// Enables or disables multicast egress on `port`.
    pub fn set_port_mc_fwd_state(&self, sess: SessionId, port: PortId, active: bool) -> McResult<()> {
        let result = self.set_port_mc_fwd_state_locked(sess, port, active);
        self.audit(AuditCategory::HardwareTable, "set_port_mc_fwd_state", "port", port.to_string(), sess, &result);
        result
    }

    fn set_port_mc_fwd_state_locked(&self, sess: SessionId, port: PortId, active: bool) -> McResult<()> {
        let mut state = self.begin(sess)?;
        state.geo.check_port(port)?;
        state.ports.set_fwd_active(port, active);
        let mut op = self.new_op();
        op.write_all(state.geo.pipe_count, HwWrite::PortForward { port, active });
        self.stage(sess, op)
    }

    pub fn get_port_mc_fwd_state(&self, port: PortId) -> McResult<bool> {
        let state = self.state.lock();
        state.geo.check_port(port)?;
        Ok(state.ports.fwd_active(port))
    }

    pub fn enable_port_fast_failover(&self, sess: SessionId) -> McResult<()> {
        self.set_fast_failover(sess, true)
    }

    pub fn disable_port_fast_failover(&self, sess: SessionId) -> McResult<()> {
        self.set_fast_failover(sess, false)
    }

    fn set_fast_failover(&self, sess: SessionId, enabled: bool) -> McResult<()> {
        let result = self.begin(sess).and_then(|mut state| {
            state.ports.set_ff_enabled(enabled);
            let mut op = self.new_op();
            op.write_all(state.geo.pipe_count, HwWrite::FastFailover { enabled });
            self.stage(sess, op)
        });
        let action = if enabled {
            "enable_port_fast_failover"
        } else {
            "disable_port_fast_failover"
        };
        self.audit(AuditCategory::ConfigurationChange, action, "device", self.dev_id().to_string(), sess, &result);
        result
    }

    /// Re-arms a port the hardware latched down. Fails `IllegalState`
    /// while the link is still down.
    pub fn clear_fast_failover_state(&self, sess: SessionId, port: PortId) -> McResult<()> {
        let result = self.clear_fast_failover_state_locked(sess, port);
        self.audit(AuditCategory::HardwareTable, "clear_fast_failover_state", "port", port.to_string(), sess, &result);
        result
    }

    fn clear_fast_failover_state_locked(&self, sess: SessionId, port: PortId) -> McResult<()> {
        let mut state = self.begin(sess)?;
        state.geo.check_port(port)?;
        if !state.ports.is_link_up(port) {
            return Err(McError::illegal_state(format!(
                "port {} is still down, cannot re-arm",
                port
            )));
        }
        state.ports.clear_latch(port);
        let mut op = self.new_op();
        op.write_all(state.geo.pipe_count, HwWrite::ClearFastFailover { port });
        self.stage(sess, op)
    }

    /// Whether `port` is currently latched down.
    pub fn get_fast_failover_state(&self, port: PortId) -> McResult<bool> {
        let state = self.state.lock();
        state.geo.check_port(port)?;
        Ok(state.ports.is_latched(port))
    }

    /// Link-down notification from the port driver. With fast failover
    /// enabled the port latches and stays down until cleared. Returns
    /// whether it latched.
    pub fn port_down(&self, port: PortId) -> McResult<bool> {
        let mut state = self.state.lock();
        state.geo.check_port(port)?;
        let latched = state.ports.port_down(port);
        let backup = state.ports.resolve(port);
        drop(state);

        if latched {
            warn_log!("McOrch", port = %port, backup = ?backup, "port latched down by fast failover");
        }
        audit_log!(
            AuditRecord::new(AuditCategory::HardwareTable, "McOrch", "port_down")
                .with_outcome(AuditOutcome::Success)
                .with_object_type("port")
                .with_object_id(port.to_string())
                .with_details(serde_json::json!({
                    "latched": latched,
                    "backup": backup.map(|b| b.to_string()),
                }))
        );
        Ok(latched)
    }

    /// Link-up notification. A latched port stays latched.
    pub fn port_up(&self, port: PortId) -> McResult<()> {
        let mut state = self.state.lock();
        state.geo.check_port(port)?;
        state.ports.port_up(port);
        let latched = state.ports.is_latched(port);
        drop(state);
        info_log!("McOrch", port = %port, latched = latched, "port link up");
        Ok(())
    }

    pub fn enable_port_protection(&self, sess: SessionId) -> McResult<()> {
        self.set_protection(sess, true)
    }

    pub fn disable_port_protection(&self, sess: SessionId) -> McResult<()> {
        self.set_protection(sess, false)
    }

    fn set_protection(&self, sess: SessionId, enabled: bool) -> McResult<()> {
        let result = self.begin(sess).and_then(|mut state| {
            state.ports.set_protection_enabled(enabled);
            let mut op = self.new_op();
            op.write_all(state.geo.pipe_count, HwWrite::Protection { enabled });
            self.stage(sess, op)
        });
        let action = if enabled {
            "enable_port_protection"
        } else {
            "disable_port_protection"
        };
        self.audit(AuditCategory::ConfigurationChange, action, "device", self.dev_id().to_string(), sess, &result);
        result
    }

    /// Makes `backup` carry `protected`'s copies while `protected` is
    /// latched down. A backup protects one port at a time; mapping it again
    /// drops its earlier assignment.
    pub fn set_port_protection(&self, sess: SessionId, protected: PortId, backup: PortId) -> McResult<()> {
        let result = self.set_port_protection_locked(sess, protected, backup);
        self.audit(
            AuditCategory::HardwareTable,
            "set_port_protection",
            "port",
            format!("{}->{}", protected, backup),
            sess,
            &result,
        );
        result
    }

    fn set_port_protection_locked(&self, sess: SessionId, protected: PortId, backup: PortId) -> McResult<()> {
        let mut state = self.begin(sess)?;
        state.geo.check_port(protected)?;
        state.geo.check_port(backup)?;
        if protected == backup {
            return Err(McError::invalid_argument(format!("port {} cannot protect itself", protected)));
        }
        let dropped = state.ports.set_protection(protected, backup);
        let mut op = self.new_op();
        for port in dropped {
            op.write_all(
                state.geo.pipe_count,
                HwWrite::ProtectionMap {
                    protected: port,
                    backup: None,
                },
            );
        }
        op.write_all(
            state.geo.pipe_count,
            HwWrite::ProtectionMap {
                protected,
                backup: Some(backup),
            },
        );
        self.stage(sess, op)
    }

    pub fn clear_port_protection(&self, sess: SessionId, protected: PortId) -> McResult<()> {
        let result = self.clear_port_protection_locked(sess, protected);
        self.audit(AuditCategory::HardwareTable, "clear_port_protection", "port", protected.to_string(), sess, &result);
        result
    }

    fn clear_port_protection_locked(&self, sess: SessionId, protected: PortId) -> McResult<()> {
        let mut state = self.begin(sess)?;
        state.geo.check_port(protected)?;
        if state.ports.clear_protection(protected).is_none() {
            return Ok(());
        }
        let mut op = self.new_op();
        op.write_all(
            state.geo.pipe_count,
            HwWrite::ProtectionMap {
                protected,
                backup: None,
            },
        );
        self.stage(sess, op)
    }

    pub fn get_port_protection(&self, protected: PortId) -> McResult<Option<PortId>> {
        let state = self.state.lock();
        state.geo.check_port(protected)?;
        Ok(state.ports.backup(protected))
    }

    pub fn get_port_mc_state(&self, port: PortId) -> McResult<PortMcState> {
        let state = self.state.lock();
        state.geo.check_port(port)?;
        Ok(state.ports.snapshot(port))
    }
}

#[cfg(test)]
mod tests {
    use crate::device::test_support::Harness;
    use mc_hal::McStatus;
    use mc_types::{PipeId, PortId};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_fwd_state() {
        let h = Harness::new();
        assert!(h.orch.get_port_mc_fwd_state(PortId(3)).unwrap());
        h.orch
            .set_port_mc_fwd_state(h.sess, PortId(3), false)
            .unwrap();
        assert!(!h.orch.get_port_mc_fwd_state(PortId(3)).unwrap());
        assert_eq!(h.hw.port_forward(PipeId(0), PortId(3)), Some(false));
        assert_eq!(
            h.orch
                .set_port_mc_fwd_state(h.sess, PortId(32), false)
                .unwrap_err()
                .status(),
            McStatus::InvalidArgument
        );
    }

    #[test]
    fn test_latch_needs_fast_failover() {
        let h = Harness::new();
        assert!(!h.orch.port_down(PortId(1)).unwrap());
        assert!(!h.orch.get_fast_failover_state(PortId(1)).unwrap());

        h.orch.enable_port_fast_failover(h.sess).unwrap();
        assert!(h.hw.fast_failover_enabled(PipeId(1)));
        assert!(h.orch.port_down(PortId(1)).unwrap());
        assert_eq!(
            h.orch
                .clear_fast_failover_state(h.sess, PortId(1))
                .unwrap_err()
                .status(),
            McStatus::IllegalState
        );
        h.orch.port_up(PortId(1)).unwrap();
        assert!(h.orch.get_fast_failover_state(PortId(1)).unwrap());

        h.orch.clear_fast_failover_state(h.sess, PortId(1)).unwrap();
        assert!(!h.orch.get_fast_failover_state(PortId(1)).unwrap());
    }

    #[test]
    fn test_protection_mapping() {
        let h = Harness::new();
        assert_eq!(
            h.orch
                .set_port_protection(h.sess, PortId(1), PortId(1))
                .unwrap_err()
                .status(),
            McStatus::InvalidArgument
        );
        h.orch
            .set_port_protection(h.sess, PortId(1), PortId(2))
            .unwrap();
        // Port 2 moves over to protect port 5; port 1 loses its backup.
        h.orch
            .set_port_protection(h.sess, PortId(5), PortId(2))
            .unwrap();
        assert_eq!(h.orch.get_port_protection(PortId(1)).unwrap(), None);
        assert_eq!(h.orch.get_port_protection(PortId(5)).unwrap(), Some(PortId(2)));
        assert_eq!(h.hw.protection_backup(PipeId(0), PortId(1)), None);
        assert_eq!(
            h.hw.protection_backup(PipeId(0), PortId(5)),
            Some(PortId(2))
        );

        h.orch.clear_port_protection(h.sess, PortId(5)).unwrap();
        assert_eq!(h.orch.get_port_protection(PortId(5)).unwrap(), None);
        assert_eq!(h.hw.protection_backup(PipeId(1), PortId(5)), None);
    }

    #[test]
    fn test_port_snapshot() {
        let h = Harness::new();
        h.orch.enable_port_fast_failover(h.sess).unwrap();
        h.orch.enable_port_protection(h.sess).unwrap();
        h.orch
            .set_port_protection(h.sess, PortId(1), PortId(2))
            .unwrap();
        h.orch.port_down(PortId(1)).unwrap();
        let snap = h.orch.get_port_mc_state(PortId(1)).unwrap();
        assert!(!snap.link_up);
        assert!(snap.ff_latched);
        assert_eq!(snap.backup, Some(PortId(2)));
        assert!(snap.ff_enabled && snap.protection_enabled);
        assert_eq!(
            h.orch.get_port_mc_state(PortId(2)).unwrap().protects,
            Some(PortId(1))
        );
        assert!(h.hw.protection_enabled(PipeId(0)));
    }
}
