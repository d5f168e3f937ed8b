//! Per-port multicast forwarding, fast-failover and protection state.

use std::collections::{BTreeSet, HashMap};

use mc_types::{PortId, PortSet};
use serde::Serialize;

/// Snapshot of one port's multicast state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PortMcState {
    pub port: PortId,
    pub fwd_active: bool,
    pub link_up: bool,
    pub ff_latched: bool,
    pub backup: Option<PortId>,
    /// Port this one backs up, if any.
    pub protects: Option<PortId>,
    pub ff_enabled: bool,
    pub protection_enabled: bool,
}

/// Shadow of the port state tables.
///
/// Protection is kept as two maps so both "which backup does A use" and
/// "which port does B protect" are O(1); a backup protects at most one port.
#[derive(Debug, Clone, Default)]
pub(crate) struct PortStateTable {
    fwd_inactive: BTreeSet<PortId>,
    link_down: BTreeSet<PortId>,
    ff_enabled: bool,
    ff_latched: BTreeSet<PortId>,
    protection_enabled: bool,
    backup_of: HashMap<PortId, PortId>,
    protects: HashMap<PortId, PortId>,
}

impl PortStateTable {
    pub fn fwd_active(&self, port: PortId) -> bool {
        !self.fwd_inactive.contains(&port)
    }

    pub fn set_fwd_active(&mut self, port: PortId, active: bool) {
        if active {
            self.fwd_inactive.remove(&port);
        } else {
            self.fwd_inactive.insert(port);
        }
    }

    pub fn ff_enabled(&self) -> bool {
        self.ff_enabled
    }

    pub fn set_ff_enabled(&mut self, enabled: bool) {
        self.ff_enabled = enabled;
    }

    pub fn is_latched(&self, port: PortId) -> bool {
        self.ff_latched.contains(&port)
    }

    /// Link went down. Returns true when the port latched.
    pub fn port_down(&mut self, port: PortId) -> bool {
        self.link_down.insert(port);
        self.ff_enabled && self.ff_latched.insert(port)
    }

    /// Link came back. A latched port stays latched until cleared.
    pub fn port_up(&mut self, port: PortId) {
        self.link_down.remove(&port);
    }

    pub fn is_link_up(&self, port: PortId) -> bool {
        !self.link_down.contains(&port)
    }

    /// Re-arms a port. Returns whether it was latched.
    pub fn clear_latch(&mut self, port: PortId) -> bool {
        self.ff_latched.remove(&port)
    }

    pub fn protection_enabled(&self) -> bool {
        self.protection_enabled
    }

    pub fn set_protection_enabled(&mut self, enabled: bool) {
        self.protection_enabled = enabled;
    }

    pub fn backup(&self, protected: PortId) -> Option<PortId> {
        self.backup_of.get(&protected).copied()
    }

    pub fn protected_by(&self, backup: PortId) -> Option<PortId> {
        self.protects.get(&backup).copied()
    }

    /// Maps `protected` to `backup`, replacing any earlier mapping on either
    /// side. Returns the ports whose protection was dropped as a side
    /// effect.
    pub fn set_protection(&mut self, protected: PortId, backup: PortId) -> Vec<PortId> {
        let mut dropped = Vec::new();
        if let Some(old_backup) = self.backup_of.remove(&protected) {
            self.protects.remove(&old_backup);
        }
        if let Some(other) = self.protects.remove(&backup) {
            self.backup_of.remove(&other);
            dropped.push(other);
        }
        self.backup_of.insert(protected, backup);
        self.protects.insert(backup, protected);
        dropped
    }

    pub fn clear_protection(&mut self, protected: PortId) -> Option<PortId> {
        let backup = self.backup_of.remove(&protected)?;
        self.protects.remove(&backup);
        Some(backup)
    }

    fn usable(&self, port: PortId) -> bool {
        self.fwd_active(port) && !self.is_latched(port)
    }

    /// Port a copy for `port` actually leaves on, if any.
    ///
    /// A latched port fails over to its backup when protection is enabled
    /// and the backup is itself usable; otherwise the copy is dropped.
    pub fn resolve(&self, port: PortId) -> Option<PortId> {
        if self.usable(port) {
            return Some(port);
        }
        if !self.is_latched(port) || !self.protection_enabled {
            return None;
        }
        self.backup(port).filter(|b| self.usable(*b))
    }

    /// Local LAG members eligible for hash selection: latched ports drop out
    /// unless protection can carry them.
    pub fn lag_candidates(&self, ports: &PortSet) -> Vec<PortId> {
        ports
            .iter()
            .filter(|p| !self.is_latched(*p) || self.resolve(*p).is_some())
            .collect()
    }

    pub fn snapshot(&self, port: PortId) -> PortMcState {
        PortMcState {
            port,
            fwd_active: self.fwd_active(port),
            link_up: self.is_link_up(port),
            ff_latched: self.is_latched(port),
            backup: self.backup(port),
            protects: self.protected_by(port),
            ff_enabled: self.ff_enabled(),
            protection_enabled: self.protection_enabled(),
        }
    }
}
