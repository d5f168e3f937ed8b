//! LAG membership table.

use mc_hal::{McError, McResult};
use mc_types::{LagId, PortId, PortSet};

/// Result of a LAG hash lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LagSelection {
    /// `None` when another device owns the selected index or the LAG has
    /// no usable local member.
    pub port: Option<PortId>,
    pub is_pruned: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct LagEntry {
    pub ports: PortSet,
    pub left: u16,
    pub right: u16,
}

/// Fixed-size table of LAG port sets and remote member counts.
#[derive(Debug, Clone)]
pub(crate) struct LagTable {
    reserved: Option<LagId>,
    entries: Vec<LagEntry>,
}

impl LagTable {
    pub fn new(size: u16, reserved: Option<LagId>) -> Self {
        Self {
            reserved,
            entries: vec![LagEntry::default(); usize::from(size)],
        }
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    /// Rejects ids outside the table and the reserved id.
    pub fn check(&self, lag: LagId) -> McResult<()> {
        if lag.index() >= self.entries.len() {
            return Err(McError::invalid_argument(format!(
                "{} outside a {}-entry LAG table",
                lag,
                self.entries.len()
            )));
        }
        if Some(lag) == self.reserved {
            return Err(McError::invalid_argument(format!("{} is reserved", lag)));
        }
        Ok(())
    }

    pub fn entry(&self, lag: LagId) -> McResult<&LagEntry> {
        self.check(lag)?;
        self.entries
            .get(lag.index())
            .ok_or_else(|| McError::invalid_argument(lag.to_string()))
    }

    fn entry_mut(&mut self, lag: LagId) -> McResult<&mut LagEntry> {
        self.check(lag)?;
        self.entries
            .get_mut(lag.index())
            .ok_or_else(|| McError::invalid_argument(lag.to_string()))
    }

    pub fn set_membership(&mut self, lag: LagId, ports: PortSet) -> McResult<()> {
        self.entry_mut(lag)?.ports = ports;
        Ok(())
    }

    pub fn set_remote(&mut self, lag: LagId, left: u16, right: u16) -> McResult<()> {
        let entry = self.entry_mut(lag)?;
        entry.left = left;
        entry.right = right;
        Ok(())
    }
}
