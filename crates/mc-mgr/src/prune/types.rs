//! L2 exclusion (prune) table and the global exclusion RID.

use mc_hal::{McError, McResult};
use mc_types::{L2Xid, PortId, PortSet, Rid};

#[derive(Debug, Clone)]
pub(crate) struct PruneTable {
    entries: Vec<PortSet>,
    global_rid: Rid,
}

impl PruneTable {
    pub fn new(size: u16) -> Self {
        Self {
            entries: vec![PortSet::new(); usize::from(size)],
            global_rid: Rid(0),
        }
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn check(&self, xid: L2Xid) -> McResult<()> {
        if xid.index() < self.entries.len() {
            Ok(())
        } else {
            Err(McError::invalid_argument(format!(
                "{} outside a {}-entry prune table",
                xid,
                self.entries.len()
            )))
        }
    }

    pub fn get(&self, xid: L2Xid) -> McResult<&PortSet> {
        self.check(xid)?;
        self.entries
            .get(xid.index())
            .ok_or_else(|| McError::invalid_argument(xid.to_string()))
    }

    pub fn set(&mut self, xid: L2Xid, ports: PortSet) -> McResult<()> {
        self.check(xid)?;
        if let Some(entry) = self.entries.get_mut(xid.index()) {
            *entry = ports;
        }
        Ok(())
    }

    pub fn global_rid(&self) -> Rid {
        self.global_rid
    }

    pub fn set_global_rid(&mut self, rid: Rid) {
        self.global_rid = rid;
    }

    /// A copy to `port` is L2-pruned when the port is in the entry for the
    /// packet's L2 exclusion id and the ingress RID matches either the
    /// node's RID or the global exclusion RID.
    pub fn is_pruned(&self, xid: Option<L2Xid>, ingress_rid: Rid, node_rid: Rid, port: PortId) -> bool {
        let Some(xid) = xid else {
            return false;
        };
        if ingress_rid != node_rid && ingress_rid != self.global_rid {
            return false;
        }
        self.entries
            .get(xid.index())
            .is_some_and(|ports| ports.contains(port))
    }
}
