//! Multicast replication tree manager.
//!
//! Maintains the two-level replication trees of a switch ASIC: multicast
//! groups (L1 chains of nodes and ECMP pointers), replication nodes (L2
//! chains of ports and LAGs) and ECMP groups, backed by per-pipe
//! replication memory (RDM).
//!
//! # Architecture
//!
//! ```text
//! caller ──> [McOrch] ──validate──> shadow (TreeState)
//!               │                      │ derive cell payloads
//!               ↓                      ↓
//!         [SessionManager] <── StagedOp (writes + retired cells)
//!               │ commit
//!               ↓
//!          McHardware ──"memory change confirmed"──> [GarbageCollector]
//!                                                          │
//!                                                   [RdmAllocator] free list
//! ```
//!
//! Every tree change is make-before-break: new cells are written before the
//! pointer that makes them reachable, and unlinked cells are reclaimed only
//! after the hardware is done with the commit that unlinked them.
//!
//! # Key Components
//!
//! - [`device::McOrch`]: per-device API entry point
//! - [`session::SessionManager`]: sessions, batching and commit submission
//! - [`rdm`]: RDM cell allocation and garbage collection
//! - [`daemon::McMgrDaemon`]: process wiring and the periodic sweep timer

pub mod audit;
pub mod config;
pub mod daemon;
pub mod device;
pub mod diag;
pub mod ecmp;
pub mod lag;
pub mod limits;
pub mod mgrp;
pub mod node;
pub mod port_state;
pub mod prune;
pub mod rdm;
pub mod session;

pub use config::McMgrConfig;
pub use daemon::{DaemonError, McMgrDaemon};
pub use device::{McOrch, McOrchConfig};
pub use diag::{McCounters, PacketInfo, ReplicaCopy, ReplicationTrace};
pub use ecmp::{EcmpAssociation, EcmpSelection, EcmpSummary};
pub use lag::LagSelection;
pub use limits::{ThresholdBreadcrumb, ThresholdKind};
pub use node::{NodeAssociation, NodeAttr};
pub use port_state::PortMcState;
pub use rdm::{GcMode, RdmUsage};
pub use session::{SessionId, SessionManager};
