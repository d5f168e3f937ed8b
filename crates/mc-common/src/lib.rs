//! Common registry abstractions for the multicast tree manager.
//!
//! - [`SlotArena`]: bounded generational slot arena backing every handle
//!   registry, with O(1) stale-key rejection and allocation-order iteration
//! - [`SlotKey`]: slot index plus generation

pub mod arena;

pub use arena::{ArenaError, SlotArena, SlotKey, MAX_GENERATION};
