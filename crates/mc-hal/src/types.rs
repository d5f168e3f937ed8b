//! Type-safe handle wrappers.
//!
//! Every registry entry (group, node, ECMP group) is addressed by a handle
//! that packs the owning device, a slot index and the slot's generation.
//! A destroyed entry bumps its slot generation, so a stale handle is
//! rejected in O(1) without scanning.

use mc_types::DevId;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

/// Raw handle value as exchanged with the control plane.
pub type RawHandle = u64;

const INDEX_BITS: u32 = 32;
const GENERATION_BITS: u32 = 24;
const GENERATION_MASK: u64 = (1 << GENERATION_BITS) - 1;

/// Marker trait for handle kinds.
pub trait HandleKind: Send + Sync + 'static {
    /// Returns the entry kind name for debugging.
    fn type_name() -> &'static str;
}

/// A type-safe registry handle.
///
/// Layout of the raw value, most significant first: 8 bits device,
/// 24 bits generation, 32 bits slot index. Generations start at 1, so a
/// live handle is never 0 and 0 serves as the invalid sentinel.
///
/// # Examples
///
/// ```
/// use mc_hal::{NodeHandle, MgrpHandle};
/// use mc_types::DevId;
///
/// let node = NodeHandle::new(DevId(0), 7, 1);
/// assert_eq!(node.index(), 7);
/// assert!(node.is_valid());
///
/// // This would fail to compile:
/// // fn takes_group(g: MgrpHandle) {}
/// // takes_group(node);
/// ```
pub struct McHandle<K: HandleKind> {
    raw: RawHandle,
    _marker: PhantomData<K>,
}

impl<K: HandleKind> McHandle<K> {
    /// The invalid sentinel used to pad iteration output.
    pub const INVALID: Self = Self {
        raw: 0,
        _marker: PhantomData,
    };

    /// Builds a handle from its parts.
    pub fn new(dev: DevId, index: u32, generation: u32) -> Self {
        let raw = ((dev.0 as u64) << (INDEX_BITS + GENERATION_BITS))
            | (((generation as u64) & GENERATION_MASK) << INDEX_BITS)
            | index as u64;
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    /// Wraps a raw value. Returns `None` for the invalid sentinel.
    pub fn from_raw(raw: RawHandle) -> Option<Self> {
        if raw == 0 {
            None
        } else {
            Some(Self {
                raw,
                _marker: PhantomData,
            })
        }
    }

    pub const fn as_raw(&self) -> RawHandle {
        self.raw
    }

    pub const fn dev(&self) -> DevId {
        DevId((self.raw >> (INDEX_BITS + GENERATION_BITS)) as u8)
    }

    pub const fn index(&self) -> u32 {
        self.raw as u32
    }

    pub const fn generation(&self) -> u32 {
        ((self.raw >> INDEX_BITS) & GENERATION_MASK) as u32
    }

    pub const fn is_valid(&self) -> bool {
        self.raw != 0
    }
}

impl<K: HandleKind> Clone for McHandle<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K: HandleKind> Copy for McHandle<K> {}

impl<K: HandleKind> fmt::Debug for McHandle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:016x})", K::type_name(), self.raw)
    }
}

impl<K: HandleKind> fmt::Display for McHandle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.raw)
    }
}

impl<K: HandleKind> PartialEq for McHandle<K> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<K: HandleKind> Eq for McHandle<K> {}

impl<K: HandleKind> Hash for McHandle<K> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<K: HandleKind> Default for McHandle<K> {
    fn default() -> Self {
        Self::INVALID
    }
}

macro_rules! define_handle_kind {
    ($name:ident, $type_name:literal, $alias:ident) => {
        #[doc = concat!("Marker type for ", $type_name, " handles.")]
        #[derive(Debug, Clone, Copy)]
        pub struct $name;

        impl HandleKind for $name {
            fn type_name() -> &'static str {
                $type_name
            }
        }

        #[doc = concat!("Handle to a ", $type_name, " entry.")]
        pub type $alias = McHandle<$name>;
    };
}

define_handle_kind!(MgrpKind, "Mgrp", MgrpHandle);
define_handle_kind!(NodeKind, "Node", NodeHandle);
define_handle_kind!(EcmpKind, "Ecmp", EcmpHandle);

/// Address of one cell in a pipe's replication memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RdmAddr(pub u32);

impl fmt::Display for RdmAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rdm:0x{:05x}", self.0)
    }
}

/// Per-pipe sequence number returned by a hardware commit.
///
/// Sequence numbers increase by one per commit; `CommitSeq(0)` means
/// "nothing committed yet".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct CommitSeq(pub u64);

impl fmt::Display for CommitSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_parts() {
        let h = NodeHandle::new(DevId(3), 0x1234, 9);
        assert_eq!(h.dev(), DevId(3));
        assert_eq!(h.index(), 0x1234);
        assert_eq!(h.generation(), 9);
        assert!(h.is_valid());
    }

    #[test]
    fn test_invalid_handle() {
        assert!(MgrpHandle::from_raw(0).is_none());
        assert!(!MgrpHandle::INVALID.is_valid());
        assert_eq!(EcmpHandle::default(), EcmpHandle::INVALID);
    }

    #[test]
    fn test_handle_raw_round_trip() {
        let h = EcmpHandle::new(DevId(1), 42, 2);
        assert_eq!(EcmpHandle::from_raw(h.as_raw()), Some(h));
    }

    #[test]
    fn test_generation_distinguishes_handles() {
        let a = NodeHandle::new(DevId(0), 5, 1);
        let b = NodeHandle::new(DevId(0), 5, 2);
        assert_ne!(a, b);
    }

    #[test]
    fn test_handle_debug() {
        let h = MgrpHandle::new(DevId(0), 1, 1);
        let debug = format!("{:?}", h);
        assert!(debug.contains("Mgrp"));
        assert!(debug.contains("0x0000000100000001"));
    }
}
