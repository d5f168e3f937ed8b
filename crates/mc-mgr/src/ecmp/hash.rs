//! ECMP member selection.
//!
//! Both functions are pure: the same ordered member list and hash always
//! give the same answer, so they are tested without any hardware model.

use mc_types::L1Xid;

/// Picks the member at `hash mod len`. An empty group selects nothing.
pub fn select_member<T: Copy>(members: &[T], hash: u32) -> Option<T> {
    if members.is_empty() {
        return None;
    }
    members.get(hash as usize % members.len()).copied()
}

/// L1 pruning: the copy is suppressed when the association carries an
/// exclusion id and the packet's L1 exclusion id matches it.
pub fn is_l1_pruned(assoc_xid: Option<L1Xid>, packet_xid: Option<L1Xid>) -> bool {
    matches!((assoc_xid, packet_xid), (Some(a), Some(p)) if a == p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_select_member_mod_len() {
        let members = [10u32, 20, 30];
        assert_eq!(select_member(&members, 0), Some(10));
        assert_eq!(select_member(&members, 1), Some(20));
        assert_eq!(select_member(&members, 5), Some(30));
        assert_eq!(select_member(&members, u32::MAX), Some(10));
    }

    #[test]
    fn test_select_member_empty() {
        let members: [u32; 0] = [];
        assert_eq!(select_member(&members, 7), None);
    }

    #[test]
    fn test_select_member_is_deterministic() {
        let members = [1u32, 2, 3, 4, 5];
        for hash in 0..64 {
            assert_eq!(select_member(&members, hash), select_member(&members, hash));
        }
    }

    #[test]
    fn test_l1_prune() {
        assert!(is_l1_pruned(Some(L1Xid(3)), Some(L1Xid(3))));
        assert!(!is_l1_pruned(Some(L1Xid(3)), Some(L1Xid(4))));
        assert!(!is_l1_pruned(None, Some(L1Xid(3))));
        assert!(!is_l1_pruned(Some(L1Xid(3)), None));
    }
}
