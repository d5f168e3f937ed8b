//! LAG member selection across spanning devices.

use mc_types::PortId;

/// Picks the local LAG member for `hash`.
///
/// A LAG spanning several devices is indexed as `left` remote members,
/// then the local members in ascending port order, then `right` remote
/// members. The selected index is `hash mod (left + local + right)`; only an
/// index inside the local window yields a port here, anything else is
/// replicated by another device.
pub fn select_lag_member(members: &[PortId], left: u16, right: u16, hash: u32) -> Option<PortId> {
    let left = usize::from(left);
    let total = left + members.len() + usize::from(right);
    if total == 0 {
        return None;
    }
    let index = hash as usize % total;
    index
        .checked_sub(left)
        .and_then(|local| members.get(local).copied())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ports(ids: &[u16]) -> Vec<PortId> {
        ids.iter().copied().map(PortId).collect()
    }

    #[test]
    fn test_local_only() {
        let m = ports(&[4, 5, 6]);
        assert_eq!(select_lag_member(&m, 0, 0, 0), Some(PortId(4)));
        assert_eq!(select_lag_member(&m, 0, 0, 4), Some(PortId(5)));
    }

    #[test]
    fn test_remote_window() {
        // Index space: [r r | 4 5 | r]
        let m = ports(&[4, 5]);
        assert_eq!(select_lag_member(&m, 2, 1, 0), None);
        assert_eq!(select_lag_member(&m, 2, 1, 1), None);
        assert_eq!(select_lag_member(&m, 2, 1, 2), Some(PortId(4)));
        assert_eq!(select_lag_member(&m, 2, 1, 3), Some(PortId(5)));
        assert_eq!(select_lag_member(&m, 2, 1, 4), None);
        // 7 mod 5 wraps back onto the first local slot.
        assert_eq!(select_lag_member(&m, 2, 1, 7), Some(PortId(4)));
        assert_eq!(select_lag_member(&m, 2, 1, 8), Some(PortId(5)));
    }

    #[test]
    fn test_empty_lag() {
        assert_eq!(select_lag_member(&[], 0, 0, 9), None);
        assert_eq!(select_lag_member(&[], 3, 0, 9), None);
    }
}
