//! Cursor iteration shared by every registry and member list.
//!
//! A call returns up to `count` handles after the cursor (from the first
//! entry when there is no cursor), padded with the invalid sentinel. A walk
//! that has nothing left returns `NotFound`.

use std::fmt::Display;

use mc_common::SlotArena;
use mc_hal::{HandleKind, McError, McHandle, McResult};
use mc_types::DevId;

use super::state::{slot_key, to_handle};

fn check_count(count: usize) -> McResult<()> {
    if count == 0 {
        Err(McError::invalid_argument("iteration count must be > 0"))
    } else {
        Ok(())
    }
}

/// First entry of an arena in allocation order.
pub(crate) fn arena_first<T, K: HandleKind>(
    arena: &SlotArena<T>,
    dev: DevId,
    what: &str,
) -> McResult<McHandle<K>> {
    arena
        .first()
        .map(|key| to_handle(dev, key))
        .ok_or_else(|| McError::not_found(format!("no {} entries", what)))
}

/// Up to `count` entries after `cursor`, in allocation order.
///
/// The cursor must still be live: a destroyed cursor is `InvalidHandle`.
pub(crate) fn arena_next<T, K: HandleKind>(
    arena: &SlotArena<T>,
    dev: DevId,
    cursor: Option<McHandle<K>>,
    count: usize,
    what: &str,
) -> McResult<Vec<McHandle<K>>> {
    check_count(count)?;
    let start = match cursor {
        None => arena.first(),
        Some(handle) if handle.dev() == dev => arena
            .next_after(slot_key(handle))
            .map_err(|_| McError::invalid_handle(handle))?,
        Some(handle) => return Err(McError::invalid_handle(handle)),
    };
    let Some(mut key) = start else {
        return Err(McError::not_found(format!("no more {} entries", what)));
    };

    let mut out = Vec::with_capacity(count);
    loop {
        out.push(to_handle(dev, key));
        if out.len() == count {
            break;
        }
        match arena.next_after(key) {
            Ok(Some(next)) => key = next,
            _ => break,
        }
    }
    out.resize(count, McHandle::INVALID);
    Ok(out)
}

/// First element of a member list.
pub(crate) fn list_first<T: Copy>(list: &[T], what: &str) -> McResult<T> {
    list.first()
        .copied()
        .ok_or_else(|| McError::not_found(format!("no {} members", what)))
}

/// Up to `count` list elements after `cursor`, padded with `invalid`.
///
/// A cursor that is not in the list is `InvalidHandle`.
pub(crate) fn list_next<T: Copy + PartialEq + Display>(
    list: &[T],
    cursor: Option<T>,
    count: usize,
    invalid: T,
    what: &str,
) -> McResult<Vec<T>> {
    check_count(count)?;
    let start = match cursor {
        None => 0,
        Some(c) => {
            list.iter()
                .position(|x| *x == c)
                .ok_or_else(|| McError::invalid_handle(c))?
                + 1
        }
    };
    if start >= list.len() {
        return Err(McError::not_found(format!("no more {} members", what)));
    }
    let mut out: Vec<T> = list[start..].iter().take(count).copied().collect();
    out.resize(count, invalid);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mc_hal::{McStatus, NodeHandle};
    use pretty_assertions::assert_eq;

    fn arena_with(n: usize) -> (SlotArena<usize>, Vec<NodeHandle>) {
        let mut arena = SlotArena::with_capacity(8);
        let handles = (0..n)
            .map(|i| to_handle(DevId(0), arena.insert(i).unwrap()))
            .collect();
        (arena, handles)
    }

    #[test]
    fn test_arena_walk_pads_with_invalid() {
        let (arena, h) = arena_with(3);
        let first: NodeHandle = arena_first(&arena, DevId(0), "node").unwrap();
        assert_eq!(first, h[0]);

        let page = arena_next(&arena, DevId(0), Some(h[0]), 4, "node").unwrap();
        assert_eq!(page, vec![h[1], h[2], NodeHandle::INVALID, NodeHandle::INVALID]);

        let page = arena_next::<_, mc_hal::NodeKind>(&arena, DevId(0), None, 2, "node").unwrap();
        assert_eq!(page, vec![h[0], h[1]]);
    }

    #[test]
    fn test_arena_walk_past_end() {
        let (arena, h) = arena_with(2);
        let err = arena_next(&arena, DevId(0), Some(h[1]), 1, "node").unwrap_err();
        assert_eq!(err.status(), McStatus::NotFound);

        let (empty, _) = arena_with(0);
        let err = arena_first::<_, mc_hal::NodeKind>(&empty, DevId(0), "node").unwrap_err();
        assert_eq!(err.status(), McStatus::NotFound);
    }

    #[test]
    fn test_arena_walk_stale_cursor() {
        let (mut arena, h) = arena_with(2);
        arena.remove(slot_key(h[0]));
        let err = arena_next(&arena, DevId(0), Some(h[0]), 1, "node").unwrap_err();
        assert_eq!(err.status(), McStatus::InvalidHandle);
    }

    #[test]
    fn test_list_walk() {
        let (_, h) = arena_with(3);
        assert_eq!(list_first(&h, "node").unwrap(), h[0]);
        assert_eq!(
            list_next(&h, Some(h[1]), 3, NodeHandle::INVALID, "node").unwrap(),
            vec![h[2], NodeHandle::INVALID, NodeHandle::INVALID]
        );
        assert_eq!(
            list_next(&h, Some(h[2]), 1, NodeHandle::INVALID, "node")
                .unwrap_err()
                .status(),
            McStatus::NotFound
        );
        assert_eq!(
            list_next(&h, None, 0, NodeHandle::INVALID, "node")
                .unwrap_err()
                .status(),
            McStatus::InvalidArgument
        );
    }
}
