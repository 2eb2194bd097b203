//! Search callbacks.
//!
//! The cursor is agnostic to key semantics: ordering and in-node
//! positioning are supplied by the caller in one of three shapes,
//! accepted as plain closures so dispatch is zero-cost:
//!
//! - compare-fn `Fn(&[u8], &[u8]) -> Ordering` — a total order over
//!   items, consistent across the entire tree;
//! - search-fn `FnMut(&Node) -> usize` — picks an index given only
//!   the node (ordinal seek is built on this);
//! - item-search-fn `FnMut(&[u8], &Node) -> usize` — picks an index
//!   for a probe item.
//!
//! Search callbacks must return an index in `[0, count]`; `count` is
//! only meaningful at the leaf, where it encodes a miss past the
//! largest key.

use std::cmp::Ordering;

use crate::node::{Node, NodeItem};

/// Compare two items as raw bytes.
///
/// The default comparator: shortlex on the byte sequences, sequential
/// access with no pointer chasing.
#[must_use]
pub fn compare_item_bytes(left: NodeItem<'_>, right: NodeItem<'_>) -> Ordering {
    let common = left.len().min(right.len());
    for idx in 0..common {
        let l = left[idx];
        let r = right[idx];
        if l != r {
            return l.cmp(&r);
        }
    }
    left.len().cmp(&right.len())
}

/// Find the smallest index `i` with `compare(item, key(i)) <= 0`, or
/// `count` if no key satisfies it.
///
/// Ties return the lowest index, so a cursor positioned by this search
/// is stable at the left edge of any equal run.
pub fn lower_bound_search<C>(item: NodeItem<'_>, node: &Node, compare: &C) -> usize
where
    C: Fn(&[u8], &[u8]) -> Ordering,
{
    let mut lo = 0usize;
    let mut hi = usize::from(node.count());
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if compare(item, node.key(mid)) == Ordering::Greater {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

/// The canonical item-search-fn: [`lower_bound_search`] under
/// [`compare_item_bytes`].
#[must_use]
pub fn item_lower_bound(item: NodeItem<'_>, node: &Node) -> usize {
    lower_bound_search(item, node, &compare_item_bytes)
}
