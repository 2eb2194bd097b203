//! Tree cursor.
//!
//! A [`Cursor`] explores a tree of immutable nodes through a stack of
//! (node, index) frames, root first and leaf last. Navigation works
//! inside the current leaf whenever it can and climbs through parent
//! frames only when it runs off a chunk boundary, so sequential scans
//! and nearby re-seeks touch the store rarely.
//!
//! # Position states of the leaf frame
//!
//! ```text
//!   BeforeStart (idx == -1) <--retreat-- InRange (0 <= idx < count)
//!                            --advance--> PastEnd (idx == count)
//!   Invalidated (idx == i32::MIN), a sink until the next seek
//! ```
//!
//! The sentinel positions are valid terminal states, not errors:
//! `advance`/`retreat` report them by returning `false`. Store
//! failures propagate unchanged and leave the cursor indeterminate;
//! callers should re-seek or discard it.
//!
//! Cursors are single-owner objects. Every operation that can fetch a
//! node takes `&Cx` and may surface cancellation from the store.

use std::cmp::Ordering;

use fprolly_error::{ProllyError, Result};
use fprolly_types::limits::MAX_TREE_HEIGHT;
use fprolly_types::{Address, Cx};
use tracing::debug;

use crate::node::{Node, NodeItem};
use crate::search::lower_bound_search;
use crate::store::NodeStore;

/// Leaf index marking a cursor that was explicitly invalidated.
const INVALIDATED_IDX: i32 = i32::MIN;

/// One level of a cursor's root-to-leaf chain.
#[derive(Debug, Clone)]
struct Frame {
    node: Node,
    /// Current entry index. `-1` and `count` are transient sentinels
    /// on the leaf frame; internal frames are clamped into
    /// `[0, count - 1]` before their child ref is read.
    idx: i32,
    /// Lazily decoded subtree cardinalities, dropped whenever `node`
    /// is replaced.
    subtree_counts: Option<Vec<u64>>,
}

impl Frame {
    fn new(node: Node, idx: i32) -> Self {
        Self {
            node,
            idx,
            subtree_counts: None,
        }
    }

    fn count(&self) -> i32 {
        i32::from(self.node.count())
    }

    fn at_node_start(&self) -> bool {
        self.idx == 0
    }

    fn at_node_end(&self) -> bool {
        self.idx == self.count() - 1
    }

    /// Clamp the index into `[0, count - 1]`.
    fn keep_in_bounds(&mut self) {
        if self.idx < 0 {
            self.idx = 0;
        }
        let last = self.count() - 1;
        if self.idx > last {
            self.idx = last;
        }
    }

    #[allow(clippy::cast_sign_loss)]
    fn child_address(&self) -> Address {
        self.node.child_ref(self.idx as usize)
    }
}

/// Convert a search callback's result into a frame index.
///
/// Callbacks contract to return values in `[0, count]`, which always
/// fits; larger values would indicate a broken callback and saturate
/// harmlessly past the node end.
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
fn idx_from_search(idx: usize) -> i32 {
    idx.min(i32::MAX as usize) as i32
}

/// Walk root -> leaf, picking an index at each level and fetching the
/// chosen child through the store.
fn descend<S, F>(cx: &Cx, store: &S, root: Node, mut pick: F) -> Result<Vec<Frame>>
where
    S: NodeStore,
    F: FnMut(&Node) -> i32,
{
    let mut frames: Vec<Frame> = Vec::new();
    let mut node = root;
    loop {
        let idx = pick(&node);
        let is_leaf = node.is_leaf();
        frames.push(Frame::new(node, idx));
        if is_leaf {
            return Ok(frames);
        }
        if frames.len() >= usize::from(MAX_TREE_HEIGHT) {
            return Err(ProllyError::TreeTooDeep {
                max: MAX_TREE_HEIGHT,
            });
        }

        let top = frames.last_mut().expect("frame was just pushed");
        top.keep_in_bounds();
        node = store.read(cx, top.child_address())?;
    }
}

/// A navigable position in a tree of nodes.
pub struct Cursor<S> {
    store: S,
    /// Root first, leaf last. Never empty.
    frames: Vec<Frame>,
}

impl<S: Clone> Clone for Cursor<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            frames: self.frames.clone(),
        }
    }
}

impl<S: std::fmt::Debug> std::fmt::Debug for Cursor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("store", &self.store)
            .field("height", &self.frames.len())
            .field("leaf_idx", &self.leaf().idx)
            .finish()
    }
}

impl<S: NodeStore> Cursor<S> {
    // -----------------------------------------------------------------
    // Factories
    // -----------------------------------------------------------------

    /// Cursor positioned at the smallest key of the tree under `root`.
    pub fn new_at_start(cx: &Cx, store: S, root: Node) -> Result<Self> {
        let frames = descend(cx, &store, root, |_| 0)?;
        Ok(Self { store, frames })
    }

    /// Cursor positioned at the largest key.
    pub fn new_at_end(cx: &Cx, store: S, root: Node) -> Result<Self> {
        let frames = descend(cx, &store, root, |node| i32::from(node.count()) - 1)?;
        Ok(Self { store, frames })
    }

    /// Cursor positioned one past the largest key (leaf `idx == count`).
    pub fn new_past_end(cx: &Cx, store: S, root: Node) -> Result<Self> {
        let mut cursor = Self::new_at_end(cx, store, root)?;
        let moved = cursor.advance(cx)?;
        assert!(!moved, "an end cursor advanced past the last entry");
        Ok(cursor)
    }

    /// Cursor positioned by `search` at every level of the descent.
    pub fn new_from_search_fn(
        cx: &Cx,
        store: S,
        root: Node,
        mut search: impl FnMut(&Node) -> usize,
    ) -> Result<Self> {
        let frames = descend(cx, &store, root, |node| idx_from_search(search(node)))?;
        Ok(Self { store, frames })
    }

    /// Cursor positioned by an item-search callback probing for
    /// `item`: the canonical seek-to-key entry point.
    pub fn new_at_item(
        cx: &Cx,
        store: S,
        root: Node,
        item: NodeItem<'_>,
        mut search: impl FnMut(&[u8], &Node) -> usize,
    ) -> Result<Self> {
        let frames = descend(cx, &store, root, |node| idx_from_search(search(item, node)))?;
        Ok(Self { store, frames })
    }

    /// Leaf-only variant of [`Self::new_at_item`]: one frame, reused
    /// across the descent, no parent chain.
    ///
    /// The returned cursor can read and move within its leaf but
    /// cannot cross chunk boundaries; `advance`/`retreat` report
    /// exhaustion at the chunk edge.
    pub fn new_leaf_at_item(
        cx: &Cx,
        store: S,
        root: Node,
        item: NodeItem<'_>,
        mut search: impl FnMut(&[u8], &Node) -> usize,
    ) -> Result<Self> {
        let mut frame = Frame::new(root, 0);
        frame.idx = idx_from_search(search(item, &frame.node));

        let mut height = 1usize;
        while !frame.node.is_leaf() {
            height += 1;
            if height > usize::from(MAX_TREE_HEIGHT) {
                return Err(ProllyError::TreeTooDeep {
                    max: MAX_TREE_HEIGHT,
                });
            }
            frame.keep_in_bounds();
            frame.node = store.read(cx, frame.child_address())?;
            frame.subtree_counts = None;
            frame.idx = idx_from_search(search(item, &frame.node));
        }

        Ok(Self {
            store,
            frames: vec![frame],
        })
    }

    /// Cursor positioned at the `ordinal`-th leaf entry (0-indexed) in
    /// traversal order. Delegates to [`Self::new_past_end`] when
    /// `ordinal >= tree_count`.
    pub fn new_at_ordinal(cx: &Cx, store: S, root: Node, ordinal: u64) -> Result<Self> {
        if ordinal >= root.tree_count() {
            return Self::new_past_end(cx, store, root);
        }

        // Residual distance to the target entry, narrowed level by
        // level through the subtree cardinalities.
        let mut distance = ordinal;
        Self::new_from_search_fn(cx, store, root, move |node| {
            if node.is_leaf() {
                // The residual is below this leaf's entry count once
                // the descent reaches level 0.
                #[allow(clippy::cast_possible_truncation)]
                let idx = distance as usize;
                return idx;
            }

            let counts = node.subtree_counts();
            let mut idx = 0;
            for (i, &cardinality) in counts.iter().enumerate() {
                idx = i;
                if distance < cardinality {
                    break;
                }
                distance -= cardinality;
            }
            idx
        })
    }

    // -----------------------------------------------------------------
    // Position queries
    // -----------------------------------------------------------------

    /// Whether the cursor points at an entry.
    ///
    /// False at the sentinel positions (before start, past end,
    /// invalidated) and on an empty tree.
    #[must_use]
    pub fn valid(&self) -> bool {
        let leaf = self.leaf();
        leaf.node.count() != 0
            && !leaf.node.bytes().is_empty()
            && leaf.idx >= 0
            && leaf.idx < leaf.count()
    }

    /// Park the cursor in a state that is invalid until the next
    /// `seek`.
    pub fn invalidate(&mut self) {
        self.leaf_mut().idx = INVALIDATED_IDX;
    }

    /// Whether the position is the first entry of its chunk.
    #[must_use]
    pub fn at_node_start(&self) -> bool {
        self.leaf().at_node_start()
    }

    /// Whether the position is the last entry of its chunk.
    #[must_use]
    pub fn at_node_end(&self) -> bool {
        self.leaf().at_node_end()
    }

    /// Level of the node the cursor stands in (0 for leaf cursors).
    #[must_use]
    pub fn level(&self) -> u8 {
        self.leaf().node.level()
    }

    /// Key at the current position.
    ///
    /// # Panics
    ///
    /// Panics if the cursor is not [`Self::valid`].
    #[must_use]
    pub fn current_key(&self) -> NodeItem<'_> {
        let leaf = self.leaf();
        let idx = usize::try_from(leaf.idx).expect("cursor position is not valid");
        leaf.node.key(idx)
    }

    /// Value at the current position.
    ///
    /// # Panics
    ///
    /// Panics if the cursor is not [`Self::valid`].
    #[must_use]
    pub fn current_value(&self) -> NodeItem<'_> {
        let leaf = self.leaf();
        let idx = usize::try_from(leaf.idx).expect("cursor position is not valid");
        leaf.node.value(idx)
    }

    /// Child address at the current position. Meaningful only for a
    /// cursor whose frame holds an internal node.
    ///
    /// # Panics
    ///
    /// Panics if the cursor is not [`Self::valid`] or stands in a
    /// leaf node.
    #[must_use]
    pub fn current_ref(&self) -> Address {
        let leaf = self.leaf();
        let idx = usize::try_from(leaf.idx).expect("cursor position is not valid");
        leaf.node.child_ref(idx)
    }

    /// Number of leaf entries under the current position: 1 in a
    /// leaf, else the cardinality of the child subtree. The
    /// cardinality vector is decoded on first use and cached per
    /// frame.
    ///
    /// # Panics
    ///
    /// Panics if the cursor is not [`Self::valid`].
    pub fn current_subtree_size(&mut self) -> u64 {
        let frame = self.leaf_mut();
        if frame.node.is_leaf() {
            return 1;
        }
        let idx = usize::try_from(frame.idx).expect("cursor position is not valid");
        if frame.subtree_counts.is_none() {
            frame.subtree_counts = Some(frame.node.subtree_counts());
        }
        frame.subtree_counts.as_ref().expect("just populated")[idx]
    }

    // -----------------------------------------------------------------
    // Bidirectional iteration
    // -----------------------------------------------------------------

    /// Move to the next entry, crossing chunk boundaries as needed.
    ///
    /// Returns `false` once there is no next entry; the cursor then
    /// rests past the end (leaf `idx == count`) and stays there under
    /// further calls.
    pub fn advance(&mut self, cx: &Cx) -> Result<bool> {
        let leaf_depth = self.frames.len() - 1;
        let moved = self.advance_in_bounds(cx, leaf_depth)?;
        if !moved {
            let leaf = self.leaf_mut();
            leaf.idx = leaf.count();
        }
        Ok(moved)
    }

    fn advance_in_bounds(&mut self, cx: &Cx, depth: usize) -> Result<bool> {
        {
            let frame = &mut self.frames[depth];
            if frame.idx < frame.count() - 1 {
                frame.idx += 1;
                return Ok(true);
            }
            if frame.idx == frame.count() {
                // Already out of bounds.
                return Ok(false);
            }
            assert!(frame.at_node_end(), "advance from an interior position");
        }

        if depth > 0 && self.advance_in_bounds(cx, depth - 1)? {
            // End of the current chunk, and an ancestor moved to a
            // sibling: land on the new chunk's first entry.
            self.fetch_frame(cx, depth)?;
            self.frames[depth].idx = 0;
            return Ok(true);
        }

        // Every ancestor failed to advance: past the end of the tree.
        Ok(false)
    }

    /// Move to the previous entry, crossing chunk boundaries as
    /// needed.
    ///
    /// Returns `false` once there is no previous entry; the cursor
    /// then rests before the start (leaf `idx == -1`).
    pub fn retreat(&mut self, cx: &Cx) -> Result<bool> {
        let leaf_depth = self.frames.len() - 1;
        let moved = self.retreat_in_bounds(cx, leaf_depth)?;
        if !moved {
            self.leaf_mut().idx = -1;
        }
        Ok(moved)
    }

    fn retreat_in_bounds(&mut self, cx: &Cx, depth: usize) -> Result<bool> {
        {
            let frame = &mut self.frames[depth];
            if frame.idx > 0 {
                frame.idx -= 1;
                return Ok(true);
            }
            if frame.idx == -1 {
                // Already out of bounds.
                return Ok(false);
            }
            assert!(frame.at_node_start(), "retreat from an interior position");
        }

        if depth > 0 && self.retreat_in_bounds(cx, depth - 1)? {
            self.fetch_frame(cx, depth)?;
            let frame = &mut self.frames[depth];
            frame.idx = frame.count() - 1;
            return Ok(true);
        }

        // Every ancestor failed to retreat: before the start.
        Ok(false)
    }

    /// Replace the node at `depth` with the child its parent currently
    /// points to. Called whenever navigation crosses into a different
    /// chunk; the caller must position the fresh frame's index.
    fn fetch_frame(&mut self, cx: &Cx, depth: usize) -> Result<()> {
        assert!(depth > 0, "the root frame has no parent to fetch from");
        let address = self.frames[depth - 1].child_address();
        debug!(depth, address = %address, "fetching node across chunk boundary");

        let node = self.store.read(cx, address)?;
        let frame = &mut self.frames[depth];
        frame.node = node;
        frame.idx = -1; // caller positions it
        frame.subtree_counts = None;
        Ok(())
    }

    // -----------------------------------------------------------------
    // Seek
    // -----------------------------------------------------------------

    /// Re-position the cursor at `item` (or the next greater key, or
    /// past the end on a high miss), climbing only as high as the
    /// target requires.
    ///
    /// A probe inside the current chunk's key range touches no other
    /// chunk; small jumps between siblings climb one level. This is
    /// what makes incremental range scans cheap.
    pub fn seek<C>(&mut self, cx: &Cx, item: NodeItem<'_>, compare: &C) -> Result<()>
    where
        C: Fn(&[u8], &[u8]) -> Ordering,
    {
        let leaf_depth = self.frames.len() - 1;
        self.seek_frame(cx, leaf_depth, item, compare)
    }

    fn seek_frame<C>(&mut self, cx: &Cx, depth: usize, item: &[u8], compare: &C) -> Result<()>
    where
        C: Fn(&[u8], &[u8]) -> Ordering,
    {
        let in_bounds = depth == 0 || {
            let node = &self.frames[depth].node;
            node.count() == 0
                || (compare(item, node.key(0)) != Ordering::Less
                    && compare(item, node.key(usize::from(node.count()) - 1))
                        != Ordering::Greater)
        };

        if !in_bounds {
            // The target lies outside this chunk; let the ancestors
            // re-position first, then drop into their chosen child.
            self.seek_frame(cx, depth - 1, item, compare)?;
            self.frames[depth - 1].keep_in_bounds();
            self.fetch_frame(cx, depth)?;
        }

        let frame = &mut self.frames[depth];
        frame.idx = idx_from_search(lower_bound_search(item, &frame.node, compare));
        Ok(())
    }

    // -----------------------------------------------------------------
    // Identity
    // -----------------------------------------------------------------

    /// Order two cursors positioned in trees of identical shape.
    ///
    /// Walks both frame chains leaf to root in lockstep; an index
    /// difference closer to the root supersedes one closer to the
    /// leaf, since differing ancestors place the cursors in different
    /// subtrees. Stops when either chain runs out. Behavior on trees
    /// of mismatched shape is undefined; the caller guarantees shape.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Ordering {
        let mut diff: i64 = 0;
        let mut left = self.frames.len();
        let mut right = other.frames.len();
        loop {
            let d = i64::from(self.frames[left - 1].idx) - i64::from(other.frames[right - 1].idx);
            if d != 0 {
                diff = d;
            }
            if left == 1 || right == 1 {
                break;
            }
            left -= 1;
            right -= 1;
        }
        diff.cmp(&0)
    }

    /// Overwrite this cursor's position with `other`'s.
    ///
    /// # Panics
    ///
    /// Panics if the frame chains differ in depth.
    pub fn copy_from(&mut self, other: &Self)
    where
        S: Clone,
    {
        assert_eq!(
            self.frames.len(),
            other.frames.len(),
            "cursor frame chains must match in depth"
        );
        self.store = other.store.clone();
        for (dst, src) in self.frames.iter_mut().zip(&other.frames) {
            dst.node = src.node.clone();
            dst.idx = src.idx;
            dst.subtree_counts = src.subtree_counts.clone();
        }
    }

}

impl<S> Cursor<S> {
    fn leaf(&self) -> &Frame {
        self.frames.last().expect("cursor frame chain is never empty")
    }

    fn leaf_mut(&mut self) -> &mut Frame {
        self.frames
            .last_mut()
            .expect("cursor frame chain is never empty")
    }
}
