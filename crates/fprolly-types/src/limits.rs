//! Hard limits for tree structure.

/// Maximum height of a tree, counted in frames from root to leaf.
///
/// A prolly tree over practical key volumes is a handful of levels
/// deep; a descent that exceeds this bound indicates a reference cycle
/// or corrupt node data, not a tall tree.
pub const MAX_TREE_HEIGHT: u8 = 64;
