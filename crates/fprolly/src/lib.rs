//! Content-addressed prolly tree read layer.
//!
//! A prolly tree is a probabilistic B-tree whose shape is a pure
//! function of its contents: nodes are immutable, addressed by the
//! hash of their bytes, and internal nodes carry per-child subtree
//! cardinalities. This crate provides the read path over such trees —
//! the [`Node`] view, the [`NodeStore`] boundary, and the [`Cursor`]
//! that seeks, scans, and compares positions without materializing
//! intermediate nodes.

pub mod builder;
pub mod cursor;
pub mod node;
pub mod search;
pub mod store;


pub use builder::{NodeBuilder, TreeBuilder};
pub use cursor::Cursor;
pub use node::{Node, NodeItem};
pub use search::{compare_item_bytes, item_lower_bound, lower_bound_search};
pub use store::{MemNodeStore, NodeStore};

pub use fprolly_error::{ProllyError, Result};
pub use fprolly_types::{Address, Cx};
