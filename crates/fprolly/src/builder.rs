//! Node and transient-tree construction.
//!
//! [`NodeBuilder`] serializes a single node from parts.
//! [`TreeBuilder`] assembles a whole tree from a sorted pair sequence
//! using a fixed fanout, writing every chunk into a [`MemNodeStore`].
//! Fixed-fanout chunking is deliberate: it is enough to build trees of
//! any height for tests and transient data, while content-defined
//! chunk boundaries stay with the (separate) mutation layer.

use fprolly_error::{ProllyError, Result};
use fprolly_types::varint::{write_varint, MAX_VARINT_LEN};
use fprolly_types::Address;

use crate::node::{Node, NODE_FORMAT_VERSION, NODE_MAGIC, NODE_NUM_FIELDS};
use crate::search::compare_item_bytes;
use crate::store::MemNodeStore;

/// Serializes one node from parts.
#[derive(Debug)]
pub struct NodeBuilder {
    level: u8,
    keys: Vec<Vec<u8>>,
    values: Vec<Vec<u8>>,
    children: Vec<Address>,
    subtree_counts: Vec<u64>,
}

impl NodeBuilder {
    /// Start a leaf node.
    #[must_use]
    pub fn leaf() -> Self {
        Self {
            level: 0,
            keys: Vec::new(),
            values: Vec::new(),
            children: Vec::new(),
            subtree_counts: Vec::new(),
        }
    }

    /// Start an internal node at `level` (>= 1).
    ///
    /// # Panics
    ///
    /// Panics if `level` is 0.
    #[must_use]
    pub fn internal(level: u8) -> Self {
        assert!(level >= 1, "internal nodes live at level 1 and above");
        Self {
            level,
            keys: Vec::new(),
            values: Vec::new(),
            children: Vec::new(),
            subtree_counts: Vec::new(),
        }
    }

    /// Append a key/value entry. Leaf builders only.
    ///
    /// # Panics
    ///
    /// Panics on an internal builder.
    pub fn entry(&mut self, key: &[u8], value: &[u8]) -> &mut Self {
        assert!(self.level == 0, "entries belong to leaf nodes");
        self.keys.push(key.to_vec());
        self.values.push(value.to_vec());
        self
    }

    /// Append a child: its separator key (the largest key in the
    /// child's subtree), its address, and its subtree cardinality.
    /// Internal builders only.
    ///
    /// # Panics
    ///
    /// Panics on a leaf builder.
    pub fn child(&mut self, last_key: &[u8], address: Address, subtree_count: u64) -> &mut Self {
        assert!(self.level >= 1, "children belong to internal nodes");
        self.keys.push(last_key.to_vec());
        self.children.push(address);
        self.subtree_counts.push(subtree_count);
        self
    }

    /// Encode the accumulated parts and decode them back into a
    /// validated [`Node`].
    pub fn finish(&self) -> Result<Node> {
        let count = u16::try_from(self.keys.len()).map_err(|_| ProllyError::NodeTooLarge {
            bytes: self.keys.len(),
        })?;
        let tree_count = if self.level == 0 {
            u64::from(count)
        } else {
            self.subtree_counts.iter().sum()
        };

        let mut buf = Vec::new();
        buf.extend_from_slice(&NODE_MAGIC.to_be_bytes());
        buf.push(NODE_FORMAT_VERSION);
        buf.push(NODE_NUM_FIELDS);
        buf.push(self.level);
        buf.extend_from_slice(&count.to_be_bytes());
        buf.extend_from_slice(&tree_count.to_be_bytes());

        push_offset_table(&mut buf, &self.keys)?;
        for key in &self.keys {
            buf.extend_from_slice(key);
        }

        if self.level == 0 {
            push_offset_table(&mut buf, &self.values)?;
            for value in &self.values {
                buf.extend_from_slice(value);
            }
        } else {
            for address in &self.children {
                buf.extend_from_slice(address.as_bytes());
            }
            let mut varint = [0u8; MAX_VARINT_LEN];
            for &subtree_count in &self.subtree_counts {
                let len = write_varint(&mut varint, subtree_count);
                buf.extend_from_slice(&varint[..len]);
            }
        }

        Node::decode(buf)
    }
}

/// Write a `(len+1)`-entry cumulative u16 offset table for `items`.
fn push_offset_table(buf: &mut Vec<u8>, items: &[Vec<u8>]) -> Result<()> {
    buf.extend_from_slice(&0u16.to_be_bytes());
    let mut acc: usize = 0;
    for item in items {
        acc += item.len();
        let offset =
            u16::try_from(acc).map_err(|_| ProllyError::NodeTooLarge { bytes: acc })?;
        buf.extend_from_slice(&offset.to_be_bytes());
    }
    Ok(())
}

/// Builds a transient tree from sorted pairs with a fixed fanout.
#[derive(Debug, Clone, Copy)]
pub struct TreeBuilder {
    fanout: usize,
}

impl TreeBuilder {
    /// # Panics
    ///
    /// Panics if `fanout < 2`.
    #[must_use]
    pub fn new(fanout: usize) -> Self {
        assert!(fanout >= 2, "fanout below 2 cannot form a tree");
        Self { fanout }
    }

    /// Build a tree over `pairs`, writing every node into `store`, and
    /// return the root. An empty input produces a single empty leaf
    /// root.
    ///
    /// # Panics
    ///
    /// Panics if `pairs` is not sorted by strictly ascending key.
    pub fn build_from_sorted(
        &self,
        store: &mut MemNodeStore,
        pairs: &[(Vec<u8>, Vec<u8>)],
    ) -> Result<Node> {
        assert!(
            pairs
                .windows(2)
                .all(|w| compare_item_bytes(&w[0].0, &w[1].0).is_lt()),
            "pairs must be sorted by strictly ascending key"
        );

        if pairs.is_empty() {
            let root = NodeBuilder::leaf().finish()?;
            store.insert(root.clone());
            return Ok(root);
        }

        // Leaf level.
        let mut level_nodes: Vec<Node> = Vec::new();
        for chunk in pairs.chunks(self.fanout) {
            let mut builder = NodeBuilder::leaf();
            for (key, value) in chunk {
                builder.entry(key, value);
            }
            let node = builder.finish()?;
            store.insert(node.clone());
            level_nodes.push(node);
        }

        // Internal levels, bottom-up, until a single root remains.
        let mut level: u8 = 0;
        while level_nodes.len() > 1 {
            level += 1;
            let mut next_level: Vec<Node> = Vec::new();
            for chunk in level_nodes.chunks(self.fanout) {
                let mut builder = NodeBuilder::internal(level);
                for child in chunk {
                    let last_key = child.key(usize::from(child.count()) - 1);
                    let address = Address::of(child.bytes());
                    builder.child(last_key, address, child.tree_count());
                }
                let node = builder.finish()?;
                store.insert(node.clone());
                next_level.push(node);
            }
            level_nodes = next_level;
        }

        let root = level_nodes.remove(0);
        Ok(root)
    }
}
