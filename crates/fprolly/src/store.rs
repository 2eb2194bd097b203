//! Content-addressed node store boundary.
//!
//! The store is the cursor's only I/O dependency. Implementations may
//! block, hit caches, or fan out to remote chunk storage; the cursor
//! only requires that a read either produces the node for an address
//! or fails with an error it can propagate unchanged.

use std::collections::HashMap;
use std::sync::Arc;

use fprolly_error::{ProllyError, Result};
use fprolly_types::{Address, Cx};
use tracing::debug;

use crate::node::Node;

/// Content-addressed read access to serialized tree nodes.
///
/// Reads must be reentrant: several cursors may share one store.
/// Implementations should observe `cx.checkpoint()` before blocking
/// work so a cancelled navigation surfaces promptly.
pub trait NodeStore {
    /// Fetch the node stored under `address`.
    ///
    /// A missing chunk is `ProllyError::NodeNotFound`; corruption and
    /// cancellation surface as their own variants. The caller treats
    /// any error as leaving its position indeterminate.
    fn read(&self, cx: &Cx, address: Address) -> Result<Node>;
}

impl<S: NodeStore + ?Sized> NodeStore for &S {
    fn read(&self, cx: &Cx, address: Address) -> Result<Node> {
        (**self).read(cx, address)
    }
}

impl<S: NodeStore + ?Sized> NodeStore for Arc<S> {
    fn read(&self, cx: &Cx, address: Address) -> Result<Node> {
        (**self).read(cx, address)
    }
}

/// In-memory node store keyed by content hash.
///
/// Stands in for real chunk storage in tests and transient-tree
/// workloads, the way an in-memory page store stands in for a pager.
#[derive(Debug, Default, Clone)]
pub struct MemNodeStore {
    nodes: HashMap<Address, Node>,
}

impl MemNodeStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node under the hash of its bytes, returning its
    /// address. Re-inserting identical content is a no-op by
    /// construction.
    pub fn insert(&mut self, node: Node) -> Address {
        let address = Address::of(node.bytes());
        self.nodes.insert(address, node);
        address
    }

    #[must_use]
    pub fn contains(&self, address: &Address) -> bool {
        self.nodes.contains_key(address)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl NodeStore for MemNodeStore {
    fn read(&self, cx: &Cx, address: Address) -> Result<Node> {
        cx.checkpoint()?;
        match self.nodes.get(&address) {
            Some(node) => {
                debug!(address = %address, level = node.level(), "node read");
                Ok(node.clone())
            }
            None => Err(ProllyError::NodeNotFound { address }),
        }
    }
}
