use std::sync::Arc;

use moka::{
    policy::EvictionPolicy,
    sync::{Cache, CacheBuilder},
};

use crate::{format::GlobalHeapCollection, node::NodePath, node::StructuralNode};

/// A cache of decoded structural nodes with a fixed node capacity.
///
/// Nodes are keyed by the absolute address of their object header, and resolved paths map to those addresses.
/// Decoded global heap collections are cached by address alongside.
pub struct NodeCache {
    nodes: Cache<u64, StructuralNode>,
    paths: Cache<NodePath, u64>,
    global_heaps: Cache<u64, Arc<GlobalHeapCollection>>,
}

fn build<K, V>(capacity: u64) -> Cache<K, V>
where
    K: std::hash::Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    CacheBuilder::new(capacity)
        .eviction_policy(EvictionPolicy::lru())
        .build()
}

impl NodeCache {
    /// Create a new [`NodeCache`] with a capacity in nodes of `node_capacity`.
    #[must_use]
    pub fn new(node_capacity: u64) -> Self {
        Self {
            nodes: build(node_capacity),
            paths: build(node_capacity),
            global_heaps: build(node_capacity),
        }
    }

    /// Return the node decoded from the object header at `address`.
    #[must_use]
    pub fn node(&self, address: u64) -> Option<StructuralNode> {
        self.nodes.get(&address)
    }

    /// Insert the node decoded from the object header at `address`.
    pub fn insert_node(&self, address: u64, node: StructuralNode) {
        self.nodes.insert(address, node);
    }

    /// Return the object header address of a previously resolved `path`.
    #[must_use]
    pub fn path(&self, path: &NodePath) -> Option<u64> {
        self.paths.get(path)
    }

    /// Record that `path` resolves to the object header at `address`.
    pub fn insert_path(&self, path: NodePath, address: u64) {
        self.paths.insert(path, address);
    }

    /// Return the global heap collection at `address`.
    #[must_use]
    pub fn global_heap(&self, address: u64) -> Option<Arc<GlobalHeapCollection>> {
        self.global_heaps.get(&address)
    }

    /// Insert the global heap collection at `address`.
    pub fn insert_global_heap(&self, address: u64, collection: Arc<GlobalHeapCollection>) {
        self.global_heaps.insert(address, collection);
    }

    /// Return the number of cached nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.run_pending_tasks();
        usize::try_from(self.nodes.entry_count()).unwrap_or(usize::MAX)
    }

    /// Returns true if no nodes are cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove all cached nodes, paths and global heaps.
    pub fn clear(&self) {
        self.nodes.invalidate_all();
        self.paths.invalidate_all();
        self.global_heaps.invalidate_all();
    }
}

impl std::fmt::Debug for NodeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeCache")
            .field("nodes", &self.nodes.entry_count())
            .field("paths", &self.paths.entry_count())
            .finish_non_exhaustive()
    }
}
