//! Vector tree that accepts inserts from many threads.
//!
//! Each node sits behind its own mutex. An insert locks one node at a time
//! while deciding where to go, and attaches a child while still holding the
//! parent's lock, so two threads racing for the same empty slot serialize on
//! that parent only. The arena vector is behind a `RwLock` taken briefly to
//! look up or push a slot, never while waiting on a node.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::graph::node::{InsertOutcome, NodeId, VectorNode};
use crate::graph::tree::VectorTree;
use crate::model::{AngleBand, Model};
use crate::vector::SparseVector;

type Slot = Arc<Mutex<VectorNode>>;

/// A vector tree with per-node locking.
#[derive(Debug)]
pub struct ConcurrentVectorTree {
    key_id: u64,
    nodes: RwLock<Vec<Slot>>,
}

impl ConcurrentVectorTree {
    /// Create an empty tree for `key_id`.
    pub fn new(key_id: u64) -> Self {
        let root = VectorNode::new(SparseVector::empty(), key_id);
        Self {
            key_id,
            nodes: RwLock::new(vec![Arc::new(Mutex::new(root))]),
        }
    }

    /// Column this tree belongs to.
    pub fn key_id(&self) -> u64 {
        self.key_id
    }

    /// Number of data nodes.
    pub fn len(&self) -> usize {
        self.nodes.read().len() - 1
    }

    /// Whether the tree holds no data nodes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, id: NodeId) -> Slot {
        Arc::clone(&self.nodes.read()[id.0])
    }

    fn allocate(&self, node: VectorNode) -> NodeId {
        let mut nodes = self.nodes.write();
        nodes.push(Arc::new(Mutex::new(node)));
        NodeId(nodes.len() - 1)
    }

    /// Insert a node. Same routing and merge rules as [`VectorTree::insert`].
    pub fn insert(&self, node: VectorNode, model: &dyn Model) -> InsertOutcome {
        let mut cursor = NodeId::ROOT;
        let mut path: Vec<NodeId> = Vec::new();

        loop {
            let slot = self.slot(cursor);
            let mut current = slot.lock();
            let angle = model.cos_angle(&node.vector, &current.vector);
            let band = if cursor == NodeId::ROOT {
                AngleBand::FoldRight
            } else {
                model.band(angle)
            };

            let next = match band {
                AngleBand::Identical => {
                    current.merge(node);
                    return InsertOutcome::Merged(cursor);
                }
                AngleBand::FoldLeft => current.left,
                AngleBand::FoldRight => current.right,
            };

            match next {
                Some(child) => {
                    path.push(cursor);
                    cursor = child;
                }
                None => {
                    let id = self.allocate(node);
                    if band == AngleBand::FoldLeft {
                        current.left = Some(id);
                    } else {
                        current.right = Some(id);
                    }
                    current.weight += 1;
                    drop(current);

                    for ancestor in path {
                        self.slot(ancestor).lock().weight += 1;
                    }
                    return InsertOutcome::Added(id);
                }
            }
        }
    }

    /// Copy the tree into a single-threaded [`VectorTree`], leaving this one
    /// untouched.
    pub fn snapshot(&self) -> VectorTree {
        let nodes = self
            .nodes
            .read()
            .iter()
            .map(|slot| slot.lock().clone())
            .collect();
        VectorTree::from_nodes(self.key_id, nodes)
    }
}
