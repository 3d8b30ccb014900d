//! Tree nodes and arena handles.

use std::collections::BTreeSet;

use crate::vector::SparseVector;

/// Index of a node inside its tree's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// The root sentinel of every tree.
    pub const ROOT: NodeId = NodeId(0);

    /// Position in the arena.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A vector tree node.
#[derive(Debug, Clone, Default)]
pub struct VectorNode {
    /// The node's vector. Empty for the root sentinel.
    pub vector: SparseVector,
    /// Left child (angle in the fold band).
    pub left: Option<NodeId>,
    /// Right child (angle at or below the fold angle).
    pub right: Option<NodeId>,
    /// Document IDs attached to this vector and not yet written.
    pub doc_ids: BTreeSet<u64>,
    /// Address of the postings chain head once written.
    pub postings_offset: Option<u64>,
    /// Every postings head resolved for this vector when several pages tie.
    pub postings_offsets: Vec<u64>,
    /// Address of the serialized vector once written.
    pub vector_offset: Option<u64>,
    /// Number of descendants.
    pub weight: u64,
    /// Column this node belongs to.
    pub key_id: u64,
}

impl VectorNode {
    /// A node carrying only a vector.
    pub fn new(vector: SparseVector, key_id: u64) -> Self {
        Self {
            vector,
            key_id,
            ..Default::default()
        }
    }

    /// A node carrying a vector and one document ID.
    pub fn with_doc_id(vector: SparseVector, doc_id: u64, key_id: u64) -> Self {
        let mut node = Self::new(vector, key_id);
        node.doc_ids.insert(doc_id);
        node
    }

    /// A node whose postings already live on disk.
    pub fn with_postings_offset(vector: SparseVector, postings_offset: u64, key_id: u64) -> Self {
        let mut node = Self::new(vector, key_id);
        node.postings_offset = Some(postings_offset);
        node.postings_offsets.push(postings_offset);
        node
    }

    /// Fold another node's document IDs and postings references into this one.
    pub fn merge(&mut self, other: VectorNode) {
        self.doc_ids.extend(other.doc_ids);
        if self.postings_offset.is_none() {
            self.postings_offset = other.postings_offset;
        }
        for offset in other.postings_offsets {
            if !self.postings_offsets.contains(&offset) {
                self.postings_offsets.push(offset);
            }
        }
    }

    /// Whether the node has no children.
    pub fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }
}

/// Result of inserting into a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new node was attached.
    Added(NodeId),
    /// The vector matched an existing node and was merged into it.
    Merged(NodeId),
}

impl InsertOutcome {
    /// True if a node was physically added.
    pub fn is_added(&self) -> bool {
        matches!(self, InsertOutcome::Added(_))
    }

    /// The node that now holds the inserted vector.
    pub fn node_id(&self) -> NodeId {
        match self {
            InsertOutcome::Added(id) | InsertOutcome::Merged(id) => *id,
        }
    }
}
