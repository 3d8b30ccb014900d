//! Arena-backed approximate binary search tree over vectors.

use crate::graph::node::{InsertOutcome, NodeId, VectorNode};
use crate::model::{AngleBand, Model};
use crate::vector::SparseVector;

/// A vector tree for one column.
///
/// Slot 0 holds the root sentinel with an empty vector. Every comparison
/// against the sentinel scores 0, so all data hangs off its right side.
#[derive(Debug, Clone)]
pub struct VectorTree {
    key_id: u64,
    nodes: Vec<VectorNode>,
}

impl VectorTree {
    /// Create an empty tree for `key_id`.
    pub fn new(key_id: u64) -> Self {
        Self {
            key_id,
            nodes: vec![VectorNode::new(SparseVector::empty(), key_id)],
        }
    }

    pub(crate) fn from_nodes(key_id: u64, nodes: Vec<VectorNode>) -> Self {
        debug_assert!(!nodes.is_empty(), "arena must contain the root sentinel");
        Self { key_id, nodes }
    }

    /// Column this tree belongs to.
    pub fn key_id(&self) -> u64 {
        self.key_id
    }

    /// The root sentinel.
    pub fn root(&self) -> &VectorNode {
        &self.nodes[0]
    }

    /// Borrow a node.
    pub fn node(&self, id: NodeId) -> &VectorNode {
        &self.nodes[id.0]
    }

    /// Mutably borrow a node.
    pub fn node_mut(&mut self, id: NodeId) -> &mut VectorNode {
        &mut self.nodes[id.0]
    }

    /// Number of data nodes (the sentinel is not counted).
    pub fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    /// Whether the tree holds no data nodes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over data nodes in arena order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &VectorNode)> {
        self.nodes
            .iter()
            .enumerate()
            .skip(1)
            .map(|(i, node)| (NodeId(i), node))
    }

    /// Insert a node, merging it into an existing node when the two vectors
    /// are identical under the model's threshold.
    pub fn insert(&mut self, node: VectorNode, model: &dyn Model) -> InsertOutcome {
        let mut cursor = NodeId::ROOT;
        let mut path: Vec<NodeId> = Vec::new();

        loop {
            let current = &self.nodes[cursor.0];
            let angle = model.cos_angle(&node.vector, &current.vector);

            let next = match model.band(angle) {
                AngleBand::Identical if cursor != NodeId::ROOT => {
                    self.nodes[cursor.0].merge(node);
                    return InsertOutcome::Merged(cursor);
                }
                AngleBand::FoldLeft if cursor != NodeId::ROOT => current.left,
                _ => current.right,
            };

            path.push(cursor);
            match next {
                Some(child) => cursor = child,
                None => {
                    let id = NodeId(self.nodes.len());
                    let went_left = cursor != NodeId::ROOT
                        && model.band(angle) == AngleBand::FoldLeft;
                    self.nodes.push(node);
                    if went_left {
                        self.nodes[cursor.0].left = Some(id);
                    } else {
                        self.nodes[cursor.0].right = Some(id);
                    }
                    for ancestor in path {
                        self.nodes[ancestor.0].weight += 1;
                    }
                    return InsertOutcome::Added(id);
                }
            }
        }
    }

    /// Find the closest node to `vector`, walking the tree the same way
    /// [`VectorTree::insert`] does. Returns `None` when nothing scores above 0.
    pub fn closest_match(&self, vector: &SparseVector, model: &dyn Model) -> Option<(NodeId, f64)> {
        let mut best: Option<(NodeId, f64)> = None;
        let mut cursor = self.root().right;

        while let Some(id) = cursor {
            let node = &self.nodes[id.0];
            let angle = model.cos_angle(vector, &node.vector);
            let improved = angle > best.map(|(_, score)| score).unwrap_or(0.0);

            match model.band(angle) {
                AngleBand::Identical => return Some((id, angle)),
                AngleBand::FoldLeft => {
                    if improved {
                        best = Some((id, angle));
                    }
                    cursor = node.left;
                }
                AngleBand::FoldRight => {
                    if improved {
                        best = Some((id, angle));
                    }
                    cursor = node.right;
                }
            }
        }

        best
    }

    /// Depth of the deepest data node and the widest level, counted from the
    /// sentinel's right child.
    pub fn depth_and_width(&self) -> (usize, usize) {
        let mut depth = 0;
        let mut width = 0;
        let mut level: Vec<NodeId> = self.root().right.into_iter().collect();

        while !level.is_empty() {
            depth += 1;
            width = width.max(level.len());
            level = level
                .iter()
                .flat_map(|id| {
                    let node = &self.nodes[id.0];
                    node.left.into_iter().chain(node.right)
                })
                .collect();
        }

        (depth, width)
    }

    /// Drop every data node, keeping the sentinel.
    pub fn clear(&mut self) {
        self.nodes.truncate(1);
        let root = &mut self.nodes[0];
        root.left = None;
        root.right = None;
        root.weight = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BagOfCharsModel, ModelConfig};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn word(w: &str) -> SparseVector {
        BagOfCharsModel::embed_word(w)
    }

    fn descendants(tree: &VectorTree, id: NodeId) -> u64 {
        let node = tree.node(id);
        node.left
            .into_iter()
            .chain(node.right)
            .map(|child| 1 + descendants(tree, child))
            .sum()
    }

    #[test]
    fn test_first_insert_hangs_right_of_root() {
        let model = BagOfCharsModel::new();
        let mut tree = VectorTree::new(3);

        let outcome = tree.insert(VectorNode::with_doc_id(word("alpha"), 1, 3), &model);
        assert!(outcome.is_added());
        assert_eq!(tree.root().right, Some(outcome.node_id()));
        assert_eq!(tree.root().left, None);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_identical_merges_instead_of_adding() {
        let model = BagOfCharsModel::new();
        let mut tree = VectorTree::new(0);

        let first = tree.insert(VectorNode::with_doc_id(word("search"), 1, 0), &model);
        let second = tree.insert(VectorNode::with_doc_id(word("search"), 2, 0), &model);
        let third = tree.insert(VectorNode::with_doc_id(word("search"), 2, 0), &model);

        assert!(first.is_added());
        assert_eq!(second, InsertOutcome::Merged(first.node_id()));
        assert_eq!(third, InsertOutcome::Merged(first.node_id()));
        assert_eq!(tree.len(), 1);
        let ids: Vec<u64> = tree.node(first.node_id()).doc_ids.iter().copied().collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_fold_routes_left_and_right() {
        let model = BagOfCharsModel::with_config(ModelConfig {
            identical_angle: 0.99,
            fold_angle: 0.5,
        })
        .unwrap();
        let mut tree = VectorTree::new(0);

        let top = tree
            .insert(
                VectorNode::new(SparseVector::from_pairs(vec![(0, 1.0), (1, 1.0)]), 0),
                &model,
            )
            .node_id();
        // cos = 1/sqrt(2) ~ 0.707: related, goes left
        let related = tree
            .insert(VectorNode::new(SparseVector::from_pairs(vec![(0, 1.0)]), 0), &model)
            .node_id();
        // cos = 0: unrelated, goes right
        let unrelated = tree
            .insert(VectorNode::new(SparseVector::from_pairs(vec![(7, 1.0)]), 0), &model)
            .node_id();

        assert_eq!(tree.node(top).left, Some(related));
        assert_eq!(tree.node(top).right, Some(unrelated));
        assert_eq!(tree.node(top).weight, 2);
        assert_eq!(tree.depth_and_width(), (2, 2));
    }

    #[test]
    fn test_weights_count_descendants() {
        let model = BagOfCharsModel::new();
        let mut tree = VectorTree::new(0);
        let text = "the quick brown fox jumps over the lazy dog while seven wizards quietly hex jumbled zebras";
        for (i, w) in text.split(' ').enumerate() {
            tree.insert(VectorNode::with_doc_id(word(w), i as u64, 0), &model);
        }

        for (id, node) in tree.nodes() {
            assert_eq!(node.weight, descendants(&tree, id), "node {}", id.index());
        }
    }

    #[test]
    fn test_every_inserted_vector_is_found() {
        let model = BagOfCharsModel::new();
        let mut tree = VectorTree::new(0);
        let mut rng = StdRng::seed_from_u64(7);
        let mut vectors = Vec::new();

        for doc in 0..300u64 {
            let pairs: Vec<(u32, f32)> = (0..rng.random_range(1..6))
                .map(|_| (rng.random_range(0..40u32), rng.random_range(1..4) as f32))
                .collect();
            let vector = SparseVector::from_pairs(pairs);
            tree.insert(VectorNode::with_doc_id(vector.clone(), doc, 0), &model);
            vectors.push((doc, vector));
        }

        for (doc, vector) in &vectors {
            let (id, score) = tree.closest_match(vector, &model).expect("match");
            assert!(score >= model.identical_angle());
            assert!(tree.node(id).doc_ids.contains(doc));
        }
    }

    #[test]
    fn test_closest_match_on_empty_tree() {
        let model = BagOfCharsModel::new();
        let tree = VectorTree::new(0);
        assert!(tree.closest_match(&word("anything"), &model).is_none());
        assert_eq!(tree.depth_and_width(), (0, 0));
    }

    #[test]
    fn test_clear() {
        let model = BagOfCharsModel::new();
        let mut tree = VectorTree::new(0);
        tree.insert(VectorNode::with_doc_id(word("one"), 1, 0), &model);
        tree.insert(VectorNode::with_doc_id(word("two"), 2, 0), &model);
        tree.clear();
        assert!(tree.is_empty());
        assert!(tree.root().right.is_none());
    }
}
