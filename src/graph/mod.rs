//! In-memory vector trees.
//!
//! Vectors are inserted by walking from the root sentinel and comparing the
//! cosine angle against each node: identical vectors merge, related vectors
//! go left, unrelated ones go right. The same walk finds the closest match.

pub mod concurrent;
pub mod node;
pub mod tree;

pub use concurrent::ConcurrentVectorTree;
pub use node::{InsertOutcome, NodeId, VectorNode};
pub use tree::VectorTree;
