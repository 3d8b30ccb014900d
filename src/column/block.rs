//! The fixed 40-byte node block.

use crate::error::{FoliumError, Result};
use crate::storage::{StorageInput, StorageOutput, StructReader, StructWriter};

/// Serialized size of one [`NodeBlock`].
pub const BLOCK_SIZE: u64 = 40;

/// Which children follow a block in the serialized page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminator {
    /// Left and right child.
    Both = 0,
    /// Left child only.
    LeftOnly = 1,
    /// Right child only.
    RightOnly = 2,
    /// No children.
    Leaf = 3,
}

impl Terminator {
    /// Encode child presence.
    pub fn from_children(has_left: bool, has_right: bool) -> Self {
        match (has_left, has_right) {
            (true, true) => Terminator::Both,
            (true, false) => Terminator::LeftOnly,
            (false, true) => Terminator::RightOnly,
            (false, false) => Terminator::Leaf,
        }
    }

    /// Decode the on-disk value.
    pub fn from_i64(value: i64) -> Result<Self> {
        match value {
            0 => Ok(Terminator::Both),
            1 => Ok(Terminator::LeftOnly),
            2 => Ok(Terminator::RightOnly),
            3 => Ok(Terminator::Leaf),
            other => Err(FoliumError::corruption(format!("unknown terminator {other}"))),
        }
    }

    /// Whether a left child follows.
    pub fn has_left(&self) -> bool {
        matches!(self, Terminator::Both | Terminator::LeftOnly)
    }

    /// Whether a right child follows (possibly after the left subtree).
    pub fn has_right(&self) -> bool {
        matches!(self, Terminator::Both | Terminator::RightOnly)
    }
}

/// One node record in an index stream.
///
/// ```text
/// vectorOffset:i64 | postingsOffset:i64 | componentCount:i64 | weight:i64 | terminator:i64
/// ```
///
/// A node without postings stores `-1` as its postings offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeBlock {
    pub vector_offset: u64,
    pub postings_offset: Option<u64>,
    pub component_count: u64,
    pub weight: u64,
    pub terminator: Terminator,
}

impl NodeBlock {
    pub fn write_to<W: StorageOutput>(&self, writer: &mut StructWriter<W>) -> Result<()> {
        writer.write_i64(self.vector_offset as i64)?;
        writer.write_i64(self.postings_offset.map(|o| o as i64).unwrap_or(-1))?;
        writer.write_i64(self.component_count as i64)?;
        writer.write_i64(self.weight as i64)?;
        writer.write_i64(self.terminator as i64)?;
        Ok(())
    }

    pub fn read_from<R: StorageInput>(reader: &mut StructReader<R>) -> Result<Self> {
        let start = reader.position();
        let vector_offset = reader.read_i64()?;
        let postings_offset = reader.read_i64()?;
        let component_count = reader.read_i64()?;
        let weight = reader.read_i64()?;
        let terminator = Terminator::from_i64(reader.read_i64()?)?;

        if vector_offset < 0 || component_count < 0 || weight < 0 || postings_offset < -1 {
            return Err(FoliumError::corruption(format!(
                "malformed node block at {start}"
            )));
        }

        Ok(NodeBlock {
            vector_offset: vector_offset as u64,
            postings_offset: (postings_offset >= 0).then_some(postings_offset as u64),
            component_count: component_count as u64,
            weight: weight as u64,
            terminator,
        })
    }
}
