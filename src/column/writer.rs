//! Serializes a vector tree into one immutable page.

use log::debug;

use crate::column::block::{NodeBlock, Terminator};
use crate::column::page::{Page, PageIndexWriter};
use crate::error::Result;
use crate::graph::{NodeId, VectorTree};
use crate::postings::PostingsWriter;
use crate::storage::{StorageOutput, StructWriter};
use crate::vector::ElementWidth;

/// Shape of a written page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageStats {
    /// Longest root-to-leaf path.
    pub depth: usize,
    /// Widest tree level.
    pub width: usize,
    /// Number of blocks written.
    pub nodes: usize,
    /// The registered page, or `None` when the tree was empty.
    pub page: Option<Page>,
}

/// Writes pages to a column's index stream.
#[derive(Debug)]
pub struct ColumnWriter<W: StorageOutput> {
    index: StructWriter<W>,
    width: ElementWidth,
}

impl<W: StorageOutput> ColumnWriter<W> {
    /// Wrap an index stream opened for append.
    pub fn new(index_output: W, width: ElementWidth) -> Result<Self> {
        Ok(Self {
            index: StructWriter::new(index_output)?,
            width,
        })
    }

    /// Serialize `tree` as a new page.
    ///
    /// Nodes are written in preorder, left subtree before right, starting at
    /// the sentinel's right child. Outstanding document IDs are flushed to
    /// postings first, then the vector, then the node block. The page is
    /// registered in `page_index` once all of its blocks are written. The
    /// tree's nodes are updated with the offsets they were written at.
    pub fn create_page<V: StorageOutput, X: StorageOutput>(
        &mut self,
        tree: &mut VectorTree,
        vectors: &mut StructWriter<V>,
        postings: &mut PostingsWriter,
        page_index: &mut PageIndexWriter<X>,
    ) -> Result<PageStats> {
        if tree.is_empty() {
            return Ok(PageStats::default());
        }

        let start = self.index.position();
        let mut nodes = 0;
        let mut stack: Vec<NodeId> = tree.root().right.into_iter().collect();

        while let Some(id) = stack.pop() {
            let node = tree.node_mut(id);

            if !node.doc_ids.is_empty() {
                let doc_ids: Vec<u64> = std::mem::take(&mut node.doc_ids).into_iter().collect();
                let head = match node.postings_offset {
                    None => postings.append(&doc_ids)?,
                    Some(head) => {
                        postings.append_and_update_page_ref(head, &doc_ids)?;
                        head
                    }
                };
                node.postings_offset = Some(head);
            }

            let vector_offset = vectors.position();
            node.vector.write_to(vectors, self.width)?;
            node.vector_offset = Some(vector_offset);

            NodeBlock {
                vector_offset,
                postings_offset: node.postings_offset,
                component_count: node.vector.component_count() as u64,
                weight: node.weight,
                terminator: Terminator::from_children(node.left.is_some(), node.right.is_some()),
            }
            .write_to(&mut self.index)?;
            nodes += 1;

            // Right is pushed first so the left subtree is written right after its parent.
            stack.extend(node.right);
            stack.extend(node.left);
        }

        let page = Page {
            offset: start,
            length: self.index.position() - start,
        };
        page_index.put(page)?;

        let (depth, width) = tree.depth_and_width();
        debug!(
            "wrote page for key {} at {} ({} nodes, depth {depth}, width {width})",
            tree.key_id(),
            page.offset,
            nodes
        );

        Ok(PageStats {
            depth,
            width,
            nodes,
            page: Some(page),
        })
    }

    /// Flush the index stream.
    pub fn close(self) -> Result<()> {
        self.index.close()
    }
}
