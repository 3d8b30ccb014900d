//! Column pages: the on-disk form of a vector tree.
//!
//! A column owns three append-only streams. The index stream holds node
//! blocks, one page per commit. The vector stream holds the serialized
//! vectors the blocks point at. The page index lists `(offset, length)` for
//! every page. Pages are never modified once registered, so a reader can scan
//! them while a writer appends new ones.

pub mod block;
pub mod page;
pub mod reader;
pub mod writer;

pub use block::{NodeBlock, Terminator, BLOCK_SIZE};
pub use page::{read_page_index, Page, PageIndexWriter, PAGE_ENTRY_SIZE};
pub use reader::{ColumnReader, Hit};
pub use writer::{ColumnWriter, PageStats};

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::error::FoliumError;
    use crate::graph::{VectorNode, VectorTree};
    use crate::model::{BagOfCharsModel, Model, ModelConfig};
    use crate::postings::{PostingsReader, PostingsWriter};
    use crate::storage::{MemoryStorage, Storage, StructReader, StructWriter};
    use crate::vector::{ElementWidth, SparseVector};

    const IX: &str = "c.0.ix";
    const VEC: &str = "c.0.vec";
    const IXTP: &str = "c.0.ixtp";

    fn commit(storage: &Arc<dyn Storage>, tree: &mut VectorTree, width: ElementWidth) -> PageStats {
        let mut column = ColumnWriter::new(storage.create_output_append(IX).unwrap(), width).unwrap();
        let mut vectors = StructWriter::new(storage.create_output_append(VEC).unwrap()).unwrap();
        let mut postings = PostingsWriter::open(Arc::clone(storage), "c.pos", "c.pix").unwrap();
        let mut page_index = PageIndexWriter::new(storage.create_output_append(IXTP).unwrap()).unwrap();

        let stats = column
            .create_page(tree, &mut vectors, &mut postings, &mut page_index)
            .unwrap();

        vectors.close().unwrap();
        column.close().unwrap();
        postings.close().unwrap();
        page_index.close().unwrap();
        stats
    }

    fn open(storage: &Arc<dyn Storage>, width: ElementWidth) -> ColumnReader {
        ColumnReader::open(storage.as_ref(), 0, IX, VEC, IXTP, width).unwrap()
    }

    fn doc_ids(storage: &Arc<dyn Storage>, hit: &Hit) -> Vec<u64> {
        let mut reader = PostingsReader::open(storage.as_ref(), "c.pos").unwrap();
        reader.read(&hit.postings_offsets).unwrap()
    }

    fn random_vector(rng: &mut StdRng) -> SparseVector {
        (0..rng.random_range(2..8))
            .map(|_| (rng.random_range(0..64u32), rng.random_range(1..5) as f32))
            .collect()
    }

    #[test]
    fn test_block_order_is_preorder_left_first() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let model = BagOfCharsModel::with_config(ModelConfig {
            identical_angle: 0.99,
            fold_angle: 0.5,
        })
        .unwrap();

        let mut tree = VectorTree::new(0);
        let top = SparseVector::from_pairs(vec![(0, 1.0), (1, 1.0)]);
        let left = SparseVector::from_pairs(vec![(0, 1.0)]);
        let right = SparseVector::from_pairs(vec![(9, 1.0)]);
        tree.insert(VectorNode::with_doc_id(top, 1, 0), &model);
        tree.insert(VectorNode::with_doc_id(right, 3, 0), &model);
        tree.insert(VectorNode::with_doc_id(left, 2, 0), &model);

        let stats = commit(&storage, &mut tree, ElementWidth::F32);
        assert_eq!((stats.depth, stats.width, stats.nodes), (2, 2, 3));
        assert_eq!(stats.page, Some(Page { offset: 0, length: 3 * BLOCK_SIZE }));

        let mut reader = StructReader::new(storage.open_input(IX).unwrap()).unwrap();
        let blocks: Vec<NodeBlock> = (0..3).map(|_| NodeBlock::read_from(&mut reader).unwrap()).collect();
        assert_eq!(blocks[0].terminator, Terminator::Both);
        assert_eq!(blocks[0].weight, 2);
        assert_eq!(blocks[0].component_count, 2);
        assert_eq!(blocks[1].component_count, 1);
        assert_eq!(blocks[1].terminator, Terminator::Leaf);
        assert_eq!(blocks[2].terminator, Terminator::Leaf);

        // the left child is written second even though it was inserted last
        let mut postings = PostingsReader::open(storage.as_ref(), "c.pos").unwrap();
        let second: Vec<u64> = postings
            .read(&[blocks[1].postings_offset.unwrap()])
            .unwrap();
        assert_eq!(second, vec![2]);

        let mut column = open(&storage, ElementWidth::F32);
        let hit = column
            .closest_match_scanning_all_pages(&SparseVector::from_pairs(vec![(9, 2.0)]), &model)
            .unwrap()
            .unwrap();
        assert_eq!(doc_ids(&storage, &hit), vec![3]);
    }

    #[test]
    fn test_every_written_vector_is_found() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let model = BagOfCharsModel::new();
        let mut rng = StdRng::seed_from_u64(42);

        for width in [ElementWidth::F32, ElementWidth::F64] {
            for name in [IX, VEC, IXTP, "c.pos", "c.pix"] {
                let _ = storage.delete_file(name);
            }
            let mut tree = VectorTree::new(0);
            let vectors: Vec<SparseVector> = (0..200).map(|_| random_vector(&mut rng)).collect();
            for (doc, vector) in vectors.iter().enumerate() {
                tree.insert(VectorNode::with_doc_id(vector.clone(), doc as u64, 0), &model);
            }
            commit(&storage, &mut tree, width);

            let mut column = open(&storage, width);
            for (doc, vector) in vectors.iter().enumerate() {
                let hit = column
                    .closest_match_scanning_all_pages(vector, &model)
                    .unwrap()
                    .expect("written vector is found");
                assert!(hit.score >= model.identical_angle());
                assert!(doc_ids(&storage, &hit).contains(&(doc as u64)));
            }
        }
    }

    #[test]
    fn test_multi_page_scan_stops_at_first_identical_page() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let model = BagOfCharsModel::new();
        let words = [["apple", "banana", "cherry"], ["delta", "echo", "foxtrot"], ["golf", "hotel", "india"]];

        for (page, batch) in words.iter().enumerate() {
            let mut tree = VectorTree::new(0);
            for (i, w) in batch.iter().enumerate() {
                let doc = (page * 10 + i) as u64;
                tree.insert(VectorNode::with_doc_id(BagOfCharsModel::embed_word(w), doc, 0), &model);
            }
            commit(&storage, &mut tree, ElementWidth::F32);
        }

        let mut column = open(&storage, ElementWidth::F32);
        assert_eq!(column.pages().len(), 3);

        let query = BagOfCharsModel::embed_word("echo");
        let hit = column
            .closest_match_stopping_at_first_identical_page(&query, &model)
            .unwrap()
            .unwrap();
        assert_eq!(column.pages_scanned(), 2);
        assert_eq!(hit.page, 1);
        assert_eq!(doc_ids(&storage, &hit), vec![11]);

        let hit = column
            .closest_match_scanning_all_pages(&query, &model)
            .unwrap()
            .unwrap();
        assert_eq!(column.pages_scanned(), 3);
        assert_eq!(doc_ids(&storage, &hit), vec![11]);

        for (page, batch) in words.iter().enumerate() {
            for (i, w) in batch.iter().enumerate() {
                let hit = column
                    .closest_match_stopping_at_first_identical_page(&BagOfCharsModel::embed_word(w), &model)
                    .unwrap()
                    .unwrap();
                assert_eq!(hit.page, page);
                assert_eq!(doc_ids(&storage, &hit), vec![(page * 10 + i) as u64]);
            }
        }
    }

    #[test]
    fn test_ties_across_pages_accumulate_postings() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let model = BagOfCharsModel::new();

        for doc in [1u64, 2] {
            let mut tree = VectorTree::new(0);
            tree.insert(VectorNode::with_doc_id(BagOfCharsModel::embed_word("same"), doc, 0), &model);
            commit(&storage, &mut tree, ElementWidth::F32);
        }

        let mut column = open(&storage, ElementWidth::F32);
        let query = BagOfCharsModel::embed_word("same");

        let all = column
            .closest_match_scanning_all_pages(&query, &model)
            .unwrap()
            .unwrap();
        assert_eq!(all.postings_offsets.len(), 2);
        assert_eq!(doc_ids(&storage, &all), vec![1, 2]);

        let first = column
            .closest_match_stopping_at_first_identical_page(&query, &model)
            .unwrap()
            .unwrap();
        assert_eq!(first.postings_offsets.len(), 1);
        assert_eq!(doc_ids(&storage, &first), vec![1]);
    }

    #[test]
    fn test_ties_inside_one_page_accumulate_postings() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let model = BagOfCharsModel::with_config(ModelConfig {
            identical_angle: 0.99,
            fold_angle: 0.5,
        })
        .unwrap();

        // orthogonal vectors: the second one folds right under the first
        let mut tree = VectorTree::new(0);
        tree.insert(VectorNode::with_doc_id(SparseVector::from_pairs(vec![(0, 1.0)]), 1, 0), &model);
        tree.insert(VectorNode::with_doc_id(SparseVector::from_pairs(vec![(1, 1.0)]), 2, 0), &model);
        commit(&storage, &mut tree, ElementWidth::F32);

        let mut reader = StructReader::new(storage.open_input(IX).unwrap()).unwrap();
        let parent = NodeBlock::read_from(&mut reader).unwrap();
        let child = NodeBlock::read_from(&mut reader).unwrap();
        assert_eq!(parent.terminator, Terminator::RightOnly);
        assert_eq!(child.terminator, Terminator::Leaf);

        // equally far from both, below the fold angle
        let query = SparseVector::from_pairs(vec![(0, 1.0), (1, 1.0), (2, 3.0)]);
        let mut column = open(&storage, ElementWidth::F32);
        let hit = column
            .closest_match_in_page(0, &query, &model)
            .unwrap()
            .unwrap();
        assert!((hit.score - 1.0 / 11f64.sqrt()).abs() < 1e-6);
        assert_eq!(
            hit.postings_offsets,
            vec![parent.postings_offset.unwrap(), child.postings_offset.unwrap()]
        );
        assert_eq!(doc_ids(&storage, &hit), vec![1, 2]);

        let all = column
            .closest_match_scanning_all_pages(&query, &model)
            .unwrap()
            .unwrap();
        assert_eq!(all, hit);
    }

    #[test]
    fn test_page_number_out_of_range() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let model = BagOfCharsModel::new();
        let mut tree = VectorTree::new(0);
        tree.insert(VectorNode::with_doc_id(BagOfCharsModel::embed_word("abc"), 1, 0), &model);
        commit(&storage, &mut tree, ElementWidth::F32);

        let mut column = open(&storage, ElementWidth::F32);
        let query = BagOfCharsModel::embed_word("abc");
        assert!(column.closest_match_in_page(0, &query, &model).unwrap().is_some());
        assert!(matches!(
            column.closest_match_in_page(1, &query, &model),
            Err(FoliumError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_better_page_replaces_running_best() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let model = BagOfCharsModel::new();

        for (doc, word) in [(1u64, "searching"), (2, "search")] {
            let mut tree = VectorTree::new(0);
            tree.insert(VectorNode::with_doc_id(BagOfCharsModel::embed_word(word), doc, 0), &model);
            commit(&storage, &mut tree, ElementWidth::F32);
        }

        let mut column = open(&storage, ElementWidth::F32);
        let hit = column
            .closest_match_scanning_all_pages(&BagOfCharsModel::embed_word("search"), &model)
            .unwrap()
            .unwrap();
        assert_eq!(hit.page, 1);
        assert_eq!(hit.postings_offsets.len(), 1);
        assert_eq!(doc_ids(&storage, &hit), vec![2]);
    }

    #[test]
    fn test_unrelated_query_has_no_hit() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let model = BagOfCharsModel::new();
        let mut tree = VectorTree::new(0);
        tree.insert(VectorNode::with_doc_id(BagOfCharsModel::embed_word("abc"), 1, 0), &model);
        commit(&storage, &mut tree, ElementWidth::F32);

        let mut column = open(&storage, ElementWidth::F32);
        assert!(column
            .closest_match_scanning_all_pages(&BagOfCharsModel::embed_word("xyz"), &model)
            .unwrap()
            .is_none());
        assert!(column
            .closest_match_scanning_all_pages(&SparseVector::empty(), &model)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_empty_tree_registers_no_page() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let mut tree = VectorTree::new(0);
        let stats = commit(&storage, &mut tree, ElementWidth::F32);
        assert_eq!(stats, PageStats::default());
        assert!(read_page_index(storage.as_ref(), IXTP).unwrap().is_empty());
    }

    #[test]
    fn test_missing_vector_stream() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let model = BagOfCharsModel::new();
        let mut tree = VectorTree::new(0);
        tree.insert(VectorNode::with_doc_id(BagOfCharsModel::embed_word("abc"), 1, 0), &model);
        commit(&storage, &mut tree, ElementWidth::F32);
        storage.delete_file(VEC).unwrap();

        assert!(matches!(
            ColumnReader::open(storage.as_ref(), 0, IX, VEC, IXTP, ElementWidth::F32),
            Err(FoliumError::MissingDependency(_))
        ));
    }

    #[test]
    fn test_page_past_end_of_stream() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let mut page_index = PageIndexWriter::new(storage.create_output(IXTP).unwrap()).unwrap();
        page_index.put(Page { offset: 0, length: BLOCK_SIZE }).unwrap();
        page_index.close().unwrap();
        storage.create_output(IX).unwrap().close().unwrap();
        storage.create_output(VEC).unwrap().close().unwrap();

        assert!(matches!(
            ColumnReader::open(storage.as_ref(), 0, IX, VEC, IXTP, ElementWidth::F32),
            Err(FoliumError::Corruption(_))
        ));
    }
}
