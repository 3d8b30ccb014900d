//! Closest-match scans over committed pages.

use log::debug;

use crate::column::block::{NodeBlock, Terminator, BLOCK_SIZE};
use crate::column::page::{read_page_index, Page};
use crate::error::{FoliumError, Result};
use crate::model::{AngleBand, Model};
use crate::storage::{Storage, StorageInput, StructReader};
use crate::vector::{approximates, ElementWidth, SparseVector};

/// Best match found by a scan.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    /// Cosine angle between the query and the matched vector.
    pub score: f64,
    /// Postings heads of the matched vector and every vector tying with it.
    pub postings_offsets: Vec<u64>,
    /// Offset of the first matched vector in the vector stream.
    pub vector_offset: u64,
    /// Page the first matched vector was found in.
    pub page: usize,
}

impl Hit {
    fn from_block(score: f64, block: &NodeBlock, page: usize) -> Self {
        Hit {
            score,
            postings_offsets: block.postings_offset.into_iter().collect(),
            vector_offset: block.vector_offset,
            page,
        }
    }

    fn absorb_offsets(&mut self, offsets: impl IntoIterator<Item = u64>) {
        for offset in offsets {
            if !self.postings_offsets.contains(&offset) {
                self.postings_offsets.push(offset);
            }
        }
    }

    /// Fold a hit from another page into a running best: a tie adds its
    /// postings, a better score replaces it.
    pub fn merge_into(running: &mut Option<Hit>, hit: Hit) {
        if hit.score <= 0.0 {
            return;
        }
        match running {
            Some(best) if approximates(hit.score, best.score) => {
                best.absorb_offsets(hit.postings_offsets)
            }
            Some(best) if hit.score < best.score => {}
            _ => *running = Some(hit),
        }
    }
}

/// Reads the pages of one column.
///
/// Scans seek inside the index and vector streams, so a reader is used by
/// one caller at a time.
#[derive(Debug)]
pub struct ColumnReader {
    key_id: u64,
    pages: Vec<Page>,
    index: StructReader<Box<dyn StorageInput>>,
    vectors: StructReader<Box<dyn StorageInput>>,
    width: ElementWidth,
    pages_scanned: usize,
}

impl ColumnReader {
    /// Build a reader over already opened streams.
    pub fn new(
        key_id: u64,
        pages: Vec<Page>,
        index_input: Box<dyn StorageInput>,
        vector_input: Box<dyn StorageInput>,
        width: ElementWidth,
    ) -> Result<Self> {
        let index = StructReader::new(index_input)?;
        if let Some(page) = pages.iter().find(|p| p.end() > index.size()) {
            return Err(FoliumError::corruption(format!(
                "page at {} ends at {} but the index stream of key {key_id} has {} bytes",
                page.offset,
                page.end(),
                index.size()
            )));
        }

        Ok(Self {
            key_id,
            pages,
            index,
            vectors: StructReader::new(vector_input)?,
            width,
            pages_scanned: 0,
        })
    }

    /// Open the three streams of a column.
    pub fn open(
        storage: &dyn Storage,
        key_id: u64,
        index_name: &str,
        vector_name: &str,
        page_index_name: &str,
        width: ElementWidth,
    ) -> Result<Self> {
        let pages = read_page_index(storage, page_index_name)?;
        Self::new(
            key_id,
            pages,
            storage.open_input(index_name)?,
            storage.open_input(vector_name)?,
            width,
        )
    }

    pub fn key_id(&self) -> u64 {
        self.key_id
    }

    /// Committed pages, in append order.
    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    /// Number of pages inspected by the last scan.
    pub fn pages_scanned(&self) -> usize {
        self.pages_scanned
    }

    /// Best match over every page. Ties across pages accumulate postings.
    pub fn closest_match_scanning_all_pages(
        &mut self,
        query: &SparseVector,
        model: &dyn Model,
    ) -> Result<Option<Hit>> {
        self.scan(query, model, false)
    }

    /// Like [`ColumnReader::closest_match_scanning_all_pages`] but stops at
    /// the first page holding an identical vector.
    pub fn closest_match_stopping_at_first_identical_page(
        &mut self,
        query: &SparseVector,
        model: &dyn Model,
    ) -> Result<Option<Hit>> {
        self.scan(query, model, true)
    }

    fn scan(
        &mut self,
        query: &SparseVector,
        model: &dyn Model,
        stop_at_identical: bool,
    ) -> Result<Option<Hit>> {
        let mut best: Option<Hit> = None;
        self.pages_scanned = 0;

        for page_no in 0..self.pages.len() {
            self.pages_scanned += 1;
            if let Some(hit) = self.closest_match_in_page(page_no, query, model)? {
                Hit::merge_into(&mut best, hit);
            }
            if stop_at_identical
                && best
                    .as_ref()
                    .is_some_and(|hit| hit.score >= model.identical_angle())
            {
                break;
            }
        }

        debug!(
            "key {}: scanned {} of {} pages, best {:?}",
            self.key_id,
            self.pages_scanned,
            self.pages.len(),
            best.as_ref().map(|hit| hit.score)
        );
        Ok(best)
    }

    /// Walk one page the way an insert would, tracking the best score.
    ///
    /// A `page_no` past the last committed page is `InvalidArgument`.
    pub fn closest_match_in_page(
        &mut self,
        page_no: usize,
        query: &SparseVector,
        model: &dyn Model,
    ) -> Result<Option<Hit>> {
        let Some(&page) = self.pages.get(page_no) else {
            return Err(FoliumError::invalid_argument(format!(
                "page {page_no} out of range: key {} has {} pages",
                self.key_id,
                self.pages.len()
            )));
        };
        if page.length == 0 {
            return Ok(None);
        }

        let mut best: Option<Hit> = None;
        self.index.seek(page.offset)?;

        loop {
            let block = self.read_block(&page)?;
            let vector = SparseVector::read_at(
                &mut self.vectors,
                block.vector_offset,
                block.component_count as usize,
                self.width,
            )?;
            let angle = model.cos_angle(query, &vector);
            let best_score = best.as_ref().map(|hit| hit.score).unwrap_or(0.0);

            match model.band(angle) {
                AngleBand::Identical => {
                    best = Some(Hit::from_block(angle, &block, page_no));
                    break;
                }
                AngleBand::FoldLeft => {
                    if angle > best_score {
                        best = Some(Hit::from_block(angle, &block, page_no));
                    }
                    if !block.terminator.has_left() {
                        break;
                    }
                }
                AngleBand::FoldRight => {
                    let ties = best
                        .as_ref()
                        .is_some_and(|hit| approximates(angle, hit.score));
                    if ties {
                        if let Some(hit) = best.as_mut() {
                            hit.absorb_offsets(block.postings_offset);
                        }
                    } else if angle > best_score {
                        best = Some(Hit::from_block(angle, &block, page_no));
                    }

                    match block.terminator {
                        Terminator::RightOnly => {}
                        Terminator::Both => {
                            let left = self.read_block(&page)?;
                            self.index.skip(left.weight * BLOCK_SIZE)?;
                        }
                        Terminator::LeftOnly | Terminator::Leaf => break,
                    }
                }
            }
        }

        Ok(best)
    }

    fn read_block(&mut self, page: &Page) -> Result<NodeBlock> {
        if self.index.position() + BLOCK_SIZE > page.end() {
            return Err(FoliumError::corruption(format!(
                "node block at {} runs past the end of page {}..{}",
                self.index.position(),
                page.offset,
                page.end()
            )));
        }
        NodeBlock::read_from(&mut self.index)
    }
}
