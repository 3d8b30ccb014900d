//! Sparse vectors and their binary codec.
//!
//! A [`SparseVector`] maps dimension indices to weights. Components are kept
//! sorted by index so dot products are a linear merge. The serialized form is
//!
//! ```text
//! componentCount:i32 | index:i32 * componentCount | value:(f32|f64) * componentCount
//! ```
//!
//! where the value width is a collection-level [`ElementWidth`].

use std::cmp::Ordering;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{FoliumError, Result};
use crate::storage::{StorageInput, StorageOutput, StructReader, StructWriter};

/// Two angle scores closer than this are treated as a tie.
pub const SCORE_EPSILON: f64 = 1e-6;

/// Whether two scores tie within [`SCORE_EPSILON`].
pub fn approximates(a: f64, b: f64) -> bool {
    (a - b).abs() < SCORE_EPSILON
}

/// Width of the serialized component values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ElementWidth {
    /// 4-byte IEEE floats.
    #[default]
    F32,
    /// 8-byte IEEE floats.
    F64,
}

impl ElementWidth {
    /// Size of one serialized value in bytes.
    pub fn size(&self) -> usize {
        match self {
            ElementWidth::F32 => 4,
            ElementWidth::F64 => 8,
        }
    }

    /// Serialized size of a vector with `components` components.
    pub fn serialized_len(&self, components: usize) -> u64 {
        (4 + components * (4 + self.size())) as u64
    }
}

/// A sparse vector with components sorted by dimension index.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SparseVector {
    indices: Vec<u32>,
    values: Vec<f32>,
}

impl SparseVector {
    /// The empty vector. Used as the root sentinel of every tree.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a vector from `(index, value)` pairs.
    ///
    /// Pairs are sorted; values for a repeated index are summed and exact
    /// zeros are dropped.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (u32, f32)>,
    {
        let mut pairs: Vec<(u32, f32)> = pairs.into_iter().collect();
        pairs.sort_by_key(|(index, _)| *index);

        let mut indices: Vec<u32> = Vec::with_capacity(pairs.len());
        let mut values: Vec<f32> = Vec::with_capacity(pairs.len());
        for (index, value) in pairs {
            match indices.last() {
                Some(&last) if last == index => {
                    if let Some(v) = values.last_mut() {
                        *v += value;
                    }
                }
                _ => {
                    indices.push(index);
                    values.push(value);
                }
            }
        }

        let (indices, values) = indices
            .into_iter()
            .zip(values)
            .filter(|(_, v)| *v != 0.0)
            .unzip();
        Self { indices, values }
    }

    /// Build a vector from parallel index and value arrays.
    ///
    /// The indices must be strictly increasing.
    pub fn from_parts(indices: Vec<u32>, values: Vec<f32>) -> Result<Self> {
        if indices.len() != values.len() {
            return Err(FoliumError::invalid_argument(format!(
                "index array has {} entries but value array has {}",
                indices.len(),
                values.len()
            )));
        }
        if indices.windows(2).any(|w| w[0] >= w[1]) {
            return Err(FoliumError::invalid_argument(
                "vector indices must be strictly increasing",
            ));
        }
        Ok(Self { indices, values })
    }

    /// Number of stored components.
    pub fn component_count(&self) -> usize {
        self.indices.len()
    }

    /// Whether this is the empty (sentinel) vector.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Dimension indices, ascending.
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Component values, parallel to [`SparseVector::indices`].
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Iterate over `(index, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (u32, f32)> + '_ {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }

    /// Euclidean norm.
    pub fn norm(&self) -> f64 {
        self.values
            .iter()
            .map(|v| (*v as f64) * (*v as f64))
            .sum::<f64>()
            .sqrt()
    }

    /// Dot product with another sparse vector.
    pub fn dot(&self, other: &SparseVector) -> f64 {
        let (mut i, mut j) = (0, 0);
        let mut sum = 0.0f64;
        while i < self.indices.len() && j < other.indices.len() {
            match self.indices[i].cmp(&other.indices[j]) {
                Ordering::Less => i += 1,
                Ordering::Greater => j += 1,
                Ordering::Equal => {
                    sum += self.values[i] as f64 * other.values[j] as f64;
                    i += 1;
                    j += 1;
                }
            }
        }
        sum
    }

    /// Cosine of the angle between two vectors.
    ///
    /// Defined as 0 when either side is empty or has zero norm, so the empty
    /// root sentinel never matches anything.
    pub fn cos_angle(&self, other: &SparseVector) -> f64 {
        let denominator = self.norm() * other.norm();
        if denominator == 0.0 {
            return 0.0;
        }
        (self.dot(other) / denominator).clamp(-1.0, 1.0)
    }

    /// Serialize into a vector stream, returning the number of bytes written.
    pub fn write_to<W: StorageOutput>(
        &self,
        writer: &mut StructWriter<W>,
        width: ElementWidth,
    ) -> Result<u64> {
        let start = writer.position();
        writer.write_i32(self.component_count() as i32)?;
        for index in &self.indices {
            writer.write_i32(*index as i32)?;
        }
        for value in &self.values {
            match width {
                ElementWidth::F32 => writer.write_f32(*value)?,
                ElementWidth::F64 => writer.write_f64(*value as f64)?,
            }
        }
        Ok(writer.position() - start)
    }

    /// Deserialize from the reader's current position.
    pub fn read_from<R: StorageInput>(
        reader: &mut StructReader<R>,
        width: ElementWidth,
    ) -> Result<Self> {
        let count = reader.read_i32()?;
        if count < 0 {
            return Err(FoliumError::corruption(format!(
                "negative component count {count} at offset {}",
                reader.position() - 4
            )));
        }
        reader.ensure_records(count as u64, 4 + width.size() as u64)?;
        let count = count as usize;

        let mut indices = Vec::with_capacity(count);
        for _ in 0..count {
            indices.push(reader.read_i32()? as u32);
        }
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            let value = match width {
                ElementWidth::F32 => reader.read_f32()?,
                ElementWidth::F64 => reader.read_f64()? as f32,
            };
            values.push(value);
        }

        Self::from_parts(indices, values)
            .map_err(|e| FoliumError::corruption(format!("malformed vector: {e}")))
    }

    /// Deserialize the vector stored at `offset`, checking its component count.
    pub fn read_at<R: StorageInput>(
        reader: &mut StructReader<R>,
        offset: u64,
        expected_components: usize,
        width: ElementWidth,
    ) -> Result<Self> {
        reader.seek(offset)?;
        let vector = Self::read_from(reader, width)?;
        if vector.component_count() != expected_components {
            return Err(FoliumError::corruption(format!(
                "vector at offset {offset} has {} components, index block says {expected_components}",
                vector.component_count()
            )));
        }
        Ok(vector)
    }
}

impl FromIterator<(u32, f32)> for SparseVector {
    fn from_iter<T: IntoIterator<Item = (u32, f32)>>(iter: T) -> Self {
        Self::from_pairs(iter)
    }
}
