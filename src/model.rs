//! Embedding models.
//!
//! A [`Model`] turns a field value into one or more sparse vectors and owns
//! the two angle thresholds that drive the vector tree:
//!
//! | band | condition | tree action |
//! |------|-----------|-------------|
//! | identical | `angle >= identical_angle` | merge into the existing node |
//! | fold left | `fold_angle < angle < identical_angle` | descend left |
//! | fold right | `angle <= fold_angle` | descend right |
//!
//! [`BagOfCharsModel`] is the stock text model: one vector per word, each
//! vector counting the word's characters.

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use crate::error::{FoliumError, Result};
use crate::vector::SparseVector;

/// Which side of the thresholds an angle falls on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AngleBand {
    /// Same vector for indexing purposes.
    Identical,
    /// Related: route left.
    FoldLeft,
    /// Unrelated: route right.
    FoldRight,
}

/// Thresholds shared by every model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Angle at or above which two vectors are the same entry.
    pub identical_angle: f64,
    /// Angle above which a comparison is routed left.
    pub fold_angle: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            identical_angle: 0.998,
            fold_angle: 0.55,
        }
    }
}

impl ModelConfig {
    /// Reject thresholds that would make the bands overlap.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.identical_angle) {
            return Err(FoliumError::invalid_argument(format!(
                "identical_angle {} is outside [0, 1]",
                self.identical_angle
            )));
        }
        if !(self.fold_angle >= 0.0 && self.fold_angle < self.identical_angle) {
            return Err(FoliumError::invalid_argument(format!(
                "fold_angle {} must be in [0, identical_angle {})",
                self.fold_angle, self.identical_angle
            )));
        }
        Ok(())
    }
}

/// Embedding and comparison capability consumed by the index.
pub trait Model: Send + Sync + std::fmt::Debug {
    /// Embed a value into zero or more vectors.
    fn embed(&self, value: &str) -> Result<Vec<SparseVector>>;

    /// Identical-angle threshold.
    fn identical_angle(&self) -> f64;

    /// Fold-angle threshold.
    fn fold_angle(&self) -> f64;

    /// Model name, used in logs.
    fn name(&self) -> &str;

    /// Cosine angle between two vectors.
    fn cos_angle(&self, a: &SparseVector, b: &SparseVector) -> f64 {
        a.cos_angle(b)
    }

    /// Classify an angle into exactly one band.
    fn band(&self, angle: f64) -> AngleBand {
        if angle >= self.identical_angle() {
            AngleBand::Identical
        } else if angle > self.fold_angle() {
            AngleBand::FoldLeft
        } else {
            AngleBand::FoldRight
        }
    }
}

/// Text model embedding each word as a bag of its characters.
#[derive(Debug, Clone)]
pub struct BagOfCharsModel {
    config: ModelConfig,
}

impl BagOfCharsModel {
    /// Create a model with default thresholds.
    pub fn new() -> Self {
        Self {
            config: ModelConfig::default(),
        }
    }

    /// Create a model with explicit thresholds.
    pub fn with_config(config: ModelConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Embed a single word.
    pub fn embed_word(word: &str) -> SparseVector {
        word.chars().map(|c| (c as u32, 1.0f32)).collect()
    }
}

impl Default for BagOfCharsModel {
    fn default() -> Self {
        Self::new()
    }
}

impl Model for BagOfCharsModel {
    fn embed(&self, value: &str) -> Result<Vec<SparseVector>> {
        let lowered = value.to_lowercase();
        let mut words: Vec<&str> = lowered.unicode_words().collect();
        words.sort_unstable();
        words.dedup();

        Ok(words.into_iter().map(Self::embed_word).collect())
    }

    fn identical_angle(&self) -> f64 {
        self.config.identical_angle
    }

    fn fold_angle(&self) -> f64 {
        self.config.fold_angle
    }

    fn name(&self) -> &str {
        "bag-of-chars"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        assert!(ModelConfig::default().validate().is_ok());

        let overlapping = ModelConfig {
            identical_angle: 0.5,
            fold_angle: 0.5,
        };
        assert!(matches!(
            overlapping.validate(),
            Err(FoliumError::InvalidArgument(_))
        ));

        let out_of_range = ModelConfig {
            identical_angle: 1.5,
            fold_angle: 0.2,
        };
        assert!(out_of_range.validate().is_err());
    }

    #[test]
    fn test_bands_partition() {
        let model = BagOfCharsModel::new();
        let mut angle = -1.0;
        while angle <= 1.0 {
            let band = model.band(angle);
            let expected = if angle >= model.identical_angle() {
                AngleBand::Identical
            } else if angle > model.fold_angle() {
                AngleBand::FoldLeft
            } else {
                AngleBand::FoldRight
            };
            assert_eq!(band, expected);
            angle += 0.001;
        }
        assert_eq!(model.band(model.fold_angle()), AngleBand::FoldRight);
        assert_eq!(model.band(model.identical_angle()), AngleBand::Identical);
    }

    #[test]
    fn test_embed_words() {
        let model = BagOfCharsModel::new();
        let vectors = model.embed("Hello, hello world!").unwrap();
        assert_eq!(vectors.len(), 2);

        let hello = BagOfCharsModel::embed_word("hello");
        assert_eq!(hello.component_count(), 4);
        assert!(vectors.contains(&hello));
        assert!(model.embed("  ...  ").unwrap().is_empty());
    }

    #[test]
    fn test_identical_words_are_identical() {
        let model = BagOfCharsModel::new();
        let a = BagOfCharsModel::embed_word("search");
        let b = BagOfCharsModel::embed_word("search");
        let c = BagOfCharsModel::embed_word("engine");
        assert_eq!(model.band(model.cos_angle(&a, &b)), AngleBand::Identical);
        assert_ne!(model.band(model.cos_angle(&a, &c)), AngleBand::Identical);
    }
}
