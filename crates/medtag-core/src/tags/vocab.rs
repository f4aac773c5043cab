//! # Tag Vocabulary
//!
//! Ordered mapping between tag names and output-layer indices.
//! Index 0 is always the padding sentinel; the remaining indices follow
//! insertion order, which fixes the ordering of the model's final layer
//! and of every confusion matrix built from it.

use std::collections::HashMap;

use crate::error::{MedtagError, Result};

/// Padding sentinel tag assigned to pre-padded positions.
pub const PAD_TAG: &str = "NONE";

/// The tag vocabulary owned by a corpus reader.
///
/// The vocabulary used at decode time must match the one that fixed the
/// model's output-layer size at train time; this is not validated here.
#[derive(Debug, Clone)]
pub struct TagVocabulary {
    tags: Vec<String>,
    index: HashMap<String, usize>,
}

impl TagVocabulary {
    /// Create a vocabulary containing only the padding sentinel.
    pub fn new() -> Self {
        let mut vocab = Self {
            tags: Vec::new(),
            index: HashMap::new(),
        };
        vocab.insert(PAD_TAG);
        vocab
    }

    /// Insert a tag, returning its index. Existing tags keep their index.
    pub fn insert(&mut self, tag: &str) -> usize {
        if let Some(&idx) = self.index.get(tag) {
            return idx;
        }
        let idx = self.tags.len();
        self.tags.push(tag.to_string());
        self.index.insert(tag.to_string(), idx);
        idx
    }

    /// Look up the index of a tag.
    pub fn index_of(&self, tag: &str) -> Option<usize> {
        self.index.get(tag).copied()
    }

    /// Look up the tag at an index.
    pub fn tag_at(&self, idx: usize) -> Option<&str> {
        self.tags.get(idx).map(String::as_str)
    }

    /// Number of distinct tags, padding sentinel included.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// All tags in index order.
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// One-hot row for a tag, sized to the current vocabulary.
    pub fn one_hot(&self, tag: &str) -> Result<Vec<f32>> {
        let idx = self
            .index_of(tag)
            .ok_or_else(|| MedtagError::UnknownTag(tag.to_string()))?;
        let mut row = vec![0.0; self.tags.len()];
        row[idx] = 1.0;
        Ok(row)
    }

    /// Decode one probability row to its argmax tag.
    pub fn decode_row(&self, probs: &[f32]) -> &str {
        let argmax = probs
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i)
            .unwrap_or(0);
        self.tag_at(argmax).unwrap_or(PAD_TAG)
    }

    /// Decode a sequence of probability rows to tag names.
    ///
    /// One-hot gold rows decode the same way, their argmax being the set bit.
    pub fn decode_sequence(&self, probs: &[Vec<f32>]) -> Vec<String> {
        probs
            .iter()
            .map(|row| self.decode_row(row).to_string())
            .collect()
    }
}

impl Default for TagVocabulary {
    fn default() -> Self {
        Self::new()
    }
}
