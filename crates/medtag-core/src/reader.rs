//! # The Corpus Reader Contract
//!
//! The reader turns raw text and corpus files into padded numeric
//! matrices, owns the tag vocabulary, and decodes per-timestep
//! probability rows back into tag labels. The extractor is generic over
//! this trait so feature extraction stays outside the tagging engine.
//!
//! All matrices use PRE-padding: real tokens occupy the tail of each
//! padded row, so truncating a decoded sequence to an example's token
//! count keeps its last positions.

use std::path::Path;

use candle_core::{Device, Tensor};

use crate::error::{MedtagError, Result};
use crate::tags::TagVocabulary;

/// Dense word-embedding lookup table.
///
/// Row 0 is the zero vector reserved for padding and unknown tokens.
#[derive(Debug, Clone)]
pub struct EmbeddingTable {
    data: Vec<f32>,
    rows: usize,
    dim: usize,
}

impl EmbeddingTable {
    /// Build a table from a flat row-major buffer.
    pub fn new(data: Vec<f32>, rows: usize, dim: usize) -> Result<Self> {
        if data.len() != rows * dim {
            return Err(MedtagError::EmbeddingTable(format!(
                "expected {} values for {} rows of dimension {}, got {}",
                rows * dim,
                rows,
                dim,
                data.len()
            )));
        }
        Ok(Self { data, rows, dim })
    }

    /// Number of rows, the zero padding row included.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Vector dimension.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Materialize the table as a `[rows, dim]` tensor.
    pub fn to_tensor(&self, device: &Device) -> Result<Tensor> {
        Ok(Tensor::from_vec(
            self.data.clone(),
            (self.rows, self.dim),
            device,
        )?)
    }
}

/// Padded token-index features, examples by sequence length.
///
/// Each value indexes a row of the embedding table; the dense feature
/// axis materializes inside the model's embedding layer.
#[derive(Debug, Clone, Default)]
pub struct FeatureMatrix {
    pub rows: Vec<Vec<u32>>,
}

impl FeatureMatrix {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Padded sequence length, zero for an empty matrix.
    pub fn seq_len(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }
}

/// One-hot gold tags, examples by sequence length by vocabulary size.
#[derive(Debug, Clone, Default)]
pub struct TagMatrix {
    pub rows: Vec<Vec<Vec<f32>>>,
}

impl TagMatrix {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Collapse one-hot rows to per-timestep class indices.
    pub fn class_indices(&self) -> Vec<Vec<u32>> {
        self.rows
            .iter()
            .map(|example| {
                example
                    .iter()
                    .map(|row| {
                        row.iter()
                            .enumerate()
                            .max_by(|(_, a), (_, b)| {
                                a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal)
                            })
                            .map(|(i, _)| i as u32)
                            .unwrap_or(0)
                    })
                    .collect()
            })
            .collect()
    }
}

/// Features plus the original word sequences for unlabeled input.
#[derive(Debug, Clone, Default)]
pub struct UnlabeledBatch {
    pub features: FeatureMatrix,
    /// The words of each example, aligned with the padded tail.
    pub word_sequences: Vec<Vec<String>>,
    /// Real (unpadded) token count per example.
    pub token_counts: Vec<usize>,
}

/// Features, gold tags, and token bookkeeping for a labeled test corpus.
#[derive(Debug, Clone, Default)]
pub struct LabeledTestSet {
    pub features: FeatureMatrix,
    pub tags: TagMatrix,
    pub token_sequences: Vec<Vec<String>>,
    pub token_counts: Vec<usize>,
}

/// The capability set the extractor requires of its reader collaborator.
pub trait CorpusReader {
    /// Load the word-embedding lookup table, registering its word indices.
    fn load_embedding_table(&mut self, path: &Path) -> Result<EmbeddingTable>;

    /// Parse a labeled training corpus into feature and tag matrices,
    /// extending the tag vocabulary with any unseen tags. When
    /// `resources_out` is given, the reader writes its derived resources
    /// (the tag map) there.
    fn training_matrices(
        &mut self,
        path: &Path,
        resources_out: Option<&Path>,
    ) -> Result<(FeatureMatrix, TagMatrix)>;

    /// Parse a labeled test corpus. Tags absent from the vocabulary are
    /// an error; the vocabulary is fixed once the output layer is sized.
    fn test_matrices(&self, path: &Path) -> Result<LabeledTestSet>;

    /// Feature vectors for pre-tokenized records.
    fn unlabeled_from_records(&self, records: &[Vec<String>]) -> Result<UnlabeledBatch>;

    /// Feature vectors for an in-memory list of raw texts.
    fn unlabeled_from_texts(&self, texts: &[String]) -> Result<UnlabeledBatch>;

    /// Feature vectors for a file of raw texts, one per line.
    fn unlabeled_from_file(&self, path: &Path) -> Result<UnlabeledBatch>;

    /// Decode per-timestep probability rows into tag labels.
    fn decode_tag_sequence(&self, probs: &[Vec<f32>]) -> Vec<String>;

    /// The tag vocabulary, exposed for output ordering.
    fn tag_vocabulary(&self) -> &TagVocabulary;
}
