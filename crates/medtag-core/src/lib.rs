//! # Medtag Core
//!
//! Recurrent sequence tagging for biomedical named-entity recognition.
//! An [`extractor::EntityExtractor`] orchestrates a frozen-embedding
//! LSTM tagger over a [`reader::CorpusReader`] collaborator that owns
//! feature extraction, the tag vocabulary, and label decoding.
//!
//! ## Quick Start
//!
//! ```rust
//! use medtag_core::tags::{TagVocabulary, remap_for_scoring};
//!
//! let mut vocab = TagVocabulary::new();
//! vocab.insert("O");
//! vocab.insert("B-Chemical");
//!
//! assert_eq!(vocab.index_of("B-Chemical"), Some(2));
//! assert_eq!(remap_for_scoring("B-Chemical"), "B-Drug");
//! ```
pub mod error;
pub mod extractor;
pub mod metrics;
pub mod model;
pub mod reader;
pub mod tags;

// Re-export primary API
pub use error::{MedtagError, Result};
pub use extractor::{EVAL_BATCH_SIZE, EntityExtractor, Evaluation, TrainParams};
pub use metrics::{ClassMetrics, ClassificationReport, ConfusionMatrix};
pub use model::{ModelConfig, NetworkType, SequenceTagger};
pub use reader::{
    CorpusReader, EmbeddingTable, FeatureMatrix, LabeledTestSet, TagMatrix, UnlabeledBatch,
};
pub use tags::{PAD_TAG, TagVocabulary, remap_for_scoring};
