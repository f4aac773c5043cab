//! # Medtag
//!
//! Biomedical named-entity tagging: a recurrent tagger over pre-trained
//! word embeddings, with training, batch/file prediction, and
//! evaluation against labeled corpora.
//!
//! This facade re-exports the core engine and the bundled corpus
//! reader; the `medtag-trainer` crate additionally ships the `train`,
//! `evaluate`, and `predict` binaries.

pub use medtag_core::{
    CorpusReader, EVAL_BATCH_SIZE, EmbeddingTable, EntityExtractor, Evaluation, FeatureMatrix,
    LabeledTestSet, MedtagError, ModelConfig, NetworkType, PAD_TAG, Result, SequenceTagger,
    TagMatrix, TagVocabulary, TrainParams, UnlabeledBatch, remap_for_scoring,
};
pub use medtag_core::{ClassMetrics, ClassificationReport, ConfusionMatrix};
pub use medtag_trainer::{DEFAULT_MAX_SEQ_LEN, TsvReader};
