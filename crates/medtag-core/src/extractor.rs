//! # Entity Extractor
//!
//! Orchestrates training, prediction, and evaluation of the recurrent
//! tagger. Data preparation and tag decoding are delegated to the
//! corpus reader; the extractor owns the model lifecycle and the
//! evaluation bookkeeping.
//!
//! The extractor starts uninitialized; `train` or `load` installs a
//! model (replacing any previous one), after which prediction,
//! evaluation, saving, and the summary become available. Operations are
//! synchronous and block until complete; any error aborts the whole
//! call with no partial results.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use candle_core::Device;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{MedtagError, Result};
use crate::metrics::{ClassificationReport, ConfusionMatrix};
use crate::model::{ModelConfig, NetworkType, SequenceTagger};
use crate::reader::{CorpusReader, EmbeddingTable, UnlabeledBatch};
use crate::tags::{PAD_TAG, remap_for_scoring};

/// Examples per forward pass during evaluation.
pub const EVAL_BATCH_SIZE: usize = 500;

/// Progress-log cadence for record-frame prediction.
const RECORD_LOG_EVERY: usize = 100;
/// Progress-log cadence for text-list and file prediction.
const TEXT_LOG_EVERY: usize = 500;

/// Training hyperparameters.
#[derive(Debug, Clone)]
pub struct TrainParams {
    pub network_type: NetworkType,
    pub num_epochs: usize,
    pub batch_size: usize,
    pub dropout: f32,
    /// Weight-decay strength for the optimizer.
    pub reg_alpha: f32,
    pub num_hidden_units: usize,
    pub num_layers: usize,
}

impl Default for TrainParams {
    fn default() -> Self {
        Self {
            network_type: NetworkType::Unidirectional,
            num_epochs: 1,
            batch_size: 50,
            dropout: 0.2,
            reg_alpha: 0.0,
            num_hidden_units: 150,
            num_layers: 1,
        }
    }
}

/// Aggregate scores produced by [`EntityExtractor::evaluate`].
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub report: ClassificationReport,
    pub confusion: ConfusionMatrix,
}

/// Sequence-tagging orchestrator, generic over its reader collaborator.
///
/// Not designed for concurrent use; a second caller must wait or use a
/// separate instance.
pub struct EntityExtractor<R: CorpusReader> {
    reader: R,
    embeddings: EmbeddingTable,
    model: Option<SequenceTagger>,
    device: Device,
}

impl<R: CorpusReader> EntityExtractor<R> {
    /// Construct with a reader and the path to its embedding table.
    pub fn new(mut reader: R, embeddings_file: &Path) -> Result<Self> {
        let embeddings = reader.load_embedding_table(embeddings_file)?;
        info!(
            rows = embeddings.rows(),
            dim = embeddings.dim(),
            "embedding table loaded"
        );
        Ok(Self {
            reader,
            embeddings,
            model: None,
            device: Device::Cpu,
        })
    }

    /// The reader collaborator.
    pub fn reader(&self) -> &R {
        &self.reader
    }

    fn model(&self) -> Result<&SequenceTagger> {
        self.model.as_ref().ok_or(MedtagError::ModelNotInitialized)
    }

    /// Train a new model on a labeled corpus, replacing any existing one.
    ///
    /// When `resources_out` is given, the reader writes its derived
    /// resources (the tag map) there while parsing the corpus.
    pub fn train(
        &mut self,
        train_file: &Path,
        resources_out: Option<&Path>,
        params: &TrainParams,
    ) -> Result<()> {
        let (features, tags) = self.reader.training_matrices(train_file, resources_out)?;
        info!(
            examples = features.len(),
            seq_len = features.seq_len(),
            tags = self.reader.tag_vocabulary().len(),
            "training data prepared"
        );

        let config = ModelConfig {
            network_type: params.network_type,
            num_layers: params.num_layers,
            num_hidden_units: params.num_hidden_units,
            dropout: params.dropout,
            max_seq_len: features.seq_len(),
            num_tags: self.reader.tag_vocabulary().len(),
            embedding_rows: self.embeddings.rows(),
            embedding_dim: self.embeddings.dim(),
        };
        let mut model = SequenceTagger::new(&self.embeddings, config, &self.device)?;
        info!("model built\n{}", model.summary());

        let targets = tags.class_indices();
        model.fit(
            &features,
            &targets,
            params.num_epochs,
            params.batch_size,
            params.reg_alpha,
        )?;
        self.model = Some(model);
        Ok(())
    }

    /// Tag pre-tokenized records.
    pub fn predict_records(&self, records: &[Vec<String>]) -> Result<Vec<String>> {
        let batch = self.reader.unlabeled_from_records(records)?;
        self.predict_batch(batch, RECORD_LOG_EVERY)
    }

    /// Tag an in-memory list of raw texts.
    pub fn predict_texts(&self, texts: &[String]) -> Result<Vec<String>> {
        let batch = self.reader.unlabeled_from_texts(texts)?;
        self.predict_batch(batch, TEXT_LOG_EVERY)
    }

    /// Tag a file of raw texts, one per line.
    pub fn predict_file(&self, path: &Path) -> Result<Vec<String>> {
        let batch = self.reader.unlabeled_from_file(path)?;
        self.predict_batch(batch, TEXT_LOG_EVERY)
    }

    /// Run per-example inference and serialize one token-to-tag map per
    /// example. Duplicate tokens within an example collapse, the last
    /// occurrence winning.
    fn predict_batch(&self, batch: UnlabeledBatch, log_every: usize) -> Result<Vec<String>> {
        let model = self.model()?;
        info!(
            examples = batch.features.len(),
            seq_len = batch.features.seq_len(),
            "tagging input"
        );

        let mut outputs = Vec::with_capacity(batch.features.len());
        for (ind, (row, (words, &count))) in batch
            .features
            .rows
            .iter()
            .zip(batch.word_sequences.iter().zip(&batch.token_counts))
            .enumerate()
        {
            let probs = model.predict_example(row)?;
            let decoded = self.reader.decode_tag_sequence(&probs);
            let tags = tail(&decoded, count);
            let words = tail(words, count);

            let mut map = serde_json::Map::new();
            for (word, tag) in words.iter().zip(tags) {
                map.insert(word.clone(), Value::String(tag.clone()));
            }
            outputs.push(serde_json::to_string(&map)?);

            if (ind + 1) % log_every == 0 {
                info!(tagged = ind + 1, "tagging progress");
            }
        }
        Ok(outputs)
    }

    /// Evaluate against a labeled corpus, writing one predicted tag per
    /// line to `output_file` with a blank line between examples.
    ///
    /// Scored sequences are remapped through [`remap_for_scoring`] and
    /// exclude positions whose gold tag is the padding sentinel; those
    /// positions still appear in the dump file.
    pub fn evaluate(&self, test_file: &Path, output_file: &Path) -> Result<Evaluation> {
        let model = self.model()?;
        let test = self.reader.test_matrices(test_file)?;
        info!(
            examples = test.features.len(),
            seq_len = test.features.seq_len(),
            "evaluating model"
        );

        let mut dump = BufWriter::new(File::create(output_file)?);
        let mut gold_flat: Vec<String> = Vec::new();
        let mut pred_flat: Vec<String> = Vec::new();

        let n = test.features.len();
        let mut start = 0;
        while start < n {
            let end = (start + EVAL_BATCH_SIZE).min(n);
            let probs = model.predict_probs(&test.features.rows[start..end])?;
            for (offset, example_probs) in probs.iter().enumerate() {
                let idx = start + offset;
                let count = test.token_counts[idx];
                let predicted = self.reader.decode_tag_sequence(example_probs);
                let gold = self.reader.decode_tag_sequence(&test.tags.rows[idx]);
                let predicted = tail(&predicted, count);
                let gold = tail(&gold, count);

                if predicted.len() != count || gold.len() != count {
                    warn!(
                        example = idx,
                        expected = count,
                        predicted = predicted.len(),
                        gold = gold.len(),
                        "decoded sequence length does not match token count"
                    );
                }

                for tag in predicted {
                    writeln!(dump, "{tag}")?;
                }
                writeln!(dump)?;

                for (g, p) in gold.iter().zip(predicted) {
                    if g == PAD_TAG {
                        continue;
                    }
                    gold_flat.push(remap_for_scoring(g).to_string());
                    pred_flat.push(remap_for_scoring(p).to_string());
                }
            }
            info!(processed = end, total = n, "evaluation progress");
            start = end;
        }
        dump.flush()?;

        let labels = self.scoring_labels(&gold_flat, &pred_flat);
        let report = ClassificationReport::compute(&gold_flat, &pred_flat, &labels);
        let confusion = ConfusionMatrix::from_pairs(&gold_flat, &pred_flat, &labels);
        info!("classification report\n{report}");
        Ok(Evaluation { report, confusion })
    }

    /// Score labels in vocabulary order: each vocabulary tag remapped,
    /// deduplicated, restricted to labels that occur; remapped labels
    /// outside the vocabulary follow in first-seen order.
    fn scoring_labels(&self, gold: &[String], predicted: &[String]) -> Vec<String> {
        let occurring: HashSet<&str> = gold
            .iter()
            .chain(predicted)
            .map(String::as_str)
            .collect();
        let mut labels: Vec<String> = Vec::new();
        for tag in self.reader.tag_vocabulary().tags() {
            let mapped = remap_for_scoring(tag);
            if occurring.contains(mapped) && !labels.iter().any(|l| l == mapped) {
                labels.push(mapped.to_string());
            }
        }
        for tag in gold.iter().chain(predicted) {
            if !labels.iter().any(|l| l == tag) {
                labels.push(tag.clone());
            }
        }
        labels
    }

    /// Persist the current model artifact to a directory.
    pub fn save(&self, dir: &Path) -> Result<()> {
        self.model()?.save(dir)?;
        info!(dir = %dir.display(), "model saved");
        Ok(())
    }

    /// Restore a model artifact, replacing any existing model.
    pub fn load(&mut self, dir: &Path) -> Result<()> {
        self.model = Some(SequenceTagger::load(dir, &self.embeddings, &self.device)?);
        info!(dir = %dir.display(), "model loaded");
        Ok(())
    }

    /// Human-readable layer listing of the current model.
    pub fn summary(&self) -> Result<String> {
        Ok(self.model()?.summary())
    }

    /// Write the tag vocabulary as `tag<TAB>index` lines.
    pub fn save_tag_map(&self, path: &Path) -> Result<()> {
        let mut f = BufWriter::new(File::create(path)?);
        for (index, tag) in self.reader.tag_vocabulary().tags().iter().enumerate() {
            writeln!(f, "{tag}\t{index}")?;
        }
        f.flush()?;
        Ok(())
    }
}

/// The last `n` elements of a slice, the whole slice when shorter.
fn tail<T>(xs: &[T], n: usize) -> &[T] {
    &xs[xs.len().saturating_sub(n)..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{FeatureMatrix, LabeledTestSet, TagMatrix};
    use crate::tags::TagVocabulary;
    use std::io::Write as _;

    /// Minimal in-memory reader: fixed vocabulary, token ids hashed from
    /// the word list, whitespace tokenization, pre-padding to a fixed
    /// length.
    struct MockReader {
        vocab: TagVocabulary,
        words: Vec<&'static str>,
        seq_len: usize,
    }

    impl MockReader {
        fn new() -> Self {
            let mut vocab = TagVocabulary::new();
            for tag in ["O", "B-Drug", "I-Drug"] {
                vocab.insert(tag);
            }
            Self {
                vocab,
                words: vec!["aspirin", "is", "safe", "take", "ibuprofen"],
                seq_len: 6,
            }
        }

        fn word_id(&self, word: &str) -> u32 {
            self.words
                .iter()
                .position(|w| *w == word)
                .map(|i| i as u32 + 1)
                .unwrap_or(0)
        }

        fn pad_ids(&self, tokens: &[String]) -> Vec<u32> {
            let mut ids = vec![0; self.seq_len.saturating_sub(tokens.len())];
            ids.extend(tokens.iter().map(|t| self.word_id(t)));
            ids.truncate(self.seq_len);
            ids
        }

        fn batch_from_tokens(&self, sequences: Vec<Vec<String>>) -> UnlabeledBatch {
            let token_counts = sequences.iter().map(|s| s.len().min(self.seq_len)).collect();
            UnlabeledBatch {
                features: FeatureMatrix {
                    rows: sequences.iter().map(|s| self.pad_ids(s)).collect(),
                },
                word_sequences: sequences,
                token_counts,
            }
        }

        fn labeled(&self, sentences: &[(&[&str], &[&str])]) -> LabeledTestSet {
            let mut features = Vec::new();
            let mut tags = Vec::new();
            let mut token_sequences = Vec::new();
            let mut token_counts = Vec::new();
            for (tokens, gold) in sentences {
                let tokens: Vec<String> = tokens.iter().map(|t| t.to_string()).collect();
                features.push(self.pad_ids(&tokens));
                let mut one_hot = Vec::new();
                for _ in 0..self.seq_len - gold.len() {
                    one_hot.push(self.vocab.one_hot(PAD_TAG).unwrap());
                }
                for tag in *gold {
                    one_hot.push(self.vocab.one_hot(tag).unwrap());
                }
                tags.push(one_hot);
                token_counts.push(tokens.len());
                token_sequences.push(tokens);
            }
            LabeledTestSet {
                features: FeatureMatrix { rows: features },
                tags: TagMatrix { rows: tags },
                token_sequences,
                token_counts,
            }
        }
    }

    impl CorpusReader for MockReader {
        fn load_embedding_table(&mut self, _path: &Path) -> Result<EmbeddingTable> {
            let rows = self.words.len() + 1;
            let dim = 4;
            let mut data = vec![0.0; rows * dim];
            for (i, v) in data.iter_mut().enumerate().skip(dim) {
                *v = (i % 5) as f32 * 0.2 - 0.4;
            }
            EmbeddingTable::new(data, rows, dim)
        }

        fn training_matrices(
            &mut self,
            _path: &Path,
            resources_out: Option<&Path>,
        ) -> Result<(FeatureMatrix, TagMatrix)> {
            let set = self.labeled(&[
                (&["aspirin", "is", "safe"], &["B-Drug", "O", "O"]),
                (&["take", "ibuprofen"], &["O", "B-Drug"]),
            ]);
            if let Some(path) = resources_out {
                let mut f = std::fs::File::create(path)?;
                for (index, tag) in self.vocab.tags().iter().enumerate() {
                    writeln!(f, "{tag}\t{index}")?;
                }
            }
            Ok((set.features, set.tags))
        }

        fn test_matrices(&self, _path: &Path) -> Result<LabeledTestSet> {
            Ok(self.labeled(&[(&["aspirin", "is", "safe"], &["B-Drug", "O", "O"])]))
        }

        fn unlabeled_from_records(&self, records: &[Vec<String>]) -> Result<UnlabeledBatch> {
            Ok(self.batch_from_tokens(records.to_vec()))
        }

        fn unlabeled_from_texts(&self, texts: &[String]) -> Result<UnlabeledBatch> {
            let sequences = texts
                .iter()
                .map(|t| t.split_whitespace().map(str::to_string).collect())
                .collect();
            Ok(self.batch_from_tokens(sequences))
        }

        fn unlabeled_from_file(&self, path: &Path) -> Result<UnlabeledBatch> {
            let text = std::fs::read_to_string(path)?;
            let texts: Vec<String> = text
                .lines()
                .filter(|l| !l.trim().is_empty())
                .map(str::to_string)
                .collect();
            self.unlabeled_from_texts(&texts)
        }

        fn decode_tag_sequence(&self, probs: &[Vec<f32>]) -> Vec<String> {
            self.vocab.decode_sequence(probs)
        }

        fn tag_vocabulary(&self) -> &TagVocabulary {
            &self.vocab
        }
    }

    fn trained_extractor() -> EntityExtractor<MockReader> {
        let mut extractor =
            EntityExtractor::new(MockReader::new(), Path::new("unused")).unwrap();
        extractor
            .train(Path::new("unused"), None, &tiny_params())
            .unwrap();
        extractor
    }

    fn tiny_params() -> TrainParams {
        TrainParams {
            num_epochs: 1,
            batch_size: 2,
            num_hidden_units: 3,
            ..TrainParams::default()
        }
    }

    #[test]
    fn predict_before_train_is_an_error() {
        let extractor = EntityExtractor::new(MockReader::new(), Path::new("unused")).unwrap();
        let result = extractor.predict_texts(&["aspirin is safe".to_string()]);
        assert!(matches!(result, Err(MedtagError::ModelNotInitialized)));
        assert!(matches!(
            extractor.summary(),
            Err(MedtagError::ModelNotInitialized)
        ));
    }

    #[test]
    fn predict_output_length_matches_example_count() {
        let extractor = trained_extractor();
        let texts = vec![
            "aspirin is safe".to_string(),
            "take ibuprofen".to_string(),
            "is safe".to_string(),
        ];
        let outputs = extractor.predict_texts(&texts).unwrap();
        assert_eq!(outputs.len(), texts.len());
    }

    #[test]
    fn predictions_are_json_maps_over_real_tokens() {
        let extractor = trained_extractor();
        let outputs = extractor
            .predict_texts(&["aspirin is safe".to_string()])
            .unwrap();
        let map: serde_json::Map<String, Value> = serde_json::from_str(&outputs[0]).unwrap();
        assert_eq!(map.len(), 3);
        let keys: Vec<&String> = map.keys().collect();
        assert_eq!(keys, ["aspirin", "is", "safe"]);
        for value in map.values() {
            let tag = value.as_str().unwrap();
            assert!(extractor.reader().tag_vocabulary().index_of(tag).is_some());
        }
    }

    #[test]
    fn predict_records_matches_text_path() {
        let extractor = trained_extractor();
        let records = vec![vec!["take".to_string(), "ibuprofen".to_string()]];
        let from_records = extractor.predict_records(&records).unwrap();
        let from_texts = extractor
            .predict_texts(&["take ibuprofen".to_string()])
            .unwrap();
        assert_eq!(from_records, from_texts);
    }

    #[test]
    fn predict_file_reads_one_text_per_line() {
        let extractor = trained_extractor();
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.txt");
        std::fs::write(&input, "aspirin is safe\n\ntake ibuprofen\n").unwrap();
        let outputs = extractor.predict_file(&input).unwrap();
        assert_eq!(outputs.len(), 2);
    }

    #[test]
    fn evaluate_writes_dump_and_scores_real_tokens() {
        let extractor = trained_extractor();
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("predictions.txt");

        let evaluation = extractor.evaluate(Path::new("unused"), &output).unwrap();

        // One predicted tag per real token plus the example separator.
        let dump = std::fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[3], "");
        for line in &lines[..3] {
            assert!(extractor.reader().tag_vocabulary().index_of(line).is_some());
        }

        // Three scored tokens; the gold side never carries the padding
        // sentinel, so B-Drug and O are always reported.
        assert_eq!(evaluation.report.total_support, 3);
        assert!(evaluation.report.class("B-Drug").is_some());
        assert!(evaluation.report.class("O").is_some());
        let scored: u64 = evaluation
            .confusion
            .counts()
            .iter()
            .flatten()
            .sum();
        assert_eq!(scored, 3);
    }

    #[test]
    fn save_load_round_trip_reproduces_predictions() {
        let mut extractor = trained_extractor();
        let dir = tempfile::tempdir().unwrap();
        let texts = vec!["aspirin is safe".to_string(), "take ibuprofen".to_string()];
        let before = extractor.predict_texts(&texts).unwrap();

        extractor.save(dir.path()).unwrap();
        extractor.load(dir.path()).unwrap();
        let after = extractor.predict_texts(&texts).unwrap();

        assert_eq!(before, after);
    }

    #[test]
    fn train_forwards_resources_path_to_reader() {
        let dir = tempfile::tempdir().unwrap();
        let resources = dir.path().join("tags.tsv");
        let mut extractor =
            EntityExtractor::new(MockReader::new(), Path::new("unused")).unwrap();
        extractor
            .train(Path::new("unused"), Some(&resources), &tiny_params())
            .unwrap();
        let written = std::fs::read_to_string(&resources).unwrap();
        assert!(written.starts_with("NONE\t0"));
    }

    #[test]
    fn save_tag_map_lists_vocabulary_in_order() {
        let extractor = trained_extractor();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tag_map.tsv");
        extractor.save_tag_map(&path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines[0], "NONE\t0");
        assert_eq!(lines[1], "O\t1");
        assert_eq!(lines[2], "B-Drug\t2");
        assert_eq!(lines[3], "I-Drug\t3");
    }

    #[test]
    fn tail_keeps_last_elements() {
        assert_eq!(tail(&[1, 2, 3, 4], 2), &[3, 4]);
        assert_eq!(tail(&[1, 2], 5), &[1, 2]);
        assert_eq!(tail::<u32>(&[], 3), &[] as &[u32]);
    }
}
