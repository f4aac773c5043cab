//! Corpus and embedding-table loading.
//!
//! Implements the reader contract over the plain-text formats the
//! tagging pipeline consumes: BIO-style `token<TAB>tag` corpora with
//! blank-line sentence separators, and textual word-vector tables.
//! Sequences are PRE-padded to a fixed length, so real tokens occupy the
//! tail of every padded row; sequences longer than the limit keep their
//! last tokens.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use medtag_core::error::{MedtagError, Result};
use medtag_core::reader::{
    CorpusReader, EmbeddingTable, FeatureMatrix, LabeledTestSet, TagMatrix, UnlabeledBatch,
};
use medtag_core::tags::{PAD_TAG, TagVocabulary};
use tracing::debug;

/// Default padded sequence length.
pub const DEFAULT_MAX_SEQ_LEN: usize = 100;

/// Corpus reader over tab-separated token/tag files.
///
/// Word indices come from the embedding table's row order; index 0 is
/// reserved for padding and unknown words. The tag vocabulary grows
/// while parsing training data and is otherwise fixed; a tag map saved
/// at train time restores the same ordering in a later process.
pub struct TsvReader {
    max_seq_len: usize,
    word_index: HashMap<String, u32>,
    vocab: TagVocabulary,
}

impl TsvReader {
    pub fn new() -> Self {
        Self::with_max_seq_len(DEFAULT_MAX_SEQ_LEN)
    }

    pub fn with_max_seq_len(max_seq_len: usize) -> Self {
        Self {
            max_seq_len,
            word_index: HashMap::new(),
            vocab: TagVocabulary::new(),
        }
    }

    /// Restore a reader whose tag vocabulary comes from a saved tag map
    /// (`tag<TAB>index` per line).
    pub fn with_tag_map(path: &Path, max_seq_len: usize) -> Result<Self> {
        let mut reader = Self::with_max_seq_len(max_seq_len);
        let file = BufReader::new(File::open(path)?);
        let mut entries: Vec<(usize, String)> = Vec::new();
        for line in file.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (tag, index) = line.split_once('\t').ok_or_else(|| {
                MedtagError::Corpus(format!("malformed tag-map line: {line:?}"))
            })?;
            let index: usize = index
                .trim()
                .parse()
                .map_err(|_| MedtagError::Corpus(format!("malformed tag index: {index:?}")))?;
            entries.push((index, tag.to_string()));
        }
        entries.sort_by_key(|(index, _)| *index);
        for (_, tag) in entries {
            reader.vocab.insert(&tag);
        }
        Ok(reader)
    }

    pub fn max_seq_len(&self) -> usize {
        self.max_seq_len
    }

    /// Parse a corpus into sentences of token/tag pairs. Blank lines
    /// separate sentences and `#`-prefixed lines are skipped.
    fn parse_sentences(&self, path: &Path) -> Result<Vec<Vec<(String, String)>>> {
        let file = BufReader::new(File::open(path)?);
        let mut sentences = Vec::new();
        let mut current: Vec<(String, String)> = Vec::new();

        for line in file.lines() {
            let line = line?;
            let line = line.trim();

            if line.is_empty() {
                if !current.is_empty() {
                    sentences.push(std::mem::take(&mut current));
                }
                continue;
            }
            if line.starts_with('#') {
                continue;
            }

            let (token, tag) = line.split_once('\t').ok_or_else(|| {
                MedtagError::Corpus(format!("expected token<TAB>tag, got {line:?}"))
            })?;
            current.push((token.to_string(), tag.trim().to_string()));
        }
        if !current.is_empty() {
            sentences.push(current);
        }

        Ok(sentences)
    }

    fn word_id(&self, word: &str) -> u32 {
        self.word_index.get(word).copied().unwrap_or(0)
    }

    /// Keep the last `max_seq_len` items of a sequence.
    fn clip<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        &items[items.len().saturating_sub(self.max_seq_len)..]
    }

    /// Pre-pad a token sequence to `max_seq_len` index values.
    fn pad_ids(&self, tokens: &[String]) -> Vec<u32> {
        let tokens = self.clip(tokens);
        let mut ids = vec![0u32; self.max_seq_len - tokens.len()];
        ids.extend(tokens.iter().map(|t| self.word_id(t)));
        ids
    }

    fn batch_from_tokens(&self, sequences: Vec<Vec<String>>) -> UnlabeledBatch {
        let mut rows = Vec::with_capacity(sequences.len());
        let mut word_sequences = Vec::with_capacity(sequences.len());
        let mut token_counts = Vec::with_capacity(sequences.len());
        for tokens in sequences {
            rows.push(self.pad_ids(&tokens));
            let clipped = self.clip(&tokens).to_vec();
            token_counts.push(clipped.len());
            word_sequences.push(clipped);
        }
        UnlabeledBatch {
            features: FeatureMatrix { rows },
            word_sequences,
            token_counts,
        }
    }

    fn split_texts(texts: &[String]) -> Vec<Vec<String>> {
        texts
            .iter()
            .map(|t| t.split_whitespace().map(str::to_string).collect())
            .collect()
    }

    /// One-hot rows for a clipped sentence, padding positions first.
    fn one_hot_tags(&self, tags: &[String]) -> Result<Vec<Vec<f32>>> {
        let tags = self.clip(tags);
        let mut rows = Vec::with_capacity(self.max_seq_len);
        let pad = self.vocab.one_hot(PAD_TAG)?;
        for _ in 0..self.max_seq_len - tags.len() {
            rows.push(pad.clone());
        }
        for tag in tags {
            rows.push(self.vocab.one_hot(tag)?);
        }
        Ok(rows)
    }

    fn labeled_set(&self, sentences: Vec<Vec<(String, String)>>) -> Result<LabeledTestSet> {
        let mut features = Vec::with_capacity(sentences.len());
        let mut tag_rows = Vec::with_capacity(sentences.len());
        let mut token_sequences = Vec::with_capacity(sentences.len());
        let mut token_counts = Vec::with_capacity(sentences.len());
        for sentence in sentences {
            let (tokens, tags): (Vec<String>, Vec<String>) = sentence.into_iter().unzip();
            features.push(self.pad_ids(&tokens));
            tag_rows.push(self.one_hot_tags(&tags)?);
            let clipped = self.clip(&tokens).to_vec();
            token_counts.push(clipped.len());
            token_sequences.push(clipped);
        }
        Ok(LabeledTestSet {
            features: FeatureMatrix { rows: features },
            tags: TagMatrix { rows: tag_rows },
            token_sequences,
            token_counts,
        })
    }

    fn write_tag_map(&self, path: &Path) -> Result<()> {
        let mut f = BufWriter::new(File::create(path)?);
        for (index, tag) in self.vocab.tags().iter().enumerate() {
            writeln!(f, "{tag}\t{index}")?;
        }
        f.flush()?;
        Ok(())
    }
}

impl Default for TsvReader {
    fn default() -> Self {
        Self::new()
    }
}

impl CorpusReader for TsvReader {
    /// Parse a textual word-vector file, one `word v1 … vn` per line.
    /// A leading two-integer header line is skipped. Row 0 of the
    /// resulting table is the zero padding/unknown vector.
    fn load_embedding_table(&mut self, path: &Path) -> Result<EmbeddingTable> {
        let file = BufReader::new(File::open(path)?);
        let mut dim = 0usize;
        let mut data: Vec<f32> = Vec::new();
        let mut rows = 0usize;

        for (line_no, line) in file.lines().enumerate() {
            let line = line?;
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.is_empty() {
                continue;
            }
            if line_no == 0
                && fields.len() == 2
                && fields.iter().all(|f| f.parse::<usize>().is_ok())
            {
                continue;
            }

            let word = fields[0];
            let values: Vec<f32> = fields[1..]
                .iter()
                .map(|f| f.parse::<f32>())
                .collect::<std::result::Result<_, _>>()
                .map_err(|_| {
                    MedtagError::EmbeddingTable(format!(
                        "non-numeric vector component on line {}",
                        line_no + 1
                    ))
                })?;
            if values.is_empty() {
                return Err(MedtagError::EmbeddingTable(format!(
                    "no vector components on line {}",
                    line_no + 1
                )));
            }
            if dim == 0 {
                dim = values.len();
                // Row 0: zero vector for padding and unknown words.
                data.extend(std::iter::repeat_n(0.0, dim));
                rows = 1;
            } else if values.len() != dim {
                return Err(MedtagError::EmbeddingTable(format!(
                    "expected dimension {dim} on line {}, got {}",
                    line_no + 1,
                    values.len()
                )));
            }

            if self.word_index.contains_key(word) {
                debug!(word, "duplicate word in embedding table, keeping first");
                continue;
            }
            self.word_index.insert(word.to_string(), rows as u32);
            data.extend(values);
            rows += 1;
        }

        if rows == 0 {
            return Err(MedtagError::EmbeddingTable("table is empty".into()));
        }
        EmbeddingTable::new(data, rows, dim)
    }

    fn training_matrices(
        &mut self,
        path: &Path,
        resources_out: Option<&Path>,
    ) -> Result<(FeatureMatrix, TagMatrix)> {
        let sentences = self.parse_sentences(path)?;
        for sentence in &sentences {
            for (_, tag) in sentence {
                self.vocab.insert(tag);
            }
        }
        if let Some(out) = resources_out {
            self.write_tag_map(out)?;
        }
        let set = self.labeled_set(sentences)?;
        Ok((set.features, set.tags))
    }

    fn test_matrices(&self, path: &Path) -> Result<LabeledTestSet> {
        let sentences = self.parse_sentences(path)?;
        self.labeled_set(sentences)
    }

    fn unlabeled_from_records(&self, records: &[Vec<String>]) -> Result<UnlabeledBatch> {
        Ok(self.batch_from_tokens(records.to_vec()))
    }

    fn unlabeled_from_texts(&self, texts: &[String]) -> Result<UnlabeledBatch> {
        Ok(self.batch_from_tokens(Self::split_texts(texts)))
    }

    fn unlabeled_from_file(&self, path: &Path) -> Result<UnlabeledBatch> {
        let file = BufReader::new(File::open(path)?);
        let mut texts = Vec::new();
        for line in file.lines() {
            let line = line?;
            if !line.trim().is_empty() {
                texts.push(line);
            }
        }
        self.unlabeled_from_texts(&texts)
    }

    fn decode_tag_sequence(&self, probs: &[Vec<f32>]) -> Vec<String> {
        self.vocab.decode_sequence(probs)
    }

    fn tag_vocabulary(&self) -> &TagVocabulary {
        &self.vocab
    }
}
