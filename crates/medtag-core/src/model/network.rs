//! # Recurrent Sequence Tagger
//!
//! Frozen embedding lookup, a stack of LSTM layers (optionally
//! bidirectional) each followed by dropout, and a per-timestep dense
//! layer over the tag vocabulary. Trained with cross-entropy loss and
//! AdamW; inference applies a softmax over the dense outputs.
//!
//! The embedding weights come from the caller-supplied lookup table and
//! are not registered as trainable variables, so the optimizer never
//! touches them and the persisted artifact holds only the learned layers.

use std::fs;
use std::path::Path;

use candle_core::{D, Device, Tensor};
use candle_nn::{
    AdamW, Dropout, Embedding, LSTM, LSTMConfig, Linear, Module, Optimizer, ParamsAdamW,
    VarBuilder, VarMap, loss, lstm, ops,
};
use tracing::info;

use crate::error::{MedtagError, Result};
use crate::model::{CONFIG_FILE, ModelConfig, NetworkType, WEIGHTS_FILE};
use crate::reader::{EmbeddingTable, FeatureMatrix};

/// Adam learning rate, the framework default in the original setup.
const LEARNING_RATE: f64 = 1e-3;

/// Seed for the per-epoch shuffle of training examples.
const SHUFFLE_SEED: u64 = 42;

struct RecurrentLayer {
    fwd: LSTM,
    bwd: Option<LSTM>,
}

/// The sequence model. Absent from the extractor until trained or
/// loaded, replaced wholesale on each such call.
pub struct SequenceTagger {
    embedding: Embedding,
    layers: Vec<RecurrentLayer>,
    dropout: Dropout,
    dense: Linear,
    varmap: VarMap,
    device: Device,
    config: ModelConfig,
}

impl SequenceTagger {
    /// Build a freshly initialized network from an embedding table and a
    /// configuration.
    pub fn new(embeddings: &EmbeddingTable, config: ModelConfig, device: &Device) -> Result<Self> {
        if embeddings.rows() != config.embedding_rows || embeddings.dim() != config.embedding_dim {
            return Err(MedtagError::ShapeMismatch(format!(
                "embedding table is {}x{} but the config expects {}x{}",
                embeddings.rows(),
                embeddings.dim(),
                config.embedding_rows,
                config.embedding_dim
            )));
        }

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, candle_core::DType::F32, device);

        let embedding = Embedding::new(embeddings.to_tensor(device)?, config.embedding_dim);

        let mut layers = Vec::with_capacity(config.num_layers);
        let mut in_dim = config.embedding_dim;
        for i in 0..config.num_layers {
            let fwd = lstm(
                in_dim,
                config.num_hidden_units,
                LSTMConfig::default(),
                vb.pp(format!("rnn{i}_fwd")),
            )?;
            let bwd = match config.network_type {
                NetworkType::Unidirectional => None,
                NetworkType::Bidirectional => Some(lstm(
                    in_dim,
                    config.num_hidden_units,
                    LSTMConfig::default(),
                    vb.pp(format!("rnn{i}_bwd")),
                )?),
            };
            in_dim = match config.network_type {
                NetworkType::Unidirectional => config.num_hidden_units,
                NetworkType::Bidirectional => config.num_hidden_units * 2,
            };
            layers.push(RecurrentLayer { fwd, bwd });
        }

        let dense = candle_nn::linear(in_dim, config.num_tags, vb.pp("dense"))?;
        let dropout = Dropout::new(config.dropout);

        Ok(Self {
            embedding,
            layers,
            dropout,
            dense,
            varmap,
            device: device.clone(),
            config,
        })
    }

    /// The configuration the network was built with.
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Per-timestep tag logits for a `[batch, seq_len]` index tensor.
    fn forward(&self, token_ids: &Tensor, train: bool) -> Result<Tensor> {
        use candle_nn::RNN;

        let mut xs = self.embedding.forward(token_ids)?;
        for layer in &self.layers {
            let states = layer.fwd.seq(&xs)?;
            let fwd_out = layer.fwd.states_to_tensor(&states)?;
            let out = match &layer.bwd {
                Some(bwd) => {
                    let rev_in = reverse_time(&xs)?;
                    let bwd_states = bwd.seq(&rev_in)?;
                    let bwd_out = reverse_time(&bwd.states_to_tensor(&bwd_states)?)?;
                    Tensor::cat(&[&fwd_out, &bwd_out], D::Minus1)?
                }
                None => fwd_out,
            };
            xs = self.dropout.forward(&out, train)?;
        }
        Ok(self.dense.forward(&xs)?)
    }

    /// Fit the network on padded features and per-timestep class indices.
    ///
    /// Shuffles example order every epoch with a fixed seed and logs the
    /// mean batch loss per epoch. There is no validation split, no
    /// checkpointing, and no early stopping.
    pub fn fit(
        &mut self,
        features: &FeatureMatrix,
        targets: &[Vec<u32>],
        num_epochs: usize,
        batch_size: usize,
        weight_decay: f32,
    ) -> Result<()> {
        if features.len() != targets.len() {
            return Err(MedtagError::ShapeMismatch(format!(
                "{} feature rows but {} target rows",
                features.len(),
                targets.len()
            )));
        }
        if features.is_empty() {
            return Err(MedtagError::Corpus("training set is empty".into()));
        }

        let params = ParamsAdamW {
            lr: LEARNING_RATE,
            weight_decay: weight_decay as f64,
            ..Default::default()
        };
        let mut optimizer = AdamW::new(self.varmap.all_vars(), params)?;
        let mut rng = oorandom::Rand32::new(SHUFFLE_SEED);
        let batch_size = batch_size.max(1);

        for epoch in 1..=num_epochs {
            let mut order: Vec<usize> = (0..features.len()).collect();
            for i in (1..order.len()).rev() {
                let j = rng.rand_range(0..(i as u32 + 1)) as usize;
                order.swap(i, j);
            }

            let mut loss_sum = 0f64;
            let mut batches = 0usize;
            for chunk in order.chunks(batch_size) {
                let (ids, flat_targets) = self.batch_tensors(features, targets, chunk)?;
                let logits = self.forward(&ids, true)?;
                let logits = logits.reshape(((), self.config.num_tags))?;
                let batch_loss = loss::cross_entropy(&logits, &flat_targets)?;
                optimizer.backward_step(&batch_loss)?;
                loss_sum += batch_loss.to_scalar::<f32>()? as f64;
                batches += 1;
            }

            info!(
                epoch,
                num_epochs,
                mean_loss = loss_sum / batches as f64,
                "epoch complete"
            );
        }

        Ok(())
    }

    fn batch_tensors(
        &self,
        features: &FeatureMatrix,
        targets: &[Vec<u32>],
        chunk: &[usize],
    ) -> Result<(Tensor, Tensor)> {
        let seq_len = self.config.max_seq_len;
        let mut ids = Vec::with_capacity(chunk.len() * seq_len);
        let mut labels = Vec::with_capacity(chunk.len() * seq_len);
        for &idx in chunk {
            let row = &features.rows[idx];
            if row.len() != seq_len || targets[idx].len() != seq_len {
                return Err(MedtagError::ShapeMismatch(format!(
                    "example {} is not padded to length {}",
                    idx, seq_len
                )));
            }
            ids.extend_from_slice(row);
            labels.extend_from_slice(&targets[idx]);
        }
        let ids = Tensor::from_vec(ids, (chunk.len(), seq_len), &self.device)?;
        let labels = Tensor::from_vec(labels, chunk.len() * seq_len, &self.device)?;
        Ok((ids, labels))
    }

    /// Per-timestep tag probabilities for a batch of padded index rows.
    pub fn predict_probs(&self, rows: &[Vec<u32>]) -> Result<Vec<Vec<Vec<f32>>>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let seq_len = self.config.max_seq_len;
        let mut flat = Vec::with_capacity(rows.len() * seq_len);
        for row in rows {
            if row.len() != seq_len {
                return Err(MedtagError::ShapeMismatch(format!(
                    "input row has length {} but the model expects {}",
                    row.len(),
                    seq_len
                )));
            }
            flat.extend_from_slice(row);
        }
        let ids = Tensor::from_vec(flat, (rows.len(), seq_len), &self.device)?;
        let logits = self.forward(&ids, false)?;
        let probs = ops::softmax(&logits, D::Minus1)?;
        Ok(probs.to_vec3::<f32>()?)
    }

    /// Probabilities for a single example, batch size 1.
    pub fn predict_example(&self, row: &[u32]) -> Result<Vec<Vec<f32>>> {
        let row = row.to_vec();
        let mut probs = self.predict_probs(std::slice::from_ref(&row))?;
        Ok(probs.pop().unwrap_or_default())
    }

    /// Persist the learned weights and the configuration to a directory.
    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        fs::write(
            dir.join(CONFIG_FILE),
            serde_json::to_string_pretty(&self.config)?,
        )?;
        self.varmap.save(dir.join(WEIGHTS_FILE))?;
        Ok(())
    }

    /// Rebuild a network from a persisted directory and an embedding table.
    ///
    /// The table must be the one the model was trained with; only the
    /// learned layers are stored in the artifact.
    pub fn load(dir: &Path, embeddings: &EmbeddingTable, device: &Device) -> Result<Self> {
        let config_text = fs::read_to_string(dir.join(CONFIG_FILE))?;
        let config: ModelConfig = serde_json::from_str(&config_text)?;
        let mut model = Self::new(embeddings, config, device)?;
        model.varmap.load(dir.join(WEIGHTS_FILE))?;
        Ok(model)
    }

    /// Human-readable layer listing.
    pub fn summary(&self) -> String {
        let mut lines = vec![format!(
            "embedding: {} x {} (frozen)",
            self.config.embedding_rows, self.config.embedding_dim
        )];
        for i in 0..self.config.num_layers {
            lines.push(format!(
                "lstm {}: {} hidden units, {}",
                i, self.config.num_hidden_units, self.config.network_type
            ));
            lines.push(format!("dropout {}: rate {}", i, self.config.dropout));
        }
        lines.push(format!(
            "dense: {} tags, softmax per timestep",
            self.config.num_tags
        ));
        let trainable: usize = self
            .varmap
            .all_vars()
            .iter()
            .map(|v| v.as_tensor().elem_count())
            .sum();
        lines.push(format!("trainable parameters: {trainable}"));
        lines.join("\n")
    }
}

/// Reverse a `[batch, seq_len, features]` tensor along the time axis.
fn reverse_time(xs: &Tensor) -> Result<Tensor> {
    let (_, seq_len, _) = xs.dims3()?;
    let indices: Vec<u32> = (0..seq_len as u32).rev().collect();
    let indices = Tensor::from_vec(indices, seq_len, xs.device())?;
    Ok(xs.index_select(&indices, 1)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_table() -> EmbeddingTable {
        let rows = 6;
        let dim = 4;
        let mut data = vec![0.0; rows * dim];
        for (i, v) in data.iter_mut().enumerate().skip(dim) {
            *v = (i % 7) as f32 * 0.1;
        }
        EmbeddingTable::new(data, rows, dim).unwrap()
    }

    fn tiny_config(network_type: NetworkType) -> ModelConfig {
        ModelConfig {
            network_type,
            num_layers: 1,
            num_hidden_units: 3,
            dropout: 0.2,
            max_seq_len: 5,
            num_tags: 4,
            embedding_rows: 6,
            embedding_dim: 4,
        }
    }

    fn tiny_data() -> (FeatureMatrix, Vec<Vec<u32>>) {
        let features = FeatureMatrix {
            rows: vec![vec![0, 0, 1, 2, 3], vec![0, 4, 5, 2, 1]],
        };
        let targets = vec![vec![0, 0, 1, 2, 3], vec![0, 1, 1, 2, 1]];
        (features, targets)
    }

    #[test]
    fn probabilities_are_normalized() {
        for network_type in [NetworkType::Unidirectional, NetworkType::Bidirectional] {
            let model =
                SequenceTagger::new(&tiny_table(), tiny_config(network_type), &Device::Cpu)
                    .unwrap();
            let probs = model.predict_example(&[0, 0, 1, 2, 3]).unwrap();
            assert_eq!(probs.len(), 5);
            for row in &probs {
                assert_eq!(row.len(), 4);
                let sum: f32 = row.iter().sum();
                assert!((sum - 1.0).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn fit_runs_and_model_stays_usable() {
        let mut model = SequenceTagger::new(
            &tiny_table(),
            tiny_config(NetworkType::Unidirectional),
            &Device::Cpu,
        )
        .unwrap();
        let (features, targets) = tiny_data();
        model.fit(&features, &targets, 2, 2, 0.0).unwrap();
        let probs = model.predict_probs(&features.rows).unwrap();
        assert_eq!(probs.len(), 2);
    }

    #[test]
    fn rejects_wrong_input_length() {
        let model = SequenceTagger::new(
            &tiny_table(),
            tiny_config(NetworkType::Unidirectional),
            &Device::Cpu,
        )
        .unwrap();
        assert!(matches!(
            model.predict_example(&[0, 1]),
            Err(MedtagError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn rejects_mismatched_embedding_table() {
        let mut config = tiny_config(NetworkType::Unidirectional);
        config.embedding_dim = 8;
        assert!(matches!(
            SequenceTagger::new(&tiny_table(), config, &Device::Cpu),
            Err(MedtagError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn save_load_round_trip_reproduces_predictions() {
        let dir = tempfile::tempdir().unwrap();
        let table = tiny_table();
        let mut model = SequenceTagger::new(
            &table,
            tiny_config(NetworkType::Bidirectional),
            &Device::Cpu,
        )
        .unwrap();
        let (features, targets) = tiny_data();
        model.fit(&features, &targets, 1, 2, 0.0).unwrap();
        let before = model.predict_probs(&features.rows).unwrap();

        model.save(dir.path()).unwrap();
        let restored = SequenceTagger::load(dir.path(), &table, &Device::Cpu).unwrap();
        let after = restored.predict_probs(&features.rows).unwrap();

        assert_eq!(before, after);
    }

    #[test]
    fn summary_lists_layers() {
        let model = SequenceTagger::new(
            &tiny_table(),
            tiny_config(NetworkType::Bidirectional),
            &Device::Cpu,
        )
        .unwrap();
        let summary = model.summary();
        assert!(summary.contains("embedding: 6 x 4"));
        assert!(summary.contains("bidirectional"));
        assert!(summary.contains("trainable parameters"));
    }
}
