//! # Sequence Model
//!
//! The recurrent tagging network and its persisted configuration.
//! A trained model serializes to a directory holding `model.safetensors`
//! (the learned weights) and `config.json` (the hyperparameters needed
//! to rebuild the network before loading the weights).

pub mod network;

pub use network::SequenceTagger;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Weights file inside a persisted model directory.
pub const WEIGHTS_FILE: &str = "model.safetensors";
/// Hyperparameter file inside a persisted model directory.
pub const CONFIG_FILE: &str = "config.json";

/// Recurrent layer arrangement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    Unidirectional,
    Bidirectional,
}

impl FromStr for NetworkType {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unidirectional" => Ok(Self::Unidirectional),
            "bidirectional" => Ok(Self::Bidirectional),
            _ => Err("expected 'unidirectional' or 'bidirectional'"),
        }
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unidirectional => write!(f, "unidirectional"),
            Self::Bidirectional => write!(f, "bidirectional"),
        }
    }
}

/// Hyperparameters fixed at train time and persisted with the weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub network_type: NetworkType,
    pub num_layers: usize,
    pub num_hidden_units: usize,
    pub dropout: f32,
    /// Padded sequence length the network was trained on.
    pub max_seq_len: usize,
    /// Output-layer size; must match the decode-time tag vocabulary.
    pub num_tags: usize,
    pub embedding_rows: usize,
    pub embedding_dim: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_type_parses() {
        assert_eq!(
            "unidirectional".parse::<NetworkType>().unwrap(),
            NetworkType::Unidirectional
        );
        assert_eq!(
            "bidirectional".parse::<NetworkType>().unwrap(),
            NetworkType::Bidirectional
        );
        assert!("lstm".parse::<NetworkType>().is_err());
    }

    #[test]
    fn network_type_round_trips_through_display() {
        for ty in [NetworkType::Unidirectional, NetworkType::Bidirectional] {
            assert_eq!(ty.to_string().parse::<NetworkType>().unwrap(), ty);
        }
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = ModelConfig {
            network_type: NetworkType::Bidirectional,
            num_layers: 2,
            num_hidden_units: 150,
            dropout: 0.2,
            max_seq_len: 100,
            num_tags: 5,
            embedding_rows: 1000,
            embedding_dim: 50,
        };
        let json = serde_json::to_string(&config).unwrap();
        let parsed: ModelConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.network_type, config.network_type);
        assert_eq!(parsed.num_tags, config.num_tags);
        assert_eq!(parsed.max_seq_len, config.max_seq_len);
    }
}
