use thiserror::Error;

/// Errors that can occur during medtag operations.
#[derive(Debug, Error)]
pub enum MedtagError {
    /// The model has not been trained or loaded yet.
    #[error("model is not initialized; call train or load first")]
    ModelNotInitialized,

    /// An input file could not be read or an output file written.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The candle framework reported a failure.
    #[error("ML framework error: {0}")]
    Candle(#[from] candle_core::Error),

    /// A model config could not be serialized or parsed.
    #[error("model config error: {0}")]
    Config(#[from] serde_json::Error),

    /// The embedding table file is malformed.
    #[error("malformed embedding table: {0}")]
    EmbeddingTable(String),

    /// A corpus file is malformed.
    #[error("malformed corpus: {0}")]
    Corpus(String),

    /// A tag name is absent from the vocabulary.
    #[error("unknown tag: {0:?}")]
    UnknownTag(String),

    /// Input dimensions disagree with the configured shapes.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),
}

/// Result type alias for medtag operations.
pub type Result<T> = std::result::Result<T, MedtagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = MedtagError::ModelNotInitialized;
        assert_eq!(
            err.to_string(),
            "model is not initialized; call train or load first"
        );

        let err = MedtagError::UnknownTag("B-Gene".into());
        assert!(err.to_string().contains("B-Gene"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MedtagError>();
    }
}
