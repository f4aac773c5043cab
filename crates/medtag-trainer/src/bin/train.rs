//! Train a recurrent entity tagger on a BIO corpus.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use medtag_core::{EntityExtractor, NetworkType, TrainParams};
use medtag_trainer::{DEFAULT_MAX_SEQ_LEN, TsvReader};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "train", about = "Train a recurrent entity tagger on a BIO corpus.")]
struct Args {
    /// The training corpus (token<TAB>tag lines, blank line between sentences)
    #[arg(long)]
    corpus: PathBuf,

    /// The word-embedding table (textual word-vector format)
    #[arg(long)]
    embeddings: PathBuf,

    /// The directory to write the trained model artifact to
    #[arg(long)]
    model_dir: PathBuf,

    /// The file to write the tag map to (tag<TAB>index per line)
    #[arg(long)]
    tag_map: Option<PathBuf>,

    /// The padded sequence length
    #[arg(long, default_value_t = DEFAULT_MAX_SEQ_LEN)]
    max_seq_len: usize,

    /// The recurrent layer arrangement: {unidirectional, bidirectional}
    #[arg(long, default_value = "unidirectional")]
    network: NetworkType,

    /// The number of training epochs
    #[arg(long, default_value_t = 1)]
    epochs: usize,

    /// The mini-batch size
    #[arg(long, default_value_t = 50)]
    batch_size: usize,

    /// The dropout rate applied after each recurrent layer
    #[arg(long, default_value_t = 0.2)]
    dropout: f32,

    /// The weight-decay strength
    #[arg(long, default_value_t = 0.0)]
    reg_alpha: f32,

    /// The number of hidden units per recurrent layer
    #[arg(long, default_value_t = 150)]
    hidden_units: usize,

    /// The number of recurrent layers
    #[arg(long, default_value_t = 1)]
    layers: usize,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let reader = TsvReader::with_max_seq_len(args.max_seq_len);
    let mut extractor = EntityExtractor::new(reader, &args.embeddings)?;

    let params = TrainParams {
        network_type: args.network,
        num_epochs: args.epochs,
        batch_size: args.batch_size,
        dropout: args.dropout,
        reg_alpha: args.reg_alpha,
        num_hidden_units: args.hidden_units,
        num_layers: args.layers,
    };
    extractor.train(&args.corpus, args.tag_map.as_deref(), &params)?;
    extractor.save(&args.model_dir)?;

    info!(model_dir = %args.model_dir.display(), "training finished");
    println!("{}", extractor.summary()?);
    Ok(())
}
