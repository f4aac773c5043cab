//! Tag a file of raw texts with a trained model.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use medtag_core::EntityExtractor;
use medtag_trainer::{DEFAULT_MAX_SEQ_LEN, TsvReader};

#[derive(Parser, Debug)]
#[command(
    name = "predict",
    about = "Tag a file of raw texts, one JSON label map per line."
)]
struct Args {
    /// The input file, one text per line
    #[arg(long)]
    input: PathBuf,

    /// The word-embedding table used at train time
    #[arg(long)]
    embeddings: PathBuf,

    /// The trained model artifact directory
    #[arg(long)]
    model_dir: PathBuf,

    /// The tag map written at train time
    #[arg(long)]
    tag_map: PathBuf,

    /// The padded sequence length used at train time
    #[arg(long, default_value_t = DEFAULT_MAX_SEQ_LEN)]
    max_seq_len: usize,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let reader = TsvReader::with_tag_map(&args.tag_map, args.max_seq_len)?;
    let mut extractor = EntityExtractor::new(reader, &args.embeddings)?;
    extractor.load(&args.model_dir)?;

    for line in extractor.predict_file(&args.input)? {
        println!("{line}");
    }
    Ok(())
}
