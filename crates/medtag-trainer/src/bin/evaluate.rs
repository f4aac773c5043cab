//! Evaluate a trained tagger against a labeled corpus.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use medtag_core::EntityExtractor;
use medtag_trainer::{DEFAULT_MAX_SEQ_LEN, TsvReader};

#[derive(Parser, Debug)]
#[command(
    name = "evaluate",
    about = "Evaluate a trained tagger against a labeled corpus."
)]
struct Args {
    /// The labeled test corpus (token<TAB>tag lines)
    #[arg(long)]
    corpus: PathBuf,

    /// The word-embedding table used at train time
    #[arg(long)]
    embeddings: PathBuf,

    /// The trained model artifact directory
    #[arg(long)]
    model_dir: PathBuf,

    /// The tag map written at train time
    #[arg(long)]
    tag_map: PathBuf,

    /// The file to write per-token predictions to
    #[arg(long, default_value = "predictions.txt")]
    output: PathBuf,

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

    let evaluation = extractor.evaluate(&args.corpus, &args.output)?;
    println!("{}", evaluation.report);
    println!("confusion matrix:");
    println!("{}", evaluation.confusion);
    Ok(())
}
