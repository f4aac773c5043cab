//! # Medtag Trainer
//!
//! Corpus loading and the command-line entry points (`train`,
//! `evaluate`, `predict`) for the medtag tagging engine.

pub mod data;

pub use data::{DEFAULT_MAX_SEQ_LEN, TsvReader};
