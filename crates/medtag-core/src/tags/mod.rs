pub mod remap;
pub mod vocab;

pub use remap::remap_for_scoring;
pub use vocab::{PAD_TAG, TagVocabulary};
