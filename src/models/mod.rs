// Models module

pub mod word;

// Re-export commonly used types
pub use word::{normalize_word, CheckWordRequest, CheckWordResponse, RandomWordResponse};
