//! Shared text preprocessing
//!
//! Stop-word removal and query normalization used by the memory optimizer's
//! query rewriting and by the analysis stages that mine topics from memory
//! content. Structural transformations (lowercasing, punctuation stripping,
//! stop-word removal) happen here, BEFORE any downstream analysis.

mod stopwords;

pub use stopwords::{clean, content_words, is_stop_word, optimize_query, STOP_WORDS};
