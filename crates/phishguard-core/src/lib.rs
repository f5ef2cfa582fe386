//! PhishGuard Core
//!
//! Core types and error handling shared across PhishGuard components.
//!
//! This crate provides:
//! - The token batch, smashed vector, and prediction types flowing through
//!   the split-inference pipeline
//! - The error taxonomy and result handling
//! - Cache-entry types and pipeline constants (sequence length, TTL)

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{
    CacheEntry, Prediction, SmashedVector, TokenBatch, Verdict, VerdictSource, CACHE_TTL_MS,
    DEFAULT_VOCAB_SIZE, DENYLIST_SCORE, HIDDEN_DIM, SEQ_LEN,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::types::{
        CacheEntry, Prediction, SmashedVector, TokenBatch, Verdict, VerdictSource,
    };
}
