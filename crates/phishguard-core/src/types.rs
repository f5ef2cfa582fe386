//! Core types for the split-inference pipeline

use serde::{Deserialize, Serialize};

/// Fixed sequence length for token batches. Must match the server-side
/// model split; both halves were exported with this padding length.
pub const SEQ_LEN: usize = 128;

/// Hidden dimension of the client-part model output.
pub const HIDDEN_DIM: usize = 512;

/// Vocabulary bound used when the tokenizer response omits `vocab_size`.
pub const DEFAULT_VOCAB_SIZE: u32 = 32128;

/// Result-cache time-to-live: 24 hours, in milliseconds.
pub const CACHE_TTL_MS: i64 = 24 * 60 * 60 * 1000;

/// Fixed confidence reported for denylist hits.
pub const DENYLIST_SCORE: f32 = 0.99;

/// A fixed-length batch of token ids plus attention mask, ready for the
/// client-part forward pass.
///
/// Invariants: both sequences are exactly [`SEQ_LEN`] long, every id lies in
/// `[0, vocab_size)`, and mask values are 0 or 1. Padding positions carry
/// id 0 / mask 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBatch {
    pub input_ids: Vec<i64>,
    pub attention_mask: Vec<i64>,
}

impl TokenBatch {
    /// Normalize a variable-length tokenizer response into a fixed-length
    /// batch: copy `min(SEQ_LEN, n)` positions, zero-fill the rest, then
    /// clamp ids into `[0, vocab_size)`.
    ///
    /// Out-of-range ids are corrected, never rejected; a clamp is logged
    /// because it usually means the tokenizer and model disagree on vocab.
    pub fn from_remote(ids: &[i64], mask: &[i64], vocab_size: u32) -> Self {
        let mut input_ids = vec![0i64; SEQ_LEN];
        let mut attention_mask = vec![0i64; SEQ_LEN];

        let copy_len = ids.len().min(SEQ_LEN);
        input_ids[..copy_len].copy_from_slice(&ids[..copy_len]);
        let mask_len = mask.len().min(copy_len);
        attention_mask[..mask_len].copy_from_slice(&mask[..mask_len]);

        let limit = i64::from(vocab_size);
        let mut clamped = 0usize;
        for id in input_ids.iter_mut() {
            if *id < 0 {
                *id = 0;
                clamped += 1;
            } else if *id >= limit {
                *id = limit - 1;
                clamped += 1;
            }
        }

        if clamped > 0 {
            tracing::warn!(
                "{} token ids were out of range and clamped to [0, {}]",
                clamped,
                limit - 1
            );
        }

        Self {
            input_ids,
            attention_mask,
        }
    }

    /// Number of attended (non-padding) positions.
    pub fn attended_len(&self) -> usize {
        self.attention_mask.iter().filter(|&&m| m != 0).count()
    }
}

/// The intermediate feature tensor produced by the client-part model.
///
/// Opaque to the client: it is serialized as a flat float array and
/// completed by the remote half of the model. Expected length is
/// `SEQ_LEN * HIDDEN_DIM`.
#[derive(Debug, Clone, PartialEq)]
pub struct SmashedVector(Vec<f32>);

impl SmashedVector {
    pub fn new(data: Vec<f32>) -> Self {
        Self(data)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }
}

/// Final classification for a URL.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub is_phishing: bool,
    /// Phishing probability in [0, 1].
    pub score: f32,
}

/// Where a verdict came from. Callers use this to explain results
/// (a denylist hit and a degraded offline guess are not equally trustworthy).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictSource {
    /// Exact host match against the local denylist
    Denylist,
    /// Unexpired result-cache entry
    Cache,
    /// Full split-inference round trip
    Online,
    /// Degraded local-only path (heuristic tokenizer + fallback model)
    Offline,
}

/// A prediction together with its provenance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub prediction: Prediction,
    pub source: VerdictSource,
}

impl Verdict {
    pub fn new(prediction: Prediction, source: VerdictSource) -> Self {
        Self { prediction, source }
    }
}

/// One row of the result cache. At most one entry per url (upsert
/// semantics); entries older than [`CACHE_TTL_MS`] are treated as absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub url: String,
    pub is_phishing: bool,
    pub score: f32,
    /// Unix timestamp in milliseconds of the last successful classification.
    pub last_checked_ms: i64,
}

impl CacheEntry {
    /// Whether this entry is still within the TTL window at `now_ms`.
    pub fn is_fresh_at(&self, now_ms: i64) -> bool {
        now_ms - self.last_checked_ms <= CACHE_TTL_MS
    }

    pub fn prediction(&self) -> Prediction {
        Prediction {
            is_phishing: self.is_phishing,
            score: self.score,
        }
    }
}
