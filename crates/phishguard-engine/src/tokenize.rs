//! Tokenization: the remote tokenizer client and the offline word-hash
//! fallback.

use phishguard_core::{TokenBatch, DEFAULT_VOCAB_SIZE, SEQ_LEN};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tracing::{debug, warn};

use crate::model::OFFLINE_VOCAB_SIZE;

#[derive(Serialize)]
struct TokenizeRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct TokenizeResponse {
    input_ids: Vec<i64>,
    attention_mask: Vec<i64>,
    /// Optional vocabulary bound; absent on older servers.
    vocab_size: Option<u32>,
}

/// Client for the remote tokenization endpoint.
pub struct RemoteTokenizer {
    http: reqwest::Client,
    endpoint: String,
}

impl RemoteTokenizer {
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }

    /// Tokenize `text` remotely and normalize the response to a fixed-length
    /// batch (right-padded, ids clamped into the vocabulary).
    ///
    /// Returns `None` on HTTP failure or malformed JSON; the caller surfaces
    /// the error and aborts the request. No retry.
    pub async fn tokenize(&self, text: &str) -> Option<TokenBatch> {
        let resp = match self
            .http
            .post(&self.endpoint)
            .json(&TokenizeRequest { text })
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                warn!("tokenize request failed: {}", e);
                return None;
            }
        };

        if !resp.status().is_success() {
            warn!("tokenize endpoint returned status {}", resp.status());
            return None;
        }

        let parsed: TokenizeResponse = match resp.json().await {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("malformed tokenize response: {}", e);
                return None;
            }
        };

        let vocab_size = parsed.vocab_size.unwrap_or(DEFAULT_VOCAB_SIZE);
        debug!(
            "tokenized {} ids (vocab size {})",
            parsed.input_ids.len(),
            vocab_size
        );
        Some(TokenBatch::from_remote(
            &parsed.input_ids,
            &parsed.attention_mask,
            vocab_size,
        ))
    }
}

/// Offline heuristic tokenizer: whitespace-split words hashed into a fixed
/// vocabulary. Not BPE; only used on the degraded no-connectivity fork,
/// paired with the offline fallback model that was trained on the same
/// hashing scheme.
pub fn tokenize_offline(text: &str) -> TokenBatch {
    let mut input_ids = vec![0i64; SEQ_LEN];
    let mut attention_mask = vec![0i64; SEQ_LEN];

    for (i, word) in text.split_whitespace().take(SEQ_LEN).enumerate() {
        let mut hasher = DefaultHasher::new();
        word.hash(&mut hasher);
        input_ids[i] = (hasher.finish() % OFFLINE_VOCAB_SIZE as u64) as i64;
        attention_mask[i] = 1;
    }

    TokenBatch {
        input_ids,
        attention_mask,
    }
}
