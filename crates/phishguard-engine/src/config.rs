//! Engine configuration

use phishguard_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Model-download endpoint serving the client-part weights
    #[serde(default = "default_model_url")]
    pub model_url: String,

    /// Remote tokenization endpoint
    #[serde(default = "default_tokenize_url")]
    pub tokenize_url: String,

    /// Remote prediction endpoint completing the split inference
    #[serde(default = "default_predict_url")]
    pub predict_url: String,

    /// Directory holding downloaded model artifacts
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,

    /// SQLite file backing the result cache and denylist
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    /// Optional path to the bundled offline fallback model weights
    #[serde(default)]
    pub offline_model_path: Option<PathBuf>,

    /// User-Agent header sent on page fetches
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request HTTP timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl EngineConfig {
    /// Load configuration from a YAML file, falling back to defaults when
    /// the file does not exist. CLI overrides are applied by the caller.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_yaml::from_str(&content)
                .map_err(|e| Error::config(format!("failed to parse {}: {}", path.display(), e)))
        } else {
            Ok(Self::default())
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_url: default_model_url(),
            tokenize_url: default_tokenize_url(),
            predict_url: default_predict_url(),
            model_dir: default_model_dir(),
            store_path: default_store_path(),
            offline_model_path: None,
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_model_url() -> String {
    "http://127.0.0.1:8000/download_model".to_string()
}

fn default_tokenize_url() -> String {
    "http://127.0.0.1:5000/tokenize".to_string()
}

fn default_predict_url() -> String {
    "http://127.0.0.1:5000/predict/".to_string()
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("./models")
}

fn default_store_path() -> PathBuf {
    PathBuf::from("./phishguard.db")
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) PhishGuard/0.1".to_string()
}

fn default_request_timeout() -> u64 {
    30
}
