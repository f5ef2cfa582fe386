//! PhishGuard Engine
//!
//! The split-inference phishing detection pipeline:
//! - Model provisioning (download with retry, integrity sanity check,
//!   one-time in-process load)
//! - Page content acquisition and markup stripping
//! - Remote tokenization with fixed-length normalization and clamping
//! - Local client-part forward pass plus remote completion
//! - TTL result cache and domain denylist (SQLite-backed)
//! - Candidate-URL extraction from message text

pub mod config;
pub mod content;
pub mod inference;
pub mod model;
pub mod pipeline;
pub mod provision;
pub mod scan;
pub mod store;
pub mod tokenize;

pub use phishguard_core::{Prediction, Verdict, VerdictSource};

pub use config::EngineConfig;
pub use content::{clean_html, ContentFetcher};
pub use inference::{run_offline, SplitInferenceExecutor};
pub use model::{ClientModel, OfflineModel};
pub use pipeline::{host_of, AlwaysOnline, Connectivity, Detector, EndpointProbe};
pub use provision::ModelProvisioner;
pub use scan::extract_urls;
pub use store::{DomainDenylist, ResultCache};
pub use tokenize::{tokenize_offline, RemoteTokenizer};
