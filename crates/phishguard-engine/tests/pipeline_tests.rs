//! End-to-end pipeline tests with local mock endpoints.

use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use phishguard_core::{Error, SmashedVector, VerdictSource, DENYLIST_SCORE, SEQ_LEN};
use phishguard_engine::{
    ClientModel, Connectivity, Detector, EngineConfig, OfflineModel, RemoteTokenizer,
    SplitInferenceExecutor,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Spawn a server answering `path` with a fixed JSON value, counting hits.
async fn spawn_json_server(path: &'static str, response: Value) -> (String, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_handler = hits.clone();

    let app = Router::new().route(
        path,
        post(move || {
            let hits = hits_handler.clone();
            let response = response.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Json(response)
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}{}", addr, path), hits)
}

async fn spawn_failing_server(path: &'static str) -> String {
    let app = Router::new().route(
        path,
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}{}", addr, path)
}

/// Detector wired to counting endpoints and a temp store.
async fn test_detector(dir: &tempfile::TempDir) -> (Detector, Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let (tokenize_url, tokenize_hits) = spawn_json_server(
        "/tokenize",
        json!({"input_ids": [1, 2], "attention_mask": [1, 1]}),
    )
    .await;
    let (predict_url, predict_hits) = spawn_json_server(
        "/predict/",
        json!({"is_phishing": false, "phishing_probability": 0.05}),
    )
    .await;

    let config = EngineConfig {
        tokenize_url,
        predict_url,
        model_dir: dir.path().join("models"),
        store_path: dir.path().join("store.db"),
        ..EngineConfig::default()
    };
    (
        Detector::new(&config).unwrap(),
        tokenize_hits,
        predict_hits,
    )
}

struct ForcedOffline;

impl Connectivity for ForcedOffline {
    fn is_online(&self) -> bool {
        false
    }
}

#[tokio::test]
async fn test_denylist_hit_short_circuits_without_network() {
    let dir = tempfile::tempdir().unwrap();
    let (detector, tokenize_hits, predict_hits) = test_detector(&dir).await;

    detector.denylist().refresh(["phish.example"]).unwrap();

    let verdict = detector.check_url("http://phish.example/a").await.unwrap();
    assert!(verdict.prediction.is_phishing);
    assert_eq!(verdict.prediction.score, DENYLIST_SCORE);
    assert_eq!(verdict.source, VerdictSource::Denylist);

    // No tokenize/predict traffic and no cache write.
    assert_eq!(tokenize_hits.load(Ordering::SeqCst), 0);
    assert_eq!(predict_hits.load(Ordering::SeqCst), 0);
    assert!(detector.cache().get("http://phish.example/a").unwrap().is_none());
}

#[tokio::test]
async fn test_cache_hit_short_circuits() {
    let dir = tempfile::tempdir().unwrap();
    let (detector, tokenize_hits, _) = test_detector(&dir).await;

    detector.cache().put("http://seen.example/", true, 0.71).unwrap();

    let verdict = detector.check_url("http://seen.example/").await.unwrap();
    assert_eq!(verdict.source, VerdictSource::Cache);
    assert!(verdict.prediction.is_phishing);
    assert_eq!(verdict.prediction.score, 0.71);
    assert_eq!(tokenize_hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_offline_fork_uses_fallback_model() {
    let dir = tempfile::tempdir().unwrap();
    let (detector, tokenize_hits, predict_hits) = test_detector(&dir).await;

    let device = Device::Cpu;
    let offline = OfflineModel::new(VarBuilder::zeros(DType::F32, &device), &device).unwrap();
    let detector = detector
        .with_offline_model(offline)
        .with_connectivity(Arc::new(ForcedOffline));

    let verdict = detector.check_url("http://unknown.example/x").await.unwrap();
    assert_eq!(verdict.source, VerdictSource::Offline);
    // Degraded fork reports the fixed heuristic confidence.
    assert_eq!(verdict.prediction.score, 0.4);
    assert!(!verdict.prediction.is_phishing);

    assert_eq!(tokenize_hits.load(Ordering::SeqCst), 0);
    assert_eq!(predict_hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_offline_fork_without_model_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let (detector, _, _) = test_detector(&dir).await;
    let detector = detector.with_connectivity(Arc::new(ForcedOffline));

    let err = detector.check_url("http://unknown.example/").await.unwrap_err();
    assert!(matches!(err, Error::ModelLoad(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_message_urls_checked_independently() {
    let dir = tempfile::tempdir().unwrap();
    let (detector, _, _) = test_detector(&dir).await;
    // Offline with no fallback model: any non-denylisted URL errors.
    let detector = detector.with_connectivity(Arc::new(ForcedOffline));
    detector.denylist().refresh(["bad.example"]).unwrap();

    let results = detector
        .check_message(
            "pay at http://bad.example/a or http://unknown.example/b or http://bad.example/c",
        )
        .await;

    assert_eq!(results.len(), 3);
    assert!(results[0].1.as_ref().unwrap().prediction.is_phishing);
    assert!(matches!(results[1].1, Err(Error::ModelLoad(_))));
    // The middle failure does not stop the last URL.
    assert!(results[2].1.as_ref().unwrap().prediction.is_phishing);
}

#[tokio::test]
async fn test_remote_tokenizer_clamps_and_pads() {
    let (url, _) = spawn_json_server(
        "/tokenize",
        json!({
            "input_ids": [5, 9_999_999],
            "attention_mask": [1, 1],
            "vocab_size": 100,
        }),
    )
    .await;
    let tokenizer = RemoteTokenizer::new(reqwest::Client::new(), url);

    let batch = tokenizer.tokenize("Hello world").await.unwrap();
    assert_eq!(batch.input_ids.len(), SEQ_LEN);
    assert_eq!(&batch.input_ids[..2], &[5, 99]);
    assert_eq!(&batch.attention_mask[..2], &[1, 1]);
    assert!(batch.input_ids[2..].iter().all(|&id| id == 0));
    assert!(batch.attention_mask[2..].iter().all(|&m| m == 0));
}

#[tokio::test]
async fn test_remote_tokenizer_defaults_vocab_size() {
    let (url, _) = spawn_json_server(
        "/tokenize",
        json!({"input_ids": [40_000], "attention_mask": [1]}),
    )
    .await;
    let tokenizer = RemoteTokenizer::new(reqwest::Client::new(), url);

    // Default vocab bound is 32128; 40000 clamps to 32127.
    let batch = tokenizer.tokenize("x").await.unwrap();
    assert_eq!(batch.input_ids[0], 32_127);
}

#[tokio::test]
async fn test_remote_tokenizer_http_failure_returns_none() {
    let url = spawn_failing_server("/tokenize").await;
    let tokenizer = RemoteTokenizer::new(reqwest::Client::new(), url);
    assert!(tokenizer.tokenize("text").await.is_none());
}

#[tokio::test]
async fn test_split_inference_round_trip() {
    let (url, hits) = spawn_json_server(
        "/predict/",
        json!({"is_phishing": true, "phishing_probability": 0.93}),
    )
    .await;
    let executor = SplitInferenceExecutor::new(reqwest::Client::new(), url);

    let device = Device::Cpu;
    let model = ClientModel::new(VarBuilder::zeros(DType::F32, &device), &device).unwrap();
    let batch = phishguard_core::TokenBatch::from_remote(&[3, 7], &[1, 1], 1000);

    let prediction = executor.run(&model, &batch).await.unwrap();
    assert!(prediction.is_phishing);
    assert_eq!(prediction.score, 0.93);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_predict_http_failure_is_network_error() {
    let url = spawn_failing_server("/predict/").await;
    let executor = SplitInferenceExecutor::new(reqwest::Client::new(), url);

    let err = executor
        .classify_remote(&SmashedVector::new(vec![0.0; 8]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Network(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_predict_missing_fields_is_malformed_response() {
    let (url, _) = spawn_json_server("/predict/", json!({"is_phishing": true})).await;
    let executor = SplitInferenceExecutor::new(reqwest::Client::new(), url);

    let err = executor
        .classify_remote(&SmashedVector::new(vec![0.0; 8]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MalformedResponse(_)), "got {:?}", err);
}
