//! Split-inference execution: local forward pass, smashed-data upload, and
//! remote response interpretation.

use phishguard_core::{Error, Prediction, Result, SmashedVector, TokenBatch};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{ClientModel, OfflineModel};

/// Fixed score reported when the offline fallback flags a page.
pub const OFFLINE_POSITIVE_SCORE: f32 = 0.6;

/// Fixed score reported when the offline fallback clears a page.
pub const OFFLINE_NEGATIVE_SCORE: f32 = 0.4;

#[derive(Serialize)]
struct PredictRequest<'a> {
    smashed_data: &'a [f32],
}

#[derive(Deserialize)]
struct PredictResponse {
    is_phishing: bool,
    phishing_probability: f32,
}

/// Runs the client half of the split model locally and completes the
/// inference against the remote prediction endpoint.
pub struct SplitInferenceExecutor {
    http: reqwest::Client,
    endpoint: String,
}

impl SplitInferenceExecutor {
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }

    /// Full split inference: local forward pass, then remote completion.
    ///
    /// A forward-pass fault propagates as [`Error::Inference`] without retry;
    /// it indicates a tensor-shape or runtime bug, not a transient condition.
    pub async fn run(&self, model: &ClientModel, batch: &TokenBatch) -> Result<Prediction> {
        let smashed = model.forward(batch)?;
        debug!("smashed vector length {}", smashed.len());
        self.classify_remote(&smashed).await
    }

    /// Upload the smashed vector and parse the remote classification.
    /// The vector is an opaque blob to this client.
    pub async fn classify_remote(&self, smashed: &SmashedVector) -> Result<Prediction> {
        let resp = self
            .http
            .post(&self.endpoint)
            .json(&PredictRequest {
                smashed_data: smashed.as_slice(),
            })
            .send()
            .await
            .map_err(|e| Error::network(format!("predict request failed: {}", e)))?;

        if !resp.status().is_success() {
            return Err(Error::network(format!(
                "predict endpoint returned status {}",
                resp.status()
            )));
        }

        let parsed: PredictResponse = resp
            .json()
            .await
            .map_err(|e| Error::malformed(format!("predict response: {}", e)))?;

        Ok(Prediction {
            is_phishing: parsed.is_phishing,
            score: parsed.phishing_probability,
        })
    }
}

/// Run the degraded offline path: the bundled fallback model's boolean
/// verdict with a fixed heuristic confidence, since this path has no
/// calibrated probability to report.
pub fn run_offline(model: &OfflineModel, batch: &TokenBatch) -> Result<Prediction> {
    let flagged = model.forward(batch)?;
    Ok(Prediction {
        is_phishing: flagged,
        score: if flagged {
            OFFLINE_POSITIVE_SCORE
        } else {
            OFFLINE_NEGATIVE_SCORE
        },
    })
}
