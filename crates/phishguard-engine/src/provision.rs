//! Model provisioning: download-with-retry and one-time load.
//!
//! The client-part artifact is fetched from the configured endpoint when it
//! is not already on disk, streamed to the model directory, sanity-checked
//! against a minimum size, and loaded into an in-process handle exactly
//! once. Provisioning is idempotent and safe under concurrent first use:
//! every caller awaits the same initialization, and a failed attempt leaves
//! no partial artifact behind.

use candle_core::Device;
use futures_util::StreamExt;
use phishguard_core::{Error, Result};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::model::ClientModel;

/// File name of the client-part artifact inside the model directory.
pub const MODEL_FILE_NAME: &str = "client_part.pt";

/// Artifacts smaller than this are treated as corrupt downloads.
pub const MIN_MODEL_BYTES: u64 = 10 * 1024;

/// Download/load attempts before surfacing a terminal error.
pub const MAX_ATTEMPTS: u32 = 2;

/// Ensures the client-part model is present on disk and loaded in-process.
pub struct ModelProvisioner {
    http: reqwest::Client,
    model_url: String,
    model_path: PathBuf,
    device: Device,
    loaded: OnceCell<Arc<ClientModel>>,
}

impl ModelProvisioner {
    pub fn new(http: reqwest::Client, model_url: impl Into<String>, model_dir: &Path) -> Self {
        Self {
            http,
            model_url: model_url.into(),
            model_path: model_dir.join(MODEL_FILE_NAME),
            device: Device::Cpu,
            loaded: OnceCell::new(),
        }
    }

    /// Path the artifact is (or will be) stored at.
    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Return the loaded model handle, provisioning it first if needed.
    ///
    /// Concurrent callers coalesce on a single download/load; a failed
    /// initialization is not cached, so the next caller retries from
    /// scratch.
    pub async fn ensure_loaded(&self) -> Result<Arc<ClientModel>> {
        self.ensure_loaded_with(ClientModel::load).await
    }

    /// [`Self::ensure_loaded`] with an injectable loader, so the
    /// provision-then-load path can be exercised without a real weights
    /// file.
    async fn ensure_loaded_with<F>(&self, load: F) -> Result<Arc<ClientModel>>
    where
        F: Fn(&Path, &Device) -> Result<ClientModel>,
    {
        let load = &load;
        let model = self
            .loaded
            .get_or_try_init(|| {
                self.with_retries("model provisioning", move || async move {
                    self.ensure_artifact_once().await?;
                    Ok(Arc::new(load(&self.model_path, &self.device)?))
                })
            })
            .await?;
        Ok(model.clone())
    }

    /// Ensure a sane artifact exists on disk without loading it, honoring
    /// the same retry budget as [`Self::ensure_loaded`].
    pub async fn ensure_artifact(&self) -> Result<PathBuf> {
        self.with_retries("model download", || async move {
            self.ensure_artifact_once().await?;
            Ok(self.model_path.clone())
        })
        .await
    }

    /// Run `op` up to [`MAX_ATTEMPTS`] times, deleting the partial/corrupt
    /// artifact between attempts. Exhausting the budget is terminal.
    async fn with_retries<T, Fut>(&self, what: &str, op: impl Fn() -> Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        let mut last_err = String::new();
        for attempt in 1..=MAX_ATTEMPTS {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!("{} attempt {}/{} failed: {}", what, attempt, MAX_ATTEMPTS, e);
                    let _ = fs::remove_file(&self.model_path).await;
                    last_err = e.to_string();
                }
            }
        }
        Err(Error::model_load(format!(
            "{} failed after {} attempts: {}",
            what, MAX_ATTEMPTS, last_err
        )))
    }

    /// One attempt: download when absent, then size-check.
    async fn ensure_artifact_once(&self) -> Result<()> {
        if fs::metadata(&self.model_path).await.is_err() {
            self.download().await?;
        }
        self.check_artifact().await
    }

    async fn download(&self) -> Result<()> {
        info!("downloading model artifact from {}", self.model_url);

        let resp = self
            .http
            .post(&self.model_url)
            .send()
            .await
            .map_err(|e| Error::network(format!("model download request failed: {}", e)))?;
        if !resp.status().is_success() {
            return Err(Error::network(format!(
                "model download returned status {}",
                resp.status()
            )));
        }

        if let Some(parent) = self.model_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = fs::File::create(&self.model_path).await?;

        let total = resp.content_length();
        let mut received = 0u64;
        let mut last_logged_pct = 0u64;
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk =
                chunk.map_err(|e| Error::network(format!("model download interrupted: {}", e)))?;
            file.write_all(&chunk).await?;
            received += chunk.len() as u64;
            if let Some(total) = total.filter(|&t| t > 0) {
                let pct = received * 100 / total;
                if pct >= last_logged_pct + 25 {
                    debug!("model download progress: {}%", pct);
                    last_logged_pct = pct;
                }
            }
        }
        file.flush().await?;

        info!("model artifact downloaded ({} bytes)", received);
        Ok(())
    }

    /// Reject obviously truncated artifacts. The threshold is far below any
    /// real export; undersized files mean the download was cut short.
    async fn check_artifact(&self) -> Result<()> {
        let len = fs::metadata(&self.model_path).await?.len();
        if len < MIN_MODEL_BYTES {
            let _ = fs::remove_file(&self.model_path).await;
            return Err(Error::model_load(format!(
                "model artifact undersized ({} bytes, expected at least {})",
                len, MIN_MODEL_BYTES
            )));
        }
        Ok(())
    }
}
