//! End-to-end URL checking pipeline.
//!
//! Control flow: domain denylist → result cache → online fork (fetch/clean
//! → remote tokenize → split inference → cache write) or offline fork
//! (heuristic tokenizer → bundled fallback model). All failures convert into
//! the typed error taxonomy at this boundary.
//!
//! Concurrent lookups for the same URL are intentionally not de-duplicated:
//! two in-flight checks may both run and race on the cache write (last
//! writer wins). The cache upsert is transactional, so the
//! one-row-per-url invariant holds either way.

use candle_core::Device;
use phishguard_core::{Error, Prediction, Result, Verdict, VerdictSource, DENYLIST_SCORE};
use std::net::ToSocketAddrs;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::config::EngineConfig;
use crate::content::ContentFetcher;
use crate::inference::{run_offline, SplitInferenceExecutor};
use crate::model::OfflineModel;
use crate::provision::ModelProvisioner;
use crate::scan::extract_urls;
use crate::store::{DomainDenylist, ResultCache};
use crate::tokenize::{tokenize_offline, RemoteTokenizer};

/// Connectivity probe deciding between the online and offline forks.
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Always reports online. Default when no probe is configured.
pub struct AlwaysOnline;

impl Connectivity for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }
}

/// Reports online when a TCP connection to the given `host:port` succeeds
/// within the timeout. Cheap stand-in for a platform connectivity API.
pub struct EndpointProbe {
    addr: String,
    timeout: Duration,
}

impl EndpointProbe {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            timeout: Duration::from_secs(1),
        }
    }
}

impl Connectivity for EndpointProbe {
    fn is_online(&self) -> bool {
        self.addr
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .map(|addr| std::net::TcpStream::connect_timeout(&addr, self.timeout).is_ok())
            .unwrap_or(false)
    }
}

/// The assembled detection pipeline. Constructed once at process start and
/// shared by reference; holds no global state.
pub struct Detector {
    provisioner: ModelProvisioner,
    fetcher: ContentFetcher,
    tokenizer: RemoteTokenizer,
    executor: SplitInferenceExecutor,
    cache: ResultCache,
    denylist: DomainDenylist,
    offline_model: Option<OfflineModel>,
    connectivity: Arc<dyn Connectivity>,
}

impl Detector {
    /// Build the pipeline from configuration.
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| Error::config(format!("failed to build http client: {}", e)))?;

        let offline_model = match &config.offline_model_path {
            Some(path) => Some(OfflineModel::load(path, &Device::Cpu)?),
            None => None,
        };

        Ok(Self {
            provisioner: ModelProvisioner::new(
                http.clone(),
                config.model_url.clone(),
                &config.model_dir,
            ),
            fetcher: ContentFetcher::new(http.clone(), config.user_agent.clone()),
            tokenizer: RemoteTokenizer::new(http.clone(), config.tokenize_url.clone()),
            executor: SplitInferenceExecutor::new(http, config.predict_url.clone()),
            cache: ResultCache::open(&config.store_path)?,
            denylist: DomainDenylist::open(&config.store_path)?,
            offline_model,
            connectivity: Arc::new(AlwaysOnline),
        })
    }

    /// Replace the connectivity probe.
    pub fn with_connectivity(mut self, connectivity: Arc<dyn Connectivity>) -> Self {
        self.connectivity = connectivity;
        self
    }

    /// Install an offline fallback model built elsewhere (e.g. from bundled
    /// weights).
    pub fn with_offline_model(mut self, model: OfflineModel) -> Self {
        self.offline_model = Some(model);
        self
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn denylist(&self) -> &DomainDenylist {
        &self.denylist
    }

    /// Provision the client model ahead of the first lookup. Optional;
    /// `check_url` provisions lazily on the online fork.
    pub async fn warm_up(&self) -> Result<()> {
        self.provisioner.ensure_loaded().await.map(|_| ())
    }

    /// Classify a URL.
    pub async fn check_url(&self, url: &str) -> Result<Verdict> {
        let domain = host_of(url);
        if self.denylist.is_denied(&domain)? {
            info!("denylist hit for {}", domain);
            // Maximal-confidence verdict; deliberately not written to the
            // cache so a denylist removal takes effect immediately.
            return Ok(Verdict::new(
                Prediction {
                    is_phishing: true,
                    score: DENYLIST_SCORE,
                },
                VerdictSource::Denylist,
            ));
        }

        if let Some(entry) = self.cache.get(url)? {
            debug!("cache hit for {}", url);
            return Ok(Verdict::new(entry.prediction(), VerdictSource::Cache));
        }

        // Probes may block on DNS or TCP; keep them off the async workers.
        // A panicking probe counts as offline.
        let connectivity = Arc::clone(&self.connectivity);
        let online = tokio::task::spawn_blocking(move || connectivity.is_online())
            .await
            .unwrap_or(false);

        if online {
            self.check_online(url).await
        } else {
            self.check_offline(url)
        }
    }

    /// Extract every URL from free-form message text and classify each one.
    /// URLs are checked independently; one failure does not stop the rest.
    pub async fn check_message(&self, text: &str) -> Vec<(String, Result<Verdict>)> {
        let mut results = Vec::new();
        for url in extract_urls(text) {
            let outcome = self.check_url(&url).await;
            results.push((url, outcome));
        }
        results
    }

    async fn check_online(&self, url: &str) -> Result<Verdict> {
        let text = self
            .fetcher
            .fetch_and_clean(url)
            .await
            .ok_or_else(|| Error::network(format!("failed to fetch page content for {}", url)))?;

        let model = self.provisioner.ensure_loaded().await?;

        let batch = self
            .tokenizer
            .tokenize(&text)
            .await
            .ok_or_else(|| Error::network("tokenize request failed"))?;

        let prediction = self.executor.run(&model, &batch).await?;
        self.cache
            .put(url, prediction.is_phishing, prediction.score)?;

        Ok(Verdict::new(prediction, VerdictSource::Online))
    }

    fn check_offline(&self, url: &str) -> Result<Verdict> {
        debug!("offline fork for {}", url);
        let model = self
            .offline_model
            .as_ref()
            .ok_or_else(|| Error::model_load("offline fallback model is not available"))?;

        let batch = tokenize_offline(url);
        let prediction = run_offline(model, &batch)?;
        Ok(Verdict::new(prediction, VerdictSource::Offline))
    }
}

/// Extract the host component for denylist matching. Unparseable URLs fall
/// back to matching on the raw string.
pub fn host_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_of_extracts_host() {
        assert_eq!(host_of("http://phish.example/a/b?c=d"), "phish.example");
        assert_eq!(host_of("https://sub.evil.com:8443/"), "sub.evil.com");
    }

    #[test]
    fn test_host_of_falls_back_to_raw_string() {
        assert_eq!(host_of("not a url"), "not a url");
    }

    #[test]
    fn test_endpoint_probe_offline_when_unreachable() {
        // Port 1 is never listening on loopback.
        let probe = EndpointProbe::new("127.0.0.1:1");
        assert!(!probe.is_online());
    }
}
