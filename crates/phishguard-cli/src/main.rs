//! PhishGuard CLI
//!
//! Thin front end over the detection engine: check a URL, scan message text
//! for candidate URLs, manage the denylist, and sweep the result cache.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use phishguard_engine::{Detector, EndpointProbe, EngineConfig, Verdict};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "phishguard")]
#[command(about = "Split-inference phishing URL detection", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "phishguard.yaml")]
    config: String,

    /// Model-download endpoint override
    #[arg(long)]
    model_url: Option<String>,

    /// Tokenize endpoint override
    #[arg(long)]
    tokenize_url: Option<String>,

    /// Predict endpoint override
    #[arg(long)]
    predict_url: Option<String>,

    /// SQLite store path override
    #[arg(long)]
    store: Option<String>,

    /// Probe this host:port to decide online/offline instead of assuming
    /// connectivity
    #[arg(long)]
    probe: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify a single URL
    Check {
        /// The URL to classify
        url: String,
    },
    /// Extract URLs from message text and classify each
    Scan {
        /// Free-form message text (e.g. an SMS body)
        text: String,
    },
    /// Replace the domain denylist with the domains in a file (one per line)
    RefreshDenylist {
        /// Path to the domain list
        file: String,
    },
    /// Delete expired result-cache entries
    Evict,
    /// Download and load the client model without classifying anything
    WarmUp,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    let config = load_config(&cli)?;
    let mut detector = Detector::new(&config).context("failed to build detection pipeline")?;
    if let Some(probe) = &cli.probe {
        detector = detector.with_connectivity(Arc::new(EndpointProbe::new(probe.clone())));
    }

    match &cli.command {
        Command::Check { url } => check_one(&detector, url).await,
        Command::Scan { text } => {
            let results = detector.check_message(text).await;
            if results.is_empty() {
                info!("no URLs found in message text");
                return Ok(());
            }
            // Every URL gets its own result; failures don't stop the rest,
            // but any failure makes the exit status non-zero.
            let total = results.len();
            let mut failed = 0usize;
            for (url, outcome) in results {
                match outcome {
                    Ok(verdict) => print_verdict(&url, &verdict)?,
                    Err(e) => {
                        error!("check failed for {}: {}", url, e);
                        failed += 1;
                    }
                }
            }
            if failed > 0 {
                anyhow::bail!("{} of {} URLs failed to classify", failed, total);
            }
            Ok(())
        }
        Command::RefreshDenylist { file } => {
            let content = std::fs::read_to_string(file)
                .with_context(|| format!("failed to read {}", file))?;
            let domains: Vec<&str> = content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .collect();
            let inserted = detector.denylist().refresh(&domains)?;
            println!("denylist now holds {} domains", inserted);
            Ok(())
        }
        Command::Evict => {
            let removed = detector.cache().evict_expired()?;
            println!("evicted {} expired entries", removed);
            Ok(())
        }
        Command::WarmUp => {
            // Terminal model-load failure is the one error the app cannot
            // proceed past; bubble it up and exit non-zero.
            detector.warm_up().await?;
            println!("client model ready");
            Ok(())
        }
    }
}

async fn check_one(detector: &Detector, url: &str) -> Result<()> {
    match detector.check_url(url).await {
        Ok(verdict) => print_verdict(url, &verdict),
        Err(e) => {
            error!("check failed for {}: {}", url, e);
            Err(e.into())
        }
    }
}

fn print_verdict(url: &str, verdict: &Verdict) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "url": url,
            "verdict": verdict,
        }))?
    );
    Ok(())
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = EngineConfig::load(&cli.config)?;

    if let Some(model_url) = &cli.model_url {
        config.model_url = model_url.clone();
    }
    if let Some(tokenize_url) = &cli.tokenize_url {
        config.tokenize_url = tokenize_url.clone();
    }
    if let Some(predict_url) = &cli.predict_url {
        config.predict_url = predict_url.clone();
    }
    if let Some(store) = &cli.store {
        config.store_path = store.into();
    }

    Ok(config)
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("phishguard=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("phishguard=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
