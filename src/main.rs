//! Scholarship Watcher: binary entrypoint.
//! One run per invocation (meant for a scheduler): load `.env`, init
//! tracing, build the pipeline from the environment and run it.
//!
//! Exit codes: 0 success, 1 unexpected failure, 2 missing configuration.

use scholarship_watcher::config::WatcherConfig;
use scholarship_watcher::metrics::Metrics;
use scholarship_watcher::pipeline::{pipeline_from_env, PipelineError};
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const ENV_LOG_LEVEL: &str = "LOG_LEVEL";
const ENV_LOG_FORMAT: &str = "LOG_FORMAT";

/// `RUST_LOG` wins, then `LOG_LEVEL`, then `info`. `LOG_FORMAT=json`
/// switches to one JSON object per line.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            let level = std::env::var(ENV_LOG_LEVEL).unwrap_or_else(|_| "info".into());
            EnvFilter::try_new(level.trim().to_ascii_lowercase())
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let json = std::env::var(ENV_LOG_FORMAT).is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

async fn run(config: WatcherConfig) -> anyhow::Result<()> {
    let metrics = match &config.metrics_textfile {
        Some(_) => match Metrics::install() {
            Ok(m) => Some(m),
            Err(e) => {
                tracing::warn!("metrics disabled: {e:#}");
                None
            }
        },
        None => None,
    };
    let textfile = config.metrics_textfile.clone();

    let pipeline = pipeline_from_env(config).await?;
    let report = pipeline.run().await;

    for ch in report.channels.iter().filter(|c| !c.is_ok()) {
        if let Err(e) = &ch.result {
            tracing::warn!(channel = ch.channel, "notification failed: {e}");
        }
    }
    if let (Some(m), Some(path)) = (metrics, textfile) {
        if let Err(e) = m.write_textfile(&path) {
            tracing::warn!("{e:#}");
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = WatcherConfig::from_env();
    tracing::info!(
        urls = config.urls.len(),
        data_path = %config.data_path.display(),
        dry_run = config.dry_run,
        "scholarship watcher starting"
    );

    let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("failed to start runtime: {e:#}");
            return ExitCode::from(1);
        }
    };

    match rt.block_on(run(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => match e.downcast_ref::<PipelineError>() {
            Some(PipelineError::MissingConfig(_)) => {
                tracing::error!("{e}");
                ExitCode::from(2)
            }
            None => {
                tracing::error!("run failed: {e:#}");
                ExitCode::from(1)
            }
        },
    }
}
