use indexscraper::{config::PipelineConfig, pipeline};
use std::{env, path::PathBuf, process::exit};
use tokio::time::Instant;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    // ─── 2) load config ──────────────────────────────────────────────
    let cfg = match PipelineConfig::load(env::args().nth(1).map(PathBuf::from)) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("config error: {:#}", e);
            exit(1);
        }
    };

    // ─── 3) download, load, materialize ──────────────────────────────
    let start = Instant::now();
    match pipeline::run(&cfg).await {
        Ok(summary) => {
            for (family, rows) in &summary.loaded {
                info!(%family, rows, "loaded");
            }
            info!(elapsed = ?start.elapsed(), "all done");
        }
        Err(e) => {
            error!(elapsed = ?start.elapsed(), "pipeline failed: {:#}", e);
            exit(1);
        }
    }
}
