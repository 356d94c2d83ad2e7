//! Market Archiver Binary
//!
//! Archives intraday bars from the brokerage gateway (replayed
//! deterministically when no live session exists) and daily series from the
//! web data service, writing per-symbol, per-day CSV files.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p market-archiver
//! ```
//!
//! # Environment Variables
//!
//! All optional; `infrastructure::config` documents the full table.
//!
//! - `ARCHIVE_JOBS`: `web`, `replay`, or both (default: web)
//! - `ARCHIVE_START_DATE` / `ARCHIVE_END_DATE`: archive window
//!   (default: 2010-01-01 through today)
//! - `GATEWAY_*`: gateway endpoint, contracts, retry and pacing knobs
//! - `WEBDATA_*`: chart endpoint, symbols, retry spread
//! - `RUST_LOG`: log filter (default: info, crate at debug)

use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDate;
use market_archiver::{
    ArchiveConfig, ArchiveJob, ArchiveSummary, BarStore, DailySeriesStore, GatewayArchiveService,
    GatewayArchiveSettings, GatewayClient, ReplayScript, ReplayTransport, RequestRegistry,
    WebArchiveService, WebDataClient, trading_days,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Bars generated per synthetic replay day.
const REPLAY_BARS_PER_DAY: usize = 8;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_file = load_dotenv();
    market_archiver::init_telemetry().context("telemetry init")?;
    if let Some(path) = env_file {
        tracing::debug!(path = %path.display(), "environment loaded from .env");
    }

    let config = ArchiveConfig::from_env().context("configuration")?;
    log_startup(&config);

    let shutdown = CancellationToken::new();
    spawn_signal_listener(shutdown.clone());

    for job in &config.jobs {
        if shutdown.is_cancelled() {
            break;
        }
        match job {
            ArchiveJob::Web => run_web_job(&config, &shutdown).await?,
            ArchiveJob::Replay => run_replay_job(&config, &shutdown).await?,
        }
    }

    tracing::info!("market archiver stopped");
    Ok(())
}

/// Load `.env` from the current directory or any ancestor.
fn load_dotenv() -> Option<std::path::PathBuf> {
    dotenvy::dotenv().ok()
}

/// Log the parsed configuration.
fn log_startup(config: &ArchiveConfig) {
    let jobs: Vec<&str> = config.jobs.iter().map(|job| job.as_str()).collect();
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        jobs = %jobs.join(","),
        start = %config.start_date,
        end = %config.end_date,
        "market archiver starting"
    );
    tracing::debug!(
        gateway_host = %config.gateway.host,
        gateway_port = config.gateway.port,
        contracts = config.gateway.contracts.len(),
        base_url = %config.webdata.base_url,
        symbols = config.webdata.symbols.len(),
        "configured endpoints"
    );
}

/// Cancel `shutdown` on SIGINT or SIGTERM.
#[allow(clippy::expect_used)]
fn spawn_signal_listener(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            signal::ctrl_c()
                .await
                .expect("signal handler installation is critical for graceful shutdown");
        };

        #[cfg(unix)]
        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("SIGTERM handler installation is critical for graceful shutdown")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => {
                tracing::info!("received ctrl-c, stopping at the next unit boundary");
            }
            () = terminate => {
                tracing::info!("received SIGTERM, stopping at the next unit boundary");
            }
        }

        shutdown.cancel();
    });
}

/// Fetch and rewrite the daily series of each configured symbol.
async fn run_web_job(config: &ArchiveConfig, shutdown: &CancellationToken) -> anyhow::Result<()> {
    let client = WebDataClient::new(&config.webdata).context("web data client")?;
    let service = WebArchiveService::new(
        Arc::new(client),
        DailySeriesStore::new(config.store.daily_dir.clone()),
        config.webdata.symbols.clone(),
        config.start_date,
        config.end_date,
        shutdown.clone(),
    );
    let summary = service.archive_symbols().await.context("web archive job")?;

    for (symbol, reason) in &summary.failed {
        tracing::warn!(%symbol, %reason, "symbol not archived");
    }
    tracing::info!(
        written = summary.written,
        failed = summary.failed.len(),
        "web job done"
    );
    Ok(())
}

/// Replay the gateway pipeline over the archive window, writing day files.
///
/// The gateway job blocks on per-request waits, so it runs on a blocking
/// thread off the async runtime.
async fn run_replay_job(
    config: &ArchiveConfig,
    shutdown: &CancellationToken,
) -> anyhow::Result<()> {
    // Newest day first; existing day files are skipped, so an interrupted
    // run resumes at the gap.
    let days: Vec<NaiveDate> = trading_days(config.end_date, config.start_date).collect();
    let settings = GatewayArchiveSettings::from(&config.gateway);
    let store = BarStore::new(config.store.intraday_dir.clone());
    let host = config.gateway.host.clone();
    let port = config.gateway.port;
    let client_id = config.gateway.client_id;
    let shutdown = shutdown.clone();

    let summary = tokio::task::spawn_blocking(move || -> anyhow::Result<ArchiveSummary> {
        let registry = Arc::new(RequestRegistry::new());
        let script = ReplayScript::synthetic(&settings.contracts, &days, REPLAY_BARS_PER_DAY);
        let transport = Arc::new(ReplayTransport::new(script, Arc::clone(&registry)));
        let client = GatewayClient::new(client_id, registry, transport);
        let _session = client.connect(&host, port).context("gateway connect")?;
        let service = GatewayArchiveService::new(client, store, settings, shutdown);
        service.archive_range(&days).context("gateway archive job")
    })
    .await
    .context("replay job thread")??;

    for (symbol, day) in &summary.unfetched {
        tracing::warn!(%symbol, %day, "day not fetched");
    }
    tracing::info!(
        written = summary.written,
        skipped = summary.skipped,
        unfetched = summary.unfetched.len(),
        "replay job done"
    );
    Ok(())
}
