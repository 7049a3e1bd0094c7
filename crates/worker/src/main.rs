use anyhow::Context;
use clap::Parser;
use nse_core::config::{Settings, MAX_INDEX_WINDOW};
use nse_core::domain::snapshot::MarketSnapshot;
use nse_core::ingest::fetcher::MarketFetcher;
use nse_core::ingest::nse::NseClient;
use nse_core::ingest::provider::{MarketDataSource, OfflineSource};
use nse_core::refresh::{RefreshLoop, RefreshOptions};
use nse_core::time::nse_market::MarketCalendar;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "nse_worker")]
struct Args {
    /// Run a single refresh cycle and exit.
    #[arg(long, conflicts_with = "cycles")]
    once: bool,

    /// Stop after this many cycles. Runs until Ctrl-C when omitted.
    #[arg(long)]
    cycles: Option<u64>,

    /// Seconds between cycles. Overrides REFRESH_INTERVAL_SECS.
    #[arg(long)]
    interval_secs: Option<u64>,

    /// Number of 5-minute index bars per snapshot. Overrides INDEX_WINDOW.
    #[arg(long)]
    window: Option<usize>,

    /// Index to chart. Overrides INDEX_NAME.
    #[arg(long)]
    index: Option<String>,

    /// Skip the network entirely; every value is simulated.
    #[arg(long)]
    offline: bool,

    /// Print each snapshot as one JSON line on stdout.
    #[arg(long)]
    json: bool,
}

impl Args {
    fn refresh_options(&self, settings: &Settings) -> anyhow::Result<RefreshOptions> {
        let mut options = RefreshOptions::from_settings(settings);
        if let Some(secs) = self.interval_secs {
            anyhow::ensure!(secs >= 1, "--interval-secs must be >= 1");
            options.interval = Duration::from_secs(secs);
        }
        if let Some(window) = self.window {
            anyhow::ensure!(
                window <= MAX_INDEX_WINDOW,
                "--window must be <= {MAX_INDEX_WINDOW} (got {window})"
            );
            options.index_window = window;
        }
        if let Some(index) = self.index.as_deref() {
            options.index_name = index.to_string();
        }
        options.max_cycles = if self.once { Some(1) } else { self.cycles };
        Ok(options)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    // stdout is reserved for --json output.
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    if let Err(err) = run(args, settings).await {
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(error = %err, "worker failed");
        return Err(err);
    }
    Ok(())
}

async fn run(args: Args, settings: Settings) -> anyhow::Result<()> {
    let options = args.refresh_options(&settings)?;
    let universe = Arc::new(settings.load_universe()?);

    let source: Arc<dyn MarketDataSource> = if args.offline {
        Arc::new(OfflineSource)
    } else {
        Arc::new(NseClient::from_settings(&settings).context("failed to build NSE client")?)
    };

    tracing::info!(
        source = source.source_name(),
        symbols = universe.len(),
        index = %options.index_name,
        window = options.index_window,
        interval_secs = options.interval.as_secs(),
        max_cycles = ?options.max_cycles,
        "starting refresh loop"
    );

    let calendar = MarketCalendar::from_settings(&settings);
    let fetcher = MarketFetcher::new(source, universe, calendar);
    let json = args.json;

    let completed = RefreshLoop::new(fetcher, options)
        .run(shutdown_signal(), |snapshot| {
            if json {
                print_json(&snapshot);
            } else {
                log_summary(&snapshot);
            }
        })
        .await;

    tracing::info!(cycles = completed, "worker finished");
    Ok(())
}

fn print_json(snapshot: &MarketSnapshot) {
    match serde_json::to_string(snapshot) {
        Ok(line) => println!("{line}"),
        Err(err) => tracing::error!(cycle = snapshot.cycle, error = %err, "failed to encode snapshot"),
    }
}

fn log_summary(snapshot: &MarketSnapshot) {
    let top_gainer = snapshot
        .top_gainers
        .first()
        .map(|q| format!("{} {:+.2}%", q.symbol, q.percent_change));
    let top_loser = snapshot
        .top_losers
        .first()
        .map(|q| format!("{} {:+.2}%", q.symbol, q.percent_change));
    let best_sector = snapshot
        .sector_summaries
        .first()
        .map(|s| format!("{} {:+.2}%", s.sector, s.avg_percent_change));

    tracing::info!(
        cycle = snapshot.cycle,
        status = ?snapshot.market_status,
        index = %snapshot.index_name,
        index_close = ?snapshot.index_history.last().map(|p| p.close),
        advancers = snapshot.advancers,
        decliners = snapshot.decliners,
        unchanged = snapshot.unchanged,
        top_gainer = top_gainer.as_deref().unwrap_or("-"),
        top_loser = top_loser.as_deref().unwrap_or("-"),
        best_sector = best_sector.as_deref().unwrap_or("-"),
        pcr = snapshot.pcr,
        vix = snapshot.vix,
        simulated = snapshot.has_simulated_data(),
        "market snapshot"
    );

    if !snapshot.unmapped_symbols.is_empty() {
        tracing::warn!(
            symbols = ?snapshot.unmapped_symbols,
            "symbols without a sector are excluded from sector averages"
        );
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn once_means_a_single_cycle() {
        let args = Args::try_parse_from(["nse_worker", "--once", "--offline"]).unwrap();
        let options = args.refresh_options(&Settings::default()).unwrap();
        assert_eq!(options.max_cycles, Some(1));
        assert!(args.offline);
    }

    #[test]
    fn flags_override_settings() {
        let args = Args::try_parse_from([
            "nse_worker",
            "--cycles",
            "4",
            "--interval-secs",
            "2",
            "--window",
            "12",
            "--index",
            "NIFTY BANK",
        ])
        .unwrap();
        let options = args.refresh_options(&Settings::default()).unwrap();
        assert_eq!(options.max_cycles, Some(4));
        assert_eq!(options.interval, Duration::from_secs(2));
        assert_eq!(options.index_window, 12);
        assert_eq!(options.index_name, "NIFTY BANK");
    }

    #[test]
    fn rejects_zero_interval_and_conflicting_limits() {
        let args = Args::try_parse_from(["nse_worker", "--interval-secs", "0"]).unwrap();
        assert!(args.refresh_options(&Settings::default()).is_err());
        assert!(Args::try_parse_from(["nse_worker", "--once", "--cycles", "3"]).is_err());
    }

    #[test]
    fn rejects_oversize_window() {
        let args = Args::try_parse_from(["nse_worker", "--window", "5000"]).unwrap();
        assert!(args.refresh_options(&Settings::default()).is_err());

        let cap = MAX_INDEX_WINDOW.to_string();
        let args = Args::try_parse_from(["nse_worker", "--window", cap.as_str()]).unwrap();
        let options = args.refresh_options(&Settings::default()).unwrap();
        assert_eq!(options.index_window, MAX_INDEX_WINDOW);
    }
}
