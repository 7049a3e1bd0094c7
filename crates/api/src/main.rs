use anyhow::Context;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use nse_core::config::Settings;
use nse_core::domain::snapshot::{IndexPoint, MarketSnapshot, MarketStatus, Quote, SectorSummary};
use nse_core::ingest::fetcher::MarketFetcher;
use nse_core::ingest::nse::NseClient;
use nse_core::refresh::{RefreshLoop, RefreshOptions};
use nse_core::time::nse_market::MarketCalendar;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    if let Err(err) = serve(settings).await {
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(error = %err, "api failed");
        return Err(err);
    }
    Ok(())
}

async fn serve(settings: Settings) -> anyhow::Result<()> {
    let universe = Arc::new(settings.load_universe()?);
    let client = NseClient::from_settings(&settings).context("failed to build NSE client")?;
    let calendar = MarketCalendar::from_settings(&settings);
    let fetcher = MarketFetcher::new(Arc::new(client), universe, calendar);

    let (tx, rx) = watch::channel(None);
    let refresh = tokio::spawn(
        RefreshLoop::new(fetcher, RefreshOptions::from_settings(&settings)).run(
            shutdown_signal(),
            move |snapshot| {
                // Receivers only go away once the server has stopped.
                let _ = tx.send(Some(Arc::new(snapshot)));
            },
        ),
    );

    let app = router(AppState { snapshots: rx });

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let cycles = refresh.await.context("refresh loop panicked")?;
    tracing::info!(cycles, "api stopped");
    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/snapshot/latest", get(get_latest_snapshot))
        .route("/snapshot/movers", get(get_movers))
        .route("/snapshot/sectors", get(get_sectors))
        .route("/quotes/:symbol", get(get_quote))
        .route("/index/history", get(get_index_history))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Clone)]
struct AppState {
    snapshots: watch::Receiver<Option<Arc<MarketSnapshot>>>,
}

impl AppState {
    /// 503 until the first refresh cycle has published.
    fn latest(&self) -> Result<Arc<MarketSnapshot>, StatusCode> {
        self.snapshots
            .borrow()
            .clone()
            .ok_or(StatusCode::SERVICE_UNAVAILABLE)
    }
}

#[derive(Debug, Serialize)]
struct ApiMovers {
    cycle: u64,
    generated_at: DateTime<Utc>,
    market_status: MarketStatus,
    top_gainers: Vec<Quote>,
    top_losers: Vec<Quote>,
    advancers: usize,
    decliners: usize,
    unchanged: usize,
}

#[derive(Debug, Serialize)]
struct ApiSectors {
    cycle: u64,
    generated_at: DateTime<Utc>,
    sectors: Vec<SectorSummary>,
    unmapped_symbols: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ApiIndexHistory {
    cycle: u64,
    index_name: String,
    is_simulated: bool,
    points: Vec<IndexPoint>,
}

async fn get_latest_snapshot(
    State(state): State<AppState>,
) -> Result<Json<MarketSnapshot>, StatusCode> {
    let snapshot = state.latest()?;
    Ok(Json(snapshot.as_ref().clone()))
}

async fn get_movers(State(state): State<AppState>) -> Result<Json<ApiMovers>, StatusCode> {
    let s = state.latest()?;
    Ok(Json(ApiMovers {
        cycle: s.cycle,
        generated_at: s.generated_at,
        market_status: s.market_status,
        top_gainers: s.top_gainers.clone(),
        top_losers: s.top_losers.clone(),
        advancers: s.advancers,
        decliners: s.decliners,
        unchanged: s.unchanged,
    }))
}

async fn get_sectors(State(state): State<AppState>) -> Result<Json<ApiSectors>, StatusCode> {
    let s = state.latest()?;
    Ok(Json(ApiSectors {
        cycle: s.cycle,
        generated_at: s.generated_at,
        sectors: s.sector_summaries.clone(),
        unmapped_symbols: s.unmapped_symbols.clone(),
    }))
}

async fn get_quote(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<Quote>, StatusCode> {
    let s = state.latest()?;
    let quote = s.quote(&symbol).cloned().ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(quote))
}

async fn get_index_history(
    State(state): State<AppState>,
) -> Result<Json<ApiIndexHistory>, StatusCode> {
    let s = state.latest()?;
    Ok(Json(ApiIndexHistory {
        cycle: s.cycle,
        index_name: s.index_name.clone(),
        is_simulated: s.index_is_simulated,
        points: s.index_history.clone(),
    }))
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
    use nse_core::ingest::provider::OfflineSource;
    use nse_core::universe::Universe;
    use std::time::Duration;

    async fn offline_snapshot(window: usize) -> MarketSnapshot {
        let fetcher = MarketFetcher::new(
            Arc::new(OfflineSource),
            Arc::new(Universe::builtin()),
            MarketCalendar::with_holidays(Vec::<chrono::NaiveDate>::new()),
        );
        let options = RefreshOptions {
            interval: Duration::from_secs(1),
            index_name: "NIFTY 50".to_string(),
            index_window: window,
            concurrency: 4,
            top_movers: 5,
            max_cycles: Some(1),
        };
        RefreshLoop::new(fetcher, options).run_cycle().await
    }

    #[tokio::test]
    async fn unavailable_before_first_cycle() {
        let (_tx, rx) = watch::channel(None);
        let state = AppState { snapshots: rx };

        let err = get_latest_snapshot(State(state.clone())).await.err();
        assert_eq!(err, Some(StatusCode::SERVICE_UNAVAILABLE));
        let err = get_quote(State(state), Path("TCS".to_string())).await.err();
        assert_eq!(err, Some(StatusCode::SERVICE_UNAVAILABLE));
    }

    #[tokio::test]
    async fn serves_published_snapshot() {
        let (tx, rx) = watch::channel(None);
        let state = AppState { snapshots: rx };
        tx.send(Some(Arc::new(offline_snapshot(20).await))).unwrap();

        let Json(latest) = get_latest_snapshot(State(state.clone())).await.unwrap();
        assert_eq!(latest.cycle, 1);
        assert_eq!(latest.quotes.len(), Universe::builtin().len());

        let Json(movers) = get_movers(State(state.clone())).await.unwrap();
        assert!(movers.top_gainers.len() <= 5);
        assert!(movers.top_losers.len() <= 5);
        assert_eq!(
            movers.advancers + movers.decliners + movers.unchanged,
            latest.quotes.len()
        );

        let Json(sectors) = get_sectors(State(state.clone())).await.unwrap();
        assert!(!sectors.sectors.is_empty());
        assert!(sectors.unmapped_symbols.is_empty());

        let Json(history) = get_index_history(State(state.clone())).await.unwrap();
        assert_eq!(history.points.len(), 20);
        assert!(history.is_simulated);
    }

    #[tokio::test]
    async fn quote_lookup_ignores_case_and_rejects_untracked() {
        let (tx, rx) = watch::channel(None);
        let state = AppState { snapshots: rx };
        tx.send(Some(Arc::new(offline_snapshot(5).await))).unwrap();

        let Json(quote) = get_quote(State(state.clone()), Path("reliance".to_string()))
            .await
            .unwrap();
        assert_eq!(quote.symbol, "RELIANCE");
        assert!(quote.is_simulated);

        let err = get_quote(State(state), Path("NOTLISTED".to_string())).await.err();
        assert_eq!(err, Some(StatusCode::NOT_FOUND));
    }
}
