use crate::config::MAX_INDEX_WINDOW;
use crate::domain::snapshot::{IndexHistory, Quote};
use crate::ingest::error::FetchError;
use crate::ingest::provider::MarketDataSource;
use crate::ingest::simulate;
use crate::time::nse_market::MarketCalendar;
use crate::universe::{Universe, DEFAULT_INDEX_BASELINE};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Fetch-with-fallback front of a [`MarketDataSource`]. Every public fetch returns a usable
/// value; upstream failures are replaced by simulated data flagged as such.
#[derive(Clone)]
pub struct MarketFetcher {
    source: Arc<dyn MarketDataSource>,
    universe: Arc<Universe>,
    calendar: MarketCalendar,
}

impl MarketFetcher {
    pub fn new(
        source: Arc<dyn MarketDataSource>,
        universe: Arc<Universe>,
        calendar: MarketCalendar,
    ) -> Self {
        Self {
            source,
            universe,
            calendar,
        }
    }

    pub fn source_name(&self) -> &'static str {
        self.source.source_name()
    }

    pub fn universe(&self) -> &Universe {
        &self.universe
    }

    pub fn calendar(&self) -> &MarketCalendar {
        &self.calendar
    }

    /// Best-effort; a failed priming only means the following fetches are likely to fail too.
    pub async fn prime_session(&self) {
        if let Err(err) = self.source.prime_session().await {
            tracing::warn!(
                source = self.source.source_name(),
                kind = err.kind.as_str(),
                error = %err,
                "session priming failed"
            );
        }
    }

    pub async fn fetch_quote(&self, symbol: &str) -> Quote {
        self.fetch_quote_outcome(symbol).await.0
    }

    /// Like [`fetch_quote`](Self::fetch_quote) but also reports why the live path was abandoned.
    pub async fn fetch_quote_outcome(&self, symbol: &str) -> (Quote, Option<FetchError>) {
        let err = match self.source.fetch_live_quote(symbol).await {
            Ok(q) if q.symbol == symbol && q.is_within_day_range() && !q.is_simulated => {
                return (q, None);
            }
            Ok(q) => FetchError::parse(
                "quote",
                format!(
                    "live quote for {} violates invariants (low={}, last={}, high={})",
                    q.symbol, q.day_low, q.last_price, q.day_high
                ),
            ),
            Err(err) => err,
        };

        tracing::debug!(
            symbol,
            kind = err.kind.as_str(),
            error = %err,
            "live quote unavailable; simulating"
        );

        (self.simulated_quote(symbol), Some(err))
    }

    pub fn simulated_quote(&self, symbol: &str) -> Quote {
        simulate::simulate_quote(
            symbol,
            self.universe.baseline_price(symbol),
            Utc::now(),
            &mut rand::rng(),
        )
    }

    pub async fn fetch_index_history(&self, index_name: &str, window: usize) -> IndexHistory {
        self.fetch_index_history_from(index_name, window, None, Utc::now())
            .await
    }

    /// `anchor_close` seeds the simulated walk so consecutive cycles stay continuous.
    /// `window` is capped at [`MAX_INDEX_WINDOW`].
    pub async fn fetch_index_history_from(
        &self,
        index_name: &str,
        window: usize,
        anchor_close: Option<f64>,
        now: DateTime<Utc>,
    ) -> IndexHistory {
        if window > MAX_INDEX_WINDOW {
            tracing::warn!(
                index = index_name,
                window,
                max = MAX_INDEX_WINDOW,
                "index window too large; capping"
            );
        }
        let timestamps = self
            .calendar
            .trailing_bar_times(now, window.min(MAX_INDEX_WINDOW));

        match self.source.fetch_live_index(index_name).await {
            Ok(live) => {
                // Upstream only reports the current value; bars leading up to it are synthesized.
                let points = simulate::walk_backward(&timestamps, live.last, &mut rand::rng());
                IndexHistory {
                    index_name: index_name.to_string(),
                    points,
                    is_simulated: false,
                }
            }
            Err(err) => {
                tracing::warn!(
                    index = index_name,
                    kind = err.kind.as_str(),
                    error = %err,
                    "live index unavailable; simulating history"
                );
                let start = anchor_close
                    .filter(|v| v.is_finite() && *v > 0.0)
                    .unwrap_or(DEFAULT_INDEX_BASELINE);
                let points = simulate::walk_forward(&timestamps, start, &mut rand::rng());
                IndexHistory {
                    index_name: index_name.to_string(),
                    points,
                    is_simulated: true,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::contract::LiveIndexValue;
    use crate::domain::snapshot::IndexPoint;
    use crate::ingest::nse::NseClient;
    use crate::ingest::provider::OfflineSource;
    use chrono::TimeZone;
    use std::time::Duration;

    struct FixedSource {
        quote: Quote,
        index_last: f64,
    }

    #[async_trait::async_trait]
    impl MarketDataSource for FixedSource {
        fn source_name(&self) -> &'static str {
            "fixed"
        }

        async fn fetch_live_quote(&self, symbol: &str) -> Result<Quote, FetchError> {
            Ok(Quote {
                symbol: symbol.to_string(),
                ..self.quote.clone()
            })
        }

        async fn fetch_live_index(&self, index_name: &str) -> Result<LiveIndexValue, FetchError> {
            Ok(LiveIndexValue {
                index_name: index_name.to_string(),
                last: self.index_last,
                percent_change: None,
            })
        }
    }

    fn live_quote(low: f64, last: f64, high: f64) -> Quote {
        Quote {
            symbol: String::new(),
            last_price: last,
            change: 1.0,
            percent_change: 0.5,
            open: last,
            previous_close: last - 1.0,
            volume: 10,
            day_high: high,
            day_low: low,
            fetched_at: Utc.with_ymd_and_hms(2026, 1, 27, 6, 0, 0).unwrap(),
            is_simulated: false,
        }
    }

    fn fetcher(source: Arc<dyn MarketDataSource>) -> MarketFetcher {
        MarketFetcher::new(
            source,
            Arc::new(Universe::builtin()),
            MarketCalendar::with_holidays(Vec::<chrono::NaiveDate>::new()),
        )
    }

    fn assert_history_shape(points: &[IndexPoint], window: usize) {
        assert_eq!(points.len(), window);
        assert!(points.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert!(points.iter().all(IndexPoint::is_well_formed));
    }

    #[tokio::test]
    async fn passes_through_valid_live_quote() {
        let f = fetcher(Arc::new(FixedSource {
            quote: live_quote(99.0, 100.0, 101.0),
            index_last: 24728.9,
        }));
        let (q, err) = f.fetch_quote_outcome("TCS").await;
        assert!(err.is_none());
        assert!(!q.is_simulated);
        assert_eq!(q.symbol, "TCS");
        assert_eq!(q.last_price, 100.0);
    }

    #[tokio::test]
    async fn replaces_live_quote_that_breaks_day_range() {
        let f = fetcher(Arc::new(FixedSource {
            quote: live_quote(101.0, 100.0, 102.0),
            index_last: 24728.9,
        }));
        let (q, err) = f.fetch_quote_outcome("TCS").await;
        assert!(q.is_simulated);
        assert!(q.is_within_day_range());
        assert_eq!(err.map(|e| e.kind), Some(crate::ingest::error::FetchErrorKind::Parse));
    }

    #[tokio::test]
    async fn offline_source_simulates_every_symbol() {
        let f = fetcher(Arc::new(OfflineSource));
        let symbols: Vec<String> = f.universe().symbols().map(str::to_string).collect();
        for symbol in symbols {
            let q = f.fetch_quote(&symbol).await;
            assert!(q.is_simulated);
            assert_eq!(q.symbol, symbol);
            assert!(q.is_within_day_range());
        }
    }

    #[tokio::test]
    async fn unreachable_upstream_falls_back_without_error() {
        let client = NseClient::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let f = fetcher(Arc::new(client));
        f.prime_session().await;

        let q = f.fetch_quote("RELIANCE").await;
        assert!(q.is_simulated);
        assert_eq!(q.symbol, "RELIANCE");
        assert!(q.is_within_day_range());

        let h = f.fetch_index_history("NIFTY 50", 50).await;
        assert!(h.is_simulated);
        assert_history_shape(&h.points, 50);
    }

    #[tokio::test]
    async fn live_index_synthesizes_full_window_ending_at_last() {
        let f = fetcher(Arc::new(FixedSource {
            quote: live_quote(99.0, 100.0, 101.0),
            index_last: 24728.9,
        }));
        let h = f.fetch_index_history("NIFTY 50", 50).await;
        assert!(!h.is_simulated);
        assert_eq!(h.last_close(), Some(24728.9));
        assert_history_shape(&h.points, 50);
    }

    #[tokio::test]
    async fn simulated_index_continues_from_anchor() {
        let f = fetcher(Arc::new(OfflineSource));
        let now = Utc.with_ymd_and_hms(2026, 1, 27, 6, 0, 0).unwrap();
        let h = f
            .fetch_index_history_from("NIFTY 50", 20, Some(25000.0), now)
            .await;
        assert!(h.is_simulated);
        assert_eq!(h.points[0].open, 25000.0);
        assert_history_shape(&h.points, 20);

        let empty = f.fetch_index_history_from("NIFTY 50", 0, None, now).await;
        assert!(empty.points.is_empty());
    }

    #[tokio::test]
    async fn oversize_window_is_capped_instead_of_panicking() {
        let f = fetcher(Arc::new(OfflineSource));
        let now = Utc.with_ymd_and_hms(2026, 1, 27, 6, 0, 0).unwrap();
        let h = f
            .fetch_index_history_from("NIFTY 50", usize::MAX, None, now)
            .await;
        assert!(h.is_simulated);
        assert_history_shape(&h.points, MAX_INDEX_WINDOW);
    }
}
