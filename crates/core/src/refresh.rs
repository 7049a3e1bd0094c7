use crate::config::Settings;
use crate::domain::snapshot::{MarketSnapshot, Quote};
use crate::ingest::error::FetchErrorKind;
use crate::ingest::fetcher::MarketFetcher;
use crate::metrics;
use chrono::Utc;
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

// Per-cycle cap on individually logged quote failures; the rest only show up in the summary.
const MAX_LOGGED_FAILURES: usize = 3;

#[derive(Debug, Clone)]
pub struct RefreshOptions {
    pub interval: Duration,
    pub index_name: String,
    pub index_window: usize,
    pub concurrency: usize,
    pub top_movers: usize,
    /// Stop after this many cycles. `None` runs until shutdown.
    pub max_cycles: Option<u64>,
}

impl RefreshOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            interval: settings.refresh_interval,
            index_name: settings.index_name.clone(),
            index_window: settings.index_window,
            concurrency: settings.fetch_concurrency,
            top_movers: settings.top_movers,
            max_cycles: None,
        }
    }
}

/// Drives fetch -> aggregate once per tick. Owns the only state carried between cycles: the
/// cycle counter and the last index close used to keep simulated history continuous.
pub struct RefreshLoop {
    fetcher: MarketFetcher,
    options: RefreshOptions,
    cycle: u64,
    last_index_close: Option<f64>,
}

impl RefreshLoop {
    pub fn new(fetcher: MarketFetcher, options: RefreshOptions) -> Self {
        Self {
            fetcher,
            options,
            cycle: 0,
            last_index_close: None,
        }
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycle
    }

    /// Runs cycles until `shutdown` resolves or `max_cycles` is reached. A cycle in flight is
    /// always finished before stopping. Returns the number of completed cycles.
    pub async fn run<S, F>(mut self, shutdown: S, mut on_snapshot: F) -> u64
    where
        S: Future<Output = ()>,
        F: FnMut(MarketSnapshot),
    {
        tokio::pin!(shutdown);

        let mut ticker = tokio::time::interval(self.options.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if self.options.max_cycles.is_some_and(|max| self.cycle >= max) {
                tracing::info!(cycles = self.cycle, "cycle limit reached; stopping refresh loop");
                break;
            }

            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!(cycles = self.cycle, "shutdown requested; stopping refresh loop");
                    break;
                }
                _ = ticker.tick() => {}
            }

            let snapshot = self.run_cycle().await;
            on_snapshot(snapshot);
        }

        self.cycle
    }

    pub async fn run_cycle(&mut self) -> MarketSnapshot {
        self.cycle += 1;
        let cycle = self.cycle;
        let started = Instant::now();
        let now = Utc::now();

        self.fetcher.prime_session().await;
        let quotes = self.fetch_all_quotes(cycle).await;

        let index = self
            .fetcher
            .fetch_index_history_from(
                &self.options.index_name,
                self.options.index_window,
                self.last_index_close,
                now,
            )
            .await;
        if let Some(close) = index.last_close() {
            self.last_index_close = Some(close);
        }

        let universe = self.fetcher.universe();
        let metrics = metrics::aggregate(&quotes, universe.sector_map(), self.options.top_movers);
        let sentiment = metrics::simulate_sentiment(&mut rand::rng());
        let market_status = self.fetcher.calendar().market_status(now);

        let snapshot = MarketSnapshot::assemble(
            cycle,
            now,
            market_status,
            quotes,
            index,
            metrics,
            sentiment,
        );

        tracing::info!(
            cycle,
            source = self.fetcher.source_name(),
            quotes = snapshot.quotes.len(),
            simulated_quotes = snapshot.simulated_quotes,
            index_simulated = snapshot.index_is_simulated,
            advancers = snapshot.advancers,
            decliners = snapshot.decliners,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "refresh cycle complete"
        );

        snapshot
    }

    /// Fetches every tracked symbol concurrently and returns the batch sorted by symbol.
    async fn fetch_all_quotes(&self, cycle: u64) -> Vec<Quote> {
        let permits = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let mut pending: BTreeSet<String> = BTreeSet::new();
        let mut tasks = JoinSet::new();

        for symbol in self.fetcher.universe().symbols() {
            let symbol = symbol.to_string();
            pending.insert(symbol.clone());

            let fetcher = self.fetcher.clone();
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                fetcher.fetch_quote_outcome(&symbol).await
            });
        }

        let mut quotes = Vec::with_capacity(pending.len());
        let mut network_failures: usize = 0;
        let mut parse_failures: usize = 0;
        let mut logged_failures: usize = 0;

        while let Some(joined) = tasks.join_next().await {
            let (quote, err) = match joined {
                Ok(outcome) => outcome,
                Err(err) => {
                    tracing::error!(cycle, error = %err, "quote task aborted");
                    continue;
                }
            };

            if let Some(err) = err {
                match err.kind {
                    FetchErrorKind::Network => network_failures += 1,
                    FetchErrorKind::Parse => parse_failures += 1,
                }
                if logged_failures < MAX_LOGGED_FAILURES {
                    tracing::warn!(
                        cycle,
                        symbol = %quote.symbol,
                        kind = err.kind.as_str(),
                        error = %err,
                        "quote fetch failed; using simulated quote"
                    );
                    logged_failures += 1;
                }
            }

            pending.remove(&quote.symbol);
            quotes.push(quote);
        }

        // A task that died still owes the batch a quote.
        for symbol in pending {
            quotes.push(self.fetcher.simulated_quote(&symbol));
        }

        if network_failures + parse_failures > 0 {
            tracing::warn!(
                cycle,
                network_failures,
                parse_failures,
                total = quotes.len(),
                "some quotes are simulated this cycle"
            );
        }

        quotes.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        quotes
    }
}
