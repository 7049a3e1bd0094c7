use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time price record for one tracked symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub last_price: f64,
    pub change: f64,
    pub percent_change: f64,
    pub open: f64,
    pub previous_close: f64,
    pub volume: u64,
    pub day_high: f64,
    pub day_low: f64,
    pub fetched_at: DateTime<Utc>,
    pub is_simulated: bool,
}

impl Quote {
    pub fn is_within_day_range(&self) -> bool {
        self.day_low <= self.last_price && self.last_price <= self.day_high
    }
}

/// One OHLCV bar of an index history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexPoint {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl IndexPoint {
    pub fn is_well_formed(&self) -> bool {
        self.high >= self.open.max(self.close) && self.low <= self.open.min(self.close)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexHistory {
    pub index_name: String,
    pub points: Vec<IndexPoint>,
    pub is_simulated: bool,
}

impl IndexHistory {
    pub fn last_close(&self) -> Option<f64> {
        self.points.last().map(|p| p.close)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorSummary {
    pub sector: String,
    pub avg_percent_change: f64,
    pub constituent_count: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breadth {
    pub advancers: usize,
    pub decliners: usize,
    pub unchanged: usize,
}

/// Put/Call ratio and volatility index. No upstream source exists for either, so both are
/// always drawn at random.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    pub pcr: f64,
    pub vix: f64,
    pub is_simulated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketStatus {
    PreOpen,
    Open,
    Closed,
}

/// Deterministic output of the aggregator for one quote batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketMetrics {
    pub sector_summaries: Vec<SectorSummary>,
    pub top_gainers: Vec<Quote>,
    pub top_losers: Vec<Quote>,
    pub breadth: Breadth,
    pub unmapped_symbols: Vec<String>,
}

/// Everything one refresh cycle hands to presentation. Rebuilt wholesale every cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub cycle: u64,
    pub generated_at: DateTime<Utc>,
    pub market_status: MarketStatus,
    pub quotes: Vec<Quote>,
    pub simulated_quotes: usize,
    pub index_name: String,
    pub index_history: Vec<IndexPoint>,
    pub index_is_simulated: bool,
    pub sector_summaries: Vec<SectorSummary>,
    pub top_gainers: Vec<Quote>,
    pub top_losers: Vec<Quote>,
    pub advancers: usize,
    pub decliners: usize,
    pub unchanged: usize,
    pub unmapped_symbols: Vec<String>,
    pub pcr: f64,
    pub vix: f64,
    pub sentiment_is_simulated: bool,
}

impl MarketSnapshot {
    pub fn assemble(
        cycle: u64,
        generated_at: DateTime<Utc>,
        market_status: MarketStatus,
        quotes: Vec<Quote>,
        index: IndexHistory,
        metrics: MarketMetrics,
        sentiment: Sentiment,
    ) -> Self {
        let simulated_quotes = quotes.iter().filter(|q| q.is_simulated).count();
        Self {
            cycle,
            generated_at,
            market_status,
            quotes,
            simulated_quotes,
            index_name: index.index_name,
            index_history: index.points,
            index_is_simulated: index.is_simulated,
            sector_summaries: metrics.sector_summaries,
            top_gainers: metrics.top_gainers,
            top_losers: metrics.top_losers,
            advancers: metrics.breadth.advancers,
            decliners: metrics.breadth.decliners,
            unchanged: metrics.breadth.unchanged,
            unmapped_symbols: metrics.unmapped_symbols,
            pcr: sentiment.pcr,
            vix: sentiment.vix,
            sentiment_is_simulated: sentiment.is_simulated,
        }
    }

    /// True when any part of the snapshot did not come from the live upstream.
    pub fn has_simulated_data(&self) -> bool {
        self.simulated_quotes > 0 || self.index_is_simulated || self.sentiment_is_simulated
    }

    pub fn quote(&self, symbol: &str) -> Option<&Quote> {
        self.quotes.iter().find(|q| q.symbol.eq_ignore_ascii_case(symbol))
    }
}
