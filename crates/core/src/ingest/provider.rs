use crate::domain::contract::LiveIndexValue;
use crate::domain::snapshot::Quote;
use crate::ingest::error::FetchError;

/// A live upstream for quotes and index values. Implementations make a single attempt per call
/// and report every failure; falling back to simulated data is the fetcher's job.
#[async_trait::async_trait]
pub trait MarketDataSource: Send + Sync {
    fn source_name(&self) -> &'static str;

    /// Called once at the start of each refresh cycle.
    async fn prime_session(&self) -> Result<(), FetchError> {
        Ok(())
    }

    async fn fetch_live_quote(&self, symbol: &str) -> Result<Quote, FetchError>;

    async fn fetch_live_index(&self, index_name: &str) -> Result<LiveIndexValue, FetchError>;
}

/// Source that never reaches the network. Every value it leads to is simulated.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineSource;

#[async_trait::async_trait]
impl MarketDataSource for OfflineSource {
    fn source_name(&self) -> &'static str {
        "offline"
    }

    async fn fetch_live_quote(&self, symbol: &str) -> Result<Quote, FetchError> {
        Err(FetchError::network("quote", format!("offline mode, no request for {symbol}")))
    }

    async fn fetch_live_index(&self, index_name: &str) -> Result<LiveIndexValue, FetchError> {
        Err(FetchError::network("index", format!("offline mode, no request for {index_name}")))
    }
}
