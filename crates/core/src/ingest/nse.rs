use crate::config::Settings;
use crate::domain::contract::{LiveIndexValue, NseIndicesResponse, NseQuoteResponse};
use crate::domain::snapshot::Quote;
use crate::ingest::error::FetchError;
use crate::ingest::provider::MarketDataSource;
use anyhow::Context;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use serde::de::DeserializeOwned;
use std::time::Duration;

const QUOTE_PATH: &str = "/api/quote-equity";
const ALL_INDICES_PATH: &str = "/api/allIndices";

// The site rejects API calls that do not look like they come from a browser session.
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

// Upper bound on response text echoed into error details.
const MAX_ERROR_BODY_CHARS: usize = 200;

#[derive(Debug, Clone)]
pub struct NseClient {
    http: reqwest::Client,
    base_url: String,
}

impl NseClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        Self::new(&settings.nse_base_url, settings.nse_timeout)
    }

    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json,text/html;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9,hi;q=0.8"));
        headers.insert(
            "referer",
            HeaderValue::from_str(&format!("{}/", base_url.trim_end_matches('/')))
                .context("NSE base url is not a valid header value")?,
        );

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .cookie_store(true)
            .build()
            .context("failed to build NSE http client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        stage: &'static str,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, FetchError> {
        let res = self
            .http
            .get(self.url(path))
            .query(query)
            .send()
            .await
            .map_err(|e| FetchError::network(stage, e))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(|e| FetchError::network(stage, format!("failed to read body: {e}")))?;

        if !status.is_success() {
            return Err(FetchError::network(
                stage,
                format!("HTTP {status}: {}", truncate(&text)),
            ));
        }

        serde_json::from_str::<T>(&text).map_err(|e| {
            FetchError::parse(stage, format!("{e}; body: {}", truncate(&text)))
        })
    }
}

#[async_trait::async_trait]
impl MarketDataSource for NseClient {
    fn source_name(&self) -> &'static str {
        "nseindia"
    }

    async fn prime_session(&self) -> Result<(), FetchError> {
        // Visiting the home page sets the cookies the API endpoints require.
        let res = self
            .http
            .get(self.url("/"))
            .send()
            .await
            .map_err(|e| FetchError::network("session", e))?;
        let status = res.status();
        if !status.is_success() {
            return Err(FetchError::network("session", format!("HTTP {status}")));
        }
        Ok(())
    }

    async fn fetch_live_quote(&self, symbol: &str) -> Result<Quote, FetchError> {
        let body: NseQuoteResponse = self
            .get_json("quote", QUOTE_PATH, &[("symbol", symbol)])
            .await?;
        body.validate_and_into_quote(symbol, Utc::now())
            .map_err(|e| FetchError::parse("quote", format!("{e:#}")))
    }

    async fn fetch_live_index(&self, index_name: &str) -> Result<LiveIndexValue, FetchError> {
        let body: NseIndicesResponse = self.get_json("index", ALL_INDICES_PATH, &[]).await?;
        body.validate_and_into_index(index_name)
            .map_err(|e| FetchError::parse("index", format!("{e:#}")))
    }
}

fn truncate(text: &str) -> String {
    let mut out: String = text.chars().take(MAX_ERROR_BODY_CHARS).collect();
    if text.chars().count() > MAX_ERROR_BODY_CHARS {
        out.push_str("...");
    }
    out
}
