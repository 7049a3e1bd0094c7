use crate::domain::snapshot::Quote;
use anyhow::{ensure, Context};
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Subset of the `/api/quote-equity` payload the fetcher relies on.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NseQuoteResponse {
    #[serde(default)]
    pub info: Option<NseQuoteInfo>,
    pub price_info: NsePriceInfo,
    #[serde(default)]
    pub market_dept_order_book: Option<NseOrderBook>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NseQuoteInfo {
    #[serde(default)]
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NsePriceInfo {
    pub last_price: f64,
    pub change: f64,
    pub p_change: f64,
    #[serde(default)]
    pub open: Option<f64>,
    #[serde(default)]
    pub previous_close: Option<f64>,
    #[serde(default)]
    pub intra_day_high_low: Option<NseHighLow>,
    // Older payloads carried flat fields instead of intraDayHighLow.
    #[serde(default)]
    pub day_high: Option<f64>,
    #[serde(default)]
    pub day_low: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NseHighLow {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NseOrderBook {
    #[serde(default)]
    pub total_buy_quantity: Option<f64>,
    #[serde(default)]
    pub total_sell_quantity: Option<f64>,
}

impl NseQuoteResponse {
    pub fn validate_and_into_quote(
        self,
        requested_symbol: &str,
        fetched_at: DateTime<Utc>,
    ) -> anyhow::Result<Quote> {
        if let Some(reported) = self.info.as_ref().and_then(|i| i.symbol.as_deref()) {
            ensure!(
                reported.trim().eq_ignore_ascii_case(requested_symbol),
                "quote symbol mismatch: requested {requested_symbol}, got {reported}"
            );
        }

        let p = self.price_info;
        let (day_low, day_high) = match (&p.intra_day_high_low, p.day_low, p.day_high) {
            (Some(hl), _, _) => (hl.min, hl.max),
            (None, Some(low), Some(high)) => (low, high),
            _ => anyhow::bail!("quote for {requested_symbol} has no day high/low"),
        };

        ensure!(
            p.last_price.is_finite() && p.last_price > 0.0,
            "lastPrice must be positive (got {})",
            p.last_price
        );
        ensure!(
            p.change.is_finite() && p.p_change.is_finite(),
            "change fields must be finite"
        );
        ensure!(
            day_low <= p.last_price && p.last_price <= day_high,
            "lastPrice {} outside day range [{day_low}, {day_high}]",
            p.last_price
        );

        let volume = self
            .market_dept_order_book
            .map(|b| {
                b.total_buy_quantity.unwrap_or(0.0).max(0.0)
                    + b.total_sell_quantity.unwrap_or(0.0).max(0.0)
            })
            .unwrap_or(0.0);

        Ok(Quote {
            symbol: requested_symbol.to_string(),
            last_price: p.last_price,
            change: p.change,
            percent_change: p.p_change,
            open: p.open.filter(|v| *v > 0.0).unwrap_or(p.last_price),
            previous_close: p
                .previous_close
                .filter(|v| *v > 0.0)
                .unwrap_or(p.last_price - p.change),
            volume: volume as u64,
            day_high,
            day_low,
            fetched_at,
            is_simulated: false,
        })
    }
}

/// `/api/allIndices` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct NseIndicesResponse {
    pub data: Vec<NseIndexEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NseIndexEntry {
    pub index: String,
    #[serde(default)]
    pub last: Option<f64>,
    #[serde(default)]
    pub percent_change: Option<f64>,
}

/// Current value of one index. The upstream has no intraday series for it.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveIndexValue {
    pub index_name: String,
    pub last: f64,
    pub percent_change: Option<f64>,
}

impl NseIndicesResponse {
    pub fn validate_and_into_index(self, index_name: &str) -> anyhow::Result<LiveIndexValue> {
        let entry = self
            .data
            .into_iter()
            .find(|e| e.index.trim().eq_ignore_ascii_case(index_name))
            .with_context(|| format!("index {index_name} not present in allIndices"))?;

        let last = entry.last.context("index entry missing last")?;
        ensure!(
            last.is_finite() && last > 0.0,
            "index last must be positive (got {last})"
        );

        Ok(LiveIndexValue {
            index_name: index_name.to_string(),
            last,
            percent_change: entry.percent_change,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 27, 6, 0, 0).unwrap()
    }

    #[test]
    fn parses_quote_equity_shape() {
        let v = json!({
            "info": {"symbol": "RELIANCE"},
            "priceInfo": {
                "lastPrice": 2950.5,
                "change": 12.3,
                "pChange": 0.42,
                "open": 2940.0,
                "previousClose": 2938.2,
                "intraDayHighLow": {"min": 2930.1, "max": 2960.0, "value": 2950.5}
            },
            "marketDeptOrderBook": {"totalBuyQuantity": 1000, "totalSellQuantity": 500}
        });

        let parsed: NseQuoteResponse = serde_json::from_value(v).unwrap();
        let q = parsed.validate_and_into_quote("RELIANCE", now()).unwrap();
        assert_eq!(q.symbol, "RELIANCE");
        assert_eq!(q.volume, 1500);
        assert_eq!(q.day_low, 2930.1);
        assert_eq!(q.day_high, 2960.0);
        assert!(!q.is_simulated);
        assert!(q.is_within_day_range());
    }

    #[test]
    fn accepts_flat_day_high_low() {
        let v = json!({
            "priceInfo": {
                "lastPrice": 100.0, "change": 1.0, "pChange": 1.01,
                "dayHigh": 101.0, "dayLow": 98.0
            }
        });
        let parsed: NseQuoteResponse = serde_json::from_value(v).unwrap();
        let q = parsed.validate_and_into_quote("ITC", now()).unwrap();
        assert_eq!(q.previous_close, 99.0);
        assert_eq!(q.volume, 0);
    }

    #[test]
    fn missing_price_info_fails_to_deserialize() {
        let v = json!({"info": {"symbol": "TCS"}, "msg": "Resource not found"});
        assert!(serde_json::from_value::<NseQuoteResponse>(v).is_err());
    }

    #[test]
    fn rejects_missing_high_low() {
        let v = json!({"priceInfo": {"lastPrice": 100.0, "change": 1.0, "pChange": 1.0}});
        let parsed: NseQuoteResponse = serde_json::from_value(v).unwrap();
        assert!(parsed.validate_and_into_quote("TCS", now()).is_err());
    }

    #[test]
    fn rejects_last_outside_day_range() {
        // Pre-open payloads report a zeroed range.
        let v = json!({
            "priceInfo": {
                "lastPrice": 100.0, "change": 0.0, "pChange": 0.0,
                "intraDayHighLow": {"min": 0.0, "max": 0.0}
            }
        });
        let parsed: NseQuoteResponse = serde_json::from_value(v).unwrap();
        assert!(parsed.validate_and_into_quote("TCS", now()).is_err());
    }

    #[test]
    fn rejects_symbol_mismatch() {
        let v = json!({
            "info": {"symbol": "INFY"},
            "priceInfo": {
                "lastPrice": 100.0, "change": 0.0, "pChange": 0.0,
                "intraDayHighLow": {"min": 99.0, "max": 101.0}
            }
        });
        let parsed: NseQuoteResponse = serde_json::from_value(v).unwrap();
        assert!(parsed.validate_and_into_quote("TCS", now()).is_err());
    }

    #[test]
    fn picks_named_index() {
        let v = json!({
            "data": [
                {"index": "NIFTY BANK", "last": 51000.0, "percentChange": -0.3},
                {"index": "NIFTY 50", "last": 24728.9, "percentChange": 0.22}
            ]
        });
        let parsed: NseIndicesResponse = serde_json::from_value(v).unwrap();
        let live = parsed.validate_and_into_index("NIFTY 50").unwrap();
        assert_eq!(live.last, 24728.9);
        assert_eq!(live.percent_change, Some(0.22));
    }

    #[test]
    fn rejects_absent_index() {
        let v = json!({"data": [{"index": "NIFTY BANK", "last": 51000.0}]});
        let parsed: NseIndicesResponse = serde_json::from_value(v).unwrap();
        assert!(parsed.validate_and_into_index("NIFTY 50").is_err());
    }
}
