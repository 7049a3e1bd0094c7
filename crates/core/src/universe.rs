use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Baseline used when a symbol has no configured reference price.
pub const DEFAULT_BASELINE_PRICE: f64 = 1000.0;

/// Reference close used to seed simulated index walks.
pub const DEFAULT_INDEX_BASELINE: f64 = 24750.0;

// (symbol, sector, baseline price in INR)
const BUILTIN: &[(&str, &str, f64)] = &[
    ("RELIANCE", "Oil_Gas", 2950.0),
    ("TCS", "Technology", 4100.0),
    ("HDFCBANK", "Banking", 1650.0),
    ("INFY", "Technology", 1850.0),
    ("HINDUNILVR", "FMCG", 2500.0),
    ("ICICIBANK", "Banking", 1250.0),
    ("KOTAKBANK", "Banking", 1800.0),
    ("SBIN", "Banking", 820.0),
    ("BHARTIARTL", "Telecom", 1600.0),
    ("ASIANPAINT", "Paint", 2900.0),
    ("ITC", "FMCG", 480.0),
    ("LT", "Infrastructure", 3600.0),
    ("AXISBANK", "Banking", 1150.0),
    ("MARUTI", "Automobile", 12500.0),
    ("TITAN", "Jewelry", 3400.0),
    ("SUNPHARMA", "Pharma", 1750.0),
    ("ULTRACEMCO", "Cement", 11000.0),
    ("NESTLEIND", "FMCG", 2450.0),
    ("WIPRO", "Technology", 540.0),
    ("M&M", "Automobile", 2900.0),
    ("BAJFINANCE", "Finance", 7100.0),
    ("ONGC", "Oil_Gas", 270.0),
    ("NTPC", "Power", 360.0),
    ("POWERGRID", "Power", 320.0),
    ("COALINDIA", "Mining", 480.0),
    ("TATASTEEL", "Steel", 150.0),
    ("ADANIENT", "Conglomerate", 3000.0),
    ("TECHM", "Technology", 1600.0),
    ("HCLTECH", "Technology", 1750.0),
    ("TATAMOTORS", "Automobile", 950.0),
    ("DRREDDY", "Pharma", 1250.0),
    ("BAJAJFINSV", "Finance", 1700.0),
    ("GRASIM", "Textile", 2600.0),
    ("CIPLA", "Pharma", 1500.0),
    ("BRITANNIA", "FMCG", 5600.0),
    ("APOLLOHOSP", "Healthcare", 6800.0),
    ("DIVISLAB", "Pharma", 5200.0),
    ("EICHERMOT", "Automobile", 4800.0),
    ("BPCL", "Oil_Gas", 310.0),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedSymbol {
    pub symbol: String,
    /// `None` leaves the symbol out of sector aggregation.
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub baseline_price: Option<f64>,
}

/// Tracked symbols with their sectors and reference prices. Loaded once, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct Universe {
    symbols: Vec<TrackedSymbol>,
    sector_map: BTreeMap<String, String>,
}

#[allow(clippy::len_without_is_empty)]
impl Universe {
    pub fn builtin() -> Self {
        let symbols = BUILTIN
            .iter()
            .map(|(symbol, sector, price)| TrackedSymbol {
                symbol: symbol.to_string(),
                sector: Some(sector.to_string()),
                baseline_price: Some(*price),
            })
            .collect();
        Self::from_symbols(symbols)
    }

    /// Reads a JSON array of `{symbol, sector?, baseline_price?}` objects.
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("failed to read {}", path.as_ref().display()))?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> anyhow::Result<Self> {
        let symbols: Vec<TrackedSymbol> =
            serde_json::from_str(content).context("universe file is not a valid symbol list")?;
        Self::try_from_symbols(symbols)
    }

    pub fn try_from_symbols(symbols: Vec<TrackedSymbol>) -> anyhow::Result<Self> {
        anyhow::ensure!(!symbols.is_empty(), "universe must contain at least one symbol");

        let mut seen = BTreeSet::new();
        for s in &symbols {
            let symbol = s.symbol.trim();
            anyhow::ensure!(!symbol.is_empty(), "symbol must be non-empty");
            anyhow::ensure!(seen.insert(symbol.to_string()), "duplicate symbol: {symbol}");
            if let Some(price) = s.baseline_price {
                anyhow::ensure!(
                    price.is_finite() && price > 0.0,
                    "baseline_price for {symbol} must be positive (got {price})"
                );
            }
        }

        Ok(Self::from_symbols(symbols))
    }

    fn from_symbols(symbols: Vec<TrackedSymbol>) -> Self {
        let symbols: Vec<TrackedSymbol> = symbols
            .into_iter()
            .map(|s| TrackedSymbol {
                symbol: s.symbol.trim().to_string(),
                sector: s
                    .sector
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty()),
                baseline_price: s.baseline_price,
            })
            .collect();

        let sector_map = symbols
            .iter()
            .filter_map(|s| Some((s.symbol.clone(), s.sector.clone()?)))
            .collect();

        Self { symbols, sector_map }
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.symbols.iter().map(|s| s.symbol.as_str())
    }

    /// Never zero: construction rejects an empty list.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn sector_map(&self) -> &BTreeMap<String, String> {
        &self.sector_map
    }

    pub fn baseline_price(&self, symbol: &str) -> f64 {
        self.symbols
            .iter()
            .find(|s| s.symbol == symbol)
            .and_then(|s| s.baseline_price)
            .unwrap_or(DEFAULT_BASELINE_PRICE)
    }
}
