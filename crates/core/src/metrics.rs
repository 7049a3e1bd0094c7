//! Pure aggregations over one batch of quotes.

use crate::domain::snapshot::{Breadth, MarketMetrics, Quote, SectorSummary, Sentiment};
use crate::ingest::simulate::round_to;
use rand::Rng;
use std::cmp::Ordering;
use std::collections::BTreeMap;

pub const DEFAULT_TOP_N: usize = 5;

/// Synthetic sentiment ranges. No upstream provides either figure.
pub const PCR_RANGE: (f64, f64) = (0.6, 1.4);
pub const VIX_RANGE: (f64, f64) = (12.0, 25.0);

/// Average percent change per sector. Quotes whose symbol has no sector are skipped.
/// Ordered by average descending, then sector name.
pub fn sector_summaries(quotes: &[Quote], sector_map: &BTreeMap<String, String>) -> Vec<SectorSummary> {
    let mut groups: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for q in quotes {
        let Some(sector) = sector_map.get(&q.symbol) else {
            continue;
        };
        let entry = groups.entry(sector.as_str()).or_insert((0.0, 0));
        entry.0 += q.percent_change;
        entry.1 += 1;
    }

    let mut out: Vec<SectorSummary> = groups
        .into_iter()
        .map(|(sector, (sum, count))| SectorSummary {
            sector: sector.to_string(),
            avg_percent_change: sum / count as f64,
            constituent_count: count,
        })
        .collect();

    out.sort_by(|a, b| {
        b.avg_percent_change
            .total_cmp(&a.avg_percent_change)
            .then_with(|| a.sector.cmp(&b.sector))
    });
    out
}

/// Top `n` gainers (percent change descending) and losers (ascending); ties go to the
/// alphabetically first symbol.
pub fn rank_movers(quotes: &[Quote], n: usize) -> (Vec<Quote>, Vec<Quote>) {
    let mut gainers: Vec<&Quote> = quotes.iter().collect();
    gainers.sort_by(|a, b| {
        rank_key(b)
            .total_cmp(&rank_key(a))
            .then_with(|| a.symbol.cmp(&b.symbol))
    });

    let mut losers: Vec<&Quote> = quotes.iter().collect();
    losers.sort_by(|a, b| {
        rank_key(a)
            .total_cmp(&rank_key(b))
            .then_with(|| a.symbol.cmp(&b.symbol))
    });

    (
        gainers.into_iter().take(n).cloned().collect(),
        losers.into_iter().take(n).cloned().collect(),
    )
}

// Adding +0.0 folds -0.0 into 0.0, which total_cmp would otherwise order apart.
fn rank_key(q: &Quote) -> f64 {
    q.percent_change + 0.0
}

pub fn market_breadth(quotes: &[Quote]) -> Breadth {
    let mut out = Breadth::default();
    for q in quotes {
        match q.percent_change.partial_cmp(&0.0) {
            Some(Ordering::Greater) => out.advancers += 1,
            Some(Ordering::Less) => out.decliners += 1,
            _ => out.unchanged += 1,
        }
    }
    out
}

pub fn simulate_sentiment<R: Rng + ?Sized>(rng: &mut R) -> Sentiment {
    Sentiment {
        pcr: round_to(rng.random_range(PCR_RANGE.0..=PCR_RANGE.1), 2),
        vix: round_to(rng.random_range(VIX_RANGE.0..=VIX_RANGE.1), 1),
        is_simulated: true,
    }
}

/// Symbols that cannot take part in sector aggregation, sorted.
pub fn unmapped_symbols(quotes: &[Quote], sector_map: &BTreeMap<String, String>) -> Vec<String> {
    let mut out: Vec<String> = quotes
        .iter()
        .filter(|q| !sector_map.contains_key(&q.symbol))
        .map(|q| q.symbol.clone())
        .collect();
    out.sort();
    out.dedup();
    out
}

pub fn aggregate(quotes: &[Quote], sector_map: &BTreeMap<String, String>, top_n: usize) -> MarketMetrics {
    let (top_gainers, top_losers) = rank_movers(quotes, top_n);
    MarketMetrics {
        sector_summaries: sector_summaries(quotes, sector_map),
        top_gainers,
        top_losers,
        breadth: market_breadth(quotes),
        unmapped_symbols: unmapped_symbols(quotes, sector_map),
    }
}
