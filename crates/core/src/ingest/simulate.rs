//! Random stand-ins for upstream data. Every value produced here is flagged as simulated by the
//! caller and satisfies the same invariants as live data.

use crate::domain::snapshot::{IndexPoint, Quote};
use chrono::{DateTime, Utc};
use rand::Rng;

/// Largest simulated daily move, in percent either way.
pub const MAX_DAILY_MOVE_PCT: f64 = 3.0;
const OPEN_JITTER_PCT: f64 = 0.5;
const QUOTE_WICK_PCT: f64 = 0.5;
const QUOTE_VOLUME_MIN: u64 = 100_000;
const QUOTE_VOLUME_MAX: u64 = 10_000_000;

/// Largest simulated move per index bar, in percent either way.
pub const MAX_BAR_MOVE_PCT: f64 = 0.2;
const BAR_WICK_PCT: f64 = 0.1;
const BAR_VOLUME_MIN: u64 = 50_000;
const BAR_VOLUME_MAX: u64 = 500_000;

pub fn simulate_quote<R: Rng + ?Sized>(
    symbol: &str,
    baseline_price: f64,
    fetched_at: DateTime<Utc>,
    rng: &mut R,
) -> Quote {
    let previous_close = round2(baseline_price);
    let move_pct = rng.random_range(-MAX_DAILY_MOVE_PCT..=MAX_DAILY_MOVE_PCT);
    let last_price = round2(previous_close * (1.0 + move_pct / 100.0));
    let change = round2(last_price - previous_close);
    let percent_change = round2(change / previous_close * 100.0);

    let open = round2(
        previous_close * (1.0 + rng.random_range(-OPEN_JITTER_PCT..=OPEN_JITTER_PCT) / 100.0),
    );
    let day_high = round2(
        open.max(last_price) * (1.0 + rng.random_range(0.0..=QUOTE_WICK_PCT) / 100.0),
    )
    .max(last_price);
    let day_low = round2(
        open.min(last_price) * (1.0 - rng.random_range(0.0..=QUOTE_WICK_PCT) / 100.0),
    )
    .min(last_price);

    Quote {
        symbol: symbol.to_string(),
        last_price,
        change,
        percent_change,
        open,
        previous_close,
        volume: rng.random_range(QUOTE_VOLUME_MIN..=QUOTE_VOLUME_MAX),
        day_high,
        day_low,
        fetched_at,
        is_simulated: true,
    }
}

/// Forward random walk: the first bar opens at `start_close`.
pub fn walk_forward<R: Rng + ?Sized>(
    timestamps: &[DateTime<Utc>],
    start_close: f64,
    rng: &mut R,
) -> Vec<IndexPoint> {
    let mut out = Vec::with_capacity(timestamps.len());
    let mut prev_close = round2(start_close);
    for &timestamp in timestamps {
        let open = prev_close;
        let close = round2(open * (1.0 + bar_move(rng) / 100.0));
        out.push(bar(timestamp, open, close, rng));
        prev_close = close;
    }
    out
}

/// Backward random walk: the last bar closes exactly at `last_close`.
pub fn walk_backward<R: Rng + ?Sized>(
    timestamps: &[DateTime<Utc>],
    last_close: f64,
    rng: &mut R,
) -> Vec<IndexPoint> {
    let mut out = Vec::with_capacity(timestamps.len());
    let mut close = last_close;
    for &timestamp in timestamps.iter().rev() {
        let open = round2(close / (1.0 + bar_move(rng) / 100.0));
        out.push(bar(timestamp, open, close, rng));
        close = open;
    }
    out.reverse();
    out
}

fn bar_move<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    rng.random_range(-MAX_BAR_MOVE_PCT..=MAX_BAR_MOVE_PCT)
}

fn bar<R: Rng + ?Sized>(timestamp: DateTime<Utc>, open: f64, close: f64, rng: &mut R) -> IndexPoint {
    let top = open.max(close);
    let bottom = open.min(close);
    let high = round2(top * (1.0 + rng.random_range(0.0..=BAR_WICK_PCT) / 100.0)).max(top);
    let low = round2(bottom * (1.0 - rng.random_range(0.0..=BAR_WICK_PCT) / 100.0)).min(bottom);

    IndexPoint {
        timestamp,
        open,
        high,
        low,
        close,
        volume: rng.random_range(BAR_VOLUME_MIN..=BAR_VOLUME_MAX),
    }
}

pub(crate) fn round_to(v: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (v * factor).round() / factor
}

fn round2(v: f64) -> f64 {
    round_to(v, 2)
}
