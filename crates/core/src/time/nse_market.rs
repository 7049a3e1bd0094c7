use crate::config::Settings;
use crate::domain::snapshot::MarketStatus;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc};
use std::collections::HashSet;

// IST is UTC+05:30 with no DST.
const IST_OFFSET_MINUTES: i64 = 5 * 60 + 30;

// Session boundaries, minutes after midnight IST.
const PRE_OPEN_MINUTE: u32 = 9 * 60;
const SESSION_OPEN_MINUTE: u32 = 9 * 60 + 15;
const SESSION_CLOSE_MINUTE: u32 = 15 * 60 + 30;

pub const BAR_MINUTES: u32 = 5;
const LAST_BAR_MINUTE: u32 = SESSION_CLOSE_MINUTE - BAR_MINUTES;

#[derive(Debug, Clone)]
pub struct MarketCalendar {
    holidays: HashSet<NaiveDate>,
}

impl MarketCalendar {
    /// Fixed-date exchange holidays plus `NSE_MARKET_HOLIDAYS` from settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::with_holidays(settings.market_holidays.iter().copied())
    }

    pub fn with_holidays<I: IntoIterator<Item = NaiveDate>>(extra: I) -> Self {
        let mut holidays = fixed_holidays();
        holidays.extend(extra);
        Self { holidays }
    }

    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        !is_weekend(date) && !self.holidays.contains(&date)
    }

    /// Most recent trading day strictly before `date`.
    pub fn previous_trading_day(&self, date: NaiveDate) -> NaiveDate {
        let mut cur = date - Duration::days(1);
        while !self.is_trading_day(cur) {
            cur = cur - Duration::days(1);
        }
        cur
    }

    pub fn market_status(&self, now_utc: DateTime<Utc>) -> MarketStatus {
        let (date, minute) = to_ist(now_utc);
        if !self.is_trading_day(date) {
            return MarketStatus::Closed;
        }
        match minute {
            m if (PRE_OPEN_MINUTE..SESSION_OPEN_MINUTE).contains(&m) => MarketStatus::PreOpen,
            m if (SESSION_OPEN_MINUTE..SESSION_CLOSE_MINUTE).contains(&m) => MarketStatus::Open,
            _ => MarketStatus::Closed,
        }
    }

    /// Open times of the `window` most recent 5-minute session bars, oldest first.
    ///
    /// The newest bar is the one containing `now_utc` while the session is open, otherwise the
    /// last bar of the most recent session. Stepping back past 09:15 continues at the previous
    /// trading day's last bar.
    pub fn trailing_bar_times(&self, now_utc: DateTime<Utc>, window: usize) -> Vec<DateTime<Utc>> {
        let mut out = Vec::with_capacity(window);
        if window == 0 {
            return out;
        }

        let mut bar = self.latest_bar(now_utc);
        out.push(ist_to_utc(bar.0, bar.1));
        while out.len() < window {
            bar = self.previous_bar(bar);
            out.push(ist_to_utc(bar.0, bar.1));
        }

        out.reverse();
        out
    }

    fn latest_bar(&self, now_utc: DateTime<Utc>) -> (NaiveDate, u32) {
        let (date, minute) = to_ist(now_utc);
        if self.is_trading_day(date) && minute >= SESSION_OPEN_MINUTE {
            let aligned = SESSION_OPEN_MINUTE
                + (minute - SESSION_OPEN_MINUTE) / BAR_MINUTES * BAR_MINUTES;
            return (date, aligned.min(LAST_BAR_MINUTE));
        }
        (self.previous_trading_day(date), LAST_BAR_MINUTE)
    }

    fn previous_bar(&self, (date, minute): (NaiveDate, u32)) -> (NaiveDate, u32) {
        if minute >= SESSION_OPEN_MINUTE + BAR_MINUTES {
            (date, minute - BAR_MINUTES)
        } else {
            (self.previous_trading_day(date), LAST_BAR_MINUTE)
        }
    }
}

fn to_ist(now_utc: DateTime<Utc>) -> (NaiveDate, u32) {
    let local = now_utc.naive_utc() + Duration::minutes(IST_OFFSET_MINUTES);
    (local.date(), local.hour() * 60 + local.minute())
}

fn ist_to_utc(date: NaiveDate, minute: u32) -> DateTime<Utc> {
    let local: NaiveDateTime = date.and_time(NaiveTime::MIN) + Duration::minutes(minute as i64);
    Utc.from_utc_datetime(&(local - Duration::minutes(IST_OFFSET_MINUTES)))
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun)
}

fn fixed_holidays() -> HashSet<NaiveDate> {
    // Republic Day, Independence Day, Gandhi Jayanti, Christmas.
    // Lunar-calendar holidays vary per year and come from NSE_MARKET_HOLIDAYS.
    let mut out = HashSet::new();
    for y in 2024..=2030 {
        for (m, d) in [(1, 26), (8, 15), (10, 2), (12, 25)] {
            if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
                out.insert(date);
            }
        }
    }
    out
}

/// Parses `YYYY-MM-DD,YYYY-MM-DD`; malformed entries are skipped.
pub fn parse_holiday_list(s: &str) -> Vec<NaiveDate> {
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .filter_map(|part| NaiveDate::parse_from_str(part, "%Y-%m-%d").ok())
        .collect()
}
