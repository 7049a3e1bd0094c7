pub mod domain;
pub mod ingest;
pub mod metrics;
pub mod refresh;
pub mod time;
pub mod universe;

pub mod config {
    use anyhow::Context;
    use chrono::NaiveDate;
    use std::str::FromStr;
    use std::time::Duration;

    pub const DEFAULT_NSE_BASE_URL: &str = "https://www.nseindia.com";
    pub const DEFAULT_INDEX_NAME: &str = "NIFTY 50";
    /// Upper bound on `INDEX_WINDOW`: 1000 five-minute bars is roughly 13 sessions.
    pub const MAX_INDEX_WINDOW: usize = 1000;

    const DEFAULT_TIMEOUT_SECS: u64 = 10;
    const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 30;
    const DEFAULT_INDEX_WINDOW: usize = 50;
    const DEFAULT_FETCH_CONCURRENCY: usize = 10;
    const DEFAULT_TOP_MOVERS: usize = 5;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub nse_base_url: String,
        pub nse_timeout: Duration,
        pub refresh_interval: Duration,
        pub index_name: String,
        pub index_window: usize,
        pub fetch_concurrency: usize,
        pub top_movers: usize,
        pub universe_path: Option<String>,
        /// Extra exchange holidays on top of the fixed-date ones.
        pub market_holidays: Vec<NaiveDate>,
        pub sentry_dsn: Option<String>,
    }

    impl Default for Settings {
        fn default() -> Self {
            Self::from_lookup(|_| None)
        }
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let settings = Self::from_lookup(|key| std::env::var(key).ok());
            settings.validate()?;
            Ok(settings)
        }

        /// Builds settings from an arbitrary key lookup. Unparseable numbers fall back to defaults.
        pub fn from_lookup<F>(lookup: F) -> Self
        where
            F: Fn(&str) -> Option<String>,
        {
            let non_empty = |key: &str| lookup(key).filter(|s| !s.trim().is_empty());

            Self {
                nse_base_url: non_empty("NSE_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_NSE_BASE_URL.to_string()),
                nse_timeout: Duration::from_secs(parse_or(
                    lookup("NSE_TIMEOUT_SECS"),
                    DEFAULT_TIMEOUT_SECS,
                )),
                refresh_interval: Duration::from_secs(parse_or(
                    lookup("REFRESH_INTERVAL_SECS"),
                    DEFAULT_REFRESH_INTERVAL_SECS,
                )),
                index_name: non_empty("INDEX_NAME")
                    .unwrap_or_else(|| DEFAULT_INDEX_NAME.to_string()),
                index_window: parse_or(lookup("INDEX_WINDOW"), DEFAULT_INDEX_WINDOW),
                fetch_concurrency: parse_or(lookup("FETCH_CONCURRENCY"), DEFAULT_FETCH_CONCURRENCY),
                top_movers: parse_or(lookup("TOP_MOVERS"), DEFAULT_TOP_MOVERS),
                universe_path: non_empty("UNIVERSE_PATH"),
                market_holidays: crate::time::nse_market::parse_holiday_list(
                    &lookup("NSE_MARKET_HOLIDAYS").unwrap_or_default(),
                ),
                sentry_dsn: non_empty("SENTRY_DSN"),
            }
        }

        pub fn validate(&self) -> anyhow::Result<()> {
            anyhow::ensure!(
                !self.refresh_interval.is_zero(),
                "REFRESH_INTERVAL_SECS must be >= 1"
            );
            anyhow::ensure!(!self.nse_timeout.is_zero(), "NSE_TIMEOUT_SECS must be >= 1");
            anyhow::ensure!(
                self.fetch_concurrency >= 1,
                "FETCH_CONCURRENCY must be >= 1"
            );
            anyhow::ensure!(
                self.index_window <= MAX_INDEX_WINDOW,
                "INDEX_WINDOW must be <= {MAX_INDEX_WINDOW} (got {})",
                self.index_window
            );
            Ok(())
        }

        pub fn load_universe(&self) -> anyhow::Result<crate::universe::Universe> {
            match self.universe_path.as_deref() {
                Some(path) => crate::universe::Universe::from_file(path)
                    .with_context(|| format!("failed to load UNIVERSE_PATH={path}")),
                None => Ok(crate::universe::Universe::builtin()),
            }
        }
    }

    fn parse_or<T: FromStr>(raw: Option<String>, default: T) -> T {
        raw.and_then(|s| s.trim().parse::<T>().ok())
            .unwrap_or(default)
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use std::collections::HashMap;

        #[test]
        fn defaults_without_env() {
            let s = Settings::default();
            assert_eq!(s.nse_base_url, DEFAULT_NSE_BASE_URL);
            assert_eq!(s.refresh_interval, Duration::from_secs(30));
            assert_eq!(s.index_window, 50);
            assert_eq!(s.index_name, "NIFTY 50");
            assert!(s.universe_path.is_none());
            assert!(s.validate().is_ok());
        }

        #[test]
        fn reads_overrides_and_ignores_garbage() {
            let env: HashMap<&str, &str> = HashMap::from([
                ("REFRESH_INTERVAL_SECS", "5"),
                ("INDEX_WINDOW", "not-a-number"),
                ("INDEX_NAME", "NIFTY BANK"),
                ("SENTRY_DSN", "  "),
            ]);
            let s = Settings::from_lookup(|k| env.get(k).map(|v| v.to_string()));
            assert_eq!(s.refresh_interval, Duration::from_secs(5));
            assert_eq!(s.index_window, 50);
            assert_eq!(s.index_name, "NIFTY BANK");
            assert!(s.sentry_dsn.is_none());
        }

        #[test]
        fn parses_holiday_list() {
            let s = Settings::from_lookup(|k| {
                (k == "NSE_MARKET_HOLIDAYS").then(|| "2026-03-04,bad, 2026-11-09".to_string())
            });
            assert_eq!(
                s.market_holidays,
                vec![
                    NaiveDate::from_ymd_opt(2026, 3, 4).unwrap(),
                    NaiveDate::from_ymd_opt(2026, 11, 9).unwrap(),
                ]
            );
            assert!(Settings::default().market_holidays.is_empty());
        }

        #[test]
        fn rejects_oversize_index_window() {
            let at_cap = MAX_INDEX_WINDOW.to_string();
            let s = Settings::from_lookup(|k| (k == "INDEX_WINDOW").then(|| at_cap.clone()));
            assert!(s.validate().is_ok());

            let huge = usize::MAX.to_string();
            let s = Settings::from_lookup(|k| (k == "INDEX_WINDOW").then(|| huge.clone()));
            assert_eq!(s.index_window, usize::MAX);
            assert!(s.validate().is_err());
        }

        #[test]
        fn rejects_zero_interval() {
            let s = Settings::from_lookup(|k| (k == "REFRESH_INTERVAL_SECS").then(|| "0".to_string()));
            assert!(s.validate().is_err());
        }
    }
}
