//! Process configuration loaded from the environment.
//!
//! Supported variables:
//! - `TELEGRAM_TOKEN` (required)
//! - `OWNER_USERNAME` (required)
//! - `DATABASE_URL` (default `sqlite:spybot.db?mode=rwc`)
//! - `LOG_DIR` (default `logs`)
//! - `DEFAULT_SOURCE`: `leetcode` or `lichess` (default `leetcode`)
//! - `DEFAULT_ACCOUNTS`: comma separated, e.g. `alice,lichess:magnus`
//! - `POLL_INTERVAL_SECS`, `INITIAL_DELAY_SECS`, `WATCH_INTERVAL_SECS`
//! - `WATCH_MAX_POLLS`, `SNAPSHOT_DEPTH`

use std::str::FromStr;
use std::time::Duration;

use crate::commands::AccountRef;
use crate::domain::SourceKind;
use crate::scheduler::SchedulerConfig;
use crate::{Error, Result};

pub const DEFAULT_DATABASE_URL: &str = "sqlite:spybot.db?mode=rwc";
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_SNAPSHOT_DEPTH: u32 = 5;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub telegram_token: String,
    /// Username allowed to run mutating commands, without the leading `@`.
    pub owner_username: String,
    pub database_url: String,
    pub log_dir: String,
    pub default_source: SourceKind,
    /// Seeded into a subscription that is started without entities.
    pub default_accounts: Vec<AccountRef>,
    pub scheduler: SchedulerConfig,
    /// Number of recent submissions fetched per LeetCode poll.
    pub snapshot_depth: u32,
}

impl AppConfig {
    /// Load from the process environment. Call `dotenvy::dotenv()` first to
    /// pick up a `.env` file.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let telegram_token = get("TELEGRAM_TOKEN")
            .ok_or_else(|| Error::config("TELEGRAM_TOKEN is not set"))?;
        let owner_username = get("OWNER_USERNAME")
            .map(|name| name.trim_start_matches('@').to_string())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| Error::config("OWNER_USERNAME is not set"))?;

        let default_source = match get("DEFAULT_SOURCE") {
            Some(raw) => SourceKind::parse(&raw).ok_or_else(|| {
                Error::config(format!("DEFAULT_SOURCE must be leetcode or lichess, got '{}'", raw))
            })?,
            None => SourceKind::LeetCode,
        };

        let default_accounts = match get("DEFAULT_ACCOUNTS") {
            Some(raw) => parse_accounts(&raw, default_source)?,
            None => Vec::new(),
        };

        let defaults = SchedulerConfig::default();
        let scheduler = SchedulerConfig {
            initial_delay: secs(&get, "INITIAL_DELAY_SECS", defaults.initial_delay)?,
            poll_interval: secs(&get, "POLL_INTERVAL_SECS", defaults.poll_interval)?,
            watch_interval: secs(&get, "WATCH_INTERVAL_SECS", defaults.watch_interval)?,
            watch_max_polls: number(&get, "WATCH_MAX_POLLS", defaults.watch_max_polls)?,
        };
        if scheduler.poll_interval.is_zero() || scheduler.watch_interval.is_zero() {
            return Err(Error::config("poll and watch intervals must be positive"));
        }
        if scheduler.watch_max_polls == 0 {
            return Err(Error::config("WATCH_MAX_POLLS must be positive"));
        }

        let snapshot_depth = number(&get, "SNAPSHOT_DEPTH", DEFAULT_SNAPSHOT_DEPTH)?;
        if snapshot_depth == 0 {
            return Err(Error::config("SNAPSHOT_DEPTH must be positive"));
        }

        Ok(Self {
            telegram_token,
            owner_username,
            database_url: get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            log_dir: get("LOG_DIR").unwrap_or_else(|| DEFAULT_LOG_DIR.to_string()),
            default_source,
            default_accounts,
            scheduler,
            snapshot_depth,
        })
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        self.scheduler.clone()
    }
}

fn parse_accounts(raw: &str, default_source: SourceKind) -> Result<Vec<AccountRef>> {
    let mut accounts: Vec<AccountRef> = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let account = AccountRef::parse(part, default_source)
            .map_err(|reason| Error::config(format!("DEFAULT_ACCOUNTS: {}", reason)))?;
        if !accounts.contains(&account) {
            accounts.push(account);
        }
    }
    Ok(accounts)
}

fn number<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T> {
    match get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| Error::config(format!("{} is not a valid number: '{}'", key, raw))),
        None => Ok(default),
    }
}

fn secs(get: &impl Fn(&str) -> Option<String>, key: &str, default: Duration) -> Result<Duration> {
    number(get, key, default.as_secs()).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<AppConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    const REQUIRED: [(&str, &str); 2] = [("TELEGRAM_TOKEN", "123:abc"), ("OWNER_USERNAME", "@owner")];

    #[test]
    fn test_defaults() {
        let config = load(&REQUIRED).unwrap();

        assert_eq!(config.owner_username, "owner");
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.log_dir, "logs");
        assert_eq!(config.default_source, SourceKind::LeetCode);
        assert!(config.default_accounts.is_empty());
        assert_eq!(config.scheduler_config(), SchedulerConfig::default());
        assert_eq!(config.snapshot_depth, 5);
    }

    #[test]
    fn test_missing_required() {
        assert!(matches!(
            load(&[("OWNER_USERNAME", "owner")]),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            load(&[("TELEGRAM_TOKEN", "t"), ("OWNER_USERNAME", "  ")]),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_overrides() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("DEFAULT_SOURCE", "lichess"),
            ("DEFAULT_ACCOUNTS", "magnus, leetcode:alice,,magnus"),
            ("POLL_INTERVAL_SECS", "30"),
            ("WATCH_MAX_POLLS", "10"),
            ("SNAPSHOT_DEPTH", "20"),
        ]);
        let config = load(&pairs).unwrap();

        assert_eq!(config.default_source, SourceKind::Lichess);
        assert_eq!(
            config.default_accounts,
            vec![
                AccountRef::new(SourceKind::Lichess, "magnus"),
                AccountRef::new(SourceKind::LeetCode, "alice"),
            ]
        );
        assert_eq!(config.scheduler.poll_interval, Duration::from_secs(30));
        assert_eq!(config.scheduler.initial_delay, Duration::from_secs(1));
        assert_eq!(config.scheduler.watch_max_polls, 10);
        assert_eq!(config.snapshot_depth, 20);
    }

    #[test]
    fn test_invalid_values() {
        for (key, value) in [
            ("POLL_INTERVAL_SECS", "soon"),
            ("POLL_INTERVAL_SECS", "0"),
            ("WATCH_MAX_POLLS", "-1"),
            ("DEFAULT_SOURCE", "chesscom"),
            ("DEFAULT_ACCOUNTS", "codeforces:bob"),
            ("SNAPSHOT_DEPTH", "0"),
        ] {
            let mut pairs = REQUIRED.to_vec();
            pairs.push((key, value));
            assert!(
                matches!(load(&pairs), Err(Error::Configuration(_))),
                "{}={} should be rejected",
                key,
                value
            );
        }
    }
}
