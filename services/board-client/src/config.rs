//! Configuration for the board client.

use std::time::Duration;

use anyhow::{Context, Result};
use raidboard_grid::defaults::default_parties;
use raidboard_reconcile::{DEFAULT_POLL_INTERVAL, DEFAULT_RECONNECT_DELAY, MIN_POLL_INTERVAL};

/// Default backend base URL.
pub const DEFAULT_API_URL: &str = "http://localhost:8080/api";

/// Board client configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Backend base URL, including the `/api` prefix.
    pub api_url: String,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Delay before reconnecting a failed push connection.
    pub reconnect_delay: Duration,

    /// Last-updated poll interval when push is unavailable.
    pub poll_interval: Duration,

    /// Debounce window for schedule-cell saves.
    pub schedule_debounce: Duration,

    /// Debounce window for user-schedule saves.
    pub user_schedule_debounce: Duration,

    /// Party row labels, in display order.
    pub parties: Vec<String>,

    /// Save each edit as it happens instead of waiting for save-all.
    pub auto_save: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            log_level: "info".to_string(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            schedule_debounce: Duration::from_millis(500),
            user_schedule_debounce: Duration::from_millis(1000),
            parties: default_parties(),
            auto_save: true,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let api_url = lookup("RAIDBOARD_API_URL").unwrap_or(defaults.api_url);
        let log_level = lookup("RAIDBOARD_LOG_LEVEL").unwrap_or(defaults.log_level);

        let millis = |key: &str, default: Duration| -> Result<Duration> {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_millis)
                    .with_context(|| format!("{key} must be an integer number of milliseconds")),
                None => Ok(default),
            }
        };

        let reconnect_delay = millis("RAIDBOARD_RECONNECT_DELAY_MS", defaults.reconnect_delay)?;
        let poll_interval =
            millis("RAIDBOARD_POLL_INTERVAL_MS", defaults.poll_interval)?.max(MIN_POLL_INTERVAL);
        let schedule_debounce =
            millis("RAIDBOARD_SCHEDULE_DEBOUNCE_MS", defaults.schedule_debounce)?;
        let user_schedule_debounce = millis(
            "RAIDBOARD_USER_SCHEDULE_DEBOUNCE_MS",
            defaults.user_schedule_debounce,
        )?;

        let parties = match lookup("RAIDBOARD_PARTIES") {
            Some(raw) => {
                let parties: Vec<String> = raw
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(String::from)
                    .collect();
                anyhow::ensure!(
                    !parties.is_empty(),
                    "RAIDBOARD_PARTIES must name at least one party"
                );
                parties
            }
            None => defaults.parties,
        };

        let auto_save = match lookup("RAIDBOARD_AUTO_SAVE") {
            Some(raw) => parse_flag(&raw)
                .with_context(|| format!("RAIDBOARD_AUTO_SAVE must be a boolean, got {raw:?}"))?,
            None => defaults.auto_save,
        };

        Ok(Self {
            api_url,
            log_level,
            reconnect_delay,
            poll_interval,
            schedule_debounce,
            user_schedule_debounce,
            parties,
            auto_save,
        })
    }
}

fn parse_flag(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("unrecognised flag value {other:?}"),
    }
}
