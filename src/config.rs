use std::env;
use std::time::Duration;

use crate::error::{PipelineError, Result};

pub const DEFAULT_API_URL: &str = "https://invest-public-api.tinkoff.ru/rest";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_FETCH_CONCURRENCY: usize = 8;
const DEFAULT_CANDLE_WINDOW_DAYS: i64 = 365;
const DEFAULT_USERS_FILE: &str = "users.json";

/// Runtime settings, read from the environment (and `.env`, loaded by `main`).
#[derive(Clone)]
pub struct Config {
    /// Bearer token for the brokerage API. Only needed for the stocks branch.
    pub api_token: Option<String>,
    pub api_url: String,
    pub request_timeout: Duration,
    pub fetch_concurrency: usize,
    pub candle_window_days: i64,
    pub users_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_token: None,
            api_url: DEFAULT_API_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
            candle_window_days: DEFAULT_CANDLE_WINDOW_DAYS,
            users_file: DEFAULT_USERS_FILE.to_string(),
        }
    }
}

// Token is deliberately left out of Debug output.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .field("api_url", &self.api_url)
            .field("request_timeout", &self.request_timeout)
            .field("fetch_concurrency", &self.fetch_concurrency)
            .field("candle_window_days", &self.candle_window_days)
            .field("users_file", &self.users_file)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Unparseable numbers fall
    /// back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_token = lookup("TINVEST_TOKEN")
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        let api_url = lookup("TINVEST_API_URL")
            .map(|u| u.trim().trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let request_timeout_secs = lookup("REQUEST_TIMEOUT_SECS")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);

        let fetch_concurrency = lookup("FETCH_CONCURRENCY")
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(DEFAULT_FETCH_CONCURRENCY)
            .max(1);

        let candle_window_days = lookup("CANDLE_WINDOW_DAYS")
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_CANDLE_WINDOW_DAYS);

        let users_file = lookup("USERS_FILE")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_USERS_FILE.to_string());

        Self {
            api_token,
            api_url,
            request_timeout: Duration::from_secs(request_timeout_secs),
            fetch_concurrency,
            candle_window_days,
            users_file,
        }
    }

    /// Token for the stocks branch. Missing token means we cannot open a session at all.
    pub fn require_token(&self) -> Result<&str> {
        self.api_token
            .as_deref()
            .ok_or_else(|| PipelineError::Connectivity("TINVEST_TOKEN not set".into()))
    }
}
