//! Market data retrieval and normalization
//!
//! This module handles:
//! - Filtering the broker's share listing by category, country and currency
//! - Fetching last prices and a trailing window of daily candles per share
//! - Pooling candle closes for the volatility estimate

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::broker::MarketDataApi;
use crate::config::Config;
use crate::error::{PipelineError, Result};

/// Filter value that disables a category or country predicate.
pub const ANY: &str = "Any";
/// Only instruments quoted in this currency are eligible.
pub const TARGET_CURRENCY: &str = "RUB";

pub const CATEGORY_PRESETS: &[&str] = &[ANY, "Technology", "Finance", "Healthcare", "Energy"];
pub const COUNTRY_PRESETS: &[&str] = &[ANY, "Russia", "USA", "China", "Germany", "Japan"];

const PROGRESS_EVERY: usize = 10;

/// A tradable share as listed by the broker. Snapshot of a single fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub figi: String,
    #[serde(default)]
    pub ticker: String,
    pub name: String,
    pub currency: String,
    #[serde(default)]
    pub country_of_risk: String,
    #[serde(default)]
    pub country_of_risk_name: String,
    #[serde(default)]
    pub sector: String,
}

/// One daily bar; only the close is kept.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: DateTime<Utc>,
    pub close: f64,
}

/// figi -> last price in major units.
pub type PriceBook = HashMap<String, f64>;

/// ISO country codes for the preset country names.
fn country_code(name: &str) -> Option<&'static str> {
    match name.to_ascii_lowercase().as_str() {
        "russia" => Some("RU"),
        "usa" => Some("US"),
        "china" => Some("CN"),
        "germany" => Some("DE"),
        "japan" => Some("JP"),
        _ => None,
    }
}

/// Pre-selection predicates applied before any scoring.
#[derive(Debug, Clone, PartialEq)]
pub struct ShareFilter {
    pub category: String,
    pub country: String,
}

impl Default for ShareFilter {
    fn default() -> Self {
        Self::new(ANY, ANY)
    }
}

impl ShareFilter {
    pub fn new(category: &str, country: &str) -> Self {
        Self {
            category: category.trim().to_string(),
            country: country.trim().to_string(),
        }
    }

    fn is_any(value: &str) -> bool {
        value.is_empty() || value.eq_ignore_ascii_case(ANY)
    }

    /// Category is a case-insensitive substring of the instrument name.
    pub fn matches_category(&self, instrument: &Instrument) -> bool {
        if Self::is_any(&self.category) {
            return true;
        }
        instrument
            .name
            .to_lowercase()
            .contains(&self.category.to_lowercase())
    }

    /// Country compares against the risk-country code, its display name, or the
    /// code a preset name maps to. Instruments with no risk country never match.
    pub fn matches_country(&self, instrument: &Instrument) -> bool {
        if Self::is_any(&self.country) {
            return true;
        }
        let wanted = self.country.to_lowercase();
        let code = instrument.country_of_risk.to_lowercase();
        if code.is_empty() && instrument.country_of_risk_name.is_empty() {
            return false;
        }
        code == wanted
            || instrument.country_of_risk_name.to_lowercase() == wanted
            || country_code(&self.country).is_some_and(|c| c.eq_ignore_ascii_case(&code))
    }

    pub fn matches_currency(instrument: &Instrument) -> bool {
        instrument.currency.eq_ignore_ascii_case(TARGET_CURRENCY)
    }

    pub fn matches(&self, instrument: &Instrument) -> bool {
        self.matches_category(instrument)
            && self.matches_country(instrument)
            && Self::matches_currency(instrument)
    }

    pub fn apply(&self, instruments: Vec<Instrument>) -> Vec<Instrument> {
        instruments.into_iter().filter(|i| self.matches(i)).collect()
    }
}

/// Knobs for the per-instrument fetch loop.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub concurrency: usize,
    pub request_timeout: Duration,
    pub candle_window: chrono::Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            concurrency: 8,
            request_timeout: Duration::from_secs(10),
            candle_window: chrono::Duration::days(365),
        }
    }
}

impl FetchSettings {
    /// Time allowed for one instrument: a price call then a candles call, each
    /// bounded by `request_timeout`.
    pub fn task_timeout(&self) -> Duration {
        self.request_timeout * 2
    }
}

impl From<&Config> for FetchSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            concurrency: cfg.fetch_concurrency.max(1),
            request_timeout: cfg.request_timeout,
            candle_window: chrono::Duration::days(cfg.candle_window_days),
        }
    }
}

/// Everything one pipeline run needs from the market. Discarded after use.
#[derive(Debug, Clone, Default)]
pub struct MarketSnapshot {
    /// Filtered instruments that got both a price and candles, in listing order.
    pub instruments: Vec<Instrument>,
    pub prices: PriceBook,
    /// Candle closes of every instrument, concatenated.
    pub closes: Vec<f64>,
    /// Instruments dropped because a fetch failed, timed out or had no quote.
    pub failed: usize,
}

fn progress_due(done: usize, total: usize) -> bool {
    done % PROGRESS_EVERY == 0 || done == total
}

struct FetchedQuote {
    price: f64,
    candles: Vec<Candle>,
}

async fn fetch_instrument_data<A>(
    api: &A,
    figi: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Option<FetchedQuote>>
where
    A: MarketDataApi + ?Sized,
{
    let Some(price) = api.last_price(figi).await? else {
        return Ok(None);
    };
    let candles = api.daily_candles(figi, from, to).await?;
    Ok(Some(FetchedQuote { price, candles }))
}

/// Fetch the filtered share list, then prices and candles for each survivor.
///
/// Failing to list shares is fatal (`Connectivity`). Any per-instrument failure
/// (request error, timeout, missing quote) is logged and that instrument is left
/// out of the snapshot; the rest carry on.
pub async fn fetch_market_data<A>(
    api: &A,
    filter: &ShareFilter,
    settings: &FetchSettings,
) -> Result<MarketSnapshot>
where
    A: MarketDataApi + ?Sized,
{
    let listed = api
        .shares()
        .await
        .map_err(|e| PipelineError::Connectivity(e.to_string()))?;
    let listed_count = listed.len();

    let candidates = filter.apply(listed);
    let total = candidates.len();
    info!(
        listed = listed_count,
        selected = total,
        category = %filter.category,
        country = %filter.country,
        "share listing filtered"
    );

    let to = Utc::now();
    let from = to - settings.candle_window;
    let per_task_timeout = settings.task_timeout();

    let mut results = stream::iter(candidates)
        .map(|instrument| async move {
            let outcome = match tokio::time::timeout(
                per_task_timeout,
                fetch_instrument_data(api, &instrument.figi, from, to),
            )
            .await
            {
                Ok(r) => r,
                Err(_) => Err(PipelineError::Timeout(format!(
                    "{} after {:?}",
                    instrument.figi, per_task_timeout
                ))),
            };
            (instrument, outcome)
        })
        .buffered(settings.concurrency.max(1));

    let mut snapshot = MarketSnapshot::default();
    let mut done = 0usize;

    while let Some((instrument, outcome)) = results.next().await {
        done += 1;
        match outcome {
            Ok(Some(quote)) => {
                debug!(
                    figi = %instrument.figi,
                    price = quote.price,
                    candles = quote.candles.len(),
                    "instrument fetched"
                );
                snapshot.prices.insert(instrument.figi.clone(), quote.price);
                snapshot.closes.extend(quote.candles.iter().map(|c| c.close));
                snapshot.instruments.push(instrument);
            }
            Ok(None) => {
                warn!(figi = %instrument.figi, name = %instrument.name, "no last price, skipping");
                snapshot.failed += 1;
            }
            Err(e) => {
                warn!(figi = %instrument.figi, name = %instrument.name, error = %e, "error fetching data, skipping");
                snapshot.failed += 1;
            }
        }

        if progress_due(done, total) {
            info!("Progress: {}/{} instruments...", done, total);
        }
    }

    info!(
        fetched = snapshot.instruments.len(),
        failed = snapshot.failed,
        total,
        closes = snapshot.closes.len(),
        "market data fetch complete"
    );

    Ok(snapshot)
}
