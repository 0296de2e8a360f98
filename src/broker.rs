//! Brokerage data API access
//!
//! `MarketDataApi` is the seam the rest of the crate talks to. `TInvestClient`
//! implements it over the T-Invest REST gateway: every method is a JSON POST to
//! `{base}/tinkoff.public.invest.api.contract.v1.<Service>/<Method>`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, instrument};

use crate::error::{PipelineError, Result};
use crate::stocks::{Candle, Instrument};

const CONTRACT_PREFIX: &str = "tinkoff.public.invest.api.contract.v1";
const CANDLE_INTERVAL_DAY: &str = "CANDLE_INTERVAL_DAY";
const INSTRUMENT_STATUS_BASE: &str = "INSTRUMENT_STATUS_BASE";

/// Operations the pipeline needs from a brokerage.
#[async_trait]
pub trait MarketDataApi: Send + Sync {
    /// All tradable shares, unfiltered.
    async fn shares(&self) -> Result<Vec<Instrument>>;

    /// Last traded price, or `None` when the broker has no quote for `figi`.
    async fn last_price(&self, figi: &str) -> Result<Option<f64>>;

    /// Daily candles for `figi` in `[from, to]`.
    async fn daily_candles(
        &self,
        figi: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>>;
}

/// Fixed-point price as the broker encodes it: whole units plus billionths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Quotation {
    #[serde(default, deserialize_with = "deserialize_units")]
    pub units: i64,
    #[serde(default)]
    pub nano: i32,
}

impl Quotation {
    pub fn to_f64(self) -> f64 {
        self.units as f64 + self.nano as f64 / 1e9
    }
}

// int64 fields come through the REST gateway as JSON strings, but accept plain numbers too.
fn deserialize_units<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: serde::de::Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    match v {
        Value::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| serde::de::Error::custom(format!("units out of range: {}", n))),
        Value::Null => Ok(0),
        other => Err(serde::de::Error::custom(format!("unexpected units value: {}", other))),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShareDto {
    figi: String,
    #[serde(default)]
    ticker: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    currency: String,
    #[serde(default)]
    country_of_risk: String,
    #[serde(default)]
    country_of_risk_name: String,
    #[serde(default)]
    sector: String,
}

impl From<ShareDto> for Instrument {
    fn from(s: ShareDto) -> Self {
        Instrument {
            figi: s.figi,
            ticker: s.ticker,
            name: s.name,
            currency: s.currency,
            country_of_risk: s.country_of_risk,
            country_of_risk_name: s.country_of_risk_name,
            sector: s.sector,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SharesResponse {
    #[serde(default)]
    instruments: Vec<ShareDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LastPriceDto {
    figi: String,
    price: Option<Quotation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LastPricesResponse {
    #[serde(default)]
    last_prices: Vec<LastPriceDto>,
}

#[derive(Debug, Deserialize)]
struct CandleDto {
    time: Option<DateTime<Utc>>,
    close: Option<Quotation>,
}

#[derive(Debug, Deserialize)]
struct CandlesResponse {
    #[serde(default)]
    candles: Vec<CandleDto>,
}

/// REST client for the T-Invest brokerage API.
pub struct TInvestClient {
    base_url: String,
    client: reqwest::Client,
}

impl TInvestClient {
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| PipelineError::Connectivity(format!("invalid API token: {}", e)))?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::Connectivity(e.to_string()))?;

        debug!(base_url, "broker client initialised");

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn method_url(&self, service: &str, method: &str) -> String {
        format!("{}/{}.{}/{}", self.base_url, CONTRACT_PREFIX, service, method)
    }

    async fn send_post_request<T: DeserializeOwned>(
        &self,
        service: &str,
        method: &str,
        data: &Value,
    ) -> Result<T> {
        let url = self.method_url(service, method);
        let resp = self.client.post(&url).json(data).send().await?;

        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            return Err(PipelineError::request(status.as_u16(), text));
        }

        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl MarketDataApi for TInvestClient {
    #[instrument(skip(self), name = "broker::shares")]
    async fn shares(&self) -> Result<Vec<Instrument>> {
        let resp: SharesResponse = self
            .send_post_request(
                "InstrumentsService",
                "Shares",
                &json!({ "instrumentStatus": INSTRUMENT_STATUS_BASE }),
            )
            .await?;
        debug!(count = resp.instruments.len(), "shares listed");
        Ok(resp.instruments.into_iter().map(Instrument::from).collect())
    }

    #[instrument(skip(self), name = "broker::last_price")]
    async fn last_price(&self, figi: &str) -> Result<Option<f64>> {
        let resp: LastPricesResponse = self
            .send_post_request("MarketDataService", "GetLastPrices", &json!({ "figi": [figi] }))
            .await?;
        Ok(resp
            .last_prices
            .into_iter()
            .find(|p| p.figi == figi)
            .and_then(|p| p.price)
            .map(Quotation::to_f64))
    }

    #[instrument(skip(self, from, to), name = "broker::daily_candles")]
    async fn daily_candles(
        &self,
        figi: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        let body = json!({
            "figi": figi,
            "from": from.to_rfc3339(),
            "to": to.to_rfc3339(),
            "interval": CANDLE_INTERVAL_DAY,
        });
        let resp: CandlesResponse = self
            .send_post_request("MarketDataService", "GetCandles", &body)
            .await?;
        Ok(candles_from_response(resp))
    }
}

// Candles with no close are dropped; no timestamp means we can't place them, so those go too.
fn candles_from_response(resp: CandlesResponse) -> Vec<Candle> {
    resp.candles
        .into_iter()
        .filter_map(|c| match (c.time, c.close) {
            (Some(time), Some(close)) => Some(Candle { time, close: close.to_f64() }),
            _ => None,
        })
        .collect()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotation_accepts_string_and_numeric_units() {
        let q: Quotation = serde_json::from_str(r#"{"units":"271","nano":450000000}"#).unwrap();
        assert!((q.to_f64() - 271.45).abs() < 1e-9);

        let q: Quotation = serde_json::from_str(r#"{"units":12,"nano":0}"#).unwrap();
        assert_eq!(q.to_f64(), 12.0);

        let q: Quotation = serde_json::from_str(r#"{"nano":500000000}"#).unwrap();
        assert_eq!(q.to_f64(), 0.5);

        assert!(serde_json::from_str::<Quotation>(r#"{"units":"abc"}"#).is_err());
    }

    #[test]
    fn shares_response_maps_to_instruments() {
        let body = r#"{"instruments":[
            {"figi":"BBG004730N88","ticker":"SBER","name":"Сбер Банк","currency":"rub",
             "countryOfRisk":"RU","countryOfRiskName":"Российская Федерация","sector":"financial",
             "lot":10}
        ]}"#;
        let resp: SharesResponse = serde_json::from_str(body).unwrap();
        let instruments: Vec<Instrument> = resp.instruments.into_iter().map(Instrument::from).collect();
        assert_eq!(instruments.len(), 1);
        assert_eq!(instruments[0].figi, "BBG004730N88");
        assert_eq!(instruments[0].ticker, "SBER");
        assert_eq!(instruments[0].currency, "rub");
        assert_eq!(instruments[0].country_of_risk, "RU");
        assert_eq!(instruments[0].sector, "financial");
    }

    #[test]
    fn last_prices_response_tolerates_missing_price() {
        let body = r#"{"lastPrices":[{"figi":"A","price":{"units":"10","nano":250000000}},{"figi":"B"}]}"#;
        let resp: LastPricesResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.last_prices.len(), 2);
        assert_eq!(resp.last_prices[0].price.map(Quotation::to_f64), Some(10.25));
        assert!(resp.last_prices[1].price.is_none());
    }

    #[test]
    fn candles_without_close_or_time_are_dropped() {
        let body = r#"{"candles":[
            {"time":"2024-01-10T07:00:00Z","close":{"units":"100","nano":0},"volume":"5","isComplete":true},
            {"time":"2024-01-11T07:00:00Z","volume":"5"},
            {"close":{"units":"101","nano":0}},
            {"time":"2024-01-12T07:00:00Z","close":{"units":"102","nano":500000000}}
        ]}"#;
        let resp: CandlesResponse = serde_json::from_str(body).unwrap();
        let candles = candles_from_response(resp);
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].close, 100.0);
        assert_eq!(candles[1].close, 102.5);
        assert!(candles[0].time < candles[1].time);
    }

    #[test]
    fn method_urls_follow_contract_prefix() {
        let client = TInvestClient::new("http://localhost:1/rest/", "t.token", Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.method_url("MarketDataService", "GetCandles"),
            "http://localhost:1/rest/tinkoff.public.invest.api.contract.v1.MarketDataService/GetCandles"
        );
    }

    #[test]
    fn token_with_newline_is_rejected() {
        let err = TInvestClient::new("http://localhost:1", "bad\ntoken", Duration::from_secs(1)).err();
        assert!(matches!(err, Some(PipelineError::Connectivity(_))));
    }
}
