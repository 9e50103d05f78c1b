use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use governor::{Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use crate::exchange::{ExchangeError, MarketData};
use crate::models::Candle;

pub const BINANCE_API_BASE: &str = "https://api.binance.com";
pub const BINANCE_US_API_BASE: &str = "https://api.binance.us";

const RATE_LIMIT_RPM: u32 = 600;
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 500;

type BinanceRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Client for Binance public market data (ticker + klines)
///
/// Cloneable; all clones share one rate limiter.
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
    rate_limiter: Arc<BinanceRateLimiter>,
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    msg: String,
}

impl BinanceClient {
    pub fn new() -> Self {
        Self::with_base_url(BINANCE_API_BASE)
    }

    /// Point the client at another Binance-compatible host
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(RATE_LIMIT_RPM).unwrap_or(NonZeroU32::MIN));

        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_default(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// `BTC/USDT` -> `BTCUSDT`
    pub fn market_symbol(pair: &str) -> String {
        pair.replace(['/', '-'], "").to_uppercase()
    }

    /// Rate-limited GET with retry on 429/418/5xx and network errors
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ExchangeError> {
        let url = format!("{}{}", self.base_url, path);

        for attempt in 1..=MAX_RETRIES {
            self.rate_limiter.until_ready().await;

            let backoff = Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt - 1));

            let response = match self.client.get(&url).query(query).send().await {
                Ok(response) => response,
                Err(e) if attempt < MAX_RETRIES => {
                    tracing::warn!(
                        "Binance network error: {}, retrying in {:?} (attempt {}/{})",
                        e,
                        backoff,
                        attempt,
                        MAX_RETRIES
                    );
                    tokio::time::sleep(backoff).await;
                    continue;
                }
                Err(e) => return Err(ExchangeError::Http(e)),
            };

            let status = response.status();
            if status.is_success() {
                return response.json::<T>().await.map_err(ExchangeError::Http);
            }

            let retryable = status == StatusCode::TOO_MANY_REQUESTS
                || status.as_u16() == 418
                || status.is_server_error();
            if retryable && attempt < MAX_RETRIES {
                tracing::warn!(
                    "Binance returned {}, backing off for {:?} (attempt {}/{})",
                    status,
                    backoff,
                    attempt,
                    MAX_RETRIES
                );
                tokio::time::sleep(backoff).await;
                continue;
            }
            if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418 {
                return Err(ExchangeError::RateLimited(MAX_RETRIES));
            }

            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|e| e.msg)
                .unwrap_or(body);
            return Err(ExchangeError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Err(ExchangeError::RateLimited(MAX_RETRIES))
    }
}

impl Default for BinanceClient {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_number(value: &Value, field: &str) -> Result<f64, ExchangeError> {
    match value {
        Value::String(s) => s
            .parse::<f64>()
            .map_err(|_| ExchangeError::Parse(format!("{} '{}' is not a number", field, s))),
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| ExchangeError::Parse(format!("{} out of range", field))),
        other => Err(ExchangeError::Parse(format!(
            "{} has unexpected type: {}",
            field, other
        ))),
    }
}

fn parse_kline(row: &[Value]) -> Result<Candle, ExchangeError> {
    if row.len() < 6 {
        return Err(ExchangeError::Parse(format!(
            "kline has {} fields, expected at least 6",
            row.len()
        )));
    }

    let open_time = row[0]
        .as_i64()
        .ok_or_else(|| ExchangeError::Parse("kline open time is not an integer".to_string()))?;
    let timestamp = Utc
        .timestamp_millis_opt(open_time)
        .single()
        .ok_or_else(|| ExchangeError::Parse(format!("invalid kline time {}", open_time)))?;

    Ok(Candle {
        timestamp,
        open: parse_number(&row[1], "open")?,
        high: parse_number(&row[2], "high")?,
        low: parse_number(&row[3], "low")?,
        close: parse_number(&row[4], "close")?,
        volume: parse_number(&row[5], "volume")?,
    })
}

#[async_trait]
impl MarketData for BinanceClient {
    async fn last_price(&self, pair: &str) -> Result<f64, ExchangeError> {
        let ticker: TickerPrice = self
            .get_json(
                "/api/v3/ticker/price",
                &[("symbol", Self::market_symbol(pair))],
            )
            .await?;

        let price = ticker
            .price
            .parse::<f64>()
            .map_err(|_| ExchangeError::Parse(format!("price '{}' is not a number", ticker.price)))?;

        tracing::debug!(pair = %pair, price = %price, "Fetched last price");
        Ok(price)
    }

    async fn candles(
        &self,
        pair: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let rows: Vec<Vec<Value>> = self
            .get_json(
                "/api/v3/klines",
                &[
                    ("symbol", Self::market_symbol(pair)),
                    ("interval", timeframe.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        let candles = rows
            .iter()
            .map(|row| parse_kline(row))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::info!(
            "Fetched {} {} candles for {}",
            candles.len(),
            timeframe,
            pair
        );

        Ok(candles)
    }
}
