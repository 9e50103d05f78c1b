use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp layout the exchange uses for order confirmations (ISO-8601, millis, `Z`)
pub const ORDER_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

const SECONDS_PER_DAY: i64 = 86_400;

/// OHLCV candlestick
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    #[default]
    Buy,
    Sell,
}

/// Informational only: a sold position is removed from the ledger, never kept as `Closed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    #[default]
    Open,
    Closed,
}

/// One open buy lot, in the exact shape it is persisted under `ORDERS`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    /// Exchange-assigned order id. Legacy price-keyed files may omit it.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(rename = "price")]
    pub buy_price: f64,
    #[serde(default)]
    pub side: OrderSide,
    #[serde(default)]
    pub status: PositionStatus,
    pub amount: f64,
    pub remaining: f64,
    #[serde(default)]
    pub datetime: Option<String>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl Position {
    /// Build an open position from a filled market buy
    ///
    /// Falls back to `now` when the exchange omits the datetime or timestamp.
    pub fn from_confirmation(
        confirmation: &OrderConfirmation,
        symbol: &str,
        buy_price: f64,
        amount: f64,
        now: DateTime<Utc>,
    ) -> Self {
        let datetime = confirmation
            .datetime
            .clone()
            .unwrap_or_else(|| now.format(ORDER_DATETIME_FORMAT).to_string());
        let timestamp = confirmation
            .timestamp
            .unwrap_or_else(|| now.timestamp_millis());

        Self {
            id: confirmation.id.clone(),
            symbol: symbol.to_string(),
            buy_price,
            side: OrderSide::Buy,
            status: PositionStatus::Open,
            amount,
            remaining: amount,
            datetime: Some(datetime),
            timestamp: Some(timestamp),
        }
    }

    /// Acquisition time: `datetime` first, then the millisecond `timestamp`
    pub fn opened_at(&self) -> Option<DateTime<Utc>> {
        if let Some(raw) = self.datetime.as_deref() {
            if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
                return Some(parsed.with_timezone(&Utc));
            }
        }

        self.timestamp
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
    }

    /// Whole days since the position was opened; 0 when the date is missing or malformed
    pub fn days_open(&self, now: DateTime<Utc>) -> i64 {
        match self.opened_at() {
            Some(opened) => (now - opened).num_seconds().div_euclid(SECONDS_PER_DAY),
            None => 0,
        }
    }

    /// Price at or above which this position is sold
    pub fn sell_threshold(&self, rise_percent: f64) -> f64 {
        self.buy_price * (1.0 + rise_percent / 100.0)
    }
}

/// Aggregate counters carried across restarts, persisted under `META`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct LedgerMeta {
    #[serde(rename = "PROFIT", default)]
    pub total_profit: f64,
    #[serde(rename = "SALES", default)]
    pub total_sales: u64,
}

/// What the exchange reports back after a market order
#[derive(Debug, Clone, PartialEq)]
pub struct OrderConfirmation {
    pub id: String,
    pub datetime: Option<String>,
    pub timestamp: Option<i64>,
    /// Average fill price when the exchange reports one
    pub price: Option<f64>,
    pub amount: f64,
}
