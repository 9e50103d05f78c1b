// Exchange capability used by the decision engine
pub mod paper;
pub mod registry;

pub use paper::PaperExchange;
pub use registry::{build_exchange, is_supported, paper_exchange, SUPPORTED_EXCHANGES};

use async_trait::async_trait;

use crate::models::{Candle, OrderConfirmation};

#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("exchange API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited, gave up after {0} attempts")]
    RateLimited(u32),

    #[error("unexpected exchange response: {0}")]
    Parse(String),

    #[error("insufficient {currency} balance: need {needed:.8}, have {available:.8}")]
    InsufficientBalance {
        currency: String,
        needed: f64,
        available: f64,
    },

    #[error("invalid order: {0}")]
    InvalidOrder(String),

    #[error("unknown exchange '{name}' (supported: {supported})")]
    UnknownExchange { name: String, supported: String },
}

/// Trading operations the engine needs from an exchange
///
/// Any error is terminal for the current cycle only.
#[async_trait]
pub trait Exchange: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_last_price(&self, pair: &str) -> Result<f64, ExchangeError>;

    /// Candles oldest first
    async fn fetch_candles(
        &self,
        pair: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError>;

    /// Market buy of `amount` base currency
    async fn market_buy(&self, pair: &str, amount: f64) -> Result<OrderConfirmation, ExchangeError>;

    /// Market sell of `amount` base currency
    async fn market_sell(&self, pair: &str, amount: f64)
        -> Result<OrderConfirmation, ExchangeError>;

    async fn fetch_free_balance(&self, currency: &str) -> Result<f64, ExchangeError>;
}

/// Public (unauthenticated) market data
#[async_trait]
pub trait MarketData: Send + Sync {
    async fn last_price(&self, pair: &str) -> Result<f64, ExchangeError>;

    async fn candles(
        &self,
        pair: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError>;
}

/// Split `BASE/QUOTE` into its two currencies
pub fn split_pair(pair: &str) -> Result<(&str, &str), ExchangeError> {
    match pair.split_once('/') {
        Some((base, quote)) if !base.is_empty() && !quote.is_empty() => Ok((base, quote)),
        _ => Err(ExchangeError::InvalidOrder(format!(
            "pair '{}' is not in BASE/QUOTE form",
            pair
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_pair() {
        assert_eq!(split_pair("BTC/USDT").unwrap(), ("BTC", "USDT"));
        assert!(split_pair("BTCUSDT").is_err());
        assert!(split_pair("/USDT").is_err());
    }

    #[test]
    fn test_error_messages() {
        let err = ExchangeError::InsufficientBalance {
            currency: "USDT".to_string(),
            needed: 10.0,
            available: 2.5,
        };
        assert_eq!(
            err.to_string(),
            "insufficient USDT balance: need 10.00000000, have 2.50000000"
        );
    }
}
