use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use super::{split_pair, Exchange, ExchangeError, MarketData};
use crate::models::{Candle, OrderConfirmation, ORDER_DATETIME_FORMAT};

/// Paper-trading exchange: real market data, simulated fills and balances
///
/// Market orders fill at the last traded price, paying `fee_percent` of the
/// notional in quote currency. Balances live in memory only.
pub struct PaperExchange<M> {
    name: String,
    market: M,
    fee_rate: f64,
    wallet: Mutex<HashMap<String, f64>>,
}

impl<M: MarketData> PaperExchange<M> {
    pub fn new(name: impl Into<String>, market: M, fee_percent: f64) -> Self {
        Self {
            name: name.into(),
            market,
            fee_rate: fee_percent / 100.0,
            wallet: Mutex::new(HashMap::new()),
        }
    }

    /// Seed a starting balance
    pub fn with_balance(self, currency: &str, amount: f64) -> Self {
        self.lock_wallet().insert(currency.to_string(), amount);
        self
    }

    pub fn balance(&self, currency: &str) -> f64 {
        self.lock_wallet().get(currency).copied().unwrap_or(0.0)
    }

    fn lock_wallet(&self) -> std::sync::MutexGuard<'_, HashMap<String, f64>> {
        self.wallet.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn confirmation(&self, price: f64, amount: f64) -> OrderConfirmation {
        let now = Utc::now();
        OrderConfirmation {
            id: Uuid::new_v4().to_string(),
            datetime: Some(now.format(ORDER_DATETIME_FORMAT).to_string()),
            timestamp: Some(now.timestamp_millis()),
            price: Some(price),
            amount,
        }
    }
}

fn check_amount(amount: f64) -> Result<(), ExchangeError> {
    if amount.is_finite() && amount > 0.0 {
        Ok(())
    } else {
        Err(ExchangeError::InvalidOrder(format!(
            "amount must be positive, got {}",
            amount
        )))
    }
}

#[async_trait]
impl<M: MarketData> Exchange for PaperExchange<M> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_last_price(&self, pair: &str) -> Result<f64, ExchangeError> {
        self.market.last_price(pair).await
    }

    async fn fetch_candles(
        &self,
        pair: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError> {
        self.market.candles(pair, timeframe, limit).await
    }

    async fn market_buy(&self, pair: &str, amount: f64) -> Result<OrderConfirmation, ExchangeError> {
        check_amount(amount)?;
        let (base, quote) = split_pair(pair)?;
        let price = self.market.last_price(pair).await?;

        let cost = amount * price * (1.0 + self.fee_rate);
        {
            let mut wallet = self.lock_wallet();
            let available = wallet.get(quote).copied().unwrap_or(0.0);
            if available < cost {
                return Err(ExchangeError::InsufficientBalance {
                    currency: quote.to_string(),
                    needed: cost,
                    available,
                });
            }
            wallet.insert(quote.to_string(), available - cost);
            *wallet.entry(base.to_string()).or_insert(0.0) += amount;
        }

        tracing::info!(
            "📝 [{}] Paper BUY {:.8} {} @ {:.4} (cost {:.4} {})",
            self.name,
            amount,
            base,
            price,
            cost,
            quote
        );

        Ok(self.confirmation(price, amount))
    }

    async fn market_sell(&self, pair: &str, amount: f64) -> Result<OrderConfirmation, ExchangeError> {
        check_amount(amount)?;
        let (base, quote) = split_pair(pair)?;
        let price = self.market.last_price(pair).await?;

        let proceeds = amount * price * (1.0 - self.fee_rate);
        {
            let mut wallet = self.lock_wallet();
            let available = wallet.get(base).copied().unwrap_or(0.0);
            if available < amount {
                return Err(ExchangeError::InsufficientBalance {
                    currency: base.to_string(),
                    needed: amount,
                    available,
                });
            }
            wallet.insert(base.to_string(), available - amount);
            *wallet.entry(quote.to_string()).or_insert(0.0) += proceeds;
        }

        tracing::info!(
            "📝 [{}] Paper SELL {:.8} {} @ {:.4} (proceeds {:.4} {})",
            self.name,
            amount,
            base,
            price,
            proceeds,
            quote
        );

        Ok(self.confirmation(price, amount))
    }

    async fn fetch_free_balance(&self, currency: &str) -> Result<f64, ExchangeError> {
        Ok(self.balance(currency))
    }
}
