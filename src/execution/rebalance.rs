use crate::config::{RebalanceConfig, TradeConfig};
use crate::exchange::{Exchange, ExchangeError};

/// Result of topping up the quote balance before a possible buy
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RebalanceOutcome {
    /// Quote balance already covers the requirement
    Sufficient { quote_balance: f64, required: f64 },
    /// Base currency was sold; `affordable` is the re-check afterwards
    ToppedUp {
        sold: f64,
        quote_balance: f64,
        required: f64,
        affordable: bool,
    },
    /// Short on quote currency with no free base currency to sell
    NothingToSell { deficit: f64 },
}

/// Quote balance to hold: the next buy's cost, or the configured target when larger
pub fn required_quote_balance(trade_amount: f64, price: f64, target: Option<f64>) -> f64 {
    let buy_cost = trade_amount * price;
    target.map_or(buy_cost, |t| t.max(buy_cost))
}

/// Base units to sell to cover `deficit`, buffered and capped at what is free
pub fn base_to_sell(deficit: f64, price: f64, buffer_percent: f64, free_base: f64) -> f64 {
    if deficit <= 0.0 || price <= 0.0 {
        return 0.0;
    }
    let wanted = deficit / price * (1.0 + buffer_percent / 100.0);
    wanted.min(free_base).max(0.0)
}

/// Sell just enough base currency that the quote balance covers one buy
pub async fn ensure_quote_balance(
    exchange: &dyn Exchange,
    trade: &TradeConfig,
    settings: &RebalanceConfig,
    price: f64,
) -> Result<RebalanceOutcome, ExchangeError> {
    let required =
        required_quote_balance(trade.trade_amount, price, settings.target_quote_balance);
    let quote_balance = exchange.fetch_free_balance(&trade.quote_currency).await?;

    if quote_balance >= required {
        tracing::debug!(
            "Quote balance {:.4} {} covers required {:.4}",
            quote_balance,
            trade.quote_currency,
            required
        );
        return Ok(RebalanceOutcome::Sufficient {
            quote_balance,
            required,
        });
    }

    let deficit = required - quote_balance;
    let free_base = exchange.fetch_free_balance(&trade.base_symbol).await?;
    let amount = base_to_sell(deficit, price, settings.buffer_percent, free_base);

    tracing::warn!(
        "⚖️  {} balance {:.4} is {:.4} short of {:.4}; selling {:.8} of {:.8} free {}",
        trade.quote_currency,
        quote_balance,
        deficit,
        required,
        amount,
        free_base,
        trade.base_symbol
    );

    if amount <= 0.0 {
        return Ok(RebalanceOutcome::NothingToSell { deficit });
    }

    exchange.market_sell(&trade.pair, amount).await?;

    let quote_balance = exchange.fetch_free_balance(&trade.quote_currency).await?;
    let affordable = quote_balance >= trade.trade_amount * price;

    Ok(RebalanceOutcome::ToppedUp {
        sold: amount,
        quote_balance,
        required,
        affordable,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{MarketData, PaperExchange};
    use crate::models::Candle;
    use async_trait::async_trait;

    struct FixedPrice(f64);

    #[async_trait]
    impl MarketData for FixedPrice {
        async fn last_price(&self, _pair: &str) -> Result<f64, ExchangeError> {
            Ok(self.0)
        }

        async fn candles(
            &self,
            _pair: &str,
            _timeframe: &str,
            _limit: usize,
        ) -> Result<Vec<Candle>, ExchangeError> {
            Ok(Vec::new())
        }
    }

    fn trade() -> TradeConfig {
        TradeConfig::new("BTC/USDT", "binance", 2.0, 3.0, 1.0)
    }

    #[test]
    fn test_required_quote_balance() {
        assert_eq!(required_quote_balance(2.0, 50.0, None), 100.0);
        assert_eq!(required_quote_balance(2.0, 50.0, Some(250.0)), 250.0);
        assert_eq!(required_quote_balance(2.0, 50.0, Some(10.0)), 100.0);
    }

    #[test]
    fn test_base_to_sell() {
        // 50 short at price 100 with a 1% buffer
        assert!((base_to_sell(50.0, 100.0, 1.0, 10.0) - 0.505).abs() < 1e-12);
        assert_eq!(base_to_sell(50.0, 100.0, 1.0, 0.2), 0.2);
        assert_eq!(base_to_sell(0.0, 100.0, 1.0, 10.0), 0.0);
    }

    #[tokio::test]
    async fn test_sufficient_balance_sells_nothing() {
        let exchange = PaperExchange::new("paper", FixedPrice(100.0), 0.0)
            .with_balance("USDT", 500.0)
            .with_balance("BTC", 1.0);

        let outcome =
            ensure_quote_balance(&exchange, &trade(), &RebalanceConfig::default(), 100.0)
                .await
                .unwrap();

        assert!(matches!(outcome, RebalanceOutcome::Sufficient { .. }));
        assert_eq!(exchange.balance("BTC"), 1.0);
    }

    #[tokio::test]
    async fn test_tops_up_from_base() {
        let exchange = PaperExchange::new("paper", FixedPrice(100.0), 0.0)
            .with_balance("USDT", 40.0)
            .with_balance("BTC", 2.0);
        let settings = RebalanceConfig {
            target_quote_balance: None,
            buffer_percent: 0.5,
        };

        let outcome = ensure_quote_balance(&exchange, &trade(), &settings, 100.0)
            .await
            .unwrap();

        match outcome {
            RebalanceOutcome::ToppedUp {
                sold,
                quote_balance,
                affordable,
                ..
            } => {
                assert!((sold - 0.603).abs() < 1e-9);
                assert!(quote_balance >= 100.0);
                assert!(affordable);
            }
            other => panic!("expected ToppedUp, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_partial_top_up_is_reported_unaffordable() {
        let exchange = PaperExchange::new("paper", FixedPrice(100.0), 0.0)
            .with_balance("USDT", 10.0)
            .with_balance("BTC", 0.1);

        let outcome =
            ensure_quote_balance(&exchange, &trade(), &RebalanceConfig::default(), 100.0)
                .await
                .unwrap();

        assert!(matches!(
            outcome,
            RebalanceOutcome::ToppedUp {
                affordable: false,
                ..
            }
        ));
        assert_eq!(exchange.balance("BTC"), 0.0);
    }

    #[tokio::test]
    async fn test_nothing_to_sell() {
        let exchange = PaperExchange::new("paper", FixedPrice(100.0), 0.0).with_balance("USDT", 10.0);

        let outcome =
            ensure_quote_balance(&exchange, &trade(), &RebalanceConfig::default(), 100.0)
                .await
                .unwrap();

        assert_eq!(outcome, RebalanceOutcome::NothingToSell { deficit: 90.0 });
    }
}
