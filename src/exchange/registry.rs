use super::{Exchange, ExchangeError, MarketData, PaperExchange};
use crate::api::binance::{BinanceClient, BINANCE_API_BASE, BINANCE_US_API_BASE};
use crate::config::{PaperConfig, TradeConfig};

/// Exchange names accepted in `EXCHANGE_NAME`
pub const SUPPORTED_EXCHANGES: &[&str] = &["binance", "binanceus"];

type Constructor = fn() -> BinanceClient;

fn binance() -> BinanceClient {
    BinanceClient::with_base_url(BINANCE_API_BASE)
}

fn binance_us() -> BinanceClient {
    BinanceClient::with_base_url(BINANCE_US_API_BASE)
}

const REGISTRY: &[(&str, Constructor)] = &[("binance", binance), ("binanceus", binance_us)];

pub fn is_supported(name: &str) -> bool {
    let name = name.to_lowercase();
    SUPPORTED_EXCHANGES.contains(&name.as_str())
}

/// Build the exchange named in the trade config
///
/// Orders are paper-filled against the venue's live public prices. The
/// wallet starts from the configured balances plus the base currency still
/// held by `open_quantity` of open positions, so lots restored from the
/// ledger can be sold.
pub fn build_exchange(
    trade: &TradeConfig,
    paper: &PaperConfig,
    open_quantity: f64,
) -> Result<Box<dyn Exchange>, ExchangeError> {
    let name = trade.exchange_name.to_lowercase();
    let constructor = REGISTRY
        .iter()
        .find(|(key, _)| *key == name)
        .map(|(_, constructor)| *constructor)
        .ok_or_else(|| ExchangeError::UnknownExchange {
            name: trade.exchange_name.clone(),
            supported: SUPPORTED_EXCHANGES.join(", "),
        })?;

    let exchange = paper_exchange(name, constructor(), trade, paper, open_quantity);
    Ok(Box::new(exchange))
}

/// Paper exchange over `market` with its wallet seeded for `trade`
pub fn paper_exchange<M: MarketData>(
    name: impl Into<String>,
    market: M,
    trade: &TradeConfig,
    paper: &PaperConfig,
    open_quantity: f64,
) -> PaperExchange<M> {
    let name = name.into();
    let base_balance = paper.base_balance + open_quantity.max(0.0);

    tracing::info!(
        "🏦 Exchange '{}' ready (paper wallet: {:.4} {}, {:.8} {} incl. {:.8} held by open positions, fee {}%)",
        name,
        paper.quote_balance,
        trade.quote_currency,
        base_balance,
        trade.base_symbol,
        open_quantity,
        paper.fee_percent
    );

    PaperExchange::new(name, market, paper.fee_percent)
        .with_balance(&trade.quote_currency, paper.quote_balance)
        .with_balance(&trade.base_symbol, base_balance)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_matches_supported_list() {
        let names: Vec<&str> = REGISTRY.iter().map(|(name, _)| *name).collect();
        assert_eq!(names, SUPPORTED_EXCHANGES);
    }

    #[test]
    fn test_is_supported() {
        assert!(is_supported("binance"));
        assert!(is_supported("BinanceUS"));
        assert!(!is_supported("kraken"));
    }

    #[tokio::test]
    async fn test_build_seeds_paper_wallet() {
        let trade = TradeConfig::new("BTC/USDT", "Binance", 2.0, 3.0, 0.01);
        let paper = PaperConfig {
            quote_balance: 500.0,
            base_balance: 0.25,
            fee_percent: 0.1,
        };

        let exchange = build_exchange(&trade, &paper, 0.0).unwrap();

        assert_eq!(exchange.name(), "binance");
        assert_eq!(exchange.fetch_free_balance("USDT").await.unwrap(), 500.0);
        assert_eq!(exchange.fetch_free_balance("BTC").await.unwrap(), 0.25);
    }

    #[test]
    fn test_unknown_exchange() {
        let trade = TradeConfig::new("BTC/USDT", "kraken", 2.0, 3.0, 0.01);

        match build_exchange(&trade, &PaperConfig::default(), 0.0) {
            Err(ExchangeError::UnknownExchange { name, supported }) => {
                assert_eq!(name, "kraken");
                assert_eq!(supported, "binance, binanceus");
            }
            Err(other) => panic!("expected UnknownExchange, got {:?}", other),
            Ok(_) => panic!("expected UnknownExchange"),
        }
    }

    #[tokio::test]
    async fn test_open_positions_are_backed_by_base_balance() {
        let trade = TradeConfig::new("BTC/USDT", "binance", 2.0, 3.0, 0.5);
        let paper = PaperConfig {
            quote_balance: 100.0,
            base_balance: 0.25,
            fee_percent: 0.0,
        };

        let exchange = build_exchange(&trade, &paper, 1.5).unwrap();

        assert_eq!(exchange.fetch_free_balance("BTC").await.unwrap(), 1.75);
        assert_eq!(exchange.fetch_free_balance("USDT").await.unwrap(), 100.0);
    }
}
