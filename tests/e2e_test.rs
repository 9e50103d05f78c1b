use async_trait::async_trait;
use dcabot::config::PaperConfig;
use dcabot::exchange::{paper_exchange, Exchange, ExchangeError, MarketData};
use dcabot::execution::{PositionLedger, ThresholdEngine, TradeAction};
use dcabot::notify::{Notifier, NotifyError};
use dcabot::persistence::{LedgerLoad, LedgerStore, LedgerUpdate};
use dcabot::*;
use std::sync::{Arc, Mutex};

/// Market data whose price the test moves by hand
#[derive(Clone)]
struct ScriptedMarket(Arc<Mutex<f64>>);

impl ScriptedMarket {
    fn set(&self, price: f64) {
        *self.0.lock().unwrap() = price;
    }
}

#[async_trait]
impl MarketData for ScriptedMarket {
    async fn last_price(&self, _pair: &str) -> std::result::Result<f64, ExchangeError> {
        Ok(*self.0.lock().unwrap())
    }

    async fn candles(
        &self,
        _pair: &str,
        _timeframe: &str,
        _limit: usize,
    ) -> std::result::Result<Vec<Candle>, ExchangeError> {
        Ok(Vec::new())
    }
}

struct AlwaysBuy;

impl SignalSource for AlwaysBuy {
    fn should_buy(&self, _candles: &[Candle], _current_price: f64) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "always"
    }

    fn min_candles_required(&self) -> usize {
        0
    }
}

#[derive(Clone, Default)]
struct Inbox(Arc<Mutex<Vec<String>>>);

#[async_trait]
impl Notifier for Inbox {
    async fn send(&self, message: &str) -> std::result::Result<(), NotifyError> {
        self.0.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

fn trade_config() -> TradeConfig {
    TradeConfig::new("BTC/USDT", "binance", 2.0, 3.0, 1.0)
}

fn wallet(quote_balance: f64) -> PaperConfig {
    PaperConfig {
        quote_balance,
        base_balance: 0.0,
        fee_percent: 0.0,
    }
}

/// Start the bot the way `dcabot run` does: ledger from disk, wallet backing its open lots
fn engine(
    store: &LedgerStore,
    market: &ScriptedMarket,
    inbox: &Inbox,
    paper: &PaperConfig,
) -> ThresholdEngine {
    let trade = trade_config();
    let ledger = store.load_or_default();
    let exchange = paper_exchange(
        "paper",
        market.clone(),
        &trade,
        paper,
        ledger.total_open_quantity(),
    );

    ThresholdEngine::new(
        trade,
        ledger,
        store.clone(),
        Box::new(exchange),
        Box::new(AlwaysBuy),
        Box::new(inbox.clone()),
    )
}

#[tokio::test]
async fn test_e2e_buy_average_sell_restart() {
    let _ = tracing_subscriber::fmt::try_init();

    println!("=== Starting E2E Test ===\n");

    let dir = tempfile::tempdir().unwrap();
    let store = LedgerStore::new(dir.path().join("orders.json"));
    let market = ScriptedMarket(Arc::new(Mutex::new(100.0)));
    let inbox = Inbox::default();

    // 1. Initial entry on an empty ledger
    println!("1. Initial entry...");
    let mut bot = engine(&store, &market, &inbox, &wallet(10_000.0));
    let report = bot.run_cycle().await;
    assert!(matches!(
        &report.actions[..],
        [TradeAction::InitialBuy { price, .. }] if *price == 100.0
    ));
    println!("   ✓ Bought at 100");

    // 2. Averaging down once the price is 2% under the lowest buy
    println!("\n2. Averaging down...");
    market.set(98.5);
    assert!(bot.run_cycle().await.actions.is_empty());
    market.set(97.0);
    let report = bot.run_cycle().await;
    assert_eq!(report.buys(), 1);
    assert_eq!(bot.ledger().len(), 2);
    assert_eq!(bot.ledger().weighted_average_buy_price(), Some(98.5));
    println!("   ✓ Bought at 97, average 98.5");

    // 3. The cheaper lot sells first once price clears 97 * 1.03
    println!("\n3. Partial take-profit...");
    market.set(100.0);
    let report = bot.run_cycle().await;
    assert_eq!(report.sells(), 1);
    assert_eq!(bot.ledger().len(), 1);
    assert_eq!(bot.ledger().positions()[0].buy_price, 100.0);
    println!("   ✓ Sold the 97 lot");

    // 4. Restart: everything comes back from disk, the wallet starts fresh
    println!("\n4. Restart...");
    drop(bot);
    let mut bot = engine(&store, &market, &inbox, &wallet(10_000.0));
    assert_eq!(bot.ledger().len(), 1);
    assert_eq!(bot.exchange().fetch_free_balance("BTC").await.unwrap(), 1.0);
    assert_eq!(bot.ledger().meta().total_sales, 1);
    assert!((bot.ledger().meta().total_profit - 3.0).abs() < 1e-9);
    println!("   ✓ Ledger restored");

    // 5. The remaining lot sells at its own threshold
    println!("\n5. Final take-profit...");
    market.set(103.0);
    let report = bot.run_cycle().await;
    assert_eq!(report.sells(), 1);
    assert!(bot.ledger().is_empty());

    let saved = match store.load() {
        LedgerLoad::Loaded(ledger) => ledger,
        other => panic!("expected saved ledger, got {:?}", other),
    };
    assert!(saved.is_empty());
    assert_eq!(saved.meta().total_sales, 2);
    assert!((saved.meta().total_profit - 6.0).abs() < 1e-9);
    println!("   ✓ Profit 6.0 over 2 sales");

    let messages = inbox.0.lock().unwrap();
    assert_eq!(messages.iter().filter(|m| m.starts_with("Bought")).count(), 2);
    assert_eq!(messages.iter().filter(|m| m.starts_with("Sale executed")).count(), 2);

    println!("\n=== E2E Test Complete ===");
}

#[tokio::test]
async fn test_e2e_exchange_failure_keeps_durable_state() {
    let dir = tempfile::tempdir().unwrap();
    let store = LedgerStore::new(dir.path().join("orders.json"));
    let market = ScriptedMarket(Arc::new(Mutex::new(100.0)));
    let inbox = Inbox::default();

    // Wallet too small for a second buy
    let mut bot = engine(&store, &market, &inbox, &wallet(150.0));
    bot.run_cycle().await;
    assert_eq!(bot.ledger().len(), 1);

    market.set(90.0);
    let report = bot.run_cycle().await;

    assert!(report.aborted.is_some());
    assert_eq!(bot.ledger().len(), 1);
    assert!(matches!(store.load(), LedgerLoad::Loaded(ref l) if l.len() == 1));
    assert!(inbox
        .0
        .lock()
        .unwrap()
        .iter()
        .any(|m| m.contains("insufficient USDT balance")));
}

#[test]
fn test_same_price_positions_survive_a_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = LedgerStore::new(dir.path().join("orders.json"));
    let now = chrono::Utc::now();

    let mut ledger = PositionLedger::new();
    for id in ["order-1", "order-2"] {
        let confirmation = OrderConfirmation {
            id: id.to_string(),
            datetime: None,
            timestamp: None,
            price: None,
            amount: 0.5,
        };
        ledger.open_position(Position::from_confirmation(
            &confirmation,
            "BTC/USDT",
            100.0,
            0.5,
            now,
        ));
    }
    store.save(LedgerUpdate::positions(ledger.positions())).unwrap();

    match store.load() {
        LedgerLoad::Loaded(loaded) => {
            assert_eq!(loaded.len(), 2);
            assert_eq!(loaded.total_open_quantity(), 1.0);
        }
        other => panic!("expected saved ledger, got {:?}", other),
    }
}

#[tokio::test]
#[ignore] // Requires live Binance API
async fn test_live_paper_exchange_price() {
    let exchange =
        dcabot::exchange::build_exchange(&trade_config(), &PaperConfig::default(), 0.0).unwrap();

    let price = exchange.fetch_last_price("BTC/USDT").await.unwrap();
    let candles = exchange.fetch_candles("BTC/USDT", "1h", 30).await.unwrap();

    assert!(price > 0.0);
    assert_eq!(candles.len(), 30);
}
