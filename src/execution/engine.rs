use chrono::{DateTime, Utc};

use crate::config::TradeConfig;
use crate::exchange::{Exchange, ExchangeError};
use crate::execution::ledger::PositionLedger;
use crate::execution::metrics::{position_metrics, realized_profit};
use crate::execution::rebalance::{ensure_quote_balance, RebalanceOutcome};
use crate::models::Position;
use crate::notify::Notifier;
use crate::persistence::{LedgerStore, LedgerUpdate};
use crate::strategy::SignalSource;

/// Something the engine did during a cycle
#[derive(Debug, Clone, PartialEq)]
pub enum TradeAction {
    InitialBuy {
        order_id: String,
        price: f64,
        amount: f64,
    },
    AveragingBuy {
        order_id: String,
        price: f64,
        amount: f64,
    },
    Sell {
        order_id: String,
        buy_price: f64,
        sell_price: f64,
        amount: f64,
        profit: f64,
    },
    Rebalance {
        sold: f64,
    },
}

/// Outcome of one decision cycle
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CycleReport {
    /// Price the cycle decided on; `None` when it could not be fetched
    pub price: Option<f64>,
    pub actions: Vec<TradeAction>,
    /// Reason the cycle stopped early
    pub aborted: Option<String>,
}

impl CycleReport {
    pub fn sells(&self) -> usize {
        self.actions
            .iter()
            .filter(|a| matches!(a, TradeAction::Sell { .. }))
            .count()
    }

    pub fn buys(&self) -> usize {
        self.actions
            .iter()
            .filter(|a| {
                matches!(
                    a,
                    TradeAction::InitialBuy { .. } | TradeAction::AveragingBuy { .. }
                )
            })
            .count()
    }
}

/// Why a buy was placed, for logs and alerts
enum BuyReason {
    Signal(String),
    Averaging { lowest: f64 },
}

/// Threshold decision core for one pair
///
/// Owns the in-memory ledger, which stays authoritative for the process
/// lifetime. Every mutation is flushed to the store right away; store and
/// notifier failures are logged and never stop trading.
pub struct ThresholdEngine {
    config: TradeConfig,
    ledger: PositionLedger,
    store: LedgerStore,
    exchange: Box<dyn Exchange>,
    signals: Box<dyn SignalSource>,
    notifier: Box<dyn Notifier>,
}

impl ThresholdEngine {
    pub fn new(
        config: TradeConfig,
        ledger: PositionLedger,
        store: LedgerStore,
        exchange: Box<dyn Exchange>,
        signals: Box<dyn SignalSource>,
        notifier: Box<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            ledger,
            store,
            exchange,
            signals,
            notifier,
        }
    }

    pub fn ledger(&self) -> &PositionLedger {
        &self.ledger
    }

    pub fn config(&self) -> &TradeConfig {
        &self.config
    }

    pub fn exchange(&self) -> &dyn Exchange {
        self.exchange.as_ref()
    }

    /// Fetch the live price and run one cycle on it
    pub async fn run_cycle(&mut self) -> CycleReport {
        match self.exchange.fetch_last_price(&self.config.pair).await {
            Ok(price) => self.run_cycle_at(price).await,
            Err(e) => {
                let reason = format!("Error fetching price for {}: {}", self.config.pair, e);
                tracing::error!("❌ {}", reason);
                self.notify(&reason).await;
                CycleReport {
                    price: None,
                    actions: Vec::new(),
                    aborted: Some(reason),
                }
            }
        }
    }

    /// One cycle on a price snapshot: rebalance, buy, then sell
    pub async fn run_cycle_at(&mut self, current_price: f64) -> CycleReport {
        let mut report = CycleReport {
            price: Some(current_price),
            ..Default::default()
        };

        tracing::info!(
            "💹 {} price: {:.4} {} (drop {}%, rise {}%)",
            self.config.pair,
            current_price,
            self.config.quote_currency,
            self.config.drop_percent,
            self.config.rise_percent
        );
        self.log_summary(current_price, Utc::now());

        if let Some(sold) = self.rebalance(current_price).await {
            report.actions.push(TradeAction::Rebalance { sold });
        }

        if let Err(reason) = self.evaluate_buy(current_price, &mut report.actions).await {
            report.aborted = Some(reason);
            return report;
        }

        if let Err(reason) = self.evaluate_sells(current_price, &mut report.actions).await {
            report.aborted = Some(reason);
            return report;
        }

        report
    }

    /// Returns the base amount sold, if any. Never aborts the cycle.
    async fn rebalance(&mut self, current_price: f64) -> Option<f64> {
        let settings = self.config.rebalance?;

        match ensure_quote_balance(self.exchange.as_ref(), &self.config, &settings, current_price)
            .await
        {
            Ok(RebalanceOutcome::Sufficient { .. }) => None,
            Ok(RebalanceOutcome::ToppedUp {
                sold,
                quote_balance,
                affordable,
                ..
            }) => {
                let message = format!(
                    "Rebalanced: sold {:.8} {} at ~{:.4} to top up {} (balance now {:.4}).",
                    sold,
                    self.config.base_symbol,
                    current_price,
                    self.config.quote_currency,
                    quote_balance
                );
                tracing::info!("⚖️  {}", message);
                if !affordable {
                    tracing::warn!(
                        "⚠️  {} balance still below one buy of {} {}",
                        self.config.quote_currency,
                        self.config.trade_amount,
                        self.config.base_symbol
                    );
                }
                self.notify(&message).await;
                Some(sold)
            }
            Ok(RebalanceOutcome::NothingToSell { deficit }) => {
                let message = format!(
                    "Rebalance needed: {} is {:.4} short and there is no free {} to sell.",
                    self.config.quote_currency, deficit, self.config.base_symbol
                );
                tracing::warn!("⚠️  {}", message);
                self.notify(&message).await;
                None
            }
            Err(e) => {
                let message = format!("Error rebalancing {}: {}", self.config.pair, e);
                tracing::error!("❌ {}", message);
                self.notify(&message).await;
                None
            }
        }
    }

    async fn evaluate_buy(
        &mut self,
        current_price: f64,
        actions: &mut Vec<TradeAction>,
    ) -> Result<(), String> {
        if self.ledger.is_empty() {
            return self.evaluate_initial_entry(current_price, actions).await;
        }

        if let Some(max_orders) = self.config.max_orders {
            if self.ledger.len() >= max_orders {
                tracing::info!(
                    "🛑 {} open orders reached MAX_ORDERS={}, skipping averaging buy",
                    self.ledger.len(),
                    max_orders
                );
                return Ok(());
            }
        }

        let Some(lowest) = self.ledger.lowest_buy_price() else {
            return Ok(());
        };
        let next_buy = lowest * (1.0 - self.config.drop_percent / 100.0);

        if current_price > next_buy {
            tracing::info!(
                "Next buy when price drops to {:.4} {} or lower",
                next_buy,
                self.config.quote_currency
            );
            return Ok(());
        }

        let position = self
            .buy(current_price, BuyReason::Averaging { lowest })
            .await?;
        actions.push(TradeAction::AveragingBuy {
            order_id: position.id,
            price: position.buy_price,
            amount: position.amount,
        });
        tracing::info!(
            "Total orders: {}. Adding to position to reduce the average cost.",
            self.ledger.len()
        );
        Ok(())
    }

    async fn evaluate_initial_entry(
        &mut self,
        current_price: f64,
        actions: &mut Vec<TradeAction>,
    ) -> Result<(), String> {
        tracing::info!(
            "🔍 No open orders, checking {} entry signal for {}",
            self.signals.name(),
            self.config.pair
        );

        let candles = match self
            .exchange
            .fetch_candles(
                &self.config.pair,
                &self.config.candle_timeframe,
                self.config.candle_limit,
            )
            .await
        {
            Ok(candles) => candles,
            Err(e) => {
                return Err(self
                    .abort(format!("Error fetching candles for {}: {}", self.config.pair, e))
                    .await)
            }
        };

        let should_buy = match self.signals.should_buy(&candles, current_price) {
            Ok(should_buy) => should_buy,
            Err(e) => {
                tracing::warn!("⚠️  Entry signal failed: {}", e);
                false
            }
        };

        if !should_buy {
            tracing::info!("No suitable conditions for initial buy. Waiting for next signal.");
            return Ok(());
        }

        let position = self
            .buy(
                current_price,
                BuyReason::Signal(format!("{} conditions met", self.signals.name())),
            )
            .await?;
        actions.push(TradeAction::InitialBuy {
            order_id: position.id,
            price: position.buy_price,
            amount: position.amount,
        });
        Ok(())
    }

    /// Market buy of one trade amount, recorded at the snapshot price
    async fn buy(&mut self, current_price: f64, reason: BuyReason) -> Result<Position, String> {
        let amount = self.config.trade_amount;

        let confirmation = match self.exchange.market_buy(&self.config.pair, amount).await {
            Ok(confirmation) => confirmation,
            Err(e) => return Err(self.abort_on_order_error("buy", e).await),
        };

        let position = Position::from_confirmation(
            &confirmation,
            &self.config.pair,
            current_price,
            amount,
            Utc::now(),
        );
        self.ledger.open_position(position.clone());
        self.persist(LedgerUpdate::positions(self.ledger.positions()));

        let reason = match reason {
            BuyReason::Signal(why) => why,
            BuyReason::Averaging { lowest } => format!(
                "price dropped at least {}% below the lowest order price {:.4}",
                self.config.drop_percent, lowest
            ),
        };
        let message = format!(
            "Bought {} {} at {:.4} {}. Reason: {}.",
            amount, self.config.base_symbol, current_price, self.config.quote_currency, reason
        );
        tracing::info!("🟢 {} (order {})", message, position.id);
        self.notify(&message).await;

        Ok(position)
    }

    async fn evaluate_sells(
        &mut self,
        current_price: f64,
        actions: &mut Vec<TradeAction>,
    ) -> Result<(), String> {
        if self.ledger.is_empty() {
            return Ok(());
        }

        tracing::info!(
            "{} Sell threshold evaluation in {} {}",
            "=".repeat(20),
            self.config.quote_currency,
            "=".repeat(20)
        );

        // Snapshot: the ledger shrinks as positions sell
        let snapshot: Vec<Position> = self.ledger.positions().to_vec();
        let now = Utc::now();

        for position in snapshot {
            let metrics = position_metrics(&position, current_price, self.config.rise_percent, now);

            if !metrics.should_sell(current_price) {
                tracing::info!(
                    "Order ID: {} | Sell Threshold: {:.4} | Current Price: {:.4} -> Not selling.",
                    position.id,
                    metrics.sell_threshold,
                    current_price
                );
                continue;
            }

            tracing::info!(
                "Order ID: {} | Sell Threshold: {:.4} | Current Price: {:.4} -> Selling!",
                position.id,
                metrics.sell_threshold,
                current_price
            );

            if let Err(e) = self
                .exchange
                .market_sell(&self.config.pair, position.amount)
                .await
            {
                return Err(self.abort_on_order_error("sell", e).await);
            }

            let profit = realized_profit(&position, current_price);
            self.ledger.record_sale(profit);
            self.ledger.close_position(&position.id);
            self.persist(LedgerUpdate::all(&self.ledger));

            let meta = *self.ledger.meta();
            let message = format!(
                "Sale executed for order ID {}. Sold {} {} at {:.4}. Profit: {:.4} {}. Total Profit: {:.4}. Total Sales: {}.",
                position.id,
                position.amount,
                self.config.pair,
                current_price,
                profit,
                self.config.quote_currency,
                meta.total_profit,
                meta.total_sales
            );
            tracing::info!("🔴 {}", message);
            self.notify(&message).await;

            actions.push(TradeAction::Sell {
                order_id: position.id,
                buy_price: position.buy_price,
                sell_price: current_price,
                amount: position.amount,
                profit,
            });
        }

        Ok(())
    }

    async fn abort_on_order_error(&self, side: &str, error: ExchangeError) -> String {
        self.abort(format!(
            "Error placing {} order for {}: {}",
            side, self.config.pair, error
        ))
        .await
    }

    async fn abort(&self, reason: String) -> String {
        tracing::error!("❌ {} - aborting cycle", reason);
        self.notify(&reason).await;
        reason
    }

    fn persist(&self, update: LedgerUpdate<'_>) {
        if let Err(e) = self.store.save(update) {
            tracing::error!(
                "❌ Failed to save ledger to {}: {} (in-memory state kept)",
                self.store.path().display(),
                e
            );
        }
    }

    async fn notify(&self, message: &str) {
        if let Err(e) = self.notifier.send(message).await {
            tracing::warn!("⚠️  Failed to send notification: {}", e);
        }
    }

    fn log_summary(&self, current_price: f64, now: DateTime<Utc>) {
        let meta = self.ledger.meta();
        let quote = &self.config.quote_currency;

        tracing::info!("Total profit earned: {:.2} {}", meta.total_profit, quote);
        tracing::info!("Total sales completed: {}", meta.total_sales);

        if self.ledger.is_empty() {
            tracing::info!("There are no existing orders.");
            return;
        }

        if let Some(next_buy) = self.ledger.next_buy_price(self.config.drop_percent) {
            tracing::info!(
                "Next buy will occur if the price drops to {:.4} {} or lower",
                next_buy,
                quote
            );
        }

        tracing::info!("{} Existing orders in {} {}", "=".repeat(20), quote, "=".repeat(20));
        tracing::info!(
            "{:<36} {:<12} {:<12} {:<12} {:<10} {:<12}",
            "Order ID",
            "Amount",
            "Bought At",
            "Sell At",
            "Days Open",
            "To Sell"
        );
        for position in self.ledger.positions() {
            let metrics = position_metrics(position, current_price, self.config.rise_percent, now);
            tracing::info!(
                "{:<36} {:<12.6} {:<12.4} {:<12.4} {:<10} {:<12.4}",
                position.id,
                position.amount,
                position.buy_price,
                metrics.sell_threshold,
                metrics.days_open,
                metrics.distance_to_sell
            );
        }

        if let Some(average) = self.ledger.weighted_average_buy_price() {
            tracing::info!(
                "Total quantity: {:.6} {}, Average Buy: {:.4} {}",
                self.ledger.total_open_quantity(),
                self.config.base_symbol,
                average,
                quote
            );
        }
    }
}
