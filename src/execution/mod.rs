// Position bookkeeping and the trading cycle
pub mod engine;
pub mod ledger;
pub mod metrics;
pub mod rebalance;
pub mod scheduler;

pub use engine::{CycleReport, ThresholdEngine, TradeAction};
pub use ledger::PositionLedger;
pub use metrics::{position_metrics, realized_profit, PositionMetrics};
pub use rebalance::{ensure_quote_balance, RebalanceOutcome};
pub use scheduler::{InstanceLock, Scheduler};
