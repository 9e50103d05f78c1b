// Core modules
pub mod api;
pub mod config;
pub mod exchange;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod notify;
pub mod persistence;
pub mod report;
pub mod strategy;

// Re-export commonly used types
pub use crate::config::{BotConfig, ConfigError, TradeConfig};
pub use crate::execution::{PositionLedger, ThresholdEngine};
pub use crate::models::*;
pub use crate::persistence::{LedgerLoad, LedgerStore};
pub use crate::strategy::SignalSource;

// Error handling
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
