//! Bot configuration
//!
//! Loaded once at startup from a JSON file (top-level credentials plus a
//! `TRADE_CONFIG` object), overlaid with `DCA_`-prefixed environment
//! variables. Nested keys use `__`, e.g. `DCA_TRADE_CONFIG__TRADE_AMOUNT=25`.
//! The resulting [`BotConfig`] is immutable and validated.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::exchange::{is_supported, SUPPORTED_EXCHANGES};

pub const DEFAULT_CONFIG_FILE: &str = "config.json";
pub const DEFAULT_ORDERS_FILE: &str = "orders.json";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_CANDLE_TIMEFRAME: &str = "1h";
pub const DEFAULT_CANDLE_LIMIT: usize = 100;
pub const DEFAULT_SUPPORT_TOLERANCE: f64 = 50.0;
pub const DEFAULT_REBALANCE_BUFFER_PERCENT: f64 = 0.5;
pub const DEFAULT_PAPER_QUOTE_BALANCE: f64 = 1000.0;
pub const DEFAULT_PAPER_FEE_PERCENT: f64 = 0.1;

const ENV_PREFIX: &str = "DCA";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required configuration: {}", .0.join(", "))]
    Missing(Vec<String>),

    #[error("invalid configuration value for {key}: {reason}")]
    Invalid { key: String, reason: String },

    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

impl ConfigError {
    fn invalid(key: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

/// Trading parameters, fixed for the process lifetime
#[derive(Debug, Clone, PartialEq)]
pub struct TradeConfig {
    /// Market in `BASE/QUOTE` form, e.g. `BTC/USDT`
    pub pair: String,
    /// Base currency bought and sold (`CRYPTO_SYMBOL`)
    pub base_symbol: String,
    /// Quote currency spent (`CRYPTO_CURRENCY`)
    pub quote_currency: String,
    pub exchange_name: String,
    /// Percentage below the lowest open buy that triggers another buy
    pub drop_percent: f64,
    /// Percentage above a position's buy price that triggers its sale
    pub rise_percent: f64,
    /// Base-currency quantity per buy
    pub trade_amount: f64,
    /// Cap on concurrently open positions; `None` means unbounded
    pub max_orders: Option<usize>,
    pub rebalance: Option<RebalanceConfig>,
    pub candle_timeframe: String,
    pub candle_limit: usize,
    /// Absolute price distance that counts as "near" a support level
    pub support_tolerance: f64,
}

impl TradeConfig {
    /// Trade settings with every optional knob at its default
    pub fn new(
        pair: impl Into<String>,
        exchange_name: impl Into<String>,
        drop_percent: f64,
        rise_percent: f64,
        trade_amount: f64,
    ) -> Self {
        let pair = pair.into();
        let (base, quote) = pair.split_once('/').unwrap_or((pair.as_str(), ""));
        let (base_symbol, quote_currency) = (base.to_string(), quote.to_string());

        Self {
            pair,
            base_symbol,
            quote_currency,
            exchange_name: exchange_name.into(),
            drop_percent,
            rise_percent,
            trade_amount,
            max_orders: None,
            rebalance: None,
            candle_timeframe: DEFAULT_CANDLE_TIMEFRAME.to_string(),
            candle_limit: DEFAULT_CANDLE_LIMIT,
            support_tolerance: DEFAULT_SUPPORT_TOLERANCE,
        }
    }

    pub fn with_max_orders(mut self, max_orders: usize) -> Self {
        self.max_orders = Some(max_orders);
        self
    }

    pub fn with_rebalance(mut self, rebalance: RebalanceConfig) -> Self {
        self.rebalance = Some(rebalance);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.pair.contains('/') {
            return Err(ConfigError::invalid("PAIR", "expected BASE/QUOTE, e.g. BTC/USDT"));
        }
        if !(self.drop_percent > 0.0 && self.drop_percent < 100.0) {
            return Err(ConfigError::invalid(
                "PERCENTAGE_DROP",
                format!("must be between 0 and 100, got {}", self.drop_percent),
            ));
        }
        if !(self.rise_percent > 0.0 && self.rise_percent.is_finite()) {
            return Err(ConfigError::invalid(
                "PERCENTAGE_RISE",
                format!("must be positive, got {}", self.rise_percent),
            ));
        }
        if !(self.trade_amount > 0.0 && self.trade_amount.is_finite()) {
            return Err(ConfigError::invalid(
                "TRADE_AMOUNT",
                format!("must be positive, got {}", self.trade_amount),
            ));
        }
        if self.max_orders == Some(0) {
            return Err(ConfigError::invalid("MAX_ORDERS", "must be at least 1"));
        }
        if self.candle_limit == 0 {
            return Err(ConfigError::invalid("CANDLE_LIMIT", "must be at least 1"));
        }
        if self.support_tolerance < 0.0 {
            return Err(ConfigError::invalid("SUPPORT_TOLERANCE", "must not be negative"));
        }
        if let Some(rebalance) = &self.rebalance {
            if rebalance.buffer_percent < 0.0 {
                return Err(ConfigError::invalid(
                    "REBALANCE_BUFFER_PERCENT",
                    "must not be negative",
                ));
            }
            if matches!(rebalance.target_quote_balance, Some(t) if t < 0.0) {
                return Err(ConfigError::invalid("REBALANCE_TARGET", "must not be negative"));
            }
        }
        if !is_supported(&self.exchange_name) {
            return Err(ConfigError::invalid(
                "EXCHANGE_NAME",
                format!(
                    "'{}' is not supported (supported: {})",
                    self.exchange_name,
                    SUPPORTED_EXCHANGES.join(", ")
                ),
            ));
        }
        Ok(())
    }
}

/// Sell base currency ahead of a buy when the quote balance is short
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RebalanceConfig {
    /// Minimum quote balance to keep; the next buy's cost is used when larger
    pub target_quote_balance: Option<f64>,
    /// Extra percentage sold on top of the deficit to absorb price moves and fees
    pub buffer_percent: f64,
}

impl Default for RebalanceConfig {
    fn default() -> Self {
        Self {
            target_quote_balance: None,
            buffer_percent: DEFAULT_REBALANCE_BUFFER_PERCENT,
        }
    }
}

/// Starting wallet of the paper exchange
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaperConfig {
    pub quote_balance: f64,
    pub base_balance: f64,
    pub fee_percent: f64,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            quote_balance: DEFAULT_PAPER_QUOTE_BALANCE,
            base_balance: 0.0,
            fee_percent: DEFAULT_PAPER_FEE_PERCENT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushoverConfig {
    pub token: String,
    pub user: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailConfig {
    pub api_key: String,
    pub sender: String,
    pub recipient: String,
}

/// Enabled notification channels; both `None` means log-only
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationConfig {
    pub pushover: Option<PushoverConfig>,
    pub email: Option<EmailConfig>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BotConfig {
    pub trade: TradeConfig,
    pub paper: PaperConfig,
    pub notifications: NotificationConfig,
    /// Exchange credentials, carried for authenticated deployments
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub poll_interval: Duration,
    pub orders_file: PathBuf,
}

impl BotConfig {
    /// Load from a JSON file plus `DCA_*` environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let builder = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Json))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = Self::from_builder(builder)?;
        tracing::info!(
            "⚙️  Loaded config from {} ({} on {})",
            path.display(),
            config.trade.pair,
            config.trade.exchange_name
        );
        Ok(config)
    }

    /// Parse a JSON document, without environment overrides
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::from_str(json, config::FileFormat::Json));
        Self::from_builder(builder)
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, ConfigError> {
        let raw: RawConfig = builder.build()?.try_deserialize()?;
        raw.into_config()
    }
}

// Raw file shape. Every key is optional here so missing ones can be reported together.

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default, alias = "API_KEY")]
    api_key: Option<String>,
    #[serde(default, alias = "API_SECRET")]
    api_secret: Option<String>,
    #[serde(default, alias = "SENDGRID_API_KEY")]
    sendgrid_api_key: Option<String>,
    #[serde(default, alias = "PUSHOVER_TOKEN")]
    pushover_token: Option<String>,
    #[serde(default, alias = "PUSHOVER_USER")]
    pushover_user: Option<String>,
    #[serde(default, alias = "EMAIL_SENDER")]
    email_sender: Option<String>,
    #[serde(default, alias = "EMAIL_RECIPIENT")]
    email_recipient: Option<String>,
    #[serde(default, alias = "ENABLE_PUSH_NOTIFICATIONS")]
    enable_push_notifications: Option<bool>,
    #[serde(default, alias = "ENABLE_EMAIL_NOTIFICATIONS")]
    enable_email_notifications: Option<bool>,
    #[serde(default, alias = "POLL_INTERVAL_SECS")]
    poll_interval_secs: Option<u64>,
    #[serde(default, alias = "ORDERS_FILE")]
    orders_file: Option<String>,
    #[serde(default, alias = "PAPER_QUOTE_BALANCE")]
    paper_quote_balance: Option<f64>,
    #[serde(default, alias = "PAPER_BASE_BALANCE")]
    paper_base_balance: Option<f64>,
    #[serde(default, alias = "PAPER_FEE_PERCENT")]
    paper_fee_percent: Option<f64>,
    #[serde(default, alias = "TRADE_CONFIG")]
    trade_config: Option<RawTradeConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct RawTradeConfig {
    #[serde(default, alias = "PAIR")]
    pair: Option<String>,
    #[serde(default, alias = "CRYPTO_SYMBOL")]
    crypto_symbol: Option<String>,
    #[serde(default, alias = "CRYPTO_CURRENCY")]
    crypto_currency: Option<String>,
    #[serde(default, alias = "EXCHANGE_NAME")]
    exchange_name: Option<String>,
    #[serde(default, alias = "PERCENTAGE_DROP")]
    percentage_drop: Option<f64>,
    #[serde(default, alias = "PERCENTAGE_RISE")]
    percentage_rise: Option<f64>,
    #[serde(default, alias = "TRADE_AMOUNT")]
    trade_amount: Option<f64>,
    #[serde(default, alias = "MAX_ORDERS")]
    max_orders: Option<usize>,
    #[serde(default, alias = "ENABLE_REBALANCE")]
    enable_rebalance: Option<bool>,
    #[serde(default, alias = "REBALANCE_TARGET")]
    rebalance_target: Option<f64>,
    #[serde(default, alias = "REBALANCE_BUFFER_PERCENT")]
    rebalance_buffer_percent: Option<f64>,
    #[serde(default, alias = "CANDLE_TIMEFRAME")]
    candle_timeframe: Option<String>,
    #[serde(default, alias = "CANDLE_LIMIT")]
    candle_limit: Option<usize>,
    #[serde(default, alias = "SUPPORT_TOLERANCE")]
    support_tolerance: Option<f64>,
}

/// Treat blank strings like absent ones
fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl RawConfig {
    fn into_config(self) -> Result<BotConfig, ConfigError> {
        let trade = self.trade_config.unwrap_or_default().into_trade_config()?;

        let mut missing = Vec::new();

        let pushover = if self.enable_push_notifications.unwrap_or(false) {
            let token = present(self.pushover_token);
            let user = present(self.pushover_user);
            if token.is_none() {
                missing.push("PUSHOVER_TOKEN".to_string());
            }
            if user.is_none() {
                missing.push("PUSHOVER_USER".to_string());
            }
            token.zip(user).map(|(token, user)| PushoverConfig { token, user })
        } else {
            None
        };

        let email = if self.enable_email_notifications.unwrap_or(false) {
            let api_key = present(self.sendgrid_api_key);
            let sender = present(self.email_sender);
            let recipient = present(self.email_recipient);
            for (key, value) in [
                ("SENDGRID_API_KEY", &api_key),
                ("EMAIL_SENDER", &sender),
                ("EMAIL_RECIPIENT", &recipient),
            ] {
                if value.is_none() {
                    missing.push(key.to_string());
                }
            }
            match (api_key, sender, recipient) {
                (Some(api_key), Some(sender), Some(recipient)) => Some(EmailConfig {
                    api_key,
                    sender,
                    recipient,
                }),
                _ => None,
            }
        } else {
            None
        };

        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let poll_interval_secs = self.poll_interval_secs.unwrap_or(DEFAULT_POLL_INTERVAL_SECS);
        if poll_interval_secs == 0 {
            return Err(ConfigError::invalid("POLL_INTERVAL_SECS", "must be at least 1"));
        }

        let paper = PaperConfig {
            quote_balance: self.paper_quote_balance.unwrap_or(DEFAULT_PAPER_QUOTE_BALANCE),
            base_balance: self.paper_base_balance.unwrap_or(0.0),
            fee_percent: self.paper_fee_percent.unwrap_or(DEFAULT_PAPER_FEE_PERCENT),
        };
        if paper.quote_balance < 0.0 || paper.base_balance < 0.0 {
            return Err(ConfigError::invalid("PAPER_QUOTE_BALANCE", "balances must not be negative"));
        }
        if !(0.0..100.0).contains(&paper.fee_percent) {
            return Err(ConfigError::invalid("PAPER_FEE_PERCENT", "must be in [0, 100)"));
        }

        Ok(BotConfig {
            trade,
            paper,
            notifications: NotificationConfig { pushover, email },
            api_key: present(self.api_key),
            api_secret: present(self.api_secret),
            poll_interval: Duration::from_secs(poll_interval_secs),
            orders_file: PathBuf::from(
                present(self.orders_file).unwrap_or_else(|| DEFAULT_ORDERS_FILE.to_string()),
            ),
        })
    }
}

impl RawTradeConfig {
    fn into_trade_config(self) -> Result<TradeConfig, ConfigError> {
        let pair = present(self.pair);
        let base_symbol = present(self.crypto_symbol);
        let quote_currency = present(self.crypto_currency);
        let exchange_name = present(self.exchange_name);

        let mut missing = Vec::new();
        for (key, absent) in [
            ("PAIR", pair.is_none()),
            ("CRYPTO_SYMBOL", base_symbol.is_none()),
            ("CRYPTO_CURRENCY", quote_currency.is_none()),
            ("EXCHANGE_NAME", exchange_name.is_none()),
            ("PERCENTAGE_DROP", self.percentage_drop.is_none()),
            ("PERCENTAGE_RISE", self.percentage_rise.is_none()),
            ("TRADE_AMOUNT", self.trade_amount.is_none()),
        ] {
            if absent {
                missing.push(key.to_string());
            }
        }

        let (
            Some(pair),
            Some(base_symbol),
            Some(quote_currency),
            Some(exchange_name),
            Some(drop_percent),
            Some(rise_percent),
            Some(trade_amount),
        ) = (
            pair,
            base_symbol,
            quote_currency,
            exchange_name,
            self.percentage_drop,
            self.percentage_rise,
            self.trade_amount,
        )
        else {
            return Err(ConfigError::Missing(missing));
        };

        let rebalance = self.enable_rebalance.unwrap_or(false).then(|| RebalanceConfig {
            target_quote_balance: self.rebalance_target,
            buffer_percent: self
                .rebalance_buffer_percent
                .unwrap_or(DEFAULT_REBALANCE_BUFFER_PERCENT),
        });

        let trade = TradeConfig {
            pair,
            base_symbol,
            quote_currency,
            exchange_name: exchange_name.to_lowercase(),
            drop_percent,
            rise_percent,
            trade_amount,
            max_orders: self.max_orders,
            rebalance,
            candle_timeframe: present(self.candle_timeframe)
                .unwrap_or_else(|| DEFAULT_CANDLE_TIMEFRAME.to_string()),
            candle_limit: self.candle_limit.unwrap_or(DEFAULT_CANDLE_LIMIT),
            support_tolerance: self.support_tolerance.unwrap_or(DEFAULT_SUPPORT_TOLERANCE),
        };

        trade.validate()?;
        Ok(trade)
    }
}
