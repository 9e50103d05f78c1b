use crate::indicators::{
    calculate_ema, calculate_rsi, find_support_levels, near_support_level, price_drop_percent,
    rolling_max,
};
use crate::models::Candle;
use crate::strategy::SignalSource;
use crate::Result;

/// Buy-the-dip entry signal
///
/// Fires when BOTH hold:
/// - price has dropped at least `drop_percent` from the highest close of the
///   last `high_lookback` candles
/// - price is within `support_tolerance` of a support level found in the lows
///
/// EMA and RSI are computed for the log only.
#[derive(Debug, Clone)]
pub struct DowntrendSupportSignal {
    config: DowntrendSupportConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DowntrendSupportConfig {
    /// Minimum drop from the recent high, in percent
    pub drop_percent: f64,

    /// Absolute distance to a support level that still counts as "near"
    pub support_tolerance: f64,

    /// Local minima per support-level window
    pub support_window: usize,

    /// Candles the recent high is taken over
    pub high_lookback: usize,

    pub ema_fast: usize,
    pub ema_slow: usize,
    pub rsi_period: usize,
}

impl DowntrendSupportConfig {
    pub fn new(drop_percent: f64, support_tolerance: f64) -> Self {
        Self {
            drop_percent,
            support_tolerance,
            support_window: 5,
            high_lookback: 20,
            ema_fast: 9,
            ema_slow: 21,
            rsi_period: 14,
        }
    }
}

impl DowntrendSupportSignal {
    pub fn new(drop_percent: f64, support_tolerance: f64) -> Self {
        Self::with_config(DowntrendSupportConfig::new(drop_percent, support_tolerance))
    }

    pub fn with_config(config: DowntrendSupportConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DowntrendSupportConfig {
        &self.config
    }

    fn log_trend(&self, closes: &[f64]) {
        let fmt = |v: Option<f64>| v.map_or_else(|| "n/a".to_string(), |v| format!("{:.4}", v));

        tracing::info!(
            "📈 EMA{}: {} | EMA{}: {} | RSI{}: {}",
            self.config.ema_fast,
            fmt(calculate_ema(closes, self.config.ema_fast)),
            self.config.ema_slow,
            fmt(calculate_ema(closes, self.config.ema_slow)),
            self.config.rsi_period,
            fmt(calculate_rsi(closes, self.config.rsi_period)),
        );
    }
}

impl SignalSource for DowntrendSupportSignal {
    fn should_buy(&self, candles: &[Candle], current_price: f64) -> Result<bool> {
        if candles.is_empty() {
            return Err("No candles provided".into());
        }

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let lows: Vec<f64> = candles.iter().map(|c| c.low).collect();

        self.log_trend(&closes);

        let Some(recent_high) = rolling_max(&closes, self.config.high_lookback) else {
            tracing::info!(
                "⏳ Only {} candles, need {} for the recent high; no entry",
                candles.len(),
                self.config.high_lookback
            );
            return Ok(false);
        };

        let Some(drop) = price_drop_percent(current_price, recent_high) else {
            tracing::warn!("⚠️  Recent high is {}, cannot measure the drop", recent_high);
            return Ok(false);
        };

        let meets_drop = drop >= self.config.drop_percent;
        tracing::info!(
            "Price {:.4} is {:.2}% below recent high {:.4} (threshold {}%): {}",
            current_price,
            drop,
            recent_high,
            self.config.drop_percent,
            if meets_drop { "met" } else { "not met" }
        );

        let levels = find_support_levels(&lows, self.config.support_window);
        tracing::info!("Support levels: {:?}", levels);

        let support = near_support_level(current_price, &levels, self.config.support_tolerance);
        match support {
            Some(level) => tracing::info!(
                "Price {:.4} is within {} of support {:.4}",
                current_price,
                self.config.support_tolerance,
                level
            ),
            None => tracing::info!(
                "Price {:.4} is not within {} of any support level",
                current_price,
                self.config.support_tolerance
            ),
        }

        Ok(meets_drop && support.is_some())
    }

    fn name(&self) -> &str {
        "Downtrend+Support"
    }

    fn min_candles_required(&self) -> usize {
        self.config.high_lookback
    }
}
