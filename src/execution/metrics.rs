use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::Position;

/// Derived, read-only figures for one open position at a given price
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PositionMetrics {
    pub sell_threshold: f64,
    pub days_open: i64,
    /// How far the price still has to rise before the position sells (negative once past it)
    pub distance_to_sell: f64,
}

impl PositionMetrics {
    pub fn should_sell(&self, current_price: f64) -> bool {
        current_price >= self.sell_threshold
    }
}

pub fn position_metrics(
    position: &Position,
    current_price: f64,
    rise_percent: f64,
    now: DateTime<Utc>,
) -> PositionMetrics {
    let sell_threshold = position.sell_threshold(rise_percent);

    PositionMetrics {
        sell_threshold,
        days_open: position.days_open(now),
        distance_to_sell: sell_threshold - current_price,
    }
}

/// Realized profit of selling `position` in full at `sell_price`
pub fn realized_profit(position: &Position, sell_price: f64) -> f64 {
    (sell_price - position.buy_price) * position.amount
}
