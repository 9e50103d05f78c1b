// Technical indicators used by the entry signal

pub mod moving_average;
pub mod rsi;
pub mod support;

pub use moving_average::{calculate_ema, rolling_max};
pub use rsi::calculate_rsi;
pub use support::{find_support_levels, near_support_level, price_drop_percent};
