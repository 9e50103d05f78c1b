// Entry signals for the first buy on an empty ledger
pub mod downtrend;

pub use downtrend::{DowntrendSupportConfig, DowntrendSupportSignal};

use crate::models::Candle;
use crate::Result;

/// Decides whether to open the first position
pub trait SignalSource: Send + Sync {
    /// `candles` are oldest first; `current_price` is the live ticker price
    fn should_buy(&self, candles: &[Candle], current_price: f64) -> Result<bool>;

    fn name(&self) -> &str;

    /// Fewer candles than this never produce a buy
    fn min_candles_required(&self) -> usize;
}
