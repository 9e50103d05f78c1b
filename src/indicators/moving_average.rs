/// Exponential moving average over the whole series, latest value
///
/// Seeded with the first price and smoothed with `alpha = 2 / (period + 1)`,
/// so every price contributes. `None` when there are fewer than `period` prices.
pub fn calculate_ema(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let alpha = 2.0 / (period as f64 + 1.0);
    let (first, rest) = prices.split_first()?;

    Some(rest.iter().fold(*first, |ema, price| ema + alpha * (price - ema)))
}

/// Highest of the last `window` values
pub fn rolling_max(values: &[f64], window: usize) -> Option<f64> {
    if window == 0 || values.len() < window {
        return None;
    }

    values[values.len() - window..]
        .iter()
        .copied()
        .fold(None, |max: Option<f64>, v| Some(max.map_or(v, |m| m.max(v))))
}
