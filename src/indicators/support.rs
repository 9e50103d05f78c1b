/// Support levels from a series of lows
///
/// A local minimum is a low strictly below both neighbours. Levels are the
/// rolling minimum over each run of `window` consecutive local minima,
/// returned ascending without duplicates. Fewer than `window` minima gives none.
pub fn find_support_levels(lows: &[f64], window: usize) -> Vec<f64> {
    let minima: Vec<f64> = lows
        .windows(3)
        .filter(|w| w[0] > w[1] && w[2] > w[1])
        .map(|w| w[1])
        .collect();

    if window == 0 || minima.len() < window {
        return Vec::new();
    }

    let mut levels: Vec<f64> = minima
        .windows(window)
        .map(|w| w.iter().copied().fold(f64::INFINITY, f64::min))
        .collect();
    levels.sort_by(f64::total_cmp);
    levels.dedup();
    levels
}

/// First support level within `tolerance` (absolute price units) of `price`
pub fn near_support_level(price: f64, levels: &[f64], tolerance: f64) -> Option<f64> {
    levels
        .iter()
        .copied()
        .find(|level| (price - level).abs() <= tolerance)
}

/// Percentage the price sits below `recent_high`; `None` when the high is not positive
pub fn price_drop_percent(current_price: f64, recent_high: f64) -> Option<f64> {
    if recent_high <= 0.0 {
        return None;
    }
    Some((recent_high - current_price) / recent_high * 100.0)
}
