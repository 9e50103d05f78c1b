/// Relative Strength Index over the last `period` price changes
///
/// Average gain and average loss are plain means over the window.
/// A window with no losses reads 100; a perfectly flat one has no value.
pub fn calculate_rsi(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period + 1 {
        return None;
    }

    let window = &prices[prices.len() - (period + 1)..];
    let (gain, loss) = window
        .windows(2)
        .map(|pair| pair[1] - pair[0])
        .fold((0.0, 0.0), |(gain, loss), change| {
            if change > 0.0 {
                (gain + change, loss)
            } else {
                (gain, loss - change)
            }
        });

    let avg_gain = gain / period as f64;
    let avg_loss = loss / period as f64;

    match (avg_gain, avg_loss) {
        (g, l) if g == 0.0 && l == 0.0 => None,
        (_, l) if l == 0.0 => Some(100.0),
        (g, l) => Some(100.0 - 100.0 / (1.0 + g / l)),
    }
}
