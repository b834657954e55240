// =============================================================================
// Stochastic Oscillator (%K / %D)
// =============================================================================
//
//   %K = 100 * (close - lowest_low(k_period)) / (highest_high - lowest_low)
//   %D = SMA(%K, d_period)
//
// %K >= 80 reads overbought, %K <= 20 oversold; between the thresholds the
// %K vs %D relationship gives a mild directional lean.

use crate::market_data::Candle;

/// Latest %K and %D pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StochasticResult {
    pub k: f64,
    pub d: f64,
}

/// Compute the most recent stochastic oscillator values.
///
/// Needs `k_period + d_period - 1` candles to produce a smoothed %D.
/// Returns `None` on short input or when every window is flat (zero range).
pub fn calculate_stochastic(
    candles: &[Candle],
    k_period: usize,
    d_period: usize,
) -> Option<StochasticResult> {
    if k_period == 0 || d_period == 0 || candles.len() < k_period + d_period - 1 {
        return None;
    }

    // %K for the last `d_period` windows.
    let mut k_values = Vec::with_capacity(d_period);
    for back in (0..d_period).rev() {
        let end = candles.len() - back;
        let window = &candles[end - k_period..end];

        let lowest = window.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
        let highest = window.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
        let range = highest - lowest;

        let close = window.last()?.close;
        let k = if range > 0.0 {
            100.0 * (close - lowest) / range
        } else {
            50.0 // Flat window: no position information.
        };
        if !k.is_finite() {
            return None;
        }
        k_values.push(k);
    }

    let k = *k_values.last()?;
    let d = k_values.iter().sum::<f64>() / d_period as f64;

    Some(StochasticResult { k, d })
}
