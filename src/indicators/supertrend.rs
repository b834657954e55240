// =============================================================================
// Supertrend — ATR-band trend-following state machine
// =============================================================================
//
// Basic bands around the bar midpoint:
//   upper = (high + low) / 2 + multiplier * ATR
//   lower = (high + low) / 2 - multiplier * ATR
//
// State transitions per bar (lazy: the line and direction persist until a
// band is broken):
//   close > previous upper band  => flip bullish, line follows the lower band
//   close < previous lower band  => flip bearish, line follows the upper band
//   otherwise                    => keep previous line and direction

use crate::indicators::atr::atr_series;
use crate::market_data::Candle;

/// Latest supertrend line and direction (+1 bullish, -1 bearish, 0 unset).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupertrendResult {
    pub line: f64,
    pub direction: i8,
}

/// Compute the most recent supertrend state.
///
/// Returns `None` when there is not enough data for the underlying ATR or
/// the state machine never initialises (no band break in the whole series).
pub fn calculate_supertrend(
    candles: &[Candle],
    period: usize,
    multiplier: f64,
) -> Option<SupertrendResult> {
    let atr = atr_series(candles, period);
    if atr.is_empty() {
        return None;
    }

    // ATR index 0 corresponds to candle index `period`.
    let mut upper_bands = Vec::with_capacity(atr.len());
    let mut lower_bands = Vec::with_capacity(atr.len());
    for (i, &atr_value) in atr.iter().enumerate() {
        let c = &candles[period + i];
        let mid = (c.high + c.low) / 2.0;
        upper_bands.push(mid + multiplier * atr_value);
        lower_bands.push(mid - multiplier * atr_value);
    }

    let mut line = f64::NAN;
    let mut direction: i8 = 0;

    for i in 1..atr.len() {
        let close = candles[period + i].close;
        if close > upper_bands[i - 1] {
            line = lower_bands[i];
            direction = 1;
        } else if close < lower_bands[i - 1] {
            line = upper_bands[i];
            direction = -1;
        }
        // else: carry the previous state forward.
    }

    if direction == 0 || !line.is_finite() {
        return None;
    }

    Some(SupertrendResult { line, direction })
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn candle(open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle::new(0, open, high, low, close, 1.0)
    }

    fn trending(up: bool, n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let step = if up { i as f64 * 3.0 } else { -(i as f64) * 3.0 };
                let base = 500.0 + step;
                candle(base, base + 1.0, base - 1.0, base + if up { 0.8 } else { -0.8 })
            })
            .collect()
    }

    #[test]
    fn rejects_short_input() {
        let candles = trending(true, 8);
        assert!(calculate_supertrend(&candles, 10, 3.0).is_none());
    }

    #[test]
    fn uptrend_flips_bullish() {
        let candles = trending(true, 60);
        let st = calculate_supertrend(&candles, 10, 3.0).unwrap();
        assert_eq!(st.direction, 1);
        assert!(st.line < candles.last().unwrap().close);
    }

    #[test]
    fn downtrend_flips_bearish() {
        let candles = trending(false, 60);
        let st = calculate_supertrend(&candles, 10, 3.0).unwrap();
        assert_eq!(st.direction, -1);
        assert!(st.line > candles.last().unwrap().close);
    }

    #[test]
    fn flat_market_never_initialises() {
        // No close ever escapes the bands, so no flip happens.
        let candles = vec![candle(100.0, 101.0, 99.0, 100.0); 60];
        assert!(calculate_supertrend(&candles, 10, 3.0).is_none());
    }
}
