// =============================================================================
// Average True Range (ATR) — Wilder's Smoothing
// =============================================================================
//
// True Range per bar:
//   TR = max(H - L, |H - prevClose|, |L - prevClose|)
//
// ATR is Wilder's smoothed average of TR:
//   ATR_0 = SMA of first `period` TR values
//   ATR_t = (ATR_{t-1} * (period - 1) + TR_t) / period
//
// The volatility regime axis uses the percentile rank of the latest ATR
// against its own trailing history rather than the absolute level, so it
// works unchanged across price scales.

use crate::market_data::Candle;

/// Full ATR series (one value per bar starting at index `period`).
///
/// Empty when the period is zero or the input has fewer than `period + 1`
/// candles; truncated at the first non-finite value.
pub fn atr_series(candles: &[Candle], period: usize) -> Vec<f64> {
    if period == 0 || candles.len() < period + 1 {
        return Vec::new();
    }

    let tr: Vec<f64> = candles
        .windows(2)
        .map(|pair| {
            let (prev, cur) = (&pair[0], &pair[1]);
            (cur.high - cur.low)
                .max((cur.high - prev.close).abs())
                .max((cur.low - prev.close).abs())
        })
        .collect();

    let period_f = period as f64;
    let seed = tr[..period].iter().sum::<f64>() / period_f;
    if !seed.is_finite() {
        return Vec::new();
    }

    let mut out = Vec::with_capacity(tr.len() - period + 1);
    out.push(seed);

    let mut atr = seed;
    for &value in &tr[period..] {
        atr = (atr * (period_f - 1.0) + value) / period_f;
        if !atr.is_finite() {
            break;
        }
        out.push(atr);
    }

    out
}

/// Most recent ATR value, or `None` on insufficient data.
pub fn current_atr(candles: &[Candle], period: usize) -> Option<f64> {
    atr_series(candles, period).last().copied()
}

/// Percentile rank of the latest ATR against the trailing `lookback` values
/// of its own series: the fraction of those values the current reading
/// exceeds.  Falls back to 0.5 (mid-range) when the series is shorter than
/// the look-back.
pub fn atr_percentile(candles: &[Candle], period: usize, lookback: usize) -> Option<f64> {
    let series = atr_series(candles, period);
    let current = *series.last()?;
    if series.len() < lookback || lookback == 0 {
        return Some(0.5);
    }
    let window = &series[series.len() - lookback..];
    let below = window.iter().filter(|v| current > **v).count();
    Some(below as f64 / lookback as f64)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn candle(open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle::new(0, open, high, low, close, 100.0)
    }

    #[test]
    fn rejects_degenerate_inputs() {
        let candles = vec![candle(100.0, 105.0, 95.0, 102.0); 10];
        assert!(current_atr(&candles, 0).is_none());
        assert!(current_atr(&candles, 14).is_none());
    }

    #[test]
    fn constant_range_converges() {
        let candles: Vec<Candle> = (0..40)
            .map(|i| {
                let base = 100.0 + i as f64 * 0.1;
                candle(base, base + 5.0, base - 5.0, base)
            })
            .collect();
        let atr = current_atr(&candles, 14).unwrap();
        assert!((atr - 10.0).abs() < 1.0, "expected ~10, got {atr}");
    }

    #[test]
    fn gap_widens_true_range() {
        let candles = vec![
            candle(100.0, 105.0, 95.0, 95.0),
            candle(110.0, 115.0, 108.0, 112.0), // |115 - 95| = 20 dominates
            candle(112.0, 118.0, 110.0, 115.0),
            candle(115.0, 120.0, 113.0, 118.0),
        ];
        let atr = current_atr(&candles, 3).unwrap();
        assert!(atr > 7.0, "gap should lift ATR, got {atr}");
    }

    #[test]
    fn percentile_rises_with_expanding_volatility() {
        let mut candles = vec![candle(100.0, 101.0, 99.0, 100.0)];
        for i in 1..80 {
            let spread = 1.0 + i as f64 * 0.25;
            candles.push(candle(100.0, 100.0 + spread, 100.0 - spread, 100.0));
        }
        let pct = atr_percentile(&candles, 14, 50).unwrap();
        assert!(pct > 0.8, "expanding vol should rank high, got {pct}");
    }

    #[test]
    fn percentile_mid_when_history_short() {
        let candles = vec![candle(100.0, 102.0, 98.0, 100.0); 20];
        assert_eq!(atr_percentile(&candles, 14, 50), Some(0.5));
    }

    #[test]
    fn nan_input_truncates() {
        let candles = vec![
            candle(100.0, 105.0, 95.0, 100.0),
            candle(100.0, f64::NAN, 95.0, 100.0),
            candle(100.0, 105.0, 95.0, 100.0),
            candle(100.0, 105.0, 95.0, 100.0),
        ];
        assert!(current_atr(&candles, 3).is_none());
    }
}
