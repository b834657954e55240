// =============================================================================
// Relative Strength Index (RSI) — Wilder's Smoothing
// =============================================================================
//
// RSI compares the magnitude of recent gains against recent losses:
//
//   avg_gain_t = (avg_gain_{t-1} * (period - 1) + gain_t) / period
//   avg_loss_t = (avg_loss_{t-1} * (period - 1) + loss_t) / period
//   RSI        = 100 - 100 / (1 + avg_gain / avg_loss)
//
// The first average pair is seeded with the SMA of the first `period` deltas.

/// Compute the RSI series for `closes` with the given look-back `period`.
///
/// One value is produced per close starting at index `period`.  Returns an
/// empty vec when `period` is zero or there are fewer than `period + 1`
/// closes (a delta requires a predecessor).  The series is truncated at the
/// first non-finite value.
pub fn rsi_series(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() < period + 1 {
        return Vec::new();
    }

    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let period_f = period as f64;

    let mut avg_gain = deltas[..period].iter().filter(|d| **d > 0.0).sum::<f64>() / period_f;
    let mut avg_loss = -deltas[..period].iter().filter(|d| **d < 0.0).sum::<f64>() / period_f;

    let mut out = Vec::with_capacity(deltas.len() - period + 1);
    match point(avg_gain, avg_loss) {
        Some(v) => out.push(v),
        None => return Vec::new(),
    }

    for &delta in &deltas[period..] {
        let gain = delta.max(0.0);
        let loss = (-delta).max(0.0);
        avg_gain = (avg_gain * (period_f - 1.0) + gain) / period_f;
        avg_loss = (avg_loss * (period_f - 1.0) + loss) / period_f;

        match point(avg_gain, avg_loss) {
            Some(v) => out.push(v),
            None => break,
        }
    }

    out
}

/// Most recent RSI value, or `None` on insufficient data.
pub fn current_rsi(closes: &[f64], period: usize) -> Option<f64> {
    rsi_series(closes, period).last().copied()
}

/// One RSI point from the smoothed averages.
///
/// A completely flat market (both averages zero) reads as 50; a loss-free
/// market as 100.  Non-finite results are rejected.
fn point(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    let rsi = if avg_gain == 0.0 && avg_loss == 0.0 {
        50.0
    } else if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    };
    rsi.is_finite().then_some(rsi)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn series_rejects_degenerate_inputs() {
        assert!(rsi_series(&[], 14).is_empty());
        assert!(rsi_series(&[1.0, 2.0, 3.0], 0).is_empty());
        // 14 closes give only 13 deltas — one short of a 14-period seed.
        let closes: Vec<f64> = (1..=14).map(f64::from).collect();
        assert!(rsi_series(&closes, 14).is_empty());
    }

    #[test]
    fn monotonic_rise_pins_at_100() {
        let closes: Vec<f64> = (1..=40).map(f64::from).collect();
        for v in rsi_series(&closes, 14) {
            assert!((v - 100.0).abs() < 1e-9, "expected 100, got {v}");
        }
    }

    #[test]
    fn monotonic_fall_pins_at_0() {
        let closes: Vec<f64> = (1..=40).rev().map(f64::from).collect();
        for v in rsi_series(&closes, 14) {
            assert!(v.abs() < 1e-9, "expected 0, got {v}");
        }
    }

    #[test]
    fn flat_market_reads_50() {
        let closes = vec![42.0; 40];
        let rsi = current_rsi(&closes, 14).unwrap();
        assert!((rsi - 50.0).abs() < 1e-9);
    }

    #[test]
    fn values_stay_in_range() {
        let closes: Vec<f64> = (0..120)
            .map(|i| 100.0 + (i as f64 * 0.7).sin() * 8.0)
            .collect();
        for v in rsi_series(&closes, 14) {
            assert!((0.0..=100.0).contains(&v), "RSI {v} out of [0,100]");
        }
    }

    #[test]
    fn current_none_without_data() {
        assert!(current_rsi(&[], 14).is_none());
    }
}
