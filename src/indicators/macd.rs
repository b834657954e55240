// =============================================================================
// Moving Average Convergence Divergence (MACD)
// =============================================================================
//
//   macd_line   = EMA(fast) - EMA(slow)
//   signal_line = EMA(macd_line, signal_period)
//   histogram   = macd_line - signal_line
//
// The feature layer cares about the latest histogram value and its
// predecessor (a zero-cross between the two marks a fresh signal), so both
// are returned together.

use crate::indicators::ema::ema_series;

/// Latest MACD state.  `prev_histogram` is 0.0 when only one histogram point
/// exists, which suppresses spurious "fresh cross" detection on short input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdResult {
    pub macd_line: f64,
    pub signal_line: f64,
    pub histogram: f64,
    pub prev_histogram: f64,
}

/// Compute the most recent MACD values for `closes`.
///
/// Returns `None` when the input is too short for the slow EMA plus the
/// signal EMA seed.
pub fn calculate_macd(
    closes: &[f64],
    fast: usize,
    slow: usize,
    signal_period: usize,
) -> Option<MacdResult> {
    if fast == 0 || slow == 0 || signal_period == 0 || fast >= slow {
        return None;
    }

    let fast_ema = ema_series(closes, fast);
    let slow_ema = ema_series(closes, slow);
    if slow_ema.is_empty() {
        return None;
    }

    // Align the two series on their tails: the slow series is the shorter.
    let offset = fast_ema.len().checked_sub(slow_ema.len())?;
    let macd_line: Vec<f64> = slow_ema
        .iter()
        .enumerate()
        .map(|(i, s)| fast_ema[offset + i] - s)
        .collect();

    let signal = ema_series(&macd_line, signal_period);
    let signal_last = *signal.last()?;

    let macd_last = *macd_line.last()?;
    let histogram = macd_last - signal_last;

    let prev_histogram = if signal.len() >= 2 && macd_line.len() >= 2 {
        macd_line[macd_line.len() - 2] - signal[signal.len() - 2]
    } else {
        0.0
    };

    Some(MacdResult {
        macd_line: macd_last,
        signal_line: signal_last,
        histogram,
        prev_histogram,
    })
}
