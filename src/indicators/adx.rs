// =============================================================================
// Average Directional Index (ADX) with Directional Indicators
// =============================================================================
//
// Pipeline:
//   1. Per bar: +DM, -DM (directional movement) and True Range.
//   2. Wilder-smooth each of the three series over `period`.
//   3. +DI = smoothed(+DM) / smoothed(TR) * 100, -DI likewise.
//   4. DX  = |+DI - -DI| / (+DI + -DI) * 100.
//   5. ADX = Wilder-smoothed average of DX over another `period` bars.
//
// The rules engine consumes the raw ADX value for its trend axis
// (< 18 ranging, 18–30 developing, >= 30 trending) and the DI pair for
// trend direction.

use crate::market_data::Candle;

/// Final ADX reading together with the directional indicator pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdxResult {
    pub adx: f64,
    pub plus_di: f64,
    pub minus_di: f64,
}

/// Compute the most recent ADX / +DI / -DI from a candle slice.
///
/// Needs at least `2 * period + 1` candles: `period` transitions seed the
/// smoothed DM/TR sums, another `period` DX values seed the ADX average, and
/// the first candle has no predecessor.  Returns `None` on short input, a
/// zero period, or any non-finite intermediate.
pub fn calculate_adx(candles: &[Candle], period: usize) -> Option<AdxResult> {
    if period == 0 || candles.len() < 2 * period + 1 {
        return None;
    }

    let period_f = period as f64;
    let transitions = candles.len() - 1;

    let mut plus_dm = Vec::with_capacity(transitions);
    let mut minus_dm = Vec::with_capacity(transitions);
    let mut true_range = Vec::with_capacity(transitions);

    for pair in candles.windows(2) {
        let (prev, cur) = (&pair[0], &pair[1]);

        let tr = (cur.high - cur.low)
            .max((cur.high - prev.close).abs())
            .max((cur.low - prev.close).abs());

        let up_move = cur.high - prev.high;
        let down_move = prev.low - cur.low;

        plus_dm.push(if up_move > down_move && up_move > 0.0 {
            up_move
        } else {
            0.0
        });
        minus_dm.push(if down_move > up_move && down_move > 0.0 {
            down_move
        } else {
            0.0
        });
        true_range.push(tr);
    }

    // Wilder smoothing, seeded with plain sums of the first `period` values.
    let mut smooth_plus: f64 = plus_dm[..period].iter().sum();
    let mut smooth_minus: f64 = minus_dm[..period].iter().sum();
    let mut smooth_tr: f64 = true_range[..period].iter().sum();

    let mut dx_values = Vec::with_capacity(transitions - period + 1);
    dx_values.push(directional_index(smooth_plus, smooth_minus, smooth_tr)?);

    for i in period..transitions {
        smooth_plus = smooth_plus - smooth_plus / period_f + plus_dm[i];
        smooth_minus = smooth_minus - smooth_minus / period_f + minus_dm[i];
        smooth_tr = smooth_tr - smooth_tr / period_f + true_range[i];
        dx_values.push(directional_index(smooth_plus, smooth_minus, smooth_tr)?);
    }

    if dx_values.len() < period {
        return None;
    }

    let mut adx: f64 = dx_values[..period].iter().sum::<f64>() / period_f;
    for &dx in &dx_values[period..] {
        adx = (adx * (period_f - 1.0) + dx) / period_f;
    }
    if !adx.is_finite() {
        return None;
    }

    // Final DI pair from the last smoothed state.
    if smooth_tr == 0.0 {
        return None;
    }
    let plus_di = smooth_plus / smooth_tr * 100.0;
    let minus_di = smooth_minus / smooth_tr * 100.0;

    Some(AdxResult {
        adx,
        plus_di,
        minus_di,
    })
}

/// DX from the smoothed sums; `None` when TR is zero or the result blows up.
fn directional_index(smooth_plus: f64, smooth_minus: f64, smooth_tr: f64) -> Option<f64> {
    if smooth_tr == 0.0 {
        return None;
    }
    let plus_di = smooth_plus / smooth_tr * 100.0;
    let minus_di = smooth_minus / smooth_tr * 100.0;
    let di_sum = plus_di + minus_di;
    if di_sum == 0.0 {
        // No directional movement in either direction.
        return Some(0.0);
    }
    let dx = (plus_di - minus_di).abs() / di_sum * 100.0;
    dx.is_finite().then_some(dx)
}
