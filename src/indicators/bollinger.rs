// =============================================================================
// Bollinger Bands, %B and Band Width
// =============================================================================
//
//   middle = SMA(period)
//   upper  = middle + k * σ
//   lower  = middle - k * σ
//   %B     = (price - lower) / (upper - lower)
//   width  = (upper - lower) / middle * 100
//
// %B drives the mean-reversion feature; the width series feeds squeeze
// detection (current width vs its own trailing average).

/// Bands for the most recent window plus the derived %B and width.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerResult {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
    /// Position of the last close within the bands. 0.5 when the bands have
    /// collapsed to zero range.
    pub percent_b: f64,
    /// Band width as a percentage of the middle band.
    pub width: f64,
}

/// Calculate Bollinger Bands over the trailing `period` closes.
///
/// Returns `None` when there is insufficient data, the middle band is zero,
/// or the result is non-finite.
pub fn calculate_bollinger(closes: &[f64], period: usize, num_std: f64) -> Option<BollingerResult> {
    if period == 0 || closes.len() < period {
        return None;
    }

    let window = &closes[closes.len() - period..];
    let middle = window.iter().sum::<f64>() / period as f64;
    if middle == 0.0 {
        return None;
    }

    let variance = window.iter().map(|x| (x - middle).powi(2)).sum::<f64>() / period as f64;
    let std_dev = variance.sqrt();

    let upper = middle + num_std * std_dev;
    let lower = middle - num_std * std_dev;
    let width = (upper - lower) / middle * 100.0;

    let range = upper - lower;
    let last = *closes.last()?;
    let percent_b = if range > 0.0 {
        (last - lower) / range
    } else {
        0.5
    };

    (width.is_finite() && percent_b.is_finite()).then_some(BollingerResult {
        upper,
        middle,
        lower,
        percent_b,
        width,
    })
}

/// Band-width series: one width value per close starting at `period - 1`.
/// Used to compare the current width against its own trailing average for
/// squeeze detection.
pub fn width_series(closes: &[f64], period: usize, num_std: f64) -> Vec<f64> {
    if period == 0 || closes.len() < period {
        return Vec::new();
    }

    let mut out = Vec::with_capacity(closes.len() - period + 1);
    for end in period..=closes.len() {
        match calculate_bollinger(&closes[..end], period, num_std) {
            Some(bb) => out.push(bb.width),
            None => out.push(0.0),
        }
    }
    out
}
