// =============================================================================
// Rate of Change (ROC) — Momentum
// =============================================================================
//
//   ROC = ((close - close_n) / close_n) * 100
//
// Positive ROC means upward momentum over the look-back; negative, downward.

/// Percentage change between the last close and the close `period` bars ago.
///
/// Returns `None` on insufficient data or a zero reference price.
pub fn current_roc(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() <= period {
        return None;
    }
    let current = *closes.last()?;
    let reference = closes[closes.len() - 1 - period];
    if reference == 0.0 {
        return None;
    }
    let roc = (current - reference) / reference * 100.0;
    roc.is_finite().then_some(roc)
}

/// Average ROC across several look-back periods, skipping those the series is
/// too short for.  `None` when no period is computable.
pub fn average_roc(closes: &[f64], periods: &[usize]) -> Option<f64> {
    let values: Vec<f64> = periods
        .iter()
        .filter_map(|&p| current_roc(closes, p))
        .collect();
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_change() {
        let closes = vec![100.0, 105.0, 110.0];
        assert!((current_roc(&closes, 2).unwrap() - 10.0).abs() < 1e-12);
    }

    #[test]
    fn insufficient_data() {
        assert!(current_roc(&[1.0, 2.0], 5).is_none());
        assert!(current_roc(&[], 1).is_none());
    }

    #[test]
    fn zero_reference_guard() {
        let closes = vec![0.0, 1.0, 2.0];
        assert!(current_roc(&closes, 2).is_none());
    }

    #[test]
    fn average_skips_uncomputable_periods() {
        let closes = vec![100.0, 102.0, 104.0, 106.0, 108.0, 110.0];
        // Period 20 is skipped; periods 2 and 5 both compute.
        let avg = average_roc(&closes, &[2, 5, 20]).unwrap();
        let roc2 = current_roc(&closes, 2).unwrap();
        let roc5 = current_roc(&closes, 5).unwrap();
        assert!((avg - (roc2 + roc5) / 2.0).abs() < 1e-12);
    }

    #[test]
    fn average_none_when_nothing_computes() {
        assert!(average_roc(&[1.0, 2.0], &[5, 10]).is_none());
    }
}
