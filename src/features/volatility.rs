// =============================================================================
// Volatility Features — ATR percentile and Bollinger band width
// =============================================================================
//
// Both features are directionally neutral: they describe the volatility
// regime rather than picking a side.  Their metadata (ATR percentile, squeeze
// flag) feeds the Layer-2 regime classification.

use anyhow::Result;

use crate::context::ContextBundle;
use crate::features::{Feature, FeatureCategory, FeatureMetadata, FeatureResult};
use crate::indicators::atr::{atr_percentile, current_atr};
use crate::indicators::bollinger::width_series;
use crate::indicators::ema::sma_series;
use crate::market_data::{closes, Candle, MarketType, Timeframe};

// =============================================================================
// ATR percentile
// =============================================================================

pub struct AtrPercentile {
    period: usize,
    lookback: usize,
}

impl Default for AtrPercentile {
    fn default() -> Self {
        Self {
            period: 14,
            lookback: 50,
        }
    }
}

impl Feature for AtrPercentile {
    fn name(&self) -> &'static str {
        "atr"
    }

    fn category(&self) -> FeatureCategory {
        FeatureCategory::Volatility
    }

    fn calculate(
        &self,
        candles: &[Candle],
        _symbol: &str,
        _timeframe: Timeframe,
        _market_type: MarketType,
        _context: &ContextBundle,
    ) -> Result<FeatureResult> {
        let (Some(atr), Some(percentile)) = (
            current_atr(candles, self.period),
            atr_percentile(candles, self.period, self.lookback),
        ) else {
            return Ok(FeatureResult::unavailable(
                self.name(),
                self.category(),
                format!("ATR needs at least {} candles", self.period + 1),
            ));
        };

        let price = candles.last().map(|c| c.close).unwrap_or(0.0);
        let atr_pct = if price != 0.0 { atr / price * 100.0 } else { 0.0 };

        let (strength, explanation) = if percentile > 0.8 {
            (0.3, format!("ATR at {atr_pct:.2}% (high volatility) - caution"))
        } else if percentile < 0.2 {
            (
                0.5,
                format!("ATR at {atr_pct:.2}% (low volatility) - potential breakout"),
            )
        } else {
            (0.2, format!("ATR at {atr_pct:.2}% (normal volatility)"))
        };

        Ok(
            FeatureResult::new(self.name(), self.category(), atr, 0, strength, explanation)
                .with_metadata(FeatureMetadata {
                    period: Some(self.period as u32),
                    percentile: Some(percentile),
                    atr_pct: Some(atr_pct),
                    ..Default::default()
                }),
        )
    }
}

// =============================================================================
// Bollinger band width (squeeze detection)
// =============================================================================

pub struct BandWidth {
    period: usize,
    num_std: f64,
    avg_window: usize,
}

impl Default for BandWidth {
    fn default() -> Self {
        Self {
            period: 20,
            num_std: 2.0,
            avg_window: 50,
        }
    }
}

impl Feature for BandWidth {
    fn name(&self) -> &'static str {
        "bb_width"
    }

    fn category(&self) -> FeatureCategory {
        FeatureCategory::Volatility
    }

    fn calculate(
        &self,
        candles: &[Candle],
        _symbol: &str,
        _timeframe: Timeframe,
        _market_type: MarketType,
        _context: &ContextBundle,
    ) -> Result<FeatureResult> {
        let closes = closes(candles);
        let widths = width_series(&closes, self.period, self.num_std);
        let Some(&current_width) = widths.last() else {
            return Ok(FeatureResult::unavailable(
                self.name(),
                self.category(),
                format!("Band width needs at least {} closes", self.period),
            ));
        };
        let Some(avg_width) = sma_series(&widths, self.avg_window).last().copied() else {
            return Ok(FeatureResult::unavailable(
                self.name(),
                self.category(),
                format!(
                    "Band width average needs {} width samples",
                    self.avg_window
                ),
            ));
        };

        let is_squeeze = current_width < avg_width * 0.8;

        let (strength, explanation) = if is_squeeze {
            (
                0.7,
                format!("BB squeeze detected (width: {current_width:.2}%) - breakout likely"),
            )
        } else if current_width > avg_width * 1.5 {
            (
                0.5,
                format!("BB expansion (width: {current_width:.2}%) - high volatility"),
            )
        } else {
            (0.2, format!("Normal BB width: {current_width:.2}%"))
        };

        Ok(
            FeatureResult::new(self.name(), self.category(), current_width, 0, strength, explanation)
                .with_metadata(FeatureMetadata {
                    is_squeeze: Some(is_squeeze),
                    avg_width: Some(avg_width),
                    ..Default::default()
                }),
        )
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ContextBundle {
        ContextBundle::default()
    }

    fn run(feature: &dyn Feature, candles: &[Candle]) -> FeatureResult {
        feature
            .calculate(candles, "XAUUSD", Timeframe::H1, MarketType::Spot, &ctx())
            .unwrap()
    }

    fn ranged(n: usize, spread: impl Fn(usize) -> f64) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let s = spread(i);
                Candle::new(i as i64, 100.0, 100.0 + s, 100.0 - s, 100.0, 50.0)
            })
            .collect()
    }

    #[test]
    fn atr_short_history_is_neutral() {
        let r = run(&AtrPercentile::default(), &ranged(5, |_| 1.0));
        assert_eq!(r.direction, 0);
        assert_eq!(r.strength, 0.0);
    }

    #[test]
    fn atr_is_always_directionless() {
        let r = run(&AtrPercentile::default(), &ranged(120, |i| 1.0 + i as f64 * 0.2));
        assert_eq!(r.direction, 0);
        assert!(r.strength > 0.0);
        assert!(r.metadata.percentile.is_some());
    }

    #[test]
    fn atr_expanding_volatility_ranks_high() {
        let r = run(&AtrPercentile::default(), &ranged(120, |i| 1.0 + i as f64 * 0.2));
        assert!(r.metadata.percentile.unwrap() > 0.8);
        assert!((r.strength - 0.3).abs() < 1e-12);
        assert!(r.explanation.contains("high volatility"));
    }

    #[test]
    fn band_width_squeeze_detected_after_compression() {
        // Wide swings for 80 bars, then a tight coil.
        let mut candles: Vec<Candle> = (0..80)
            .map(|i| {
                let wave = (i as f64 * 0.8).sin() * 8.0;
                Candle::new(i as i64, 100.0 + wave, 104.0 + wave, 96.0 + wave, 100.0 + wave, 50.0)
            })
            .collect();
        for i in 80..120 {
            candles.push(Candle::new(i as i64, 100.0, 100.3, 99.7, 100.0, 50.0));
        }
        let r = run(&BandWidth::default(), &candles);
        assert_eq!(r.metadata.is_squeeze, Some(true));
        assert!((r.strength - 0.7).abs() < 1e-12);
    }

    #[test]
    fn band_width_short_history_is_neutral() {
        let r = run(&BandWidth::default(), &ranged(30, |_| 1.0));
        assert_eq!(r.strength, 0.0);
    }
}
