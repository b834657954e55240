// =============================================================================
// Volume Features — VWAP distance and volume-ratio spikes
// =============================================================================

use anyhow::Result;

use crate::context::ContextBundle;
use crate::features::{volume_signal, Feature, FeatureCategory, FeatureMetadata, FeatureResult};
use crate::indicators::ema::sma_series;
use crate::indicators::vwap::calculate_vwap;
use crate::market_data::{Candle, MarketType, Timeframe};

// =============================================================================
// VWAP distance
// =============================================================================

/// Distance of the last close from the volume-weighted average price.
/// Stretch away from VWAP reads as mean-reversion pressure.
pub struct VwapDistance;

impl Feature for VwapDistance {
    fn name(&self) -> &'static str {
        "vwap"
    }

    fn category(&self) -> FeatureCategory {
        FeatureCategory::Volume
    }

    fn calculate(
        &self,
        candles: &[Candle],
        _symbol: &str,
        _timeframe: Timeframe,
        _market_type: MarketType,
        _context: &ContextBundle,
    ) -> Result<FeatureResult> {
        let (Some(vwap), Some(price)) = (calculate_vwap(candles), candles.last().map(|c| c.close))
        else {
            return Ok(FeatureResult::unavailable(
                self.name(),
                self.category(),
                "VWAP needs candles with volume",
            ));
        };
        if vwap == 0.0 {
            return Ok(FeatureResult::unavailable(
                self.name(),
                self.category(),
                "VWAP collapsed to zero",
            ));
        }

        let distance_pct = (price - vwap) / vwap * 100.0;

        let (direction, strength, explanation) = if distance_pct > 1.0 {
            (
                -1,
                (distance_pct.abs() / 3.0).min(1.0),
                format!("Price {distance_pct:.2}% above VWAP - overbought"),
            )
        } else if distance_pct < -1.0 {
            (
                1,
                (distance_pct.abs() / 3.0).min(1.0),
                format!("Price {distance_pct:.2}% below VWAP - oversold"),
            )
        } else {
            (0, 0.2, format!("Price near VWAP ({distance_pct:+.2}%)"))
        };

        Ok(
            FeatureResult::new(self.name(), self.category(), vwap, direction, strength, explanation)
                .with_metadata(FeatureMetadata {
                    distance_pct: Some(distance_pct),
                    ..Default::default()
                }),
        )
    }
}

// =============================================================================
// Volume ratio
// =============================================================================

pub struct VolumeRatio {
    period: usize,
}

impl Default for VolumeRatio {
    fn default() -> Self {
        Self { period: 20 }
    }
}

impl Feature for VolumeRatio {
    fn name(&self) -> &'static str {
        "volume_ratio"
    }

    fn category(&self) -> FeatureCategory {
        FeatureCategory::Volume
    }

    fn calculate(
        &self,
        candles: &[Candle],
        _symbol: &str,
        _timeframe: Timeframe,
        _market_type: MarketType,
        _context: &ContextBundle,
    ) -> Result<FeatureResult> {
        if candles.len() < self.period + 1 {
            return Ok(FeatureResult::unavailable(
                self.name(),
                self.category(),
                format!("Volume ratio needs at least {} candles", self.period + 1),
            ));
        }

        let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();
        let Some(avg_volume) = sma_series(&volumes, self.period).last().copied() else {
            return Ok(FeatureResult::unavailable(
                self.name(),
                self.category(),
                "No volume average available",
            ));
        };
        let current_volume = volumes[volumes.len() - 1];

        let prev_close = candles[candles.len() - 2].close;
        let last_close = candles[candles.len() - 1].close;
        let price_change_pct = if prev_close != 0.0 {
            (last_close - prev_close) / prev_close * 100.0
        } else {
            0.0
        };

        let (direction, strength) = volume_signal(current_volume, avg_volume, price_change_pct);
        let ratio = if avg_volume > 0.0 {
            current_volume / avg_volume
        } else {
            1.0
        };

        let explanation = if ratio > 2.0 {
            format!("Volume spike {ratio:.2}x average")
        } else if ratio < 0.5 {
            format!("Low volume {ratio:.2}x average - low conviction")
        } else {
            format!("Normal volume {ratio:.2}x average")
        };

        Ok(
            FeatureResult::new(self.name(), self.category(), ratio, direction, strength, explanation)
                .with_metadata(FeatureMetadata {
                    period: Some(self.period as u32),
                    price_change_pct: Some(price_change_pct),
                    ..Default::default()
                }),
        )
    }
}
