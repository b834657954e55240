// =============================================================================
// Macro Features — dollar index, fear gauge, rates complex
// =============================================================================
//
// All macro features read named series out of the context bundle and degrade
// to a neutral result when the series is absent or too short.  Directions are
// expressed from the perspective of the analysed asset (gold / crypto): a
// strong dollar or rising real yields weigh on it, falling ones support it.

use anyhow::Result;

use crate::context::{macro_keys, ContextBundle};
use crate::features::{Feature, FeatureCategory, FeatureMetadata, FeatureResult};
use crate::indicators::ema::current_sma;
use crate::market_data::{Candle, MarketType, Timeframe};

/// Percentage change between the last point and the point `n - 1` steps back
/// (mirrors a `[-n]` tail index).  `None` when the series is shorter than `n`
/// or the reference is zero.
fn change_over(series: &[f64], n: usize) -> Option<f64> {
    if series.len() < n || n < 2 {
        return None;
    }
    let reference = series[series.len() - n];
    if reference == 0.0 {
        return None;
    }
    Some((series[series.len() - 1] - reference) / reference * 100.0)
}

/// Absolute (point) change over the same window, for yield-style series.
fn point_change_over(series: &[f64], n: usize) -> Option<f64> {
    if series.len() < n || n < 2 {
        return None;
    }
    Some(series[series.len() - 1] - series[series.len() - n])
}

// =============================================================================
// DXY — US dollar index
// =============================================================================

pub struct Dxy;

impl Feature for Dxy {
    fn name(&self) -> &'static str {
        "dxy"
    }

    fn category(&self) -> FeatureCategory {
        FeatureCategory::Macro
    }

    fn calculate(
        &self,
        _candles: &[Candle],
        _symbol: &str,
        _timeframe: Timeframe,
        _market_type: MarketType,
        context: &ContextBundle,
    ) -> Result<FeatureResult> {
        let Some(series) = context.macro_series(macro_keys::DXY, 50) else {
            return Ok(FeatureResult::unavailable(
                self.name(),
                self.category(),
                "DXY data not available",
            ));
        };

        let current = series[series.len() - 1];
        let change_pct = change_over(series, 5).unwrap_or(0.0);
        let sma_20 = current_sma(series, 20).unwrap_or(current);

        let (direction, strength, explanation) = if change_pct > 1.0 && current > sma_20 {
            (
                -1,
                (change_pct.abs() / 3.0).min(1.0),
                format!("DXY rising {change_pct:.2}% - bearish for gold/crypto"),
            )
        } else if change_pct < -1.0 && current < sma_20 {
            (
                1,
                (change_pct.abs() / 3.0).min(1.0),
                format!("DXY falling {change_pct:.2}% - bullish for gold/crypto"),
            )
        } else {
            (0, 0.3, format!("DXY stable at {current:.2}"))
        };

        Ok(
            FeatureResult::new(self.name(), self.category(), current, direction, strength, explanation)
                .with_metadata(FeatureMetadata {
                    change_pct: Some(change_pct),
                    ..Default::default()
                }),
        )
    }
}

// =============================================================================
// VIX — equity fear gauge
// =============================================================================

pub struct Vix;

impl Feature for Vix {
    fn name(&self) -> &'static str {
        "vix"
    }

    fn category(&self) -> FeatureCategory {
        FeatureCategory::Macro
    }

    fn calculate(
        &self,
        _candles: &[Candle],
        _symbol: &str,
        _timeframe: Timeframe,
        _market_type: MarketType,
        context: &ContextBundle,
    ) -> Result<FeatureResult> {
        let Some(series) = context.macro_series(macro_keys::VIX, 5) else {
            return Ok(FeatureResult::unavailable(
                self.name(),
                self.category(),
                "VIX data not available",
            ));
        };

        let current = series[series.len() - 1];

        let (direction, strength, explanation) = if current > 35.0 {
            (
                1,
                ((current - 35.0) / 30.0).min(1.0),
                format!("VIX at {current:.2} - extreme fear, contrarian bullish"),
            )
        } else if current > 25.0 {
            (
                -1,
                (current - 25.0) / 15.0,
                format!("VIX at {current:.2} - elevated fear, bearish"),
            )
        } else if current < 15.0 {
            (
                -1,
                0.3,
                format!("VIX at {current:.2} - complacency, caution"),
            )
        } else {
            (0, 0.2, format!("VIX at {current:.2} - normal levels"))
        };

        Ok(FeatureResult::new(
            self.name(),
            self.category(),
            current,
            direction,
            strength,
            explanation,
        ))
    }
}

// =============================================================================
// 10-year Treasury yield
// =============================================================================

pub struct TreasuryYield;

impl Feature for TreasuryYield {
    fn name(&self) -> &'static str {
        "treasury_10y"
    }

    fn category(&self) -> FeatureCategory {
        FeatureCategory::Macro
    }

    fn calculate(
        &self,
        _candles: &[Candle],
        _symbol: &str,
        _timeframe: Timeframe,
        _market_type: MarketType,
        context: &ContextBundle,
    ) -> Result<FeatureResult> {
        let Some(series) = context.macro_series(macro_keys::TNX, 5) else {
            return Ok(FeatureResult::unavailable(
                self.name(),
                self.category(),
                "Treasury data not available",
            ));
        };

        let current = series[series.len() - 1];
        let window = series.len().min(10);
        let change = point_change_over(series, window).unwrap_or(0.0);

        let (direction, strength, explanation) = if change > 0.1 {
            (
                -1,
                (change.abs() / 0.5).min(1.0),
                format!("10Y Treasury rising to {current:.2}% (+{change:.2}%) - bearish for gold"),
            )
        } else if change < -0.1 {
            (
                1,
                (change.abs() / 0.5).min(1.0),
                format!("10Y Treasury falling to {current:.2}% ({change:.2}%) - bullish for gold"),
            )
        } else {
            (0, 0.3, format!("10Y Treasury stable at {current:.2}%"))
        };

        Ok(
            FeatureResult::new(self.name(), self.category(), current, direction, strength, explanation)
                .with_metadata(FeatureMetadata {
                    change_pct: Some(change),
                    ..Default::default()
                }),
        )
    }
}

// =============================================================================
// Real yields (direct series or TNX minus inflation expectations)
// =============================================================================

pub struct RealYields;

impl Feature for RealYields {
    fn name(&self) -> &'static str {
        "real_yields"
    }

    fn category(&self) -> FeatureCategory {
        FeatureCategory::Macro
    }

    fn calculate(
        &self,
        _candles: &[Candle],
        _symbol: &str,
        _timeframe: Timeframe,
        _market_type: MarketType,
        context: &ContextBundle,
    ) -> Result<FeatureResult> {
        // Prefer a direct real-yield series; fall back to nominal minus
        // inflation expectation.
        let (current, change) = if let Some(series) = context.macro_series(macro_keys::REAL_YIELDS, 10)
        {
            (
                series[series.len() - 1],
                point_change_over(series, 10).unwrap_or(0.0),
            )
        } else if let (Some(tnx), Some(infl)) = (
            context.macro_series(macro_keys::TNX, 1),
            context.macro_series(macro_keys::INFLATION_EXP, 1),
        ) {
            (tnx[tnx.len() - 1] - infl[infl.len() - 1], 0.0)
        } else {
            return Ok(FeatureResult::unavailable(
                self.name(),
                self.category(),
                "Insufficient data for real yields",
            ));
        };

        let (direction, strength, explanation) = if change > 0.1 {
            (
                -1,
                (change.abs() / 0.5).min(1.0),
                format!("Real yields rising to {current:.2}% - bearish for gold"),
            )
        } else if change < -0.1 {
            (
                1,
                (change.abs() / 0.5).min(1.0),
                format!("Real yields falling to {current:.2}% - bullish for gold"),
            )
        } else {
            (0, 0.3, format!("Real yields stable at {current:.2}%"))
        };

        Ok(
            FeatureResult::new(self.name(), self.category(), current, direction, strength, explanation)
                .with_metadata(FeatureMetadata {
                    change_pct: Some(change),
                    ..Default::default()
                }),
        )
    }
}

// =============================================================================
// Inflation expectations (TIP ETF drift as a real-yield proxy)
// =============================================================================

pub struct InflationExpectations;

impl Feature for InflationExpectations {
    fn name(&self) -> &'static str {
        "inflation_expectations"
    }

    fn category(&self) -> FeatureCategory {
        FeatureCategory::Macro
    }

    fn calculate(
        &self,
        _candles: &[Candle],
        _symbol: &str,
        _timeframe: Timeframe,
        _market_type: MarketType,
        context: &ContextBundle,
    ) -> Result<FeatureResult> {
        let (Some(tnx), Some(tip)) = (
            context.macro_series(macro_keys::TNX, 10),
            context.macro_series(macro_keys::TIP, 10),
        ) else {
            return Ok(FeatureResult::unavailable(
                self.name(),
                self.category(),
                "Treasury/TIPS data not available",
            ));
        };

        let nominal = tnx[tnx.len() - 1];
        let tip_change = change_over(tip, 10).unwrap_or(0.0);

        // Rising TIP price implies falling real yields / firming inflation
        // expectations, which supports gold.
        let (direction, strength, explanation) = if tip_change > 0.5 {
            (
                1,
                (tip_change.abs() / 2.0).min(1.0),
                "Inflation expectations rising - bullish for gold".to_string(),
            )
        } else if tip_change < -0.5 {
            (
                -1,
                (tip_change.abs() / 2.0).min(1.0),
                "Inflation expectations falling - bearish for gold".to_string(),
            )
        } else {
            (0, 0.3, "Inflation expectations stable".to_string())
        };

        Ok(
            FeatureResult::new(self.name(), self.category(), nominal, direction, strength, explanation)
                .with_metadata(FeatureMetadata {
                    change_pct: Some(tip_change),
                    ..Default::default()
                }),
        )
    }
}
