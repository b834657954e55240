// =============================================================================
// Intermarket Features — cross-asset ratios and flow proxies
// =============================================================================
//
// These features relate the analysed symbol's price to a second market
// (silver, copper, oil, gold miners) or to a flow series (GLD holdings, BTC
// dominance).  Ratio histories are built by pairing the tails of the two
// series; when the paired history is too short the trailing-average branches
// simply fall back to the current ratio and stay silent.

use anyhow::Result;

use crate::context::{intermarket_keys, ContextBundle};
use crate::features::{Feature, FeatureCategory, FeatureMetadata, FeatureResult};
use crate::market_data::{closes, Candle, MarketType, Timeframe};

/// Ratio series from the paired tails of two aligned series (latest last).
fn paired_ratio_series(numerator: &[f64], denominator: &[f64]) -> Vec<f64> {
    let n = numerator.len().min(denominator.len());
    (0..n)
        .filter_map(|i| {
            let num = numerator[numerator.len() - n + i];
            let den = denominator[denominator.len() - n + i];
            (den != 0.0).then(|| num / den)
        })
        .collect()
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

// =============================================================================
// Gold/silver ratio
// =============================================================================

pub struct GoldSilverRatio;

impl Feature for GoldSilverRatio {
    fn name(&self) -> &'static str {
        "gold_silver_ratio"
    }

    fn category(&self) -> FeatureCategory {
        FeatureCategory::Intermarket
    }

    fn calculate(
        &self,
        candles: &[Candle],
        _symbol: &str,
        _timeframe: Timeframe,
        _market_type: MarketType,
        context: &ContextBundle,
    ) -> Result<FeatureResult> {
        let (Some(silver), Some(gold_price)) = (
            context.intermarket_series(intermarket_keys::SILVER, 1),
            candles.last().map(|c| c.close),
        ) else {
            return Ok(FeatureResult::unavailable(
                self.name(),
                self.category(),
                "Silver data not available",
            ));
        };
        let silver_price = silver[silver.len() - 1];
        if silver_price == 0.0 {
            return Ok(FeatureResult::unavailable(
                self.name(),
                self.category(),
                "Silver price is zero",
            ));
        }

        let ratio = gold_price / silver_price;
        let ratio_history = paired_ratio_series(&closes(candles), silver);
        let ratio_sma_50 = if ratio_history.len() >= 50 {
            mean(&ratio_history[ratio_history.len() - 50..]).unwrap_or(ratio)
        } else {
            ratio
        };

        let (direction, strength, explanation) = if ratio > 85.0 {
            (
                -1,
                ((ratio - 85.0) / 20.0).min(1.0),
                format!("Gold/Silver ratio high at {ratio:.1} - potential reversion"),
            )
        } else if ratio < 60.0 {
            (
                1,
                ((60.0 - ratio) / 20.0).min(1.0),
                format!("Gold/Silver ratio low at {ratio:.1} - gold may outperform"),
            )
        } else if ratio > ratio_sma_50 * 1.05 {
            (-1, 0.4, format!("Gold/Silver ratio above MA50 at {ratio:.1}"))
        } else if ratio < ratio_sma_50 * 0.95 {
            (1, 0.4, format!("Gold/Silver ratio below MA50 at {ratio:.1}"))
        } else {
            (0, 0.2, format!("Gold/Silver ratio normal at {ratio:.1}"))
        };

        Ok(FeatureResult::new(
            self.name(),
            self.category(),
            ratio,
            direction,
            strength,
            explanation,
        ))
    }
}

// =============================================================================
// Copper/gold ratio — growth expectations proxy
// =============================================================================

pub struct CopperGoldRatio;

impl Feature for CopperGoldRatio {
    fn name(&self) -> &'static str {
        "copper_gold_ratio"
    }

    fn category(&self) -> FeatureCategory {
        FeatureCategory::Intermarket
    }

    fn calculate(
        &self,
        candles: &[Candle],
        _symbol: &str,
        _timeframe: Timeframe,
        _market_type: MarketType,
        context: &ContextBundle,
    ) -> Result<FeatureResult> {
        let (Some(copper), Some(gold_price)) = (
            context.intermarket_series(intermarket_keys::COPPER, 1),
            candles.last().map(|c| c.close).filter(|p| *p != 0.0),
        ) else {
            return Ok(FeatureResult::unavailable(
                self.name(),
                self.category(),
                "Copper data not available",
            ));
        };

        let ratio = copper[copper.len() - 1] / gold_price;
        let ratio_history = paired_ratio_series(copper, &closes(candles));
        let change_pct = if ratio_history.len() >= 20 {
            let reference = ratio_history[ratio_history.len() - 20];
            if reference != 0.0 {
                (ratio - reference) / reference * 100.0
            } else {
                0.0
            }
        } else {
            0.0
        };

        let (direction, strength, explanation) = if change_pct > 2.0 {
            (
                -1,
                (change_pct.abs() / 5.0).min(1.0),
                format!("Copper/Gold rising {change_pct:.2}% - risk-on, bearish for gold"),
            )
        } else if change_pct < -2.0 {
            (
                1,
                (change_pct.abs() / 5.0).min(1.0),
                format!("Copper/Gold falling {change_pct:.2}% - risk-off, bullish for gold"),
            )
        } else {
            (0, 0.2, "Copper/Gold ratio stable".to_string())
        };

        Ok(
            FeatureResult::new(self.name(), self.category(), ratio, direction, strength, explanation)
                .with_metadata(FeatureMetadata {
                    change_pct: Some(change_pct),
                    ..Default::default()
                }),
        )
    }
}

// =============================================================================
// Gold/oil ratio — flight-to-safety gauge
// =============================================================================

pub struct GoldOilRatio;

impl Feature for GoldOilRatio {
    fn name(&self) -> &'static str {
        "gold_oil_ratio"
    }

    fn category(&self) -> FeatureCategory {
        FeatureCategory::Intermarket
    }

    fn calculate(
        &self,
        candles: &[Candle],
        _symbol: &str,
        _timeframe: Timeframe,
        _market_type: MarketType,
        context: &ContextBundle,
    ) -> Result<FeatureResult> {
        let (Some(oil), Some(gold_price)) = (
            context.intermarket_series(intermarket_keys::CRUDE, 5),
            candles.last().map(|c| c.close),
        ) else {
            return Ok(FeatureResult::unavailable(
                self.name(),
                self.category(),
                "Oil data not available",
            ));
        };
        let oil_price = oil[oil.len() - 1];
        if oil_price == 0.0 {
            return Ok(FeatureResult::unavailable(
                self.name(),
                self.category(),
                "Oil price is zero",
            ));
        }

        let ratio = gold_price / oil_price;
        let ratio_history = paired_ratio_series(&closes(candles), oil);
        let change_pct = if ratio_history.len() >= 20 {
            let reference = ratio_history[ratio_history.len() - 20];
            if reference != 0.0 {
                (ratio - reference) / reference * 100.0
            } else {
                0.0
            }
        } else {
            0.0
        };

        let (direction, strength, explanation) = if ratio > 30.0 {
            (
                1,
                ((ratio - 30.0) / 10.0).min(1.0),
                format!("Gold/Oil ratio high at {ratio:.1} - strong safe haven demand"),
            )
        } else if ratio < 15.0 {
            (
                -1,
                ((15.0 - ratio) / 5.0).min(1.0),
                format!("Gold/Oil ratio low at {ratio:.1} - weak gold demand"),
            )
        } else if change_pct > 5.0 {
            (
                1,
                (change_pct / 10.0).min(1.0),
                format!("Gold/Oil ratio rising ({ratio:.1}, +{change_pct:.1}%) - risk-off"),
            )
        } else if change_pct < -5.0 {
            (
                -1,
                (change_pct.abs() / 10.0).min(1.0),
                format!("Gold/Oil ratio falling ({ratio:.1}, {change_pct:.1}%) - risk-on"),
            )
        } else {
            (0, 0.2, format!("Gold/Oil ratio normal at {ratio:.1}"))
        };

        Ok(
            FeatureResult::new(self.name(), self.category(), ratio, direction, strength, explanation)
                .with_metadata(FeatureMetadata {
                    change_pct: Some(change_pct),
                    ..Default::default()
                }),
        )
    }
}

// =============================================================================
// Miners/gold ratio (GDX vs GLD)
// =============================================================================

pub struct MinersGoldRatio;

impl Feature for MinersGoldRatio {
    fn name(&self) -> &'static str {
        "miners_gold_ratio"
    }

    fn category(&self) -> FeatureCategory {
        FeatureCategory::Intermarket
    }

    fn calculate(
        &self,
        candles: &[Candle],
        _symbol: &str,
        _timeframe: Timeframe,
        _market_type: MarketType,
        context: &ContextBundle,
    ) -> Result<FeatureResult> {
        let Some(gdx) = context.intermarket_series(intermarket_keys::GDX, 1) else {
            return Ok(FeatureResult::unavailable(
                self.name(),
                self.category(),
                "Miners data not available",
            ));
        };
        let gdx_price = gdx[gdx.len() - 1];

        // GLD series preferred; approximate from the gold price otherwise.
        let (gld_price, sma_20) = match context.intermarket_series(intermarket_keys::GLD, 1) {
            Some(gld) => {
                let price = gld[gld.len() - 1];
                let ratio_history = paired_ratio_series(gdx, gld);
                let sma_20 = if ratio_history.len() >= 20 {
                    mean(&ratio_history[ratio_history.len() - 20..])
                } else {
                    None
                };
                (price, sma_20)
            }
            None => {
                let Some(gold_price) = candles.last().map(|c| c.close) else {
                    return Ok(FeatureResult::unavailable(
                        self.name(),
                        self.category(),
                        "No gold price to approximate GLD",
                    ));
                };
                (gold_price / 10.0, None)
            }
        };

        self.evaluate(gdx_price, gld_price, sma_20)
    }
}

impl MinersGoldRatio {
    fn evaluate(&self, gdx_price: f64, gld_price: f64, sma_20: Option<f64>) -> Result<FeatureResult> {
        if gld_price == 0.0 {
            return Ok(FeatureResult::unavailable(
                self.name(),
                self.category(),
                "GLD price is zero",
            ));
        }
        let ratio = gdx_price / gld_price;
        let reference = sma_20.unwrap_or(ratio);

        let (direction, strength, explanation) = if reference != 0.0 && ratio > reference * 1.05 {
            (
                1,
                ((ratio / reference - 1.0) / 0.1).min(1.0),
                "Miners outperforming gold - bullish signal".to_string(),
            )
        } else if reference != 0.0 && ratio < reference * 0.95 {
            (
                -1,
                ((1.0 - ratio / reference) / 0.1).min(1.0),
                "Miners underperforming gold - bearish signal".to_string(),
            )
        } else {
            (0, 0.2, "Miners in line with gold".to_string())
        };

        Ok(FeatureResult::new(
            self.name(),
            self.category(),
            ratio,
            direction,
            strength,
            explanation,
        ))
    }
}

// =============================================================================
// GLD holdings flow
// =============================================================================

pub struct GldFlow;

impl Feature for GldFlow {
    fn name(&self) -> &'static str {
        "gld_flow"
    }

    fn category(&self) -> FeatureCategory {
        FeatureCategory::Intermarket
    }

    fn calculate(
        &self,
        _candles: &[Candle],
        _symbol: &str,
        _timeframe: Timeframe,
        _market_type: MarketType,
        context: &ContextBundle,
    ) -> Result<FeatureResult> {
        let Some(holdings) = context.intermarket_series(intermarket_keys::GLD_HOLDINGS, 5) else {
            return Ok(FeatureResult::unavailable(
                self.name(),
                self.category(),
                "GLD holdings data not available",
            ));
        };

        let current = holdings[holdings.len() - 1];
        let reference = holdings[holdings.len() - 5];
        if reference == 0.0 {
            return Ok(FeatureResult::unavailable(
                self.name(),
                self.category(),
                "GLD holdings reference is zero",
            ));
        }
        let change_pct = (current - reference) / reference * 100.0;

        let (direction, strength, explanation) = if change_pct > 0.5 {
            (
                1,
                (change_pct.abs() / 2.0).min(1.0),
                format!("GLD holdings rising {change_pct:.2}% - institutional buying"),
            )
        } else if change_pct < -0.5 {
            (
                -1,
                (change_pct.abs() / 2.0).min(1.0),
                format!("GLD holdings falling {change_pct:.2}% - institutional selling"),
            )
        } else {
            (0, 0.2, format!("GLD holdings stable ({change_pct:+.2}%)"))
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
// BTC dominance
// =============================================================================

pub struct BtcDominance;

impl Feature for BtcDominance {
    fn name(&self) -> &'static str {
        "btc_dominance"
    }

    fn category(&self) -> FeatureCategory {
        FeatureCategory::Intermarket
    }

    fn calculate(
        &self,
        _candles: &[Candle],
        symbol: &str,
        _timeframe: Timeframe,
        _market_type: MarketType,
        context: &ContextBundle,
    ) -> Result<FeatureResult> {
        let Some(dominance) = context.intermarket_series(intermarket_keys::BTC_DOMINANCE, 5) else {
            return Ok(FeatureResult::unavailable(
                self.name(),
                self.category(),
                "BTC dominance data not available",
            ));
        };

        let current = dominance[dominance.len() - 1];
        let change = current - dominance[dominance.len() - 5];
        let is_btc = symbol.to_uppercase().contains("BTC");

        let (direction, strength, explanation) = if change > 1.0 {
            (
                if is_btc { 1 } else { -1 },
                (change.abs() / 3.0).min(1.0),
                format!("BTC dominance rising to {current:.1}%"),
            )
        } else if change < -1.0 {
            (
                if is_btc { -1 } else { 1 },
                (change.abs() / 3.0).min(1.0),
                format!("BTC dominance falling to {current:.1}%"),
            )
        } else {
            (0, 0.2, format!("BTC dominance stable at {current:.1}%"))
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
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn gold_candles(price: f64, n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| Candle::new(i as i64, price, price + 1.0, price - 1.0, price, 10.0))
            .collect()
    }

    fn run(feature: &dyn Feature, candles: &[Candle], ctx: &ContextBundle) -> FeatureResult {
        feature
            .calculate(candles, "XAUUSD", Timeframe::D1, MarketType::Spot, ctx)
            .unwrap()
    }

    #[test]
    fn all_intermarket_features_neutral_without_context() {
        let ctx = ContextBundle::default();
        let candles = gold_candles(2000.0, 30);
        let features: Vec<Box<dyn Feature>> = vec![
            Box::new(GoldSilverRatio),
            Box::new(CopperGoldRatio),
            Box::new(GoldOilRatio),
            Box::new(MinersGoldRatio),
            Box::new(GldFlow),
            Box::new(BtcDominance),
        ];
        for f in &features {
            let r = run(f.as_ref(), &candles, &ctx);
            assert_eq!(r.direction, 0, "{} should be neutral", f.name());
            assert_eq!(r.strength, 0.0);
        }
    }

    #[test]
    fn extreme_gold_silver_ratio_reads_bearish() {
        let mut ctx = ContextBundle::default();
        ctx.intermarket
            .insert(intermarket_keys::SILVER.to_string(), vec![20.0; 10]);
        let candles = gold_candles(1900.0, 10); // ratio 95
        let r = run(&GoldSilverRatio, &candles, &ctx);
        assert_eq!(r.direction, -1);
        assert!((r.raw_value - 95.0).abs() < 1e-9);
    }

    #[test]
    fn copper_rally_reads_risk_on() {
        let mut ctx = ContextBundle::default();
        let mut copper = vec![4.0; 20];
        copper.extend(vec![4.5; 10]);
        ctx.intermarket
            .insert(intermarket_keys::COPPER.to_string(), copper);
        let candles = gold_candles(2000.0, 30);
        let r = run(&CopperGoldRatio, &candles, &ctx);
        assert_eq!(r.direction, -1);
        assert!(r.metadata.change_pct.unwrap() > 2.0);
    }

    #[test]
    fn high_gold_oil_ratio_reads_safe_haven() {
        let mut ctx = ContextBundle::default();
        ctx.intermarket
            .insert(intermarket_keys::CRUDE.to_string(), vec![55.0; 10]);
        let candles = gold_candles(1925.0, 10); // ratio 35
        let r = run(&GoldOilRatio, &candles, &ctx);
        assert_eq!(r.direction, 1);
    }

    #[test]
    fn miners_outperformance_reads_bullish() {
        let mut ctx = ContextBundle::default();
        let mut gdx = vec![30.0; 25];
        gdx.push(33.0);
        ctx.intermarket.insert(intermarket_keys::GDX.to_string(), gdx);
        ctx.intermarket
            .insert(intermarket_keys::GLD.to_string(), vec![180.0; 26]);
        let candles = gold_candles(2000.0, 10);
        let r = run(&MinersGoldRatio, &candles, &ctx);
        assert_eq!(r.direction, 1);
    }

    #[test]
    fn gld_inflows_read_bullish() {
        let mut ctx = ContextBundle::default();
        ctx.intermarket.insert(
            intermarket_keys::GLD_HOLDINGS.to_string(),
            vec![900.0, 902.0, 905.0, 908.0, 912.0],
        );
        let candles = gold_candles(2000.0, 10);
        let r = run(&GldFlow, &candles, &ctx);
        assert_eq!(r.direction, 1);
    }

    #[test]
    fn rising_dominance_flips_sign_by_symbol() {
        let mut ctx = ContextBundle::default();
        ctx.intermarket.insert(
            intermarket_keys::BTC_DOMINANCE.to_string(),
            vec![50.0, 50.5, 51.0, 51.5, 52.0],
        );
        let candles = gold_candles(60000.0, 10);

        let r = BtcDominance
            .calculate(&candles, "BTCUSDT", Timeframe::D1, MarketType::Spot, &ctx)
            .unwrap();
        assert_eq!(r.direction, 1);

        let r = BtcDominance
            .calculate(&candles, "ETHUSDT", Timeframe::D1, MarketType::Spot, &ctx)
            .unwrap();
        assert_eq!(r.direction, -1);
    }
}
