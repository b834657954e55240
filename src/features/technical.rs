// =============================================================================
// Technical Features — oscillators, trend structure, momentum
// =============================================================================
//
// Each calculator wraps one indicator from `crate::indicators` and applies
// the shared normalisation rules from the parent module.  All of them degrade
// to a neutral result on insufficient history.

use anyhow::Result;

use crate::context::ContextBundle;
use crate::features::{
    adx_signal, ma_cross_signal, macd_signal, percent_b_signal, rsi_signal, Feature,
    FeatureCategory, FeatureMetadata, FeatureResult,
};
use crate::indicators::adx::calculate_adx;
use crate::indicators::bollinger::calculate_bollinger;
use crate::indicators::ema::{ema_series, sma_series};
use crate::indicators::macd::calculate_macd;
use crate::indicators::roc::average_roc;
use crate::indicators::rsi::current_rsi;
use crate::indicators::stochastic::calculate_stochastic;
use crate::indicators::supertrend::calculate_supertrend;
use crate::market_data::{closes, Candle, MarketType, Timeframe};

// =============================================================================
// RSI
// =============================================================================

pub struct Rsi {
    period: usize,
}

impl Default for Rsi {
    fn default() -> Self {
        Self { period: 14 }
    }
}

impl Feature for Rsi {
    fn name(&self) -> &'static str {
        "rsi"
    }

    fn category(&self) -> FeatureCategory {
        FeatureCategory::Technical
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
        let Some(rsi) = current_rsi(&closes, self.period) else {
            return Ok(FeatureResult::unavailable(
                self.name(),
                self.category(),
                format!("RSI needs at least {} closes", self.period + 1),
            ));
        };

        let (direction, strength) = rsi_signal(rsi);
        let explanation = if rsi >= 70.0 {
            format!("RSI at {rsi:.2} - overbought, bearish signal")
        } else if rsi <= 30.0 {
            format!("RSI at {rsi:.2} - oversold, bullish signal")
        } else {
            format!("RSI at {rsi:.2} - neutral zone")
        };

        Ok(
            FeatureResult::new(self.name(), self.category(), rsi, direction, strength, explanation)
                .with_metadata(FeatureMetadata {
                    period: Some(self.period as u32),
                    ..Default::default()
                }),
        )
    }
}

// =============================================================================
// MACD
// =============================================================================

pub struct Macd {
    fast: usize,
    slow: usize,
    signal: usize,
}

impl Default for Macd {
    fn default() -> Self {
        Self {
            fast: 12,
            slow: 26,
            signal: 9,
        }
    }
}

impl Feature for Macd {
    fn name(&self) -> &'static str {
        "macd"
    }

    fn category(&self) -> FeatureCategory {
        FeatureCategory::Technical
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
        let Some(macd) = calculate_macd(&closes, self.fast, self.slow, self.signal) else {
            return Ok(FeatureResult::unavailable(
                self.name(),
                self.category(),
                "MACD needs more history than provided",
            ));
        };

        let (direction, strength) = macd_signal(
            macd.macd_line,
            macd.signal_line,
            macd.histogram,
            macd.prev_histogram,
        );

        let crossed_up = macd.prev_histogram <= 0.0 && macd.histogram > 0.0;
        let crossed_down = macd.prev_histogram >= 0.0 && macd.histogram < 0.0;
        let explanation = if crossed_up {
            "MACD crossed above signal - bullish".to_string()
        } else if crossed_down {
            "MACD crossed below signal - bearish".to_string()
        } else {
            format!("MACD histogram: {:.4}", macd.histogram)
        };

        Ok(FeatureResult::new(
            self.name(),
            self.category(),
            macd.histogram,
            direction,
            strength,
            explanation,
        ))
    }
}

// =============================================================================
// Stochastic
// =============================================================================

pub struct Stochastic {
    k_period: usize,
    d_period: usize,
}

impl Default for Stochastic {
    fn default() -> Self {
        Self {
            k_period: 14,
            d_period: 3,
        }
    }
}

impl Feature for Stochastic {
    fn name(&self) -> &'static str {
        "stochastic"
    }

    fn category(&self) -> FeatureCategory {
        FeatureCategory::Technical
    }

    fn calculate(
        &self,
        candles: &[Candle],
        _symbol: &str,
        _timeframe: Timeframe,
        _market_type: MarketType,
        _context: &ContextBundle,
    ) -> Result<FeatureResult> {
        let Some(stoch) = calculate_stochastic(candles, self.k_period, self.d_period) else {
            return Ok(FeatureResult::unavailable(
                self.name(),
                self.category(),
                "Stochastic needs more history than provided",
            ));
        };

        let (direction, strength, explanation) = if stoch.k >= 80.0 {
            (
                -1,
                ((stoch.k - 80.0) / 20.0).min(1.0),
                format!("Stochastic %K at {:.2} - overbought", stoch.k),
            )
        } else if stoch.k <= 20.0 {
            (
                1,
                ((20.0 - stoch.k) / 20.0).min(1.0),
                format!("Stochastic %K at {:.2} - oversold", stoch.k),
            )
        } else if stoch.k > stoch.d {
            (1, 0.3, "Stochastic %K above %D - mildly bullish".to_string())
        } else {
            (-1, 0.3, "Stochastic %K below %D - mildly bearish".to_string())
        };

        Ok(
            FeatureResult::new(self.name(), self.category(), stoch.k, direction, strength, explanation)
                .with_metadata(FeatureMetadata {
                    stoch_k: Some(stoch.k),
                    stoch_d: Some(stoch.d),
                    ..Default::default()
                }),
        )
    }
}

// =============================================================================
// Bollinger %B
// =============================================================================

pub struct BollingerPosition {
    period: usize,
    num_std: f64,
}

impl Default for BollingerPosition {
    fn default() -> Self {
        Self {
            period: 20,
            num_std: 2.0,
        }
    }
}

impl Feature for BollingerPosition {
    fn name(&self) -> &'static str {
        "bollinger"
    }

    fn category(&self) -> FeatureCategory {
        FeatureCategory::Technical
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
        let Some(bb) = calculate_bollinger(&closes, self.period, self.num_std) else {
            return Ok(FeatureResult::unavailable(
                self.name(),
                self.category(),
                format!("Bollinger needs at least {} closes", self.period),
            ));
        };

        let (direction, strength) = percent_b_signal(bb.percent_b);
        let explanation = if bb.percent_b > 1.0 {
            format!("Price above upper band (%B={:.2}) - bearish", bb.percent_b)
        } else if bb.percent_b < 0.0 {
            format!("Price below lower band (%B={:.2}) - bullish", bb.percent_b)
        } else {
            format!("Price within bands (%B={:.2})", bb.percent_b)
        };

        Ok(FeatureResult::new(
            self.name(),
            self.category(),
            bb.percent_b,
            direction,
            strength,
            explanation,
        )
        .with_metadata(FeatureMetadata {
            upper_band: Some(bb.upper),
            middle_band: Some(bb.middle),
            lower_band: Some(bb.lower),
            ..Default::default()
        }))
    }
}

// =============================================================================
// ADX / DI
// =============================================================================

pub struct Adx {
    period: usize,
}

impl Default for Adx {
    fn default() -> Self {
        Self { period: 14 }
    }
}

impl Feature for Adx {
    fn name(&self) -> &'static str {
        "adx"
    }

    fn category(&self) -> FeatureCategory {
        FeatureCategory::Technical
    }

    fn calculate(
        &self,
        candles: &[Candle],
        _symbol: &str,
        _timeframe: Timeframe,
        _market_type: MarketType,
        _context: &ContextBundle,
    ) -> Result<FeatureResult> {
        let Some(adx) = calculate_adx(candles, self.period) else {
            return Ok(FeatureResult::unavailable(
                self.name(),
                self.category(),
                format!("ADX needs at least {} candles", 2 * self.period + 1),
            ));
        };

        let (direction, strength) = adx_signal(adx.adx, adx.plus_di, adx.minus_di);
        let trend_dir = if adx.plus_di > adx.minus_di { "up" } else { "down" };
        let explanation = if adx.adx < 18.0 {
            format!("ADX at {:.2} - no clear trend", adx.adx)
        } else if adx.adx >= 40.0 {
            format!("ADX at {:.2} - strong {trend_dir}trend", adx.adx)
        } else {
            format!("ADX at {:.2} - developing {trend_dir}trend", adx.adx)
        };

        Ok(
            FeatureResult::new(self.name(), self.category(), adx.adx, direction, strength, explanation)
                .with_metadata(FeatureMetadata {
                    period: Some(self.period as u32),
                    plus_di: Some(adx.plus_di),
                    minus_di: Some(adx.minus_di),
                    ..Default::default()
                }),
        )
    }
}

// =============================================================================
// EMA cross (20/50)
// =============================================================================

pub struct EmaCross {
    fast: usize,
    slow: usize,
}

impl Default for EmaCross {
    fn default() -> Self {
        Self { fast: 20, slow: 50 }
    }
}

impl Feature for EmaCross {
    fn name(&self) -> &'static str {
        "ema_cross"
    }

    fn category(&self) -> FeatureCategory {
        FeatureCategory::Technical
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
        let fast = ema_series(&closes, self.fast);
        let slow = ema_series(&closes, self.slow);
        if fast.len() < 2 || slow.len() < 2 {
            return Ok(FeatureResult::unavailable(
                self.name(),
                self.category(),
                format!("EMA cross needs at least {} closes", self.slow + 1),
            ));
        }

        let price = *closes.last().unwrap_or(&0.0);
        let (cur_fast, prev_fast) = (fast[fast.len() - 1], fast[fast.len() - 2]);
        let (cur_slow, prev_slow) = (slow[slow.len() - 1], slow[slow.len() - 2]);

        let (direction, strength) = ma_cross_signal(cur_fast, cur_slow, price, prev_fast, prev_slow);

        let explanation = match direction {
            1 => format!(
                "EMA{} above EMA{}, price above both - bullish",
                self.fast, self.slow
            ),
            -1 => format!(
                "EMA{} below EMA{}, price below both - bearish",
                self.fast, self.slow
            ),
            _ => "Mixed EMA signals".to_string(),
        };

        Ok(FeatureResult::new(
            self.name(),
            self.category(),
            cur_fast - cur_slow,
            direction,
            strength,
            explanation,
        )
        .with_metadata(FeatureMetadata {
            ema_fast: Some(cur_fast),
            ema_slow: Some(cur_slow),
            ..Default::default()
        }))
    }
}

// =============================================================================
// SMA distance (20)
// =============================================================================

pub struct SmaDistance {
    period: usize,
}

impl Default for SmaDistance {
    fn default() -> Self {
        Self { period: 20 }
    }
}

impl Feature for SmaDistance {
    fn name(&self) -> &'static str {
        "sma20"
    }

    fn category(&self) -> FeatureCategory {
        FeatureCategory::Technical
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
        let sma = sma_series(&closes, self.period);
        let (Some(&price), Some(&sma_value)) = (closes.last(), sma.last()) else {
            return Ok(FeatureResult::unavailable(
                self.name(),
                self.category(),
                format!("SMA needs at least {} closes", self.period),
            ));
        };
        if sma_value == 0.0 {
            return Ok(FeatureResult::unavailable(
                self.name(),
                self.category(),
                "SMA collapsed to zero",
            ));
        }

        let distance_pct = (price - sma_value) / sma_value * 100.0;

        let (direction, strength, explanation) = if distance_pct > 2.0 {
            (
                1,
                (distance_pct.abs() / 5.0).min(1.0),
                format!("Price {distance_pct:.2}% above SMA({}) - bullish", self.period),
            )
        } else if distance_pct < -2.0 {
            (
                -1,
                (distance_pct.abs() / 5.0).min(1.0),
                format!("Price {distance_pct:.2}% below SMA({}) - bearish", self.period),
            )
        } else {
            (0, 0.3, format!("Price near SMA({})", self.period))
        };

        Ok(
            FeatureResult::new(self.name(), self.category(), sma_value, direction, strength, explanation)
                .with_metadata(FeatureMetadata {
                    period: Some(self.period as u32),
                    distance_pct: Some(distance_pct),
                    ..Default::default()
                }),
        )
    }
}

// =============================================================================
// MA crossover (50/200 golden / death cross)
// =============================================================================

pub struct MaCrossover {
    fast: usize,
    slow: usize,
}

impl Default for MaCrossover {
    fn default() -> Self {
        Self {
            fast: 50,
            slow: 200,
        }
    }
}

impl Feature for MaCrossover {
    fn name(&self) -> &'static str {
        "ma_cross"
    }

    fn category(&self) -> FeatureCategory {
        FeatureCategory::Technical
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
        if closes.len() < self.slow + 1 {
            return Ok(FeatureResult::unavailable(
                self.name(),
                self.category(),
                "Insufficient data for MA crossover",
            ));
        }

        let fast = sma_series(&closes, self.fast);
        let slow = sma_series(&closes, self.slow);
        let (cur_fast, prev_fast) = (fast[fast.len() - 1], fast[fast.len() - 2]);
        let (cur_slow, prev_slow) = (slow[slow.len() - 1], slow[slow.len() - 2]);
        if cur_slow == 0.0 {
            return Ok(FeatureResult::unavailable(
                self.name(),
                self.category(),
                "Slow MA collapsed to zero",
            ));
        }

        let distance_pct = (cur_fast - cur_slow) / cur_slow * 100.0;
        let golden_cross = prev_fast <= prev_slow && cur_fast > cur_slow;
        let death_cross = prev_fast >= prev_slow && cur_fast < cur_slow;

        let (direction, strength, explanation) = if golden_cross {
            (
                1,
                1.0,
                format!(
                    "Golden Cross! MA{} crossed above MA{} - strong bullish",
                    self.fast, self.slow
                ),
            )
        } else if death_cross {
            (
                -1,
                1.0,
                format!(
                    "Death Cross! MA{} crossed below MA{} - strong bearish",
                    self.fast, self.slow
                ),
            )
        } else if cur_fast > cur_slow {
            (
                1,
                (distance_pct.abs() / 5.0).min(1.0),
                format!(
                    "MA{} above MA{} ({distance_pct:+.2}%) - bullish",
                    self.fast, self.slow
                ),
            )
        } else if cur_fast < cur_slow {
            (
                -1,
                (distance_pct.abs() / 5.0).min(1.0),
                format!(
                    "MA{} below MA{} ({distance_pct:+.2}%) - bearish",
                    self.fast, self.slow
                ),
            )
        } else {
            (0, 0.2, "MAs aligned".to_string())
        };

        Ok(
            FeatureResult::new(self.name(), self.category(), distance_pct, direction, strength, explanation)
                .with_metadata(FeatureMetadata {
                    golden_cross: Some(golden_cross),
                    death_cross: Some(death_cross),
                    ..Default::default()
                }),
        )
    }
}

// =============================================================================
// Price momentum (multi-period ROC)
// =============================================================================

pub struct PriceMomentum {
    periods: [usize; 3],
}

impl Default for PriceMomentum {
    fn default() -> Self {
        Self {
            periods: [5, 10, 20],
        }
    }
}

impl Feature for PriceMomentum {
    fn name(&self) -> &'static str {
        "momentum"
    }

    fn category(&self) -> FeatureCategory {
        FeatureCategory::Technical
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
        let Some(avg) = average_roc(&closes, &self.periods) else {
            return Ok(FeatureResult::unavailable(
                self.name(),
                self.category(),
                "Insufficient data for momentum",
            ));
        };

        let (direction, strength, explanation) = if avg > 2.0 {
            (
                1,
                (avg.abs() / 10.0).min(1.0),
                format!("Strong upward momentum (+{avg:.2}%)"),
            )
        } else if avg < -2.0 {
            (
                -1,
                (avg.abs() / 10.0).min(1.0),
                format!("Strong downward momentum ({avg:.2}%)"),
            )
        } else {
            (0, 0.3, format!("Weak momentum ({avg:+.2}%)"))
        };

        Ok(FeatureResult::new(
            self.name(),
            self.category(),
            avg,
            direction,
            strength,
            explanation,
        ))
    }
}

// =============================================================================
// Supertrend
// =============================================================================

pub struct Supertrend {
    period: usize,
    multiplier: f64,
}

impl Default for Supertrend {
    fn default() -> Self {
        Self {
            period: 10,
            multiplier: 3.0,
        }
    }
}

impl Feature for Supertrend {
    fn name(&self) -> &'static str {
        "supertrend"
    }

    fn category(&self) -> FeatureCategory {
        FeatureCategory::Technical
    }

    fn calculate(
        &self,
        candles: &[Candle],
        _symbol: &str,
        _timeframe: Timeframe,
        _market_type: MarketType,
        _context: &ContextBundle,
    ) -> Result<FeatureResult> {
        let Some(st) = calculate_supertrend(candles, self.period, self.multiplier) else {
            return Ok(FeatureResult::unavailable(
                self.name(),
                self.category(),
                "Supertrend state not established",
            ));
        };
        let Some(price) = candles.last().map(|c| c.close).filter(|p| *p != 0.0) else {
            return Ok(FeatureResult::unavailable(
                self.name(),
                self.category(),
                "No closing price available",
            ));
        };

        let distance_pct = (price - st.line).abs() / price * 100.0;
        let strength = (distance_pct / 5.0).min(1.0);

        let explanation = match st.direction {
            1 => format!("Supertrend bullish - price above {:.2}", st.line),
            -1 => format!("Supertrend bearish - price below {:.2}", st.line),
            _ => "Supertrend neutral".to_string(),
        };

        Ok(FeatureResult::new(
            self.name(),
            self.category(),
            st.line,
            st.direction,
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

    fn ctx() -> ContextBundle {
        ContextBundle::default()
    }

    /// Steady uptrend candles: +1 per bar with a 2-point range.
    fn uptrend(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let base = 100.0 + i as f64;
                Candle::new(i as i64, base, base + 1.0, base - 1.0, base + 0.5, 100.0)
            })
            .collect()
    }

    fn run(feature: &dyn Feature, candles: &[Candle]) -> FeatureResult {
        feature
            .calculate(candles, "XAUUSD", Timeframe::H1, MarketType::Spot, &ctx())
            .unwrap()
    }

    #[test]
    fn all_technical_features_degrade_on_short_history() {
        let candles = uptrend(3);
        let features: Vec<Box<dyn Feature>> = vec![
            Box::new(Rsi::default()),
            Box::new(Macd::default()),
            Box::new(Stochastic::default()),
            Box::new(BollingerPosition::default()),
            Box::new(Adx::default()),
            Box::new(EmaCross::default()),
            Box::new(MaCrossover::default()),
            Box::new(Supertrend::default()),
        ];
        for f in &features {
            let r = run(f.as_ref(), &candles);
            assert_eq!(r.direction, 0, "{} should be neutral", f.name());
            assert_eq!(r.strength, 0.0, "{} should be zero strength", f.name());
        }
    }

    #[test]
    fn rsi_uptrend_reads_overbought() {
        let r = run(&Rsi::default(), &uptrend(60));
        assert!(r.raw_value > 70.0);
        assert_eq!(r.direction, -1);
        assert!(r.explanation.contains("overbought"));
    }

    #[test]
    fn adx_uptrend_is_bullish_with_di_metadata() {
        let candles: Vec<Candle> = (0..60)
            .map(|i| {
                let base = 100.0 + i as f64 * 2.0;
                Candle::new(i as i64, base, base + 1.5, base - 0.5, base + 1.0, 100.0)
            })
            .collect();
        let r = run(&Adx::default(), &candles);
        assert_eq!(r.direction, 1);
        assert!(r.strength > 0.0);
        assert!(r.metadata.plus_di.unwrap() > r.metadata.minus_di.unwrap());
    }

    #[test]
    fn ema_cross_uptrend_is_bullish() {
        let r = run(&EmaCross::default(), &uptrend(120));
        assert_eq!(r.direction, 1);
        assert!(r.metadata.ema_fast.unwrap() > r.metadata.ema_slow.unwrap());
    }

    #[test]
    fn ma_crossover_uptrend_is_bullish_without_fresh_cross() {
        let r = run(&MaCrossover::default(), &uptrend(260));
        assert_eq!(r.direction, 1);
        assert_eq!(r.metadata.golden_cross, Some(false));
    }

    #[test]
    fn momentum_uptrend_is_bullish() {
        let r = run(&PriceMomentum::default(), &uptrend(40));
        assert_eq!(r.direction, 1);
        assert!(r.raw_value > 2.0);
    }

    #[test]
    fn sma_distance_flat_market_is_neutral() {
        let candles: Vec<Candle> =
            (0..40).map(|i| Candle::new(i, 100.0, 100.5, 99.5, 100.0, 50.0)).collect();
        let r = run(&SmaDistance::default(), &candles);
        assert_eq!(r.direction, 0);
        assert!((r.strength - 0.3).abs() < 1e-12);
    }

    #[test]
    fn supertrend_uptrend_is_bullish() {
        let candles: Vec<Candle> = (0..80)
            .map(|i| {
                let base = 100.0 + i as f64 * 3.0;
                Candle::new(i as i64, base, base + 1.0, base - 1.0, base + 0.8, 100.0)
            })
            .collect();
        let r = run(&Supertrend::default(), &candles);
        assert_eq!(r.direction, 1);
    }

    #[test]
    fn stochastic_uptrend_reads_overbought() {
        let candles: Vec<Candle> = (0..30)
            .map(|i| {
                let base = 100.0 + i as f64;
                Candle::new(i as i64, base, base, base - 2.0, base, 100.0)
            })
            .collect();
        let r = run(&Stochastic::default(), &candles);
        assert_eq!(r.direction, -1);
        assert!(r.metadata.stoch_k.unwrap() >= 80.0);
    }
}
