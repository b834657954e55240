// =============================================================================
// Layer-2 Rules — regime filters, conflict resolution, signal mapping
// =============================================================================
//
// Regime is classified along two independent axes:
//
//   trend       — ADX raw value: < 18 RANGING, 18-30 DEVELOPING, >= 30 TRENDING
//   volatility  — ATR percentile: > 0.8 HIGH, < 0.2 LOW, otherwise NORMAL
//   squeeze     — Bollinger band-width compression flag
//
// Filters are multiplicative and applied in a fixed order (they may stack):
//   RANGING x0.6, HIGH volatility x0.8, squeeze x0.5.
//
// Conflict resolution:
//   - Technical and macro sub-scores both beyond magnitude 2 with opposite
//     signs dampen the score x0.7 (TECH_MACRO_DIVERGENCE).
//   - On derivatives venues a funding contribution opposing the score beyond
//     0.5 magnitude is treated as contrarian confirmation and boosts x1.2.
//
// Score thresholds: > 4 STRONG_BUY, > 2 BUY, > 0.5 WEAK_BUY, > -0.5 NEUTRAL,
// > -2 WEAK_SELL, > -4 SELL, else STRONG_SELL.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::scorer::Contribution;
use crate::engine::{Bias, Signal, TradeParams};
use crate::features::{FeatureCategory, FeatureResult};
use crate::indicators::atr::current_atr;
use crate::market_data::{Candle, MarketType};

// =============================================================================
// Regime types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrendRegime {
    Ranging,
    Developing,
    Trending,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrendStrength {
    Weak,
    Moderate,
    Strong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VolatilityRegime {
    Low,
    Normal,
    High,
}

/// Typed regime snapshot carried on every decision.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RegimeContext {
    pub trend: TrendRegime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trend_strength: Option<TrendStrength>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volatility: Option<VolatilityRegime>,
    pub squeeze: bool,
    /// Names of the multiplicative filters applied, in application order.
    pub filters_applied: Vec<String>,
    /// Conflict flag set by the dampening rule, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict: Option<String>,
    /// Set when extreme opposing funding was read as contrarian confirmation.
    pub funding_confirmation: bool,
}

/// Result of applying the rule layer to a raw score.
#[derive(Debug, Clone, PartialEq)]
pub struct RulesOutcome {
    pub signal: Signal,
    pub bias: Bias,
    pub confidence: u8,
    pub adjusted_score: f64,
    pub regime: RegimeContext,
}

// =============================================================================
// Layer2Rules
// =============================================================================

pub struct Layer2Rules<'a> {
    market_type: MarketType,
    features: &'a [FeatureResult],
    contributions: &'a [Contribution],
}

impl<'a> Layer2Rules<'a> {
    pub fn new(
        market_type: MarketType,
        features: &'a [FeatureResult],
        contributions: &'a [Contribution],
    ) -> Self {
        Self {
            market_type,
            features,
            contributions,
        }
    }

    /// Refine the raw score into signal, bias and confidence.
    pub fn apply(&self, raw_score: f64) -> RulesOutcome {
        let mut regime = self.classify_regime();
        let filtered = self.apply_filters(raw_score, &mut regime);
        let adjusted = self.resolve_conflicts(filtered, &mut regime);

        let (signal, bias) = score_to_signal(adjusted);
        let confidence = self.confidence(adjusted, signal, &regime);

        debug!(
            raw = format!("{raw_score:.3}"),
            adjusted = format!("{adjusted:.3}"),
            signal = %signal,
            confidence,
            trend = ?regime.trend,
            "rules applied"
        );

        RulesOutcome {
            signal,
            bias,
            confidence,
            adjusted_score: adjusted,
            regime,
        }
    }

    fn feature(&self, name: &str) -> Option<&FeatureResult> {
        self.features.iter().find(|f| f.name == name)
    }

    fn classify_regime(&self) -> RegimeContext {
        let mut regime = RegimeContext::default();

        if let Some(adx) = self.feature("adx") {
            let value = adx.raw_value;
            if value < 18.0 {
                regime.trend = TrendRegime::Ranging;
                regime.trend_strength = Some(TrendStrength::Weak);
            } else if value < 30.0 {
                regime.trend = TrendRegime::Developing;
                regime.trend_strength = Some(TrendStrength::Moderate);
            } else {
                regime.trend = TrendRegime::Trending;
                regime.trend_strength = Some(TrendStrength::Strong);
            }
        }

        if let Some(percentile) = self.feature("atr").and_then(|f| f.metadata.percentile) {
            regime.volatility = Some(if percentile > 0.8 {
                VolatilityRegime::High
            } else if percentile < 0.2 {
                VolatilityRegime::Low
            } else {
                VolatilityRegime::Normal
            });
        }

        regime.squeeze = self
            .feature("bb_width")
            .and_then(|f| f.metadata.is_squeeze)
            .unwrap_or(false);

        regime
    }

    /// Multiplicative regime filters, fixed order, stacking allowed.
    fn apply_filters(&self, raw_score: f64, regime: &mut RegimeContext) -> f64 {
        let mut score = raw_score;

        // Mean reversion beats trend-following when nothing is trending.
        if regime.trend == TrendRegime::Ranging {
            score *= 0.6;
            regime.filters_applied.push("ADX_LOW_REDUCED_TREND".to_string());
        }

        if regime.volatility == Some(VolatilityRegime::High) {
            score *= 0.8;
            regime.filters_applied.push("HIGH_VOL_CAUTION".to_string());
        }

        if regime.squeeze {
            score *= 0.5;
            regime.filters_applied.push("BB_SQUEEZE_WAIT".to_string());
        }

        score
    }

    fn category_score(&self, category: FeatureCategory) -> f64 {
        self.contributions
            .iter()
            .filter(|c| c.category == category)
            .map(|c| c.contribution)
            .sum()
    }

    fn resolve_conflicts(&self, score: f64, regime: &mut RegimeContext) -> f64 {
        let mut adjusted = score;

        let tech = self.category_score(FeatureCategory::Technical);
        let macro_score = self.category_score(FeatureCategory::Macro);
        if tech.abs() > 2.0 && macro_score.abs() > 2.0 && tech.signum() != macro_score.signum() {
            adjusted *= 0.7;
            regime.conflict = Some("TECH_MACRO_DIVERGENCE".to_string());
        }

        // On derivatives venues, funding crowded against the signal is read
        // as contrarian confirmation rather than contradiction.  This boost
        // is a policy choice carried over from the original system.
        if self.market_type.is_derivatives() {
            let funding = self
                .contributions
                .iter()
                .find(|c| c.name == "funding_rate")
                .map(|c| c.contribution);
            if let Some(funding) = funding {
                if (adjusted > 0.0 && funding < -0.5) || (adjusted < 0.0 && funding > 0.5) {
                    adjusted *= 1.2;
                    regime.funding_confirmation = true;
                }
            }
        }

        adjusted
    }

    fn confidence(&self, adjusted_score: f64, signal: Signal, regime: &RegimeContext) -> u8 {
        let mut confidence = (adjusted_score.abs() / 10.0 * 100.0).min(100.0);

        if regime.trend == TrendRegime::Ranging && signal != Signal::Neutral {
            confidence *= 0.7;
        }
        if regime.conflict.is_some() {
            confidence *= 0.8;
        }

        confidence.clamp(0.0, 100.0) as u8
    }
}

/// Fixed score thresholds; bias follows the same buckets.
pub fn score_to_signal(score: f64) -> (Signal, Bias) {
    if score > 4.0 {
        (Signal::StrongBuy, Bias::Bullish)
    } else if score > 2.0 {
        (Signal::Buy, Bias::Bullish)
    } else if score > 0.5 {
        (Signal::WeakBuy, Bias::Bullish)
    } else if score > -0.5 {
        (Signal::Neutral, Bias::Neutral)
    } else if score > -2.0 {
        (Signal::WeakSell, Bias::Bearish)
    } else if score > -4.0 {
        (Signal::Sell, Bias::Bearish)
    } else {
        (Signal::StrongSell, Bias::Bearish)
    }
}

// =============================================================================
// Trade parameters
// =============================================================================

/// ATR-sized stop and confidence-scaled target.  `None` for neutral signals
/// or when the ATR cannot be computed.
pub fn trade_parameters(
    candles: &[Candle],
    signal: Signal,
    confidence: u8,
    regime: &RegimeContext,
) -> Option<TradeParams> {
    if !signal.is_actionable() {
        return None;
    }

    let atr = current_atr(candles, 14)?;
    let entry = candles.last()?.close;

    let stop_multiplier = if regime.volatility == Some(VolatilityRegime::High) {
        2.5
    } else {
        2.0
    };

    let risk_reward = if confidence > 80 {
        3.0
    } else if confidence > 60 {
        2.5
    } else {
        2.0
    };

    let (stop_loss, take_profit) = if signal.is_long() {
        let stop = entry - atr * stop_multiplier;
        let risk = entry - stop;
        (stop, entry + risk * risk_reward)
    } else {
        let stop = entry + atr * stop_multiplier;
        let risk = stop - entry;
        (stop, entry - risk * risk_reward)
    };

    Some(TradeParams {
        entry,
        stop_loss,
        take_profit,
        risk_reward,
    })
}

// =============================================================================
// Invalidation conditions
// =============================================================================

/// Direction-specific textual rules describing what would void the signal.
/// Purely descriptive: nothing re-evaluates them automatically.
pub fn invalidation_conditions(
    features: &[FeatureResult],
    signal: Signal,
    regime: &RegimeContext,
) -> Vec<String> {
    let mut conditions = Vec::new();
    let feature = |name: &str| features.iter().find(|f| f.name == name);

    if signal.is_long() {
        if let Some(ema_slow) = feature("ema_cross").and_then(|f| f.metadata.ema_slow) {
            conditions.push(format!("Close below EMA50 ({ema_slow:.2})"));
        }
        if matches!(
            regime.trend_strength,
            Some(TrendStrength::Strong) | Some(TrendStrength::Moderate)
        ) {
            conditions.push("ADX drops below 18 (trend failure)".to_string());
        }
        if feature("dxy").map(|f| f.direction) == Some(1) {
            conditions.push("DXY breaks above recent high (bearish for gold/crypto)".to_string());
        }
    } else if signal.is_short() {
        if let Some(ema_slow) = feature("ema_cross").and_then(|f| f.metadata.ema_slow) {
            conditions.push(format!("Close above EMA50 ({ema_slow:.2})"));
        }
        if matches!(
            regime.trend_strength,
            Some(TrendStrength::Strong) | Some(TrendStrength::Moderate)
        ) {
            conditions.push("ADX drops below 18 (trend failure)".to_string());
        }
        if feature("dxy").map(|f| f.direction) == Some(-1) {
            conditions.push("DXY breaks below recent low (bullish for gold/crypto)".to_string());
        }
    }

    if regime.volatility != Some(VolatilityRegime::High) {
        conditions.push("Volatility spike >80th percentile (regime change)".to_string());
    }

    conditions
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureMetadata;

    fn contribution(name: &str, category: FeatureCategory, value: f64) -> Contribution {
        Contribution {
            name: name.to_string(),
            category,
            raw_value: 0.0,
            direction: if value > 0.0 { 1 } else if value < 0.0 { -1 } else { 0 },
            strength: value.abs().min(1.0),
            weight: 1.0,
            contribution: value,
            explanation: String::new(),
        }
    }

    fn adx_feature(value: f64) -> FeatureResult {
        FeatureResult::new("adx", FeatureCategory::Technical, value, 0, 0.0, "test")
    }

    fn atr_feature(percentile: f64) -> FeatureResult {
        FeatureResult::new("atr", FeatureCategory::Volatility, 1.0, 0, 0.2, "test").with_metadata(
            FeatureMetadata {
                percentile: Some(percentile),
                ..Default::default()
            },
        )
    }

    fn squeeze_feature(on: bool) -> FeatureResult {
        FeatureResult::new("bb_width", FeatureCategory::Volatility, 1.0, 0, 0.2, "test")
            .with_metadata(FeatureMetadata {
                is_squeeze: Some(on),
                ..Default::default()
            })
    }

    // ---- score_to_signal mapping -----------------------------------------

    #[test]
    fn threshold_buckets() {
        assert_eq!(score_to_signal(4.1).0, Signal::StrongBuy);
        assert_eq!(score_to_signal(4.0).0, Signal::Buy);
        assert_eq!(score_to_signal(2.1).0, Signal::Buy);
        assert_eq!(score_to_signal(0.6).0, Signal::WeakBuy);
        assert_eq!(score_to_signal(0.0).0, Signal::Neutral);
        assert_eq!(score_to_signal(-0.6).0, Signal::WeakSell);
        assert_eq!(score_to_signal(-2.1).0, Signal::Sell);
        assert_eq!(score_to_signal(-4.1).0, Signal::StrongSell);
    }

    #[test]
    fn mapping_is_monotonic() {
        let mut prev_rank = i8::MIN;
        let mut score = -6.0;
        while score <= 6.0 {
            let rank = score_to_signal(score).0.rank();
            assert!(rank >= prev_rank, "rank decreased at score {score}");
            prev_rank = rank;
            score += 0.01;
        }
    }

    #[test]
    fn bias_follows_buckets() {
        assert_eq!(score_to_signal(3.0).1, Bias::Bullish);
        assert_eq!(score_to_signal(0.0).1, Bias::Neutral);
        assert_eq!(score_to_signal(-3.0).1, Bias::Bearish);
    }

    // ---- regime filters ---------------------------------------------------

    #[test]
    fn ranging_filter_dampens() {
        let features = vec![adx_feature(12.0)];
        let rules = Layer2Rules::new(MarketType::Spot, &features, &[]);
        let outcome = rules.apply(3.0);
        // 3.0 * 0.6 = 1.8 => WEAK_BUY
        assert!((outcome.adjusted_score - 1.8).abs() < 1e-12);
        assert_eq!(outcome.signal, Signal::WeakBuy);
        assert_eq!(outcome.regime.trend, TrendRegime::Ranging);
        assert_eq!(outcome.regime.filters_applied, vec!["ADX_LOW_REDUCED_TREND"]);
    }

    #[test]
    fn filters_stack_multiplicatively() {
        let features = vec![adx_feature(12.0), atr_feature(0.9), squeeze_feature(true)];
        let rules = Layer2Rules::new(MarketType::Spot, &features, &[]);
        let outcome = rules.apply(10.0);
        // 10 * 0.6 * 0.8 * 0.5 = 2.4
        assert!((outcome.adjusted_score - 2.4).abs() < 1e-12);
        assert_eq!(
            outcome.regime.filters_applied,
            vec!["ADX_LOW_REDUCED_TREND", "HIGH_VOL_CAUTION", "BB_SQUEEZE_WAIT"]
        );
    }

    #[test]
    fn trending_regime_applies_no_trend_filter() {
        let features = vec![adx_feature(35.0)];
        let rules = Layer2Rules::new(MarketType::Spot, &features, &[]);
        let outcome = rules.apply(3.0);
        assert!((outcome.adjusted_score - 3.0).abs() < 1e-12);
        assert_eq!(outcome.regime.trend, TrendRegime::Trending);
        assert!(outcome.regime.filters_applied.is_empty());
    }

    // ---- conflicts --------------------------------------------------------

    #[test]
    fn tech_macro_divergence_dampens() {
        let contributions = vec![
            contribution("ema_cross", FeatureCategory::Technical, 2.5),
            contribution("dxy", FeatureCategory::Macro, -2.5),
        ];
        let features = vec![adx_feature(35.0)];
        let rules = Layer2Rules::new(MarketType::Spot, &features, &contributions);
        let outcome = rules.apply(3.0);
        assert!((outcome.adjusted_score - 2.1).abs() < 1e-12);
        assert_eq!(outcome.regime.conflict.as_deref(), Some("TECH_MACRO_DIVERGENCE"));
    }

    #[test]
    fn opposing_funding_boosts_on_derivatives_only() {
        let contributions = vec![contribution(
            "funding_rate",
            FeatureCategory::CryptoDerivatives,
            -0.8,
        )];
        let features = vec![adx_feature(35.0)];

        let perp = Layer2Rules::new(MarketType::Perpetual, &features, &contributions);
        let outcome = perp.apply(3.0);
        assert!((outcome.adjusted_score - 3.6).abs() < 1e-12);
        assert!(outcome.regime.funding_confirmation);

        let spot = Layer2Rules::new(MarketType::Spot, &features, &contributions);
        let outcome = spot.apply(3.0);
        assert!((outcome.adjusted_score - 3.0).abs() < 1e-12);
        assert!(!outcome.regime.funding_confirmation);
    }

    // ---- confidence -------------------------------------------------------

    #[test]
    fn confidence_scales_and_clamps() {
        let features = vec![adx_feature(35.0)];
        let rules = Layer2Rules::new(MarketType::Spot, &features, &[]);
        assert_eq!(rules.apply(5.0).confidence, 50);
        assert_eq!(rules.apply(20.0).confidence, 100);
        assert_eq!(rules.apply(0.0).confidence, 0);
    }

    #[test]
    fn ranging_reduces_confidence_for_actionable_signals() {
        let features = vec![adx_feature(12.0)];
        let rules = Layer2Rules::new(MarketType::Spot, &features, &[]);
        let outcome = rules.apply(5.0);
        // score 5*0.6=3 => confidence 30 * 0.7 = 21
        assert_eq!(outcome.confidence, 21);
    }

    // ---- trade parameters -------------------------------------------------

    fn flat_candles(n: usize, close: f64) -> Vec<Candle> {
        (0..n)
            .map(|i| Candle::new(i as i64, close, close + 2.0, close - 2.0, close, 10.0))
            .collect()
    }

    #[test]
    fn neutral_signal_has_no_trade() {
        let candles = flat_candles(30, 100.0);
        assert!(trade_parameters(&candles, Signal::Neutral, 50, &RegimeContext::default()).is_none());
    }

    #[test]
    fn long_trade_sides_are_correct() {
        let candles = flat_candles(30, 100.0);
        let trade = trade_parameters(&candles, Signal::Buy, 50, &RegimeContext::default()).unwrap();
        assert!(trade.stop_loss < trade.entry);
        assert!(trade.take_profit > trade.entry);
        assert!((trade.risk_reward - 2.0).abs() < 1e-12);
        // Reward distance = risk * rr.
        let risk = trade.entry - trade.stop_loss;
        assert!((trade.take_profit - trade.entry - risk * 2.0).abs() < 1e-9);
    }

    #[test]
    fn short_trade_sides_are_correct() {
        let candles = flat_candles(30, 100.0);
        let trade = trade_parameters(&candles, Signal::Sell, 85, &RegimeContext::default()).unwrap();
        assert!(trade.stop_loss > trade.entry);
        assert!(trade.take_profit < trade.entry);
        assert!((trade.risk_reward - 3.0).abs() < 1e-12);
    }

    #[test]
    fn high_volatility_widens_stop() {
        let candles = flat_candles(30, 100.0);
        let normal = trade_parameters(&candles, Signal::Buy, 50, &RegimeContext::default()).unwrap();
        let high_vol_regime = RegimeContext {
            volatility: Some(VolatilityRegime::High),
            ..Default::default()
        };
        let wide = trade_parameters(&candles, Signal::Buy, 50, &high_vol_regime).unwrap();
        assert!(wide.stop_loss < normal.stop_loss);
    }

    // ---- invalidation -----------------------------------------------------

    #[test]
    fn bullish_invalidation_mentions_ma_and_trend() {
        let features = vec![
            FeatureResult::new("ema_cross", FeatureCategory::Technical, 1.0, 1, 0.5, "test")
                .with_metadata(FeatureMetadata {
                    ema_slow: Some(1234.56),
                    ..Default::default()
                }),
        ];
        let regime = RegimeContext {
            trend_strength: Some(TrendStrength::Strong),
            ..Default::default()
        };
        let conditions = invalidation_conditions(&features, Signal::Buy, &regime);
        assert!(conditions.iter().any(|c| c.contains("Close below EMA50 (1234.56)")));
        assert!(conditions.iter().any(|c| c.contains("ADX drops below 18")));
        assert!(conditions.iter().any(|c| c.contains("Volatility spike")));
    }

    #[test]
    fn neutral_signal_still_warns_on_regime_change() {
        let conditions = invalidation_conditions(&[], Signal::Neutral, &RegimeContext::default());
        assert_eq!(conditions.len(), 1);
        assert!(conditions[0].contains("Volatility spike"));
    }
}
