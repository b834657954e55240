// =============================================================================
// Decision Engine — two-layer scoring pipeline with consensus and quality
// overlays
// =============================================================================
//
// Layer 1 (scorer) runs every applicable feature and folds the results into a
// weighted raw score.  Layer 2 (rules) classifies the market regime, filters
// and adjusts the score, and maps it onto a seven-level signal with trade
// parameters and invalidation conditions.  The consensus engine re-reads the
// same feature results as category votes and recalibrates confidence; the
// quality overlay can downgrade a decision after the fact.
//
// The whole pipeline is a pure function of its inputs: identical candles,
// context and weights produce an identical `DecisionOutput`.

pub mod consensus;
pub mod quality;
pub mod rules;
pub mod scorer;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::context::ContextBundle;
use crate::features::{FeatureRegistry, FeatureResult};
use crate::market_data::{Candle, MarketType, Timeframe};

pub use consensus::{AgreementLevel, CategoryVotes, ConsensusEngine, ConsensusResult};
pub use quality::QualityReport;
pub use rules::{RegimeContext, TrendRegime, TrendStrength, VolatilityRegime};
pub use scorer::{Contribution, Layer1Scorer};

// =============================================================================
// Signal / bias
// =============================================================================

/// Seven-level directional signal.  Variant order encodes signal rank, so the
/// derived `Ord` runs from `StrongSell` up to `StrongBuy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Signal {
    StrongSell,
    Sell,
    WeakSell,
    Neutral,
    WeakBuy,
    Buy,
    StrongBuy,
}

impl Signal {
    /// Rank in -3..=3 with `Neutral` at 0; useful for monotonicity checks.
    pub fn rank(self) -> i8 {
        match self {
            Self::StrongSell => -3,
            Self::Sell => -2,
            Self::WeakSell => -1,
            Self::Neutral => 0,
            Self::WeakBuy => 1,
            Self::Buy => 2,
            Self::StrongBuy => 3,
        }
    }

    pub fn is_long(self) -> bool {
        self.rank() > 0
    }

    pub fn is_short(self) -> bool {
        self.rank() < 0
    }

    /// Whether the signal carries trade parameters.
    pub fn is_actionable(self) -> bool {
        self != Self::Neutral
    }

    /// One step toward neutral for the strong variants; the quality overlay
    /// uses this to soften low-quality extremes.
    pub fn downgraded(self) -> Self {
        match self {
            Self::StrongBuy => Self::Buy,
            Self::StrongSell => Self::Sell,
            other => other,
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::StrongSell => "STRONG_SELL",
            Self::Sell => "SELL",
            Self::WeakSell => "WEAK_SELL",
            Self::Neutral => "NEUTRAL",
            Self::WeakBuy => "WEAK_BUY",
            Self::Buy => "BUY",
            Self::StrongBuy => "STRONG_BUY",
        };
        write!(f, "{s}")
    }
}

/// Directional bias derived from the same score buckets as the signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Bias {
    Bearish,
    Neutral,
    Bullish,
}

impl std::fmt::Display for Bias {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Bearish => "BEARISH",
            Self::Neutral => "NEUTRAL",
            Self::Bullish => "BULLISH",
        };
        write!(f, "{s}")
    }
}

// =============================================================================
// Trade parameters and decision output
// =============================================================================

/// Entry/stop/target levels for an actionable signal.  Absent for `Neutral`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeParams {
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub risk_reward: f64,
}

/// The complete decision record handed to the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionOutput {
    pub symbol: String,
    pub market_type: MarketType,
    pub timeframe: Timeframe,

    pub signal: Signal,
    pub bias: Bias,
    /// Confidence in [0, 100].
    pub confidence: u8,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub trade: Option<TradeParams>,

    pub invalidation_conditions: Vec<String>,
    /// Top five contributions by absolute value.
    pub top_drivers: Vec<Contribution>,
    pub raw_score: f64,
    pub regime: RegimeContext,
    pub features: Vec<FeatureResult>,
}

/// Gate verdict from the consensus engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateDecision {
    pub should_fire: bool,
    pub reason: String,
}

/// Output of the full pipeline: the (possibly overlay-adjusted) decision plus
/// the consensus breakdown, quality report and gate verdict backing it.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub decision: DecisionOutput,
    pub consensus: ConsensusResult,
    pub quality: QualityReport,
    pub gate: GateDecision,
}

// =============================================================================
// DecisionEngine
// =============================================================================

/// Ties the layers together for one (symbol, market, timeframe) evaluation.
/// Holds only a shared reference to the registry, so engines are cheap to
/// create per evaluation and evaluations can run on separate threads.
pub struct DecisionEngine<'a> {
    registry: &'a FeatureRegistry,
}

impl<'a> DecisionEngine<'a> {
    pub fn new(registry: &'a FeatureRegistry) -> Self {
        Self { registry }
    }

    /// Run Layer 1 + Layer 2 and assemble the decision record.
    pub fn evaluate(
        &self,
        symbol: &str,
        market_type: MarketType,
        timeframe: Timeframe,
        candles: &[Candle],
        context: &ContextBundle,
        weight_overrides: Option<&HashMap<String, f64>>,
    ) -> DecisionOutput {
        let scorer = Layer1Scorer::new(self.registry);
        let features = scorer.calculate_features(candles, symbol, timeframe, market_type, context);
        let (raw_score, contributions) =
            scorer.weighted_score(timeframe, &features, weight_overrides);

        let rules = rules::Layer2Rules::new(market_type, &features, &contributions);
        let outcome = rules.apply(raw_score);

        let trade = rules::trade_parameters(candles, outcome.signal, outcome.confidence, &outcome.regime);
        let invalidation_conditions =
            rules::invalidation_conditions(&features, outcome.signal, &outcome.regime);

        let top_drivers: Vec<Contribution> =
            contributions.iter().take(5).cloned().collect();

        DecisionOutput {
            symbol: symbol.to_string(),
            market_type,
            timeframe,
            signal: outcome.signal,
            bias: outcome.bias,
            confidence: outcome.confidence,
            trade,
            invalidation_conditions,
            top_drivers,
            raw_score,
            regime: outcome.regime,
            features,
        }
    }

    /// Full pipeline: decision, consensus recalibration, quality overlay and
    /// the consensus gate.
    pub fn evaluate_full(
        &self,
        symbol: &str,
        market_type: MarketType,
        timeframe: Timeframe,
        candles: &[Candle],
        context: &ContextBundle,
        config: &EngineConfig,
    ) -> EvaluationReport {
        let overrides = (!config.feature_weights.is_empty()).then_some(&config.feature_weights);
        let mut decision =
            self.evaluate(symbol, market_type, timeframe, candles, context, overrides);

        let engine = ConsensusEngine::default();
        let consensus = engine.analyze(&decision.features);
        let (adjusted, _explanation) =
            engine.adjust_confidence(decision.confidence as f64, &consensus);
        decision.confidence = adjusted.round().clamp(0.0, 100.0) as u8;

        let mut quality = quality::assess(&decision, candles, context);
        if config.apply_quality_filters {
            quality::apply_filters(&mut decision, &mut quality);
        }

        let (should_fire, reason) =
            engine.should_fire(&consensus, config.min_consensus_pct, config.allow_conflicts);

        EvaluationReport {
            decision,
            consensus,
            quality,
            gate: GateDecision {
                should_fire,
                reason,
            },
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn trending_candles(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let base = 1_800.0 + i as f64 * 2.0;
                Candle::new(
                    i as i64 * 3_600_000,
                    base,
                    base + 3.0,
                    base - 1.0,
                    base + 2.0,
                    1_000.0 + (i % 7) as f64 * 50.0,
                )
            })
            .collect()
    }

    #[test]
    fn signal_rank_is_monotonic() {
        let ordered = [
            Signal::StrongSell,
            Signal::Sell,
            Signal::WeakSell,
            Signal::Neutral,
            Signal::WeakBuy,
            Signal::Buy,
            Signal::StrongBuy,
        ];
        for pair in ordered.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(pair[0].rank() < pair[1].rank());
        }
    }

    #[test]
    fn downgrade_only_touches_strong_variants() {
        assert_eq!(Signal::StrongBuy.downgraded(), Signal::Buy);
        assert_eq!(Signal::StrongSell.downgraded(), Signal::Sell);
        assert_eq!(Signal::WeakBuy.downgraded(), Signal::WeakBuy);
        assert_eq!(Signal::Neutral.downgraded(), Signal::Neutral);
    }

    #[test]
    fn evaluation_is_deterministic() {
        let registry = FeatureRegistry::standard();
        let engine = DecisionEngine::new(&registry);
        let candles = trending_candles(250);
        let context = ContextBundle::default();

        let a = engine.evaluate(
            "XAUUSD",
            MarketType::Spot,
            Timeframe::H1,
            &candles,
            &context,
            None,
        );
        let b = engine.evaluate(
            "XAUUSD",
            MarketType::Spot,
            Timeframe::H1,
            &candles,
            &context,
            None,
        );

        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn decision_is_internally_consistent() {
        let registry = FeatureRegistry::standard();
        let engine = DecisionEngine::new(&registry);
        let candles = trending_candles(250);
        let context = ContextBundle::default();

        let decision = engine.evaluate(
            "XAUUSD",
            MarketType::Spot,
            Timeframe::H1,
            &candles,
            &context,
            None,
        );

        // Every spot-applicable feature computed something.
        assert_eq!(decision.features.len(), 27);
        assert!(decision.top_drivers.len() <= 5);
        assert!(decision.confidence <= 100);
        assert!(!decision.invalidation_conditions.is_empty());

        // Signal, bias and trade parameters must tell the same story.
        if decision.signal.is_long() {
            assert_eq!(decision.bias, Bias::Bullish);
            let trade = decision.trade.expect("long signal carries trade params");
            assert!(trade.stop_loss < trade.entry && trade.entry < trade.take_profit);
        } else if decision.signal.is_short() {
            assert_eq!(decision.bias, Bias::Bearish);
            let trade = decision.trade.expect("short signal carries trade params");
            assert!(trade.take_profit < trade.entry && trade.entry < trade.stop_loss);
        } else {
            assert_eq!(decision.bias, Bias::Neutral);
            assert!(decision.trade.is_none());
        }

        // The raw score is exactly what the scorer reports for the same data.
        let scorer = Layer1Scorer::new(&registry);
        let features = scorer.calculate_features(
            &candles,
            "XAUUSD",
            Timeframe::H1,
            MarketType::Spot,
            &context,
        );
        let (raw, _) = scorer.weighted_score(Timeframe::H1, &features, None);
        assert!((decision.raw_score - raw).abs() < 1e-12);
    }

    #[test]
    fn neutral_chop_produces_no_trade_params() {
        let registry = FeatureRegistry::standard();
        let engine = DecisionEngine::new(&registry);
        // Tight oscillation around a flat mean.
        let candles: Vec<Candle> = (0..250)
            .map(|i| {
                let wobble = (i as f64 * 2.1).sin() * 0.3;
                let base = 1_800.0 + wobble;
                Candle::new(i as i64, base, base + 0.5, base - 0.5, base, 1_000.0)
            })
            .collect();
        let decision = engine.evaluate(
            "XAUUSD",
            MarketType::Spot,
            Timeframe::H1,
            &candles,
            &ContextBundle::default(),
            None,
        );
        if decision.signal == Signal::Neutral {
            assert!(decision.trade.is_none());
        }
    }

    #[test]
    fn full_pipeline_produces_clamped_confidence() {
        let registry = FeatureRegistry::standard();
        let engine = DecisionEngine::new(&registry);
        let candles = trending_candles(250);
        let report = engine.evaluate_full(
            "XAUUSD",
            MarketType::Spot,
            Timeframe::H1,
            &candles,
            &ContextBundle::default(),
            &EngineConfig::default(),
        );
        assert!(report.decision.confidence <= 100);
        assert!(report.consensus.total_features > 0);
        assert!(report.quality.quality_score >= 0.0 && report.quality.quality_score <= 100.0);
    }
}
