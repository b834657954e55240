// =============================================================================
// Layer-1 Scorer — weighted feature aggregation
// =============================================================================
//
// Runs every applicable feature calculator, resolves a weight per feature
// from the timeframe's horizon preset (overridable per call) and folds the
// results into a single raw score:
//
//   contribution = weight * direction * strength
//   raw_score    = Σ contributions
//
// A calculator error is logged and the feature skipped; scoring never aborts
// because one indicator failed.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::context::ContextBundle;
use crate::features::{FeatureCategory, FeatureRegistry, FeatureResult};
use crate::market_data::{Candle, Horizon, MarketType, Timeframe};

/// One feature's share of the raw score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub name: String,
    pub category: FeatureCategory,
    pub raw_value: f64,
    pub direction: i8,
    pub strength: f64,
    pub weight: f64,
    pub contribution: f64,
    pub explanation: String,
}

// =============================================================================
// Horizon weight presets
// =============================================================================
//
// Short horizons upweight oscillators, flow and derivatives positioning;
// the long horizon upweights trend structure and macro.  Unlisted features
// default to weight 1.0.

const SHORT_WEIGHTS: &[(&str, f64)] = &[
    ("rsi", 1.2),
    ("stochastic", 1.1),
    ("macd", 1.0),
    ("bollinger", 1.1),
    ("vwap", 1.3),
    ("volume_ratio", 1.2),
    ("funding_rate", 1.3),
    ("liquidations", 1.4),
    ("adx", 0.8),
    ("ema_cross", 0.9),
    ("supertrend", 0.9),
    ("dxy", 0.5),
    ("vix", 0.6),
    ("real_yields", 0.3),
];

const MEDIUM_WEIGHTS: &[(&str, f64)] = &[
    ("rsi", 1.0),
    ("macd", 1.0),
    ("adx", 1.2),
    ("ema_cross", 1.3),
    ("supertrend", 1.2),
    ("bb_width", 1.1),
    ("dxy", 1.0),
    ("vix", 0.9),
    ("real_yields", 1.1),
    ("funding_rate", 1.0),
    ("open_interest", 1.1),
    ("gold_silver_ratio", 1.0),
];

const LONG_WEIGHTS: &[(&str, f64)] = &[
    ("adx", 1.3),
    ("ema_cross", 1.5),
    ("supertrend", 1.3),
    ("dxy", 1.4),
    ("real_yields", 1.5),
    ("vix", 1.0),
    ("gold_silver_ratio", 1.2),
    ("miners_gold_ratio", 1.2),
    ("gld_flow", 1.1),
    ("rsi", 0.7),
    ("stochastic", 0.5),
    ("vwap", 0.3),
    ("funding_rate", 0.6),
];

fn preset_weight(horizon: Horizon, name: &str) -> Option<f64> {
    let table = match horizon {
        Horizon::Short => SHORT_WEIGHTS,
        Horizon::Medium => MEDIUM_WEIGHTS,
        Horizon::Long => LONG_WEIGHTS,
    };
    table
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, w)| *w)
}

// =============================================================================
// Layer1Scorer
// =============================================================================

pub struct Layer1Scorer<'a> {
    registry: &'a FeatureRegistry,
}

impl<'a> Layer1Scorer<'a> {
    pub fn new(registry: &'a FeatureRegistry) -> Self {
        Self { registry }
    }

    /// Run every calculator applicable to the venue.  Calculator errors are
    /// logged and skipped so one broken indicator never sinks the evaluation.
    pub fn calculate_features(
        &self,
        candles: &[Candle],
        symbol: &str,
        timeframe: Timeframe,
        market_type: MarketType,
        context: &ContextBundle,
    ) -> Vec<FeatureResult> {
        let mut results = Vec::with_capacity(self.registry.len());

        for feature in self.registry.applicable(market_type) {
            match feature.calculate(candles, symbol, timeframe, market_type, context) {
                Ok(result) => results.push(result),
                Err(error) => {
                    warn!(
                        feature = feature.name(),
                        symbol,
                        timeframe = %timeframe,
                        error = %error,
                        "feature calculation failed - skipping"
                    );
                }
            }
        }

        results
    }

    /// Fold feature results into (raw_score, contributions ranked by
    /// |contribution| descending).  Weight resolution order: caller override,
    /// horizon preset, 1.0.
    pub fn weighted_score(
        &self,
        timeframe: Timeframe,
        results: &[FeatureResult],
        overrides: Option<&HashMap<String, f64>>,
    ) -> (f64, Vec<Contribution>) {
        let horizon = timeframe.horizon();
        let mut total_score = 0.0;
        let mut contributions = Vec::with_capacity(results.len());

        for result in results {
            let weight = overrides
                .and_then(|map| map.get(&result.name).copied())
                .or_else(|| preset_weight(horizon, &result.name))
                .unwrap_or(1.0);

            let contribution = weight * result.direction as f64 * result.strength;
            total_score += contribution;

            contributions.push(Contribution {
                name: result.name.clone(),
                category: result.category,
                raw_value: result.raw_value,
                direction: result.direction,
                strength: result.strength,
                weight,
                contribution,
                explanation: result.explanation.clone(),
            });
        }

        // Rank by absolute contribution; ties keep registration order, which
        // keeps repeated runs byte-identical.
        contributions.sort_by(|a, b| {
            b.contribution
                .abs()
                .partial_cmp(&a.contribution.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        (total_score, contributions)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureResult;

    fn result(name: &str, category: FeatureCategory, direction: i8, strength: f64) -> FeatureResult {
        FeatureResult::new(name, category, 0.0, direction, strength, "test")
    }

    fn fixed_results() -> Vec<FeatureResult> {
        vec![
            result("rsi", FeatureCategory::Technical, -1, 0.5),
            result("ema_cross", FeatureCategory::Technical, 1, 0.8),
            result("dxy", FeatureCategory::Macro, 1, 0.4),
            result("atr", FeatureCategory::Volatility, 0, 0.3),
        ]
    }

    #[test]
    fn raw_score_is_exact_weighted_sum() {
        let registry = FeatureRegistry::empty();
        let scorer = Layer1Scorer::new(&registry);
        let results = fixed_results();

        let (score, contributions) = scorer.weighted_score(Timeframe::H1, &results, None);

        // Short horizon: rsi 1.2, ema_cross 0.9, dxy 0.5; atr defaults 1.0.
        let expected = 1.2 * -1.0 * 0.5 + 0.9 * 1.0 * 0.8 + 0.5 * 1.0 * 0.4 + 1.0 * 0.0 * 0.3;
        assert!((score - expected).abs() < 1e-12);

        // Every feature appears exactly once, neutral ones at contribution 0.
        assert_eq!(contributions.len(), results.len());
        let atr = contributions.iter().find(|c| c.name == "atr").unwrap();
        assert_eq!(atr.contribution, 0.0);
    }

    #[test]
    fn contributions_ranked_by_absolute_value() {
        let registry = FeatureRegistry::empty();
        let scorer = Layer1Scorer::new(&registry);
        let (_, contributions) = scorer.weighted_score(Timeframe::H1, &fixed_results(), None);

        for pair in contributions.windows(2) {
            assert!(pair[0].contribution.abs() >= pair[1].contribution.abs());
        }
        assert_eq!(contributions[0].name, "ema_cross"); // 0.72 leads
    }

    #[test]
    fn caller_overrides_beat_presets() {
        let registry = FeatureRegistry::empty();
        let scorer = Layer1Scorer::new(&registry);
        let mut overrides = HashMap::new();
        overrides.insert("rsi".to_string(), 5.0);

        let results = vec![result("rsi", FeatureCategory::Technical, 1, 0.5)];
        let (score, contributions) =
            scorer.weighted_score(Timeframe::H1, &results, Some(&overrides));

        assert!((score - 2.5).abs() < 1e-12);
        assert_eq!(contributions[0].weight, 5.0);
    }

    #[test]
    fn horizon_presets_differ() {
        // Funding is upweighted intraday, downweighted weekly.
        assert_eq!(preset_weight(Horizon::Short, "funding_rate"), Some(1.3));
        assert_eq!(preset_weight(Horizon::Long, "funding_rate"), Some(0.6));
        assert_eq!(preset_weight(Horizon::Medium, "vwap"), None);
    }

    #[test]
    fn calculate_features_skips_inapplicable() {
        let registry = FeatureRegistry::standard();
        let scorer = Layer1Scorer::new(&registry);
        let candles: Vec<Candle> = (0..30)
            .map(|i| Candle::new(i, 100.0, 101.0, 99.0, 100.0, 10.0))
            .collect();
        let spot = scorer.calculate_features(
            &candles,
            "XAUUSD",
            Timeframe::H1,
            MarketType::Spot,
            &ContextBundle::default(),
        );
        assert_eq!(spot.len(), 27);
        assert!(spot.iter().all(|r| r.name != "funding_rate"));
    }
}
