// =============================================================================
// Quality / Anomaly Overlay — post-hoc decision vetting
// =============================================================================
//
// Composite quality score (0-100), weighted:
//   feature agreement 30%, confidence 20%, regime alignment 20%,
//   data completeness 15%, signal strength 15%.
//
// Anomaly score (0-1, additive):
//   +0.3 recent realized volatility > 2x full-series volatility
//   +0.3 recent volume > 3x or < 0.3x the series average
//   +0.2 open-vs-prior-close gap > 2%
//   +0.2 fear gauge (VIX) above 30
//
// Post-hoc filters, each applied at most once and recorded as a warning:
//   quality < 50      => downgrade STRONG_* to the plain signal
//   anomaly > 0.7     => confidence -15
//   agreement < 55%   => confidence -10

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::{macro_keys, ContextBundle};
use crate::engine::rules::{TrendRegime, VolatilityRegime};
use crate::engine::{DecisionOutput, Signal};
use crate::market_data::Candle;

/// Quality metrics attached to a decision by the overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    /// Composite quality in [0, 100].
    pub quality_score: f64,
    /// Majority-direction share among the top-5 drivers, in percent.
    pub feature_agreement: f64,
    /// Unusual-conditions score in [0, 1].
    pub anomaly_score: f64,
    /// Driver names that disagree with other drivers in the same category.
    pub conflicting_indicators: Vec<String>,
    /// Warnings emitted by the assessment and the post-hoc filters.
    pub warnings: Vec<String>,
}

/// Assess a decision against its inputs.
pub fn assess(decision: &DecisionOutput, candles: &[Candle], context: &ContextBundle) -> QualityReport {
    let feature_agreement = feature_agreement(decision);
    let anomaly_score = anomaly_score(candles, context);
    let conflicting_indicators = driver_conflicts(decision);

    let regime_alignment = regime_alignment(decision);
    let data_quality = data_completeness(decision, candles, context);
    let signal_strength = (decision.raw_score.abs() / 50.0).min(1.0) * 100.0;

    let quality_score = (feature_agreement * 0.30
        + decision.confidence as f64 * 0.20
        + regime_alignment * 0.20
        + data_quality * 0.15
        + signal_strength * 0.15)
        .min(100.0);

    let mut warnings = Vec::new();
    if feature_agreement < 60.0 {
        warnings.push(format!(
            "Low feature agreement ({feature_agreement:.1}%) - indicators are conflicting"
        ));
    }
    if anomaly_score > 0.5 {
        warnings.push(format!(
            "Unusual market conditions detected (anomaly: {anomaly_score:.2}) - exercise caution"
        ));
    }
    if decision.confidence < 60 && matches!(decision.signal, Signal::StrongBuy | Signal::StrongSell)
    {
        warnings.push(format!(
            "Strong signal ({}) with low confidence ({}%) - consider waiting for confirmation",
            decision.signal, decision.confidence
        ));
    }

    debug!(
        quality = format!("{quality_score:.1}"),
        agreement = format!("{feature_agreement:.1}"),
        anomaly = format!("{anomaly_score:.2}"),
        "quality assessed"
    );

    QualityReport {
        quality_score,
        feature_agreement,
        anomaly_score,
        conflicting_indicators,
        warnings,
    }
}

/// Apply the post-hoc downgrade rules to the decision in place, recording
/// each applied rule as a warning on the report.
pub fn apply_filters(decision: &mut DecisionOutput, report: &mut QualityReport) {
    if report.quality_score < 50.0 {
        let downgraded = decision.signal.downgraded();
        if downgraded != decision.signal {
            report.warnings.push(format!(
                "Signal downgraded from {} to {} due to low quality score",
                decision.signal, downgraded
            ));
            decision.signal = downgraded;
        }
    }

    if report.anomaly_score > 0.7 {
        decision.confidence = decision.confidence.saturating_sub(15);
        report.warnings.push(format!(
            "Confidence reduced by 15 due to high anomaly score ({:.2})",
            report.anomaly_score
        ));
    }

    if report.feature_agreement < 55.0 {
        decision.confidence = decision.confidence.saturating_sub(10);
        report.warnings.push(format!(
            "Confidence reduced by 10 due to low feature agreement ({:.1}%)",
            report.feature_agreement
        ));
    }
}

/// Majority-direction share among the directional top-5 drivers (50 when no
/// driver has a direction).
fn feature_agreement(decision: &DecisionOutput) -> f64 {
    let bullish = decision
        .top_drivers
        .iter()
        .filter(|d| d.direction > 0)
        .count();
    let bearish = decision
        .top_drivers
        .iter()
        .filter(|d| d.direction < 0)
        .count();
    let total = bullish + bearish;
    if total == 0 {
        return 50.0;
    }
    bullish.max(bearish) as f64 / total as f64 * 100.0
}

/// Additive anomaly score, capped at 1.0.
fn anomaly_score(candles: &[Candle], context: &ContextBundle) -> f64 {
    let mut score: f64 = 0.0;

    // Volatility spike: 10-bar realized volatility vs the full series.
    if candles.len() > 20 {
        let returns: Vec<f64> = candles
            .windows(2)
            .filter_map(|w| {
                (w[0].close != 0.0).then(|| (w[1].close - w[0].close) / w[0].close)
            })
            .collect();
        if returns.len() > 10 {
            let recent = std_dev(&returns[returns.len() - 10..]);
            let full = std_dev(&returns);
            if full > 0.0 && recent > full * 2.0 {
                score += 0.3;
            }
        }
    }

    // Volume anomaly: recent average far from the series average.
    if candles.len() > 20 {
        let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();
        let recent = volumes[volumes.len() - 10..].iter().sum::<f64>() / 10.0;
        let average = volumes.iter().sum::<f64>() / volumes.len() as f64;
        if average > 0.0 && (recent > average * 3.0 || recent < average * 0.3) {
            score += 0.3;
        }
    }

    // Gap between the last open and the prior close.
    if candles.len() > 2 {
        let prior_close = candles[candles.len() - 2].close;
        let last_open = candles[candles.len() - 1].open;
        if prior_close != 0.0 {
            let gap_pct = ((last_open - prior_close) / prior_close).abs() * 100.0;
            if gap_pct > 2.0 {
                score += 0.2;
            }
        }
    }

    // Macro fear: VIX above the high-fear threshold.
    if let Some(vix) = context.macro_series(macro_keys::VIX, 1) {
        if vix[vix.len() - 1] > 30.0 {
            score += 0.2;
        }
    }

    score.min(1.0)
}

fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

/// Driver names whose direction fights another driver in the same category.
fn driver_conflicts(decision: &DecisionOutput) -> Vec<String> {
    let mut conflicts = Vec::new();

    let categories: Vec<_> = decision
        .top_drivers
        .iter()
        .map(|d| d.category)
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();

    for category in categories {
        let drivers: Vec<_> = decision
            .top_drivers
            .iter()
            .filter(|d| d.category == category)
            .collect();
        let has_bull = drivers.iter().any(|d| d.direction > 0);
        let has_bear = drivers.iter().any(|d| d.direction < 0);
        if has_bull && has_bear {
            for driver in drivers {
                let label = if driver.direction > 0 { "bullish" } else if driver.direction < 0 { "bearish" } else { continue };
                conflicts.push(format!("{} ({label})", driver.name));
            }
        }
    }

    conflicts
}

/// How well the signal fits the detected regime (0-100, 50 = indifferent).
/// Trend-following signals in a trending regime score up; counter-trend and
/// strong signals in high volatility score down.
fn regime_alignment(decision: &DecisionOutput) -> f64 {
    let mut score: f64 = 50.0;

    if decision.regime.trend == TrendRegime::Trending {
        // Direction of the trend comes from the ADX feature's DI reading.
        let trend_direction = decision
            .features
            .iter()
            .find(|f| f.name == "adx")
            .map(|f| f.direction)
            .unwrap_or(0);
        let signal_rank = decision.signal.rank();
        if trend_direction != 0 && signal_rank != 0 {
            if (trend_direction > 0) == (signal_rank > 0) {
                score += 25.0;
            } else {
                score -= 15.0;
            }
        }
    }

    if decision.regime.volatility == Some(VolatilityRegime::High)
        && matches!(decision.signal, Signal::StrongBuy | Signal::StrongSell)
    {
        score -= 10.0;
    }

    score.clamp(0.0, 100.0)
}

/// Completeness of the inputs backing the decision (0-100).
fn data_completeness(decision: &DecisionOutput, candles: &[Candle], context: &ContextBundle) -> f64 {
    let mut score: f64 = 100.0;

    if candles.len() < 100 {
        score -= 20.0;
    }
    if context.macro_data.is_empty() {
        score -= 10.0;
    }
    if decision.market_type.is_derivatives() && context.derivatives.is_none() {
        score -= 10.0;
    }

    score.max(0.0)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::rules::RegimeContext;
    use crate::engine::scorer::Contribution;
    use crate::engine::{Bias, TradeParams};
    use crate::features::FeatureCategory;
    use crate::market_data::{MarketType, Timeframe};

    fn driver(name: &str, category: FeatureCategory, direction: i8, contribution: f64) -> Contribution {
        Contribution {
            name: name.to_string(),
            category,
            raw_value: 0.0,
            direction,
            strength: contribution.abs().min(1.0),
            weight: 1.0,
            contribution,
            explanation: String::new(),
        }
    }

    fn decision(signal: Signal, confidence: u8, drivers: Vec<Contribution>) -> DecisionOutput {
        DecisionOutput {
            symbol: "XAUUSD".to_string(),
            market_type: MarketType::Spot,
            timeframe: Timeframe::H1,
            signal,
            bias: Bias::Bullish,
            confidence,
            trade: Some(TradeParams {
                entry: 100.0,
                stop_loss: 95.0,
                take_profit: 115.0,
                risk_reward: 3.0,
            }),
            invalidation_conditions: Vec::new(),
            top_drivers: drivers,
            raw_score: 3.0,
            regime: RegimeContext::default(),
            features: Vec::new(),
        }
    }

    fn calm_candles(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let base = 100.0 + (i as f64 * 0.3).sin();
                Candle::new(i as i64, base, base + 0.5, base - 0.5, base, 100.0)
            })
            .collect()
    }

    #[test]
    fn agreement_uses_directional_drivers_only() {
        let d = decision(
            Signal::Buy,
            70,
            vec![
                driver("a", FeatureCategory::Technical, 1, 0.9),
                driver("b", FeatureCategory::Macro, 1, 0.8),
                driver("c", FeatureCategory::Sentiment, -1, 0.4),
                driver("d", FeatureCategory::Volatility, 0, 0.0),
            ],
        );
        assert!((feature_agreement(&d) - 2.0 / 3.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn agreement_defaults_to_50_without_directional_drivers() {
        let d = decision(Signal::Neutral, 10, vec![driver("a", FeatureCategory::Volatility, 0, 0.0)]);
        assert_eq!(feature_agreement(&d), 50.0);
    }

    #[test]
    fn anomaly_zero_in_calm_conditions() {
        let score = anomaly_score(&calm_candles(60), &ContextBundle::default());
        assert_eq!(score, 0.0);
    }

    #[test]
    fn anomaly_counts_gap_and_fear() {
        let mut candles = calm_candles(60);
        let last = candles.last().unwrap().clone();
        // 3% gap up on the final open that fully retraces by the close, so
        // only the gap check fires (close-to-close returns stay calm).
        candles.push(Candle::new(
            last.timestamp + 1,
            last.close * 1.03,
            last.close * 1.04,
            last.close * 0.99,
            last.close,
            100.0,
        ));
        let mut context = ContextBundle::default();
        context
            .macro_data
            .insert(macro_keys::VIX.to_string(), vec![36.0]);
        let score = anomaly_score(&candles, &context);
        assert!((score - 0.4).abs() < 1e-9); // gap 0.2 + VIX 0.2
    }

    #[test]
    fn anomaly_detects_volume_surge() {
        let mut candles = calm_candles(50);
        for c in candles.iter_mut().rev().take(10) {
            c.volume = 700.0;
        }
        let score = anomaly_score(&candles, &ContextBundle::default());
        assert!(score >= 0.3);
    }

    #[test]
    fn quality_filters_downgrade_strong_signal_once() {
        let mut d = decision(
            Signal::StrongBuy,
            30,
            vec![
                driver("a", FeatureCategory::Technical, 1, 0.9),
                driver("b", FeatureCategory::Macro, -1, 0.8),
            ],
        );
        let mut report = QualityReport {
            quality_score: 40.0,
            feature_agreement: 50.0,
            anomaly_score: 0.8,
            conflicting_indicators: Vec::new(),
            warnings: Vec::new(),
        };
        apply_filters(&mut d, &mut report);

        assert_eq!(d.signal, Signal::Buy);
        // 30 - 15 (anomaly) - 10 (agreement) = 5.
        assert_eq!(d.confidence, 5);
        assert_eq!(report.warnings.len(), 3);
    }

    #[test]
    fn confidence_floor_is_zero() {
        let mut d = decision(Signal::Sell, 12, Vec::new());
        let mut report = QualityReport {
            quality_score: 80.0,
            feature_agreement: 40.0,
            anomaly_score: 0.9,
            conflicting_indicators: Vec::new(),
            warnings: Vec::new(),
        };
        apply_filters(&mut d, &mut report);
        assert_eq!(d.confidence, 0);
        assert_eq!(d.signal, Signal::Sell); // quality 80: no downgrade
    }

    #[test]
    fn assess_produces_bounded_scores() {
        let d = decision(
            Signal::Buy,
            70,
            vec![
                driver("a", FeatureCategory::Technical, 1, 0.9),
                driver("b", FeatureCategory::Macro, 1, 0.8),
            ],
        );
        let report = assess(&d, &calm_candles(150), &ContextBundle::default());
        assert!(report.quality_score >= 0.0 && report.quality_score <= 100.0);
        assert!(report.anomaly_score >= 0.0 && report.anomaly_score <= 1.0);
        assert_eq!(report.feature_agreement, 100.0);
    }

    #[test]
    fn driver_conflicts_reported_per_category() {
        let d = decision(
            Signal::Buy,
            70,
            vec![
                driver("rsi", FeatureCategory::Technical, 1, 0.9),
                driver("macd", FeatureCategory::Technical, -1, 0.5),
                driver("dxy", FeatureCategory::Macro, 1, 0.4),
            ],
        );
        let conflicts = driver_conflicts(&d);
        assert_eq!(conflicts.len(), 2);
        assert!(conflicts.iter().any(|c| c.contains("rsi")));
        assert!(conflicts.iter().any(|c| c.contains("macd")));
        assert!(!conflicts.iter().any(|c| c.contains("dxy")));
    }
}
