// =============================================================================
// Feature Calculation Contract
// =============================================================================
//
// A feature is one independent market signal: it consumes the price series
// plus the context bundle and produces a normalised result — a tri-state
// direction, a bounded strength and a human-readable explanation.
//
// Contract rules:
//   - `calculate` never errors for normal inputs.  Missing context or
//     insufficient history yields a neutral result (direction 0, strength 0)
//     carrying an explanatory message.
//   - A genuine computation error returns `Err`; the scorer logs it and
//     skips the feature, never aborting the evaluation.
//   - `direction` must be -1, 0 or +1 and `strength` must lie in [0, 1].
//     Violations are calculator bugs and fail loudly at construction.

pub mod derivatives;
pub mod intermarket;
pub mod macro_econ;
pub mod registry;
pub mod sentiment;
pub mod technical;
pub mod volatility;
pub mod volume;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::context::ContextBundle;
use crate::market_data::{Candle, MarketType, Timeframe};

pub use registry::FeatureRegistry;

// =============================================================================
// Categories
// =============================================================================

/// Fixed category set used for weighting, consensus voting and conflict
/// detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeatureCategory {
    Technical,
    Volatility,
    Volume,
    Macro,
    Intermarket,
    Sentiment,
    CryptoSpot,
    CryptoDerivatives,
}

impl std::fmt::Display for FeatureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Technical => "TECHNICAL",
            Self::Volatility => "VOLATILITY",
            Self::Volume => "VOLUME",
            Self::Macro => "MACRO",
            Self::Intermarket => "INTERMARKET",
            Self::Sentiment => "SENTIMENT",
            Self::CryptoSpot => "CRYPTO_SPOT",
            Self::CryptoDerivatives => "CRYPTO_DERIVATIVES",
        };
        write!(f, "{s}")
    }
}

// =============================================================================
// FeatureResult
// =============================================================================

/// Fixed, documented set of optional per-feature extras.  Each calculator
/// fills only the fields that apply to it; everything else stays `None` and
/// is skipped during serialisation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureMetadata {
    /// Indicator look-back period.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<u32>,
    /// Percentile rank of the current reading against its own history.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentile: Option<f64>,
    /// Change over the feature's look-back, in percent (or points for yields).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_pct: Option<f64>,
    /// Band-width compression flag (Bollinger squeeze).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_squeeze: Option<bool>,
    /// Trailing-average band width backing the squeeze decision.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plus_di: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minus_di: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ema_fast: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ema_slow: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upper_band: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub middle_band: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lower_band: Option<f64>,
    /// Stochastic %K / %D pair.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stoch_k: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stoch_d: Option<f64>,
    /// Distance from a reference level (VWAP, SMA) in percent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_pct: Option<f64>,
    /// Annualised rate, e.g. funding extrapolated to a yearly percentage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annualised_pct: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub golden_cross: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub death_cross: Option<bool>,
    /// ATR expressed as a percentage of the last close.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub atr_pct: Option<f64>,
    /// Liquidation split and spike ratio.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub long_share: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_share: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ratio_vs_avg: Option<f64>,
    /// Price change paired with an open-interest change.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_change_pct: Option<f64>,
    /// Order-book depth imbalance in [-1, 1].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imbalance: Option<f64>,
    /// Sentiment snapshot extras.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fear_index: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub article_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub urgency: Option<f64>,
}

/// Immutable outcome of one feature calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureResult {
    pub name: String,
    pub category: FeatureCategory,
    /// Indicator-specific raw reading (RSI level, funding rate, ratio, ...).
    pub raw_value: f64,
    /// -1 bearish, 0 neutral, +1 bullish.
    pub direction: i8,
    /// Signal strength in [0, 1].
    pub strength: f64,
    pub explanation: String,
    #[serde(default)]
    pub metadata: FeatureMetadata,
}

impl FeatureResult {
    /// Construct a result, enforcing the output invariants.  An out-of-range
    /// direction or strength is a calculator bug, not a data problem, so it
    /// panics rather than being silently corrected.
    pub fn new(
        name: &str,
        category: FeatureCategory,
        raw_value: f64,
        direction: i8,
        strength: f64,
        explanation: impl Into<String>,
    ) -> Self {
        assert!(
            (-1..=1).contains(&direction),
            "feature '{name}': direction {direction} outside {{-1,0,1}}"
        );
        assert!(
            (0.0..=1.0).contains(&strength),
            "feature '{name}': strength {strength} outside [0,1]"
        );
        Self {
            name: name.to_string(),
            category,
            raw_value,
            direction,
            strength,
            explanation: explanation.into(),
            metadata: FeatureMetadata::default(),
        }
    }

    /// A directionless, zero-strength result used whenever the feature's
    /// inputs are missing or too short.
    pub fn unavailable(name: &str, category: FeatureCategory, reason: impl Into<String>) -> Self {
        Self::new(name, category, 0.0, 0, 0.0, reason)
    }

    /// Attach metadata (builder style).
    pub fn with_metadata(mut self, metadata: FeatureMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

// =============================================================================
// Feature trait
// =============================================================================

/// One market signal.  Implementations are stateless; parameters are fixed at
/// construction and every invocation is a pure function of its inputs.
pub trait Feature: Send + Sync {
    /// Stable identifier used for weight lookup and registry access.
    fn name(&self) -> &'static str;

    fn category(&self) -> FeatureCategory;

    /// Whether the feature makes sense for the given venue.  Derivatives
    /// metrics are meaningless for spot symbols and are skipped there.
    fn applies_to(&self, market_type: MarketType) -> bool {
        let _ = market_type;
        true
    }

    fn calculate(
        &self,
        candles: &[Candle],
        symbol: &str,
        timeframe: Timeframe,
        market_type: MarketType,
        context: &ContextBundle,
    ) -> Result<FeatureResult>;
}

// =============================================================================
// Shared normalisation rules
// =============================================================================
//
// The concrete scaling rules live here so every calculator of the same shape
// normalises identically and the rules are testable in one place.

/// RSI normalisation: >= 70 bearish scaled over 70..100, <= 30 bullish scaled
/// over 30..0, in between a weak lean toward the 50-midline side at 30%
/// strength.
pub fn rsi_signal(rsi: f64) -> (i8, f64) {
    if rsi >= 70.0 {
        (-1, ((rsi - 70.0) / 30.0).min(1.0))
    } else if rsi <= 30.0 {
        (1, ((30.0 - rsi) / 30.0).min(1.0))
    } else if rsi > 50.0 {
        (-1, (rsi - 50.0) / 20.0 * 0.3)
    } else {
        (1, (50.0 - rsi) / 20.0 * 0.3)
    }
}

/// ADX/DI normalisation: ADX below 18 means no trend; direction follows the
/// dominant DI; strength scales across the 18–40 band (40+ re-scales over
/// 40..80) with a 1.2x boost when the DI spread reaches 20 points.
pub fn adx_signal(adx: f64, plus_di: f64, minus_di: f64) -> (i8, f64) {
    if adx < 18.0 {
        return (0, 0.0);
    }

    let direction = if plus_di > minus_di {
        1
    } else if minus_di > plus_di {
        -1
    } else {
        return (0, 0.0);
    };

    let mut strength = if adx >= 40.0 {
        ((adx - 40.0) / 40.0).min(1.0)
    } else {
        (adx - 18.0) / 22.0
    };

    if (plus_di - minus_di).abs() >= 20.0 {
        strength = (strength * 1.2).min(1.0);
    }

    (direction, strength)
}

/// Bollinger %B normalisation: beyond the bands is a strong reversal signal
/// scaled by the overshoot, the outer 20% of the band range a moderate one,
/// the middle zone neutral.
pub fn percent_b_signal(percent_b: f64) -> (i8, f64) {
    if percent_b > 1.0 {
        (-1, ((percent_b - 1.0) * 10.0).min(1.0))
    } else if percent_b < 0.0 {
        (1, (percent_b.abs() * 10.0).min(1.0))
    } else if percent_b > 0.8 {
        (-1, (percent_b - 0.8) / 0.2 * 0.5)
    } else if percent_b < 0.2 {
        (1, (0.2 - percent_b) / 0.2 * 0.5)
    } else {
        (0, 0.0)
    }
}

/// Moving-average cross normalisation: a fresh cross boosts strength 1.5x;
/// otherwise alignment of the MAs plus price on the far side gives a signal
/// scaled by the MA spread (5% spread = full strength).
pub fn ma_cross_signal(
    fast: f64,
    slow: f64,
    price: f64,
    prev_fast: f64,
    prev_slow: f64,
) -> (i8, f64) {
    if slow == 0.0 {
        return (0, 0.0);
    }

    let crossed_up = prev_fast <= prev_slow && fast > slow;
    let crossed_down = prev_fast >= prev_slow && fast < slow;
    let spread_pct = (fast - slow).abs() / slow * 100.0;

    let above_both = price > fast && price > slow;
    let below_both = price < fast && price < slow;

    if crossed_up || (fast > slow && above_both) {
        let mut strength = (spread_pct / 5.0).min(1.0);
        if crossed_up {
            strength = (strength * 1.5).min(1.0);
        }
        (1, strength)
    } else if crossed_down || (fast < slow && below_both) {
        let mut strength = (spread_pct / 5.0).min(1.0);
        if crossed_down {
            strength = (strength * 1.5).min(1.0);
        }
        (-1, strength)
    } else {
        (0, 0.0)
    }
}

/// MACD normalisation: histogram magnitude sets strength (5.0 = full), a
/// fresh zero-cross boosts it 1.5x, disagreement between line position and
/// histogram sign is neutral.
pub fn macd_signal(macd_line: f64, signal_line: f64, histogram: f64, prev_histogram: f64) -> (i8, f64) {
    let crossed_up = prev_histogram <= 0.0 && histogram > 0.0;
    let crossed_down = prev_histogram >= 0.0 && histogram < 0.0;

    let base = (histogram.abs() / 5.0).min(1.0);

    if crossed_up || (macd_line > signal_line && histogram > 0.0) {
        let strength = if crossed_up { (base * 1.5).min(1.0) } else { base };
        (1, strength)
    } else if crossed_down || (macd_line < signal_line && histogram < 0.0) {
        let strength = if crossed_down { (base * 1.5).min(1.0) } else { base };
        (-1, strength)
    } else {
        (0, 0.0)
    }
}

/// Volume-spike normalisation: a spike above 2x average takes the direction
/// of a concurrent >1% price move (spike without direction is weak noise);
/// below half the average volume signals low conviction.
pub fn volume_signal(current_volume: f64, avg_volume: f64, price_change_pct: f64) -> (i8, f64) {
    if avg_volume == 0.0 {
        return (0, 0.0);
    }
    let ratio = current_volume / avg_volume;

    if ratio > 2.0 {
        let strength = ((ratio - 2.0) / 3.0).min(1.0);
        if price_change_pct > 1.0 {
            (1, strength)
        } else if price_change_pct < -1.0 {
            (-1, strength)
        } else {
            (0, strength * 0.3)
        }
    } else if ratio < 0.5 {
        (0, 0.1)
    } else {
        (0, 0.0)
    }
}
