// =============================================================================
// Sentiment Features — news fear index and composite fear gauge
// =============================================================================
//
// Directions are expressed for a safe-haven asset: market fear is bullish,
// complacency bearish.

use anyhow::Result;

use crate::context::{macro_keys, ContextBundle};
use crate::features::{Feature, FeatureCategory, FeatureMetadata, FeatureResult};
use crate::market_data::{Candle, MarketType, Timeframe};

// =============================================================================
// News sentiment
// =============================================================================

pub struct NewsSentiment;

impl Feature for NewsSentiment {
    fn name(&self) -> &'static str {
        "news_sentiment"
    }

    fn category(&self) -> FeatureCategory {
        FeatureCategory::Sentiment
    }

    fn calculate(
        &self,
        _candles: &[Candle],
        _symbol: &str,
        _timeframe: Timeframe,
        _market_type: MarketType,
        context: &ContextBundle,
    ) -> Result<FeatureResult> {
        let Some(sentiment) = &context.sentiment else {
            return Ok(FeatureResult::unavailable(
                self.name(),
                self.category(),
                "News sentiment data not available",
            ));
        };

        let fear = sentiment.fear_index;

        let (direction, mut strength, explanation) = if fear > 0.1 {
            (
                1,
                (fear.abs() * 2.0).min(1.0),
                format!("High market fear ({fear:.3}) - bullish for gold"),
            )
        } else if fear < -0.1 {
            (
                -1,
                (fear.abs() * 2.0).min(1.0),
                format!("Market complacency ({fear:.3}) - bearish for gold"),
            )
        } else {
            (0, 0.3, format!("Neutral sentiment ({fear:.3})"))
        };

        // Urgent coverage amplifies the short-term reading.
        if sentiment.urgency > 0.5 {
            strength = (strength * 1.3).min(1.0);
        }

        Ok(
            FeatureResult::new(self.name(), self.category(), fear, direction, strength, explanation)
                .with_metadata(FeatureMetadata {
                    fear_index: Some(fear),
                    article_count: Some(sentiment.article_count),
                    urgency: Some(sentiment.urgency),
                    ..Default::default()
                }),
        )
    }
}

// =============================================================================
// Composite fear gauge (VIX + news)
// =============================================================================

pub struct FearGauge;

impl Feature for FearGauge {
    fn name(&self) -> &'static str {
        "fear_gauge"
    }

    fn category(&self) -> FeatureCategory {
        FeatureCategory::Sentiment
    }

    fn calculate(
        &self,
        _candles: &[Candle],
        _symbol: &str,
        _timeframe: Timeframe,
        _market_type: MarketType,
        context: &ContextBundle,
    ) -> Result<FeatureResult> {
        let vix = context
            .macro_series(macro_keys::VIX, 1)
            .map(|s| s[s.len() - 1]);
        let news_fear = context.sentiment.as_ref().map(|s| s.fear_index);

        if vix.is_none() && news_fear.is_none() {
            return Ok(FeatureResult::unavailable(
                self.name(),
                self.category(),
                "No fear-gauge inputs available",
            ));
        }

        let mut fear_score = 0.0;
        let mut components = Vec::new();
        if let Some(vix_value) = vix {
            // Normalise around the 15–35 band.
            fear_score += (vix_value - 15.0) / 20.0 * 0.6;
            components.push(format!("VIX: {vix_value:.1}"));
        }
        if let Some(fear) = news_fear {
            fear_score += fear * 0.4;
            components.push(format!("News: {fear:.3}"));
        }
        let components = components.join(", ");

        let (direction, strength, explanation) = if fear_score > 0.3 {
            (
                1,
                fear_score.abs().min(1.0),
                format!("Elevated fear ({fear_score:.3}) - bullish for gold. {components}"),
            )
        } else if fear_score < -0.3 {
            (
                -1,
                fear_score.abs().min(1.0),
                format!("Low fear ({fear_score:.3}) - bearish for gold. {components}"),
            )
        } else {
            (0, 0.3, format!("Normal fear levels ({fear_score:.3}). {components}"))
        };

        Ok(FeatureResult::new(
            self.name(),
            self.category(),
            fear_score,
            direction,
            strength,
            explanation,
        ))
    }
}
