// =============================================================================
// Crypto Derivatives Features — funding, open interest, basis, liquidations
// =============================================================================
//
// Everything here is contrarian or positioning-driven: extreme funding fades
// the crowd, liquidation cascades mark local extremes, the basis reflects
// speculative premium.  All features apply only to perpetual/futures venues
// and degrade to neutral when the derivatives context is missing.

use anyhow::Result;

use crate::context::ContextBundle;
use crate::features::{Feature, FeatureCategory, FeatureMetadata, FeatureResult};
use crate::market_data::{Candle, MarketType, Timeframe};

/// Fraction of the trailing `window` values (at most) that `current` exceeds.
fn percentile_rank(series: &[f64], current: f64, window: usize) -> f64 {
    let n = series.len().min(window);
    if n == 0 {
        return 0.5;
    }
    let tail = &series[series.len() - n..];
    tail.iter().filter(|v| current > **v).count() as f64 / n as f64
}

// =============================================================================
// Funding rate
// =============================================================================

pub struct FundingRate;

impl Feature for FundingRate {
    fn name(&self) -> &'static str {
        "funding_rate"
    }

    fn category(&self) -> FeatureCategory {
        FeatureCategory::CryptoDerivatives
    }

    fn applies_to(&self, market_type: MarketType) -> bool {
        market_type.is_derivatives()
    }

    fn calculate(
        &self,
        _candles: &[Candle],
        _symbol: &str,
        _timeframe: Timeframe,
        _market_type: MarketType,
        context: &ContextBundle,
    ) -> Result<FeatureResult> {
        let Some(funding) = context
            .derivatives
            .as_ref()
            .map(|d| d.funding.as_slice())
            .filter(|f| !f.is_empty())
        else {
            return Ok(FeatureResult::unavailable(
                self.name(),
                self.category(),
                "Funding rate data not available",
            ));
        };

        let rate = funding[funding.len() - 1];
        let percentile = percentile_rank(funding, rate, 30);
        let annualised_pct = rate * 3.0 * 365.0 * 100.0;

        // Crowded longs pay extreme positive funding (fade them); crowded
        // shorts pay extreme negative funding (squeeze fuel).
        let (direction, strength, explanation) = if rate > 0.05 && percentile > 0.8 {
            (
                -1,
                ((rate - 0.05) / 0.05).min(1.0),
                format!(
                    "Funding extremely positive ({annualised_pct:.1}% annual) - crowded longs, risk of squeeze"
                ),
            )
        } else if rate < -0.02 && percentile < 0.2 {
            (
                1,
                (rate.abs() / 0.05).min(1.0),
                format!(
                    "Funding negative ({annualised_pct:.1}% annual) - crowded shorts, risk of squeeze"
                ),
            )
        } else if rate > 0.01 {
            (
                -1,
                0.3,
                format!("Funding moderately positive ({annualised_pct:.1}% annual)"),
            )
        } else if rate < -0.01 {
            (
                1,
                0.3,
                format!("Funding moderately negative ({annualised_pct:.1}% annual)"),
            )
        } else {
            (0, 0.1, format!("Funding neutral ({annualised_pct:.1}% annual)"))
        };

        Ok(
            FeatureResult::new(self.name(), self.category(), rate, direction, strength, explanation)
                .with_metadata(FeatureMetadata {
                    percentile: Some(percentile),
                    annualised_pct: Some(annualised_pct),
                    ..Default::default()
                }),
        )
    }
}

// =============================================================================
// Open interest
// =============================================================================

pub struct OpenInterest;

impl Feature for OpenInterest {
    fn name(&self) -> &'static str {
        "open_interest"
    }

    fn category(&self) -> FeatureCategory {
        FeatureCategory::CryptoDerivatives
    }

    fn applies_to(&self, market_type: MarketType) -> bool {
        market_type.is_derivatives()
    }

    fn calculate(
        &self,
        candles: &[Candle],
        _symbol: &str,
        _timeframe: Timeframe,
        _market_type: MarketType,
        context: &ContextBundle,
    ) -> Result<FeatureResult> {
        let Some(oi) = context
            .derivatives
            .as_ref()
            .map(|d| d.open_interest.as_slice())
            .filter(|oi| oi.len() >= 5)
        else {
            return Ok(FeatureResult::unavailable(
                self.name(),
                self.category(),
                "Open interest data not available",
            ));
        };
        if candles.len() < 5 {
            return Ok(FeatureResult::unavailable(
                self.name(),
                self.category(),
                "Insufficient price history for OI comparison",
            ));
        }

        let current_oi = oi[oi.len() - 1];
        let prev_oi = oi[oi.len() - 5];
        let current_price = candles[candles.len() - 1].close;
        let prev_price = candles[candles.len() - 5].close;
        if prev_oi == 0.0 || prev_price == 0.0 {
            return Ok(FeatureResult::unavailable(
                self.name(),
                self.category(),
                "Degenerate OI/price reference",
            ));
        }

        let oi_change_pct = (current_oi - prev_oi) / prev_oi * 100.0;
        let price_change_pct = (current_price - prev_price) / prev_price * 100.0;

        // Rising OI confirms the move (new positions); falling OI weakens it
        // (covering/unwinding, no fresh commitment).
        let (direction, strength, explanation) = if oi_change_pct > 5.0 {
            if price_change_pct > 2.0 {
                (
                    1,
                    (oi_change_pct / 15.0).min(1.0),
                    format!("OI rising {oi_change_pct:.1}% with price - new longs entering"),
                )
            } else if price_change_pct < -2.0 {
                (
                    -1,
                    (oi_change_pct / 15.0).min(1.0),
                    format!("OI rising {oi_change_pct:.1}% against price - new shorts entering"),
                )
            } else {
                (
                    0,
                    0.4,
                    format!("OI rising {oi_change_pct:.1}% - leverage building"),
                )
            }
        } else if oi_change_pct < -5.0 {
            if price_change_pct > 2.0 {
                (
                    1,
                    0.5,
                    format!("OI falling {oi_change_pct:.1}% with price up - short covering"),
                )
            } else if price_change_pct < -2.0 {
                (
                    -1,
                    0.5,
                    format!("OI falling {oi_change_pct:.1}% with price down - long unwinding"),
                )
            } else {
                (
                    0,
                    0.3,
                    format!("OI falling {oi_change_pct:.1}% - delevering"),
                )
            }
        } else {
            (0, 0.2, format!("OI stable ({oi_change_pct:+.1}%)"))
        };

        Ok(
            FeatureResult::new(self.name(), self.category(), current_oi, direction, strength, explanation)
                .with_metadata(FeatureMetadata {
                    change_pct: Some(oi_change_pct),
                    price_change_pct: Some(price_change_pct),
                    ..Default::default()
                }),
        )
    }
}

// =============================================================================
// Basis (mark vs index)
// =============================================================================

pub struct Basis;

impl Feature for Basis {
    fn name(&self) -> &'static str {
        "basis"
    }

    fn category(&self) -> FeatureCategory {
        FeatureCategory::CryptoDerivatives
    }

    fn applies_to(&self, market_type: MarketType) -> bool {
        market_type.is_derivatives()
    }

    fn calculate(
        &self,
        _candles: &[Candle],
        _symbol: &str,
        _timeframe: Timeframe,
        _market_type: MarketType,
        context: &ContextBundle,
    ) -> Result<FeatureResult> {
        let Some((mark, index)) = context
            .derivatives
            .as_ref()
            .and_then(|d| d.mark_price.zip(d.index_price))
            .filter(|(_, index)| *index != 0.0)
        else {
            return Ok(FeatureResult::unavailable(
                self.name(),
                self.category(),
                "Mark/index price not available",
            ));
        };

        let basis_pct = (mark - index) / index * 100.0;

        let (direction, strength, explanation) = if basis_pct > 0.5 {
            (
                1,
                (basis_pct / 2.0).min(1.0),
                format!("Perp trading at {basis_pct:.2}% premium - bullish sentiment"),
            )
        } else if basis_pct < -0.2 {
            (
                -1,
                basis_pct.abs().min(1.0),
                format!("Perp trading at {basis_pct:.2}% discount - bearish sentiment"),
            )
        } else {
            (0, 0.2, format!("Basis near parity ({basis_pct:+.2}%)"))
        };

        Ok(FeatureResult::new(
            self.name(),
            self.category(),
            basis_pct,
            direction,
            strength,
            explanation,
        ))
    }
}

// =============================================================================
// Liquidations
// =============================================================================

pub struct Liquidations;

impl Feature for Liquidations {
    fn name(&self) -> &'static str {
        "liquidations"
    }

    fn category(&self) -> FeatureCategory {
        FeatureCategory::CryptoDerivatives
    }

    fn applies_to(&self, market_type: MarketType) -> bool {
        market_type.is_derivatives()
    }

    fn calculate(
        &self,
        _candles: &[Candle],
        _symbol: &str,
        _timeframe: Timeframe,
        _market_type: MarketType,
        context: &ContextBundle,
    ) -> Result<FeatureResult> {
        let Some(liq) = context.derivatives.as_ref().and_then(|d| d.liquidations.as_ref())
        else {
            return Ok(FeatureResult::unavailable(
                self.name(),
                self.category(),
                "Liquidation data not available",
            ));
        };

        let total = liq.long + liq.short;
        let (long_share, short_share) = if total > 0.0 {
            (liq.long / total, liq.short / total)
        } else {
            (0.5, 0.5)
        };

        let avg = if liq.totals.is_empty() {
            total
        } else {
            let n = liq.totals.len().min(20);
            let tail = &liq.totals[liq.totals.len() - n..];
            tail.iter().sum::<f64>() / n as f64
        };
        let ratio_vs_avg = if avg > 0.0 { total / avg } else { 1.0 };

        // A cascade that flushes one side tends to mark a local extreme in
        // that direction, so the signal is contrarian.
        let (direction, strength, explanation) = if ratio_vs_avg > 3.0 {
            if long_share > 0.7 {
                (
                    1,
                    ((ratio_vs_avg - 3.0) / 5.0).min(1.0),
                    format!("Large long liquidations ({ratio_vs_avg:.1}x avg) - potential bottom"),
                )
            } else if short_share > 0.7 {
                (
                    -1,
                    ((ratio_vs_avg - 3.0) / 5.0).min(1.0),
                    format!("Large short liquidations ({ratio_vs_avg:.1}x avg) - potential top"),
                )
            } else {
                (0, 0.5, format!("Mixed liquidations ({ratio_vs_avg:.1}x avg)"))
            }
        } else {
            (0, 0.1, "Normal liquidation levels".to_string())
        };

        Ok(
            FeatureResult::new(self.name(), self.category(), total, direction, strength, explanation)
                .with_metadata(FeatureMetadata {
                    long_share: Some(long_share),
                    short_share: Some(short_share),
                    ratio_vs_avg: Some(ratio_vs_avg),
                    ..Default::default()
                }),
        )
    }
}

// =============================================================================
// OI / volume ratio — leverage intensity
// =============================================================================

pub struct OiVolumeRatio;

impl Feature for OiVolumeRatio {
    fn name(&self) -> &'static str {
        "oi_volume_ratio"
    }

    fn category(&self) -> FeatureCategory {
        FeatureCategory::CryptoDerivatives
    }

    fn applies_to(&self, market_type: MarketType) -> bool {
        market_type.is_derivatives()
    }

    fn calculate(
        &self,
        candles: &[Candle],
        _symbol: &str,
        _timeframe: Timeframe,
        _market_type: MarketType,
        context: &ContextBundle,
    ) -> Result<FeatureResult> {
        let Some(oi) = context
            .derivatives
            .as_ref()
            .map(|d| d.open_interest.as_slice())
            .filter(|oi| !oi.is_empty())
        else {
            return Ok(FeatureResult::unavailable(
                self.name(),
                self.category(),
                "OI data not available",
            ));
        };
        let Some(current_volume) = candles.last().map(|c| c.volume).filter(|v| *v > 0.0) else {
            return Ok(FeatureResult::unavailable(
                self.name(),
                self.category(),
                "No volume data",
            ));
        };

        let current_ratio = oi[oi.len() - 1] / current_volume;

        // Historical ratios from the paired tails of the OI and volume series.
        let n = oi.len().min(candles.len()).min(30);
        let history: Vec<f64> = (0..n)
            .filter_map(|i| {
                let oi_value = oi[oi.len() - n + i];
                let volume = candles[candles.len() - n + i].volume;
                (volume > 0.0).then(|| oi_value / volume)
            })
            .collect();
        let percentile = percentile_rank(&history, current_ratio, 30);

        // Leverage intensity is risk information, not direction.
        let (strength, explanation) = if percentile > 0.8 {
            (0.7, "High OI/Vol ratio - elevated leverage, expect volatility".to_string())
        } else if percentile < 0.2 {
            (0.3, "Low OI/Vol ratio - low leverage, stable conditions".to_string())
        } else {
            (0.2, "Normal OI/Vol ratio".to_string())
        };

        Ok(
            FeatureResult::new(self.name(), self.category(), current_ratio, 0, strength, explanation)
                .with_metadata(FeatureMetadata {
                    percentile: Some(percentile),
                    ..Default::default()
                }),
        )
    }
}

// =============================================================================
// Order-book depth imbalance
// =============================================================================

pub struct OrderBookImbalance;

impl Feature for OrderBookImbalance {
    fn name(&self) -> &'static str {
        "orderbook_imbalance"
    }

    fn category(&self) -> FeatureCategory {
        FeatureCategory::CryptoDerivatives
    }

    fn applies_to(&self, market_type: MarketType) -> bool {
        market_type.is_derivatives()
    }

    fn calculate(
        &self,
        _candles: &[Candle],
        _symbol: &str,
        _timeframe: Timeframe,
        _market_type: MarketType,
        context: &ContextBundle,
    ) -> Result<FeatureResult> {
        let Some(book) = context.derivatives.as_ref().and_then(|d| d.order_book.as_ref())
        else {
            return Ok(FeatureResult::unavailable(
                self.name(),
                self.category(),
                "Order book snapshot not available",
            ));
        };

        let bid_depth: f64 = book.bids.iter().map(|(_, qty)| qty).sum();
        let ask_depth: f64 = book.asks.iter().map(|(_, qty)| qty).sum();
        let total = bid_depth + ask_depth;
        if total <= 0.0 {
            return Ok(FeatureResult::unavailable(
                self.name(),
                self.category(),
                "Order book snapshot is empty",
            ));
        }

        let imbalance = (bid_depth - ask_depth) / total;

        let (direction, strength, explanation) = if imbalance > 0.2 {
            (
                1,
                (imbalance.abs() / 0.6).min(1.0),
                format!("Bid-heavy book (imbalance {imbalance:+.2}) - buy pressure"),
            )
        } else if imbalance < -0.2 {
            (
                -1,
                (imbalance.abs() / 0.6).min(1.0),
                format!("Ask-heavy book (imbalance {imbalance:+.2}) - sell pressure"),
            )
        } else {
            (0, 0.2, format!("Balanced book (imbalance {imbalance:+.2})"))
        };

        Ok(
            FeatureResult::new(self.name(), self.category(), imbalance, direction, strength, explanation)
                .with_metadata(FeatureMetadata {
                    imbalance: Some(imbalance),
                    ..Default::default()
                }),
        )
    }
}
