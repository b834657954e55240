// =============================================================================
// Market data primitives — candles, market types, timeframes
// =============================================================================
//
// The decision pipeline operates on a read-only, ascending-time slice of OHLCV
// candles.  Acquisition (exchange clients, caching, gap filling) happens in an
// external collaborator; everything in this crate assumes the slice it is
// handed is already ordered and complete.

use serde::{Deserialize, Serialize};

/// A single OHLCV bar.  `timestamp` is the bar open time in epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

/// Extract closing prices from a candle slice (same order).
pub fn closes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close).collect()
}

/// The venue type a symbol trades on.  Derivatives-only features (funding,
/// open interest, basis, liquidations) are skipped for spot markets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketType {
    Spot,
    Perpetual,
    Futures,
}

impl MarketType {
    /// True for venues that carry funding / open-interest context.
    pub fn is_derivatives(self) -> bool {
        matches!(self, Self::Perpetual | Self::Futures)
    }
}

impl std::fmt::Display for MarketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spot => write!(f, "SPOT"),
            Self::Perpetual => write!(f, "PERPETUAL"),
            Self::Futures => write!(f, "FUTURES"),
        }
    }
}

/// Horizon class used to pick a weight preset in the Layer-1 scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Horizon {
    Short,
    Medium,
    Long,
}

/// Evaluation timeframe.  Controls weight presets and the backtest window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    M15,
    H1,
    H4,
    D1,
    W1,
}

impl Timeframe {
    /// Canonical short label ("15m", "1h", ...).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::M15 => "15m",
            Self::H1 => "1h",
            Self::H4 => "4h",
            Self::D1 => "1d",
            Self::W1 => "1w",
        }
    }

    /// Parse from the canonical short label.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "15m" => Some(Self::M15),
            "1h" => Some(Self::H1),
            "4h" => Some(Self::H4),
            "1d" => Some(Self::D1),
            "1w" => Some(Self::W1),
            _ => None,
        }
    }

    /// Bar length in minutes.
    pub fn minutes(self) -> u32 {
        match self {
            Self::M15 => 15,
            Self::H1 => 60,
            Self::H4 => 240,
            Self::D1 => 1_440,
            Self::W1 => 10_080,
        }
    }

    /// Weight-preset horizon: intraday frames lean on oscillators and flow,
    /// the weekly frame leans on trend structure and macro.
    pub fn horizon(self) -> Horizon {
        match self {
            Self::M15 | Self::H1 | Self::H4 => Horizon::Short,
            Self::D1 => Horizon::Medium,
            Self::W1 => Horizon::Long,
        }
    }

    /// Number of forward bars the backtester scans before declaring a timeout.
    pub fn backtest_window(self) -> usize {
        match self {
            Self::M15 => 24,
            Self::H1 => 48,
            Self::H4 => 72,
            Self::D1 => 30,
            Self::W1 => 12,
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeframe_round_trip() {
        for tf in [
            Timeframe::M15,
            Timeframe::H1,
            Timeframe::H4,
            Timeframe::D1,
            Timeframe::W1,
        ] {
            assert_eq!(Timeframe::parse(tf.as_str()), Some(tf));
        }
        assert_eq!(Timeframe::parse("3m"), None);
    }

    #[test]
    fn timeframe_horizons() {
        assert_eq!(Timeframe::M15.horizon(), Horizon::Short);
        assert_eq!(Timeframe::H4.horizon(), Horizon::Short);
        assert_eq!(Timeframe::D1.horizon(), Horizon::Medium);
        assert_eq!(Timeframe::W1.horizon(), Horizon::Long);
    }

    #[test]
    fn backtest_windows() {
        assert_eq!(Timeframe::M15.backtest_window(), 24);
        assert_eq!(Timeframe::H1.backtest_window(), 48);
        assert_eq!(Timeframe::H4.backtest_window(), 72);
        assert_eq!(Timeframe::D1.backtest_window(), 30);
        assert_eq!(Timeframe::W1.backtest_window(), 12);
    }

    #[test]
    fn market_type_derivatives() {
        assert!(!MarketType::Spot.is_derivatives());
        assert!(MarketType::Perpetual.is_derivatives());
        assert!(MarketType::Futures.is_derivatives());
    }

    #[test]
    fn closes_extraction() {
        let candles = vec![
            Candle::new(0, 1.0, 2.0, 0.5, 1.5, 10.0),
            Candle::new(1, 1.5, 2.5, 1.0, 2.0, 12.0),
        ];
        assert_eq!(closes(&candles), vec![1.5, 2.0]);
    }
}
