// =============================================================================
// Context bundle — auxiliary series handed to the feature calculators
// =============================================================================
//
// Alongside the primary price series, features may consume macro indicator
// series (DXY, VIX, TNX, ...), intermarket series (silver, copper, oil, GDX,
// GLD, ...), derivatives metrics (funding, open interest, mark/index price,
// liquidations, order book) and a news-sentiment snapshot.
//
// Every sub-bundle is optional.  A feature that finds its inputs missing
// returns a neutral, clearly-labelled result instead of failing — the bundle
// itself never validates beyond basic shape.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Well-known macro series keys.
pub mod macro_keys {
    pub const DXY: &str = "DXY";
    pub const VIX: &str = "VIX";
    pub const TNX: &str = "TNX";
    pub const TIP: &str = "TIP";
    pub const REAL_YIELDS: &str = "REAL_YIELDS";
    pub const INFLATION_EXP: &str = "INFLATION_EXP";
}

/// Well-known intermarket series keys.
pub mod intermarket_keys {
    pub const SILVER: &str = "XAGUSD";
    pub const COPPER: &str = "COPPER";
    pub const CRUDE: &str = "CRUDE";
    pub const GDX: &str = "GDX";
    pub const GLD: &str = "GLD";
    pub const GLD_HOLDINGS: &str = "GLD_HOLDINGS";
    pub const BTC_DOMINANCE: &str = "BTC_DOMINANCE";
}

/// Recent long/short liquidation volumes plus a trailing history of totals
/// used to judge whether the latest print is a spike.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LiquidationContext {
    /// Most recent long-side liquidation volume.
    pub long: f64,
    /// Most recent short-side liquidation volume.
    pub short: f64,
    /// Trailing total liquidation volumes (oldest first).
    pub totals: Vec<f64>,
}

/// Aggregated order-book snapshot: (price, quantity) levels, best first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub bids: Vec<(f64, f64)>,
    pub asks: Vec<(f64, f64)>,
}

/// Derivatives-market context for perpetual/futures symbols.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DerivativesContext {
    /// Per-interval (8h) funding rates, oldest first, in the venue's native
    /// percentage units.
    pub funding: Vec<f64>,
    /// Open interest history, oldest first.
    pub open_interest: Vec<f64>,
    pub mark_price: Option<f64>,
    pub index_price: Option<f64>,
    pub liquidations: Option<LiquidationContext>,
    pub order_book: Option<OrderBookSnapshot>,
}

/// News-derived sentiment snapshot.  `fear_index` lives in [-1, 1]: negative
/// means complacency/greed, positive means fear.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SentimentContext {
    pub fear_index: f64,
    pub article_count: u32,
    pub urgency: f64,
}

/// The full context bundle.  `Default` yields an empty bundle, which makes
/// every context-dependent feature degrade to a neutral result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextBundle {
    /// Macro indicator close series keyed by symbol, oldest first.
    pub macro_data: BTreeMap<String, Vec<f64>>,
    /// Intermarket close/value series keyed by symbol, oldest first.
    pub intermarket: BTreeMap<String, Vec<f64>>,
    pub derivatives: Option<DerivativesContext>,
    pub sentiment: Option<SentimentContext>,
}

impl ContextBundle {
    /// Fetch a macro series if present with at least `min_len` points.
    pub fn macro_series(&self, key: &str, min_len: usize) -> Option<&[f64]> {
        self.macro_data
            .get(key)
            .filter(|s| s.len() >= min_len)
            .map(|s| s.as_slice())
    }

    /// Fetch an intermarket series if present with at least `min_len` points.
    pub fn intermarket_series(&self, key: &str, min_len: usize) -> Option<&[f64]> {
        self.intermarket
            .get(key)
            .filter(|s| s.len() >= min_len)
            .map(|s| s.as_slice())
    }
}
