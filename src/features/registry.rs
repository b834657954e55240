// =============================================================================
// Feature Registry
// =============================================================================
//
// Explicitly constructed, immutable collection of feature calculators.  Built
// once at startup and shared read-only across evaluations; registration order
// is preserved so repeated runs visit features in the same order and produce
// identical output.

use crate::features::{
    derivatives, intermarket, macro_econ, sentiment, technical, volatility, volume, Feature,
    FeatureCategory,
};
use crate::market_data::MarketType;

pub struct FeatureRegistry {
    features: Vec<Box<dyn Feature>>,
}

impl FeatureRegistry {
    /// An empty registry; mostly useful in tests.
    pub fn empty() -> Self {
        Self {
            features: Vec::new(),
        }
    }

    /// The standard calculator set: technical structure, volatility, volume,
    /// macro, intermarket, sentiment and crypto-derivatives features.
    pub fn standard() -> Self {
        let mut registry = Self::empty();

        // Technical
        registry.register(Box::new(technical::Rsi::default()));
        registry.register(Box::new(technical::Macd::default()));
        registry.register(Box::new(technical::Stochastic::default()));
        registry.register(Box::new(technical::BollingerPosition::default()));
        registry.register(Box::new(technical::Adx::default()));
        registry.register(Box::new(technical::EmaCross::default()));
        registry.register(Box::new(technical::SmaDistance::default()));
        registry.register(Box::new(technical::MaCrossover::default()));
        registry.register(Box::new(technical::PriceMomentum::default()));
        registry.register(Box::new(technical::Supertrend::default()));

        // Volatility
        registry.register(Box::new(volatility::AtrPercentile::default()));
        registry.register(Box::new(volatility::BandWidth::default()));

        // Volume
        registry.register(Box::new(volume::VwapDistance));
        registry.register(Box::new(volume::VolumeRatio::default()));

        // Macro
        registry.register(Box::new(macro_econ::Dxy));
        registry.register(Box::new(macro_econ::Vix));
        registry.register(Box::new(macro_econ::TreasuryYield));
        registry.register(Box::new(macro_econ::RealYields));
        registry.register(Box::new(macro_econ::InflationExpectations));

        // Intermarket
        registry.register(Box::new(intermarket::GoldSilverRatio));
        registry.register(Box::new(intermarket::CopperGoldRatio));
        registry.register(Box::new(intermarket::GoldOilRatio));
        registry.register(Box::new(intermarket::MinersGoldRatio));
        registry.register(Box::new(intermarket::GldFlow));
        registry.register(Box::new(intermarket::BtcDominance));

        // Sentiment
        registry.register(Box::new(sentiment::NewsSentiment));
        registry.register(Box::new(sentiment::FearGauge));

        // Crypto derivatives
        registry.register(Box::new(derivatives::FundingRate));
        registry.register(Box::new(derivatives::OpenInterest));
        registry.register(Box::new(derivatives::Basis));
        registry.register(Box::new(derivatives::Liquidations));
        registry.register(Box::new(derivatives::OiVolumeRatio));
        registry.register(Box::new(derivatives::OrderBookImbalance));

        registry
    }

    /// Register a calculator.  Last registration wins on a name collision.
    pub fn register(&mut self, feature: Box<dyn Feature>) {
        if let Some(existing) = self
            .features
            .iter_mut()
            .find(|f| f.name() == feature.name())
        {
            *existing = feature;
        } else {
            self.features.push(feature);
        }
    }

    /// Look up a calculator by name.
    pub fn get(&self, name: &str) -> Option<&dyn Feature> {
        self.features
            .iter()
            .find(|f| f.name() == name)
            .map(|f| f.as_ref())
    }

    /// All registered names, in registration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.features.iter().map(|f| f.name()).collect()
    }

    /// All calculators in a category, in registration order.
    pub fn by_category(&self, category: FeatureCategory) -> Vec<&dyn Feature> {
        self.features
            .iter()
            .filter(|f| f.category() == category)
            .map(|f| f.as_ref())
            .collect()
    }

    /// Calculators applicable to the given venue, in registration order.
    pub fn applicable(&self, market_type: MarketType) -> impl Iterator<Item = &dyn Feature> {
        self.features
            .iter()
            .filter(move |f| f.applies_to(market_type))
            .map(|f| f.as_ref())
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_registry_has_full_roster() {
        let registry = FeatureRegistry::standard();
        assert_eq!(registry.len(), 33);
        assert!(registry.get("rsi").is_some());
        assert!(registry.get("funding_rate").is_some());
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn category_grouping() {
        let registry = FeatureRegistry::standard();
        assert_eq!(registry.by_category(FeatureCategory::Technical).len(), 10);
        assert_eq!(registry.by_category(FeatureCategory::Volatility).len(), 2);
        assert_eq!(registry.by_category(FeatureCategory::Volume).len(), 2);
        assert_eq!(registry.by_category(FeatureCategory::Macro).len(), 5);
        assert_eq!(registry.by_category(FeatureCategory::Intermarket).len(), 6);
        assert_eq!(registry.by_category(FeatureCategory::Sentiment).len(), 2);
        assert_eq!(
            registry.by_category(FeatureCategory::CryptoDerivatives).len(),
            6
        );
    }

    #[test]
    fn spot_filtering_drops_derivatives_features() {
        let registry = FeatureRegistry::standard();
        let spot: Vec<_> = registry.applicable(MarketType::Spot).collect();
        let perp: Vec<_> = registry.applicable(MarketType::Perpetual).collect();
        assert_eq!(spot.len(), 27);
        assert_eq!(perp.len(), 33);
        assert!(spot.iter().all(|f| f.name() != "funding_rate"));
    }

    #[test]
    fn names_preserve_registration_order() {
        let registry = FeatureRegistry::standard();
        let names = registry.names();
        assert_eq!(names[0], "rsi");
        assert_eq!(*names.last().unwrap(), "orderbook_imbalance");
    }
}
