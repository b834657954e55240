// =============================================================================
// Polaris Oracle — explainable signal-scoring and decision pipeline
// =============================================================================
//
// Converts a price history plus contextual market data (macro indicators,
// derivatives metrics, sentiment) into a single reproducible trading
// decision: a directional signal, a confidence score and trade parameters.
//
// Pipeline:
//
//   FeatureRegistry -> Layer1Scorer -> Layer2Rules -> DecisionOutput
//                            \-> ConsensusEngine -> confidence recalibration
//   DecisionOutput -> quality overlay -> final decision
//   historical decisions + forward bars -> Backtester -> PerformanceMetrics
//
// The core is computation-only: data acquisition, persistence and scheduling
// live in external collaborators.  Identical inputs always produce identical
// output — there is no wall-clock or randomness inside the pipeline.

pub mod backtest;
pub mod config;
pub mod context;
pub mod engine;
pub mod features;
pub mod indicators;
pub mod market_data;

pub use backtest::{Backtester, ExitReason, PerformanceMetrics, TradeOutcome};
pub use config::EngineConfig;
pub use context::{ContextBundle, DerivativesContext, SentimentContext};
pub use engine::{
    Bias, ConsensusEngine, ConsensusResult, DecisionEngine, DecisionOutput, EvaluationReport,
    QualityReport, Signal, TradeParams,
};
pub use features::{Feature, FeatureCategory, FeatureRegistry, FeatureResult};
pub use market_data::{Candle, MarketType, Timeframe};
