// =============================================================================
// Polaris Oracle — Demonstration Entry Point
// =============================================================================
//
// Drives the full library pipeline on deterministic synthetic data the way a
// host process would: build the registry once, evaluate a decision, print it,
// then replay a walk-forward backtest over the same history.  No network and
// no storage — those belong to external collaborators.
// =============================================================================

use std::collections::BTreeMap;

use chrono::Utc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use polaris_oracle::backtest::Backtester;
use polaris_oracle::config::EngineConfig;
use polaris_oracle::context::{macro_keys, ContextBundle, SentimentContext};
use polaris_oracle::engine::DecisionEngine;
use polaris_oracle::features::FeatureRegistry;
use polaris_oracle::market_data::{Candle, MarketType, Timeframe};

/// Deterministic synthetic OHLCV history: a slow trend with two overlaid
/// sine cycles.  No RNG, so every run produces identical bars.
fn synthetic_candles(n: usize) -> Vec<Candle> {
    (0..n)
        .map(|i| {
            let t = i as f64;
            let trend = 1_800.0 + t * 0.9;
            let swing = (t * 0.11).sin() * 14.0 + (t * 0.031).cos() * 22.0;
            let close = trend + swing;
            let open = trend + ((t - 1.0) * 0.11).sin() * 14.0 + ((t - 1.0) * 0.031).cos() * 22.0;
            let high = open.max(close) + 4.0;
            let low = open.min(close) - 4.0;
            let volume = 1_000.0 + (t * 0.7).sin().abs() * 600.0;
            Candle::new(i as i64 * 3_600_000, open, high, low, close, volume)
        })
        .collect()
}

/// Deterministic macro/sentiment context aligned with the candle history.
fn synthetic_context(n: usize) -> ContextBundle {
    let mut macro_data = BTreeMap::new();
    macro_data.insert(
        macro_keys::DXY.to_string(),
        (0..n).map(|i| 104.0 + (i as f64 * 0.05).sin() * 1.5).collect(),
    );
    macro_data.insert(
        macro_keys::VIX.to_string(),
        (0..n).map(|i| 18.0 + (i as f64 * 0.07).sin() * 4.0).collect(),
    );
    macro_data.insert(
        macro_keys::TNX.to_string(),
        (0..n).map(|i| 4.2 + (i as f64 * 0.03).sin() * 0.2).collect(),
    );
    macro_data.insert(
        macro_keys::TIP.to_string(),
        (0..n).map(|i| 108.0 + (i as f64 * 0.02).cos() * 0.8).collect(),
    );

    ContextBundle {
        macro_data,
        intermarket: BTreeMap::new(),
        derivatives: None,
        sentiment: Some(SentimentContext {
            fear_index: 0.18,
            article_count: 42,
            urgency: 0.35,
        }),
    }
}

fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(started_at = %Utc::now().to_rfc3339(), "Polaris Oracle demo starting");

    let mut config = EngineConfig::load("polaris_config.json").unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        EngineConfig::default()
    });
    if let Ok(symbol) = std::env::var("POLARIS_SYMBOL") {
        if !symbol.trim().is_empty() {
            config.symbol = symbol.trim().to_uppercase();
        }
    }

    let registry = FeatureRegistry::standard();
    info!(features = registry.len(), symbol = %config.symbol, "registry built");

    // ── 1. One full evaluation on the latest data ────────────────────────
    let candles = synthetic_candles(720);
    let context = synthetic_context(720);
    let engine = DecisionEngine::new(&registry);

    let report = engine.evaluate_full(
        &config.symbol,
        MarketType::Spot,
        Timeframe::H1,
        &candles,
        &context,
        &config,
    );

    info!(
        signal = %report.decision.signal,
        bias = %report.decision.bias,
        confidence = report.decision.confidence,
        raw_score = format!("{:.3}", report.decision.raw_score),
        should_fire = report.gate.should_fire,
        "decision ready"
    );
    println!("{}", serde_json::to_string_pretty(&report.decision)?);
    println!("gate: {}", report.gate.reason);

    // ── 2. Walk-forward backtest over the same history ───────────────────
    let window = Timeframe::H1.backtest_window();
    let mut decisions = Vec::new();
    let mut anchor = 300;
    while anchor + window < candles.len() {
        let decision = engine.evaluate(
            &config.symbol,
            MarketType::Spot,
            Timeframe::H1,
            &candles[..anchor],
            &context,
            None,
        );
        decisions.push((decision, anchor));
        anchor += 24;
    }

    let mut backtester = Backtester::new();
    let cases = decisions
        .iter()
        .map(|(decision, anchor)| (decision, &candles[*anchor..]));
    let metrics = backtester.run(cases);

    info!(
        evaluated = decisions.len(),
        simulated = metrics.total_trades,
        win_rate = format!("{:.1}%", metrics.win_rate),
        "backtest complete"
    );
    println!("{}", serde_json::to_string_pretty(&metrics)?);

    Ok(())
}
