// =============================================================================
// Engine Configuration
// =============================================================================
//
// Tunables for the evaluation pipeline: consensus gating thresholds, quality
// filter toggle and optional per-feature weight overrides.  Every field
// carries `#[serde(default)]` so loading an older config file never breaks
// when new fields are added.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_min_consensus_pct() -> f64 {
    60.0
}

fn default_true() -> bool {
    true
}

fn default_symbol() -> String {
    "XAUUSD".to_string()
}

// =============================================================================
// EngineConfig
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Default symbol evaluated by the demo binary.
    #[serde(default = "default_symbol")]
    pub symbol: String,

    /// Minimum consensus percentage the gate requires before a signal fires.
    #[serde(default = "default_min_consensus_pct")]
    pub min_consensus_pct: f64,

    /// Whether signals may fire with unresolved category conflicts.
    #[serde(default)]
    pub allow_conflicts: bool,

    /// Whether the quality/anomaly overlay may downgrade decisions.
    #[serde(default = "default_true")]
    pub apply_quality_filters: bool,

    /// Per-feature weight overrides; features not listed use the horizon
    /// presets.
    #[serde(default)]
    pub feature_weights: HashMap<String, f64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            min_consensus_pct: default_min_consensus_pct(),
            allow_conflicts: false,
            apply_quality_filters: true,
            feature_weights: HashMap::new(),
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file.  Missing fields fall back to defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        info!(path = %path.display(), "engine config loaded");
        Ok(config)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = EngineConfig::default();
        assert_eq!(config.min_consensus_pct, 60.0);
        assert!(!config.allow_conflicts);
        assert!(config.apply_quality_filters);
        assert!(config.feature_weights.is_empty());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"min_consensus_pct": 70.0}"#).unwrap();
        assert_eq!(config.min_consensus_pct, 70.0);
        assert!(config.apply_quality_filters);
        assert_eq!(config.symbol, "XAUUSD");
    }

    #[test]
    fn weight_overrides_round_trip() {
        let mut config = EngineConfig::default();
        config.feature_weights.insert("rsi".to_string(), 2.0);
        let json = serde_json::to_string(&config).unwrap();
        let parsed: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.feature_weights["rsi"], 2.0);
    }

    #[test]
    fn load_missing_file_errors_with_context() {
        let error = EngineConfig::load("/nonexistent/config.json").unwrap_err();
        assert!(error.to_string().contains("failed to read config file"));
    }
}
