// =============================================================================
// Consensus Engine — category-level vote tallying and conflict detection
// =============================================================================
//
// Re-reads the same feature results as the scorer, but as votes: every
// feature's direction counts one bull/bear/neutral vote inside its category.
// The engine reports how strongly the features agree, which category pairs
// are fighting each other, and recalibrates confidence accordingly.  A gate
// (`should_fire`) rejects signals below the consensus threshold, with
// unresolved conflicts, or with too few votes to mean anything.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::features::{FeatureCategory, FeatureResult};

/// Categories participating in the vote.  Volatility and crypto-spot features
/// still vote when present; this list pins the category map's iteration
/// order and the conflict pairs below.
const VOTING_CATEGORIES: [FeatureCategory; 6] = [
    FeatureCategory::Technical,
    FeatureCategory::Macro,
    FeatureCategory::CryptoDerivatives,
    FeatureCategory::Intermarket,
    FeatureCategory::Sentiment,
    FeatureCategory::Volume,
];

/// Category pairs checked for opposing dominant directions.
const CONFLICT_PAIRS: [(FeatureCategory, FeatureCategory); 5] = [
    (FeatureCategory::Technical, FeatureCategory::Macro),
    (FeatureCategory::Technical, FeatureCategory::Sentiment),
    (FeatureCategory::CryptoDerivatives, FeatureCategory::Technical),
    (FeatureCategory::Volume, FeatureCategory::Technical),
    (FeatureCategory::Intermarket, FeatureCategory::Technical),
];

// =============================================================================
// Vote types
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryVotes {
    pub bull: u32,
    pub bear: u32,
    pub neutral: u32,
}

impl CategoryVotes {
    pub fn total(&self) -> u32 {
        self.bull + self.bear + self.neutral
    }

    /// Dominant direction: +1 bull, -1 bear, 0 neutral/tied.
    pub fn direction(&self) -> i8 {
        if self.bull > self.bear && self.bull > self.neutral {
            1
        } else if self.bear > self.bull && self.bear > self.neutral {
            -1
        } else {
            0
        }
    }

    /// Majority-vote fraction within the category, in [0, 1].
    pub fn strength(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.bull.max(self.bear).max(self.neutral) as f64 / total as f64
    }
}

/// Four-tier agreement classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgreementLevel {
    StrongConsensus,
    ModerateConsensus,
    WeakConsensus,
    NoConsensus,
}

impl std::fmt::Display for AgreementLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::StrongConsensus => "STRONG_CONSENSUS",
            Self::ModerateConsensus => "MODERATE_CONSENSUS",
            Self::WeakConsensus => "WEAK_CONSENSUS",
            Self::NoConsensus => "NO_CONSENSUS",
        };
        write!(f, "{s}")
    }
}

/// Full consensus breakdown, derived entirely from the feature-result list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    /// Share of all features agreeing on the dominant direction, in percent.
    pub consensus_percentage: f64,
    pub category_votes: BTreeMap<FeatureCategory, CategoryVotes>,
    pub agreement_level: AgreementLevel,
    pub conflicts: Vec<String>,
    pub total_features: u32,
    pub bull_count: u32,
    pub bear_count: u32,
    pub neutral_count: u32,
    /// Fraction of active category pairs sharing a dominant direction.
    pub cross_category_agreement: f64,
}

// =============================================================================
// ConsensusEngine
// =============================================================================

#[derive(Default)]
pub struct ConsensusEngine;

impl ConsensusEngine {
    pub const STRONG_CONSENSUS: f64 = 0.75;
    pub const MODERATE_CONSENSUS: f64 = 0.60;
    pub const WEAK_CONSENSUS: f64 = 0.50;

    /// Tally votes and derive the full consensus breakdown.
    pub fn analyze(&self, features: &[FeatureResult]) -> ConsensusResult {
        let mut votes: BTreeMap<FeatureCategory, CategoryVotes> = VOTING_CATEGORIES
            .iter()
            .map(|c| (*c, CategoryVotes::default()))
            .collect();

        for feature in features {
            let entry = votes.entry(feature.category).or_default();
            match feature.direction {
                d if d > 0 => entry.bull += 1,
                d if d < 0 => entry.bear += 1,
                _ => entry.neutral += 1,
            }
        }

        let bull_count: u32 = votes.values().map(|v| v.bull).sum();
        let bear_count: u32 = votes.values().map(|v| v.bear).sum();
        let neutral_count: u32 = votes.values().map(|v| v.neutral).sum();
        let total_features = features.len() as u32;

        let consensus = if total_features > 0 {
            bull_count.max(bear_count).max(neutral_count) as f64 / total_features as f64
        } else {
            0.0
        };

        let agreement_level = classify(consensus);
        let conflicts = detect_conflicts(&votes);
        let cross_category_agreement = cross_category_agreement(&votes);

        ConsensusResult {
            consensus_percentage: consensus * 100.0,
            category_votes: votes,
            agreement_level,
            conflicts,
            total_features,
            bull_count,
            bear_count,
            neutral_count,
            cross_category_agreement,
        }
    }

    /// Recalibrate confidence from the consensus breakdown.  All three
    /// factors compose multiplicatively; the result is clamped to [0, 100].
    pub fn adjust_confidence(&self, base: f64, consensus: &ConsensusResult) -> (f64, String) {
        let mut factor = 1.0;
        let mut parts = Vec::new();

        match consensus.agreement_level {
            AgreementLevel::StrongConsensus => {
                factor *= 1.15;
                parts.push(format!(
                    "Strong consensus ({:.0}%)",
                    consensus.consensus_percentage
                ));
            }
            AgreementLevel::ModerateConsensus => {
                factor *= 1.05;
                parts.push(format!(
                    "Moderate consensus ({:.0}%)",
                    consensus.consensus_percentage
                ));
            }
            AgreementLevel::WeakConsensus => {
                factor *= 0.95;
                parts.push(format!(
                    "Weak consensus ({:.0}%)",
                    consensus.consensus_percentage
                ));
            }
            AgreementLevel::NoConsensus => {
                factor *= 0.80;
                parts.push(format!(
                    "No consensus ({:.0}%)",
                    consensus.consensus_percentage
                ));
            }
        }

        if !consensus.conflicts.is_empty() {
            factor *= 1.0 - 0.10 * consensus.conflicts.len() as f64;
            parts.push(format!("{} conflict(s) detected", consensus.conflicts.len()));
        }

        if consensus.cross_category_agreement >= 0.8 {
            factor *= 1.10;
            parts.push(format!(
                "High cross-category agreement ({:.0}%)",
                consensus.cross_category_agreement * 100.0
            ));
        } else if consensus.cross_category_agreement <= 0.4 {
            factor *= 0.90;
            parts.push(format!(
                "Low cross-category agreement ({:.0}%)",
                consensus.cross_category_agreement * 100.0
            ));
        }

        let adjusted = (base * factor).clamp(0.0, 100.0);
        (adjusted, parts.join(" | "))
    }

    /// Gate: fire only above the consensus threshold, without unresolved
    /// conflicts (unless allowed) and with at least five votes.
    pub fn should_fire(
        &self,
        consensus: &ConsensusResult,
        min_consensus_pct: f64,
        allow_conflicts: bool,
    ) -> (bool, String) {
        if consensus.consensus_percentage < min_consensus_pct {
            return (
                false,
                format!(
                    "Consensus {:.0}% below threshold {:.0}%",
                    consensus.consensus_percentage, min_consensus_pct
                ),
            );
        }

        if !allow_conflicts && !consensus.conflicts.is_empty() {
            return (
                false,
                format!("Conflicts detected: {}", consensus.conflicts.join("; ")),
            );
        }

        if consensus.total_features < 5 {
            return (
                false,
                format!(
                    "Insufficient features ({} < 5 required)",
                    consensus.total_features
                ),
            );
        }

        (
            true,
            format!(
                "Consensus criteria met ({:.0}%)",
                consensus.consensus_percentage
            ),
        )
    }

    /// Human-readable one-paragraph summary of the breakdown.
    pub fn summary(&self, consensus: &ConsensusResult) -> String {
        let (direction, _count) = if consensus.bull_count > consensus.bear_count {
            ("bullish", consensus.bull_count)
        } else if consensus.bear_count > consensus.bull_count {
            ("bearish", consensus.bear_count)
        } else {
            ("neutral", consensus.neutral_count)
        };

        let mut parts = vec![format!(
            "{} {direction} ({:.0}%): {} bull, {} bear, {} neutral",
            consensus.agreement_level,
            consensus.consensus_percentage,
            consensus.bull_count,
            consensus.bear_count,
            consensus.neutral_count
        )];

        let category_directions: Vec<String> = consensus
            .category_votes
            .iter()
            .filter(|(_, v)| v.total() > 0)
            .map(|(cat, v)| {
                let label = match v.direction() {
                    1 => "bullish",
                    -1 => "bearish",
                    _ => "neutral",
                };
                format!("{cat} {label}")
            })
            .collect();
        if !category_directions.is_empty() {
            parts.push(format!("Categories: {}", category_directions.join(", ")));
        }

        if consensus.conflicts.is_empty() {
            parts.push("No conflicts detected".to_string());
        } else {
            parts.push(format!("Conflicts: {}", consensus.conflicts.join("; ")));
        }

        parts.join(". ")
    }
}

fn classify(consensus: f64) -> AgreementLevel {
    if consensus >= ConsensusEngine::STRONG_CONSENSUS {
        AgreementLevel::StrongConsensus
    } else if consensus >= ConsensusEngine::MODERATE_CONSENSUS {
        AgreementLevel::ModerateConsensus
    } else if consensus >= ConsensusEngine::WEAK_CONSENSUS {
        AgreementLevel::WeakConsensus
    } else {
        AgreementLevel::NoConsensus
    }
}

/// A conflict is reported only when both paired categories hold a strong
/// internal majority (>= 0.6) in opposite directions.
fn detect_conflicts(votes: &BTreeMap<FeatureCategory, CategoryVotes>) -> Vec<String> {
    let mut conflicts = Vec::new();

    for (a, b) in CONFLICT_PAIRS {
        let (Some(votes_a), Some(votes_b)) = (votes.get(&a), votes.get(&b)) else {
            continue;
        };
        if votes_a.total() == 0 || votes_b.total() == 0 {
            continue;
        }

        let dir_a = votes_a.direction();
        let dir_b = votes_b.direction();
        if dir_a == 0 || dir_b == 0 || dir_a == dir_b {
            continue;
        }

        let strength_a = votes_a.strength();
        let strength_b = votes_b.strength();
        if strength_a >= 0.6 && strength_b >= 0.6 {
            let label = |d: i8| if d > 0 { "bullish" } else { "bearish" };
            conflicts.push(format!(
                "{a} {} ({:.0}% agreement) but {b} {} ({:.0}% agreement)",
                label(dir_a),
                strength_a * 100.0,
                label(dir_b),
                strength_b * 100.0
            ));
        }
    }

    conflicts
}

/// Pairwise same-direction fraction across active categories; 1.0 when fewer
/// than two categories voted.
fn cross_category_agreement(votes: &BTreeMap<FeatureCategory, CategoryVotes>) -> f64 {
    let active: Vec<&CategoryVotes> = votes.values().filter(|v| v.total() > 0).collect();
    if active.len() < 2 {
        return 1.0;
    }

    let mut agreements = 0u32;
    let mut comparisons = 0u32;
    for i in 0..active.len() {
        for j in i + 1..active.len() {
            comparisons += 1;
            if active[i].direction() == active[j].direction() {
                agreements += 1;
            }
        }
    }

    if comparisons == 0 {
        1.0
    } else {
        agreements as f64 / comparisons as f64
    }
}
