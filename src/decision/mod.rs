//! Decision scoring.
//!
//! Combines named signals with configured weights into a clamped score and
//! an ordered recommendation category. Deterministic for identical inputs;
//! every signal's contribution is kept on the result for explainability.
//! Decisions are recomputed on demand and are never the system of record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::conditions::ConditionResult;
use crate::config::DecisionConfig;

/// Recommendation category, weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Sell,
    Wait,
    Hold,
    Buy,
    StrongBuy,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sell => write!(f, "SELL"),
            Self::Wait => write!(f, "WAIT"),
            Self::Hold => write!(f, "HOLD"),
            Self::Buy => write!(f, "BUY"),
            Self::StrongBuy => write!(f, "STRONG_BUY"),
        }
    }
}

/// A named input signal, 0/1 for binary conditions or normalized to [0, 1]
/// for continuous measures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub name: String,
    pub value: f64,
}

impl Signal {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    /// Binary signal from a boolean.
    pub fn from_bool(name: impl Into<String>, matched: bool) -> Self {
        Self::new(name, if matched { 1.0 } else { 0.0 })
    }
}

/// Per-signal score contribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalContribution {
    /// Signal name
    pub name: String,
    /// Input value
    pub value: f64,
    /// Configured weight (0 when unconfigured)
    pub weight: f64,
    /// weight * value
    pub contribution: f64,
}

/// A scored, categorized recommendation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    /// Ticker the decision applies to
    pub ticker: String,
    /// Clamped weighted score
    pub score: f64,
    /// Category from the threshold band containing the score
    pub category: Category,
    /// Per-signal breakdown, in input order
    pub contributions: Vec<SignalContribution>,
    /// When the decision was computed
    pub generated_at: DateTime<Utc>,
}

/// Weighted-signal scorer.
#[derive(Debug, Clone)]
pub struct DecisionScorer {
    config: DecisionConfig,
}

impl DecisionScorer {
    /// Create a scorer from validated configuration.
    pub fn new(config: DecisionConfig) -> Self {
        Self { config }
    }

    /// Score a set of named signals.
    pub fn score(&self, ticker: &str, signals: &[Signal]) -> Decision {
        let contributions: Vec<SignalContribution> = signals
            .iter()
            .map(|signal| {
                let weight = self
                    .config
                    .weights
                    .get(&signal.name)
                    .copied()
                    .unwrap_or(0.0);
                SignalContribution {
                    name: signal.name.clone(),
                    value: signal.value,
                    weight,
                    contribution: weight * signal.value,
                }
            })
            .collect();

        let raw: f64 = contributions.iter().map(|c| c.contribution).sum();
        let score = raw.clamp(self.config.min_score, self.config.max_score);

        Decision {
            ticker: ticker.to_string(),
            score,
            category: self.category(score),
            contributions,
            generated_at: Utc::now(),
        }
    }

    /// Score a ticker from condition results: each result becomes a binary
    /// signal named after its condition.
    pub fn score_results(&self, ticker: &str, results: &[ConditionResult]) -> Decision {
        let signals: Vec<Signal> = results
            .iter()
            .map(|r| Signal::from_bool(r.condition_name.clone(), r.matched))
            .collect();
        self.score(ticker, &signals)
    }

    /// Resolve the ordered threshold band containing `score`.
    fn category(&self, score: f64) -> Category {
        let bands = &self.config.bands;
        if score >= bands.strong_buy {
            Category::StrongBuy
        } else if score >= bands.buy {
            Category::Buy
        } else if score >= bands.hold {
            Category::Hold
        } else if score >= bands.wait {
            Category::Wait
        } else {
            Category::Sell
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn scorer_with(weights: &[(&str, f64)]) -> DecisionScorer {
        let config = DecisionConfig {
            weights: weights
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect::<BTreeMap<_, _>>(),
            ..DecisionConfig::default()
        };
        DecisionScorer::new(config)
    }

    #[test]
    fn test_weighted_sum_and_band() {
        let scorer = scorer_with(&[("touch_ma", 40.0), ("rsi_oversold", 30.0)]);
        let decision = scorer.score(
            "005930.KS",
            &[
                Signal::from_bool("touch_ma", true),
                Signal::from_bool("rsi_oversold", true),
            ],
        );

        assert!((decision.score - 70.0).abs() < 1e-9);
        assert_eq!(decision.category, Category::Buy);
        assert_eq!(decision.contributions.len(), 2);
        assert!((decision.contributions[0].contribution - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_partial_signals() {
        let scorer = scorer_with(&[("touch_ma", 40.0), ("rsi_oversold", 30.0)]);
        let decision = scorer.score(
            "X",
            &[
                Signal::from_bool("touch_ma", true),
                Signal::from_bool("rsi_oversold", false),
            ],
        );
        assert!((decision.score - 40.0).abs() < 1e-9);
        assert_eq!(decision.category, Category::Hold);
    }

    #[test]
    fn test_continuous_signal() {
        let scorer = scorer_with(&[("trend", 50.0)]);
        let decision = scorer.score("X", &[Signal::new("trend", 0.5)]);
        assert!((decision.score - 25.0).abs() < 1e-9);
        assert_eq!(decision.category, Category::Wait);
    }

    #[test]
    fn test_score_clamped_to_bounds() {
        let scorer = scorer_with(&[("a", 80.0), ("b", 80.0)]);
        let decision = scorer.score(
            "X",
            &[Signal::from_bool("a", true), Signal::from_bool("b", true)],
        );
        assert!((decision.score - 100.0).abs() < 1e-9);
        assert_eq!(decision.category, Category::StrongBuy);

        let scorer = scorer_with(&[("a", -50.0)]);
        let decision = scorer.score("X", &[Signal::from_bool("a", true)]);
        assert!((decision.score - 0.0).abs() < 1e-9);
        assert_eq!(decision.category, Category::Sell);
    }

    #[test]
    fn test_unconfigured_signal_contributes_zero_but_is_recorded() {
        let scorer = scorer_with(&[("known", 40.0)]);
        let decision = scorer.score(
            "X",
            &[
                Signal::from_bool("known", true),
                Signal::from_bool("mystery", true),
            ],
        );
        assert!((decision.score - 40.0).abs() < 1e-9);
        let mystery = &decision.contributions[1];
        assert_eq!(mystery.weight, 0.0);
        assert_eq!(mystery.contribution, 0.0);
    }

    #[test]
    fn test_deterministic_for_identical_inputs() {
        let scorer = scorer_with(&[("a", 33.0), ("b", 27.0)]);
        let signals = vec![Signal::new("a", 1.0), Signal::new("b", 0.5)];
        let first = scorer.score("X", &signals);
        let second = scorer.score("X", &signals);
        assert_eq!(first.score, second.score);
        assert_eq!(first.category, second.category);
    }

    #[test]
    fn test_category_ordering() {
        assert!(Category::StrongBuy > Category::Buy);
        assert!(Category::Buy > Category::Hold);
        assert!(Category::Hold > Category::Wait);
        assert!(Category::Wait > Category::Sell);
    }

    #[test]
    fn test_band_boundaries_inclusive() {
        // Default bands: 75 / 60 / 40 / 20
        let scorer = scorer_with(&[("a", 75.0)]);
        assert_eq!(
            scorer.score("X", &[Signal::from_bool("a", true)]).category,
            Category::StrongBuy
        );
        let scorer = scorer_with(&[("a", 60.0)]);
        assert_eq!(
            scorer.score("X", &[Signal::from_bool("a", true)]).category,
            Category::Buy
        );
    }
}
