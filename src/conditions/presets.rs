//! Named preset condition bundles.
//!
//! Presets are ordered spec lists combined with AND. The built-in set
//! mirrors the strategies the screener is typically run with; user presets
//! from configuration are merged on top (same name overrides) and every
//! bundle is validated by building it once at load time.

use std::collections::BTreeMap;

use super::spec::{build_all, ConditionSpec};
use super::Condition;
use crate::error::TickwatchError;

/// Registry of named, pre-composed condition bundles.
#[derive(Debug, Clone)]
pub struct PresetRegistry {
    presets: BTreeMap<String, Vec<ConditionSpec>>,
}

fn ma_touch(period: usize, min_price: f64) -> Vec<ConditionSpec> {
    vec![
        ConditionSpec::MinPrice { min_price },
        ConditionSpec::MaTouch {
            period,
            threshold: 0.02,
        },
    ]
}

fn builtin_presets() -> BTreeMap<String, Vec<ConditionSpec>> {
    let mut presets = BTreeMap::new();

    presets.insert("ma_touch_160".to_string(), ma_touch(160, 5000.0));
    presets.insert("ma_touch_120".to_string(), ma_touch(120, 5000.0));
    presets.insert("ma_touch_200".to_string(), ma_touch(200, 5000.0));

    presets.insert(
        "oversold_bounce".to_string(),
        vec![
            ConditionSpec::MinPrice { min_price: 5000.0 },
            ConditionSpec::RsiOversold {
                threshold: 30.0,
                period: 14,
            },
        ],
    );

    presets.insert(
        "golden_cross".to_string(),
        vec![
            ConditionSpec::MinPrice { min_price: 5000.0 },
            ConditionSpec::MaCrossUp {
                short_period: 20,
                long_period: 60,
                lookback: 5,
            },
        ],
    );

    presets.insert(
        "dead_cross".to_string(),
        vec![
            ConditionSpec::MinPrice { min_price: 5000.0 },
            ConditionSpec::MaCrossDown {
                short_period: 20,
                long_period: 60,
                lookback: 5,
            },
        ],
    );

    presets.insert(
        "volume_breakout".to_string(),
        vec![
            ConditionSpec::MinPrice { min_price: 5000.0 },
            ConditionSpec::VolumeSpike {
                multiplier: 2.0,
                period: 20,
            },
        ],
    );

    presets.insert(
        "ma_touch_with_oversold".to_string(),
        vec![
            ConditionSpec::MinPrice { min_price: 5000.0 },
            ConditionSpec::MaTouch {
                period: 160,
                threshold: 0.02,
            },
            ConditionSpec::RsiOversold {
                threshold: 40.0,
                period: 14,
            },
        ],
    );

    presets.insert(
        "trend_following".to_string(),
        vec![
            ConditionSpec::MinPrice { min_price: 5000.0 },
            ConditionSpec::AboveMa {
                period: 20,
                min_distance_pct: 0.0,
            },
            ConditionSpec::AboveMa {
                period: 60,
                min_distance_pct: 0.0,
            },
            ConditionSpec::RsiRange {
                lower: 50.0,
                upper: 70.0,
                period: 14,
            },
        ],
    );

    presets.insert(
        "value_dip".to_string(),
        vec![
            ConditionSpec::MinPrice { min_price: 5000.0 },
            ConditionSpec::BelowMa {
                period: 120,
                max_distance_pct: 0.0,
            },
            ConditionSpec::RsiOversold {
                threshold: 35.0,
                period: 14,
            },
            ConditionSpec::VolumeAboveAverage {
                multiplier: 1.0,
                period: 20,
            },
        ],
    );

    presets.insert(
        "momentum_breakout".to_string(),
        vec![
            ConditionSpec::MinPrice { min_price: 5000.0 },
            ConditionSpec::MaCrossUp {
                short_period: 5,
                long_period: 20,
                lookback: 5,
            },
            ConditionSpec::VolumeSpike {
                multiplier: 1.5,
                period: 20,
            },
        ],
    );

    presets.insert(
        "quiet_accumulation".to_string(),
        vec![
            ConditionSpec::MinPrice { min_price: 5000.0 },
            ConditionSpec::BollingerSqueeze {
                max_width_pct: 10.0,
                period: 20,
                std_devs: 2.0,
            },
            // Quiet tape: volume below 80% of its trailing average
            ConditionSpec::Not {
                of: vec![ConditionSpec::VolumeAboveAverage {
                    multiplier: 0.8,
                    period: 20,
                }],
            },
        ],
    );

    presets
}

impl PresetRegistry {
    /// Registry with only the built-in presets.
    pub fn builtin() -> Self {
        Self {
            presets: builtin_presets(),
        }
    }

    /// Built-ins merged with user presets (same name overrides).
    ///
    /// Every bundle, built-in or user, is validated by building it once;
    /// a malformed bundle fails the whole load.
    pub fn with_user_presets(
        user: &BTreeMap<String, Vec<ConditionSpec>>,
    ) -> Result<Self, TickwatchError> {
        let mut presets = builtin_presets();
        for (name, specs) in user {
            presets.insert(name.clone(), specs.clone());
        }

        for (name, specs) in &presets {
            build_all(specs).map_err(|e| {
                TickwatchError::config(format!("preset '{}' is invalid: {}", name, e))
            })?;
        }

        Ok(Self { presets })
    }

    /// Look up a preset's spec list.
    pub fn get(&self, name: &str) -> Result<&[ConditionSpec], TickwatchError> {
        self.presets.get(name).map(|v| v.as_slice()).ok_or_else(|| {
            TickwatchError::config(format!(
                "unknown preset: {}. Available: {}",
                name,
                self.names().join(", ")
            ))
        })
    }

    /// Build a preset into a single (AND-combined) condition.
    pub fn build(&self, name: &str) -> Result<Box<dyn Condition>, TickwatchError> {
        build_all(self.get(name)?)
    }

    /// Registered preset names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.presets.keys().cloned().collect()
    }
}
