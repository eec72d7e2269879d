//! Declarative condition specifications.
//!
//! [`ConditionSpec`] is the closed, serde-tagged configuration form of every
//! condition kind. Specs arrive from config files or API payloads, are
//! validated once by [`ConditionSpec::build`], and only then become live
//! [`Condition`] values. Extending the system means adding a variant here
//! and a match arm in `build`, never runtime reflection.

use serde::{Deserialize, Serialize};

use super::bollinger::BollingerSqueezeCondition;
use super::composite::{AndCondition, NotCondition, OrCondition};
use super::ma::{
    AboveMaCondition, BelowMaCondition, MaCrossDownCondition, MaCrossUpCondition, MaTouchCondition,
};
use super::price::{MaxPriceCondition, MinPriceCondition, PriceChangeCondition, PriceRangeCondition};
use super::rsi::{RsiOverboughtCondition, RsiOversoldCondition, RsiRangeCondition};
use super::volume::{MinVolumeCondition, VolumeAboveAverageCondition, VolumeSpikeCondition};
use super::Condition;
use crate::error::TickwatchError;

/// Tagged condition specification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConditionSpec {
    MinPrice {
        min_price: f64,
    },
    MaxPrice {
        max_price: f64,
    },
    PriceRange {
        min_price: f64,
        max_price: f64,
    },
    PriceChange {
        #[serde(default)]
        min_change_pct: Option<f64>,
        #[serde(default)]
        max_change_pct: Option<f64>,
        #[serde(default = "default_one")]
        days: usize,
    },
    MinVolume {
        min_volume: f64,
    },
    VolumeAboveAverage {
        #[serde(default = "default_volume_multiplier")]
        multiplier: f64,
        #[serde(default = "default_period_20")]
        period: usize,
    },
    VolumeSpike {
        #[serde(default = "default_spike_multiplier")]
        multiplier: f64,
        #[serde(default = "default_period_20")]
        period: usize,
    },
    MaTouch {
        #[serde(default = "default_period_20")]
        period: usize,
        #[serde(default = "default_touch_threshold")]
        threshold: f64,
    },
    AboveMa {
        #[serde(default = "default_period_20")]
        period: usize,
        #[serde(default)]
        min_distance_pct: f64,
    },
    BelowMa {
        #[serde(default = "default_period_20")]
        period: usize,
        #[serde(default)]
        max_distance_pct: f64,
    },
    MaCrossUp {
        #[serde(default = "default_period_20")]
        short_period: usize,
        #[serde(default = "default_period_60")]
        long_period: usize,
        #[serde(default = "default_cross_lookback")]
        lookback: usize,
    },
    MaCrossDown {
        #[serde(default = "default_period_20")]
        short_period: usize,
        #[serde(default = "default_period_60")]
        long_period: usize,
        #[serde(default = "default_cross_lookback")]
        lookback: usize,
    },
    RsiOversold {
        #[serde(default = "default_oversold")]
        threshold: f64,
        #[serde(default = "default_rsi_period")]
        period: usize,
    },
    RsiOverbought {
        #[serde(default = "default_overbought")]
        threshold: f64,
        #[serde(default = "default_rsi_period")]
        period: usize,
    },
    RsiRange {
        #[serde(default = "default_oversold")]
        lower: f64,
        #[serde(default = "default_overbought")]
        upper: f64,
        #[serde(default = "default_rsi_period")]
        period: usize,
    },
    BollingerSqueeze {
        #[serde(default = "default_bb_width")]
        max_width_pct: f64,
        #[serde(default = "default_period_20")]
        period: usize,
        #[serde(default = "default_bb_std_devs")]
        std_devs: f64,
    },
    /// All sub-conditions must match.
    All { of: Vec<ConditionSpec> },
    /// Any sub-condition may match.
    Any { of: Vec<ConditionSpec> },
    /// Inverts exactly one sub-condition.
    Not { of: Vec<ConditionSpec> },
}

fn default_one() -> usize {
    1
}
fn default_period_20() -> usize {
    20
}
fn default_period_60() -> usize {
    60
}
fn default_cross_lookback() -> usize {
    5
}
fn default_rsi_period() -> usize {
    14
}
fn default_volume_multiplier() -> f64 {
    1.5
}
fn default_spike_multiplier() -> f64 {
    2.0
}
fn default_touch_threshold() -> f64 {
    0.02
}
fn default_oversold() -> f64 {
    30.0
}
fn default_overbought() -> f64 {
    70.0
}
fn default_bb_width() -> f64 {
    10.0
}
fn default_bb_std_devs() -> f64 {
    2.0
}

fn check(ok: bool, reason: &str) -> Result<(), TickwatchError> {
    if ok {
        Ok(())
    } else {
        Err(TickwatchError::config(reason))
    }
}

impl ConditionSpec {
    /// Validate parameters and build the live condition.
    ///
    /// All validation happens here, at load time; evaluation never re-checks
    /// parameters.
    pub fn build(&self) -> Result<Box<dyn Condition>, TickwatchError> {
        match self {
            Self::MinPrice { min_price } => {
                check(*min_price >= 0.0, "min_price must be >= 0")?;
                Ok(Box::new(MinPriceCondition::new(*min_price)))
            }
            Self::MaxPrice { max_price } => {
                check(*max_price >= 0.0, "max_price must be >= 0")?;
                Ok(Box::new(MaxPriceCondition::new(*max_price)))
            }
            Self::PriceRange {
                min_price,
                max_price,
            } => {
                check(*min_price >= 0.0, "min_price must be >= 0")?;
                check(
                    min_price <= max_price,
                    "price_range bounds must be ordered (min <= max)",
                )?;
                Ok(Box::new(PriceRangeCondition::new(*min_price, *max_price)))
            }
            Self::PriceChange {
                min_change_pct,
                max_change_pct,
                days,
            } => {
                check(*days >= 1, "price_change days must be >= 1")?;
                check(
                    min_change_pct.is_some() || max_change_pct.is_some(),
                    "price_change needs at least one of min_change_pct/max_change_pct",
                )?;
                if let (Some(min), Some(max)) = (min_change_pct, max_change_pct) {
                    check(min <= max, "price_change bounds must be ordered")?;
                }
                Ok(Box::new(PriceChangeCondition::new(
                    *min_change_pct,
                    *max_change_pct,
                    *days,
                )))
            }
            Self::MinVolume { min_volume } => {
                check(*min_volume >= 0.0, "min_volume must be >= 0")?;
                Ok(Box::new(MinVolumeCondition::new(*min_volume)))
            }
            Self::VolumeAboveAverage { multiplier, period } => {
                check(*multiplier > 0.0, "volume multiplier must be > 0")?;
                check(*period >= 1, "volume period must be >= 1")?;
                Ok(Box::new(VolumeAboveAverageCondition::new(
                    *multiplier,
                    *period,
                )))
            }
            Self::VolumeSpike { multiplier, period } => {
                check(*multiplier > 0.0, "volume multiplier must be > 0")?;
                check(*period >= 1, "volume period must be >= 1")?;
                Ok(Box::new(VolumeSpikeCondition::new(*multiplier, *period)))
            }
            Self::MaTouch { period, threshold } => {
                check(*period >= 1, "ma period must be >= 1")?;
                check(*threshold >= 0.0, "touch threshold must be >= 0")?;
                Ok(Box::new(MaTouchCondition::new(*period, *threshold)))
            }
            Self::AboveMa {
                period,
                min_distance_pct,
            } => {
                check(*period >= 1, "ma period must be >= 1")?;
                Ok(Box::new(AboveMaCondition::new(*period, *min_distance_pct)))
            }
            Self::BelowMa {
                period,
                max_distance_pct,
            } => {
                check(*period >= 1, "ma period must be >= 1")?;
                Ok(Box::new(BelowMaCondition::new(*period, *max_distance_pct)))
            }
            Self::MaCrossUp {
                short_period,
                long_period,
                lookback,
            } => {
                check(*short_period >= 1, "short period must be >= 1")?;
                check(
                    short_period < long_period,
                    "crossover requires short_period < long_period",
                )?;
                check(*lookback >= 1, "crossover lookback must be >= 1")?;
                Ok(Box::new(MaCrossUpCondition::new(
                    *short_period,
                    *long_period,
                    *lookback,
                )))
            }
            Self::MaCrossDown {
                short_period,
                long_period,
                lookback,
            } => {
                check(*short_period >= 1, "short period must be >= 1")?;
                check(
                    short_period < long_period,
                    "crossover requires short_period < long_period",
                )?;
                check(*lookback >= 1, "crossover lookback must be >= 1")?;
                Ok(Box::new(MaCrossDownCondition::new(
                    *short_period,
                    *long_period,
                    *lookback,
                )))
            }
            Self::RsiOversold { threshold, period } => {
                check(
                    (0.0..=100.0).contains(threshold),
                    "rsi threshold must be within 0..=100",
                )?;
                check(*period >= 1, "rsi period must be >= 1")?;
                Ok(Box::new(RsiOversoldCondition::new(*threshold, *period)))
            }
            Self::RsiOverbought { threshold, period } => {
                check(
                    (0.0..=100.0).contains(threshold),
                    "rsi threshold must be within 0..=100",
                )?;
                check(*period >= 1, "rsi period must be >= 1")?;
                Ok(Box::new(RsiOverboughtCondition::new(*threshold, *period)))
            }
            Self::RsiRange {
                lower,
                upper,
                period,
            } => {
                check(
                    (0.0..=100.0).contains(lower) && (0.0..=100.0).contains(upper),
                    "rsi bounds must be within 0..=100",
                )?;
                check(lower <= upper, "rsi_range bounds must be ordered")?;
                check(*period >= 1, "rsi period must be >= 1")?;
                Ok(Box::new(RsiRangeCondition::new(*lower, *upper, *period)))
            }
            Self::BollingerSqueeze {
                max_width_pct,
                period,
                std_devs,
            } => {
                check(*max_width_pct >= 0.0, "bb width ceiling must be >= 0")?;
                check(*period >= 2, "bb period must be >= 2")?;
                check(*std_devs > 0.0, "bb std_devs must be > 0")?;
                Ok(Box::new(BollingerSqueezeCondition::new(
                    *max_width_pct,
                    *period,
                    *std_devs,
                )))
            }
            Self::All { of } => {
                check(!of.is_empty(), "'all' composite needs at least one sub-condition")?;
                Ok(Box::new(AndCondition::new(build_children(of)?)))
            }
            Self::Any { of } => {
                check(!of.is_empty(), "'any' composite needs at least one sub-condition")?;
                Ok(Box::new(OrCondition::new(build_children(of)?)))
            }
            Self::Not { of } => {
                check(
                    of.len() == 1,
                    "'not' takes exactly one sub-condition",
                )?;
                Ok(Box::new(NotCondition::new(of[0].build()?)))
            }
        }
    }
}

fn build_children(specs: &[ConditionSpec]) -> Result<Vec<Box<dyn Condition>>, TickwatchError> {
    specs.iter().map(|s| s.build()).collect()
}

/// Build an ordered spec list into a single condition.
///
/// A single spec builds as-is; multiple specs are combined with AND, which
/// is how preset bundles are interpreted.
pub fn build_all(specs: &[ConditionSpec]) -> Result<Box<dyn Condition>, TickwatchError> {
    check(!specs.is_empty(), "condition list must not be empty")?;
    if specs.len() == 1 {
        return specs[0].build();
    }
    Ok(Box::new(AndCondition::new(build_children(specs)?)))
}
