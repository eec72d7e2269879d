//! Price-level conditions.

use serde_json::json;

use super::{ensure_lookback, Condition, ConditionResult};
use crate::data::Bar;
use crate::error::TickwatchError;

/// Matches when the last close is at or above a floor price.
#[derive(Debug, Clone)]
pub struct MinPriceCondition {
    min_price: f64,
}

impl MinPriceCondition {
    pub fn new(min_price: f64) -> Self {
        Self { min_price }
    }
}

impl Condition for MinPriceCondition {
    fn name(&self) -> String {
        format!("min_price_{}", self.min_price)
    }

    fn required_lookback(&self) -> usize {
        1
    }

    fn evaluate(&self, ticker: &str, bars: &[Bar]) -> Result<ConditionResult, TickwatchError> {
        ensure_lookback(ticker, bars, self.required_lookback())?;

        let current_price = bars[bars.len() - 1].close;
        Ok(ConditionResult::leaf(
            current_price >= self.min_price,
            self.name(),
            json!({
                "current_price": current_price,
                "min_price": self.min_price,
            }),
        ))
    }
}

/// Matches when the last close is at or below a ceiling price.
#[derive(Debug, Clone)]
pub struct MaxPriceCondition {
    max_price: f64,
}

impl MaxPriceCondition {
    pub fn new(max_price: f64) -> Self {
        Self { max_price }
    }
}

impl Condition for MaxPriceCondition {
    fn name(&self) -> String {
        format!("max_price_{}", self.max_price)
    }

    fn required_lookback(&self) -> usize {
        1
    }

    fn evaluate(&self, ticker: &str, bars: &[Bar]) -> Result<ConditionResult, TickwatchError> {
        ensure_lookback(ticker, bars, self.required_lookback())?;

        let current_price = bars[bars.len() - 1].close;
        Ok(ConditionResult::leaf(
            current_price <= self.max_price,
            self.name(),
            json!({
                "current_price": current_price,
                "max_price": self.max_price,
            }),
        ))
    }
}

/// Matches when the last close falls inside an inclusive price band.
#[derive(Debug, Clone)]
pub struct PriceRangeCondition {
    min_price: f64,
    max_price: f64,
}

impl PriceRangeCondition {
    pub fn new(min_price: f64, max_price: f64) -> Self {
        Self {
            min_price,
            max_price,
        }
    }
}

impl Condition for PriceRangeCondition {
    fn name(&self) -> String {
        format!("price_range_{}_{}", self.min_price, self.max_price)
    }

    fn required_lookback(&self) -> usize {
        1
    }

    fn evaluate(&self, ticker: &str, bars: &[Bar]) -> Result<ConditionResult, TickwatchError> {
        ensure_lookback(ticker, bars, self.required_lookback())?;

        let current_price = bars[bars.len() - 1].close;
        let matched = current_price >= self.min_price && current_price <= self.max_price;
        Ok(ConditionResult::leaf(
            matched,
            self.name(),
            json!({
                "current_price": current_price,
                "min_price": self.min_price,
                "max_price": self.max_price,
            }),
        ))
    }
}

/// Matches when the close-to-close change over `days` bars falls inside the
/// configured percentage bounds.
#[derive(Debug, Clone)]
pub struct PriceChangeCondition {
    min_change_pct: Option<f64>,
    max_change_pct: Option<f64>,
    days: usize,
}

impl PriceChangeCondition {
    pub fn new(min_change_pct: Option<f64>, max_change_pct: Option<f64>, days: usize) -> Self {
        Self {
            min_change_pct,
            max_change_pct,
            days,
        }
    }
}

impl Condition for PriceChangeCondition {
    fn name(&self) -> String {
        format!("price_change_{}d", self.days)
    }

    fn required_lookback(&self) -> usize {
        self.days + 1
    }

    fn evaluate(&self, ticker: &str, bars: &[Bar]) -> Result<ConditionResult, TickwatchError> {
        ensure_lookback(ticker, bars, self.required_lookback())?;

        let current_price = bars[bars.len() - 1].close;
        let past_price = bars[bars.len() - 1 - self.days].close;
        let change_pct = (current_price - past_price) / past_price * 100.0;

        let mut matched = true;
        if let Some(min) = self.min_change_pct {
            matched = matched && change_pct >= min;
        }
        if let Some(max) = self.max_change_pct {
            matched = matched && change_pct <= max;
        }

        Ok(ConditionResult::leaf(
            matched,
            self.name(),
            json!({
                "current_price": current_price,
                "past_price": past_price,
                "change_pct": change_pct,
                "days": self.days,
            }),
        ))
    }
}
