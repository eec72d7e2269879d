//! RSI conditions.

use serde_json::json;

use super::{ensure_lookback, Condition, ConditionResult};
use crate::data::{closes, Bar};
use crate::error::TickwatchError;
use crate::indicators::rsi;

/// Matches when RSI is at or below the oversold threshold.
#[derive(Debug, Clone)]
pub struct RsiOversoldCondition {
    threshold: f64,
    period: usize,
}

impl RsiOversoldCondition {
    pub fn new(threshold: f64, period: usize) -> Self {
        Self { threshold, period }
    }
}

impl Condition for RsiOversoldCondition {
    fn name(&self) -> String {
        format!("rsi_oversold_{}", self.threshold)
    }

    fn required_lookback(&self) -> usize {
        self.period + 1
    }

    fn evaluate(&self, ticker: &str, bars: &[Bar]) -> Result<ConditionResult, TickwatchError> {
        ensure_lookback(ticker, bars, self.required_lookback())?;

        let series = closes(bars);
        let value = rsi(&series, self.period).expect("lookback checked");

        Ok(ConditionResult::leaf(
            value <= self.threshold,
            self.name(),
            json!({
                "rsi": value,
                "threshold": self.threshold,
                "period": self.period,
            }),
        ))
    }
}

/// Matches when RSI is at or above the overbought threshold.
#[derive(Debug, Clone)]
pub struct RsiOverboughtCondition {
    threshold: f64,
    period: usize,
}

impl RsiOverboughtCondition {
    pub fn new(threshold: f64, period: usize) -> Self {
        Self { threshold, period }
    }
}

impl Condition for RsiOverboughtCondition {
    fn name(&self) -> String {
        format!("rsi_overbought_{}", self.threshold)
    }

    fn required_lookback(&self) -> usize {
        self.period + 1
    }

    fn evaluate(&self, ticker: &str, bars: &[Bar]) -> Result<ConditionResult, TickwatchError> {
        ensure_lookback(ticker, bars, self.required_lookback())?;

        let series = closes(bars);
        let value = rsi(&series, self.period).expect("lookback checked");

        Ok(ConditionResult::leaf(
            value >= self.threshold,
            self.name(),
            json!({
                "rsi": value,
                "threshold": self.threshold,
                "period": self.period,
            }),
        ))
    }
}

/// Matches when RSI falls inside an inclusive band.
#[derive(Debug, Clone)]
pub struct RsiRangeCondition {
    lower: f64,
    upper: f64,
    period: usize,
}

impl RsiRangeCondition {
    pub fn new(lower: f64, upper: f64, period: usize) -> Self {
        Self {
            lower,
            upper,
            period,
        }
    }
}

impl Condition for RsiRangeCondition {
    fn name(&self) -> String {
        format!("rsi_range_{}_{}", self.lower, self.upper)
    }

    fn required_lookback(&self) -> usize {
        self.period + 1
    }

    fn evaluate(&self, ticker: &str, bars: &[Bar]) -> Result<ConditionResult, TickwatchError> {
        ensure_lookback(ticker, bars, self.required_lookback())?;

        let series = closes(bars);
        let value = rsi(&series, self.period).expect("lookback checked");

        Ok(ConditionResult::leaf(
            value >= self.lower && value <= self.upper,
            self.name(),
            json!({
                "rsi": value,
                "lower": self.lower,
                "upper": self.upper,
                "period": self.period,
            }),
        ))
    }
}
