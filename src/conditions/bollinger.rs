//! Bollinger band squeeze condition.
//!
//! Flags quiet consolidation ranges where band width has contracted below a
//! ceiling, a precursor screen for accumulation setups.

use serde_json::json;

use super::{ensure_lookback, Condition, ConditionResult};
use crate::data::{closes, Bar};
use crate::error::TickwatchError;
use crate::indicators::bollinger_width_pct;

/// Matches when Bollinger band width (as % of the middle band) is at or
/// below `max_width_pct`.
#[derive(Debug, Clone)]
pub struct BollingerSqueezeCondition {
    max_width_pct: f64,
    period: usize,
    std_devs: f64,
}

impl BollingerSqueezeCondition {
    pub fn new(max_width_pct: f64, period: usize, std_devs: f64) -> Self {
        Self {
            max_width_pct,
            period,
            std_devs,
        }
    }
}

impl Condition for BollingerSqueezeCondition {
    fn name(&self) -> String {
        format!("bb_width_below_{}pct", self.max_width_pct)
    }

    fn required_lookback(&self) -> usize {
        self.period
    }

    fn evaluate(&self, ticker: &str, bars: &[Bar]) -> Result<ConditionResult, TickwatchError> {
        ensure_lookback(ticker, bars, self.required_lookback())?;

        let series = closes(bars);
        let width_pct =
            bollinger_width_pct(&series, self.period, self.std_devs).expect("lookback checked");

        Ok(ConditionResult::leaf(
            width_pct <= self.max_width_pct,
            self.name(),
            json!({
                "bb_width_pct": width_pct,
                "max_width_pct": self.max_width_pct,
                "period": self.period,
                "std_devs": self.std_devs,
            }),
        ))
    }
}
