//! Moving-average conditions: touch, position, and crossovers.

use serde_json::json;

use super::{ensure_lookback, Condition, ConditionResult};
use crate::data::{closes, Bar};
use crate::error::TickwatchError;
use crate::indicators::{rolling_mean, sma};

/// Matches when the last close sits within `threshold` (fractional) of the
/// `period`-bar simple moving average. The boundary is inclusive.
#[derive(Debug, Clone)]
pub struct MaTouchCondition {
    period: usize,
    threshold: f64,
}

impl MaTouchCondition {
    pub fn new(period: usize, threshold: f64) -> Self {
        Self { period, threshold }
    }
}

impl Condition for MaTouchCondition {
    fn name(&self) -> String {
        format!("ma_touch_{}d", self.period)
    }

    fn required_lookback(&self) -> usize {
        self.period
    }

    fn evaluate(&self, ticker: &str, bars: &[Bar]) -> Result<ConditionResult, TickwatchError> {
        ensure_lookback(ticker, bars, self.required_lookback())?;

        let series = closes(bars);
        let current_price = series[series.len() - 1];
        let ma_value = sma(&series, self.period).expect("lookback checked");

        let distance_pct = (current_price - ma_value).abs() / ma_value;
        Ok(ConditionResult::leaf(
            distance_pct <= self.threshold,
            self.name(),
            json!({
                "current_price": current_price,
                "ma_value": ma_value,
                "ma_period": self.period,
                "distance_pct": distance_pct,
                "threshold": self.threshold,
            }),
        ))
    }
}

/// Matches when the last close is above the moving average by at least
/// `min_distance_pct` (fractional, default 0).
#[derive(Debug, Clone)]
pub struct AboveMaCondition {
    period: usize,
    min_distance_pct: f64,
}

impl AboveMaCondition {
    pub fn new(period: usize, min_distance_pct: f64) -> Self {
        Self {
            period,
            min_distance_pct,
        }
    }
}

impl Condition for AboveMaCondition {
    fn name(&self) -> String {
        format!("above_ma_{}d", self.period)
    }

    fn required_lookback(&self) -> usize {
        self.period
    }

    fn evaluate(&self, ticker: &str, bars: &[Bar]) -> Result<ConditionResult, TickwatchError> {
        ensure_lookback(ticker, bars, self.required_lookback())?;

        let series = closes(bars);
        let current_price = series[series.len() - 1];
        let ma_value = sma(&series, self.period).expect("lookback checked");
        let distance_pct = (current_price - ma_value) / ma_value;

        Ok(ConditionResult::leaf(
            distance_pct >= self.min_distance_pct,
            self.name(),
            json!({
                "current_price": current_price,
                "ma_value": ma_value,
                "ma_period": self.period,
                "distance_pct": distance_pct,
            }),
        ))
    }
}

/// Matches when the last close is below the moving average by at least
/// `|max_distance_pct|` (fractional, zero or negative).
#[derive(Debug, Clone)]
pub struct BelowMaCondition {
    period: usize,
    max_distance_pct: f64,
}

impl BelowMaCondition {
    pub fn new(period: usize, max_distance_pct: f64) -> Self {
        Self {
            period,
            max_distance_pct,
        }
    }
}

impl Condition for BelowMaCondition {
    fn name(&self) -> String {
        format!("below_ma_{}d", self.period)
    }

    fn required_lookback(&self) -> usize {
        self.period
    }

    fn evaluate(&self, ticker: &str, bars: &[Bar]) -> Result<ConditionResult, TickwatchError> {
        ensure_lookback(ticker, bars, self.required_lookback())?;

        let series = closes(bars);
        let current_price = series[series.len() - 1];
        let ma_value = sma(&series, self.period).expect("lookback checked");
        let distance_pct = (current_price - ma_value) / ma_value;

        Ok(ConditionResult::leaf(
            distance_pct <= self.max_distance_pct,
            self.name(),
            json!({
                "current_price": current_price,
                "ma_value": ma_value,
                "ma_period": self.period,
                "distance_pct": distance_pct,
            }),
        ))
    }
}

/// Direction of a moving-average crossover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CrossDirection {
    Up,
    Down,
}

/// Shared crossover scan: walk back through the lookback window and report
/// the most recent bar offset where (fast - slow) changed sign.
fn find_cross(
    fast: &[f64],
    slow: &[f64],
    lookback: usize,
    direction: CrossDirection,
) -> Option<usize> {
    // Series are aligned to the last bar; offset 1 compares the last pair.
    for offset in 1..=lookback {
        let curr_fast = fast[fast.len() - offset];
        let curr_slow = slow[slow.len() - offset];
        let prev_fast = fast[fast.len() - offset - 1];
        let prev_slow = slow[slow.len() - offset - 1];

        let crossed = match direction {
            CrossDirection::Up => prev_fast <= prev_slow && curr_fast > curr_slow,
            CrossDirection::Down => prev_fast >= prev_slow && curr_fast < curr_slow,
        };
        if crossed {
            return Some(offset);
        }
    }
    None
}

/// Golden cross: the short MA crossed above the long MA within the last
/// `lookback` bars.
#[derive(Debug, Clone)]
pub struct MaCrossUpCondition {
    short_period: usize,
    long_period: usize,
    lookback: usize,
}

impl MaCrossUpCondition {
    pub fn new(short_period: usize, long_period: usize, lookback: usize) -> Self {
        Self {
            short_period,
            long_period,
            lookback,
        }
    }
}

impl Condition for MaCrossUpCondition {
    fn name(&self) -> String {
        format!("ma_cross_up_{}_{}", self.short_period, self.long_period)
    }

    fn required_lookback(&self) -> usize {
        self.long_period + self.lookback
    }

    fn evaluate(&self, ticker: &str, bars: &[Bar]) -> Result<ConditionResult, TickwatchError> {
        ensure_lookback(ticker, bars, self.required_lookback())?;

        let series = closes(bars);
        let short_ma = rolling_mean(&series, self.short_period);
        let long_ma = rolling_mean(&series, self.long_period);
        let cross_offset = find_cross(&short_ma, &long_ma, self.lookback, CrossDirection::Up);

        Ok(ConditionResult::leaf(
            cross_offset.is_some(),
            self.name(),
            json!({
                "short_ma": short_ma[short_ma.len() - 1],
                "long_ma": long_ma[long_ma.len() - 1],
                "short_period": self.short_period,
                "long_period": self.long_period,
                "cross_offset": cross_offset,
            }),
        ))
    }
}

/// Dead cross: the short MA crossed below the long MA within the last
/// `lookback` bars.
#[derive(Debug, Clone)]
pub struct MaCrossDownCondition {
    short_period: usize,
    long_period: usize,
    lookback: usize,
}

impl MaCrossDownCondition {
    pub fn new(short_period: usize, long_period: usize, lookback: usize) -> Self {
        Self {
            short_period,
            long_period,
            lookback,
        }
    }
}

impl Condition for MaCrossDownCondition {
    fn name(&self) -> String {
        format!("ma_cross_down_{}_{}", self.short_period, self.long_period)
    }

    fn required_lookback(&self) -> usize {
        self.long_period + self.lookback
    }

    fn evaluate(&self, ticker: &str, bars: &[Bar]) -> Result<ConditionResult, TickwatchError> {
        ensure_lookback(ticker, bars, self.required_lookback())?;

        let series = closes(bars);
        let short_ma = rolling_mean(&series, self.short_period);
        let long_ma = rolling_mean(&series, self.long_period);
        let cross_offset = find_cross(&short_ma, &long_ma, self.lookback, CrossDirection::Down);

        Ok(ConditionResult::leaf(
            cross_offset.is_some(),
            self.name(),
            json!({
                "short_ma": short_ma[short_ma.len() - 1],
                "long_ma": long_ma[long_ma.len() - 1],
                "short_period": self.short_period,
                "long_period": self.long_period,
                "cross_offset": cross_offset,
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::testutil::bars_from_closes;

    #[test]
    fn test_ma_touch_within_threshold() {
        // Flat series: price equals MA exactly
        let bars = bars_from_closes(&vec![100.0; 160]);
        let result = MaTouchCondition::new(160, 0.02).evaluate("X", &bars).unwrap();
        assert!(result.matched);
        assert!((result.details["ma_value"].as_f64().unwrap() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_ma_touch_outside_threshold() {
        // 19 bars at 100, last bar jumps to 110: MA ~100.5, distance ~9.5%
        let mut series = vec![100.0; 19];
        series.push(110.0);
        let bars = bars_from_closes(&series);
        let result = MaTouchCondition::new(20, 0.02).evaluate("X", &bars).unwrap();
        assert!(!result.matched);
    }

    #[test]
    fn test_ma_touch_exact_boundary_inclusive() {
        // Construct a series where distance == threshold exactly.
        // 10 bars: nine at 100, last at 102.0 -> ma = 100.2, distance = 1.8/100.2
        let mut series = vec![100.0; 9];
        series.push(102.0);
        let bars = bars_from_closes(&series);
        let ma = (9.0 * 100.0 + 102.0) / 10.0;
        let threshold = (102.0 - ma) / ma;
        let result = MaTouchCondition::new(10, threshold).evaluate("X", &bars).unwrap();
        assert!(result.matched);
    }

    #[test]
    fn test_ma_touch_insufficient_data() {
        let bars = bars_from_closes(&vec![100.0; 100]);
        let err = MaTouchCondition::new(160, 0.02).evaluate("X", &bars).unwrap_err();
        assert!(matches!(
            err,
            TickwatchError::DataInsufficient { required: 160, bars: 100, .. }
        ));
    }

    #[test]
    fn test_above_below_ma() {
        // Rising series: last close above its own 20-bar MA
        let series: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
        let bars = bars_from_closes(&series);

        assert!(AboveMaCondition::new(20, 0.0).evaluate("X", &bars).unwrap().matched);
        assert!(!BelowMaCondition::new(20, 0.0).evaluate("X", &bars).unwrap().matched);
    }

    #[test]
    fn test_cross_up_detected_with_offset() {
        // Downtrend then sharp recovery: short MA crosses above long MA.
        let mut series: Vec<f64> = (0..30).map(|i| 130.0 - i as f64).collect();
        series.extend((0..15).map(|i| 101.0 + i as f64 * 4.0));
        let bars = bars_from_closes(&series);

        let cond = MaCrossUpCondition::new(5, 20, 15);
        let result = cond.evaluate("X", &bars).unwrap();
        assert!(result.matched);
        let offset = result.details["cross_offset"].as_u64().unwrap();
        assert!(offset >= 1 && offset <= 15);
    }

    #[test]
    fn test_cross_up_absent_in_steady_trend() {
        let series: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let bars = bars_from_closes(&series);

        let result = MaCrossUpCondition::new(5, 20, 5).evaluate("X", &bars).unwrap();
        assert!(!result.matched);
        assert!(result.details["cross_offset"].is_null());
    }

    #[test]
    fn test_cross_down_mirrors_cross_up() {
        // Uptrend then sharp selloff
        let mut series: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        series.extend((0..15).map(|i| 128.0 - i as f64 * 4.0));
        let bars = bars_from_closes(&series);

        assert!(MaCrossDownCondition::new(5, 20, 15).evaluate("X", &bars).unwrap().matched);
        assert!(!MaCrossUpCondition::new(5, 20, 15).evaluate("X", &bars).unwrap().matched);
    }

    #[test]
    fn test_cross_lookback_window_bound() {
        let bars = bars_from_closes(&vec![100.0; 24]);
        // long 20 + lookback 5 = 25 required
        assert!(MaCrossUpCondition::new(5, 20, 5).evaluate("X", &bars).is_err());
    }
}
