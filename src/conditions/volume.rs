//! Volume conditions.

use serde_json::json;

use super::{ensure_lookback, Condition, ConditionResult};
use crate::data::{volumes, Bar};
use crate::error::TickwatchError;

/// Matches when the last bar's volume is at or above a floor.
#[derive(Debug, Clone)]
pub struct MinVolumeCondition {
    min_volume: f64,
}

impl MinVolumeCondition {
    pub fn new(min_volume: f64) -> Self {
        Self { min_volume }
    }
}

impl Condition for MinVolumeCondition {
    fn name(&self) -> String {
        format!("min_volume_{}", self.min_volume)
    }

    fn required_lookback(&self) -> usize {
        1
    }

    fn evaluate(&self, ticker: &str, bars: &[Bar]) -> Result<ConditionResult, TickwatchError> {
        ensure_lookback(ticker, bars, self.required_lookback())?;

        let current_volume = bars[bars.len() - 1].volume;
        Ok(ConditionResult::leaf(
            current_volume >= self.min_volume,
            self.name(),
            json!({
                "current_volume": current_volume,
                "min_volume": self.min_volume,
            }),
        ))
    }
}

/// Matches when the last bar's volume is at least `multiplier` times the
/// trailing `period`-bar average (last bar included in the average).
#[derive(Debug, Clone)]
pub struct VolumeAboveAverageCondition {
    multiplier: f64,
    period: usize,
}

impl VolumeAboveAverageCondition {
    pub fn new(multiplier: f64, period: usize) -> Self {
        Self { multiplier, period }
    }
}

impl Condition for VolumeAboveAverageCondition {
    fn name(&self) -> String {
        format!("volume_above_avg_{}x_{}d", self.multiplier, self.period)
    }

    fn required_lookback(&self) -> usize {
        self.period
    }

    fn evaluate(&self, ticker: &str, bars: &[Bar]) -> Result<ConditionResult, TickwatchError> {
        ensure_lookback(ticker, bars, self.required_lookback())?;

        let series = volumes(bars);
        let current_volume = series[series.len() - 1];
        let avg_volume: f64 =
            series[series.len() - self.period..].iter().sum::<f64>() / self.period as f64;

        if avg_volume == 0.0 {
            return Ok(ConditionResult::leaf(
                false,
                self.name(),
                json!({
                    "current_volume": current_volume,
                    "avg_volume": 0.0,
                    "period": self.period,
                }),
            ));
        }

        let ratio = current_volume / avg_volume;
        Ok(ConditionResult::leaf(
            ratio >= self.multiplier,
            self.name(),
            json!({
                "current_volume": current_volume,
                "avg_volume": avg_volume,
                "ratio": ratio,
                "multiplier": self.multiplier,
                "period": self.period,
            }),
        ))
    }
}

/// Matches on a volume spike: the last bar's volume is at least
/// `multiplier` times the average of the `period` bars before it (last bar
/// excluded from the average).
#[derive(Debug, Clone)]
pub struct VolumeSpikeCondition {
    multiplier: f64,
    period: usize,
}

impl VolumeSpikeCondition {
    pub fn new(multiplier: f64, period: usize) -> Self {
        Self { multiplier, period }
    }
}

impl Condition for VolumeSpikeCondition {
    fn name(&self) -> String {
        format!("volume_spike_{}x", self.multiplier)
    }

    fn required_lookback(&self) -> usize {
        self.period + 1
    }

    fn evaluate(&self, ticker: &str, bars: &[Bar]) -> Result<ConditionResult, TickwatchError> {
        ensure_lookback(ticker, bars, self.required_lookback())?;

        let series = volumes(bars);
        let current_volume = series[series.len() - 1];
        let window = &series[series.len() - 1 - self.period..series.len() - 1];
        let avg_volume: f64 = window.iter().sum::<f64>() / self.period as f64;

        if avg_volume == 0.0 {
            return Ok(ConditionResult::leaf(
                false,
                self.name(),
                json!({
                    "current_volume": current_volume,
                    "avg_volume": 0.0,
                    "multiplier": self.multiplier,
                }),
            ));
        }

        let ratio = current_volume / avg_volume;
        Ok(ConditionResult::leaf(
            ratio >= self.multiplier,
            self.name(),
            json!({
                "current_volume": current_volume,
                "avg_volume": avg_volume,
                "ratio": ratio,
                "multiplier": self.multiplier,
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::testutil::bars_from;

    #[test]
    fn test_min_volume() {
        let bars = bars_from(&[100.0], &[50_000.0]);
        assert!(!MinVolumeCondition::new(100_000.0).evaluate("X", &bars).unwrap().matched);
        assert!(MinVolumeCondition::new(50_000.0).evaluate("X", &bars).unwrap().matched);
    }

    #[test]
    fn test_volume_above_average() {
        // 19 bars at 100k, last at 300k: avg = 110k, ratio ~2.73
        let mut vols = vec![100_000.0; 19];
        vols.push(300_000.0);
        let closes = vec![10.0; 20];
        let bars = bars_from(&closes, &vols);

        let result = VolumeAboveAverageCondition::new(1.5, 20).evaluate("X", &bars).unwrap();
        assert!(result.matched);
        assert!(result.details["ratio"].as_f64().unwrap() > 2.7);
    }

    #[test]
    fn test_volume_spike_excludes_today() {
        // 20 quiet bars then a 2.5x spike against the prior-20 average
        let mut vols = vec![100_000.0; 20];
        vols.push(250_000.0);
        let closes = vec![10.0; 21];
        let bars = bars_from(&closes, &vols);

        let result = VolumeSpikeCondition::new(2.0, 20).evaluate("X", &bars).unwrap();
        assert!(result.matched);
        assert!((result.details["ratio"].as_f64().unwrap() - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_zero_average_never_matches() {
        let bars = bars_from(&vec![10.0; 21], &vec![0.0; 21]);
        assert!(!VolumeSpikeCondition::new(2.0, 20).evaluate("X", &bars).unwrap().matched);
        assert!(!VolumeAboveAverageCondition::new(1.0, 20).evaluate("X", &bars).unwrap().matched);
    }
}
