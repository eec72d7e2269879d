//! Technical indicator helpers shared by the condition kinds.
//!
//! All functions operate on ascending-time ordered series and return `None`
//! when the series is too short for the requested window; sufficiency
//! checking against a condition's declared lookback happens one layer up.

use statrs::statistics::Statistics;

/// Rolling simple moving average.
///
/// Returns one value per complete window, aligned so the last element
/// corresponds to the last input value. Empty when `values.len() < period`.
pub fn rolling_mean(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }
    values
        .windows(period)
        .map(|w| w.iter().copied().mean())
        .collect()
}

/// Simple moving average over the trailing `period` values.
pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    Some(values[values.len() - period..].iter().copied().mean())
}

/// Relative Strength Index over the trailing window.
///
/// Rolling-mean form: average gain / average loss over the last `period`
/// deltas. Needs `period + 1` values. Degenerate windows resolve to the
/// conventional extremes: all-gain is 100, flat is 50.
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }

    let window = &closes[closes.len() - (period + 1)..];
    let mut gain_sum = 0.0;
    let mut loss_sum = 0.0;
    for pair in window.windows(2) {
        let delta = pair[1] - pair[0];
        if delta > 0.0 {
            gain_sum += delta;
        } else {
            loss_sum += -delta;
        }
    }

    let avg_gain = gain_sum / period as f64;
    let avg_loss = loss_sum / period as f64;

    if avg_loss == 0.0 {
        return Some(if avg_gain > 0.0 { 100.0 } else { 50.0 });
    }

    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// Sample standard deviation over the trailing `period` values.
pub fn rolling_std(values: &[f64], period: usize) -> Option<f64> {
    if period < 2 || values.len() < period {
        return None;
    }
    Some(values[values.len() - period..].iter().copied().std_dev())
}

/// Bollinger band width as a percentage of the middle band.
///
/// `(upper - lower) / middle * 100` with bands at `middle ± std_devs * σ`.
pub fn bollinger_width_pct(closes: &[f64], period: usize, std_devs: f64) -> Option<f64> {
    let middle = sma(closes, period)?;
    let sigma = rolling_std(closes, period)?;
    if middle == 0.0 {
        return None;
    }
    Some((2.0 * std_devs * sigma) / middle * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma_basic() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert!((sma(&values, 5).unwrap() - 3.0).abs() < 1e-9);
        assert!((sma(&values, 2).unwrap() - 4.5).abs() < 1e-9);
        assert!(sma(&values, 6).is_none());
        assert!(sma(&values, 0).is_none());
    }

    #[test]
    fn test_rolling_mean_alignment() {
        let values = [1.0, 2.0, 3.0, 4.0];
        let means = rolling_mean(&values, 2);
        assert_eq!(means.len(), 3);
        assert!((means[0] - 1.5).abs() < 1e-9);
        assert!((means[2] - 3.5).abs() < 1e-9);
    }

    #[test]
    fn test_rsi_all_gains() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        assert!((rsi(&closes, 14).unwrap() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_rsi_flat_is_neutral() {
        let closes = vec![100.0; 20];
        assert!((rsi(&closes, 14).unwrap() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_rsi_mixed() {
        // Alternating +2/-1 deltas: avg gain 1.0, avg loss 0.5, rs=2, rsi≈66.67
        let mut closes = vec![100.0];
        for i in 0..14 {
            let last = *closes.last().unwrap();
            closes.push(if i % 2 == 0 { last + 2.0 } else { last - 1.0 });
        }
        let value = rsi(&closes, 14).unwrap();
        assert!((value - 66.666_666).abs() < 0.001);
    }

    #[test]
    fn test_rsi_insufficient() {
        let closes = [100.0, 101.0];
        assert!(rsi(&closes, 14).is_none());
    }

    #[test]
    fn test_bollinger_width() {
        // Flat series: zero width
        let closes = vec![50.0; 25];
        let width = bollinger_width_pct(&closes, 20, 2.0).unwrap();
        assert!(width.abs() < 1e-9);

        // Volatile series: positive width
        let closes: Vec<f64> = (0..25).map(|i| 50.0 + (i % 2) as f64 * 5.0).collect();
        let width = bollinger_width_pct(&closes, 20, 2.0).unwrap();
        assert!(width > 0.0);
    }
}
