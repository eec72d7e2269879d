//! Market data types and source abstraction.
//!
//! Price history enters the system through the [`TimeSeriesSource`] trait;
//! everything downstream (conditions, screener, monitor) only ever sees
//! ascending-time ordered [`Bar`] slices.

mod fixture;
mod source;

pub use fixture::FixtureDataSource;
pub use source::{fetch_with_timeout, SourceError, TimeSeriesSource};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single OHLCV bar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    /// Bar open time
    pub timestamp: DateTime<Utc>,
    /// Open price
    pub open: f64,
    /// High price
    pub high: f64,
    /// Low price
    pub low: f64,
    /// Close price
    pub close: f64,
    /// Volume
    pub volume: f64,
}

impl Bar {
    /// Check if this is a bullish bar
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    /// Full range (high - low)
    pub fn range(&self) -> f64 {
        self.high - self.low
    }
}

/// Extract the close series from a bar slice.
pub fn closes(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.close).collect()
}

/// Extract the volume series from a bar slice.
pub fn volumes(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.volume).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bar_direction() {
        let bar = Bar {
            timestamp: Utc::now(),
            open: 10.0,
            high: 11.0,
            low: 9.5,
            close: 10.5,
            volume: 1000.0,
        };
        assert!(bar.is_bullish());
        assert!((bar.range() - 1.5).abs() < 1e-9);
    }
}
