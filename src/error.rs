//! Error taxonomy for tickwatch.
//!
//! Transient data problems (short history, unreachable source) are recorded
//! per ticker and never abort a screening run or a monitor tick.
//! Configuration and invariant errors abort immediately: they signal a
//! defect, not data trouble.

/// Top-level error type for tickwatch.
#[derive(Debug, thiserror::Error)]
pub enum TickwatchError {
    /// Not enough history to evaluate a condition. Non-fatal per ticker.
    #[error("insufficient data for {ticker}: have {bars} bars, need {required}")]
    DataInsufficient {
        ticker: String,
        bars: usize,
        required: usize,
    },

    /// The data source cannot serve the ticker at all.
    #[error("no data available for {ticker}: {reason}")]
    DataUnavailable { ticker: String, reason: String },

    /// A holdings mutation would violate the quantity invariant.
    #[error("invalid quantity for {ticker}: {reason}")]
    InvalidQuantity { ticker: String, reason: String },

    /// Malformed condition spec, preset, or config section. Fails at load,
    /// before any evaluation.
    #[error("configuration error: {reason}")]
    Configuration { reason: String },
}

impl TickwatchError {
    /// Shorthand for a configuration error.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }
}
