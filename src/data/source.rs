//! Time-series source abstraction.
//!
//! All price-history retrieval goes through [`TimeSeriesSource`], so the
//! screener and monitor never care whether bars come from a vendor API, a
//! local warehouse, or a test fixture.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::Bar;

/// Errors a data source can produce.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SourceError {
    /// The source cannot serve this ticker at all.
    #[error("data unavailable for {ticker}: {reason}")]
    Unavailable { ticker: String, reason: String },

    /// Network or transport failure; worth retrying on a later tick.
    #[error("fetch failed for {ticker}: {reason}")]
    Fetch { ticker: String, reason: String },

    /// The fetch exceeded its time budget.
    #[error("fetch timed out for {ticker} after {timeout_secs}s")]
    Timeout { ticker: String, timeout_secs: u64 },
}

impl SourceError {
    /// Whether the error is worth retrying on the next poll.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Fetch { .. } | Self::Timeout { .. })
    }
}

/// Trait for ordered OHLCV history providers.
///
/// Implementations must return bars in ascending time order and fail with
/// [`SourceError::Unavailable`] for unknown tickers.
#[async_trait]
pub trait TimeSeriesSource: Send + Sync {
    /// Source name for logging (e.g. "fixture").
    fn name(&self) -> &'static str;

    /// Fetch at least `min_bars` of history for `ticker`, most recent last.
    ///
    /// Sources may return more than `min_bars`; callers slice what they
    /// need. Returning fewer bars than requested is not an error here;
    /// lookback sufficiency is judged by the evaluation layer.
    async fn get_bars(&self, ticker: &str, min_bars: usize) -> Result<Vec<Bar>, SourceError>;
}

/// Run a fetch under a bounded timeout.
///
/// An elapsed timeout is a fetch failure for that ticker, never a process
/// fault.
pub async fn fetch_with_timeout(
    source: &Arc<dyn TimeSeriesSource>,
    ticker: &str,
    min_bars: usize,
    timeout: Duration,
) -> Result<Vec<Bar>, SourceError> {
    match tokio::time::timeout(timeout, source.get_bars(ticker, min_bars)).await {
        Ok(result) => result,
        Err(_) => Err(SourceError::Timeout {
            ticker: ticker.to_string(),
            timeout_secs: timeout.as_secs(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_error_retryable() {
        assert!(SourceError::Fetch {
            ticker: "A".into(),
            reason: "connection reset".into()
        }
        .is_retryable());
        assert!(SourceError::Timeout {
            ticker: "A".into(),
            timeout_secs: 5
        }
        .is_retryable());
        assert!(!SourceError::Unavailable {
            ticker: "A".into(),
            reason: "unknown ticker".into()
        }
        .is_retryable());
    }
}
