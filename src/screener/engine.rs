//! The screening engine.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::conditions::{Condition, ConditionResult};
use crate::config::ScreenerConfig;
use crate::data::{fetch_with_timeout, SourceError, TimeSeriesSource};
use crate::error::TickwatchError;

// ============================================================================
// Results
// ============================================================================

/// Evaluation outcome for a single ticker. Exactly one per evaluable ticker
/// per run, matched or not; immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreeningResult {
    /// Ticker symbol
    pub ticker: String,
    /// Name of the evaluated condition
    pub condition_name: String,
    /// Whether the top-level condition matched
    pub matched: bool,
    /// Depth-first ordered condition results (top-level first)
    pub condition_results: Vec<ConditionResult>,
    /// Last close at evaluation time
    pub current_price: f64,
    /// Last bar volume at evaluation time
    pub volume: f64,
    /// Evaluation timestamp
    pub timestamp: DateTime<Utc>,
}

/// Why a ticker was excluded from a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ExclusionReason {
    /// Source served fewer bars than the condition's lookback
    InsufficientData { bars: usize, required: usize },
    /// Source cannot serve the ticker at all
    Unavailable { detail: String },
    /// Transient fetch failure
    FetchFailed { detail: String },
    /// Fetch exceeded its time budget
    Timeout { timeout_secs: u64 },
    /// Run was cancelled before this ticker was dispatched
    Cancelled,
}

impl From<SourceError> for ExclusionReason {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Unavailable { reason, .. } => Self::Unavailable { detail: reason },
            SourceError::Fetch { reason, .. } => Self::FetchFailed { detail: reason },
            SourceError::Timeout { timeout_secs, .. } => Self::Timeout { timeout_secs },
        }
    }
}

/// A recorded per-ticker exclusion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exclusion {
    pub ticker: String,
    #[serde(flatten)]
    pub reason: ExclusionReason,
}

/// Counts reported for every run. Nothing is silently dropped: every
/// universe ticker lands in `evaluated` or `excluded`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RunSummary {
    pub evaluated: usize,
    pub matched: usize,
    pub excluded: usize,
}

/// A completed screening run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenRun {
    /// Run id (timestamp-based)
    pub id: String,
    /// One result per evaluable ticker; cross-ticker order unspecified
    pub results: Vec<ScreeningResult>,
    /// Excluded tickers with reasons
    pub exclusions: Vec<Exclusion>,
    /// Run counts
    pub summary: RunSummary,
    /// Start time
    pub started_at: DateTime<Utc>,
    /// End time
    pub completed_at: DateTime<Utc>,
}

impl ScreenRun {
    /// Results whose top-level condition matched.
    pub fn matched_results(&self) -> Vec<&ScreeningResult> {
        self.results.iter().filter(|r| r.matched).collect()
    }

    /// Matched tickers, sorted for stable comparison.
    pub fn matched_tickers(&self) -> Vec<String> {
        let mut tickers: Vec<String> = self
            .results
            .iter()
            .filter(|r| r.matched)
            .map(|r| r.ticker.clone())
            .collect();
        tickers.sort();
        tickers
    }
}

/// Errors that fail a run as a whole.
#[derive(Debug, thiserror::Error)]
pub enum ScreenError {
    /// Every universe ticker was excluded; there is nothing to report.
    #[error("no tickers could be evaluated ({excluded} excluded)")]
    NothingEvaluable { excluded: usize },
}

// ============================================================================
// Cancellation
// ============================================================================

/// Cooperative cancellation handle for a screening run.
///
/// Cancelling stops dispatch of not-yet-started tickers; evaluations already
/// in flight drain to completion, so no partial result is ever published.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Bounded-parallel condition evaluator over a ticker universe.
pub struct ScreenerEngine {
    source: Arc<dyn TimeSeriesSource>,
    max_workers: usize,
    lookback_buffer: usize,
    fetch_timeout: Duration,
}

impl ScreenerEngine {
    /// Create an engine from validated configuration.
    pub fn new(source: Arc<dyn TimeSeriesSource>, config: &ScreenerConfig) -> Self {
        Self {
            source,
            max_workers: config.max_workers.max(1),
            lookback_buffer: config.lookback_buffer,
            fetch_timeout: Duration::from_secs(config.fetch_timeout_secs),
        }
    }

    /// Run a screen to completion.
    pub async fn run(
        &self,
        condition: Arc<dyn Condition>,
        universe: &[String],
    ) -> Result<ScreenRun, ScreenError> {
        self.run_cancellable(condition, universe, &CancelHandle::new())
            .await
    }

    /// Run a screen under a cancellation handle.
    ///
    /// Workers share only the read-only condition. Each universe ticker
    /// appears at most once in the output (first occurrence wins); the run
    /// is returned only after every in-flight evaluation has drained.
    pub async fn run_cancellable(
        &self,
        condition: Arc<dyn Condition>,
        universe: &[String],
        cancel: &CancelHandle,
    ) -> Result<ScreenRun, ScreenError> {
        let started_at = Utc::now();
        let id = format!("scan_{}", started_at.format("%Y%m%d_%H%M%S"));

        // Defensive de-dup, first occurrence wins.
        let mut seen = HashSet::new();
        let tickers: Vec<String> = universe
            .iter()
            .filter(|t| seen.insert(t.as_str()))
            .cloned()
            .collect();

        let required = condition.required_lookback();
        let min_bars = required + self.lookback_buffer;

        info!(
            scan_id = %id,
            universe = tickers.len(),
            condition = %condition.name(),
            required_lookback = required,
            workers = self.max_workers,
            "Starting screening run"
        );

        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut join_set: JoinSet<(String, Result<ScreeningResult, ExclusionReason>)> =
            JoinSet::new();
        let mut exclusions: Vec<Exclusion> = Vec::new();

        for ticker in tickers {
            if cancel.is_cancelled() {
                exclusions.push(Exclusion {
                    ticker,
                    reason: ExclusionReason::Cancelled,
                });
                continue;
            }

            // Waiting for a permit here bounds in-flight work and keeps the
            // dispatch loop responsive to cancellation.
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .expect("screener semaphore closed");

            let source = Arc::clone(&self.source);
            let condition = Arc::clone(&condition);
            let fetch_timeout = self.fetch_timeout;

            join_set.spawn(async move {
                let _permit = permit;
                let outcome =
                    evaluate_ticker(&source, &condition, &ticker, min_bars, required, fetch_timeout)
                        .await;
                (ticker, outcome)
            });
        }

        let mut results: Vec<ScreeningResult> = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((ticker, Ok(result))) => {
                    if result.matched {
                        debug!(ticker = %ticker, "Ticker matched");
                    }
                    results.push(result);
                }
                Ok((ticker, Err(reason))) => {
                    debug!(ticker = %ticker, reason = ?reason, "Ticker excluded");
                    exclusions.push(Exclusion { ticker, reason });
                }
                Err(e) => {
                    // A panicking worker loses its ticker attribution; log
                    // and keep the run alive.
                    warn!(error = %e, "Screening worker failed");
                }
            }
        }

        if results.is_empty() {
            warn!(scan_id = %id, excluded = exclusions.len(), "No tickers evaluable");
            return Err(ScreenError::NothingEvaluable {
                excluded: exclusions.len(),
            });
        }

        let summary = RunSummary {
            evaluated: results.len(),
            matched: results.iter().filter(|r| r.matched).count(),
            excluded: exclusions.len(),
        };

        let completed_at = Utc::now();
        info!(
            scan_id = %id,
            evaluated = summary.evaluated,
            matched = summary.matched,
            excluded = summary.excluded,
            "Screening run complete"
        );

        Ok(ScreenRun {
            id,
            results,
            exclusions,
            summary,
            started_at,
            completed_at,
        })
    }
}

/// Fetch and evaluate a single ticker. All failures become exclusion
/// reasons; nothing here can abort the batch.
async fn evaluate_ticker(
    source: &Arc<dyn TimeSeriesSource>,
    condition: &Arc<dyn Condition>,
    ticker: &str,
    min_bars: usize,
    required: usize,
    fetch_timeout: Duration,
) -> Result<ScreeningResult, ExclusionReason> {
    let bars = fetch_with_timeout(source, ticker, min_bars, fetch_timeout)
        .await
        .map_err(ExclusionReason::from)?;

    if bars.len() < required {
        return Err(ExclusionReason::InsufficientData {
            bars: bars.len(),
            required,
        });
    }

    match condition.evaluate(ticker, &bars) {
        Ok(result) => {
            let last = &bars[bars.len() - 1];
            Ok(ScreeningResult {
                ticker: ticker.to_string(),
                condition_name: result.condition_name.clone(),
                matched: result.matched,
                condition_results: result.flatten_depth_first(),
                current_price: last.close,
                volume: last.volume,
                timestamp: Utc::now(),
            })
        }
        Err(TickwatchError::DataInsufficient { bars, required, .. }) => {
            Err(ExclusionReason::InsufficientData { bars, required })
        }
        Err(e) => Err(ExclusionReason::FetchFailed {
            detail: e.to_string(),
        }),
    }
}
