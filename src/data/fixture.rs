//! JSON fixture data source.
//!
//! Serves bar history from an in-memory map, optionally loaded from a
//! directory of `<TICKER>.json` files. Used by tests and offline runs; a
//! production deployment plugs a real provider into [`TimeSeriesSource`].

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use anyhow::{Context, Result};

use super::{Bar, SourceError, TimeSeriesSource};

/// In-memory time-series source keyed by ticker.
#[derive(Default)]
pub struct FixtureDataSource {
    series: RwLock<HashMap<String, Vec<Bar>>>,
}

impl FixtureDataSource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `<TICKER>.json` file in `dir` as a bar series.
    ///
    /// Each file holds a JSON array of bars in ascending time order.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let source = Self::new();
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("failed to read fixture directory {}", dir.display()))?;

        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let ticker = match path.file_stem().and_then(|s| s.to_str()) {
                Some(stem) => stem.to_string(),
                None => continue,
            };
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let bars: Vec<Bar> = serde_json::from_str(&content)
                .with_context(|| format!("invalid bar data in {}", path.display()))?;
            source.insert(&ticker, bars);
        }

        Ok(source)
    }

    /// Insert or replace the series for a ticker.
    pub fn insert(&self, ticker: &str, bars: Vec<Bar>) {
        self.series
            .write()
            .expect("fixture lock poisoned")
            .insert(ticker.to_string(), bars);
    }

    /// Number of tickers loaded.
    pub fn len(&self) -> usize {
        self.series.read().expect("fixture lock poisoned").len()
    }

    /// Whether the source holds no series.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All loaded tickers.
    pub fn tickers(&self) -> Vec<String> {
        self.series
            .read()
            .expect("fixture lock poisoned")
            .keys()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TimeSeriesSource for FixtureDataSource {
    fn name(&self) -> &'static str {
        "fixture"
    }

    async fn get_bars(&self, ticker: &str, min_bars: usize) -> Result<Vec<Bar>, SourceError> {
        let series = self.series.read().expect("fixture lock poisoned");
        match series.get(ticker) {
            Some(bars) => {
                // Serve the most recent window; short histories are served
                // as-is and judged by the evaluation layer.
                let start = bars.len().saturating_sub(min_bars);
                Ok(bars[start..].to_vec())
            }
            None => Err(SourceError::Unavailable {
                ticker: ticker.to_string(),
                reason: "ticker not in fixture set".to_string(),
            }),
        }
    }
}
