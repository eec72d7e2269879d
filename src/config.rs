//! Configuration for the tickwatch service.
//!
//! A single JSON file at `~/.tickwatch/config.json` (overridable) with
//! serde-defaulted sections. Everything that can be malformed (cron
//! expressions, condition specs, presets, score bands) is validated once in
//! [`Config::validate`], before any evaluation runs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::conditions::{ConditionSpec, PresetRegistry};
use crate::error::TickwatchError;

/// Default configuration file location.
pub fn config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tickwatch")
        .join("config.json")
}

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP service binding
    #[serde(default)]
    pub service: ServiceConfig,

    /// Logging configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Data source configuration
    #[serde(default)]
    pub data: DataConfig,

    /// Screening configuration
    #[serde(default)]
    pub screener: ScreenerConfig,

    /// Holdings monitor configuration
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Decision scoring configuration
    #[serde(default)]
    pub decision: DecisionConfig,

    /// Portfolio risk limits
    #[serde(default)]
    pub risk: RiskConfig,

    /// Trigger event dispatch configuration
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// User-defined screening presets (merged over the built-ins)
    #[serde(default)]
    pub presets: BTreeMap<String, Vec<ConditionSpec>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Bind address (default local only)
    #[serde(default = "default_host")]
    pub host: String,
    /// Service port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Base log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// "json" or "pretty"
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DataConfig {
    /// Directory of `<TICKER>.json` bar fixtures; the built-in offline
    /// source. Empty means an empty source.
    #[serde(default)]
    pub fixture_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenerConfig {
    /// Whether the scheduled screener is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Cron expression for scheduled scans (seconds field included)
    #[serde(default = "default_screen_cron")]
    pub schedule_cron: String,

    /// Preset evaluated by scheduled scans
    #[serde(default = "default_preset")]
    pub preset: String,

    /// Ticker universe for scheduled scans
    #[serde(default)]
    pub universe: Vec<String>,

    /// Bounded worker budget for parallel evaluation
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Extra bars fetched beyond the condition's required lookback
    #[serde(default = "default_lookback_buffer")]
    pub lookback_buffer: usize,

    /// Per-ticker fetch timeout in seconds
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

impl Default for ScreenerConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            schedule_cron: default_screen_cron(),
            preset: default_preset(),
            universe: Vec::new(),
            max_workers: default_max_workers(),
            lookback_buffer: default_lookback_buffer(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Whether the holdings monitor loop is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Poll interval in seconds
    #[serde(default = "default_monitor_interval_secs")]
    pub interval_secs: u64,

    /// Per-holding fetch timeout in seconds
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Consecutive fetch failures before a holding is flagged
    #[serde(default = "default_failure_streak")]
    pub failure_streak_threshold: u32,

    /// Default stop-loss as a fraction of average price (0.05 = 5%)
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: f64,

    /// Default take-profit as a fraction of average price (0.15 = 15%)
    #[serde(default = "default_take_profit_pct")]
    pub take_profit_pct: f64,

    /// Technical exit conditions evaluated for every holding
    #[serde(default)]
    pub technical: Vec<ConditionSpec>,

    /// Extra bars fetched beyond the condition set's required lookback
    #[serde(default = "default_monitor_buffer")]
    pub lookback_buffer: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            interval_secs: default_monitor_interval_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            failure_streak_threshold: default_failure_streak(),
            stop_loss_pct: default_stop_loss_pct(),
            take_profit_pct: default_take_profit_pct(),
            technical: Vec::new(),
            lookback_buffer: default_monitor_buffer(),
        }
    }
}

/// Ordered category thresholds over the decision score.
///
/// Strictly descending: strong_buy > buy > hold > wait. Scores below `wait`
/// resolve to Sell.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DecisionBands {
    #[serde(default = "default_strong_buy")]
    pub strong_buy: f64,
    #[serde(default = "default_buy")]
    pub buy: f64,
    #[serde(default = "default_hold")]
    pub hold: f64,
    #[serde(default = "default_wait")]
    pub wait: f64,
}

impl Default for DecisionBands {
    fn default() -> Self {
        Self {
            strong_buy: default_strong_buy(),
            buy: default_buy(),
            hold: default_hold(),
            wait: default_wait(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionConfig {
    /// Signal weights keyed by signal (condition) name
    #[serde(default = "default_weights")]
    pub weights: BTreeMap<String, f64>,

    /// Category threshold bands
    #[serde(default)]
    pub bands: DecisionBands,

    /// Score clamp lower bound
    #[serde(default)]
    pub min_score: f64,

    /// Score clamp upper bound
    #[serde(default = "default_max_score")]
    pub max_score: f64,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            weights: default_weights(),
            bands: DecisionBands::default(),
            min_score: 0.0,
            max_score: default_max_score(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Maximum number of simultaneously open positions
    #[serde(default = "default_max_positions")]
    pub max_positions: usize,

    /// Per-position exposure ceiling as % of portfolio value
    #[serde(default = "default_max_position_pct")]
    pub max_position_pct: f64,

    /// Cumulative daily loss floor as % of portfolio value
    #[serde(default = "default_max_daily_loss_pct")]
    pub max_daily_loss_pct: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_positions: default_max_positions(),
            max_position_pct: default_max_position_pct(),
            max_daily_loss_pct: default_max_daily_loss_pct(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Webhook endpoint for trigger events; None keeps the log dispatcher
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Delivery attempts per event
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Webhook request timeout in seconds
    #[serde(default = "default_fetch_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            retry_count: default_retry_count(),
            timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    4471
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}
fn default_true() -> bool {
    true
}
fn default_screen_cron() -> String {
    // 18:00 on weekdays
    "0 0 18 * * Mon-Fri".to_string()
}
fn default_preset() -> String {
    "ma_touch_160".to_string()
}
fn default_max_workers() -> usize {
    5
}
fn default_lookback_buffer() -> usize {
    30
}
fn default_fetch_timeout_secs() -> u64 {
    10
}
fn default_monitor_interval_secs() -> u64 {
    60
}
fn default_failure_streak() -> u32 {
    5
}
fn default_stop_loss_pct() -> f64 {
    0.05
}
fn default_take_profit_pct() -> f64 {
    0.15
}
fn default_monitor_buffer() -> usize {
    5
}
fn default_strong_buy() -> f64 {
    75.0
}
fn default_buy() -> f64 {
    60.0
}
fn default_hold() -> f64 {
    40.0
}
fn default_wait() -> f64 {
    20.0
}
fn default_max_score() -> f64 {
    100.0
}
fn default_max_positions() -> usize {
    10
}
fn default_max_position_pct() -> f64 {
    20.0
}
fn default_max_daily_loss_pct() -> f64 {
    3.0
}
fn default_retry_count() -> u32 {
    3
}

fn default_weights() -> BTreeMap<String, f64> {
    BTreeMap::from([
        ("ma_touch_160d".to_string(), 40.0),
        ("rsi_oversold_30".to_string(), 30.0),
        ("volume_spike_2x".to_string(), 15.0),
        ("ma_cross_up_20_60".to_string(), 15.0),
    ])
}

impl Config {
    /// Load from the default path; a missing file yields defaults.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        }
        Self::load_from(&path)
    }

    /// Load and validate a specific config file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every fallible section. Called at load, before any
    /// evaluation.
    pub fn validate(&self) -> Result<(), TickwatchError> {
        // Presets (built-in + user) must all build.
        let registry = PresetRegistry::with_user_presets(&self.presets)?;

        // The scheduled preset must exist.
        registry.get(&self.screener.preset)?;

        // Cron expression must parse.
        cron::Schedule::from_str(&self.screener.schedule_cron).map_err(|e| {
            TickwatchError::config(format!(
                "invalid schedule_cron '{}': {}",
                self.screener.schedule_cron, e
            ))
        })?;

        // Monitor technical conditions must build.
        for spec in &self.monitor.technical {
            spec.build().map_err(|e| {
                TickwatchError::config(format!("invalid monitor technical condition: {}", e))
            })?;
        }

        if self.screener.max_workers == 0 {
            return Err(TickwatchError::config("screener.max_workers must be >= 1"));
        }
        if self.monitor.interval_secs == 0 {
            return Err(TickwatchError::config("monitor.interval_secs must be >= 1"));
        }
        if !(0.0..1.0).contains(&self.monitor.stop_loss_pct) {
            return Err(TickwatchError::config(
                "monitor.stop_loss_pct must be within [0, 1)",
            ));
        }
        if self.monitor.take_profit_pct < 0.0 {
            return Err(TickwatchError::config(
                "monitor.take_profit_pct must be >= 0",
            ));
        }

        let bands = &self.decision.bands;
        if !(bands.strong_buy > bands.buy && bands.buy > bands.hold && bands.hold > bands.wait) {
            return Err(TickwatchError::config(
                "decision.bands must be strictly descending (strong_buy > buy > hold > wait)",
            ));
        }
        if self.decision.min_score >= self.decision.max_score {
            return Err(TickwatchError::config(
                "decision.min_score must be below decision.max_score",
            ));
        }
        if self.decision.weights.values().any(|w| !w.is_finite()) {
            return Err(TickwatchError::config("decision.weights must be finite"));
        }

        if self.risk.max_positions == 0 {
            return Err(TickwatchError::config("risk.max_positions must be >= 1"));
        }
        if self.risk.max_position_pct <= 0.0 || self.risk.max_position_pct > 100.0 {
            return Err(TickwatchError::config(
                "risk.max_position_pct must be within (0, 100]",
            ));
        }
        if self.risk.max_daily_loss_pct <= 0.0 {
            return Err(TickwatchError::config(
                "risk.max_daily_loss_pct must be > 0",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_minimal_file_round_trips_through_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.service.port, 4471);
        assert_eq!(config.screener.preset, "ma_touch_160");
        assert_eq!(config.screener.max_workers, 5);
        assert!((config.monitor.stop_loss_pct - 0.05).abs() < 1e-9);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "service": {{"port": 9000}},
                "screener": {{"universe": ["005930.KS", "AAPL"], "preset": "golden_cross"}},
                "presets": {{
                    "custom": [{{"kind": "min_price", "min_price": 1000}}]
                }}
            }}"#
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.service.port, 9000);
        assert_eq!(config.screener.universe.len(), 2);
        assert!(config.presets.contains_key("custom"));
    }

    #[test]
    fn test_malformed_preset_fails_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"presets": {{"bad": [{{"kind": "ma_touch", "period": 0}}]}}}}"#
        )
        .unwrap();

        assert!(Config::load_from(file.path()).is_err());
    }

    #[test]
    fn test_unknown_scheduled_preset_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"screener": {{"preset": "missing"}}}}"#).unwrap();
        assert!(Config::load_from(file.path()).is_err());
    }

    #[test]
    fn test_invalid_cron_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"screener": {{"schedule_cron": "not a cron"}}}}"#
        )
        .unwrap();
        assert!(Config::load_from(file.path()).is_err());
    }

    #[test]
    fn test_unordered_bands_fail() {
        let config: Config = serde_json::from_str(
            r#"{"decision": {"bands": {"strong_buy": 50, "buy": 60, "hold": 40, "wait": 20}}}"#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_not_arity_fails_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"presets": {{"double_not": [{{"kind": "not", "of": [
                {{"kind": "min_price", "min_price": 1}},
                {{"kind": "min_price", "min_price": 2}}
            ]}}]}}}}"#
        )
        .unwrap();
        assert!(Config::load_from(file.path()).is_err());
    }
}
