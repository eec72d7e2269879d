//! Scheduled screening.
//!
//! Wraps the screening engine in a cron-driven loop with manual trigger
//! support, scan history, and a status surface. The loop sleeps between
//! fire times and never overlaps scans.

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, RwLock};
use tracing::{info, warn};

use crate::conditions::PresetRegistry;
use crate::config::ScreenerConfig;
use crate::error::TickwatchError;
use crate::screener::{ScreenRun, ScreenerEngine};

/// Number of retained history entries.
const HISTORY_CAP: usize = 50;

/// Scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    /// Waiting for the next fire time
    Idle,
    /// A scan is in progress
    Running,
    /// Stopped
    Stopped,
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Scheduler status snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub state: SchedulerState,
    pub last_scan_at: Option<DateTime<Utc>>,
    pub next_scan_at: Option<DateTime<Utc>>,
    pub last_scan_id: Option<String>,
    pub last_error: Option<String>,
}

/// Record of a completed scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanHistoryEntry {
    pub id: String,
    pub completed_at: DateTime<Utc>,
    pub evaluated: usize,
    pub matched: usize,
    pub excluded: usize,
}

impl From<&ScreenRun> for ScanHistoryEntry {
    fn from(run: &ScreenRun) -> Self {
        Self {
            id: run.id.clone(),
            completed_at: run.completed_at,
            evaluated: run.summary.evaluated,
            matched: run.summary.matched,
            excluded: run.summary.excluded,
        }
    }
}

/// Cron-driven wrapper around the screening engine.
pub struct ScreenScheduler {
    config: ScreenerConfig,
    engine: Arc<ScreenerEngine>,
    registry: PresetRegistry,
    schedule: cron::Schedule,
    state: Arc<RwLock<SchedulerState>>,
    status: Arc<RwLock<SchedulerStatus>>,
    history: Arc<RwLock<Vec<ScanHistoryEntry>>>,
    latest: Arc<RwLock<Option<ScreenRun>>>,
    stop_notify: Notify,
}

impl ScreenScheduler {
    /// Create a scheduler from validated configuration.
    pub fn new(
        config: ScreenerConfig,
        engine: Arc<ScreenerEngine>,
        registry: PresetRegistry,
    ) -> Result<Self, TickwatchError> {
        let schedule = cron::Schedule::from_str(&config.schedule_cron).map_err(|e| {
            TickwatchError::config(format!(
                "invalid schedule_cron '{}': {}",
                config.schedule_cron, e
            ))
        })?;

        let status = SchedulerStatus {
            state: SchedulerState::Idle,
            last_scan_at: None,
            next_scan_at: None,
            last_scan_id: None,
            last_error: None,
        };

        Ok(Self {
            config,
            engine,
            registry,
            schedule,
            state: Arc::new(RwLock::new(SchedulerState::Idle)),
            status: Arc::new(RwLock::new(status)),
            history: Arc::new(RwLock::new(Vec::new())),
            latest: Arc::new(RwLock::new(None)),
            stop_notify: Notify::new(),
        })
    }

    /// Current state.
    pub async fn state(&self) -> SchedulerState {
        *self.state.read().await
    }

    /// Status snapshot, with the next fire time computed from the schedule.
    pub async fn status(&self) -> SchedulerStatus {
        let mut status = self.status.read().await.clone();
        status.next_scan_at = self
            .schedule
            .upcoming(Local)
            .next()
            .map(|t| t.with_timezone(&Utc));
        status
    }

    /// Scan history, newest first.
    pub async fn history(&self, limit: usize) -> Vec<ScanHistoryEntry> {
        let history = self.history.read().await;
        history.iter().rev().take(limit).cloned().collect()
    }

    /// The most recent completed run.
    pub async fn latest_result(&self) -> Option<ScreenRun> {
        self.latest.read().await.clone()
    }

    /// Run a scan now. Overlapping scans are rejected.
    ///
    /// `preset` and `universe` default to the configured scheduled scan.
    pub async fn trigger_scan(
        &self,
        preset: Option<&str>,
        universe: Option<Vec<String>>,
    ) -> Result<ScreenRun> {
        {
            let mut state = self.state.write().await;
            if *state == SchedulerState::Running {
                anyhow::bail!("a scan is already in progress");
            }
            *state = SchedulerState::Running;
        }
        self.set_status_state(SchedulerState::Running).await;

        let result = self.scan_inner(preset, universe).await;

        {
            let mut state = self.state.write().await;
            if *state == SchedulerState::Running {
                *state = SchedulerState::Idle;
            }
        }
        self.set_status_state(SchedulerState::Idle).await;

        result
    }

    async fn scan_inner(
        &self,
        preset: Option<&str>,
        universe: Option<Vec<String>>,
    ) -> Result<ScreenRun> {
        let preset_name = preset.unwrap_or(&self.config.preset);
        let universe = universe.unwrap_or_else(|| self.config.universe.clone());

        let condition = self
            .registry
            .build(preset_name)
            .with_context(|| format!("failed to build preset '{}'", preset_name))?;

        let outcome = self
            .engine
            .run(Arc::from(condition), &universe)
            .await
            .with_context(|| format!("screening run for preset '{}' failed", preset_name));

        match outcome {
            Ok(run) => {
                {
                    let mut status = self.status.write().await;
                    status.last_scan_at = Some(run.completed_at);
                    status.last_scan_id = Some(run.id.clone());
                    status.last_error = None;
                }
                {
                    let mut history = self.history.write().await;
                    history.push(ScanHistoryEntry::from(&run));
                    let overflow = history.len().saturating_sub(HISTORY_CAP);
                    if overflow > 0 {
                        history.drain(..overflow);
                    }
                }
                *self.latest.write().await = Some(run.clone());
                Ok(run)
            }
            Err(e) => {
                self.status.write().await.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Run the schedule loop until stopped.
    pub async fn run(&self) -> Result<()> {
        info!(
            cron = %self.config.schedule_cron,
            preset = %self.config.preset,
            universe = self.config.universe.len(),
            "Screen scheduler started"
        );

        loop {
            let next_fire = match self.schedule.upcoming(Local).next() {
                Some(t) => t,
                None => {
                    warn!("Schedule has no upcoming fire times; scheduler exiting");
                    break;
                }
            };

            let wait = match (next_fire - Local::now()).to_std() {
                Ok(duration) => duration,
                Err(_) => continue,
            };

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    if self.config.universe.is_empty() {
                        warn!("Scheduled scan skipped: universe is empty");
                        continue;
                    }
                    if let Err(e) = self.trigger_scan(None, None).await {
                        warn!(error = %e, "Scheduled scan failed");
                    }
                }
                _ = self.stop_notify.notified() => break,
            }
        }

        {
            let mut state = self.state.write().await;
            *state = SchedulerState::Stopped;
        }
        self.set_status_state(SchedulerState::Stopped).await;
        info!("Screen scheduler stopped");
        Ok(())
    }

    /// Request a cooperative stop at the next wait boundary.
    pub async fn stop(&self) {
        self.stop_notify.notify_one();
    }

    async fn set_status_state(&self, state: SchedulerState) {
        self.status.write().await.state = state;
    }
}
