//! Tickwatch Library
//!
//! Equity screening and portfolio trigger monitoring.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     tickwatch (Rust Service)                    │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐   ┌───────────────┐   ┌──────────────────┐   │
//! │  │  Screener    │   │  Decision     │   │  Trigger         │   │
//! │  │  Engine      │──▶│  Scorer       │   │  Monitor         │   │
//! │  └──────────────┘   └───────────────┘   └──────────────────┘   │
//! │         │                                      │                │
//! │         └─────────── Condition framework ──────┤                │
//! │                                                ▼                │
//! │                                   RiskGate ─▶ Dispatcher        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Two paths share the condition framework: a screening path (engine →
//! scorer → ranked output) and a monitoring path (monitor → risk gate →
//! dispatcher). Both treat per-ticker data problems as recorded exclusions,
//! never as run failures.

#![warn(clippy::all)]

pub mod conditions;
pub mod config;
pub mod data;
pub mod decision;
pub mod dispatch;
pub mod error;
pub mod indicators;
pub mod logging;
pub mod monitor;
pub mod portfolio;
pub mod routes;
pub mod scheduler;
pub mod screener;

use anyhow::{Context, Result};
use axum::{
    routing::{delete, get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;

use crate::conditions::PresetRegistry;
use crate::config::Config;
use crate::data::{FixtureDataSource, TimeSeriesSource};
use crate::decision::DecisionScorer;
use crate::dispatch::{dispatcher_from_config, ActionDispatcher};
use crate::monitor::TriggerMonitor;
use crate::portfolio::HoldingsStore;
use crate::scheduler::ScreenScheduler;
use crate::screener::ScreenerEngine;

/// Shared service state.
pub struct WatchState {
    /// Configuration
    pub config: Config,
    /// Time-series source
    pub source: Arc<dyn TimeSeriesSource>,
    /// Preset registry (built-ins + user presets)
    pub registry: PresetRegistry,
    /// Holdings store
    pub holdings: Arc<HoldingsStore>,
    /// Screening engine
    pub engine: Arc<ScreenerEngine>,
    /// Scheduled screening wrapper
    pub scheduler: Arc<ScreenScheduler>,
    /// Holdings monitor
    pub monitor: Arc<TriggerMonitor>,
    /// Decision scorer
    pub scorer: DecisionScorer,
    /// Event dispatcher
    pub dispatcher: Arc<dyn ActionDispatcher>,
}

impl WatchState {
    /// Wire up all components from a validated configuration.
    pub fn new(config: Config) -> Result<Self> {
        let source: Arc<dyn TimeSeriesSource> = match &config.data.fixture_dir {
            Some(dir) => Arc::new(
                FixtureDataSource::load_dir(dir)
                    .with_context(|| format!("failed to load fixtures from {}", dir.display()))?,
            ),
            None => Arc::new(FixtureDataSource::new()),
        };

        let registry = PresetRegistry::with_user_presets(&config.presets)?;
        let holdings = Arc::new(HoldingsStore::new());
        let dispatcher = dispatcher_from_config(&config.dispatch);

        let engine = Arc::new(ScreenerEngine::new(Arc::clone(&source), &config.screener));
        let scheduler = Arc::new(ScreenScheduler::new(
            config.screener.clone(),
            Arc::clone(&engine),
            registry.clone(),
        )?);
        let monitor = Arc::new(TriggerMonitor::new(
            config.monitor.clone(),
            config.risk.clone(),
            Arc::clone(&source),
            Arc::clone(&holdings),
            Arc::clone(&dispatcher),
        )?);
        let scorer = DecisionScorer::new(config.decision.clone());

        Ok(Self {
            config,
            source,
            registry,
            holdings,
            engine,
            scheduler,
            monitor,
            scorer,
            dispatcher,
        })
    }
}

/// Main service: HTTP surface plus the background monitor and scheduler
/// loops.
pub struct WatchService {
    state: Arc<WatchState>,
}

impl WatchService {
    /// Create a service from a validated configuration.
    pub fn new(config: Config) -> Result<Self> {
        Ok(Self {
            state: Arc::new(WatchState::new(config)?),
        })
    }

    /// Build the HTTP router over the service state.
    pub fn router(state: Arc<WatchState>) -> Router {
        Router::new()
            .route("/health", get(routes::health))
            .route("/api/v1/screen", post(routes::run_screen))
            .route("/api/v1/screen/latest", get(routes::latest_screen))
            .route("/api/v1/screen/status", get(routes::screen_status))
            .route(
                "/api/v1/holdings",
                get(routes::get_holdings).post(routes::add_holding),
            )
            .route("/api/v1/holdings/:ticker/reduce", post(routes::reduce_holding))
            .route("/api/v1/holdings/:ticker", delete(routes::remove_holding))
            .route("/api/v1/monitor/status", get(routes::monitor_status))
            .route("/api/v1/decision/:ticker", get(routes::get_decision))
            .layer(TimeoutLayer::new(Duration::from_secs(60)))
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Start the service and serve until the process exits.
    pub async fn start(self) -> Result<()> {
        let host = self.state.config.service.host.clone();
        let port = self.state.config.service.port;

        // Holdings monitor loop
        if self.state.config.monitor.enabled {
            let monitor_state = Arc::clone(&self.state);
            tokio::spawn(async move {
                if let Err(e) = monitor_state.monitor.run().await {
                    tracing::error!(error = %e, "Monitor loop failed");
                }
            });
        }

        // Scheduled screening loop
        if self.state.config.screener.enabled {
            let scheduler_state = Arc::clone(&self.state);
            tokio::spawn(async move {
                if let Err(e) = scheduler_state.scheduler.run().await {
                    tracing::error!(error = %e, "Screen scheduler failed");
                }
            });
        }

        let app = Self::router(Arc::clone(&self.state));
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", host, port))?;
        tracing::info!(address = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}
