//! The holdings poll loop.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, RwLock};
use tracing::{debug, info, warn};

use super::trigger::{TriggerEvent, TriggerStates};
use crate::conditions::price::{MaxPriceCondition, MinPriceCondition};
use crate::conditions::Condition;
use crate::config::{MonitorConfig, RiskConfig};
use crate::data::{fetch_with_timeout, SourceError, TimeSeriesSource};
use crate::dispatch::ActionDispatcher;
use crate::error::TickwatchError;
use crate::portfolio::{Holding, HoldingsStore, PortfolioState, ProposedAction, RiskDecision, RiskGate};

/// Recent trigger events kept for status reporting.
const EVENT_HISTORY_CAP: usize = 100;

/// Monitor loop state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorState {
    /// Not started
    Idle,
    /// Polling
    Running,
    /// Stop requested; draining the in-flight pass
    Stopping,
    /// Stopped
    Stopped,
}

impl std::fmt::Display for MonitorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Monitor status snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorStatus {
    pub state: MonitorState,
    pub ticks_completed: u64,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub holdings_monitored: usize,
    pub events_fired: u64,
    /// Current consecutive fetch-failure streak per ticker
    pub failing_fetches: BTreeMap<String, u32>,
}

impl MonitorStatus {
    fn initial() -> Self {
        Self {
            state: MonitorState::Idle,
            ticks_completed: 0,
            last_tick_at: None,
            holdings_monitored: 0,
            events_fired: 0,
            failing_fetches: BTreeMap::new(),
        }
    }
}

/// Outcome of evaluating one holding's condition set against fresh bars.
struct HoldingEvaluation {
    /// (condition label, matched) in evaluation order
    observations: Vec<(String, bool)>,
    last_close: f64,
    prev_close: f64,
}

/// Polls open holdings and turns condition matches into one-shot trigger
/// events.
///
/// One evaluation pass runs per tick on a single task, which linearizes
/// every ARMED/FIRED transition; holdings are snapshotted at tick start and
/// mutations never interleave with an in-flight pass.
pub struct TriggerMonitor {
    config: MonitorConfig,
    source: Arc<dyn TimeSeriesSource>,
    holdings: Arc<HoldingsStore>,
    dispatcher: Arc<dyn ActionDispatcher>,
    gate: RiskGate,
    /// Pre-built technical conditions shared by every holding
    technical: Vec<Box<dyn Condition>>,
    /// Trigger states; only the tick pass writes
    states: std::sync::Mutex<TriggerStates>,
    state: Arc<RwLock<MonitorState>>,
    status: Arc<RwLock<MonitorStatus>>,
    recent_events: Arc<RwLock<Vec<TriggerEvent>>>,
    stop_notify: Notify,
}

impl TriggerMonitor {
    /// Build a monitor from validated configuration.
    pub fn new(
        config: MonitorConfig,
        risk: RiskConfig,
        source: Arc<dyn TimeSeriesSource>,
        holdings: Arc<HoldingsStore>,
        dispatcher: Arc<dyn ActionDispatcher>,
    ) -> Result<Self, TickwatchError> {
        let technical = config
            .technical
            .iter()
            .map(|spec| spec.build())
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            config,
            source,
            holdings,
            dispatcher,
            gate: RiskGate::new(risk),
            technical,
            states: std::sync::Mutex::new(TriggerStates::new()),
            state: Arc::new(RwLock::new(MonitorState::Idle)),
            status: Arc::new(RwLock::new(MonitorStatus::initial())),
            recent_events: Arc::new(RwLock::new(Vec::new())),
            stop_notify: Notify::new(),
        })
    }

    /// Current loop state.
    pub async fn state(&self) -> MonitorState {
        *self.state.read().await
    }

    /// Status snapshot for reporting surfaces.
    pub async fn status(&self) -> MonitorStatus {
        self.status.read().await.clone()
    }

    /// Most recent trigger events, newest last.
    pub async fn recent_events(&self, limit: usize) -> Vec<TriggerEvent> {
        let events = self.recent_events.read().await;
        let start = events.len().saturating_sub(limit);
        events[start..].to_vec()
    }

    /// Request a cooperative stop. The in-flight pass drains; the loop
    /// exits at the wait-for-next-tick boundary.
    pub async fn stop(&self) {
        let mut state = self.state.write().await;
        if *state == MonitorState::Running {
            *state = MonitorState::Stopping;
            info!("Monitor stopping");
        }
        drop(state);
        self.stop_notify.notify_one();
    }

    /// Run the poll loop until stopped.
    pub async fn run(&self) -> Result<()> {
        {
            let mut state = self.state.write().await;
            *state = MonitorState::Running;
            self.status.write().await.state = MonitorState::Running;
        }
        info!(
            interval_secs = self.config.interval_secs,
            technical_conditions = self.technical.len(),
            "Monitor started"
        );

        let mut interval = tokio::time::interval(Duration::from_secs(self.config.interval_secs));

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match *self.state.read().await {
                        MonitorState::Stopping | MonitorState::Stopped => break,
                        MonitorState::Running => {
                            if let Err(e) = self.poll_once().await {
                                warn!(error = %e, "Monitor tick failed");
                            }
                        }
                        MonitorState::Idle => continue,
                    }
                }
                _ = self.stop_notify.notified() => break,
            }
        }

        {
            let mut state = self.state.write().await;
            *state = MonitorState::Stopped;
            self.status.write().await.state = MonitorState::Stopped;
        }
        info!("Monitor stopped");
        Ok(())
    }

    /// One evaluation pass over a consistent snapshot of holdings.
    ///
    /// Per-holding failures are isolated: a fetch problem for one ticker is
    /// recorded and retried next tick while the rest of the pass continues.
    pub async fn poll_once(&self) -> Result<()> {
        let snapshot = self.holdings.snapshot().await;
        let mut fired: Vec<TriggerEvent> = Vec::new();
        let mut prices: HashMap<String, (f64, f64)> = HashMap::new();

        for holding in &snapshot {
            match self.evaluate_holding(holding).await {
                Ok(evaluation) => {
                    prices.insert(
                        holding.ticker.clone(),
                        (evaluation.last_close, evaluation.prev_close),
                    );
                    self.clear_failure(&holding.ticker).await;

                    let mut states = self.states.lock().expect("trigger state lock poisoned");
                    for (label, matched) in evaluation.observations {
                        if let Some(event) =
                            states.observe(&holding.ticker, &label, matched, evaluation.last_close)
                        {
                            fired.push(event);
                        }
                    }
                }
                Err(e) => {
                    self.record_failure(&holding.ticker, &e).await;
                }
            }
        }

        // Drop trigger state for holdings that are gone.
        {
            let live: HashSet<&str> = snapshot.iter().map(|h| h.ticker.as_str()).collect();
            let mut states = self.states.lock().expect("trigger state lock poisoned");
            states.retain_tickers(|ticker| live.contains(ticker));
        }

        // Portfolio aggregates for the risk gate, from this tick's prices.
        let portfolio_value: f64 = snapshot
            .iter()
            .map(|h| {
                let price = prices
                    .get(&h.ticker)
                    .map(|(last, _)| *last)
                    .unwrap_or(h.avg_price);
                h.quantity * price
            })
            .sum();
        let daily_pnl: f64 = snapshot
            .iter()
            .filter_map(|h| {
                prices
                    .get(&h.ticker)
                    .map(|(last, prev)| h.quantity * (last - prev))
            })
            .sum();

        // Mutation-side effects only after evaluation of the snapshot is
        // complete: gate the proposed action, then hand the event off.
        for event in &fired {
            if let Some(holding) = snapshot.iter().find(|h| h.ticker == event.ticker) {
                self.gate_proposed_action(event, holding, &snapshot, &prices, portfolio_value, daily_pnl);
            }

            if let Err(e) = self.dispatcher.deliver_event(event).await {
                warn!(
                    event_id = %event.id,
                    dispatcher = self.dispatcher.name(),
                    error = %e,
                    "Event delivery failed"
                );
            }
        }

        // Bookkeeping
        {
            let mut status = self.status.write().await;
            status.ticks_completed += 1;
            status.last_tick_at = Some(Utc::now());
            status.holdings_monitored = snapshot.len();
            status.events_fired += fired.len() as u64;
        }
        if !fired.is_empty() {
            let mut events = self.recent_events.write().await;
            events.extend(fired);
            let overflow = events.len().saturating_sub(EVENT_HISTORY_CAP);
            if overflow > 0 {
                events.drain(..overflow);
            }
        }

        Ok(())
    }

    /// Evaluate one holding's condition set against freshly fetched bars.
    async fn evaluate_holding(
        &self,
        holding: &Holding,
    ) -> Result<HoldingEvaluation, SourceError> {
        let protective = self.protective_conditions(holding);

        let required = protective
            .iter()
            .map(|(_, c)| c.required_lookback())
            .chain(self.technical.iter().map(|c| c.required_lookback()))
            .max()
            .unwrap_or(1)
            .max(2);

        let bars = fetch_with_timeout(
            &self.source,
            &holding.ticker,
            required + self.config.lookback_buffer,
            Duration::from_secs(self.config.fetch_timeout_secs),
        )
        .await?;

        if bars.is_empty() {
            return Err(SourceError::Fetch {
                ticker: holding.ticker.clone(),
                reason: "source returned an empty series".to_string(),
            });
        }

        let last_close = bars[bars.len() - 1].close;
        let prev_close = if bars.len() >= 2 {
            bars[bars.len() - 2].close
        } else {
            last_close
        };

        let mut observations = Vec::new();
        for (label, condition) in &protective {
            self.observe_condition(holding, label, condition.as_ref(), &bars, &mut observations);
        }
        for condition in &self.technical {
            let label = condition.name();
            self.observe_condition(holding, &label, condition.as_ref(), &bars, &mut observations);
        }

        Ok(HoldingEvaluation {
            observations,
            last_close,
            prev_close,
        })
    }

    /// Evaluate a single condition, recording the observation on success.
    ///
    /// A condition that cannot be evaluated this tick (short history) is
    /// skipped entirely: no observation means no transition, so a FIRED pair
    /// is never re-armed by missing data.
    fn observe_condition(
        &self,
        holding: &Holding,
        label: &str,
        condition: &dyn Condition,
        bars: &[crate::data::Bar],
        observations: &mut Vec<(String, bool)>,
    ) {
        match condition.evaluate(&holding.ticker, bars) {
            Ok(result) => observations.push((label.to_string(), result.matched)),
            Err(TickwatchError::DataInsufficient { bars, required, .. }) => {
                debug!(
                    ticker = %holding.ticker,
                    condition = %label,
                    bars,
                    required,
                    "Condition skipped this tick: insufficient history"
                );
            }
            Err(e) => {
                debug!(ticker = %holding.ticker, condition = %label, error = %e, "Condition evaluation failed");
            }
        }
    }

    /// Protective stop-loss / take-profit conditions for a holding, with
    /// per-holding overrides taking precedence over the configured defaults.
    ///
    /// Labels are stable ("stop_loss", "take_profit") so trigger state
    /// survives average-price changes from add-on buys.
    fn protective_conditions(&self, holding: &Holding) -> Vec<(String, Box<dyn Condition>)> {
        let mut conditions: Vec<(String, Box<dyn Condition>)> = Vec::new();

        let stop_loss_pct = holding.stop_loss_pct.unwrap_or(self.config.stop_loss_pct);
        if stop_loss_pct > 0.0 {
            let level = holding.avg_price * (1.0 - stop_loss_pct);
            conditions.push((
                "stop_loss".to_string(),
                Box::new(MaxPriceCondition::new(level)),
            ));
        }

        let take_profit_pct = holding.take_profit_pct.unwrap_or(self.config.take_profit_pct);
        if take_profit_pct > 0.0 {
            let level = holding.avg_price * (1.0 + take_profit_pct);
            conditions.push((
                "take_profit".to_string(),
                Box::new(MinPriceCondition::new(level)),
            ));
        }

        conditions
    }

    /// Run the proposed exit through the risk gate. The event itself is
    /// always delivered; the gate vetoes actions, not alerts.
    fn gate_proposed_action(
        &self,
        event: &TriggerEvent,
        holding: &Holding,
        snapshot: &[Holding],
        prices: &HashMap<String, (f64, f64)>,
        portfolio_value: f64,
        daily_pnl: f64,
    ) {
        let position_value = prices
            .get(&holding.ticker)
            .map(|(last, _)| holding.quantity * last)
            .unwrap_or_else(|| holding.cost_basis());

        let action = ProposedAction::Sell {
            ticker: holding.ticker.clone(),
            quantity: holding.quantity,
            price: event.snapshot_price,
        };
        let state = PortfolioState {
            portfolio_value,
            open_positions: snapshot.len(),
            holds_ticker: true,
            position_value,
            daily_pnl,
        };

        match self.gate.check(&action, &state) {
            RiskDecision::Allow => {
                info!(
                    ticker = %holding.ticker,
                    condition = %event.condition_name,
                    quantity = holding.quantity,
                    "Proposed exit allowed by risk gate"
                );
            }
            RiskDecision::Deny { reason, detail } => {
                warn!(
                    ticker = %holding.ticker,
                    condition = %event.condition_name,
                    reason = ?reason,
                    detail = %detail,
                    "Proposed exit denied by risk gate"
                );
            }
        }
    }

    async fn clear_failure(&self, ticker: &str) {
        let mut status = self.status.write().await;
        status.failing_fetches.remove(ticker);
    }

    /// Track a fetch failure streak. Crossing the configured threshold
    /// raises a warning; the holding stays under monitoring either way and
    /// the fetch is retried next tick.
    async fn record_failure(&self, ticker: &str, error: &SourceError) {
        let mut status = self.status.write().await;
        let streak = status.failing_fetches.entry(ticker.to_string()).or_insert(0);
        *streak += 1;

        if *streak == self.config.failure_streak_threshold {
            warn!(
                ticker = %ticker,
                streak = *streak,
                error = %error,
                "Holding data fetch failing persistently"
            );
        } else {
            debug!(ticker = %ticker, streak = *streak, error = %error, "Holding data fetch failed");
        }
    }
}
