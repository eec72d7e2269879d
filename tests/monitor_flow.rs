//! End-to-end integration tests for the monitoring flow.
//!
//! Exercises the holdings store, trigger monitor, hysteresis, and event
//! dispatch against fixture data that changes between ticks.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::Mutex;

use tickwatch::config::{MonitorConfig, RiskConfig};
use tickwatch::data::{Bar, FixtureDataSource, TimeSeriesSource};
use tickwatch::decision::Decision;
use tickwatch::dispatch::ActionDispatcher;
use tickwatch::monitor::{TriggerEvent, TriggerMonitor};
use tickwatch::portfolio::{AddHolding, HoldingsStore};

// ============================================================================
// Test Doubles
// ============================================================================

/// Dispatcher that records everything it is handed.
#[derive(Default)]
struct CollectingDispatcher {
    events: Mutex<Vec<TriggerEvent>>,
}

#[async_trait]
impl ActionDispatcher for CollectingDispatcher {
    fn name(&self) -> &'static str {
        "collecting"
    }

    async fn deliver_event(&self, event: &TriggerEvent) -> Result<()> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }

    async fn deliver_decision(&self, _decision: &Decision) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
    let now = Utc::now();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Bar {
            timestamp: now - Duration::days((closes.len() - i - 1) as i64),
            open: close,
            high: close * 1.01,
            low: close * 0.99,
            close,
            volume: 120_000.0,
        })
        .collect()
}

fn monitor_config() -> MonitorConfig {
    MonitorConfig {
        interval_secs: 1,
        fetch_timeout_secs: 2,
        ..MonitorConfig::default()
    }
}

struct Harness {
    source: Arc<FixtureDataSource>,
    holdings: Arc<HoldingsStore>,
    dispatcher: Arc<CollectingDispatcher>,
    monitor: TriggerMonitor,
}

fn harness(config: MonitorConfig) -> Harness {
    let source = Arc::new(FixtureDataSource::new());
    let holdings = Arc::new(HoldingsStore::new());
    let dispatcher = Arc::new(CollectingDispatcher::default());

    let monitor = TriggerMonitor::new(
        config,
        RiskConfig::default(),
        Arc::clone(&source) as Arc<dyn TimeSeriesSource>,
        Arc::clone(&holdings),
        Arc::clone(&dispatcher) as Arc<dyn ActionDispatcher>,
    )
    .unwrap();

    Harness {
        source,
        holdings,
        dispatcher,
        monitor,
    }
}

async fn open_position(holdings: &HoldingsStore, ticker: &str, quantity: f64, price: f64) {
    holdings
        .add(AddHolding {
            ticker: ticker.to_string(),
            quantity,
            price,
            note: None,
            stop_loss_pct: None,
            take_profit_pct: None,
        })
        .await
        .unwrap();
}

// ============================================================================
// Monitoring Flow
// ============================================================================

#[tokio::test]
async fn test_stop_loss_event_reaches_dispatcher_once() {
    let h = harness(monitor_config());
    open_position(&h.holdings, "005930.KS", 10.0, 70000.0).await;

    // 6% below entry: the default 5% stop is breached.
    h.source
        .insert("005930.KS", bars_from_closes(&[70000.0, 67000.0, 65800.0]));

    h.monitor.poll_once().await.unwrap();
    h.monitor.poll_once().await.unwrap();
    h.monitor.poll_once().await.unwrap();

    // Three ticks over unchanged data: exactly one delivery.
    let events = h.dispatcher.events.lock().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].ticker, "005930.KS");
    assert_eq!(events[0].condition_name, "stop_loss");
    assert!((events[0].snapshot_price - 65800.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_hysteresis_fires_exactly_twice() {
    let h = harness(monitor_config());
    open_position(&h.holdings, "X", 10.0, 100.0).await;

    // Stop level is 95. Matching on ticks 1-3, clearing on tick 4,
    // matching again on tick 5 must fire exactly twice.
    for price in [94.0, 94.5, 93.0, 99.0, 94.0] {
        h.source.insert("X", bars_from_closes(&[100.0, price]));
        h.monitor.poll_once().await.unwrap();
    }

    let events = h.dispatcher.events.lock().await;
    let stops: Vec<_> = events
        .iter()
        .filter(|e| e.condition_name == "stop_loss")
        .collect();
    assert_eq!(stops.len(), 2);
}

#[tokio::test]
async fn test_one_failing_holding_does_not_block_others() {
    let h = harness(monitor_config());
    open_position(&h.holdings, "GOOD", 5.0, 100.0).await;
    open_position(&h.holdings, "DEAD", 5.0, 100.0).await;

    // Only GOOD has data; its take-profit level (115) is hit.
    h.source.insert("GOOD", bars_from_closes(&[100.0, 118.0]));

    for _ in 0..6 {
        h.monitor.poll_once().await.unwrap();
    }

    let events = h.dispatcher.events.lock().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].ticker, "GOOD");
    assert_eq!(events[0].condition_name, "take_profit");

    // DEAD is flagged after the failure-streak threshold but still
    // monitored and retried every tick.
    let status = h.monitor.status().await;
    assert_eq!(status.failing_fetches.get("DEAD"), Some(&6));
    assert_eq!(status.holdings_monitored, 2);
    assert_eq!(status.ticks_completed, 6);
}

#[tokio::test]
async fn test_snapshot_discipline_mid_tick_mutation() {
    let h = harness(monitor_config());
    open_position(&h.holdings, "X", 10.0, 100.0).await;
    h.source.insert("X", bars_from_closes(&[100.0, 94.0]));

    // First tick evaluates the snapshot and fires.
    h.monitor.poll_once().await.unwrap();
    assert_eq!(h.dispatcher.events.lock().await.len(), 1);

    // The consumer closes the position in response; the next tick's
    // snapshot no longer contains it and its trigger state is dropped.
    h.holdings.reduce("X", 10.0).await.unwrap();
    h.monitor.poll_once().await.unwrap();
    assert_eq!(h.dispatcher.events.lock().await.len(), 1);

    // Re-opening starts from a fresh ARMED state and fires again.
    open_position(&h.holdings, "X", 10.0, 100.0).await;
    h.monitor.poll_once().await.unwrap();
    assert_eq!(h.dispatcher.events.lock().await.len(), 2);
}

#[tokio::test]
async fn test_add_on_buy_moves_protective_levels() {
    let h = harness(monitor_config());
    open_position(&h.holdings, "X", 10.0, 100.0).await;
    // Averaging down: avg price becomes 90, stop level 85.5.
    open_position(&h.holdings, "X", 10.0, 80.0).await;

    // 88 would breach a stop computed from the original 100 entry but not
    // from the blended average.
    h.source.insert("X", bars_from_closes(&[90.0, 88.0]));
    h.monitor.poll_once().await.unwrap();
    assert!(h.dispatcher.events.lock().await.is_empty());

    // Below the blended stop level it fires.
    h.source.insert("X", bars_from_closes(&[90.0, 85.0]));
    h.monitor.poll_once().await.unwrap();
    assert_eq!(h.dispatcher.events.lock().await.len(), 1);
}

#[tokio::test]
async fn test_technical_exit_and_protective_stops_are_independent() {
    use tickwatch::conditions::ConditionSpec;

    let config = MonitorConfig {
        technical: vec![ConditionSpec::RsiOverbought {
            threshold: 70.0,
            period: 14,
        }],
        ..monitor_config()
    };
    let h = harness(config);
    open_position(&h.holdings, "X", 10.0, 100.0).await;

    // Rally into overbought territory AND through the take-profit level.
    let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
    h.source.insert("X", bars_from_closes(&closes));

    h.monitor.poll_once().await.unwrap();

    let events = h.dispatcher.events.lock().await;
    let names: Vec<&str> = events.iter().map(|e| e.condition_name.as_str()).collect();
    assert_eq!(events.len(), 2);
    assert!(names.contains(&"take_profit"));
    assert!(names.contains(&"rsi_overbought_70"));
}

// ============================================================================
// Holdings Invariants (through the public store API)
// ============================================================================

#[tokio::test]
async fn test_holdings_invariants_under_mixed_sequences() {
    let holdings = HoldingsStore::new();

    open_position(&holdings, "X", 10.0, 100.0).await;
    open_position(&holdings, "X", 20.0, 130.0).await;

    // Weighted average: (10*100 + 20*130) / 30 = 120
    let holding = holdings.get("X").await.unwrap();
    assert_eq!(holding.quantity, 30.0);
    assert!((holding.avg_price - 120.0).abs() < 1e-9);

    // Over-reduction rejected, state unchanged.
    assert!(holdings.reduce("X", 31.0).await.is_err());
    assert_eq!(holdings.get("X").await.unwrap().quantity, 30.0);

    // Partial reductions preserve quantity > 0, full reduction closes.
    holdings.reduce("X", 15.0).await.unwrap();
    assert!(holdings.get("X").await.unwrap().quantity > 0.0);
    assert!(holdings.reduce("X", 15.0).await.unwrap().is_none());
    assert!(holdings.get("X").await.is_none());

    // Reducing a closed position is an invariant breach.
    assert!(holdings.reduce("X", 1.0).await.is_err());
}
