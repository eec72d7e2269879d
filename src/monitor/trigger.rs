//! ARMED/FIRED trigger state machine.
//!
//! One state per (ticker, condition) pair. The machine emits an event only
//! on the ARMED -> FIRED edge; a FIRED pair stays silent while its condition
//! keeps matching and silently re-arms the first time it stops. This binary
//! hysteresis is what keeps a stop-loss that hovers around its level from
//! alerting every tick.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// State of a single (ticker, condition) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArmState {
    /// Ready to fire on the next match
    Armed,
    /// Fired; waiting for the condition to clear before re-arming
    Fired,
}

/// A one-shot alert for an ARMED -> FIRED transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEvent {
    /// Event id
    pub id: String,
    /// Holding the trigger fired for
    pub ticker: String,
    /// Condition that fired
    pub condition_name: String,
    /// When the transition happened
    pub fired_at: DateTime<Utc>,
    /// Price at the evaluation snapshot
    pub snapshot_price: f64,
}

/// Keyed trigger states for every monitored (ticker, condition) pair.
///
/// Not internally synchronized: the monitor's single-writer tick loop is
/// what linearizes transitions.
#[derive(Debug, Default)]
pub struct TriggerStates {
    states: HashMap<(String, String), ArmState>,
}

impl TriggerStates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state for a pair; unseen pairs are armed.
    pub fn state(&self, ticker: &str, condition_name: &str) -> ArmState {
        self.states
            .get(&(ticker.to_string(), condition_name.to_string()))
            .copied()
            .unwrap_or(ArmState::Armed)
    }

    /// Apply one observation of a pair's `matched` value.
    ///
    /// Returns an event exactly when the pair transitions ARMED -> FIRED.
    /// Replaying an identical observation is a no-op, so an unchanged tick
    /// can never double-fire.
    pub fn observe(
        &mut self,
        ticker: &str,
        condition_name: &str,
        matched: bool,
        snapshot_price: f64,
    ) -> Option<TriggerEvent> {
        let key = (ticker.to_string(), condition_name.to_string());
        let state = self.states.entry(key).or_insert(ArmState::Armed);

        match (*state, matched) {
            (ArmState::Armed, true) => {
                *state = ArmState::Fired;
                Some(TriggerEvent {
                    id: Uuid::new_v4().to_string(),
                    ticker: ticker.to_string(),
                    condition_name: condition_name.to_string(),
                    fired_at: Utc::now(),
                    snapshot_price,
                })
            }
            (ArmState::Fired, false) => {
                // Silent re-arm
                *state = ArmState::Armed;
                None
            }
            _ => None,
        }
    }

    /// Drop states for tickers that are no longer held.
    pub fn retain_tickers<F>(&mut self, is_live: F)
    where
        F: Fn(&str) -> bool,
    {
        self.states.retain(|(ticker, _), _| is_live(ticker));
    }

    /// Number of tracked pairs.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether no pair is tracked.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Snapshot of every tracked pair, for status reporting.
    pub fn snapshot(&self) -> Vec<(String, String, ArmState)> {
        self.states
            .iter()
            .map(|((ticker, condition), state)| (ticker.clone(), condition.clone(), *state))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_armed() {
        let states = TriggerStates::new();
        assert_eq!(states.state("X", "stop_loss"), ArmState::Armed);
    }

    #[test]
    fn test_fires_once_on_match() {
        let mut states = TriggerStates::new();

        let event = states.observe("X", "stop_loss", true, 95.0);
        assert!(event.is_some());
        assert_eq!(states.state("X", "stop_loss"), ArmState::Fired);

        let event = event.unwrap();
        assert_eq!(event.ticker, "X");
        assert_eq!(event.condition_name, "stop_loss");
        assert!((event.snapshot_price - 95.0).abs() < 1e-9);
    }

    #[test]
    fn test_hysteresis_exact_event_count() {
        let mut states = TriggerStates::new();
        let mut events = 0;

        // Matches on ticks 1,2,3, clears on 4, matches again on 5:
        // exactly two events (ticks 1 and 5), never three.
        for matched in [true, true, true, false, true] {
            if states.observe("X", "stop_loss", matched, 100.0).is_some() {
                events += 1;
            }
        }
        assert_eq!(events, 2);
    }

    #[test]
    fn test_replayed_tick_does_not_double_fire() {
        let mut states = TriggerStates::new();
        assert!(states.observe("X", "c", true, 100.0).is_some());
        assert!(states.observe("X", "c", true, 100.0).is_none());
        assert!(states.observe("X", "c", true, 100.0).is_none());
    }

    #[test]
    fn test_rearm_is_silent() {
        let mut states = TriggerStates::new();
        states.observe("X", "c", true, 100.0);
        assert!(states.observe("X", "c", false, 100.0).is_none());
        assert_eq!(states.state("X", "c"), ArmState::Armed);
    }

    #[test]
    fn test_pairs_are_independent() {
        let mut states = TriggerStates::new();
        assert!(states.observe("X", "stop_loss", true, 1.0).is_some());
        // Same ticker, different condition: its own state
        assert!(states.observe("X", "take_profit", true, 1.0).is_some());
        // Different ticker, same condition
        assert!(states.observe("Y", "stop_loss", true, 1.0).is_some());
        assert_eq!(states.len(), 3);
    }

    #[test]
    fn test_retain_drops_closed_holdings() {
        let mut states = TriggerStates::new();
        states.observe("X", "c", true, 1.0);
        states.observe("Y", "c", true, 1.0);

        states.retain_tickers(|ticker| ticker == "X");
        assert_eq!(states.len(), 1);
        // Y starts fresh (armed) if it comes back
        assert_eq!(states.state("Y", "c"), ArmState::Armed);
    }
}
