//! Risk gate.
//!
//! A pure veto over proposed actions. The gate never mutates anything and a
//! deny is ordinary control flow, not an error; the closed
//! [`DenyReason`] set gives downstream logging something machine-readable.

use serde::{Deserialize, Serialize};

use crate::config::RiskConfig;

/// An action proposed to the gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ProposedAction {
    Buy {
        ticker: String,
        quantity: f64,
        price: f64,
    },
    Sell {
        ticker: String,
        quantity: f64,
        price: f64,
    },
}

impl ProposedAction {
    /// Notional value of the action.
    pub fn order_value(&self) -> f64 {
        match self {
            Self::Buy { quantity, price, .. } | Self::Sell { quantity, price, .. } => {
                quantity * price
            }
        }
    }

    /// Ticker the action targets.
    pub fn ticker(&self) -> &str {
        match self {
            Self::Buy { ticker, .. } | Self::Sell { ticker, .. } => ticker,
        }
    }
}

/// Portfolio-level facts the gate judges against.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PortfolioState {
    /// Total portfolio value
    pub portfolio_value: f64,
    /// Number of currently open positions
    pub open_positions: usize,
    /// Whether the target ticker already has an open position
    pub holds_ticker: bool,
    /// Current value of the target ticker's position (0 when none)
    pub position_value: f64,
    /// Cumulative realized + unrealized PnL for the day
    pub daily_pnl: f64,
}

/// Machine-readable deny reasons. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// Opening one more position would exceed the position-count ceiling
    PositionCeiling,
    /// The position would exceed its per-position exposure ceiling
    ExposureCeiling,
    /// The cumulative daily loss floor has been breached
    DailyLossFloor,
}

/// Gate verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum RiskDecision {
    Allow,
    Deny { reason: DenyReason, detail: String },
}

impl RiskDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Pure portfolio-limit checker.
#[derive(Debug, Clone)]
pub struct RiskGate {
    limits: RiskConfig,
}

impl RiskGate {
    pub fn new(limits: RiskConfig) -> Self {
        Self { limits }
    }

    /// Judge a proposed action against the current portfolio state.
    ///
    /// Checks run in a fixed order (position count, exposure, daily loss)
    /// and the first violation wins.
    pub fn check(&self, action: &ProposedAction, state: &PortfolioState) -> RiskDecision {
        if let ProposedAction::Buy { .. } = action {
            if !state.holds_ticker && state.open_positions >= self.limits.max_positions {
                return RiskDecision::Deny {
                    reason: DenyReason::PositionCeiling,
                    detail: format!(
                        "{} positions open, ceiling is {}",
                        state.open_positions, self.limits.max_positions
                    ),
                };
            }

            if state.portfolio_value > 0.0 {
                let position_after = state.position_value + action.order_value();
                let position_pct = position_after / state.portfolio_value * 100.0;
                if position_pct > self.limits.max_position_pct {
                    return RiskDecision::Deny {
                        reason: DenyReason::ExposureCeiling,
                        detail: format!(
                            "{} would be {:.1}% of portfolio, ceiling is {:.1}%",
                            action.ticker(),
                            position_pct,
                            self.limits.max_position_pct
                        ),
                    };
                }
            }
        }

        if state.daily_pnl < 0.0 && state.portfolio_value > 0.0 {
            let loss_pct = -state.daily_pnl / state.portfolio_value * 100.0;
            if loss_pct >= self.limits.max_daily_loss_pct {
                return RiskDecision::Deny {
                    reason: DenyReason::DailyLossFloor,
                    detail: format!(
                        "daily loss {:.1}% breaches the {:.1}% floor",
                        loss_pct, self.limits.max_daily_loss_pct
                    ),
                };
            }
        }

        RiskDecision::Allow
    }
}
