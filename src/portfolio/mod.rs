//! Portfolio state: open holdings and risk limits.

mod holdings;
mod risk;

pub use holdings::{AddHolding, Holding, HoldingsStore, Pnl};
pub use risk::{DenyReason, PortfolioState, ProposedAction, RiskDecision, RiskGate};
