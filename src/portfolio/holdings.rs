//! Holdings store.
//!
//! Owns every open position. All mutations go through a single write lock,
//! so add/reduce sequences on the same ticker are serialized; readers take
//! point-in-time snapshots. Quantity stays strictly positive while a holding
//! is open and a reduction to zero closes it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

use crate::error::TickwatchError;

/// A single open position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holding {
    /// Ticker symbol
    pub ticker: String,
    /// Open quantity (> 0 while the holding exists)
    pub quantity: f64,
    /// Quantity-weighted average entry price
    pub avg_price: f64,
    /// When the position was first opened
    pub opened_at: DateTime<Utc>,
    /// Free-form note
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Per-holding stop-loss override (fraction of avg price)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_loss_pct: Option<f64>,
    /// Per-holding take-profit override (fraction of avg price)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take_profit_pct: Option<f64>,
}

/// Unrealized profit and loss at a reference price.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Pnl {
    pub current_price: f64,
    pub cost_basis: f64,
    pub current_value: f64,
    pub amount: f64,
    pub pct: f64,
}

impl Holding {
    /// Total entry cost.
    pub fn cost_basis(&self) -> f64 {
        self.quantity * self.avg_price
    }

    /// Unrealized PnL at `current_price`.
    pub fn pnl(&self, current_price: f64) -> Pnl {
        let cost_basis = self.cost_basis();
        let current_value = self.quantity * current_price;
        let amount = current_value - cost_basis;
        let pct = if cost_basis > 0.0 {
            amount / cost_basis * 100.0
        } else {
            0.0
        };
        Pnl {
            current_price,
            cost_basis,
            current_value,
            amount,
            pct,
        }
    }
}

/// Parameters for an add (open or add-on buy).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddHolding {
    pub ticker: String,
    pub quantity: f64,
    pub price: f64,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub stop_loss_pct: Option<f64>,
    #[serde(default)]
    pub take_profit_pct: Option<f64>,
}

/// Owner of all open positions, keyed by ticker.
#[derive(Debug, Default)]
pub struct HoldingsStore {
    holdings: RwLock<HashMap<String, Holding>>,
}

impl HoldingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a position or merge an add-on buy.
    ///
    /// Merging recomputes the quantity-weighted average price. Overrides and
    /// the note are updated when provided; the open timestamp keeps the
    /// original entry.
    pub async fn add(&self, request: AddHolding) -> Result<Holding, TickwatchError> {
        if request.quantity <= 0.0 {
            return Err(TickwatchError::InvalidQuantity {
                ticker: request.ticker,
                reason: "add quantity must be > 0".to_string(),
            });
        }
        if request.price <= 0.0 {
            return Err(TickwatchError::InvalidQuantity {
                ticker: request.ticker,
                reason: "add price must be > 0".to_string(),
            });
        }

        let mut holdings = self.holdings.write().await;
        let holding = match holdings.get_mut(&request.ticker) {
            Some(existing) => {
                let total_cost = existing.cost_basis() + request.quantity * request.price;
                existing.quantity += request.quantity;
                existing.avg_price = total_cost / existing.quantity;
                if request.note.is_some() {
                    existing.note = request.note;
                }
                if request.stop_loss_pct.is_some() {
                    existing.stop_loss_pct = request.stop_loss_pct;
                }
                if request.take_profit_pct.is_some() {
                    existing.take_profit_pct = request.take_profit_pct;
                }
                existing.clone()
            }
            None => {
                let holding = Holding {
                    ticker: request.ticker.clone(),
                    quantity: request.quantity,
                    avg_price: request.price,
                    opened_at: Utc::now(),
                    note: request.note,
                    stop_loss_pct: request.stop_loss_pct,
                    take_profit_pct: request.take_profit_pct,
                };
                holdings.insert(request.ticker.clone(), holding.clone());
                holding
            }
        };

        info!(
            ticker = %holding.ticker,
            quantity = holding.quantity,
            avg_price = holding.avg_price,
            "Holding added/updated"
        );
        Ok(holding)
    }

    /// Reduce a position by `quantity`; closes it at zero.
    ///
    /// Returns the updated holding, or `None` when the reduction closed the
    /// position. A reduction larger than the open quantity fails with
    /// `InvalidQuantity` and leaves the holding unchanged.
    pub async fn reduce(
        &self,
        ticker: &str,
        quantity: f64,
    ) -> Result<Option<Holding>, TickwatchError> {
        if quantity <= 0.0 {
            return Err(TickwatchError::InvalidQuantity {
                ticker: ticker.to_string(),
                reason: "reduce quantity must be > 0".to_string(),
            });
        }

        let mut holdings = self.holdings.write().await;
        let holding = holdings
            .get_mut(ticker)
            .ok_or_else(|| TickwatchError::InvalidQuantity {
                ticker: ticker.to_string(),
                reason: "no open holding".to_string(),
            })?;

        if quantity > holding.quantity {
            return Err(TickwatchError::InvalidQuantity {
                ticker: ticker.to_string(),
                reason: format!(
                    "reduce quantity {} exceeds open quantity {}",
                    quantity, holding.quantity
                ),
            });
        }

        holding.quantity -= quantity;
        if holding.quantity == 0.0 {
            holdings.remove(ticker);
            info!(ticker = %ticker, "Holding closed");
            return Ok(None);
        }

        info!(ticker = %ticker, remaining = holding.quantity, "Holding reduced");
        Ok(Some(holding.clone()))
    }

    /// Remove a holding outright.
    pub async fn remove(&self, ticker: &str) -> bool {
        let removed = self.holdings.write().await.remove(ticker).is_some();
        if removed {
            info!(ticker = %ticker, "Holding removed");
        }
        removed
    }

    /// Look up a single holding.
    pub async fn get(&self, ticker: &str) -> Option<Holding> {
        self.holdings.read().await.get(ticker).cloned()
    }

    /// Point-in-time copy of every open holding.
    pub async fn snapshot(&self) -> Vec<Holding> {
        self.holdings.read().await.values().cloned().collect()
    }

    /// Number of open positions.
    pub async fn len(&self) -> usize {
        self.holdings.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Total cost basis across open positions.
    pub async fn total_cost_basis(&self) -> f64 {
        self.holdings
            .read()
            .await
            .values()
            .map(|h| h.cost_basis())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(ticker: &str, quantity: f64, price: f64) -> AddHolding {
        AddHolding {
            ticker: ticker.to_string(),
            quantity,
            price,
            note: None,
            stop_loss_pct: None,
            take_profit_pct: None,
        }
    }

    #[tokio::test]
    async fn test_add_creates_holding() {
        let store = HoldingsStore::new();
        let holding = store.add(add("005930.KS", 10.0, 70000.0)).await.unwrap();
        assert_eq!(holding.quantity, 10.0);
        assert_eq!(holding.avg_price, 70000.0);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_add_merges_with_weighted_average() {
        let store = HoldingsStore::new();
        store.add(add("X", 10.0, 100.0)).await.unwrap();
        let merged = store.add(add("X", 10.0, 120.0)).await.unwrap();

        assert_eq!(merged.quantity, 20.0);
        assert!((merged.avg_price - 110.0).abs() < 1e-9);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_reduce_partial_and_close() {
        let store = HoldingsStore::new();
        store.add(add("X", 10.0, 100.0)).await.unwrap();

        let remaining = store.reduce("X", 4.0).await.unwrap().unwrap();
        assert_eq!(remaining.quantity, 6.0);
        // Average price is untouched by reductions
        assert_eq!(remaining.avg_price, 100.0);

        let closed = store.reduce("X", 6.0).await.unwrap();
        assert!(closed.is_none());
        assert!(store.get("X").await.is_none());
    }

    #[tokio::test]
    async fn test_over_reduction_fails_and_leaves_state_unchanged() {
        let store = HoldingsStore::new();
        store.add(add("X", 10.0, 100.0)).await.unwrap();

        let err = store.reduce("X", 11.0).await.unwrap_err();
        assert!(matches!(err, TickwatchError::InvalidQuantity { .. }));

        let holding = store.get("X").await.unwrap();
        assert_eq!(holding.quantity, 10.0);
    }

    #[tokio::test]
    async fn test_reduce_unknown_ticker_fails() {
        let store = HoldingsStore::new();
        assert!(store.reduce("GHOST", 1.0).await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_add_rejected() {
        let store = HoldingsStore::new();
        assert!(store.add(add("X", 0.0, 100.0)).await.is_err());
        assert!(store.add(add("X", -5.0, 100.0)).await.is_err());
        assert!(store.add(add("X", 5.0, 0.0)).await.is_err());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_quantity_invariant_over_sequences() {
        let store = HoldingsStore::new();
        store.add(add("X", 5.0, 100.0)).await.unwrap();
        store.add(add("X", 5.0, 110.0)).await.unwrap();
        let _ = store.reduce("X", 3.0).await.unwrap();
        let _ = store.reduce("X", 3.0).await.unwrap();
        // 10 - 6 = 4 left, invariant holds
        let holding = store.get("X").await.unwrap();
        assert!(holding.quantity > 0.0);
        assert_eq!(holding.quantity, 4.0);

        // Attempting to overshoot the rest fails...
        assert!(store.reduce("X", 5.0).await.is_err());
        // ...and the exact remainder closes cleanly.
        assert!(store.reduce("X", 4.0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_pnl() {
        let store = HoldingsStore::new();
        let holding = store.add(add("X", 10.0, 100.0)).await.unwrap();

        let pnl = holding.pnl(110.0);
        assert!((pnl.amount - 100.0).abs() < 1e-9);
        assert!((pnl.pct - 10.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_snapshot_is_point_in_time() {
        let store = HoldingsStore::new();
        store.add(add("A", 1.0, 10.0)).await.unwrap();
        let snapshot = store.snapshot().await;

        store.add(add("B", 1.0, 10.0)).await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_overrides_updated_on_add() {
        let store = HoldingsStore::new();
        store.add(add("X", 1.0, 10.0)).await.unwrap();

        let mut request = add("X", 1.0, 10.0);
        request.stop_loss_pct = Some(0.08);
        let holding = store.add(request).await.unwrap();
        assert_eq!(holding.stop_loss_pct, Some(0.08));
        // Unset fields keep their previous value
        assert!(holding.take_profit_pct.is_none());
    }
}
