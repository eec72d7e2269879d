//! Screening condition framework.
//!
//! A [`Condition`] is a pure predicate over a ticker's bar history. Leaves
//! compare prices, volumes, and indicators; [`composite`] combinators build
//! AND/OR/NOT trees with the same interface. Conditions are built from
//! validated [`spec::ConditionSpec`] values, never constructed reflectively
//! at evaluation time.

pub mod bollinger;
pub mod composite;
pub mod ma;
pub mod presets;
pub mod price;
pub mod rsi;
pub mod spec;
pub mod volume;

pub use composite::{AndCondition, NotCondition, OrCondition};
pub use presets::PresetRegistry;
pub use spec::ConditionSpec;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::data::Bar;
use crate::error::TickwatchError;

/// Result of evaluating a condition against one ticker.
///
/// Always produced, matched or not; `details` carries the diagnostic values
/// the evaluation was based on. Composite results keep their sub-results in
/// `children`, in evaluation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionResult {
    /// Whether the condition matched
    pub matched: bool,
    /// Name of the condition that produced this result
    pub condition_name: String,
    /// Diagnostic values (current price, indicator values, thresholds, ...)
    #[serde(default)]
    pub details: Map<String, Value>,
    /// Sub-results for composite conditions, in child order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ConditionResult>,
}

impl ConditionResult {
    /// Build a leaf result.
    pub fn leaf(matched: bool, condition_name: impl Into<String>, details: Value) -> Self {
        Self {
            matched,
            condition_name: condition_name.into(),
            details: into_map(details),
            children: Vec::new(),
        }
    }

    /// Flatten this result tree into a depth-first ordered list (self first).
    pub fn flatten_depth_first(&self) -> Vec<ConditionResult> {
        let mut out = Vec::new();
        self.collect_into(&mut out);
        out
    }

    fn collect_into(&self, out: &mut Vec<ConditionResult>) {
        let mut node = self.clone();
        let children = std::mem::take(&mut node.children);
        out.push(node);
        for child in &children {
            child.collect_into(out);
        }
    }
}

/// Convert a `json!({..})` literal into a details map.
pub(crate) fn into_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// A predicate over a ticker's price history.
///
/// Implementations are immutable and stateless across calls; evaluation
/// never mutates its input. When fewer bars than [`required_lookback`]
/// are available the evaluation fails with
/// [`TickwatchError::DataInsufficient`] rather than silently computing on a
/// short window. "Not matched" is a normal result, not an error.
///
/// [`required_lookback`]: Condition::required_lookback
pub trait Condition: Send + Sync {
    /// Condition name used in results and trigger state keys.
    fn name(&self) -> String;

    /// Minimum number of bars needed for a meaningful evaluation (>= 1).
    fn required_lookback(&self) -> usize;

    /// Evaluate against an ascending-time ordered bar series.
    fn evaluate(&self, ticker: &str, bars: &[Bar]) -> Result<ConditionResult, TickwatchError>;
}

/// Fail with `DataInsufficient` when the series is shorter than `required`.
pub(crate) fn ensure_lookback(
    ticker: &str,
    bars: &[Bar],
    required: usize,
) -> Result<(), TickwatchError> {
    if bars.len() < required {
        return Err(TickwatchError::DataInsufficient {
            ticker: ticker.to_string(),
            bars: bars.len(),
            required,
        });
    }
    Ok(())
}
