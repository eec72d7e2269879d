//! AND/OR/NOT combinators.
//!
//! Composites evaluate every child, never short-circuiting, so diagnostics
//! for all legs survive into the result tree. Lookback is the maximum over
//! children, so a composite that fits its own lookback guarantees every
//! child fits too.

use serde_json::json;

use super::{into_map, Condition, ConditionResult};
use crate::data::Bar;
use crate::error::TickwatchError;

fn joined_names(children: &[Box<dyn Condition>]) -> String {
    children
        .iter()
        .map(|c| c.name())
        .collect::<Vec<_>>()
        .join(", ")
}

fn max_lookback(children: &[Box<dyn Condition>]) -> usize {
    children
        .iter()
        .map(|c| c.required_lookback())
        .max()
        .unwrap_or(1)
        .max(1)
}

/// Matches when every child matches.
pub struct AndCondition {
    children: Vec<Box<dyn Condition>>,
}

impl AndCondition {
    pub fn new(children: Vec<Box<dyn Condition>>) -> Self {
        Self { children }
    }
}

impl Condition for AndCondition {
    fn name(&self) -> String {
        format!("AND({})", joined_names(&self.children))
    }

    fn required_lookback(&self) -> usize {
        max_lookback(&self.children)
    }

    fn evaluate(&self, ticker: &str, bars: &[Bar]) -> Result<ConditionResult, TickwatchError> {
        let mut results = Vec::with_capacity(self.children.len());
        let mut all_matched = true;

        for child in &self.children {
            let result = child.evaluate(ticker, bars)?;
            if !result.matched {
                all_matched = false;
            }
            results.push(result);
        }

        let matched_count = results.iter().filter(|r| r.matched).count();
        Ok(ConditionResult {
            matched: all_matched,
            condition_name: self.name(),
            details: into_map(json!({
                "matched_count": matched_count,
                "total_count": results.len(),
            })),
            children: results,
        })
    }
}

/// Matches when at least one child matches.
pub struct OrCondition {
    children: Vec<Box<dyn Condition>>,
}

impl OrCondition {
    pub fn new(children: Vec<Box<dyn Condition>>) -> Self {
        Self { children }
    }
}

impl Condition for OrCondition {
    fn name(&self) -> String {
        format!("OR({})", joined_names(&self.children))
    }

    fn required_lookback(&self) -> usize {
        max_lookback(&self.children)
    }

    fn evaluate(&self, ticker: &str, bars: &[Bar]) -> Result<ConditionResult, TickwatchError> {
        let mut results = Vec::with_capacity(self.children.len());
        let mut any_matched = false;

        for child in &self.children {
            let result = child.evaluate(ticker, bars)?;
            if result.matched {
                any_matched = true;
            }
            results.push(result);
        }

        let matched_count = results.iter().filter(|r| r.matched).count();
        Ok(ConditionResult {
            matched: any_matched,
            condition_name: self.name(),
            details: into_map(json!({
                "matched_count": matched_count,
                "total_count": results.len(),
            })),
            children: results,
        })
    }
}

/// Inverts its single child.
///
/// Arity is enforced by construction here; the spec layer rejects
/// multi-child NOT specs with a configuration error before anything is
/// built.
pub struct NotCondition {
    child: Box<dyn Condition>,
}

impl NotCondition {
    pub fn new(child: Box<dyn Condition>) -> Self {
        Self { child }
    }
}

impl Condition for NotCondition {
    fn name(&self) -> String {
        format!("NOT({})", self.child.name())
    }

    fn required_lookback(&self) -> usize {
        self.child.required_lookback()
    }

    fn evaluate(&self, ticker: &str, bars: &[Bar]) -> Result<ConditionResult, TickwatchError> {
        let inner = self.child.evaluate(ticker, bars)?;
        let matched = !inner.matched;

        Ok(ConditionResult {
            matched,
            condition_name: self.name(),
            details: into_map(json!({
                "inner_matched": inner.matched,
            })),
            children: vec![inner],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::price::{MaxPriceCondition, MinPriceCondition};
    use crate::conditions::testutil::bars_from_closes;

    fn min(price: f64) -> Box<dyn Condition> {
        Box::new(MinPriceCondition::new(price))
    }

    fn max(price: f64) -> Box<dyn Condition> {
        Box::new(MaxPriceCondition::new(price))
    }

    #[test]
    fn test_and_matches_boolean_conjunction() {
        let bars = bars_from_closes(&[100.0]);

        for (a, b) in [(50.0, 80.0), (50.0, 120.0), (120.0, 80.0), (120.0, 150.0)] {
            let lhs = MinPriceCondition::new(a).evaluate("X", &bars).unwrap().matched;
            let rhs = MinPriceCondition::new(b).evaluate("X", &bars).unwrap().matched;
            let and = AndCondition::new(vec![min(a), min(b)])
                .evaluate("X", &bars)
                .unwrap();
            assert_eq!(and.matched, lhs && rhs);
        }
    }

    #[test]
    fn test_or_matches_boolean_disjunction() {
        let bars = bars_from_closes(&[100.0]);

        for (a, b) in [(50.0, 80.0), (50.0, 120.0), (120.0, 80.0), (120.0, 150.0)] {
            let lhs = MinPriceCondition::new(a).evaluate("X", &bars).unwrap().matched;
            let rhs = MinPriceCondition::new(b).evaluate("X", &bars).unwrap().matched;
            let or = OrCondition::new(vec![min(a), min(b)])
                .evaluate("X", &bars)
                .unwrap();
            assert_eq!(or.matched, lhs || rhs);
        }
    }

    #[test]
    fn test_not_inverts_child() {
        let bars = bars_from_closes(&[100.0]);

        let not = NotCondition::new(min(120.0)).evaluate("X", &bars).unwrap();
        assert!(not.matched);
        assert_eq!(not.children.len(), 1);
        assert!(!not.children[0].matched);

        let not = NotCondition::new(min(50.0)).evaluate("X", &bars).unwrap();
        assert!(!not.matched);
    }

    #[test]
    fn test_all_children_evaluated_without_short_circuit() {
        let bars = bars_from_closes(&[100.0]);

        // First child fails; diagnostics for the second must still exist.
        let and = AndCondition::new(vec![min(200.0), max(150.0)])
            .evaluate("X", &bars)
            .unwrap();
        assert!(!and.matched);
        assert_eq!(and.children.len(), 2);
        assert!(and.children[1].matched);
        assert_eq!(and.details["matched_count"], 1);
        assert_eq!(and.details["total_count"], 2);

        // First child of OR matches; the second is still evaluated.
        let or = OrCondition::new(vec![min(50.0), max(80.0)])
            .evaluate("X", &bars)
            .unwrap();
        assert!(or.matched);
        assert_eq!(or.children.len(), 2);
        assert!(!or.children[1].matched);
    }

    #[test]
    fn test_lookback_is_max_over_children() {
        use crate::conditions::ma::MaTouchCondition;
        use crate::conditions::rsi::RsiOversoldCondition;

        let and = AndCondition::new(vec![
            Box::new(MinPriceCondition::new(5000.0)),
            Box::new(MaTouchCondition::new(160, 0.02)),
            Box::new(RsiOversoldCondition::new(30.0, 14)),
        ]);
        assert_eq!(and.required_lookback(), 160);

        let not = NotCondition::new(Box::new(MaTouchCondition::new(120, 0.02)));
        assert_eq!(not.required_lookback(), 120);
    }

    #[test]
    fn test_child_error_propagates() {
        let bars = bars_from_closes(&vec![100.0; 10]);
        let and = AndCondition::new(vec![
            min(50.0),
            Box::new(crate::conditions::ma::MaTouchCondition::new(160, 0.02)),
        ]);
        assert!(and.evaluate("X", &bars).is_err());
    }

    #[test]
    fn test_composite_names() {
        let and = AndCondition::new(vec![min(5000.0), max(10000.0)]);
        assert_eq!(and.name(), "AND(min_price_5000, max_price_10000)");

        let not = NotCondition::new(min(5000.0));
        assert_eq!(not.name(), "NOT(min_price_5000)");
    }
}
