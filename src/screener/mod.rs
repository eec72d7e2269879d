//! Screening orchestration.
//!
//! [`ScreenerEngine`] evaluates one (possibly composite) condition across a
//! ticker universe with a bounded worker pool, collecting one
//! [`ScreeningResult`] per evaluable ticker and a recorded exclusion for
//! every ticker that could not be evaluated.

mod engine;

pub use engine::{
    CancelHandle, Exclusion, ExclusionReason, RunSummary, ScreenError, ScreenRun, ScreenerEngine,
    ScreeningResult,
};
