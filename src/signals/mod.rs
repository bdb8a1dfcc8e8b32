//! Signal evaluation for phase evidence.
//!
//! Each phase's evidence is reduced to a classified signal:
//!
//! - discovery → `FIT_CONFIRMED` / `FIT_UNCONFIRMED`
//! - desirability → `NO_INTEREST` / `MILD_INTEREST` / `STRONG_COMMITMENT`
//! - feasibility → `GREEN` / `ORANGE_CONSTRAINED` / `RED_IMPOSSIBLE`
//! - viability → `PROFITABLE` / `MARGINAL` / `UNDERWATER`
//!
//! Routing consumes only the signal; the measures travel with it into the
//! approval context for reviewers.

mod evaluator;
mod types;

pub use evaluator::{SignalEvaluator, ltv_cac_ratio, problem_resonance, zombie_ratio};
pub use types::{
    Assessment, DesirabilitySignal, FeasibilitySignal, FitSignal, Signal, ViabilitySignal,
};
