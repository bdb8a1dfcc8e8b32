//! Signal types produced by evaluating phase evidence.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::phase::Phase;

/// Problem/solution fit from market discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FitSignal {
    FitConfirmed,
    FitUnconfirmed,
}

/// Demand measured by the desirability experiments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DesirabilitySignal {
    NoInterest,
    MildInterest,
    StrongCommitment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeasibilitySignal {
    Green,
    OrangeConstrained,
    RedImpossible,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViabilitySignal {
    Profitable,
    Marginal,
    Underwater,
}

/// A classified outcome for one phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", content = "signal", rename_all = "snake_case")]
pub enum Signal {
    Discovery(FitSignal),
    Desirability(DesirabilitySignal),
    Feasibility(FeasibilitySignal),
    Viability(ViabilitySignal),
}

impl Signal {
    pub fn phase(&self) -> Phase {
        match self {
            Signal::Discovery(_) => Phase::Discovery,
            Signal::Desirability(_) => Phase::Desirability,
            Signal::Feasibility(_) => Phase::Feasibility,
            Signal::Viability(_) => Phase::Viability,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Signal::Discovery(FitSignal::FitConfirmed) => "FIT_CONFIRMED",
            Signal::Discovery(FitSignal::FitUnconfirmed) => "FIT_UNCONFIRMED",
            Signal::Desirability(DesirabilitySignal::NoInterest) => "NO_INTEREST",
            Signal::Desirability(DesirabilitySignal::MildInterest) => "MILD_INTEREST",
            Signal::Desirability(DesirabilitySignal::StrongCommitment) => "STRONG_COMMITMENT",
            Signal::Feasibility(FeasibilitySignal::Green) => "GREEN",
            Signal::Feasibility(FeasibilitySignal::OrangeConstrained) => "ORANGE_CONSTRAINED",
            Signal::Feasibility(FeasibilitySignal::RedImpossible) => "RED_IMPOSSIBLE",
            Signal::Viability(ViabilitySignal::Profitable) => "PROFITABLE",
            Signal::Viability(ViabilitySignal::Marginal) => "MARGINAL",
            Signal::Viability(ViabilitySignal::Underwater) => "UNDERWATER",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.phase(), self.label())
    }
}

/// Signal plus the computed measures that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub signal: Signal,
    /// Named ratios, e.g. `problem_resonance`.
    pub measures: BTreeMap<String, f64>,
    /// One-line explanation for reviewers.
    pub rationale: String,
}

impl Assessment {
    pub fn new(signal: Signal, rationale: impl Into<String>) -> Self {
        Self {
            signal,
            measures: BTreeMap::new(),
            rationale: rationale.into(),
        }
    }

    pub fn with_measure(mut self, name: &str, value: f64) -> Self {
        self.measures.insert(name.to_string(), value);
        self
    }

    pub fn measure(&self, name: &str) -> Option<f64> {
        self.measures.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_display_includes_phase_and_label() {
        let signal = Signal::Desirability(DesirabilitySignal::MildInterest);
        assert_eq!(signal.to_string(), "desirability:MILD_INTEREST");
        assert_eq!(signal.phase(), Phase::Desirability);
    }

    #[test]
    fn test_signal_serializes_adjacently_tagged() {
        let signal = Signal::Viability(ViabilitySignal::Underwater);
        let json = serde_json::to_value(signal).unwrap();
        assert_eq!(json["phase"], "viability");
        assert_eq!(json["signal"], "UNDERWATER");
        let back: Signal = serde_json::from_value(json).unwrap();
        assert_eq!(back, signal);
    }

    #[test]
    fn test_assessment_measures() {
        let a = Assessment::new(Signal::Feasibility(FeasibilitySignal::Green), "ok")
            .with_measure("constrained_components", 0.0);
        assert_eq!(a.measure("constrained_components"), Some(0.0));
        assert_eq!(a.measure("missing"), None);
    }
}
