//! Static routing and checkpoint tables.
//!
//! `ROUTES` maps every signal to exactly one rule. `CHECKPOINTS` is the only
//! place a checkpoint name is tied to a phase and to the effect of each
//! decision a reviewer can make there.

use crate::models::{DecisionOption, PivotType};
use crate::phase::Phase;
use crate::signals::{
    DesirabilitySignal, FeasibilitySignal, FitSignal, Signal, ViabilitySignal,
};

/// What a routing rule does before any human input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleRoute {
    Advance(Phase),
    Complete,
    Pivot(PivotType, Phase),
    Kill,
}

#[derive(Debug)]
pub struct RouteRule {
    pub signal: Signal,
    pub route: RuleRoute,
    pub checkpoint: Option<&'static str>,
    pub recommended: Option<&'static str>,
    pub reason: &'static str,
}

/// What choosing an option at a checkpoint does to the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionEffect {
    Advance(Phase),
    Complete,
    Pivot(PivotType, Phase),
    /// Re-run the checkpoint's own phase.
    Iterate,
    Kill,
}

#[derive(Debug)]
pub struct OptionSpec {
    pub value: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    pub effect: DecisionEffect,
}

#[derive(Debug)]
pub struct CheckpointSpec {
    pub name: &'static str,
    pub phase: Phase,
    pub options: &'static [OptionSpec],
}

impl CheckpointSpec {
    pub fn option(&self, value: &str) -> Option<&'static OptionSpec> {
        self.options.iter().find(|o| o.value == value)
    }

    /// Pivot gates decide a loopback and can never be skipped.
    pub fn is_pivot_gate(&self) -> bool {
        self.options
            .iter()
            .any(|o| matches!(o.effect, DecisionEffect::Pivot(..)))
    }

    pub fn decision_options(&self) -> Vec<DecisionOption> {
        self.options
            .iter()
            .map(|o| DecisionOption {
                value: o.value.to_string(),
                label: o.label.to_string(),
                description: o.description.to_string(),
            })
            .collect()
    }
}

pub const APPROVE_DISCOVERY_OUTPUT: &str = "approve_discovery_output";
pub const APPROVE_SEGMENT_PIVOT: &str = "approve_segment_pivot";
pub const APPROVE_VALUE_PIVOT: &str = "approve_value_pivot";
pub const APPROVE_DESIRABILITY_GATE: &str = "approve_desirability_gate";
pub const APPROVE_FEASIBILITY_GATE: &str = "approve_feasibility_gate";
pub const APPROVE_FEATURE_PIVOT: &str = "approve_feature_pivot";
pub const APPROVE_VIABILITY_GATE: &str = "approve_viability_gate";
pub const APPROVE_VIABILITY_PIVOT: &str = "approve_viability_pivot";

pub static ROUTES: [RouteRule; 11] = [
    RouteRule {
        signal: Signal::Discovery(FitSignal::FitConfirmed),
        route: RuleRoute::Advance(Phase::Desirability),
        checkpoint: Some(APPROVE_DISCOVERY_OUTPUT),
        recommended: Some("approved"),
        reason: "problem/solution fit confirmed",
    },
    RouteRule {
        signal: Signal::Discovery(FitSignal::FitUnconfirmed),
        route: RuleRoute::Advance(Phase::Desirability),
        checkpoint: Some(APPROVE_DISCOVERY_OUTPUT),
        recommended: Some("iterate"),
        reason: "problem/solution fit not yet confirmed",
    },
    RouteRule {
        signal: Signal::Desirability(DesirabilitySignal::NoInterest),
        route: RuleRoute::Pivot(PivotType::Segment, Phase::Discovery),
        checkpoint: Some(APPROVE_SEGMENT_PIVOT),
        recommended: Some("segment_1"),
        reason: "resonance below threshold",
    },
    RouteRule {
        signal: Signal::Desirability(DesirabilitySignal::MildInterest),
        route: RuleRoute::Pivot(PivotType::Value, Phase::Discovery),
        checkpoint: Some(APPROVE_VALUE_PIVOT),
        recommended: Some("approved"),
        reason: "interest without commitment (high zombie ratio)",
    },
    RouteRule {
        signal: Signal::Desirability(DesirabilitySignal::StrongCommitment),
        route: RuleRoute::Advance(Phase::Feasibility),
        checkpoint: Some(APPROVE_DESIRABILITY_GATE),
        recommended: Some("approved"),
        reason: "strong commitment from the target segment",
    },
    RouteRule {
        signal: Signal::Feasibility(FeasibilitySignal::Green),
        route: RuleRoute::Advance(Phase::Viability),
        checkpoint: Some(APPROVE_FEASIBILITY_GATE),
        recommended: Some("approved"),
        reason: "all core features buildable",
    },
    RouteRule {
        signal: Signal::Feasibility(FeasibilitySignal::OrangeConstrained),
        route: RuleRoute::Pivot(PivotType::Feature, Phase::Desirability),
        checkpoint: Some(APPROVE_FEATURE_PIVOT),
        recommended: Some("approved"),
        reason: "core features constrained; retest demand with reduced scope",
    },
    RouteRule {
        signal: Signal::Feasibility(FeasibilitySignal::RedImpossible),
        route: RuleRoute::Kill,
        checkpoint: None,
        recommended: None,
        reason: "core features technically impossible",
    },
    RouteRule {
        signal: Signal::Viability(ViabilitySignal::Profitable),
        route: RuleRoute::Complete,
        checkpoint: Some(APPROVE_VIABILITY_GATE),
        recommended: Some("approved"),
        reason: "unit economics profitable",
    },
    RouteRule {
        signal: Signal::Viability(ViabilitySignal::Marginal),
        route: RuleRoute::Pivot(PivotType::Price, Phase::Desirability),
        checkpoint: Some(APPROVE_VIABILITY_PIVOT),
        recommended: Some("price_pivot"),
        reason: "unit economics marginal",
    },
    RouteRule {
        signal: Signal::Viability(ViabilitySignal::Underwater),
        route: RuleRoute::Pivot(PivotType::Cost, Phase::Feasibility),
        checkpoint: Some(APPROVE_VIABILITY_PIVOT),
        recommended: Some("cost_pivot"),
        reason: "customer acquisition costs exceed lifetime value",
    },
];

const KILL: OptionSpec = OptionSpec {
    value: "kill",
    label: "Kill",
    description: "Stop the validation run",
    effect: DecisionEffect::Kill,
};

pub static CHECKPOINTS: [CheckpointSpec; 8] = [
    CheckpointSpec {
        name: APPROVE_DISCOVERY_OUTPUT,
        phase: Phase::Discovery,
        options: &[
            OptionSpec {
                value: "approved",
                label: "Approve",
                description: "Accept the segments and value proposition, start experiments",
                effect: DecisionEffect::Advance(Phase::Desirability),
            },
            OptionSpec {
                value: "iterate",
                label: "Iterate",
                description: "Re-run discovery before testing demand",
                effect: DecisionEffect::Iterate,
            },
            OptionSpec {
                value: "reject",
                label: "Reject",
                description: "Stop the validation run",
                effect: DecisionEffect::Kill,
            },
        ],
    },
    CheckpointSpec {
        name: APPROVE_SEGMENT_PIVOT,
        phase: Phase::Desirability,
        options: &[
            OptionSpec {
                value: "segment_1",
                label: "Pivot to segment 1",
                description: "Restart discovery targeting the first alternative segment",
                effect: DecisionEffect::Pivot(PivotType::Segment, Phase::Discovery),
            },
            OptionSpec {
                value: "segment_2",
                label: "Pivot to segment 2",
                description: "Restart discovery targeting the second alternative segment",
                effect: DecisionEffect::Pivot(PivotType::Segment, Phase::Discovery),
            },
            OptionSpec {
                value: "segment_3",
                label: "Pivot to segment 3",
                description: "Restart discovery targeting the third alternative segment",
                effect: DecisionEffect::Pivot(PivotType::Segment, Phase::Discovery),
            },
            OptionSpec {
                value: "override_proceed",
                label: "Proceed anyway",
                description: "Ignore the signal and assess feasibility",
                effect: DecisionEffect::Advance(Phase::Feasibility),
            },
            KILL,
        ],
    },
    CheckpointSpec {
        name: APPROVE_VALUE_PIVOT,
        phase: Phase::Desirability,
        options: &[
            OptionSpec {
                value: "approved",
                label: "Approve value pivot",
                description: "Keep the segment, rework the value proposition",
                effect: DecisionEffect::Pivot(PivotType::Value, Phase::Discovery),
            },
            OptionSpec {
                value: "override_proceed",
                label: "Proceed anyway",
                description: "Ignore the signal and assess feasibility",
                effect: DecisionEffect::Advance(Phase::Feasibility),
            },
            KILL,
        ],
    },
    CheckpointSpec {
        name: APPROVE_DESIRABILITY_GATE,
        phase: Phase::Desirability,
        options: &[
            OptionSpec {
                value: "approved",
                label: "Approve",
                description: "Demand is proven, assess feasibility",
                effect: DecisionEffect::Advance(Phase::Feasibility),
            },
            OptionSpec {
                value: "iterate",
                label: "Iterate",
                description: "Run another round of experiments",
                effect: DecisionEffect::Iterate,
            },
            OptionSpec {
                value: "reject",
                label: "Reject",
                description: "Stop the validation run",
                effect: DecisionEffect::Kill,
            },
        ],
    },
    CheckpointSpec {
        name: APPROVE_FEASIBILITY_GATE,
        phase: Phase::Feasibility,
        options: &[
            OptionSpec {
                value: "approved",
                label: "Approve",
                description: "The product can be built, assess unit economics",
                effect: DecisionEffect::Advance(Phase::Viability),
            },
            OptionSpec {
                value: "iterate",
                label: "Iterate",
                description: "Re-run the feasibility assessment",
                effect: DecisionEffect::Iterate,
            },
            OptionSpec {
                value: "reject",
                label: "Reject",
                description: "Stop the validation run",
                effect: DecisionEffect::Kill,
            },
        ],
    },
    CheckpointSpec {
        name: APPROVE_FEATURE_PIVOT,
        phase: Phase::Feasibility,
        options: &[
            OptionSpec {
                value: "approved",
                label: "Approve feature pivot",
                description: "Downgrade scope and retest demand",
                effect: DecisionEffect::Pivot(PivotType::Feature, Phase::Desirability),
            },
            OptionSpec {
                value: "override_proceed",
                label: "Proceed anyway",
                description: "Accept the constraints and assess unit economics",
                effect: DecisionEffect::Advance(Phase::Viability),
            },
            KILL,
        ],
    },
    CheckpointSpec {
        name: APPROVE_VIABILITY_GATE,
        phase: Phase::Viability,
        options: &[
            OptionSpec {
                value: "approved",
                label: "Approve",
                description: "Validation complete",
                effect: DecisionEffect::Complete,
            },
            OptionSpec {
                value: "iterate",
                label: "Iterate",
                description: "Re-run the unit economics assessment",
                effect: DecisionEffect::Iterate,
            },
            OptionSpec {
                value: "reject",
                label: "Reject",
                description: "Stop the validation run",
                effect: DecisionEffect::Kill,
            },
        ],
    },
    CheckpointSpec {
        name: APPROVE_VIABILITY_PIVOT,
        phase: Phase::Viability,
        options: &[
            OptionSpec {
                value: "price_pivot",
                label: "Price pivot",
                description: "Retest demand at a different price point",
                effect: DecisionEffect::Pivot(PivotType::Price, Phase::Desirability),
            },
            OptionSpec {
                value: "cost_pivot",
                label: "Cost pivot",
                description: "Rework the build to lower costs",
                effect: DecisionEffect::Pivot(PivotType::Cost, Phase::Feasibility),
            },
            OptionSpec {
                value: "override_proceed",
                label: "Proceed anyway",
                description: "Accept the economics and complete the run",
                effect: DecisionEffect::Complete,
            },
            KILL,
        ],
    },
];

pub fn rule_for(signal: Signal) -> Option<&'static RouteRule> {
    ROUTES.iter().find(|r| r.signal == signal)
}

pub fn checkpoint(name: &str) -> Option<&'static CheckpointSpec> {
    CHECKPOINTS.iter().find(|c| c.name == name)
}

pub fn checkpoints() -> &'static [CheckpointSpec] {
    &CHECKPOINTS
}
