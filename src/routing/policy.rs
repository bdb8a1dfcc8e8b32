use serde::Serialize;

use crate::config::RoutingConfig;
use crate::errors::DispatchError;
use crate::models::{PivotRecord, PivotType, RunState};
use crate::phase::Phase;
use crate::signals::Signal;

use super::table::{self, CheckpointSpec, DecisionEffect, OptionSpec, RuleRoute};

/// Outcome of routing a phase result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Route {
    Advance {
        to: Phase,
    },
    Complete,
    Pivot {
        pivot_type: PivotType,
        target: Phase,
        reason: String,
    },
    Kill {
        reason: String,
    },
}

impl Route {
    pub fn describe(&self) -> String {
        match self {
            Route::Advance { to } => format!("advance to {}", to),
            Route::Complete => "complete".to_string(),
            Route::Pivot {
                pivot_type, target, ..
            } => format!("{} pivot back to {}", pivot_type, target),
            Route::Kill { reason } => format!("kill ({})", reason),
        }
    }
}

/// Human checkpoint attached to a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gate {
    pub checkpoint: &'static str,
    pub recommended: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoutingDecision {
    pub route: Route,
    pub gate: Option<Gate>,
}

/// Effect of a reviewer's decision on the run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transition {
    Advance {
        to: Phase,
    },
    Complete,
    Pivot {
        pivot_type: PivotType,
        target: Phase,
        reason: String,
    },
    /// Re-run the same phase.
    Iterate {
        phase: Phase,
    },
    Kill {
        reason: String,
    },
}

impl Transition {
    /// Phase the run continues at, if it continues.
    pub fn next_phase(&self) -> Option<Phase> {
        match self {
            Transition::Advance { to } => Some(*to),
            Transition::Pivot { target, .. } => Some(*target),
            Transition::Iterate { phase } => Some(*phase),
            Transition::Complete | Transition::Kill { .. } => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Transition::Advance { .. } => "advance",
            Transition::Complete => "complete",
            Transition::Pivot { .. } => "pivot",
            Transition::Iterate { .. } => "iterate",
            Transition::Kill { .. } => "kill",
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Transition::Advance { to } => format!("advance to {}", to),
            Transition::Complete => "complete".to_string(),
            Transition::Pivot {
                pivot_type, target, ..
            } => format!("{} pivot back to {}", pivot_type, target),
            Transition::Iterate { phase } => format!("re-run {}", phase),
            Transition::Kill { reason } => format!("kill ({})", reason),
        }
    }
}

/// Table-driven routing with loopback ceilings.
#[derive(Debug, Clone, Default)]
pub struct RoutingPolicy {
    config: RoutingConfig,
}

impl RoutingPolicy {
    pub fn new(config: RoutingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    /// Route a phase signal given the run's pivot history.
    ///
    /// Pivot routes whose checkpoint (or the run as a whole) has hit its
    /// ceiling become kills, whatever the signal asks for.
    pub fn route(&self, signal: Signal, history: &[PivotRecord]) -> RoutingDecision {
        let Some(rule) = table::rule_for(signal) else {
            return RoutingDecision {
                route: Route::Kill {
                    reason: format!("no routing rule for {}", signal),
                },
                gate: None,
            };
        };

        let gate = match (rule.checkpoint, rule.recommended) {
            (Some(checkpoint), Some(recommended)) => Some(Gate {
                checkpoint,
                recommended,
            }),
            _ => None,
        };

        match rule.route {
            RuleRoute::Kill => RoutingDecision {
                route: Route::Kill {
                    reason: rule.reason.to_string(),
                },
                gate: None,
            },
            RuleRoute::Pivot(pivot_type, target) => {
                let Some(gate) = gate else {
                    return RoutingDecision {
                        route: Route::Kill {
                            reason: format!("{} pivot has no approval checkpoint", pivot_type),
                        },
                        gate: None,
                    };
                };
                if let Some(reason) = self.pivot_ceiling(gate.checkpoint, history) {
                    return RoutingDecision {
                        route: Route::Kill { reason },
                        gate: None,
                    };
                }
                RoutingDecision {
                    route: Route::Pivot {
                        pivot_type,
                        target,
                        reason: rule.reason.to_string(),
                    },
                    gate: Some(gate),
                }
            }
            RuleRoute::Advance(to) => RoutingDecision {
                route: Route::Advance { to },
                gate: gate.filter(|g| !self.is_ungated(g.checkpoint)),
            },
            RuleRoute::Complete => RoutingDecision {
                route: Route::Complete,
                gate: gate.filter(|g| !self.is_ungated(g.checkpoint)),
            },
        }
    }

    /// Check a checkpoint/decision pair against the table without touching
    /// any run.
    pub fn validate_decision(
        &self,
        checkpoint: &str,
        decision: &str,
    ) -> Result<(&'static CheckpointSpec, &'static OptionSpec), DispatchError> {
        let spec = table::checkpoint(checkpoint)
            .ok_or_else(|| DispatchError::UnknownCheckpoint(checkpoint.to_string()))?;
        let option = spec
            .option(decision)
            .ok_or_else(|| DispatchError::InvalidDecision {
                checkpoint: checkpoint.to_string(),
                decision: decision.to_string(),
            })?;
        Ok((spec, option))
    }

    /// Map a reviewer's decision to the run's next transition, applying the
    /// pivot and iteration ceilings.
    pub fn transition(
        &self,
        run: &RunState,
        checkpoint: &str,
        decision: &str,
    ) -> Result<Transition, DispatchError> {
        let (spec, option) = self.validate_decision(checkpoint, decision)?;

        let transition = match option.effect {
            DecisionEffect::Advance(to) => Transition::Advance { to },
            DecisionEffect::Complete => Transition::Complete,
            DecisionEffect::Kill => Transition::Kill {
                reason: format!("{} at {}", option.label.to_lowercase(), checkpoint),
            },
            DecisionEffect::Iterate => {
                if let Some(reason) = self.iteration_ceiling(run, spec.phase) {
                    Transition::Kill { reason }
                } else {
                    Transition::Iterate { phase: spec.phase }
                }
            }
            DecisionEffect::Pivot(pivot_type, target) => {
                if let Some(reason) = self
                    .pivot_ceiling(checkpoint, &run.pivot_history)
                    .or_else(|| self.iteration_ceiling(run, target))
                {
                    Transition::Kill { reason }
                } else {
                    Transition::Pivot {
                        pivot_type,
                        target,
                        reason: format!("{} ({})", option.label, option.value),
                    }
                }
            }
        };
        Ok(transition)
    }

    fn is_ungated(&self, checkpoint: &str) -> bool {
        self.config
            .ungated_checkpoints
            .iter()
            .any(|c| c == checkpoint)
    }

    fn pivot_ceiling(&self, checkpoint: &str, history: &[PivotRecord]) -> Option<String> {
        let from_checkpoint = history.iter().filter(|p| p.checkpoint == checkpoint).count();
        if from_checkpoint >= self.config.max_pivots_per_checkpoint {
            return Some(format!(
                "pivot ceiling reached: {} pivots from {}",
                from_checkpoint, checkpoint
            ));
        }
        if history.len() >= self.config.max_total_pivots {
            return Some(format!(
                "pivot ceiling reached: {} pivots in total",
                history.len()
            ));
        }
        None
    }

    fn iteration_ceiling(&self, run: &RunState, phase: Phase) -> Option<String> {
        let iterations = run.iterations(phase);
        if iterations >= self.config.max_iterations_per_phase {
            return Some(format!(
                "loop ceiling reached: {} re-runs of {}",
                iterations, phase
            ));
        }
        None
    }
}
