//! Phase execution: invoke the stage, evaluate, route, persist, then
//! continue, park for approval or stop.

mod runner;
mod stage;

pub use runner::{ExecutionOutcome, Orchestrator};
pub use stage::{
    CommandStage, Stage, StageFailure, StageFailureKind, StageRequest, StageResponse,
};
