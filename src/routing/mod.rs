//! Routing policy: what happens after a phase produces a signal.
//!
//! Routing is table-driven. [`table::ROUTES`] maps each signal to advance,
//! pivot, complete or kill plus the checkpoint a human must pass;
//! [`table::CHECKPOINTS`] maps each checkpoint decision to its effect. The
//! orchestrator and the resume dispatcher consult [`RoutingPolicy`] and never
//! branch on signals themselves.

mod policy;
pub mod table;

pub use policy::{Gate, Route, RoutingDecision, RoutingPolicy, Transition};
pub use table::{CheckpointSpec, DecisionEffect, OptionSpec, checkpoint, checkpoints};
