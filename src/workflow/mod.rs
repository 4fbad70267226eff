//! Workflow execution
//!
//! Step catalog, the run state machine, the engine that drives it, manual
//! handoff and the run lifecycle around it.

pub mod engine;
pub mod handoff;
pub mod runner;
pub mod state;
pub mod steps;

pub use engine::{StepOutcome, WorkflowEngine};
pub use handoff::{ConsoleOperator, HandoffRequest, Operator, OperatorDecision, ScriptedOperator};
pub use runner::{RunReport, Runner};
pub use state::{WorkflowRun, WorkflowState};
pub use steps::{expand_placeholders, StepCatalog, StepSet, UrlCapture, WorkflowPlan};
