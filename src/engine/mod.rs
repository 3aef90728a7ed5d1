//! The execution engine: drives phases until a terminal state or an
//! unsatisfied interrupt gate, checkpointing at every phase boundary.

mod runner;

pub use runner::{ResumeDecision, RunOutcome, RunStatus, WorkflowEngine, WorkflowEvent};
