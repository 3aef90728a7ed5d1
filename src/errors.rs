//! Typed error hierarchy for the pipewright orchestrator.
//!
//! Three top-level enums cover the three subsystems:
//! - `EngineError` — driver-loop and resume failures
//! - `CheckpointError` — snapshot persistence failures
//! - `CapabilityError` — capability registry failures

use thiserror::Error;

use crate::state::WorkflowPhase;

/// Errors from the execution engine.
///
/// `HandlerFault` is the unhandled-fault case: a handler returned `Err`
/// instead of routing a controlled error through its update, so the run
/// aborts and the last checkpoint is left untouched.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("No handler registered for phase {phase}")]
    MissingHandler { phase: WorkflowPhase },

    #[error("Handler for phase {phase} faulted: {source}")]
    HandlerFault {
        phase: WorkflowPhase,
        #[source]
        source: anyhow::Error,
    },

    #[error("Routing stalled at phase {phase}: successor resolves to itself")]
    RoutingStalled { phase: WorkflowPhase },

    #[error("No checkpoint found for workflow {workflow_id}")]
    CheckpointNotFound { workflow_id: String },

    #[error("Workflow {workflow_id} already finished in phase {phase}")]
    AlreadyFinished {
        workflow_id: String,
        phase: WorkflowPhase,
    },

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

/// Errors from the checkpoint store.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Failed to access checkpoint at {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize checkpoint for workflow {workflow_id}: {source}")]
    Serialize {
        workflow_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to parse checkpoint at {path}: {source}")]
    Deserialize {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors from the capability registry.
///
/// An unreachable backend is not an error; it degrades to an absent
/// capability. Asking for a capability the registry has never heard of is.
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("Unsupported capability: {name}. Supported capabilities: {supported:?}")]
    UnknownCapability {
        name: String,
        supported: Vec<&'static str>,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
