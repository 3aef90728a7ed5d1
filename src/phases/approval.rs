//! Human approval phase.
//!
//! Mostly built into the core: the gate itself lives in the phase graph and
//! router. This handler only narrates. It emits the review summary once per
//! suspension, marks unneeded approvals as granted, and acknowledges grants.
//! It is idempotent: re-running in an already-approved state performs no
//! destructive action.

use async_trait::async_trait;

use crate::phases::PhaseHandler;
use crate::state::{StateUpdate, WorkflowPhase, WorkflowState};

pub struct ApprovalHandler;

fn review_summary(state: &WorkflowState) -> String {
    let templates = state.generated_templates.as_ref();
    let patterns = state.extracted_patterns.as_ref();

    let connectors = patterns
        .map(|p| {
            p.connectors_required
                .iter()
                .map(|c| format!("  - {} ({})", c.name, c.kind))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default();
    let secrets = patterns
        .map(|p| {
            p.secrets_required
                .iter()
                .map(|s| format!("  - {s}"))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default();

    format!(
        "Human approval required\n\
         Generated pipeline:\n  \
           stages: {}\n  \
           variables: {}\n  \
           triggers: {}\n\
         Deployment configuration:\n  \
           target: {}\n  \
           strategy: {}\n  \
           environments: {}\n\
         Connectors to create:\n{}\n\
         Secrets to create:\n{}\n\
         Resume with approval to proceed, or reject to cancel the workflow.",
        templates.map_or(0, |t| t.stages.len()),
        templates.map_or(0, |t| t.variables.len()),
        templates.map_or(0, |t| t.triggers.len()),
        patterns.map_or("n/a", |p| p.deployment_target.as_str()),
        patterns.map_or("n/a", |p| p.deployment_strategy.as_str()),
        patterns.map_or_else(String::new, |p| p.environments.join(", ")),
        connectors,
        secrets,
    )
}

#[async_trait]
impl PhaseHandler for ApprovalHandler {
    fn phase(&self) -> WorkflowPhase {
        WorkflowPhase::Approval
    }

    async fn run(&self, state: &WorkflowState) -> anyhow::Result<StateUpdate> {
        if !state.hitl_required {
            return Ok(StateUpdate {
                hitl_approved: Some(true),
                ..Default::default()
            }
            .with_message("No approval required, proceeding..."));
        }

        if state.hitl_approved {
            return Ok(StateUpdate::new()
                .with_phase(WorkflowPhase::Setup)
                .with_message("Approval granted, proceeding to platform setup..."));
        }

        // Gate is closed: narrate the request. The engine suspends after this
        // update and will not re-invoke until an external resume.
        Ok(StateUpdate::new().with_message(review_summary(state)))
    }
}
