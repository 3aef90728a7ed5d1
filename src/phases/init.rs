//! Workflow initialization phase.

use async_trait::async_trait;

use crate::phases::PhaseHandler;
use crate::state::{StateUpdate, WorkflowPhase, WorkflowState};

/// Validates the run inputs and narrates the workflow banner.
///
/// Identity fields are already fixed on the record; this phase rejects a run
/// whose required inputs are empty, with one error per missing field.
pub struct InitHandler;

fn missing_fields(state: &WorkflowState) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if state.repo_path.as_os_str().is_empty() {
        missing.push("repo_path");
    }
    if state.org_id.is_empty() {
        missing.push("org_id");
    }
    if state.project_id.is_empty() {
        missing.push("project_id");
    }
    missing
}

#[async_trait]
impl PhaseHandler for InitHandler {
    fn phase(&self) -> WorkflowPhase {
        WorkflowPhase::Init
    }

    async fn run(&self, state: &WorkflowState) -> anyhow::Result<StateUpdate> {
        let missing = missing_fields(state);
        if !missing.is_empty() {
            let errors: Vec<String> = missing
                .iter()
                .map(|field| format!("{field} is required"))
                .collect();
            let summary = errors.join(", ");
            let mut update = StateUpdate::new()
                .with_phase(WorkflowPhase::Error)
                .with_message(format!("Workflow initialization failed: {summary}"));
            update.errors = errors;
            return Ok(update);
        }

        let banner = format!(
            "Workflow initialized\n  \
             id: {}\n  \
             repository: {}\n  \
             org: {}\n  \
             project: {}\n\
             Starting repository analysis...",
            state.workflow_id,
            state.repo_path.display(),
            state.org_id,
            state.project_id,
        );

        Ok(StateUpdate::new()
            .with_phase(WorkflowPhase::Analyze)
            .with_message(banner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;

    #[tokio::test]
    async fn test_init_advances_on_valid_config() {
        let state = WorkflowState::new(&RunConfig::new("/repo", "o1", "p1"));
        let update = InitHandler.run(&state).await.unwrap();

        assert_eq!(update.current_phase, Some(WorkflowPhase::Analyze));
        assert!(update.errors.is_empty());
        assert!(update.messages[0].contains(&state.workflow_id));
        assert!(update.messages[0].contains("o1"));
    }

    #[tokio::test]
    async fn test_init_rejects_missing_org() {
        let state = WorkflowState::new(&RunConfig::new("/repo", "", "p1"));
        let update = InitHandler.run(&state).await.unwrap();

        assert_eq!(update.current_phase, Some(WorkflowPhase::Error));
        assert_eq!(update.errors, vec!["org_id is required"]);
    }

    #[tokio::test]
    async fn test_init_reports_one_error_per_missing_field() {
        let state = WorkflowState::new(&RunConfig::default());
        let update = InitHandler.run(&state).await.unwrap();

        assert_eq!(
            update.errors,
            vec![
                "repo_path is required",
                "org_id is required",
                "project_id is required"
            ]
        );
        assert!(update.messages[0].contains("initialization failed"));
    }
}
