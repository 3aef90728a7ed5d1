use anyhow::{Result, anyhow};
use console::style;
use std::path::Path;

use pipewright::checkpoint::{CheckpointStore, FileStore};
use pipewright::state::WorkflowState;

use crate::cmd::run::resolve_settings;

pub fn cmd_status(
    project_dir: &Path,
    state_dir: Option<&Path>,
    workflow_id: &str,
) -> Result<()> {
    let settings = resolve_settings(project_dir, state_dir)?;
    let store = FileStore::new(&settings.state_dir);
    let state = store
        .load(workflow_id)?
        .ok_or_else(|| anyhow!("No checkpoint found for workflow {workflow_id}"))?;

    print_state(&state);
    Ok(())
}

fn print_state(state: &WorkflowState) {
    println!("{} {}", style("Workflow:").bold(), state.workflow_id);
    println!("  phase:      {}", style(state.current_phase).yellow());
    println!("  repository: {}", state.repo_path.display());
    println!("  org/project: {}/{}", state.org_id, state.project_id);
    println!("  started:    {}", state.started_at.to_rfc3339());
    if let Some(completed) = &state.completed_at {
        println!("  completed:  {}", completed.to_rfc3339());
    }
    println!(
        "  approval:   required={} approved={}",
        state.hitl_required, state.hitl_approved
    );

    if !state.errors.is_empty() {
        println!("  {}", style("errors:").red().bold());
        for error in &state.errors {
            println!("    - {error}");
        }
    }
    if !state.warnings.is_empty() {
        println!("  {}", style("warnings:").yellow());
        for warning in &state.warnings {
            println!("    - {warning}");
        }
    }
    if let Some(message) = state.messages.last() {
        println!("  last message:");
        for line in message.lines() {
            println!("    {line}");
        }
    }
}

pub fn cmd_list(project_dir: &Path, state_dir: Option<&Path>) -> Result<()> {
    let settings = resolve_settings(project_dir, state_dir)?;
    let store = FileStore::new(&settings.state_dir);

    let ids = store.list()?;
    if ids.is_empty() {
        println!("No workflows found in {}", settings.state_dir.display());
        return Ok(());
    }

    for id in ids {
        match store.load(&id)? {
            Some(state) => println!(
                "{}  {:<9} {}",
                id,
                state.current_phase,
                state.started_at.to_rfc3339()
            ),
            None => println!("{id}  <unreadable>"),
        }
    }
    Ok(())
}
