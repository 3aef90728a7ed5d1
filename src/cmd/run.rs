use anyhow::{Context, Result, anyhow, bail};
use dialoguer::{Select, theme::ColorfulTheme};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

use pipewright::capability::select_registry;
use pipewright::checkpoint::{CheckpointStore, FileStore};
use pipewright::config::{RunConfig, Settings};
use pipewright::engine::{ResumeDecision, RunOutcome, RunStatus, WorkflowEngine, WorkflowEvent};
use pipewright::phases::HandlerRegistry;
use pipewright::ui::RunUi;

/// Inputs for the `orchestrate` command.
pub struct OrchestrateOpts {
    pub repo_path: PathBuf,
    pub repo_url: Option<String>,
    pub org_id: String,
    pub project_id: String,
    pub no_approval: bool,
}

pub(crate) fn resolve_settings(project_dir: &Path, state_dir: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::load(project_dir)?;
    if let Some(dir) = state_dir {
        settings.state_dir = dir.to_path_buf();
    }
    settings.ensure_state_dir()?;
    Ok(settings)
}

fn build_engine(settings: &Settings, store: Arc<dyn CheckpointStore>) -> WorkflowEngine {
    let registry = select_registry(settings);
    let handlers = HandlerRegistry::standard(registry, settings.platform_api_url.clone());
    WorkflowEngine::new(handlers, store)
}

enum EngineOp {
    Start(RunConfig),
    Resume(String, ResumeDecision),
}

/// Drive the engine in a background task while rendering its event stream.
async fn drive_and_render(
    engine: WorkflowEngine,
    ui: &RunUi,
    printed: (usize, usize),
    op: EngineOp,
) -> Result<RunOutcome> {
    let (tx, mut rx) = mpsc::channel(64);
    let engine = engine.with_event_channel(tx);
    let task = tokio::spawn(async move {
        match op {
            EngineOp::Start(config) => engine.start(config).await,
            EngineOp::Resume(workflow_id, decision) => {
                engine.resume(&workflow_id, Some(decision)).await
            }
        }
    });

    let mut printed = printed;
    while let Some(event) = rx.recv().await {
        match event {
            WorkflowEvent::PhaseStarted { phase } => ui.phase(phase),
            WorkflowEvent::PhaseCompleted { snapshot, .. } => {
                printed = ui.render_new(&snapshot, printed);
            }
            WorkflowEvent::Suspended { .. } | WorkflowEvent::Finished { .. } => {}
        }
    }

    let outcome = task.await.context("engine task terminated abnormally")??;
    Ok(outcome)
}

fn report(ui: &RunUi, outcome: &RunOutcome) -> Result<()> {
    match outcome.status {
        RunStatus::Completed => {
            ui.completed(&outcome.state);
            Ok(())
        }
        RunStatus::Suspended => {
            ui.suspended(&outcome.state.workflow_id);
            Ok(())
        }
        RunStatus::Failed => {
            ui.failed(&outcome.state);
            bail!(
                "workflow {} ended in the error phase",
                outcome.state.workflow_id
            )
        }
    }
}

pub async fn cmd_orchestrate(
    project_dir: &Path,
    state_dir: Option<&Path>,
    opts: OrchestrateOpts,
    verbose: bool,
) -> Result<()> {
    let settings = resolve_settings(project_dir, state_dir)?;
    let store: Arc<dyn CheckpointStore> = Arc::new(FileStore::new(&settings.state_dir));
    let engine = build_engine(&settings, store);

    let config = RunConfig::new(&opts.repo_path, &opts.org_id, &opts.project_id)
        .with_repo_url(opts.repo_url)
        .with_skip_approval(opts.no_approval);

    let ui = RunUi::new(verbose);
    let outcome = drive_and_render(engine, &ui, (0, 0), EngineOp::Start(config)).await?;
    report(&ui, &outcome)
}

pub async fn cmd_resume(
    project_dir: &Path,
    state_dir: Option<&Path>,
    workflow_id: &str,
    approve: bool,
    reject: bool,
    feedback: Option<String>,
    verbose: bool,
) -> Result<()> {
    let settings = resolve_settings(project_dir, state_dir)?;
    let file_store = FileStore::new(&settings.state_dir);

    let snapshot = file_store
        .load(workflow_id)?
        .ok_or_else(|| anyhow!("No checkpoint found for workflow {workflow_id}"))?;
    if snapshot.is_terminal() {
        bail!(
            "workflow {workflow_id} already finished in phase {}",
            snapshot.current_phase
        );
    }

    // Re-show the pending request before asking for a decision
    if let Some(request) = snapshot.messages.last() {
        println!("{request}\n");
    }

    let decision = if approve {
        Some(ResumeDecision::Approve { feedback })
    } else if reject {
        Some(ResumeDecision::Reject { reason: feedback })
    } else {
        prompt_decision(feedback)?
    };

    let Some(decision) = decision else {
        println!("Leaving workflow {workflow_id} suspended.");
        return Ok(());
    };

    let engine = build_engine(&settings, Arc::new(file_store));
    let ui = RunUi::new(verbose);
    let printed = (snapshot.messages.len(), snapshot.warnings.len());
    let outcome = drive_and_render(
        engine,
        &ui,
        printed,
        EngineOp::Resume(workflow_id.to_string(), decision),
    )
    .await?;
    report(&ui, &outcome)
}

fn prompt_decision(feedback: Option<String>) -> Result<Option<ResumeDecision>> {
    let options = &[
        "Approve and continue",
        "Reject and cancel the workflow",
        "Leave suspended",
    ];

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Proceed with platform setup?")
        .items(options)
        .default(0)
        .interact()?;

    Ok(match selection {
        0 => Some(ResumeDecision::Approve { feedback }),
        1 => Some(ResumeDecision::Reject { reason: feedback }),
        _ => None,
    })
}
