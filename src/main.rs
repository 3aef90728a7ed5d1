use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod cmd;

#[derive(Parser)]
#[command(name = "pipewright")]
#[command(version, about = "Delivery-pipeline orchestrator")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Directory holding workflow checkpoints (defaults to <project>/.pipewright)
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full orchestration workflow against a repository
    Orchestrate {
        /// Path to the target repository
        repo_path: PathBuf,

        /// Repository URL (discovered from the repository when omitted)
        #[arg(long)]
        repo_url: Option<String>,

        /// Delivery platform organization id
        #[arg(short = 'o', long = "org")]
        org_id: String,

        /// Delivery platform project id
        #[arg(short = 'p', long = "project")]
        project_id: String,

        /// Skip the human approval gate
        #[arg(long)]
        no_approval: bool,
    },
    /// Resume a suspended workflow from its checkpoint
    Resume {
        workflow_id: String,

        /// Grant approval and continue
        #[arg(long)]
        approve: bool,

        /// Reject and cancel the workflow
        #[arg(long, conflicts_with = "approve")]
        reject: bool,

        /// Free-text feedback attached to the decision
        #[arg(long)]
        feedback: Option<String>,
    },
    /// Show the checkpointed state of a workflow
    Status { workflow_id: String },
    /// List checkpointed workflows
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    let state_dir = cli.state_dir.as_deref();

    match &cli.command {
        Commands::Orchestrate {
            repo_path,
            repo_url,
            org_id,
            project_id,
            no_approval,
        } => {
            let opts = cmd::OrchestrateOpts {
                repo_path: repo_path.clone(),
                repo_url: repo_url.clone(),
                org_id: org_id.clone(),
                project_id: project_id.clone(),
                no_approval: *no_approval,
            };
            cmd::cmd_orchestrate(&project_dir, state_dir, opts, cli.verbose).await?;
        }
        Commands::Resume {
            workflow_id,
            approve,
            reject,
            feedback,
        } => {
            cmd::cmd_resume(
                &project_dir,
                state_dir,
                workflow_id,
                *approve,
                *reject,
                feedback.clone(),
                cli.verbose,
            )
            .await?;
        }
        Commands::Status { workflow_id } => {
            cmd::cmd_status(&project_dir, state_dir, workflow_id)?;
        }
        Commands::List => cmd::cmd_list(&project_dir, state_dir)?,
    }

    Ok(())
}
