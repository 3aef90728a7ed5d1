//! Workflow state for the pipewright orchestrator.
//!
//! This module provides:
//! - `WorkflowPhase` — the fixed, ordered set of phases a run moves through
//! - `WorkflowState` — the single snapshot record threaded through a run
//! - `StateUpdate` — the sparse partial update a phase handler returns
//! - The reducer table deciding, per field, whether an update appends or
//!   replaces
//!
//! Phase handlers never mutate a `WorkflowState` directly; they return a
//! `StateUpdate` and the engine folds it in via [`WorkflowState::apply`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::config::RunConfig;

/// One phase of the workflow.
///
/// `Complete` and `Error` are terminal: no handler runs once either is the
/// current phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowPhase {
    /// Validate inputs and stamp workflow metadata
    #[default]
    Init,
    /// Analyze the target repository
    Analyze,
    /// Derive delivery patterns from the analysis
    Extract,
    /// Generate pipeline templates
    Generate,
    /// Human approval gate
    Approval,
    /// Provision the delivery platform
    Setup,
    /// Verify the rollout
    Verify,
    /// Workflow finished successfully
    Complete,
    /// Workflow finished with recorded errors
    Error,
}

impl WorkflowPhase {
    /// All phases, in workflow order.
    pub const ALL: [WorkflowPhase; 9] = [
        Self::Init,
        Self::Analyze,
        Self::Extract,
        Self::Generate,
        Self::Approval,
        Self::Setup,
        Self::Verify,
        Self::Complete,
        Self::Error,
    ];

    /// Check if the phase is terminal (no handler runs past it).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }

    /// Snake-case name, matching the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Analyze => "analyze",
            Self::Extract => "extract",
            Self::Generate => "generate",
            Self::Approval => "approval",
            Self::Setup => "setup",
            Self::Verify => "verify",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Results from the repository analysis phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositoryAnalysis {
    pub repo_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_url: Option<String>,
    pub primary_language: String,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub frameworks: Vec<String>,
    #[serde(default)]
    pub build_tools: Vec<String>,
    #[serde(default)]
    pub package_managers: Vec<String>,
    /// Top-level dependency names, keyed by the manifest they came from.
    #[serde(default)]
    pub dependencies: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub entry_points: Vec<String>,
    #[serde(default)]
    pub test_frameworks: Vec<String>,
    #[serde(default)]
    pub dockerfile_present: bool,
    #[serde(default)]
    pub docker_compose_present: bool,
    #[serde(default)]
    pub kubernetes_manifests: Vec<String>,
    #[serde(default)]
    pub ci_files_present: Vec<String>,
    #[serde(default)]
    pub infrastructure_as_code: Vec<String>,
    /// Human-readable summary of the repository layout.
    #[serde(default)]
    pub structure_summary: String,
    /// Rough build/deploy complexity on a 1-10 scale.
    pub complexity_score: u8,
    /// How confident the analyzer is in its findings (0.0-1.0).
    pub confidence: f64,
}

/// A connector the delivery platform needs (git, registry, cluster, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectorSpec {
    pub kind: String,
    pub name: String,
}

/// Delivery patterns derived from the repository analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryPatterns {
    /// container, multi_service, library, or service
    pub build_pattern: String,
    /// kubernetes, docker, or vm
    pub deployment_target: String,
    #[serde(default)]
    pub environments: Vec<String>,
    /// rolling, blue_green, or canary
    pub deployment_strategy: String,
    /// Test level -> framework/tool expected to run it.
    #[serde(default)]
    pub test_strategy: BTreeMap<String, String>,
    #[serde(default)]
    pub artifact_types: Vec<String>,
    #[serde(default)]
    pub secrets_required: Vec<String>,
    #[serde(default)]
    pub connectors_required: Vec<ConnectorSpec>,
    #[serde(default)]
    pub infrastructure_requirements: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub recommended_stages: Vec<String>,
    pub confidence: f64,
}

/// A stage of the generated pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageSpec {
    pub name: String,
    pub kind: String,
}

/// One step inside a pipeline stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
    pub name: String,
    pub kind: String,
}

/// A trigger for the generated pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerSpec {
    pub kind: String,
    pub source: String,
}

/// Validation outcome for the generated templates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub yaml_valid: bool,
    pub connectors_valid: bool,
    pub secrets_valid: bool,
}

impl ValidationReport {
    pub fn all_valid(&self) -> bool {
        self.yaml_valid && self.connectors_valid && self.secrets_valid
    }
}

/// Templates produced by the generation phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratedTemplates {
    /// Rendered pipeline definition.
    pub pipeline_yaml: String,
    #[serde(default)]
    pub stages: Vec<StageSpec>,
    /// Stage name -> steps.
    #[serde(default)]
    pub steps: BTreeMap<String, Vec<StepSpec>>,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    #[serde(default)]
    pub triggers: Vec<TriggerSpec>,
    /// Environment name -> variable overrides.
    #[serde(default)]
    pub input_sets: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default)]
    pub validation: ValidationReport,
}

/// Outcome of provisioning one platform resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreatedResource {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl CreatedResource {
    pub fn new(id: &str, name: &str, kind: &str, status: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            kind: kind.to_string(),
            status: status.to_string(),
            url: None,
        }
    }

    pub fn with_url(mut self, url: String) -> Self {
        self.url = Some(url);
        self
    }
}

/// Overall status of the platform setup phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SetupStatus {
    #[default]
    Success,
    Partial,
    Failed,
}

/// Results from the platform setup phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlatformSetup {
    #[serde(default)]
    pub connectors_created: Vec<CreatedResource>,
    #[serde(default)]
    pub secrets_created: Vec<CreatedResource>,
    #[serde(default)]
    pub environments_created: Vec<CreatedResource>,
    #[serde(default)]
    pub services_created: Vec<CreatedResource>,
    #[serde(default)]
    pub infrastructure_created: Vec<CreatedResource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_created: Option<CreatedResource>,
    pub setup_status: SetupStatus,
    #[serde(default)]
    pub setup_errors: Vec<String>,
    /// Named deep links into the platform (pipeline, project, ...).
    #[serde(default)]
    pub platform_urls: BTreeMap<String, String>,
}

/// Status of a pipeline execution on the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    #[default]
    Success,
    Failed,
    Running,
    Aborted,
}

/// Results from the deployment verification phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentVerification {
    pub execution_id: String,
    pub execution_url: String,
    pub execution_status: ExecutionStatus,
    #[serde(default)]
    pub stages_completed: Vec<String>,
    #[serde(default)]
    pub stages_failed: Vec<String>,
    #[serde(default)]
    pub artifacts_generated: Vec<String>,
    pub logs_url: String,
    pub verification_passed: bool,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

/// The canonical snapshot record for one workflow run.
///
/// Identity and input configuration are fixed at construction; everything else
/// changes only through [`WorkflowState::apply`]. Checkpoints are full
/// serializations of this record and round-trip losslessly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    // Identity / input configuration (immutable after construction)
    pub workflow_id: String,
    pub repo_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_url: Option<String>,
    pub org_id: String,
    pub project_id: String,

    // Control
    pub current_phase: WorkflowPhase,

    // Phase outputs, each populated by exactly one phase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_analysis: Option<RepositoryAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_patterns: Option<DeliveryPatterns>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_templates: Option<GeneratedTemplates>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_setup: Option<PlatformSetup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_verification: Option<DeploymentVerification>,

    // Human-in-the-loop
    pub hitl_required: bool,
    pub hitl_approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hitl_feedback: Option<String>,

    // Diagnostics (append-only)
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub messages: Vec<String>,

    // Timing
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_duration_seconds: Option<f64>,
}

impl WorkflowState {
    /// Create a fresh record from a run configuration.
    ///
    /// The workflow id is minted here so the very first checkpoint already has
    /// a key, even when init fails validation. An approval-skip flag presets
    /// `hitl_approved`, letting the gate pass without visiting the approval
    /// phase.
    pub fn new(config: &RunConfig) -> Self {
        Self {
            workflow_id: Uuid::new_v4().to_string(),
            repo_path: config.repo_path.clone(),
            repo_url: config.repo_url.clone(),
            org_id: config.org_id.clone(),
            project_id: config.project_id.clone(),
            current_phase: WorkflowPhase::Init,
            repository_analysis: None,
            extracted_patterns: None,
            generated_templates: None,
            platform_setup: None,
            deployment_verification: None,
            hitl_required: !config.skip_approval,
            hitl_approved: config.skip_approval,
            hitl_feedback: None,
            errors: Vec::new(),
            warnings: Vec::new(),
            messages: Vec::new(),
            started_at: Utc::now(),
            completed_at: None,
            total_duration_seconds: None,
        }
    }

    /// Check if the run has reached a terminal phase.
    pub fn is_terminal(&self) -> bool {
        self.current_phase.is_terminal()
    }

    /// Check if any error has been recorded.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Fold a handler's partial update into the record.
    ///
    /// List fields are routed through the reducer table; every other field
    /// replaces its prior value when the update carries one and is left
    /// untouched otherwise.
    pub fn apply(&mut self, update: StateUpdate) {
        // Destructured so adding a field to StateUpdate without handling it
        // here fails to compile.
        let StateUpdate {
            current_phase,
            repository_analysis,
            extracted_patterns,
            generated_templates,
            platform_setup,
            deployment_verification,
            hitl_required,
            hitl_approved,
            hitl_feedback,
            completed_at,
            total_duration_seconds,
            messages,
            errors,
            warnings,
        } = update;

        if let Some(phase) = current_phase {
            self.current_phase = phase;
        }
        if let Some(analysis) = repository_analysis {
            self.repository_analysis = Some(analysis);
        }
        if let Some(patterns) = extracted_patterns {
            self.extracted_patterns = Some(patterns);
        }
        if let Some(templates) = generated_templates {
            self.generated_templates = Some(templates);
        }
        if let Some(setup) = platform_setup {
            self.platform_setup = Some(setup);
        }
        if let Some(verification) = deployment_verification {
            self.deployment_verification = Some(verification);
        }
        if let Some(required) = hitl_required {
            self.hitl_required = required;
        }
        if let Some(approved) = hitl_approved {
            self.hitl_approved = approved;
        }
        if let Some(feedback) = hitl_feedback {
            self.hitl_feedback = Some(feedback);
        }
        if let Some(at) = completed_at {
            self.completed_at = Some(at);
        }
        if let Some(secs) = total_duration_seconds {
            self.total_duration_seconds = Some(secs);
        }

        merge_list("messages", &mut self.messages, messages);
        merge_list("errors", &mut self.errors, errors);
        merge_list("warnings", &mut self.warnings, warnings);
    }
}

/// How a field of the record combines with an incoming update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// The update's value wholly replaces the prior one.
    Replace,
    /// The update's items are appended after the prior ones, order preserved.
    Append,
}

/// Fields that accumulate across phases. Everything else replaces.
const APPEND_FIELDS: &[&str] = &["messages", "errors", "warnings"];

/// Look up the merge strategy for a field by name.
pub fn merge_strategy(field: &str) -> MergeStrategy {
    if APPEND_FIELDS.contains(&field) {
        MergeStrategy::Append
    } else {
        MergeStrategy::Replace
    }
}

fn merge_list(field: &str, target: &mut Vec<String>, items: Vec<String>) {
    if items.is_empty() {
        return;
    }
    match merge_strategy(field) {
        MergeStrategy::Append => target.extend(items),
        MergeStrategy::Replace => *target = items,
    }
}

/// A sparse update: only the fields a handler wants to change.
///
/// Identity fields are deliberately absent, so no handler can rewrite them.
/// The list fields carry items to append, per the reducer table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_phase: Option<WorkflowPhase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_analysis: Option<RepositoryAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_patterns: Option<DeliveryPatterns>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_templates: Option<GeneratedTemplates>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_setup: Option<PlatformSetup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_verification: Option<DeploymentVerification>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hitl_required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hitl_approved: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hitl_feedback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_duration_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl StateUpdate {
    /// Create an empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the phase to move to.
    pub fn with_phase(mut self, phase: WorkflowPhase) -> Self {
        self.current_phase = Some(phase);
        self
    }

    /// Append a narration message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.messages.push(message.into());
        self
    }

    /// Append an error, which forces the error route.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.errors.push(error.into());
        self
    }

    /// Append a warning.
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}
