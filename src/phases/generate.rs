//! Pipeline template generation phase.
//!
//! Renders the extracted patterns into a concrete pipeline document: YAML
//! definition, stage and step tables, variables, triggers and
//! per-environment input sets. The rendered YAML is validated by parsing it
//! back. Generation always requests human approval before setup.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::phases::PhaseHandler;
use crate::state::{
    DeliveryPatterns, GeneratedTemplates, StageSpec, StateUpdate, StepSpec, TriggerSpec,
    ValidationReport, WorkflowPhase, WorkflowState,
};

/// Serialized pipeline document shape.
#[derive(Debug, Serialize, Deserialize)]
struct PipelineDoc {
    pipeline: PipelineSpec,
}

#[derive(Debug, Serialize, Deserialize)]
struct PipelineSpec {
    name: String,
    identifier: String,
    org_identifier: String,
    project_identifier: String,
    stages: Vec<PipelineStage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PipelineStage {
    name: String,
    identifier: String,
    #[serde(rename = "type")]
    kind: String,
    steps: Vec<PipelineStep>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PipelineStep {
    name: String,
    #[serde(rename = "type")]
    kind: String,
}

/// Generates pipeline templates from the extracted patterns.
pub struct TemplateGenerator;

impl TemplateGenerator {
    /// Stage kind: delivery stages deploy, everything else is CI.
    fn stage_kind(stage: &str) -> &'static str {
        match stage {
            "deploy" | "verify" => "cd",
            _ => "ci",
        }
    }

    fn steps_for(stage: &str, patterns: &DeliveryPatterns) -> Vec<StepSpec> {
        let step = |name: &str, kind: &str| StepSpec {
            name: name.to_string(),
            kind: kind.to_string(),
        };
        match stage {
            "build" => vec![step("Build Application", "run")],
            "test" => vec![step("Run Tests", "run")],
            "security_scan" => vec![step("Scan Dependencies", "run")],
            "package" => vec![step("Publish Artifact", "publish")],
            "deploy" => {
                let kind = match patterns.deployment_target.as_str() {
                    "kubernetes" => "k8s_rolling_deploy",
                    "docker" => "container_deploy",
                    _ => "host_deploy",
                };
                vec![step("Deploy Application", kind)]
            }
            "verify" => vec![step("Smoke Check", "run")],
            other => vec![step(other, "run")],
        }
    }

    fn render_yaml(
        state: &WorkflowState,
        patterns: &DeliveryPatterns,
        steps: &BTreeMap<String, Vec<StepSpec>>,
    ) -> anyhow::Result<String> {
        let stages = patterns
            .recommended_stages
            .iter()
            .map(|stage| PipelineStage {
                name: title_case(stage),
                identifier: stage.clone(),
                kind: Self::stage_kind(stage).to_string(),
                steps: steps
                    .get(stage)
                    .map(|s| {
                        s.iter()
                            .map(|step| PipelineStep {
                                name: step.name.clone(),
                                kind: step.kind.clone(),
                            })
                            .collect()
                    })
                    .unwrap_or_default(),
            })
            .collect();

        let doc = PipelineDoc {
            pipeline: PipelineSpec {
                name: format!("{} delivery", state.project_id),
                identifier: format!("{}_delivery", state.project_id.replace('-', "_")),
                org_identifier: state.org_id.clone(),
                project_identifier: state.project_id.clone(),
                stages,
            },
        };
        Ok(serde_yaml::to_string(&doc)?)
    }
}

fn title_case(word: &str) -> String {
    let mut chars = word.replace('_', " ").chars().collect::<Vec<_>>();
    if let Some(first) = chars.first_mut() {
        *first = first.to_ascii_uppercase();
    }
    chars.into_iter().collect()
}

#[async_trait]
impl PhaseHandler for TemplateGenerator {
    fn phase(&self) -> WorkflowPhase {
        WorkflowPhase::Generate
    }

    async fn run(&self, state: &WorkflowState) -> anyhow::Result<StateUpdate> {
        let (Some(patterns), Some(_analysis)) =
            (&state.extracted_patterns, &state.repository_analysis)
        else {
            return Ok(StateUpdate::new()
                .with_phase(WorkflowPhase::Error)
                .with_error("Missing patterns or analysis for template generation".to_string())
                .with_message("Cannot generate templates: missing required data"));
        };

        let stages: Vec<StageSpec> = patterns
            .recommended_stages
            .iter()
            .map(|stage| StageSpec {
                name: title_case(stage),
                kind: Self::stage_kind(stage).to_string(),
            })
            .collect();

        let steps: BTreeMap<String, Vec<StepSpec>> = patterns
            .recommended_stages
            .iter()
            .map(|stage| (stage.clone(), Self::steps_for(stage, patterns)))
            .collect();

        let mut variables = BTreeMap::new();
        variables.insert("image_tag".to_string(), "{{run_number}}".to_string());
        variables.insert("environment".to_string(), "{{environment}}".to_string());

        let triggers = vec![
            TriggerSpec {
                kind: "webhook".to_string(),
                source: "push".to_string(),
            },
            TriggerSpec {
                kind: "manual".to_string(),
                source: "production".to_string(),
            },
        ];

        let input_sets: BTreeMap<String, BTreeMap<String, String>> = patterns
            .environments
            .iter()
            .map(|env| {
                let mut inputs = BTreeMap::new();
                inputs.insert("environment".to_string(), env.clone());
                inputs.insert(
                    "replicas".to_string(),
                    if env == "production" { "3" } else { "1" }.to_string(),
                );
                (env.clone(), inputs)
            })
            .collect();

        let pipeline_yaml = Self::render_yaml(state, patterns, &steps)?;
        let validation = ValidationReport {
            yaml_valid: serde_yaml::from_str::<PipelineDoc>(&pipeline_yaml).is_ok(),
            connectors_valid: !patterns.connectors_required.is_empty(),
            secrets_valid: !patterns.secrets_required.is_empty(),
        };

        let message = format!(
            "Template generation complete\n  \
             stages: {}\n  \
             variables: {}\n  \
             triggers: {}\n  \
             validation: {}\n\
             Human approval required before platform setup.",
            stages.len(),
            variables.len(),
            triggers.len(),
            if validation.all_valid() { "passed" } else { "failed" },
        );

        let templates = GeneratedTemplates {
            pipeline_yaml,
            stages,
            steps,
            variables,
            triggers,
            input_sets,
            validation,
        };

        Ok(StateUpdate {
            generated_templates: Some(templates),
            hitl_required: Some(true),
            ..Default::default()
        }
        .with_message(message))
    }
}
