//! Delivery-pattern extraction phase.
//!
//! Pure derivation: maps the repository analysis onto the delivery decisions
//! the later phases need (build pattern, deployment target and strategy,
//! environments, test strategy, artifacts, secrets, connectors and the
//! recommended stage list).

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::phases::PhaseHandler;
use crate::state::{
    ConnectorSpec, DeliveryPatterns, RepositoryAnalysis, StateUpdate, WorkflowPhase, WorkflowState,
};

/// Derives `DeliveryPatterns` from the repository analysis.
pub struct PatternExtractor;

impl PatternExtractor {
    fn build_pattern(analysis: &RepositoryAnalysis) -> &'static str {
        if analysis.docker_compose_present {
            "multi_service"
        } else if analysis.dockerfile_present {
            "container"
        } else if analysis.entry_points.is_empty() {
            "library"
        } else {
            "service"
        }
    }

    fn deployment_target(analysis: &RepositoryAnalysis) -> &'static str {
        if !analysis.kubernetes_manifests.is_empty() {
            "kubernetes"
        } else if analysis.dockerfile_present {
            "docker"
        } else {
            "vm"
        }
    }

    fn deployment_strategy(target: &str, analysis: &RepositoryAnalysis) -> &'static str {
        if target == "kubernetes" && analysis.complexity_score >= 7 {
            "canary"
        } else {
            "rolling"
        }
    }

    fn test_strategy(analysis: &RepositoryAnalysis) -> BTreeMap<String, String> {
        let unit = analysis
            .test_frameworks
            .first()
            .cloned()
            .unwrap_or_else(|| match analysis.primary_language.as_str() {
                "rust" => "cargo-test".to_string(),
                "go" => "go-test".to_string(),
                "python" => "pytest".to_string(),
                _ => "manual".to_string(),
            });

        let mut strategy = BTreeMap::new();
        strategy.insert("unit".to_string(), unit.clone());
        strategy.insert("integration".to_string(), unit);
        strategy.insert("e2e".to_string(), "manual".to_string());
        strategy
    }

    fn artifact_types(analysis: &RepositoryAnalysis) -> Vec<String> {
        if analysis.dockerfile_present {
            vec!["docker".to_string()]
        } else {
            match analysis.primary_language.as_str() {
                "rust" | "go" | "c" | "cpp" => vec!["binary".to_string()],
                _ => vec!["package".to_string()],
            }
        }
    }

    fn connectors(analysis: &RepositoryAnalysis) -> Vec<ConnectorSpec> {
        let mut connectors = vec![ConnectorSpec {
            kind: "git".to_string(),
            name: "source-repo".to_string(),
        }];
        if analysis.dockerfile_present {
            connectors.push(ConnectorSpec {
                kind: "docker".to_string(),
                name: "container-registry".to_string(),
            });
        }
        if !analysis.kubernetes_manifests.is_empty() {
            connectors.push(ConnectorSpec {
                kind: "kubernetes".to_string(),
                name: "deploy-cluster".to_string(),
            });
        }
        connectors
    }

    fn secrets(analysis: &RepositoryAnalysis) -> Vec<String> {
        let mut secrets = vec!["source_host_token".to_string()];
        if analysis.dockerfile_present {
            secrets.push("registry_credentials".to_string());
        }
        if !analysis.kubernetes_manifests.is_empty() {
            secrets.push("kubeconfig".to_string());
        }
        secrets
    }

    fn infrastructure(target: &str, analysis: &RepositoryAnalysis) -> BTreeMap<String, Vec<String>> {
        let compute = match target {
            "kubernetes" => "kubernetes_cluster",
            "docker" => "container_host",
            _ => "virtual_machine",
        };
        let mut infra = BTreeMap::new();
        infra.insert("compute".to_string(), vec![compute.to_string()]);
        if analysis.dockerfile_present {
            infra.insert(
                "storage".to_string(),
                vec!["container_registry".to_string()],
            );
        }
        infra
    }

    fn stages(analysis: &RepositoryAnalysis) -> Vec<String> {
        let mut stages = vec!["build".to_string(), "test".to_string()];
        if analysis.complexity_score >= 5 || !analysis.ci_files_present.is_empty() {
            stages.push("security_scan".to_string());
        }
        stages.push("package".to_string());
        stages.push("deploy".to_string());
        stages.push("verify".to_string());
        stages
    }
}

#[async_trait]
impl PhaseHandler for PatternExtractor {
    fn phase(&self) -> WorkflowPhase {
        WorkflowPhase::Extract
    }

    async fn run(&self, state: &WorkflowState) -> anyhow::Result<StateUpdate> {
        let Some(analysis) = &state.repository_analysis else {
            return Ok(StateUpdate::new()
                .with_phase(WorkflowPhase::Error)
                .with_error("No repository analysis available".to_string())
                .with_message("Cannot extract patterns: no repository analysis"));
        };

        let target = Self::deployment_target(analysis);
        let patterns = DeliveryPatterns {
            build_pattern: Self::build_pattern(analysis).to_string(),
            deployment_target: target.to_string(),
            environments: vec![
                "dev".to_string(),
                "staging".to_string(),
                "production".to_string(),
            ],
            deployment_strategy: Self::deployment_strategy(target, analysis).to_string(),
            test_strategy: Self::test_strategy(analysis),
            artifact_types: Self::artifact_types(analysis),
            secrets_required: Self::secrets(analysis),
            connectors_required: Self::connectors(analysis),
            infrastructure_requirements: Self::infrastructure(target, analysis),
            recommended_stages: Self::stages(analysis),
            confidence: analysis.confidence,
        };

        let message = format!(
            "Pattern extraction complete\n  \
             build pattern: {}\n  \
             deployment target: {}\n  \
             environments: {}\n  \
             strategy: {}\n  \
             confidence: {:.0}%\n\
             Proceeding to template generation...",
            patterns.build_pattern,
            patterns.deployment_target,
            patterns.environments.join(", "),
            patterns.deployment_strategy,
            patterns.confidence * 100.0,
        );

        Ok(StateUpdate {
            extracted_patterns: Some(patterns),
            ..Default::default()
        }
        .with_phase(WorkflowPhase::Generate)
        .with_message(message))
    }
}
