//! Phase handlers for the delivery-rollout workflow.
//!
//! Each non-terminal phase binds to one handler implementing [`PhaseHandler`]:
//! given the full current state, return the sparse update for the fields it
//! changes. Handlers never touch the checkpoint store or mutate the record
//! directly, and they signal failure in one of two ways:
//!
//! - **controlled**: return `Ok` with an update that appends to `errors`
//!   (and usually sets the error phase); the run routes to `error` with a
//!   complete, inspectable record;
//! - **fault**: return `Err`; the run aborts and the last checkpoint stands.

pub mod analyze;
pub mod approval;
pub mod extract;
pub mod generate;
pub mod init;
pub mod setup;
pub mod verify;

pub use analyze::RepoAnalyzer;
pub use approval::ApprovalHandler;
pub use extract::PatternExtractor;
pub use generate::TemplateGenerator;
pub use init::InitHandler;
pub use setup::PlatformProvisioner;
pub use verify::RolloutVerifier;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::capability::CapabilityRegistry;
use crate::state::{StateUpdate, WorkflowPhase, WorkflowState};

/// One phase's domain logic.
#[async_trait]
pub trait PhaseHandler: Send + Sync {
    /// The phase this handler is bound to.
    fn phase(&self) -> WorkflowPhase;

    /// Run the phase against the current state and return a partial update.
    async fn run(&self, state: &WorkflowState) -> anyhow::Result<StateUpdate>;
}

/// Phase-to-handler binding consulted by the engine.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<WorkflowPhase, Arc<dyn PhaseHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a handler to its phase, replacing any prior binding.
    pub fn with_handler(mut self, handler: Arc<dyn PhaseHandler>) -> Self {
        self.handlers.insert(handler.phase(), handler);
        self
    }

    pub fn get(&self, phase: WorkflowPhase) -> Option<Arc<dyn PhaseHandler>> {
        self.handlers.get(&phase).cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// The full standard binding: all seven workflow phases.
    ///
    /// `platform_base_url` seeds the deep links recorded by setup and
    /// verify; it defaults when the platform endpoint is unconfigured.
    pub fn standard(
        capabilities: Arc<dyn CapabilityRegistry>,
        platform_base_url: Option<String>,
    ) -> Self {
        let base_url = platform_base_url
            .unwrap_or_else(|| setup::DEFAULT_PLATFORM_URL.to_string());

        Self::new()
            .with_handler(Arc::new(InitHandler))
            .with_handler(Arc::new(RepoAnalyzer))
            .with_handler(Arc::new(PatternExtractor))
            .with_handler(Arc::new(TemplateGenerator))
            .with_handler(Arc::new(ApprovalHandler))
            .with_handler(Arc::new(PlatformProvisioner::new(
                capabilities.clone(),
                base_url.clone(),
            )))
            .with_handler(Arc::new(RolloutVerifier::new(capabilities, base_url)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::NullCapabilityRegistry;

    #[test]
    fn test_standard_registry_covers_all_handler_phases() {
        let registry = HandlerRegistry::standard(Arc::new(NullCapabilityRegistry), None);
        for phase in [
            WorkflowPhase::Init,
            WorkflowPhase::Analyze,
            WorkflowPhase::Extract,
            WorkflowPhase::Generate,
            WorkflowPhase::Approval,
            WorkflowPhase::Setup,
            WorkflowPhase::Verify,
        ] {
            assert!(registry.get(phase).is_some(), "missing handler for {phase}");
        }
        assert_eq!(registry.len(), 7);
        assert!(registry.get(WorkflowPhase::Complete).is_none());
        assert!(registry.get(WorkflowPhase::Error).is_none());
    }

    #[test]
    fn test_with_handler_replaces_binding() {
        let registry = HandlerRegistry::new()
            .with_handler(Arc::new(InitHandler))
            .with_handler(Arc::new(InitHandler));
        assert_eq!(registry.len(), 1);
    }
}
