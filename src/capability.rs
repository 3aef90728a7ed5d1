//! Named-capability lookup for phase handlers.
//!
//! Handlers ask for capabilities by name (repository scaffolding, content
//! aggregation, delivery platform, source hosting) and get back the set of
//! operations each backend offers. An unreachable or unconfigured backend
//! degrades to an absent capability rather than an error, so handlers can
//! fall back to placeholder behavior. Asking for a name the registry has
//! never heard of is an error.
//!
//! Two implementations exist, selected by availability at startup via
//! [`select_registry`]: the HTTP-probing `PlatformCapabilityRegistry`, and
//! the always-empty `NullCapabilityRegistry`.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Settings;
use crate::errors::CapabilityError;

/// Capability names the registry understands.
pub const SUPPORTED: &[&str] = &["scaffold", "aggregate", "platform", "source-host"];

/// One invocable operation offered by a capability backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub name: String,
    pub description: String,
}

impl Operation {
    fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
        }
    }
}

/// A resolved capability: a backend name plus its operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capability {
    pub name: String,
    pub operations: Vec<Operation>,
}

/// Lookup of capabilities by name.
#[async_trait]
pub trait CapabilityRegistry: Send + Sync {
    /// Resolve the named capabilities that are currently reachable.
    ///
    /// Unreachable backends are silently absent from the result; unknown
    /// names fail with [`CapabilityError::UnknownCapability`].
    async fn resolve(&self, names: &[&str]) -> Result<Vec<Capability>, CapabilityError>;
}

fn check_supported(name: &str) -> Result<(), CapabilityError> {
    if SUPPORTED.contains(&name) {
        Ok(())
    } else {
        Err(CapabilityError::UnknownCapability {
            name: name.to_string(),
            supported: SUPPORTED.to_vec(),
        })
    }
}

/// The operations each backend offers once reachable.
fn operations_for(name: &str) -> Vec<Operation> {
    match name {
        "scaffold" => vec![
            Operation::new("list_structure", "List the repository tree"),
            Operation::new("read_manifests", "Read build and package manifests"),
        ],
        "aggregate" => vec![Operation::new(
            "bundle_content",
            "Aggregate repository content into a single document",
        )],
        "platform" => vec![
            Operation::new("create_connector", "Create a platform connector"),
            Operation::new("create_secret", "Create a platform secret"),
            Operation::new("create_environment", "Create a deployment environment"),
            Operation::new("create_service", "Create a service definition"),
            Operation::new("create_infrastructure", "Create an infrastructure definition"),
            Operation::new("create_pipeline", "Create a pipeline from YAML"),
            Operation::new("trigger_execution", "Trigger a pipeline execution"),
            Operation::new("get_execution", "Fetch a pipeline execution"),
        ],
        "source-host" => vec![Operation::new(
            "fetch_metadata",
            "Fetch repository metadata from the source host",
        )],
        _ => Vec::new(),
    }
}

/// Registry backed by the delivery platform API.
///
/// Every resolve probes the platform's health endpoint; a failed probe
/// degrades all backends to absent rather than failing the caller.
pub struct PlatformCapabilityRegistry {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl PlatformCapabilityRegistry {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self, CapabilityError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| CapabilityError::Other(e.into()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn backend_reachable(&self) -> bool {
        let mut request = self.client.get(format!("{}/health", self.base_url));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        match request.send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::warn!(base_url = %self.base_url, error = %e, "capability backend unreachable");
                false
            }
        }
    }
}

#[async_trait]
impl CapabilityRegistry for PlatformCapabilityRegistry {
    async fn resolve(&self, names: &[&str]) -> Result<Vec<Capability>, CapabilityError> {
        for &name in names {
            check_supported(name)?;
        }

        if !self.backend_reachable().await {
            return Ok(Vec::new());
        }

        Ok(names
            .iter()
            .map(|&name| Capability {
                name: name.to_string(),
                operations: operations_for(name),
            })
            .collect())
    }
}

/// Registry used when no platform endpoint is configured: everything known,
/// nothing reachable.
#[derive(Debug, Default)]
pub struct NullCapabilityRegistry;

#[async_trait]
impl CapabilityRegistry for NullCapabilityRegistry {
    async fn resolve(&self, names: &[&str]) -> Result<Vec<Capability>, CapabilityError> {
        for &name in names {
            check_supported(name)?;
        }
        Ok(Vec::new())
    }
}

/// Pick the registry for the current settings.
///
/// A configured platform endpoint selects the HTTP registry; anything else,
/// including a client that cannot be constructed, falls back to the null
/// registry.
pub fn select_registry(settings: &Settings) -> Arc<dyn CapabilityRegistry> {
    match &settings.platform_api_url {
        Some(url) => match PlatformCapabilityRegistry::new(url, settings.platform_api_key.clone())
        {
            Ok(registry) => Arc::new(registry),
            Err(e) => {
                tracing::warn!(error = %e, "falling back to the null capability registry");
                Arc::new(NullCapabilityRegistry)
            }
        },
        None => Arc::new(NullCapabilityRegistry),
    }
}
