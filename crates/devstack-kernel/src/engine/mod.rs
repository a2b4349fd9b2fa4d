//! Provisioning engines
//!
//! The engine is the external collaborator that turns a [`StackDefinition`]
//! into live infrastructure. It is consumed through one call: hand over the
//! immutable definition, receive the resolved outputs. Retries, rollback and
//! quota handling belong to the engine.

pub mod synth;

use crate::definition::StackDefinition;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Serialize;

pub use synth::{SynthError, TemplateSynthesizer};

/// Turns a validated definition into infrastructure
#[async_trait]
pub trait ProvisioningEngine: Send + Sync {
    /// Engine failure, passed through to callers unchanged
    type Error: std::error::Error + Send + Sync + 'static;

    /// Short engine name for logs
    fn name(&self) -> &'static str;

    /// Create or update everything in the definition
    async fn deploy(&self, definition: &StackDefinition) -> Result<Deployment, Self::Error>;
}

/// Result of a deployment: the named outputs as the engine resolved them
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deployment {
    /// Stack name
    pub stack_name: String,
    /// Output name to resolved value
    pub outputs: IndexMap<String, String>,
    host_output: Option<String>,
}

impl Deployment {
    /// Deployment of `definition` with resolved `outputs`
    #[must_use]
    pub fn new(definition: &StackDefinition, outputs: IndexMap<String, String>) -> Self {
        Self {
            stack_name: definition.name().to_string(),
            outputs,
            host_output: definition.host_output().map(str::to_string),
        }
    }

    /// Resolved value of an output
    #[must_use]
    pub fn output(&self, name: &str) -> Option<&str> {
        self.outputs.get(name).map(String::as_str)
    }

    /// Identifier an operator uses to open a session on the host
    #[must_use]
    pub fn host_id(&self) -> Option<&str> {
        self.host_output.as_deref().and_then(|name| self.output(name))
    }
}
