//! Immutable stack definition
//!
//! Produced by [`StackBuilder::build`](crate::construction::StackBuilder::build)
//! once every declaration has been checked. It cannot be modified; the only
//! thing to do with it is inspect it or hand it to a provisioning engine.

use crate::access::IdentitySpec;
use crate::catalog::Resource;
use crate::engine::{Deployment, ProvisioningEngine};
use crate::host::{HostSpec, KeyPairSpec};
use crate::network::{NetworkSpec, TrafficPolicy};
use crate::types::{HostHandle, LogicalId, ResourceHandle};
use indexmap::IndexMap;
use serde::Serialize;

/// Value of a named stack output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "of", content = "target", rename_all = "snake_case")]
pub enum OutputValue {
    /// Physical id of the host, used to open a remote session
    HostId(HostHandle),
    /// Physical name of a table or bucket
    ResourceName(ResourceHandle),
}

/// Named, externally visible value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Output {
    /// What the output resolves to
    pub value: OutputValue,
    /// Operator-facing description
    pub description: String,
}

/// The provisioned host with its id
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostDeclaration {
    /// Logical id
    pub id: LogicalId,
    /// Host spec
    pub spec: HostSpec,
}

/// Validated, immutable whole-stack definition
#[derive(Debug, Clone, Serialize)]
pub struct StackDefinition {
    pub(crate) name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) description: Option<String>,
    pub(crate) resources: IndexMap<LogicalId, Resource>,
    pub(crate) networks: IndexMap<LogicalId, NetworkSpec>,
    pub(crate) security: IndexMap<LogicalId, TrafficPolicy>,
    pub(crate) identities: IndexMap<LogicalId, IdentitySpec>,
    pub(crate) key_pairs: IndexMap<LogicalId, KeyPairSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) host: Option<HostDeclaration>,
    pub(crate) outputs: IndexMap<String, Output>,
    #[serde(skip)]
    pub(crate) fingerprint: String,
}

impl StackDefinition {
    /// Stack name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stack description
    #[inline]
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Declared resources, in declaration order
    #[inline]
    #[must_use]
    pub fn resources(&self) -> &IndexMap<LogicalId, Resource> {
        &self.resources
    }

    /// Look up a resource by handle
    #[must_use]
    pub fn resource(&self, handle: &ResourceHandle) -> Option<&Resource> {
        self.resources
            .get(handle.id())
            .filter(|r| r.kind() == handle.kind())
    }

    /// Declared networks
    #[inline]
    #[must_use]
    pub fn networks(&self) -> &IndexMap<LogicalId, NetworkSpec> {
        &self.networks
    }

    /// Declared traffic policies
    #[inline]
    #[must_use]
    pub fn security(&self) -> &IndexMap<LogicalId, TrafficPolicy> {
        &self.security
    }

    /// Declared identities with their grants
    #[inline]
    #[must_use]
    pub fn identities(&self) -> &IndexMap<LogicalId, IdentitySpec> {
        &self.identities
    }

    /// Declared key pairs
    #[inline]
    #[must_use]
    pub fn key_pairs(&self) -> &IndexMap<LogicalId, KeyPairSpec> {
        &self.key_pairs
    }

    /// The host, if one was provisioned
    #[inline]
    #[must_use]
    pub fn host(&self) -> Option<&HostDeclaration> {
        self.host.as_ref()
    }

    /// Named outputs
    #[inline]
    #[must_use]
    pub fn outputs(&self) -> &IndexMap<String, Output> {
        &self.outputs
    }

    /// Name of the output carrying the host id, if any
    #[must_use]
    pub fn host_output(&self) -> Option<&str> {
        self.outputs
            .iter()
            .find(|(_, o)| matches!(o.value, OutputValue::HostId(_)))
            .map(|(name, _)| name.as_str())
    }

    /// Blake3 digest of the serialized definition (hex)
    #[inline]
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// First 16 hex characters of the fingerprint
    #[inline]
    #[must_use]
    pub fn short_fingerprint(&self) -> &str {
        &self.fingerprint[..16]
    }

    pub(crate) fn compute_fingerprint(&self) -> Result<String, serde_json::Error> {
        let bytes = serde_json::to_vec(self)?;
        Ok(hex::encode(blake3::hash(&bytes).as_bytes()))
    }

    /// Hand the definition to a provisioning engine
    ///
    /// Engine failures are returned exactly as the engine reported them.
    ///
    /// # Errors
    /// Returns the engine's own error type
    pub async fn deploy<E>(&self, engine: &E) -> Result<Deployment, E::Error>
    where
        E: ProvisioningEngine + ?Sized,
    {
        tracing::info!(
            stack = %self.name,
            fingerprint = self.short_fingerprint(),
            engine = engine.name(),
            "deploying stack definition"
        );

        let deployment = engine.deploy(self).await?;

        tracing::info!(
            stack = %self.name,
            outputs = deployment.outputs.len(),
            "deployment finished"
        );
        Ok(deployment)
    }
}
