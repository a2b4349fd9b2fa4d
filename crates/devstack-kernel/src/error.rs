//! Error types for the devstack kernel
//!
//! Provides error handling for:
//! - Malformed or out-of-order declarations (`DefinitionError`)
//! - Configuration loading (`ConfigError`)
//! - Blueprint composition (`BlueprintError`)
//!
//! Definition errors are raised by the builder at declaration time or by
//! `build()`. They never reach a provisioning engine.

use crate::types::{LogicalId, ResourceKind};
use std::path::PathBuf;

/// Malformed or out-of-order stack declarations
#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    /// Stack name breaks the naming rules
    #[error("invalid stack name {0:?}: expected a letter followed by up to 127 letters, digits or hyphens")]
    InvalidStackName(String),

    /// Name is not a valid logical id
    #[error("invalid logical id: {0:?}")]
    InvalidLogicalId(String),

    /// Logical id already used by another declaration
    #[error("duplicate logical id: {0}")]
    DuplicateLogicalId(LogicalId),

    /// Grant or scope references a resource that was never declared
    #[error("{kind} '{id}' referenced before it was declared")]
    UndeclaredResource {
        /// Referenced logical id
        id: LogicalId,
        /// Kind the reference expected
        kind: ResourceKind,
    },

    /// Grant or host references an identity that was never declared
    #[error("identity '{0}' referenced before it was declared")]
    UndeclaredIdentity(LogicalId),

    /// Traffic policy or host references a network that was never declared
    #[error("network '{0}' referenced before it was declared")]
    UndeclaredNetwork(LogicalId),

    /// Host references a traffic policy that was never declared
    #[error("traffic policy '{0}' referenced before it was declared")]
    UndeclaredSecurity(LogicalId),

    /// Host references a key pair that was never declared
    #[error("key pair '{0}' referenced before it was declared")]
    UndeclaredKeyPair(LogicalId),

    /// Output references a host that was never provisioned
    #[error("host '{0}' referenced before it was provisioned")]
    UndeclaredHost(LogicalId),

    /// Traffic policy belongs to a different network than the host
    #[error("traffic policy '{security}' belongs to network '{policy_network}', host is in '{host_network}'")]
    NetworkMismatch {
        /// Traffic policy attached to the host
        security: LogicalId,
        /// Network the traffic policy belongs to
        policy_network: LogicalId,
        /// Network the host is placed in
        host_network: LogicalId,
    },

    /// Physical resource name breaks the service naming rules
    #[error("invalid {kind} name {name:?}: {reason}")]
    InvalidResourceName {
        /// Resource kind whose rules apply
        kind: ResourceKind,
        /// Rejected physical name
        name: String,
        /// Rule that was broken
        reason: &'static str,
    },

    /// Attribute name is empty
    #[error("attribute names must not be empty (resource '{0}')")]
    EmptyAttributeName(LogicalId),

    /// Same attribute declared with two different types
    #[error("attribute '{attribute}' of '{resource}' declared as both {first} and {second}")]
    ConflictingAttributeType {
        /// Table declaring the attribute
        resource: LogicalId,
        /// Attribute name
        attribute: String,
        /// Type code seen first
        first: &'static str,
        /// Conflicting type code
        second: &'static str,
    },

    /// Projection includes an attribute the resource does not have
    #[error("secondary pattern '{pattern}' of '{resource}' projects unknown attribute '{attribute}'")]
    UnknownProjectedAttribute {
        /// Table owning the pattern
        resource: LogicalId,
        /// Secondary pattern name
        pattern: String,
        /// Attribute that is not declared
        attribute: String,
    },

    /// Include projection with no attributes
    #[error("secondary pattern '{pattern}' of '{resource}' has an empty include list")]
    EmptyProjection {
        /// Table owning the pattern
        resource: LogicalId,
        /// Secondary pattern name
        pattern: String,
    },

    /// Two secondary patterns share a name
    #[error("duplicate secondary pattern '{pattern}' on '{resource}'")]
    DuplicateSecondaryPattern {
        /// Table owning the patterns
        resource: LogicalId,
        /// Repeated pattern name
        pattern: String,
    },

    /// Provisioned throughput must be positive
    #[error("provisioned capacity of '{0}' must be at least 1")]
    InvalidCapacity(LogicalId),

    /// Network must span at least one zone
    #[error("zone count must be at least 1, got {0}")]
    InvalidZoneCount(u8),

    /// CIDR block is malformed or does not fit
    #[error("invalid cidr {cidr:?}: {reason}")]
    InvalidCidr {
        /// Rejected block
        cidr: String,
        /// What is wrong with it
        reason: &'static str,
    },

    /// Port range is inverted
    #[error("invalid port range {from}-{to}")]
    InvalidPortRange {
        /// First port
        from: u16,
        /// Last port
        to: u16,
    },

    /// Action list is empty
    #[error("policy '{0}' grants no actions")]
    EmptyActions(String),

    /// Scope list is empty
    #[error("policy '{0}' has no resource scope")]
    EmptyScopes(String),

    /// Action is not of the form `service:Action`
    #[error("malformed action {0:?}")]
    MalformedAction(String),

    /// Wildcard action outside the named unscoped exception
    #[error("wildcard action {action:?} in policy '{policy}'; use grant_unscoped for unscoped capabilities")]
    WildcardAction {
        /// Grant carrying the action
        policy: String,
        /// Offending action
        action: String,
    },

    /// Scope covers a resource but not its secondary-pattern sub-scope
    #[error("policy '{policy}' covers '{resource}' without its secondary pattern scope")]
    MissingSecondaryScope {
        /// Grant being checked
        policy: String,
        /// Table with secondary patterns
        resource: LogicalId,
    },

    /// Sub-scope listed without the base resource it narrows
    #[error("policy '{policy}' covers '{resource}{scope}' without '{resource}' itself")]
    SubScopeWithoutBase {
        /// Grant being checked
        policy: String,
        /// Resource the sub-scope belongs to
        resource: LogicalId,
        /// Sub-scope path suffix
        scope: &'static str,
    },

    /// Sub-scope does not exist on the resource it names
    #[error("policy '{policy}' scopes '{resource}{scope}', which a {kind} of that shape does not have")]
    ScopeKindMismatch {
        /// Grant being checked
        policy: String,
        /// Resource the sub-scope names
        resource: LogicalId,
        /// Declared kind of that resource
        kind: ResourceKind,
        /// Sub-scope path suffix
        scope: &'static str,
    },

    /// Policy name already used on the identity
    #[error("duplicate policy '{policy}' on identity '{identity}'")]
    DuplicatePolicy {
        /// Identity owning the policies
        identity: LogicalId,
        /// Repeated policy name
        policy: String,
    },

    /// Unscoped grant without a reason
    #[error("unscoped grant '{0}' must state a reason")]
    MissingJustification(String),

    /// Boot script exceeds the user-data limit
    #[error("boot script is {size} bytes, limit is {limit}")]
    UserDataTooLarge {
        /// Script size in bytes
        size: usize,
        /// Maximum accepted size in bytes
        limit: usize,
    },

    /// Second host in a single-host stack
    #[error("host '{0}' already provisioned; a stack holds one host")]
    HostAlreadyProvisioned(LogicalId),

    /// Output name reused
    #[error("duplicate output '{0}'")]
    DuplicateOutput(String),

    /// Definition could not be serialized for fingerprinting
    #[error("definition serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DefinitionError {
    /// Create invalid cidr error
    pub fn invalid_cidr(cidr: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidCidr {
            cidr: cidr.into(),
            reason,
        }
    }

    /// Check whether this is a definition-order error
    #[inline]
    #[must_use]
    pub fn is_ordering(&self) -> bool {
        matches!(
            self,
            Self::UndeclaredResource { .. }
                | Self::UndeclaredIdentity(_)
                | Self::UndeclaredNetwork(_)
                | Self::UndeclaredSecurity(_)
                | Self::UndeclaredKeyPair(_)
                | Self::UndeclaredHost(_)
        )
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("io error reading {}: {source}", .path.display())]
    Io {
        /// Config file path
        path: PathBuf,
        /// Underlying failure
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for the schema
    #[error("invalid config {}: {source}", .path.display())]
    Parse {
        /// Config file path
        path: PathBuf,
        /// Parser diagnostic
        #[source]
        source: toml::de::Error,
    },

    /// Value is syntactically fine but unusable
    #[error("invalid config value for {field}: {reason}")]
    InvalidValue {
        /// Dotted config key
        field: &'static str,
        /// Why the value is unusable
        reason: String,
    },
}

/// Errors composing the environment blueprint
#[derive(Debug, thiserror::Error)]
pub enum BlueprintError {
    /// Boot script assembly failed
    #[error("bootstrap assembly failed: {0}")]
    Assembly(#[from] devstack_bootstrap::AssemblyError),

    /// Stack declarations were rejected
    #[error(transparent)]
    Definition(#[from] DefinitionError),
}
