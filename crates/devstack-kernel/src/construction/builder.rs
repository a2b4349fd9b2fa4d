//! Stack builder
//!
//! The primary interface for the construction phase.

use crate::access::{Action, Grant, IdentitySpec, ResourceScope, UnscopedGrant};
use crate::catalog::{BucketSpec, KeySchema, Resource, SecondaryPattern, TableSpec};
use crate::definition::{HostDeclaration, Output, OutputValue, StackDefinition};
use crate::error::DefinitionError;
use crate::host::{HostSpec, KeyPairSpec};
use crate::network::{IngressRule, NetworkSpec, SubnetVisibility, TrafficPolicy};
use crate::types::{
    HostHandle, IdentityHandle, KeyPairHandle, LogicalId, NetworkHandle, ResourceHandle,
    ResourceKind, SecurityHandle,
};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static STACK_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9-]{0,127}$").expect("static regex"));

/// Builder for a single-host stack
///
/// Usage:
/// ```rust,ignore
/// let mut stack = StackBuilder::new("DevHostStack");
/// let table = stack.declare_table("ChatTable", spec)?;
/// let role = stack.create_identity("HostRole", "ec2.amazonaws.com", ["AmazonSSMManagedInstanceCore"])?;
/// let scopes = stack.scopes_for(&table)?;
/// stack.grant(&role, "DataPolicy", actions(["dynamodb:GetItem"])?, scopes)?;
/// let definition = stack.build()?;
/// ```
#[derive(Debug)]
pub struct StackBuilder {
    name: String,
    description: Option<String>,
    claimed: HashSet<LogicalId>,
    resources: IndexMap<LogicalId, Resource>,
    networks: IndexMap<LogicalId, NetworkSpec>,
    security: IndexMap<LogicalId, TrafficPolicy>,
    identities: IndexMap<LogicalId, IdentitySpec>,
    key_pairs: IndexMap<LogicalId, KeyPairSpec>,
    host: Option<HostDeclaration>,
    outputs: IndexMap<String, Output>,
}

impl StackBuilder {
    /// Create an empty stack
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            claimed: HashSet::new(),
            resources: IndexMap::new(),
            networks: IndexMap::new(),
            security: IndexMap::new(),
            identities: IndexMap::new(),
            key_pairs: IndexMap::new(),
            host: None,
            outputs: IndexMap::new(),
        }
    }

    /// With stack description
    #[inline]
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Stack name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of logical ids claimed so far
    #[inline]
    #[must_use]
    pub fn declaration_count(&self) -> usize {
        self.claimed.len()
    }

    /// Parse an id and fail if it is already taken
    fn check_free(&self, id: &str) -> Result<LogicalId, DefinitionError> {
        let id = LogicalId::new(id)?;
        if self.claimed.contains(&id) {
            return Err(DefinitionError::DuplicateLogicalId(id));
        }
        Ok(id)
    }

    fn claim(&mut self, id: &LogicalId) {
        self.claimed.insert(id.clone());
    }

    // ========================================================================
    // Resource catalog
    // ========================================================================

    /// Declare a table
    ///
    /// # Errors
    /// Returns the first naming, key or projection problem of the table, or
    /// `DuplicateLogicalId`
    pub fn declare_table(&mut self, id: &str, spec: TableSpec) -> Result<ResourceHandle, DefinitionError> {
        let id = self.check_free(id)?;
        spec.validate(&id)?;

        tracing::debug!(
            id = %id,
            table = %spec.table_name,
            secondary = spec.secondary.len(),
            "declared table"
        );
        self.claim(&id);
        self.resources.insert(id.clone(), Resource::Table(spec));
        Ok(ResourceHandle::new(id, ResourceKind::Table))
    }

    /// Declare a table from its key schema and secondary patterns
    ///
    /// # Errors
    /// See [`declare_table`](Self::declare_table)
    pub fn declare_resource(
        &mut self,
        id: &str,
        table_name: &str,
        key: KeySchema,
        secondary: Vec<SecondaryPattern>,
    ) -> Result<ResourceHandle, DefinitionError> {
        let spec = secondary
            .into_iter()
            .fold(TableSpec::new(table_name, key), TableSpec::with_secondary);
        self.declare_table(id, spec)
    }

    /// Declare an object store bucket
    ///
    /// # Errors
    /// Returns `InvalidResourceName` or `DuplicateLogicalId`
    pub fn declare_bucket(&mut self, id: &str, spec: BucketSpec) -> Result<ResourceHandle, DefinitionError> {
        let id = self.check_free(id)?;
        spec.validate()?;

        tracing::debug!(id = %id, bucket = %spec.bucket_name, "declared bucket");
        self.claim(&id);
        self.resources.insert(id.clone(), Resource::Bucket(spec));
        Ok(ResourceHandle::new(id, ResourceKind::Bucket))
    }

    fn lookup(&self, handle: &ResourceHandle) -> Result<&Resource, DefinitionError> {
        self.resources
            .get(handle.id())
            .filter(|r| r.kind() == handle.kind())
            .ok_or_else(|| DefinitionError::UndeclaredResource {
                id: handle.id().clone(),
                kind: handle.kind(),
            })
    }

    // ========================================================================
    // Network boundary
    // ========================================================================

    /// Declare a network spanning `zone_count` zones with default addressing
    ///
    /// # Errors
    /// Returns `InvalidZoneCount` or `DuplicateLogicalId`
    pub fn declare_network(
        &mut self,
        id: &str,
        zone_count: u8,
        visibility: SubnetVisibility,
    ) -> Result<NetworkHandle, DefinitionError> {
        self.declare_network_spec(id, NetworkSpec::new(zone_count, visibility))
    }

    /// Declare a network with explicit addressing
    ///
    /// # Errors
    /// Returns `InvalidZoneCount`, `InvalidCidr` or `DuplicateLogicalId`
    pub fn declare_network_spec(&mut self, id: &str, spec: NetworkSpec) -> Result<NetworkHandle, DefinitionError> {
        let id = self.check_free(id)?;
        spec.validate()?;

        tracing::debug!(id = %id, zones = spec.zone_count, cidr = %spec.cidr, "declared network");
        self.claim(&id);
        self.networks.insert(id.clone(), spec);
        Ok(NetworkHandle::new(id))
    }

    /// Declare the traffic policy of a network
    ///
    /// # Errors
    /// Returns `UndeclaredNetwork`, `InvalidPortRange` or `DuplicateLogicalId`
    pub fn declare_traffic_policy(
        &mut self,
        id: &str,
        network: &NetworkHandle,
        description: impl Into<String>,
        inbound: Vec<IngressRule>,
        outbound_allow_all: bool,
    ) -> Result<SecurityHandle, DefinitionError> {
        let id = self.check_free(id)?;
        if !self.networks.contains_key(network.id()) {
            return Err(DefinitionError::UndeclaredNetwork(network.id().clone()));
        }
        let policy = TrafficPolicy {
            network: network.clone(),
            description: description.into(),
            inbound,
            outbound_allow_all,
        };
        policy.validate()?;

        tracing::debug!(
            id = %id,
            network = %network,
            inbound = policy.inbound.len(),
            outbound_allow_all,
            "declared traffic policy"
        );
        self.claim(&id);
        self.security.insert(id.clone(), policy);
        Ok(SecurityHandle::new(id))
    }

    // ========================================================================
    // Identity & access
    // ========================================================================

    /// Create the execution identity assumed by `trust_principal`
    ///
    /// # Errors
    /// Returns `DuplicateLogicalId` or `InvalidLogicalId`
    pub fn create_identity<I, S>(
        &mut self,
        id: &str,
        trust_principal: &str,
        managed_permissions: I,
    ) -> Result<IdentityHandle, DefinitionError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = self.check_free(id)?;
        let spec = IdentitySpec::new(trust_principal, managed_permissions);

        tracing::debug!(
            id = %id,
            principal = trust_principal,
            managed = spec.managed_permissions.len(),
            "created identity"
        );
        self.claim(&id);
        self.identities.insert(id.clone(), spec);
        Ok(IdentityHandle::new(id))
    }

    /// Every scope needed to cover a declared resource
    ///
    /// Tables with secondary patterns include `index/*`; buckets include
    /// their objects.
    ///
    /// # Errors
    /// Returns `UndeclaredResource`
    pub fn scopes_for(&self, handle: &ResourceHandle) -> Result<Vec<ResourceScope>, DefinitionError> {
        let resource = self.lookup(handle)?;
        Ok(ResourceScope::covering(handle, resource))
    }

    fn identity_mut(&mut self, identity: &IdentityHandle) -> Result<&mut IdentitySpec, DefinitionError> {
        self.identities
            .get_mut(identity.id())
            .ok_or_else(|| DefinitionError::UndeclaredIdentity(identity.id().clone()))
    }

    /// Check the policy name is free on the identity and in the stack
    fn check_policy(&self, identity: &IdentityHandle, policy: &str) -> Result<LogicalId, DefinitionError> {
        let spec = self
            .identities
            .get(identity.id())
            .ok_or_else(|| DefinitionError::UndeclaredIdentity(identity.id().clone()))?;
        let name = LogicalId::new(policy)?;
        if spec.has_policy(&name) {
            return Err(DefinitionError::DuplicatePolicy {
                identity: identity.id().clone(),
                policy: policy.to_string(),
            });
        }
        self.check_free(policy)
    }

    /// Add a named policy granting `actions` on `scopes`
    ///
    /// Grants are additive; one call per capability group.
    ///
    /// # Errors
    /// - `UndeclaredIdentity` / `UndeclaredResource`
    /// - `WildcardAction`, `EmptyActions`, `EmptyScopes`
    /// - `MissingSecondaryScope` when a table with secondary patterns is
    ///   covered without `index/*`
    /// - `DuplicatePolicy` / `DuplicateLogicalId`
    pub fn grant(
        &mut self,
        identity: &IdentityHandle,
        policy: &str,
        actions: Vec<Action>,
        scopes: Vec<ResourceScope>,
    ) -> Result<(), DefinitionError> {
        let policy = self.check_policy(identity, policy)?;
        let grant = Grant {
            policy,
            actions,
            scopes,
        };
        grant.validate(|h| self.lookup(h).ok())?;

        tracing::debug!(
            identity = %identity,
            policy = %grant.policy,
            actions = grant.actions.len(),
            scopes = grant.scopes.len(),
            "granted"
        );
        self.claim(&grant.policy);
        self.identity_mut(identity)?.grants.push(grant);
        Ok(())
    }

    /// Add a named policy granting every action of `service` on every
    /// resource
    ///
    /// The only way to express a wildcard; recorded apart from scoped grants.
    ///
    /// # Errors
    /// - `UndeclaredIdentity`
    /// - `MalformedAction` for a bad service prefix
    /// - `MissingJustification` for a blank reason
    /// - `DuplicatePolicy` / `DuplicateLogicalId`
    pub fn grant_unscoped(
        &mut self,
        identity: &IdentityHandle,
        policy: &str,
        service: &str,
        reason: &str,
    ) -> Result<(), DefinitionError> {
        let policy = self.check_policy(identity, policy)?;
        let grant = UnscopedGrant {
            policy,
            service: service.to_string(),
            reason: reason.to_string(),
        };
        grant.validate()?;

        tracing::warn!(
            identity = %identity,
            policy = %grant.policy,
            action = %grant.action(),
            reason,
            "unscoped grant"
        );
        self.claim(&grant.policy);
        self.identity_mut(identity)?.unscoped.push(grant);
        Ok(())
    }

    // ========================================================================
    // Host
    // ========================================================================

    /// Declare an SSH key pair
    ///
    /// # Errors
    /// Returns `DuplicateLogicalId` or `InvalidLogicalId`
    pub fn declare_key_pair(&mut self, id: &str, spec: KeyPairSpec) -> Result<KeyPairHandle, DefinitionError> {
        let id = self.check_free(id)?;
        tracing::debug!(id = %id, key_type = ?spec.key_type, "declared key pair");
        self.claim(&id);
        self.key_pairs.insert(id.clone(), spec);
        Ok(KeyPairHandle::new(id))
    }

    /// Provision the single compute host
    ///
    /// # Errors
    /// - `HostAlreadyProvisioned`
    /// - `UndeclaredNetwork` / `UndeclaredSecurity` / `UndeclaredIdentity` /
    ///   `UndeclaredKeyPair`
    /// - `NetworkMismatch` when the traffic policy belongs to another network
    pub fn provision(&mut self, id: &str, spec: HostSpec) -> Result<HostHandle, DefinitionError> {
        if let Some(existing) = &self.host {
            return Err(DefinitionError::HostAlreadyProvisioned(existing.id.clone()));
        }
        let id = self.check_free(id)?;

        if !self.networks.contains_key(spec.network.id()) {
            return Err(DefinitionError::UndeclaredNetwork(spec.network.id().clone()));
        }
        let policy = self
            .security
            .get(spec.security.id())
            .ok_or_else(|| DefinitionError::UndeclaredSecurity(spec.security.id().clone()))?;
        if policy.network != spec.network {
            return Err(DefinitionError::NetworkMismatch {
                security: spec.security.id().clone(),
                policy_network: policy.network.id().clone(),
                host_network: spec.network.id().clone(),
            });
        }
        if !self.identities.contains_key(spec.identity.id()) {
            return Err(DefinitionError::UndeclaredIdentity(spec.identity.id().clone()));
        }
        if let Some(key) = &spec.key_pair {
            if !self.key_pairs.contains_key(key.id()) {
                return Err(DefinitionError::UndeclaredKeyPair(key.id().clone()));
            }
        }

        tracing::debug!(
            id = %id,
            instance_type = %spec.instance_type,
            boot_script_bytes = spec.boot_script.len(),
            "provisioned host"
        );
        self.claim(&id);
        self.host = Some(HostDeclaration {
            id: id.clone(),
            spec,
        });
        Ok(HostHandle::new(id))
    }

    // ========================================================================
    // Outputs
    // ========================================================================

    /// Publish a named output
    ///
    /// # Errors
    /// Returns `InvalidLogicalId` for a bad name, `DuplicateOutput`,
    /// `UndeclaredHost` or `UndeclaredResource`
    pub fn output(
        &mut self,
        name: &str,
        value: OutputValue,
        description: impl Into<String>,
    ) -> Result<(), DefinitionError> {
        LogicalId::new(name)?;
        if self.outputs.contains_key(name) {
            return Err(DefinitionError::DuplicateOutput(name.to_string()));
        }
        match &value {
            OutputValue::HostId(h) => {
                if self.host.as_ref().map(|d| &d.id) != Some(h.id()) {
                    return Err(DefinitionError::UndeclaredHost(h.id().clone()));
                }
            }
            OutputValue::ResourceName(r) => {
                self.lookup(r)?;
            }
        }

        self.outputs.insert(
            name.to_string(),
            Output {
                value,
                description: description.into(),
            },
        );
        Ok(())
    }

    // ========================================================================
    // Build
    // ========================================================================

    /// Seal the declarations into an immutable definition
    ///
    /// # Errors
    /// Returns `InvalidStackName` or `Serialization`
    pub fn build(self) -> Result<StackDefinition, DefinitionError> {
        if !STACK_NAME.is_match(&self.name) {
            return Err(DefinitionError::InvalidStackName(self.name));
        }

        let mut definition = StackDefinition {
            name: self.name,
            description: self.description,
            resources: self.resources,
            networks: self.networks,
            security: self.security,
            identities: self.identities,
            key_pairs: self.key_pairs,
            host: self.host,
            outputs: self.outputs,
            fingerprint: String::new(),
        };
        definition.fingerprint = definition.compute_fingerprint()?;

        tracing::info!(
            stack = %definition.name,
            resources = definition.resources.len(),
            identities = definition.identities.len(),
            host = definition.host.is_some(),
            fingerprint = definition.short_fingerprint(),
            "stack definition built"
        );
        Ok(definition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::actions;
    use crate::catalog::{KeyAttribute, Projection};
    use crate::host::BootScript;
    use crate::network::Cidr;

    fn indexed_table() -> TableSpec {
        TableSpec::new(
            "ChatData",
            KeySchema::composite(KeyAttribute::string("PK"), KeyAttribute::string("SK")),
        )
        .with_secondary(SecondaryPattern::new(
            "ByUser",
            KeySchema::composite(KeyAttribute::string("UserPK"), KeyAttribute::string("UserSK")),
            Projection::KeysOnly,
        ))
    }

    fn host_ready() -> (StackBuilder, NetworkHandle, SecurityHandle, IdentityHandle) {
        let mut builder = StackBuilder::new("TestStack");
        let net = builder.declare_network("Vpc", 2, SubnetVisibility::Public).unwrap();
        let sg = builder
            .declare_traffic_policy("Sg", &net, "test", vec![], true)
            .unwrap();
        let role = builder
            .create_identity("Role", "ec2.amazonaws.com", ["AmazonSSMManagedInstanceCore"])
            .unwrap();
        (builder, net, sg, role)
    }

    fn boot() -> BootScript {
        BootScript::for_linux("echo hi").unwrap()
    }

    #[test]
    fn test_declare_returns_handles() {
        let mut builder = StackBuilder::new("TestStack");
        let table = builder.declare_table("Chat", indexed_table()).unwrap();
        assert_eq!(table.kind(), ResourceKind::Table);
        assert_eq!(table.id().as_str(), "Chat");
        assert_eq!(builder.declaration_count(), 1);
    }

    #[test]
    fn test_duplicate_logical_id_rejected() {
        let mut builder = StackBuilder::new("TestStack");
        builder.declare_table("Chat", indexed_table()).unwrap();
        let err = builder
            .declare_bucket("Chat", BucketSpec::new("chat-bucket"))
            .unwrap_err();
        assert!(matches!(err, DefinitionError::DuplicateLogicalId(_)));
    }

    #[test]
    fn test_declare_resource_with_patterns() {
        let mut builder = StackBuilder::new("TestStack");
        let handle = builder
            .declare_resource(
                "Chat",
                "ChatData",
                KeySchema::partition(KeyAttribute::string("PK")),
                vec![SecondaryPattern::new(
                    "ByUser",
                    KeySchema::partition(KeyAttribute::string("UserPK")),
                    Projection::All,
                )],
            )
            .unwrap();
        let scopes = builder.scopes_for(&handle).unwrap();
        assert_eq!(scopes.len(), 2);
        assert_eq!(scopes[1].suffix(), Some("/index/*"));
    }

    #[test]
    fn test_grant_on_undeclared_resource_fails_immediately() {
        let (mut builder, _, _, role) = host_ready();
        let ghost = ResourceHandle::new(LogicalId::new("Ghost").unwrap(), ResourceKind::Table);
        let err = builder
            .grant(
                &role,
                "GhostPolicy",
                actions(["dynamodb:GetItem"]).unwrap(),
                vec![ResourceScope::Resource(ghost)],
            )
            .unwrap_err();
        assert!(err.is_ordering());
        // A failed grant does not consume the policy name
        assert!(builder.check_free("GhostPolicy").is_ok());
    }

    #[test]
    fn test_grant_rejects_index_scope_without_table() {
        let (mut builder, _, _, role) = host_ready();
        let chat = builder.declare_table("Chat", indexed_table()).unwrap();

        let err = builder
            .grant(
                &role,
                "P1",
                actions(["dynamodb:Query"]).unwrap(),
                vec![ResourceScope::SecondaryPatterns(chat.clone())],
            )
            .unwrap_err();
        assert!(matches!(
            err,
            DefinitionError::SubScopeWithoutBase { ref resource, .. } if resource.as_str() == "Chat"
        ));
        assert!(builder.check_free("P1").is_ok());

        let scopes = builder.scopes_for(&chat).unwrap();
        builder
            .grant(&role, "P1", actions(["dynamodb:Query"]).unwrap(), scopes)
            .unwrap();
    }

    #[test]
    fn test_grant_rejects_scope_kind_mismatch() {
        let (mut builder, _, _, role) = host_ready();
        let chat = builder.declare_table("Chat", indexed_table()).unwrap();
        let plain = builder
            .declare_table(
                "Plain",
                TableSpec::new("PlainData", KeySchema::partition(KeyAttribute::string("PK"))),
            )
            .unwrap();
        let store = builder
            .declare_bucket("Store", BucketSpec::new("store-bucket"))
            .unwrap();
        let read = || actions(["dynamodb:GetItem"]).unwrap();

        let cases = [
            vec![
                ResourceScope::Resource(chat.clone()),
                ResourceScope::SecondaryPatterns(chat.clone()),
                ResourceScope::Objects(chat),
            ],
            vec![
                ResourceScope::Resource(plain.clone()),
                ResourceScope::SecondaryPatterns(plain),
            ],
            vec![
                ResourceScope::Resource(store.clone()),
                ResourceScope::SecondaryPatterns(store),
            ],
        ];
        for scopes in cases {
            let err = builder.grant(&role, "P", read(), scopes).unwrap_err();
            assert!(matches!(err, DefinitionError::ScopeKindMismatch { .. }), "{err}");
        }
    }

    #[test]
    fn test_grant_on_undeclared_identity() {
        let mut builder = StackBuilder::new("TestStack");
        let table = builder.declare_table("Chat", indexed_table()).unwrap();
        let scopes = builder.scopes_for(&table).unwrap();
        let nobody = IdentityHandle::new(LogicalId::new("Nobody").unwrap());
        let err = builder
            .grant(&nobody, "P", actions(["dynamodb:GetItem"]).unwrap(), scopes)
            .unwrap_err();
        assert!(matches!(err, DefinitionError::UndeclaredIdentity(_)));
    }

    #[test]
    fn test_handle_kind_must_match() {
        let mut builder = StackBuilder::new("TestStack");
        builder.declare_table("Chat", indexed_table()).unwrap();
        let as_bucket = ResourceHandle::new(LogicalId::new("Chat").unwrap(), ResourceKind::Bucket);
        assert!(builder.scopes_for(&as_bucket).is_err());
    }

    #[test]
    fn test_grants_are_additive() {
        let (mut builder, _, _, role) = host_ready();
        let table = builder.declare_table("Chat", indexed_table()).unwrap();
        let bucket = builder
            .declare_bucket("Store", BucketSpec::new("store-bucket"))
            .unwrap();

        let scopes = builder.scopes_for(&table).unwrap();
        builder
            .grant(&role, "DataPolicy", actions(["dynamodb:Query"]).unwrap(), scopes)
            .unwrap();
        let scopes = builder.scopes_for(&bucket).unwrap();
        builder
            .grant(&role, "StorePolicy", actions(["s3:GetObject"]).unwrap(), scopes)
            .unwrap();

        let def = builder.build().unwrap();
        let identity = &def.identities()[&LogicalId::new("Role").unwrap()];
        let names: Vec<&str> = identity.policy_names().map(LogicalId::as_str).collect();
        assert_eq!(names, vec!["DataPolicy", "StorePolicy"]);
    }

    #[test]
    fn test_duplicate_policy_name() {
        let (mut builder, _, _, role) = host_ready();
        builder
            .grant_unscoped(&role, "ModelPolicy", "bedrock", "model ids are chosen at runtime")
            .unwrap();
        let err = builder
            .grant_unscoped(&role, "ModelPolicy", "bedrock", "again")
            .unwrap_err();
        assert!(matches!(err, DefinitionError::DuplicatePolicy { .. }));
    }

    #[test]
    fn test_traffic_policy_needs_network() {
        let mut builder = StackBuilder::new("TestStack");
        let net = NetworkHandle::new(LogicalId::new("Missing").unwrap());
        let err = builder
            .declare_traffic_policy("Sg", &net, "test", vec![], true)
            .unwrap_err();
        assert!(matches!(err, DefinitionError::UndeclaredNetwork(_)));
    }

    #[test]
    fn test_provision_single_host() {
        let (mut builder, net, sg, role) = host_ready();
        let host = builder
            .provision("Host", HostSpec::new(net.clone(), sg.clone(), role.clone(), boot()))
            .unwrap();
        assert_eq!(host.id().as_str(), "Host");

        let err = builder
            .provision("Host2", HostSpec::new(net, sg, role, boot()))
            .unwrap_err();
        assert!(matches!(err, DefinitionError::HostAlreadyProvisioned(_)));
    }

    #[test]
    fn test_provision_network_mismatch() {
        let (mut builder, _, sg, role) = host_ready();
        let other = builder
            .declare_network_spec(
                "Other",
                NetworkSpec::new(1, SubnetVisibility::Isolated)
                    .with_cidr(Cidr::new("10.1.0.0".parse().unwrap(), 16).unwrap()),
            )
            .unwrap();
        let err = builder
            .provision("Host", HostSpec::new(other, sg, role, boot()))
            .unwrap_err();
        assert!(matches!(err, DefinitionError::NetworkMismatch { .. }));
    }

    #[test]
    fn test_provision_undeclared_key_pair() {
        let (mut builder, net, sg, role) = host_ready();
        let key = KeyPairHandle::new(LogicalId::new("Key").unwrap());
        let err = builder
            .provision("Host", HostSpec::new(net, sg, role, boot()).with_key_pair(key))
            .unwrap_err();
        assert!(matches!(err, DefinitionError::UndeclaredKeyPair(_)));
    }

    #[test]
    fn test_outputs() {
        let (mut builder, net, sg, role) = host_ready();
        let stray = HostHandle::new(LogicalId::new("Host").unwrap());
        assert!(matches!(
            builder.output("InstanceId", OutputValue::HostId(stray), "id"),
            Err(DefinitionError::UndeclaredHost(_))
        ));

        let host = builder
            .provision("Host", HostSpec::new(net, sg, role, boot()))
            .unwrap();
        builder
            .output("InstanceId", OutputValue::HostId(host.clone()), "id")
            .unwrap();
        assert!(matches!(
            builder.output("InstanceId", OutputValue::HostId(host), "id"),
            Err(DefinitionError::DuplicateOutput(_))
        ));

        let def = builder.build().unwrap();
        assert_eq!(def.host_output(), Some("InstanceId"));
    }

    #[test]
    fn test_build_checks_stack_name() {
        let builder = StackBuilder::new("1-bad name");
        assert!(matches!(
            builder.build(),
            Err(DefinitionError::InvalidStackName(_))
        ));
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let make = || {
            let mut builder = StackBuilder::new("TestStack");
            builder.declare_table("Chat", indexed_table()).unwrap();
            builder.build().unwrap()
        };
        let a = make();
        let b = make();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
        assert_eq!(a.short_fingerprint().len(), 16);

        let mut builder = StackBuilder::new("TestStack");
        builder.declare_table("Chat2", indexed_table()).unwrap();
        assert_ne!(builder.build().unwrap().fingerprint(), a.fingerprint());
    }
}
