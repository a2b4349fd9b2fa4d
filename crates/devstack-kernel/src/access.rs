//! Identity & Access Model
//!
//! One execution identity, assumed by the host, owns a set of additive
//! grants. Each grant is a separately named policy covering one capability
//! group so it can be audited, rotated or revoked on its own.
//!
//! # Rules
//!
//! - Actions are explicit `service:Action` pairs. Wildcards are rejected.
//! - The single escape hatch for capabilities that cannot be scoped is
//!   [`UnscopedGrant`], which is recorded separately and must carry a reason.
//! - A scope covering a table with secondary access patterns must also cover
//!   `<table>/index/*`; a bucket scope covers `<bucket>/*` for its objects.

use crate::catalog::Resource;
use crate::error::DefinitionError;
use crate::types::{LogicalId, ResourceHandle};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

static ACTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9\-]+:[A-Za-z0-9*]+$").expect("static regex"));

static SERVICE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9\-]+$").expect("static regex"));

/// A `service:Action` permission
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Action(String);

impl Action {
    /// Parse an action
    ///
    /// # Errors
    /// Returns `MalformedAction` unless the value is `service:Action`
    pub fn new(value: impl Into<String>) -> Result<Self, DefinitionError> {
        let value = value.into();
        if ACTION.is_match(&value) {
            Ok(Self(value))
        } else {
            Err(DefinitionError::MalformedAction(value))
        }
    }

    /// Whether the action name contains a wildcard
    #[inline]
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.0.contains('*')
    }

    /// Borrow as str
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Action {
    type Error = DefinitionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Action> for String {
    fn from(action: Action) -> Self {
        action.0
    }
}

/// Parse a list of action strings
///
/// # Errors
/// Returns `MalformedAction` for the first bad entry
pub fn actions<I, S>(values: I) -> Result<Vec<Action>, DefinitionError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    values.into_iter().map(Action::new).collect()
}

/// Part of a resource a grant applies to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "resource", rename_all = "snake_case")]
pub enum ResourceScope {
    /// The resource itself
    Resource(ResourceHandle),
    /// Every secondary access pattern of a table (`<arn>/index/*`)
    SecondaryPatterns(ResourceHandle),
    /// Every object of a bucket (`<arn>/*`)
    Objects(ResourceHandle),
}

impl ResourceScope {
    /// Handle the scope points at
    #[inline]
    #[must_use]
    pub fn handle(&self) -> &ResourceHandle {
        match self {
            Self::Resource(h) | Self::SecondaryPatterns(h) | Self::Objects(h) => h,
        }
    }

    /// Path suffix appended to the resource identifier
    #[inline]
    #[must_use]
    pub const fn suffix(&self) -> Option<&'static str> {
        match self {
            Self::Resource(_) => None,
            Self::SecondaryPatterns(_) => Some("/index/*"),
            Self::Objects(_) => Some("/*"),
        }
    }

    /// Full scope set for a declared resource
    ///
    /// Tables get their base scope plus the secondary-pattern sub-scope when
    /// they have patterns; buckets get their base scope plus their objects.
    #[must_use]
    pub fn covering(handle: &ResourceHandle, resource: &Resource) -> Vec<Self> {
        let mut scopes = vec![Self::Resource(handle.clone())];
        match resource {
            Resource::Table(t) if t.has_secondary() => {
                scopes.push(Self::SecondaryPatterns(handle.clone()));
            }
            Resource::Table(_) => {}
            Resource::Bucket(_) => scopes.push(Self::Objects(handle.clone())),
        }
        scopes
    }
}

/// Additive, named permission grant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    /// Policy name (capability group)
    pub policy: LogicalId,
    /// Allowed actions
    pub actions: Vec<Action>,
    /// Resources the actions apply to
    pub scopes: Vec<ResourceScope>,
}

impl Grant {
    /// Check actions and scope shape against the declared resources
    ///
    /// `lookup` resolves a handle to its declaration.
    ///
    /// # Errors
    /// - `EmptyActions` / `EmptyScopes`
    /// - `WildcardAction` for any wildcard
    /// - `UndeclaredResource` for a scope on an unknown handle
    /// - `ScopeKindMismatch` for `index/*` on anything but a table with
    ///   secondary patterns, or `/*` on anything but a bucket
    /// - `SubScopeWithoutBase` for a sub-scope whose resource is not itself
    ///   in the grant
    /// - `MissingSecondaryScope` for a table covered without `index/*`
    pub fn validate<'a, F>(&self, lookup: F) -> Result<(), DefinitionError>
    where
        F: Fn(&ResourceHandle) -> Option<&'a Resource>,
    {
        let policy = self.policy.as_str();
        if self.actions.is_empty() {
            return Err(DefinitionError::EmptyActions(policy.to_string()));
        }
        if self.scopes.is_empty() {
            return Err(DefinitionError::EmptyScopes(policy.to_string()));
        }
        if let Some(action) = self.actions.iter().find(|a| a.is_wildcard()) {
            return Err(DefinitionError::WildcardAction {
                policy: policy.to_string(),
                action: action.to_string(),
            });
        }

        for scope in &self.scopes {
            let handle = scope.handle();
            let resource = lookup(handle).ok_or_else(|| DefinitionError::UndeclaredResource {
                id: handle.id().clone(),
                kind: handle.kind(),
            })?;

            let Some(suffix) = scope.suffix() else {
                let sub = ResourceScope::SecondaryPatterns(handle.clone());
                if resource.has_secondary() && !self.scopes.contains(&sub) {
                    return Err(DefinitionError::MissingSecondaryScope {
                        policy: policy.to_string(),
                        resource: handle.id().clone(),
                    });
                }
                continue;
            };

            let applies = match scope {
                ResourceScope::SecondaryPatterns(_) => resource.has_secondary(),
                ResourceScope::Objects(_) => matches!(resource, Resource::Bucket(_)),
                ResourceScope::Resource(_) => true,
            };
            if !applies {
                return Err(DefinitionError::ScopeKindMismatch {
                    policy: policy.to_string(),
                    resource: handle.id().clone(),
                    kind: resource.kind(),
                    scope: suffix,
                });
            }
            if !self.scopes.contains(&ResourceScope::Resource(handle.clone())) {
                return Err(DefinitionError::SubScopeWithoutBase {
                    policy: policy.to_string(),
                    resource: handle.id().clone(),
                    scope: suffix,
                });
            }
        }

        Ok(())
    }
}

/// Named exception: every action of a service on every resource
///
/// Used for capabilities whose own API cannot be narrowed to a resource.
/// Kept apart from [`Grant`] so audits can list the exceptions directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnscopedGrant {
    /// Policy name
    pub policy: LogicalId,
    /// Service prefix (e.g. `bedrock`)
    pub service: String,
    /// Why the capability cannot be scoped
    pub reason: String,
}

impl UnscopedGrant {
    /// The single wildcard action of the service
    #[must_use]
    pub fn action(&self) -> String {
        format!("{}:*", self.service)
    }

    /// Check service name and reason
    ///
    /// # Errors
    /// Returns `MalformedAction` or `MissingJustification`
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if !SERVICE.is_match(&self.service) {
            return Err(DefinitionError::MalformedAction(self.action()));
        }
        if self.reason.trim().is_empty() {
            return Err(DefinitionError::MissingJustification(self.policy.to_string()));
        }
        Ok(())
    }
}

/// Execution identity and everything it owns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentitySpec {
    /// Service principal allowed to assume the identity
    pub trust_principal: String,
    /// Provider-managed baseline permissions, by name
    pub managed_permissions: Vec<String>,
    /// Scoped grants
    pub grants: Vec<Grant>,
    /// Named unscoped exceptions
    pub unscoped: Vec<UnscopedGrant>,
}

impl IdentitySpec {
    /// Identity with no grants yet
    #[must_use]
    pub fn new<I, S>(trust_principal: impl Into<String>, managed_permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            trust_principal: trust_principal.into(),
            managed_permissions: managed_permissions.into_iter().map(Into::into).collect(),
            grants: Vec::new(),
            unscoped: Vec::new(),
        }
    }

    /// Whether a policy name is taken on this identity
    #[must_use]
    pub fn has_policy(&self, policy: &LogicalId) -> bool {
        self.grants.iter().any(|g| &g.policy == policy)
            || self.unscoped.iter().any(|g| &g.policy == policy)
    }

    /// Every policy name, scoped grants first
    pub fn policy_names(&self) -> impl Iterator<Item = &LogicalId> {
        self.grants
            .iter()
            .map(|g| &g.policy)
            .chain(self.unscoped.iter().map(|g| &g.policy))
    }
}
