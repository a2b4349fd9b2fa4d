//! Resource Catalog
//!
//! Declarations of the durable resources of the environment: tables with a
//! primary key and optional secondary access patterns, and object-store
//! buckets. Nothing here talks to a cloud; the builder registers these specs
//! and the provisioning engine creates them.
//!
//! # Invariant
//!
//! Every secondary pattern's projected attributes are a subset of the table's
//! attribute set, which is the union of its declared attributes and every key
//! attribute (primary and secondary).

use crate::error::DefinitionError;
use crate::types::{LogicalId, ResourceKind};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

static TABLE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.\-]{3,255}$").expect("static regex"));

static BUCKET_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9.\-]{1,61}[a-z0-9]$").expect("static regex"));

/// Scalar type of a key attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    /// UTF-8 string
    String,
    /// Number
    Number,
}

impl AttributeType {
    /// Wire code (`S` / `N`)
    #[inline]
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::String => "S",
            Self::Number => "N",
        }
    }

    /// Human-readable name
    #[inline]
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
        }
    }
}

/// Named, typed key attribute
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyAttribute {
    /// Attribute name
    pub name: String,
    /// Attribute type
    #[serde(rename = "type")]
    pub kind: AttributeType,
}

impl KeyAttribute {
    /// String-typed key attribute
    #[inline]
    #[must_use]
    pub fn string(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: AttributeType::String,
        }
    }

    /// Number-typed key attribute
    #[inline]
    #[must_use]
    pub fn number(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: AttributeType::Number,
        }
    }
}

/// Partition key plus optional sort key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySchema {
    /// Partition attribute
    pub partition: KeyAttribute,
    /// Sort attribute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<KeyAttribute>,
}

impl KeySchema {
    /// Partition-only key
    #[inline]
    #[must_use]
    pub fn partition(partition: KeyAttribute) -> Self {
        Self {
            partition,
            sort: None,
        }
    }

    /// Composite key
    #[inline]
    #[must_use]
    pub fn composite(partition: KeyAttribute, sort: KeyAttribute) -> Self {
        Self {
            partition,
            sort: Some(sort),
        }
    }

    /// Key attributes, partition first
    pub fn attributes(&self) -> impl Iterator<Item = &KeyAttribute> {
        std::iter::once(&self.partition).chain(self.sort.as_ref())
    }
}

/// Attributes copied into a secondary access pattern
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "attributes", rename_all = "snake_case")]
pub enum Projection {
    /// Every attribute
    All,
    /// Only key attributes
    KeysOnly,
    /// Key attributes plus the listed ones
    Include(Vec<String>),
}

impl Projection {
    /// Wire code
    #[inline]
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::All => "ALL",
            Self::KeysOnly => "KEYS_ONLY",
            Self::Include(_) => "INCLUDE",
        }
    }
}

/// Secondary lookup shape of a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryPattern {
    /// Pattern (index) name
    pub name: String,
    /// Key of the pattern
    pub key: KeySchema,
    /// Projected attributes
    pub projection: Projection,
}

impl SecondaryPattern {
    /// Create a secondary pattern
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, key: KeySchema, projection: Projection) -> Self {
        Self {
            name: name.into(),
            key,
            projection,
        }
    }
}

/// Capacity mode of a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingMode {
    /// On-demand
    #[default]
    PayPerRequest,
    /// Fixed read/write capacity units
    Provisioned {
        /// Read capacity units
        read: u32,
        /// Write capacity units
        write: u32,
    },
}

/// What happens to a resource when the environment is torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalPolicy {
    /// Delete with the environment
    #[default]
    Destroy,
    /// Keep after the environment is deleted
    Retain,
}

/// Table declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    /// Physical table name
    pub table_name: String,
    /// Primary key
    pub key: KeySchema,
    /// Secondary access patterns
    #[serde(default)]
    pub secondary: Vec<SecondaryPattern>,
    /// Non-key attributes the table is known to hold
    #[serde(default)]
    pub attributes: Vec<String>,
    /// Capacity mode
    #[serde(default)]
    pub billing: BillingMode,
    /// Teardown behaviour
    #[serde(default)]
    pub removal: RemovalPolicy,
}

impl TableSpec {
    /// On-demand table destroyed with the environment
    #[must_use]
    pub fn new(table_name: impl Into<String>, key: KeySchema) -> Self {
        Self {
            table_name: table_name.into(),
            key,
            secondary: Vec::new(),
            attributes: Vec::new(),
            billing: BillingMode::default(),
            removal: RemovalPolicy::default(),
        }
    }

    /// With secondary access pattern
    #[inline]
    #[must_use]
    pub fn with_secondary(mut self, pattern: SecondaryPattern) -> Self {
        self.secondary.push(pattern);
        self
    }

    /// With known non-key attributes
    #[must_use]
    pub fn with_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes.extend(attributes.into_iter().map(Into::into));
        self
    }

    /// With billing mode
    #[inline]
    #[must_use]
    pub fn with_billing(mut self, billing: BillingMode) -> Self {
        self.billing = billing;
        self
    }

    /// With removal policy
    #[inline]
    #[must_use]
    pub fn with_removal(mut self, removal: RemovalPolicy) -> Self {
        self.removal = removal;
        self
    }

    /// Whether the table has secondary access patterns
    #[inline]
    #[must_use]
    pub fn has_secondary(&self) -> bool {
        !self.secondary.is_empty()
    }

    /// Every key attribute with its type, first declaration first
    #[must_use]
    pub fn key_attributes(&self) -> IndexMap<&str, AttributeType> {
        let mut out = IndexMap::new();
        let keys = self
            .key
            .attributes()
            .chain(self.secondary.iter().flat_map(|p| p.key.attributes()));
        for attr in keys {
            out.entry(attr.name.as_str()).or_insert(attr.kind);
        }
        out
    }

    /// Declared attributes plus all key attributes
    #[must_use]
    pub fn attribute_set(&self) -> BTreeSet<&str> {
        let mut set: BTreeSet<&str> = self.attributes.iter().map(String::as_str).collect();
        set.extend(self.key_attributes().keys().copied());
        set
    }

    /// Check naming, key typing and projection rules
    ///
    /// # Errors
    /// Returns the first rule the table breaks
    pub fn validate(&self, id: &LogicalId) -> Result<(), DefinitionError> {
        check_table_name(&self.table_name)?;

        if let BillingMode::Provisioned { read, write } = self.billing {
            if read == 0 || write == 0 {
                return Err(DefinitionError::InvalidCapacity(id.clone()));
            }
        }

        let mut types: IndexMap<&str, AttributeType> = IndexMap::new();
        let keys = self
            .key
            .attributes()
            .chain(self.secondary.iter().flat_map(|p| p.key.attributes()));
        for attr in keys {
            if attr.name.is_empty() {
                return Err(DefinitionError::EmptyAttributeName(id.clone()));
            }
            if let Some(first) = types.insert(attr.name.as_str(), attr.kind) {
                if first != attr.kind {
                    return Err(DefinitionError::ConflictingAttributeType {
                        resource: id.clone(),
                        attribute: attr.name.clone(),
                        first: first.name(),
                        second: attr.kind.name(),
                    });
                }
            }
        }
        if self.attributes.iter().any(String::is_empty) {
            return Err(DefinitionError::EmptyAttributeName(id.clone()));
        }

        let known = self.attribute_set();
        let mut names = HashSet::new();
        for pattern in &self.secondary {
            check_table_name(&pattern.name)?;
            if !names.insert(pattern.name.as_str()) {
                return Err(DefinitionError::DuplicateSecondaryPattern {
                    resource: id.clone(),
                    pattern: pattern.name.clone(),
                });
            }
            if let Projection::Include(included) = &pattern.projection {
                if included.is_empty() {
                    return Err(DefinitionError::EmptyProjection {
                        resource: id.clone(),
                        pattern: pattern.name.clone(),
                    });
                }
                if let Some(missing) = included.iter().find(|a| !known.contains(a.as_str())) {
                    return Err(DefinitionError::UnknownProjectedAttribute {
                        resource: id.clone(),
                        pattern: pattern.name.clone(),
                        attribute: missing.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}

fn check_table_name(name: &str) -> Result<(), DefinitionError> {
    if TABLE_NAME.is_match(name) {
        Ok(())
    } else {
        Err(DefinitionError::InvalidResourceName {
            kind: ResourceKind::Table,
            name: name.to_string(),
            reason: "expected 3-255 characters of [A-Za-z0-9_.-]",
        })
    }
}

/// Server-side encryption of a bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketEncryption {
    /// Keys managed by the object store
    #[default]
    S3Managed,
    /// Keys managed by the key management service
    KmsManaged,
}

/// Object-store bucket declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketSpec {
    /// Physical bucket name; may contain `${AWS::AccountId}`-style
    /// pseudo parameters that the engine substitutes
    pub bucket_name: String,
    /// Keep object versions
    #[serde(default)]
    pub versioned: bool,
    /// Server-side encryption
    #[serde(default)]
    pub encryption: BucketEncryption,
    /// Empty the bucket before deleting it on teardown
    #[serde(default)]
    pub auto_delete_objects: bool,
    /// Teardown behaviour
    #[serde(default)]
    pub removal: RemovalPolicy,
}

impl BucketSpec {
    /// Unversioned, store-encrypted bucket destroyed with the environment
    #[must_use]
    pub fn new(bucket_name: impl Into<String>) -> Self {
        Self {
            bucket_name: bucket_name.into(),
            versioned: false,
            encryption: BucketEncryption::default(),
            auto_delete_objects: false,
            removal: RemovalPolicy::default(),
        }
    }

    /// With versioning
    #[inline]
    #[must_use]
    pub fn versioned(mut self) -> Self {
        self.versioned = true;
        self
    }

    /// With auto-delete of objects on teardown
    #[inline]
    #[must_use]
    pub fn auto_delete_objects(mut self) -> Self {
        self.auto_delete_objects = true;
        self
    }

    /// With encryption
    #[inline]
    #[must_use]
    pub fn with_encryption(mut self, encryption: BucketEncryption) -> Self {
        self.encryption = encryption;
        self
    }

    /// Whether the name still contains pseudo parameters
    #[inline]
    #[must_use]
    pub fn is_templated_name(&self) -> bool {
        self.bucket_name.contains("${")
    }

    /// Check the bucket name
    ///
    /// Templated names are only checked once resolved, by the engine.
    ///
    /// # Errors
    /// Returns `InvalidResourceName` for literal names that break the rules
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if self.is_templated_name() {
            return Ok(());
        }
        let name = &self.bucket_name;
        let reason = if !BUCKET_NAME.is_match(name) {
            Some("expected 3-63 lowercase letters, digits, dots or hyphens, alphanumeric at both ends")
        } else if name.contains("..") {
            Some("must not contain adjacent dots")
        } else if name.parse::<std::net::Ipv4Addr>().is_ok() {
            Some("must not be formatted as an IP address")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(DefinitionError::InvalidResourceName {
                kind: ResourceKind::Bucket,
                name: name.clone(),
                reason,
            }),
            None => Ok(()),
        }
    }
}

/// A declared durable resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resource {
    /// Table
    Table(TableSpec),
    /// Bucket
    Bucket(BucketSpec),
}

impl Resource {
    /// Resource kind
    #[inline]
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Table(_) => ResourceKind::Table,
            Self::Bucket(_) => ResourceKind::Bucket,
        }
    }

    /// Whether grants on this resource need a secondary-pattern sub-scope
    #[inline]
    #[must_use]
    pub fn has_secondary(&self) -> bool {
        matches!(self, Self::Table(t) if t.has_secondary())
    }

    /// Validate the declaration
    ///
    /// # Errors
    /// See [`TableSpec::validate`] and [`BucketSpec::validate`]
    pub fn validate(&self, id: &LogicalId) -> Result<(), DefinitionError> {
        match self {
            Self::Table(t) => t.validate(id),
            Self::Bucket(b) => b.validate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> LogicalId {
        LogicalId::new(s).unwrap()
    }

    fn chat_table() -> TableSpec {
        TableSpec::new(
            "ChainlitData",
            KeySchema::composite(KeyAttribute::string("PK"), KeyAttribute::string("SK")),
        )
        .with_attributes(["id", "name"])
        .with_secondary(SecondaryPattern::new(
            "UserThread",
            KeySchema::composite(
                KeyAttribute::string("UserThreadPK"),
                KeyAttribute::string("UserThreadSK"),
            ),
            Projection::Include(vec!["id".into(), "name".into()]),
        ))
    }

    #[test]
    fn valid_table_with_secondary_pattern() {
        let table = chat_table();
        assert!(table.validate(&id("ChainlitTable")).is_ok());
        assert!(table.has_secondary());
        let keys: Vec<_> = table.key_attributes().keys().copied().collect();
        assert_eq!(keys, vec!["PK", "SK", "UserThreadPK", "UserThreadSK"]);
    }

    #[test]
    fn projection_must_be_subset() {
        let table = TableSpec::new("Things", KeySchema::partition(KeyAttribute::string("pk")))
            .with_secondary(SecondaryPattern::new(
                "ByOwner",
                KeySchema::partition(KeyAttribute::string("owner")),
                Projection::Include(vec!["title".into()]),
            ));
        assert!(matches!(
            table.validate(&id("Things")),
            Err(DefinitionError::UnknownProjectedAttribute { ref attribute, .. }) if attribute == "title"
        ));
    }

    #[test]
    fn key_attributes_count_as_projectable() {
        let table = TableSpec::new("Things", KeySchema::partition(KeyAttribute::string("pk")))
            .with_secondary(SecondaryPattern::new(
                "ByOwner",
                KeySchema::partition(KeyAttribute::string("owner")),
                Projection::Include(vec!["pk".into()]),
            ));
        assert!(table.validate(&id("Things")).is_ok());
    }

    #[test]
    fn conflicting_key_types_rejected() {
        let table = TableSpec::new("Things", KeySchema::partition(KeyAttribute::string("pk")))
            .with_secondary(SecondaryPattern::new(
                "ByPk",
                KeySchema::partition(KeyAttribute::number("pk")),
                Projection::KeysOnly,
            ));
        assert!(matches!(
            table.validate(&id("Things")),
            Err(DefinitionError::ConflictingAttributeType { .. })
        ));
    }

    #[test]
    fn duplicate_pattern_names_rejected() {
        let pattern = SecondaryPattern::new(
            "ByOwner",
            KeySchema::partition(KeyAttribute::string("owner")),
            Projection::All,
        );
        let table = TableSpec::new("Things", KeySchema::partition(KeyAttribute::string("pk")))
            .with_secondary(pattern.clone())
            .with_secondary(pattern);
        assert!(matches!(
            table.validate(&id("Things")),
            Err(DefinitionError::DuplicateSecondaryPattern { .. })
        ));
    }

    #[test]
    fn zero_capacity_rejected() {
        let table = TableSpec::new("Things", KeySchema::partition(KeyAttribute::string("pk")))
            .with_billing(BillingMode::Provisioned { read: 0, write: 5 });
        assert!(matches!(
            table.validate(&id("Things")),
            Err(DefinitionError::InvalidCapacity(_))
        ));
    }

    #[test]
    fn bucket_names() {
        assert!(BucketSpec::new("chainlit-storage-123456789012-ap-northeast-1").validate().is_ok());
        assert!(BucketSpec::new("chainlit-storage-${AWS::AccountId}-${AWS::Region}").validate().is_ok());
        assert!(BucketSpec::new("Chainlit").validate().is_err());
        assert!(BucketSpec::new("ab").validate().is_err());
        assert!(BucketSpec::new("a..b").validate().is_err());
        assert!(BucketSpec::new("192.168.1.1").validate().is_err());
        assert!(BucketSpec::new("-bucket").validate().is_err());
    }
}
