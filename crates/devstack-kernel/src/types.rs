//! Identifiers and handles
//!
//! Every declaration in a stack is named by a [`LogicalId`]. Builder methods
//! return typed handles wrapping that id; the handles are opaque references
//! that the provisioning engine resolves to physical identifiers later.

use crate::error::DefinitionError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

static LOGICAL_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9]{0,254}$").expect("static regex"));

/// Stack-unique declaration name (alphanumeric, starts with a letter)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LogicalId(String);

impl LogicalId {
    /// Validate and wrap a logical id
    ///
    /// # Errors
    /// Returns `InvalidLogicalId` unless the value is 1-255 alphanumeric
    /// characters starting with a letter
    pub fn new(value: impl Into<String>) -> Result<Self, DefinitionError> {
        let value = value.into();
        if LOGICAL_ID.is_match(&value) {
            Ok(Self(value))
        } else {
            Err(DefinitionError::InvalidLogicalId(value))
        }
    }

    /// Borrow as str
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for LogicalId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for LogicalId {
    type Err = DefinitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for LogicalId {
    type Error = DefinitionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<LogicalId> for String {
    fn from(id: LogicalId) -> Self {
        id.0
    }
}

/// Kind of durable resource behind a [`ResourceHandle`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Key-value / document table
    Table,
    /// Object store bucket
    Bucket,
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Table => f.pad("table"),
            Self::Bucket => f.pad("bucket"),
        }
    }
}

/// Reference to a declared durable resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceHandle {
    id: LogicalId,
    kind: ResourceKind,
}

impl ResourceHandle {
    /// Reference a resource by id; the builder checks that it was declared
    #[inline]
    #[must_use]
    pub fn new(id: LogicalId, kind: ResourceKind) -> Self {
        Self { id, kind }
    }

    /// Logical id
    #[inline]
    #[must_use]
    pub fn id(&self) -> &LogicalId {
        &self.id
    }

    /// Resource kind
    #[inline]
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }
}

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(LogicalId);

        impl $name {
            /// Reference a declaration by id; the builder checks that it exists
            #[inline]
            #[must_use]
            pub fn new(id: LogicalId) -> Self {
                Self(id)
            }

            /// Logical id
            #[inline]
            #[must_use]
            pub fn id(&self) -> &LogicalId {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                Display::fmt(&self.0, f)
            }
        }
    };
}

handle!(
    /// Reference to a declared network segment
    NetworkHandle
);
handle!(
    /// Reference to a declared traffic policy
    SecurityHandle
);
handle!(
    /// Reference to a declared execution identity
    IdentityHandle
);
handle!(
    /// Reference to a declared SSH key pair
    KeyPairHandle
);
handle!(
    /// Reference to the provisioned compute host
    ///
    /// The logical id is stable for the life of the stack; the physical
    /// instance id is reported by the engine as a named output.
    HostHandle
);
