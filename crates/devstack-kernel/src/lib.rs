//! devstack Kernel - single-host development environment as code
//!
//! Declares every piece of the environment (tables, bucket, network,
//! identity, host) through one builder, checks each reference as it is made,
//! and seals the result for a provisioning engine.
//!
//! 1. **Construction**: declare on a [`StackBuilder`](construction::StackBuilder),
//!    `build()` into an immutable [`StackDefinition`](definition::StackDefinition)
//! 2. **Deployment**: hand the definition to a
//!    [`ProvisioningEngine`](engine::ProvisioningEngine)
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use devstack_kernel::prelude::*;
//!
//! let mut stack = StackBuilder::new("DevHostStack");
//! let table = stack.declare_table("ChatTable", table_spec)?;
//! let role = stack.create_identity("HostRole", "ec2.amazonaws.com", ["AmazonSSMManagedInstanceCore"])?;
//! let scopes = stack.scopes_for(&table)?;
//! stack.grant(&role, "DataPolicy", actions(["dynamodb:Query"])?, scopes)?;
//! let definition = stack.build()?;
//!
//! let deployment = definition.deploy(&TemplateSynthesizer::new("cdk.out")).await?;
//! ```

// Declarations
pub mod access;
pub mod catalog;
pub mod host;
pub mod network;
pub mod types;

// Construction and deployment
pub mod construction;
pub mod definition;
pub mod engine;

// Environment
pub mod blueprint;
pub mod config;
pub mod error;
pub mod logging;

// Re-exports
pub use error::*;
pub use types::*;

/// Re-export common types for convenience
pub mod prelude {
    pub use crate::access::{actions, Action, ResourceScope};
    pub use crate::blueprint::{assemble_boot_script, build_environment, compose};
    pub use crate::catalog::{
        BillingMode, BucketSpec, KeyAttribute, KeySchema, Projection, RemovalPolicy,
        SecondaryPattern, TableSpec,
    };
    pub use crate::config::DevStackConfig;
    pub use crate::construction::StackBuilder;
    pub use crate::definition::{OutputValue, StackDefinition};
    pub use crate::engine::{Deployment, ProvisioningEngine, TemplateSynthesizer};
    pub use crate::error::{BlueprintError, ConfigError, DefinitionError};
    pub use crate::host::{BootScript, HostSpec, KeyPairSpec};
    pub use crate::network::{Cidr, IngressRule, NetworkSpec, SubnetVisibility};
    pub use crate::types::{
        HostHandle, IdentityHandle, KeyPairHandle, LogicalId, NetworkHandle, ResourceHandle,
        ResourceKind, SecurityHandle,
    };
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
