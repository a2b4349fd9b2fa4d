//! The reference environment
//!
//! Composes the single-host development stack from a [`DevStackConfig`]:
//! chat and auth tables, a storage bucket, a public network over two zones,
//! an execution identity with three separately named grants, an SSH key pair
//! and the host running the assembled boot script.
//!
//! ```text
//!   template + sources ──assemble──> BootScript ─┐
//!                                               ├──> StackBuilder ──build──> StackDefinition
//!   DevStackConfig ──────────────────────────────┘
//! ```

use crate::access::actions;
use crate::catalog::{BucketSpec, KeyAttribute, KeySchema, Projection, SecondaryPattern, TableSpec};
use crate::config::DevStackConfig;
use crate::construction::StackBuilder;
use crate::definition::{OutputValue, StackDefinition};
use crate::error::{BlueprintError, DefinitionError};
use crate::host::{BootScript, HostSpec, KeyPairSpec};
use crate::network::{NetworkSpec, SubnetVisibility};
use devstack_bootstrap::AssembledScript;
use std::path::Path;

/// Service principal of the compute platform
pub const HOST_PRINCIPAL: &str = "ec2.amazonaws.com";

/// Baseline managed permission enabling remote sessions without open ports
pub const SESSION_MANAGED_PERMISSION: &str = "AmazonSSMManagedInstanceCore";

/// Name of the output carrying the host id
pub const INSTANCE_ID_OUTPUT: &str = "InstanceId";

/// Name of the output carrying the bucket name
pub const BUCKET_NAME_OUTPUT: &str = "StorageBucketName";

const TABLE_ACTIONS: [&str; 6] = [
    "dynamodb:GetItem",
    "dynamodb:PutItem",
    "dynamodb:UpdateItem",
    "dynamodb:DeleteItem",
    "dynamodb:Query",
    "dynamodb:Scan",
];

const BUCKET_ACTIONS: [&str; 4] = [
    "s3:PutObject",
    "s3:GetObject",
    "s3:DeleteObject",
    "s3:ListBucket",
];

const INFERENCE_REASON: &str =
    "model ids and inference profiles are chosen by the application at runtime";

/// Assemble the boot script named by the config, paths relative to `base`
///
/// # Errors
/// Returns the assembly error, or `UserDataTooLarge` when the script does not
/// fit the host's user data
pub fn assemble_boot_script(
    config: &DevStackConfig,
    base: &Path,
) -> Result<(AssembledScript, BootScript), BlueprintError> {
    let (template, sources) = config.bootstrap.paths(base);
    let assembled = config.bootstrap.assembler().assemble(template, sources)?;
    let boot = BootScript::for_linux(assembled.text())?;
    Ok((assembled, boot))
}

/// Declare the whole environment around an already assembled boot script
///
/// # Errors
/// Returns the first rejected declaration
pub fn compose(config: &DevStackConfig, boot_script: BootScript) -> Result<StackDefinition, DefinitionError> {
    let tables = &config.tables;
    let mut stack = StackBuilder::new(&config.stack_name)
        .with_description("Single-host remote development environment");

    // Storage
    let chat = stack.declare_table(
        "ChainlitTable",
        TableSpec::new(
            &tables.chat_table,
            KeySchema::composite(KeyAttribute::string("PK"), KeyAttribute::string("SK")),
        )
        .with_attributes(tables.thread_projection.iter().cloned())
        .with_secondary(SecondaryPattern::new(
            &tables.thread_index,
            KeySchema::composite(
                KeyAttribute::string(&tables.thread_partition),
                KeyAttribute::string(&tables.thread_sort),
            ),
            Projection::Include(tables.thread_projection.clone()),
        )),
    )?;
    let auth = stack.declare_table(
        "AuthTable",
        TableSpec::new(&tables.auth_table, KeySchema::partition(KeyAttribute::string(&tables.auth_key))),
    )?;
    let bucket = stack.declare_bucket(
        "ChainlitStorageBucket",
        BucketSpec::new(config.bucket_name())
            .versioned()
            .auto_delete_objects(),
    )?;

    // Network
    let network = stack.declare_network_spec(
        "VsCodeRemoteVpc",
        NetworkSpec::new(config.network.max_azs, SubnetVisibility::Public)
            .with_subnet_mask(config.network.cidr_mask),
    )?;
    let security = stack.declare_traffic_policy(
        "VsCodeRemoteSG",
        &network,
        "Security group for VS Code Remote Development",
        Vec::new(),
        true,
    )?;

    // Access
    let role = stack.create_identity("EC2Role", HOST_PRINCIPAL, [SESSION_MANAGED_PERMISSION])?;

    let mut table_scopes = stack.scopes_for(&chat)?;
    table_scopes.extend(stack.scopes_for(&auth)?);
    stack.grant(&role, "DynamoDBPolicy", actions(TABLE_ACTIONS)?, table_scopes)?;
    stack.grant_unscoped(&role, "BedrockPolicy", "bedrock", INFERENCE_REASON)?;
    let bucket_scopes = stack.scopes_for(&bucket)?;
    stack.grant(&role, "S3Policy", actions(BUCKET_ACTIONS)?, bucket_scopes)?;

    // Host
    let mut host = HostSpec::new(network, security, role, boot_script);
    if config.key_pair {
        host = host.with_key_pair(stack.declare_key_pair("KeyPair", KeyPairSpec::default())?);
    }
    let host = stack.provision("VsCodeRemoteInstance", host)?;

    stack.output(
        INSTANCE_ID_OUTPUT,
        OutputValue::HostId(host),
        "Instance ID for VS Code Remote connection",
    )?;
    stack.output(
        BUCKET_NAME_OUTPUT,
        OutputValue::ResourceName(bucket),
        "Object storage bucket for chat attachments",
    )?;

    stack.build()
}

/// Assemble the boot script and compose the environment
///
/// # Errors
/// Returns the first assembly or declaration error; nothing is composed
/// when assembly fails
pub fn build_environment(
    config: &DevStackConfig,
    base: &Path,
) -> Result<(AssembledScript, StackDefinition), BlueprintError> {
    let (assembled, boot) = assemble_boot_script(config, base)?;
    let definition = compose(config, boot)?;
    Ok((assembled, definition))
}
