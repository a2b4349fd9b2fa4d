//! Reference environment tests
//!
//! Composes the stock environment and hands it to the in-memory engine.

use devstack_bootstrap::AssemblyError;
use devstack_kernel::blueprint::{BUCKET_NAME_OUTPUT, INSTANCE_ID_OUTPUT};
use devstack_kernel::prelude::*;
use devstack_test_utils::{boot_script, EngineRejected, RecordingEngine, SourceTree, FAKE_INSTANCE_ID};
use pretty_assertions::assert_eq;

fn id(value: &str) -> LogicalId {
    LogicalId::new(value).unwrap()
}

#[test]
fn test_compose_declares_everything() {
    let definition = compose(&DevStackConfig::default(), boot_script()).unwrap();

    let resources: Vec<&str> = definition.resources().keys().map(LogicalId::as_str).collect();
    assert_eq!(resources, vec!["ChainlitTable", "AuthTable", "ChainlitStorageBucket"]);
    assert_eq!(definition.networks()[&id("VsCodeRemoteVpc")].zone_count, 2);
    assert_eq!(
        definition.security()[&id("VsCodeRemoteSG")].description,
        "Security group for VS Code Remote Development"
    );
    assert!(definition.key_pairs().contains_key(&id("KeyPair")));

    let host = definition.host().unwrap();
    assert_eq!(host.id.as_str(), "VsCodeRemoteInstance");
    assert_eq!(host.spec.instance_type, "t3.medium");
    assert_eq!(definition.host_output(), Some(INSTANCE_ID_OUTPUT));
    assert_eq!(
        definition.outputs()[INSTANCE_ID_OUTPUT].description,
        "Instance ID for VS Code Remote connection"
    );
}

#[test]
fn test_grants_are_separate_policies() {
    let definition = compose(&DevStackConfig::default(), boot_script()).unwrap();
    let role = &definition.identities()[&id("EC2Role")];

    assert_eq!(role.trust_principal, "ec2.amazonaws.com");
    assert_eq!(role.managed_permissions, vec!["AmazonSSMManagedInstanceCore"]);

    let names: Vec<&str> = role.policy_names().map(LogicalId::as_str).collect();
    assert_eq!(names, vec!["DynamoDBPolicy", "S3Policy", "BedrockPolicy"]);

    let chat = ResourceHandle::new(id("ChainlitTable"), ResourceKind::Table);
    let auth = ResourceHandle::new(id("AuthTable"), ResourceKind::Table);
    assert_eq!(
        role.grants[0].scopes,
        vec![
            ResourceScope::Resource(chat.clone()),
            ResourceScope::SecondaryPatterns(chat),
            ResourceScope::Resource(auth),
        ]
    );
    assert_eq!(role.grants[0].actions.len(), 6);
    assert_eq!(role.unscoped[0].action(), "bedrock:*");
}

#[test]
fn test_key_pair_is_optional() {
    let config = DevStackConfig::default().with_key_pair(false);
    let definition = compose(&config, boot_script()).unwrap();
    assert!(definition.key_pairs().is_empty());
    assert!(definition.host().unwrap().spec.key_pair.is_none());
}

#[tokio::test]
async fn test_deploy_reports_host_id() {
    let definition = compose(&DevStackConfig::default(), boot_script()).unwrap();
    let engine = RecordingEngine::new();

    let deployment = definition.deploy(&engine).await.unwrap();

    assert_eq!(deployment.stack_name, "DevHostStack");
    assert_eq!(deployment.host_id(), Some(FAKE_INSTANCE_ID));
    assert_eq!(
        deployment.output(BUCKET_NAME_OUTPUT),
        Some("physical-ChainlitStorageBucket")
    );
    assert_eq!(engine.deployed(), vec![definition.fingerprint().to_string()]);
}

#[tokio::test]
async fn test_engine_error_passes_through_unchanged() {
    let definition = compose(&DevStackConfig::default(), boot_script()).unwrap();
    let engine = RecordingEngine::rejecting("quota exceeded");

    let err = definition.deploy(&engine).await.unwrap_err();
    assert_eq!(err, EngineRejected("quota exceeded".to_string()));
}

#[test]
fn test_build_environment_embeds_sources() {
    let tree = SourceTree::standard()
        .with_source("app.py", "print('app')\n")
        .with_source("auth.py", "print('auth')\n")
        .with_source("notes.txt", "skip me");

    let (assembled, definition) = build_environment(&tree.config(), tree.root()).unwrap();

    assert_eq!(assembled.files(), ["app.py".to_string(), "auth.py".to_string()]);
    let script = definition.host().unwrap().spec.boot_script.as_str();
    assert!(script.starts_with("#!/bin/bash\necho start\n"));
    assert!(script.contains("head -c -1 > 'app.py' << 'EOF'\nprint('app')\n\nEOF"));
    assert!(!script.contains("%SOURCE_FILES%"));
    assert!(!script.contains("notes.txt"));
}

#[test]
fn test_build_environment_fails_before_composing() {
    let tree = SourceTree::standard();
    let config = tree.config().with_bootstrap_paths("scripts/missing.template", SourceTree::SOURCES);

    let err = build_environment(&config, tree.root()).unwrap_err();
    assert!(matches!(
        err,
        BlueprintError::Assembly(AssemblyError::TemplateNotFound(_))
    ));
}

#[test]
fn test_oversized_boot_script_rejected() {
    let tree = SourceTree::standard().with_source("big.py", &"x = 1\n".repeat(4000));

    let err = build_environment(&tree.config(), tree.root()).unwrap_err();
    assert!(matches!(
        err,
        BlueprintError::Definition(DefinitionError::UserDataTooLarge { .. })
    ));
}
