//! Template synthesis tests
//!
//! Checks the CloudFormation rendering of the stock environment and of a few
//! hand-built stacks.

use devstack_kernel::engine::synth::synthesize;
use devstack_kernel::engine::SynthError;
use devstack_kernel::prelude::*;
use devstack_test_utils::boot_script;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn stock_template() -> Value {
    let definition = compose(&DevStackConfig::default(), boot_script()).unwrap();
    synthesize(&definition).unwrap()
}

#[test]
fn test_table_rendering() {
    let template = stock_template();
    let chat = &template["Resources"]["ChainlitTable"];

    assert_eq!(chat["Type"], "AWS::DynamoDB::Table");
    assert_eq!(chat["DeletionPolicy"], "Delete");
    assert_eq!(chat["Properties"]["TableName"], "ChainlitData");
    assert_eq!(chat["Properties"]["BillingMode"], "PAY_PER_REQUEST");
    assert_eq!(
        chat["Properties"]["KeySchema"],
        json!([
            { "AttributeName": "PK", "KeyType": "HASH" },
            { "AttributeName": "SK", "KeyType": "RANGE" }
        ])
    );
    assert_eq!(
        chat["Properties"]["AttributeDefinitions"]
            .as_array()
            .map(Vec::len),
        Some(4)
    );

    let index = &chat["Properties"]["GlobalSecondaryIndexes"][0];
    assert_eq!(index["IndexName"], "UserThread");
    assert_eq!(
        index["Projection"],
        json!({ "ProjectionType": "INCLUDE", "NonKeyAttributes": ["id", "name"] })
    );

    let auth = &template["Resources"]["AuthTable"]["Properties"];
    assert!(auth.get("GlobalSecondaryIndexes").is_none());
}

#[test]
fn test_table_policy_covers_indexes() {
    let template = stock_template();
    let statement = &template["Resources"]["DynamoDBPolicy"]["Properties"]["PolicyDocument"]["Statement"][0];

    assert_eq!(
        statement["Resource"],
        json!([
            { "Fn::GetAtt": ["ChainlitTable", "Arn"] },
            { "Fn::Join": ["", [{ "Fn::GetAtt": ["ChainlitTable", "Arn"] }, "/index/*"]] },
            { "Fn::GetAtt": ["AuthTable", "Arn"] }
        ])
    );
    assert_eq!(
        template["Resources"]["DynamoDBPolicy"]["Properties"]["Roles"],
        json!([{ "Ref": "EC2Role" }])
    );
}

#[test]
fn test_unscoped_and_bucket_policies() {
    let template = stock_template();
    let bedrock = &template["Resources"]["BedrockPolicy"]["Properties"]["PolicyDocument"]["Statement"][0];
    assert_eq!(bedrock["Action"], "bedrock:*");
    assert_eq!(bedrock["Resource"], "*");

    let s3 = &template["Resources"]["S3Policy"]["Properties"]["PolicyDocument"]["Statement"][0];
    assert_eq!(
        s3["Resource"],
        json!([
            { "Fn::GetAtt": ["ChainlitStorageBucket", "Arn"] },
            { "Fn::Join": ["", [{ "Fn::GetAtt": ["ChainlitStorageBucket", "Arn"] }, "/*"]] }
        ])
    );
}

#[test]
fn test_bucket_rendering() {
    let template = stock_template();
    let bucket = &template["Resources"]["ChainlitStorageBucket"]["Properties"];

    assert_eq!(
        bucket["BucketName"],
        json!({ "Fn::Sub": "chainlit-storage-${AWS::AccountId}-${AWS::Region}" })
    );
    assert_eq!(bucket["VersioningConfiguration"]["Status"], "Enabled");
    assert_eq!(
        bucket["BucketEncryption"]["ServerSideEncryptionConfiguration"][0]["ServerSideEncryptionByDefault"]["SSEAlgorithm"],
        "AES256"
    );
}

#[test]
fn test_network_rendering() {
    let template = stock_template();
    let resources = &template["Resources"];

    assert_eq!(resources["VsCodeRemoteVpc"]["Properties"]["CidrBlock"], "10.0.0.0/16");
    assert_eq!(
        resources["VsCodeRemoteVpcPublicSubnet1Subnet"]["Properties"]["CidrBlock"],
        "10.0.0.0/24"
    );
    assert_eq!(
        resources["VsCodeRemoteVpcPublicSubnet2Subnet"]["Properties"]["CidrBlock"],
        "10.0.1.0/24"
    );
    assert_eq!(
        resources["VsCodeRemoteVpcPublicSubnet1DefaultRoute"]["Properties"]["GatewayId"],
        json!({ "Ref": "VsCodeRemoteVpcIGW" })
    );
    assert_eq!(
        resources["VsCodeRemoteSG"]["Properties"]["SecurityGroupEgress"][0]["IpProtocol"],
        "-1"
    );
}

#[test]
fn test_host_rendering() {
    let template = stock_template();
    let instance = &template["Resources"]["VsCodeRemoteInstance"];
    let props = &instance["Properties"];

    assert_eq!(props["InstanceType"], "t3.medium");
    assert_eq!(
        props["ImageId"],
        "{{resolve:ssm:/aws/service/ami-amazon-linux-latest/al2023-ami-kernel-default-x86_64}}"
    );
    assert_eq!(props["SubnetId"], json!({ "Ref": "VsCodeRemoteVpcPublicSubnet1Subnet" }));
    assert_eq!(props["KeyName"], json!({ "Ref": "KeyPair" }));
    assert_eq!(
        props["IamInstanceProfile"],
        json!({ "Ref": "VsCodeRemoteInstanceInstanceProfile" })
    );
    assert_eq!(props["UserData"]["Fn::Base64"], "#!/bin/bash\necho ready");
    assert_eq!(
        instance["DependsOn"],
        json!([
            "DynamoDBPolicy",
            "S3Policy",
            "BedrockPolicy",
            "VsCodeRemoteVpcPublicSubnet1DefaultRoute"
        ])
    );

    assert_eq!(
        template["Outputs"]["InstanceId"],
        json!({
            "Description": "Instance ID for VS Code Remote connection",
            "Value": { "Ref": "VsCodeRemoteInstance" }
        })
    );
}

#[test]
fn test_derived_id_collision() {
    let mut stack = StackBuilder::new("Collide");
    stack
        .declare_network("Vpc", 1, SubnetVisibility::Public)
        .unwrap();
    stack
        .declare_table(
            "VpcIGW",
            TableSpec::new("Things", KeySchema::partition(KeyAttribute::string("PK"))),
        )
        .unwrap();
    let definition = stack.build().unwrap();

    assert!(matches!(
        synthesize(&definition),
        Err(SynthError::LogicalIdCollision(id)) if id == "VpcIGW"
    ));
}

#[tokio::test]
async fn test_synthesizer_writes_template() {
    let out = tempfile::tempdir().unwrap();
    let definition = compose(&DevStackConfig::default(), boot_script()).unwrap();
    let engine = TemplateSynthesizer::new(out.path().join("cdk.out"));

    let deployment = definition.deploy(&engine).await.unwrap();

    let path = engine.template_path("DevHostStack");
    let written: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(written, synthesize(&definition).unwrap());
    assert_eq!(deployment.host_id(), Some(r#"{"Ref":"VsCodeRemoteInstance"}"#));
}
