//! CloudFormation template synthesis
//!
//! Renders a [`StackDefinition`] as a CloudFormation JSON template. Handles
//! become `Ref` / `Fn::GetAtt` intrinsics, sub-scopes become `Fn::Join`s over
//! the resource ARN, and the boot script becomes base64 user data.
//!
//! [`TemplateSynthesizer`] is the bundled [`ProvisioningEngine`]: it writes the
//! template to disk and reports outputs unresolved, as their intrinsic JSON.

use super::{Deployment, ProvisioningEngine};
use crate::access::{IdentitySpec, ResourceScope};
use crate::catalog::{
    BillingMode, BucketEncryption, BucketSpec, KeySchema, Projection, RemovalPolicy, Resource,
    TableSpec,
};
use crate::definition::{OutputValue, StackDefinition};
use crate::error::DefinitionError;
use crate::host::{KeyFormat, KeyPairSpec, KeyType};
use crate::network::{NetworkSpec, SubnetVisibility, TrafficPolicy};
use crate::types::LogicalId;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};

const FORMAT_VERSION: &str = "2010-09-09";
const POLICY_VERSION: &str = "2012-10-17";

/// Errors raised while synthesizing or writing a template
#[derive(Debug, thiserror::Error)]
pub enum SynthError {
    /// Two template resources would share a logical id
    #[error("logical id collision in template: {0}")]
    LogicalIdCollision(String),

    /// Definition could not be rendered
    #[error("definition error: {0}")]
    Definition(#[from] DefinitionError),

    /// Template serialization failed
    #[error("serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Template could not be written
    #[error("io error writing {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn reference(id: &str) -> Value {
    json!({ "Ref": id })
}

fn get_att(id: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [id, attribute] })
}

fn availability_zone(index: u32) -> Value {
    json!({ "Fn::Select": [index, { "Fn::GetAZs": "" }] })
}

fn removal(policy: RemovalPolicy) -> &'static str {
    match policy {
        RemovalPolicy::Destroy => "Delete",
        RemovalPolicy::Retain => "Retain",
    }
}

fn with_removal(mut resource: Value, policy: RemovalPolicy) -> Value {
    if let Some(obj) = resource.as_object_mut() {
        obj.insert("UpdateReplacePolicy".into(), removal(policy).into());
        obj.insert("DeletionPolicy".into(), removal(policy).into());
    }
    resource
}

fn name_tag(stack: &str, id: &LogicalId) -> Value {
    json!([{ "Key": "Name", "Value": format!("{stack}/{id}") }])
}

/// Identifier of a grant scope, as an intrinsic
fn scope_value(scope: &ResourceScope) -> Value {
    let arn = get_att(scope.handle().id().as_str(), "Arn");
    match scope.suffix() {
        None => arn,
        Some(suffix) => json!({ "Fn::Join": ["", [arn, suffix]] }),
    }
}

fn key_schema(key: &KeySchema) -> Value {
    let mut out = vec![json!({ "AttributeName": key.partition.name, "KeyType": "HASH" })];
    if let Some(sort) = &key.sort {
        out.push(json!({ "AttributeName": sort.name, "KeyType": "RANGE" }));
    }
    Value::Array(out)
}

fn throughput(billing: BillingMode) -> Option<Value> {
    match billing {
        BillingMode::PayPerRequest => None,
        BillingMode::Provisioned { read, write } => Some(json!({
            "ReadCapacityUnits": read,
            "WriteCapacityUnits": write,
        })),
    }
}

fn table(spec: &TableSpec) -> Value {
    let definitions: Vec<Value> = spec
        .key_attributes()
        .into_iter()
        .map(|(name, kind)| json!({ "AttributeName": name, "AttributeType": kind.code() }))
        .collect();

    let mut props = Map::new();
    props.insert("KeySchema".into(), key_schema(&spec.key));
    props.insert("AttributeDefinitions".into(), Value::Array(definitions));
    match throughput(spec.billing) {
        None => {
            props.insert("BillingMode".into(), "PAY_PER_REQUEST".into());
        }
        Some(t) => {
            props.insert("BillingMode".into(), "PROVISIONED".into());
            props.insert("ProvisionedThroughput".into(), t);
        }
    }

    if spec.has_secondary() {
        let indexes: Vec<Value> = spec
            .secondary
            .iter()
            .map(|pattern| {
                let mut projection = json!({ "ProjectionType": pattern.projection.code() });
                if let Projection::Include(attrs) = &pattern.projection {
                    projection["NonKeyAttributes"] = json!(attrs);
                }
                let mut index = json!({
                    "IndexName": pattern.name,
                    "KeySchema": key_schema(&pattern.key),
                    "Projection": projection,
                });
                if let Some(t) = throughput(spec.billing) {
                    index["ProvisionedThroughput"] = t;
                }
                index
            })
            .collect();
        props.insert("GlobalSecondaryIndexes".into(), Value::Array(indexes));
    }
    props.insert("TableName".into(), spec.table_name.clone().into());

    with_removal(
        json!({ "Type": "AWS::DynamoDB::Table", "Properties": props }),
        spec.removal,
    )
}

fn bucket(spec: &BucketSpec) -> Value {
    let name = if spec.is_templated_name() {
        json!({ "Fn::Sub": spec.bucket_name })
    } else {
        json!(spec.bucket_name)
    };
    let algorithm = match spec.encryption {
        BucketEncryption::S3Managed => "AES256",
        BucketEncryption::KmsManaged => "aws:kms",
    };

    let mut props = Map::new();
    props.insert("BucketName".into(), name);
    props.insert(
        "BucketEncryption".into(),
        json!({
            "ServerSideEncryptionConfiguration": [
                { "ServerSideEncryptionByDefault": { "SSEAlgorithm": algorithm } }
            ]
        }),
    );
    if spec.versioned {
        props.insert("VersioningConfiguration".into(), json!({ "Status": "Enabled" }));
    }
    if spec.auto_delete_objects {
        props.insert(
            "Tags".into(),
            json!([{ "Key": "devstack:auto-delete-objects", "Value": "true" }]),
        );
    }

    with_removal(
        json!({ "Type": "AWS::S3::Bucket", "Properties": props }),
        spec.removal,
    )
}

/// Template ids of the pieces a network expands into
struct NetworkIds {
    gateway: String,
    attachment: String,
    subnets: Vec<SubnetIds>,
}

struct SubnetIds {
    subnet: String,
    route_table: String,
    association: String,
    default_route: String,
}

impl NetworkIds {
    fn new(id: &LogicalId, spec: &NetworkSpec) -> Self {
        let subnets = (1..=spec.zone_count)
            .map(|n| {
                let base = format!("{id}{}Subnet{n}", spec.subnet_name);
                SubnetIds {
                    subnet: format!("{base}Subnet"),
                    route_table: format!("{base}RouteTable"),
                    association: format!("{base}RouteTableAssociation"),
                    default_route: format!("{base}DefaultRoute"),
                }
            })
            .collect();
        Self {
            gateway: format!("{id}IGW"),
            attachment: format!("{id}VPCGW"),
            subnets,
        }
    }
}

/// Insert a resource, refusing to overwrite an existing id
fn insert(resources: &mut Map<String, Value>, id: impl Into<String>, value: Value) -> Result<(), SynthError> {
    let id = id.into();
    if resources.contains_key(&id) {
        return Err(SynthError::LogicalIdCollision(id));
    }
    resources.insert(id, value);
    Ok(())
}

fn network(
    resources: &mut Map<String, Value>,
    stack: &str,
    id: &LogicalId,
    spec: &NetworkSpec,
) -> Result<(), SynthError> {
    let ids = NetworkIds::new(id, spec);
    let public = spec.visibility == SubnetVisibility::Public;

    insert(
        resources,
        id.as_str(),
        json!({
            "Type": "AWS::EC2::VPC",
            "Properties": {
                "CidrBlock": spec.cidr.to_string(),
                "EnableDnsHostnames": true,
                "EnableDnsSupport": true,
                "InstanceTenancy": "default",
                "Tags": name_tag(stack, id),
            }
        }),
    )?;

    for (index, (cidr, names)) in spec.subnets()?.iter().zip(&ids.subnets).enumerate() {
        let zone = u32::try_from(index).unwrap_or(u32::MAX);
        insert(
            resources,
            names.subnet.clone(),
            json!({
                "Type": "AWS::EC2::Subnet",
                "Properties": {
                    "AvailabilityZone": availability_zone(zone),
                    "CidrBlock": cidr.to_string(),
                    "MapPublicIpOnLaunch": public,
                    "VpcId": reference(id.as_str()),
                }
            }),
        )?;
        insert(
            resources,
            names.route_table.clone(),
            json!({
                "Type": "AWS::EC2::RouteTable",
                "Properties": { "VpcId": reference(id.as_str()) }
            }),
        )?;
        insert(
            resources,
            names.association.clone(),
            json!({
                "Type": "AWS::EC2::SubnetRouteTableAssociation",
                "Properties": {
                    "RouteTableId": reference(&names.route_table),
                    "SubnetId": reference(&names.subnet),
                }
            }),
        )?;
        if public {
            insert(
                resources,
                names.default_route.clone(),
                json!({
                    "Type": "AWS::EC2::Route",
                    "Properties": {
                        "DestinationCidrBlock": "0.0.0.0/0",
                        "GatewayId": reference(&ids.gateway),
                        "RouteTableId": reference(&names.route_table),
                    },
                    "DependsOn": [ids.attachment],
                }),
            )?;
        }
    }

    if public {
        insert(
            resources,
            ids.gateway.clone(),
            json!({
                "Type": "AWS::EC2::InternetGateway",
                "Properties": { "Tags": name_tag(stack, id) }
            }),
        )?;
        insert(
            resources,
            ids.attachment.clone(),
            json!({
                "Type": "AWS::EC2::VPCGatewayAttachment",
                "Properties": {
                    "InternetGatewayId": reference(&ids.gateway),
                    "VpcId": reference(id.as_str()),
                }
            }),
        )?;
    }

    Ok(())
}

fn security_group(policy: &TrafficPolicy) -> Value {
    let ingress: Vec<Value> = policy
        .inbound
        .iter()
        .map(|rule| {
            json!({
                "CidrIp": rule.peer.to_string(),
                "Description": rule.description,
                "FromPort": rule.ports.from,
                "IpProtocol": rule.protocol.as_str(),
                "ToPort": rule.ports.to,
            })
        })
        .collect();

    let egress = if policy.outbound_allow_all {
        json!([{
            "CidrIp": "0.0.0.0/0",
            "Description": "Allow all outbound traffic by default",
            "IpProtocol": "-1",
        }])
    } else {
        json!([{
            "CidrIp": "255.255.255.255/32",
            "Description": "Disallow all traffic",
            "FromPort": 252,
            "IpProtocol": "icmp",
            "ToPort": 86,
        }])
    };

    let mut props = Map::new();
    props.insert("GroupDescription".into(), policy.description.clone().into());
    if !ingress.is_empty() {
        props.insert("SecurityGroupIngress".into(), Value::Array(ingress));
    }
    props.insert("SecurityGroupEgress".into(), egress);
    props.insert("VpcId".into(), reference(policy.network.id().as_str()));

    json!({ "Type": "AWS::EC2::SecurityGroup", "Properties": props })
}

fn managed_policy_arn(name: &str) -> Value {
    json!({
        "Fn::Join": ["", ["arn:", { "Ref": "AWS::Partition" }, format!(":iam::aws:policy/{name}")]]
    })
}

fn identity(
    resources: &mut Map<String, Value>,
    id: &LogicalId,
    spec: &IdentitySpec,
) -> Result<(), SynthError> {
    let managed: Vec<Value> = spec
        .managed_permissions
        .iter()
        .map(|m| managed_policy_arn(m))
        .collect();

    insert(
        resources,
        id.as_str(),
        json!({
            "Type": "AWS::IAM::Role",
            "Properties": {
                "AssumeRolePolicyDocument": {
                    "Statement": [{
                        "Action": "sts:AssumeRole",
                        "Effect": "Allow",
                        "Principal": { "Service": spec.trust_principal },
                    }],
                    "Version": POLICY_VERSION,
                },
                "ManagedPolicyArns": managed,
            }
        }),
    )?;

    for grant in &spec.grants {
        let actions: Vec<&str> = grant.actions.iter().map(|a| a.as_str()).collect();
        let scopes: Vec<Value> = grant.scopes.iter().map(scope_value).collect();
        insert(
            resources,
            grant.policy.as_str(),
            policy_resource(id, grant.policy.as_str(), json!(actions), json!(scopes)),
        )?;
    }

    for grant in &spec.unscoped {
        insert(
            resources,
            grant.policy.as_str(),
            policy_resource(id, grant.policy.as_str(), json!(grant.action()), json!("*")),
        )?;
    }

    Ok(())
}

fn policy_resource(role: &LogicalId, name: &str, actions: Value, scopes: Value) -> Value {
    json!({
        "Type": "AWS::IAM::Policy",
        "Properties": {
            "PolicyDocument": {
                "Statement": [{
                    "Action": actions,
                    "Effect": "Allow",
                    "Resource": scopes,
                }],
                "Version": POLICY_VERSION,
            },
            "PolicyName": name,
            "Roles": [reference(role.as_str())],
        }
    })
}

fn key_pair(stack: &str, id: &LogicalId, spec: &KeyPairSpec) -> Value {
    let key_type = match spec.key_type {
        KeyType::Ed25519 => "ed25519",
        KeyType::Rsa => "rsa",
    };
    let format = match spec.format {
        KeyFormat::Pem => "pem",
        KeyFormat::Ppk => "ppk",
    };
    json!({
        "Type": "AWS::EC2::KeyPair",
        "Properties": {
            "KeyFormat": format,
            "KeyName": format!("{stack}-{id}"),
            "KeyType": key_type,
        }
    })
}

fn host(resources: &mut Map<String, Value>, definition: &StackDefinition) -> Result<(), SynthError> {
    let Some(host) = definition.host() else {
        return Ok(());
    };
    let spec = &host.spec;
    let profile = format!("{}InstanceProfile", host.id);

    insert(
        resources,
        profile.clone(),
        json!({
            "Type": "AWS::IAM::InstanceProfile",
            "Properties": { "Roles": [reference(spec.identity.id().as_str())] }
        }),
    )?;

    let network_id = spec.network.id();
    let network_spec = definition
        .networks()
        .get(network_id)
        .ok_or_else(|| DefinitionError::UndeclaredNetwork(network_id.clone()))?;
    let ids = NetworkIds::new(network_id, network_spec);
    let first = ids
        .subnets
        .first()
        .ok_or(DefinitionError::InvalidZoneCount(network_spec.zone_count))?;

    let mut depends: Vec<String> = definition
        .identities()
        .get(spec.identity.id())
        .map(|identity| identity.policy_names().map(ToString::to_string).collect())
        .unwrap_or_default();
    if network_spec.visibility == SubnetVisibility::Public {
        depends.push(first.default_route.clone());
    }

    let mut props = Map::new();
    props.insert("AvailabilityZone".into(), availability_zone(0));
    props.insert("IamInstanceProfile".into(), reference(&profile));
    props.insert(
        "ImageId".into(),
        format!("{{{{resolve:ssm:{}}}}}", spec.image.parameter()).into(),
    );
    props.insert("InstanceType".into(), spec.instance_type.clone().into());
    if let Some(key) = &spec.key_pair {
        props.insert("KeyName".into(), reference(key.id().as_str()));
    }
    props.insert(
        "SecurityGroupIds".into(),
        json!([get_att(spec.security.id().as_str(), "GroupId")]),
    );
    props.insert("SubnetId".into(), reference(&first.subnet));
    props.insert("Tags".into(), name_tag(definition.name(), &host.id));
    props.insert(
        "UserData".into(),
        json!({ "Fn::Base64": spec.boot_script.as_str() }),
    );

    insert(
        resources,
        host.id.as_str(),
        json!({ "Type": "AWS::EC2::Instance", "Properties": props, "DependsOn": depends }),
    )
}

fn output_value(value: &OutputValue) -> Value {
    match value {
        OutputValue::HostId(h) => reference(h.id().as_str()),
        OutputValue::ResourceName(r) => reference(r.id().as_str()),
    }
}

/// Render a definition as a CloudFormation template
///
/// # Errors
/// - `LogicalIdCollision` if a derived id clashes with a declared one
/// - `Definition` if the network addressing cannot be expanded
pub fn synthesize(definition: &StackDefinition) -> Result<Value, SynthError> {
    let stack = definition.name();
    let mut resources = Map::new();

    for (id, resource) in definition.resources() {
        let value = match resource {
            Resource::Table(t) => table(t),
            Resource::Bucket(b) => bucket(b),
        };
        insert(&mut resources, id.as_str(), value)?;
    }
    for (id, spec) in definition.networks() {
        network(&mut resources, stack, id, spec)?;
    }
    for (id, policy) in definition.security() {
        insert(&mut resources, id.as_str(), security_group(policy))?;
    }
    for (id, spec) in definition.identities() {
        identity(&mut resources, id, spec)?;
    }
    for (id, spec) in definition.key_pairs() {
        insert(&mut resources, id.as_str(), key_pair(stack, id, spec))?;
    }
    host(&mut resources, definition)?;

    let outputs: Map<String, Value> = definition
        .outputs()
        .iter()
        .map(|(name, output)| {
            (
                name.clone(),
                json!({ "Description": output.description, "Value": output_value(&output.value) }),
            )
        })
        .collect();

    let mut template = Map::new();
    template.insert("AWSTemplateFormatVersion".into(), FORMAT_VERSION.into());
    if let Some(description) = definition.description() {
        template.insert("Description".into(), description.into());
    }
    template.insert("Resources".into(), Value::Object(resources));
    if !outputs.is_empty() {
        template.insert("Outputs".into(), Value::Object(outputs));
    }

    tracing::debug!(
        stack,
        resources = template["Resources"].as_object().map_or(0, Map::len),
        "synthesized template"
    );

    Ok(Value::Object(template))
}

/// Engine that writes `<stack>.template.json` into an output directory
#[derive(Debug, Clone)]
pub struct TemplateSynthesizer {
    out_dir: PathBuf,
}

impl TemplateSynthesizer {
    /// Write templates into `out_dir` (created if missing)
    #[inline]
    #[must_use]
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    /// Path the template of `stack` is written to
    #[must_use]
    pub fn template_path(&self, stack: &str) -> PathBuf {
        self.out_dir.join(format!("{stack}.template.json"))
    }

    /// Output directory
    #[inline]
    #[must_use]
    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }
}

#[async_trait]
impl ProvisioningEngine for TemplateSynthesizer {
    type Error = SynthError;

    fn name(&self) -> &'static str {
        "cloudformation-synth"
    }

    async fn deploy(&self, definition: &StackDefinition) -> Result<Deployment, SynthError> {
        let template = synthesize(definition)?;
        let text = serde_json::to_string_pretty(&template)?;

        tokio::fs::create_dir_all(&self.out_dir)
            .await
            .map_err(|source| SynthError::Io {
                path: self.out_dir.clone(),
                source,
            })?;
        let path = self.template_path(definition.name());
        tokio::fs::write(&path, text.as_bytes())
            .await
            .map_err(|source| SynthError::Io {
                path: path.clone(),
                source,
            })?;

        tracing::info!(path = %path.display(), bytes = text.len(), "wrote template");

        let mut outputs = IndexMap::new();
        for (name, output) in definition.outputs() {
            outputs.insert(name.clone(), serde_json::to_string(&output_value(&output.value))?);
        }
        Ok(Deployment::new(definition, outputs))
    }
}
