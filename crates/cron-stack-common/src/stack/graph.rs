//! The stack definition graph
//!
//! Resources are kept in declaration order. Every reference must name a
//! resource declared earlier, so declaration order is also a valid
//! deployment order and the graph can never contain a cycle.

use std::fmt;

use serde::Serialize;
use serde_json::json;

use super::{
    AssetLocations, BootConfiguration, ComputeInstance, ExecutionIdentity, FirewallPolicy,
    NetworkReference, ScriptAsset, SecurityFinding, StackError, UserData,
};
use crate::defaults::MAX_STACK_NAME_LEN;

/// Stable name of a resource inside a stack
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, derive_more::Display,
)]
#[serde(transparent)]
pub struct LogicalId(String);

impl LogicalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The kinds of resource a stack can declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ResourceType {
    Network,
    Firewall,
    Identity,
    Asset,
    BootConfiguration,
    Instance,
}

impl ResourceType {
    /// CloudFormation-style type name used in synthesized output
    pub fn type_name(self) -> &'static str {
        match self {
            ResourceType::Network => "AWS::EC2::VPC::Lookup",
            ResourceType::Firewall => "AWS::EC2::SecurityGroup",
            ResourceType::Identity => "AWS::IAM::Role",
            ResourceType::Asset => "AWS::S3::Asset",
            ResourceType::BootConfiguration => "AWS::CloudFormation::Init",
            ResourceType::Instance => "AWS::EC2::Instance",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResourceType::Network => "a network reference",
            ResourceType::Firewall => "a firewall policy",
            ResourceType::Identity => "an execution identity",
            ResourceType::Asset => "a script asset",
            ResourceType::BootConfiguration => "a boot configuration",
            ResourceType::Instance => "a compute instance",
        })
    }
}

/// Properties of a declared resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ResourceSpec {
    Network(NetworkReference),
    Firewall(FirewallPolicy),
    Identity(ExecutionIdentity),
    Asset(ScriptAsset),
    BootConfiguration(BootConfiguration),
    Instance(ComputeInstance),
}

impl ResourceSpec {
    pub fn resource_type(&self) -> ResourceType {
        match self {
            ResourceSpec::Network(_) => ResourceType::Network,
            ResourceSpec::Firewall(_) => ResourceType::Firewall,
            ResourceSpec::Identity(_) => ResourceType::Identity,
            ResourceSpec::Asset(_) => ResourceType::Asset,
            ResourceSpec::BootConfiguration(_) => ResourceType::BootConfiguration,
            ResourceSpec::Instance(_) => ResourceType::Instance,
        }
    }

    /// Every resource this one refers to, with the type it must have
    pub fn references(&self) -> Vec<(&LogicalId, ResourceType)> {
        match self {
            ResourceSpec::Network(_) | ResourceSpec::Identity(_) | ResourceSpec::Asset(_) => {
                Vec::new()
            }
            ResourceSpec::Firewall(policy) => {
                let mut refs = vec![(&policy.network, ResourceType::Network)];
                refs.extend(
                    policy
                        .ingress
                        .iter()
                        .filter_map(|rule| rule.peer.network())
                        .map(|id| (id, ResourceType::Network)),
                );
                refs
            }
            ResourceSpec::BootConfiguration(boot) => {
                let mut refs = vec![(&boot.role, ResourceType::Identity)];
                refs.extend(boot.files.iter().map(|f| (&f.asset, ResourceType::Asset)));
                refs
            }
            ResourceSpec::Instance(instance) => vec![
                (&instance.network, ResourceType::Network),
                (&instance.firewall, ResourceType::Firewall),
                (&instance.role, ResourceType::Identity),
                (&instance.init, ResourceType::BootConfiguration),
            ],
        }
    }
}

macro_rules! impl_into_spec {
    ($($variant:ident => $ty:ty),+ $(,)?) => {
        $(
            impl From<$ty> for ResourceSpec {
                fn from(value: $ty) -> Self {
                    ResourceSpec::$variant(value)
                }
            }
        )+
    };
}

impl_into_spec! {
    Network => NetworkReference,
    Firewall => FirewallPolicy,
    Identity => ExecutionIdentity,
    Asset => ScriptAsset,
    BootConfiguration => BootConfiguration,
    Instance => ComputeInstance,
}

/// A resource with its logical id
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub logical_id: LogicalId,
    pub spec: ResourceSpec,
}

impl Resource {
    pub fn resource_type(&self) -> ResourceType {
        self.spec.resource_type()
    }
}

/// Check a stack name is usable as a prefix of AWS resource names
pub fn validate_stack_name(name: &str) -> Result<(), StackError> {
    let invalid = |reason| StackError::InvalidStackName {
        name: name.to_string(),
        reason,
    };
    let Some(first) = name.chars().next() else {
        return Err(invalid("must not be empty"));
    };
    if !first.is_ascii_alphabetic() {
        return Err(invalid("must start with a letter"));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(invalid("may only contain letters, digits and hyphens"));
    }
    if name.len() > MAX_STACK_NAME_LEN {
        return Err(invalid("must be at most 40 characters"));
    }
    Ok(())
}

/// Accumulates resources, checking references as they are added
#[derive(Debug)]
pub struct StackBuilder {
    name: String,
    resources: Vec<Resource>,
}

impl StackBuilder {
    /// Declare a resource after all previously added ones.
    ///
    /// Fails on a reused logical id, or a reference to a resource that is
    /// not declared yet or has the wrong type.
    pub fn add(
        mut self,
        logical_id: LogicalId,
        spec: impl Into<ResourceSpec>,
    ) -> Result<Self, StackError> {
        let spec = spec.into();
        if self.resources.iter().any(|r| r.logical_id == logical_id) {
            return Err(StackError::DuplicateLogicalId(logical_id));
        }
        for (target, expected) in spec.references() {
            let declared = self
                .resources
                .iter()
                .find(|r| &r.logical_id == target)
                .ok_or_else(|| StackError::DanglingReference {
                    from: logical_id.clone(),
                    to: target.clone(),
                })?;
            if declared.resource_type() != expected {
                return Err(StackError::WrongReferenceType {
                    from: logical_id.clone(),
                    to: target.clone(),
                    expected,
                    actual: declared.resource_type(),
                });
            }
        }
        self.resources.push(Resource { logical_id, spec });
        Ok(self)
    }

    pub fn build(self) -> StackDefinition {
        StackDefinition {
            name: self.name,
            resources: self.resources,
        }
    }
}

/// A named, validated, ordered set of declared resources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackDefinition {
    name: String,
    resources: Vec<Resource>,
}

impl StackDefinition {
    pub fn builder(name: impl Into<String>) -> Result<StackBuilder, StackError> {
        let name = name.into();
        validate_stack_name(&name)?;
        Ok(StackBuilder {
            name,
            resources: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resources in declaration order
    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn get(&self, logical_id: &LogicalId) -> Option<&Resource> {
        self.resources.iter().find(|r| &r.logical_id == logical_id)
    }

    pub fn count(&self, resource_type: ResourceType) -> usize {
        self.resources
            .iter()
            .filter(|r| r.resource_type() == resource_type)
            .count()
    }

    fn first<'a, T>(
        &'a self,
        pick: impl Fn(&'a ResourceSpec) -> Option<&'a T>,
    ) -> Option<(&'a LogicalId, &'a T)> {
        self.resources
            .iter()
            .find_map(|r| pick(&r.spec).map(|spec| (&r.logical_id, spec)))
    }

    pub fn network(&self) -> Option<(&LogicalId, &NetworkReference)> {
        self.first(|spec| match spec {
            ResourceSpec::Network(network) => Some(network),
            _ => None,
        })
    }

    pub fn firewall(&self) -> Option<(&LogicalId, &FirewallPolicy)> {
        self.first(|spec| match spec {
            ResourceSpec::Firewall(policy) => Some(policy),
            _ => None,
        })
    }

    pub fn identity(&self) -> Option<(&LogicalId, &ExecutionIdentity)> {
        self.first(|spec| match spec {
            ResourceSpec::Identity(identity) => Some(identity),
            _ => None,
        })
    }

    pub fn asset(&self) -> Option<(&LogicalId, &ScriptAsset)> {
        self.first(|spec| match spec {
            ResourceSpec::Asset(asset) => Some(asset),
            _ => None,
        })
    }

    pub fn boot(&self) -> Option<(&LogicalId, &BootConfiguration)> {
        self.first(|spec| match spec {
            ResourceSpec::BootConfiguration(boot) => Some(boot),
            _ => None,
        })
    }

    pub fn instance(&self) -> Option<(&LogicalId, &ComputeInstance)> {
        self.first(|spec| match spec {
            ResourceSpec::Instance(instance) => Some(instance),
            _ => None,
        })
    }

    /// Final user data of the instance: its boot configuration's file
    /// placement first, then the instance's own commands.
    pub fn render_user_data(&self, locations: &AssetLocations) -> Result<String, StackError> {
        let (_, instance) = self.instance().ok_or_else(|| StackError::MissingResource {
            stack: self.name.clone(),
            missing: ResourceType::Instance,
        })?;
        let boot = match self.get(&instance.init).map(|r| &r.spec) {
            Some(ResourceSpec::BootConfiguration(boot)) => boot,
            _ => {
                return Err(StackError::MissingResource {
                    stack: self.name.clone(),
                    missing: ResourceType::BootConfiguration,
                });
            }
        };

        let mut user_data = UserData::for_linux();
        user_data
            .add_commands(boot.render_commands(locations)?)
            .add_commands(instance.user_data.commands().iter().cloned());
        Ok(user_data.render())
    }

    /// Ingress rules open to the whole internet, across every firewall
    pub fn security_findings(&self) -> Vec<SecurityFinding> {
        self.resources
            .iter()
            .filter_map(|r| match &r.spec {
                ResourceSpec::Firewall(policy) => Some(policy.findings(&r.logical_id)),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Template-like JSON view of the stack. Deterministic for equal stacks.
    pub fn synth(&self) -> serde_json::Value {
        let mut resources = serde_json::Map::new();
        for resource in &self.resources {
            let mut depends_on: Vec<&str> = Vec::new();
            for (id, _) in resource.spec.references() {
                if !depends_on.contains(&id.as_str()) {
                    depends_on.push(id.as_str());
                }
            }
            resources.insert(
                resource.logical_id.to_string(),
                json!({
                    "type": resource.resource_type().type_name(),
                    "dependsOn": depends_on,
                    "properties": resource.spec,
                }),
            );
        }
        let order: Vec<&str> = self.resources.iter().map(|r| r.logical_id.as_str()).collect();

        json!({
            "stack": self.name,
            "order": order,
            "resources": resources,
            "findings": self.security_findings(),
        })
    }
}
