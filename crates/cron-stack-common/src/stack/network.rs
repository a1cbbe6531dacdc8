//! Network reference: the VPC the stack is placed into

use serde::Serialize;

use super::Ipv4Cidr;

/// How the VPC is found at deploy time
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "lookup", content = "vpcId", rename_all = "camelCase")]
pub enum VpcLookup {
    /// The account's default VPC in the deployment region
    Default,
    /// A specific VPC
    ById(String),
}

/// Read-only reference to an existing VPC. Deploying it creates nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkReference {
    pub lookup: VpcLookup,
}

impl NetworkReference {
    pub fn default_vpc() -> Self {
        Self {
            lookup: VpcLookup::Default,
        }
    }

    pub fn vpc(lookup: VpcLookup) -> Self {
        Self { lookup }
    }
}

/// A network reference after the VPC lookup ran
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedNetwork {
    pub vpc_id: String,
    pub cidr_block: Ipv4Cidr,
    /// Subnet of the VPC that instances are launched into
    pub subnet_id: String,
}
