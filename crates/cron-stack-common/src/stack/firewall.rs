//! Firewall policy: the security group declared for the instance

use std::collections::BTreeSet;

use serde::Serialize;

use super::{Ipv4Cidr, LogicalId, ResolvedNetwork};
use crate::defaults::SSH_PORT;

/// Transport protocol of an ingress rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
}

impl Protocol {
    /// Protocol name as the EC2 API expects it
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
        }
    }
}

/// Source of inbound traffic
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum Peer {
    /// `0.0.0.0/0`
    AnyIpv4,
    /// A fixed CIDR block
    Cidr(Ipv4Cidr),
    /// The CIDR block of a network declared in the same stack
    NetworkCidr(LogicalId),
}

impl Peer {
    /// Peer for a CIDR; `0.0.0.0/0` becomes [`Peer::AnyIpv4`]
    pub fn ipv4(cidr: Ipv4Cidr) -> Self {
        if cidr.is_any() {
            Peer::AnyIpv4
        } else {
            Peer::Cidr(cidr)
        }
    }

    /// CIDR this peer stands for once its network has been looked up
    pub fn resolve(&self, network: &ResolvedNetwork) -> Ipv4Cidr {
        match self {
            Peer::AnyIpv4 => Ipv4Cidr::ANY,
            Peer::Cidr(cidr) => *cidr,
            Peer::NetworkCidr(_) => network.cidr_block,
        }
    }

    pub fn is_any_ipv4(&self) -> bool {
        match self {
            Peer::AnyIpv4 => true,
            Peer::Cidr(cidr) => cidr.is_any(),
            Peer::NetworkCidr(_) => false,
        }
    }

    pub(crate) fn network(&self) -> Option<&LogicalId> {
        match self {
            Peer::NetworkCidr(id) => Some(id),
            _ => None,
        }
    }
}

/// One allow rule for inbound traffic on a single port
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressRule {
    pub peer: Peer,
    pub protocol: Protocol,
    pub port: u16,
    pub description: String,
}

/// Outbound traffic policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EgressPolicy {
    /// All outbound traffic is permitted
    AllowAll,
}

/// A security group bound to a network
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FirewallPolicy {
    pub network: LogicalId,
    pub description: String,
    pub ingress: Vec<IngressRule>,
    pub egress: EgressPolicy,
}

impl FirewallPolicy {
    /// A policy with no ingress rules that allows all outbound traffic
    pub fn new(network: LogicalId, description: impl Into<String>) -> Self {
        Self {
            network,
            description: description.into(),
            ingress: Vec::new(),
            egress: EgressPolicy::AllowAll,
        }
    }

    /// Allow TCP traffic from `peer` to `port`.
    ///
    /// A second rule for the same peer and port is ignored, as EC2 would
    /// reject it as a duplicate permission.
    pub fn add_ingress_rule(
        &mut self,
        peer: Peer,
        port: u16,
        description: impl Into<String>,
    ) -> &mut Self {
        let duplicate = self
            .ingress
            .iter()
            .any(|rule| rule.peer == peer && rule.port == port && rule.protocol == Protocol::Tcp);
        if !duplicate {
            self.ingress.push(IngressRule {
                peer,
                protocol: Protocol::Tcp,
                port,
                description: description.into(),
            });
        }
        self
    }

    /// Ports reachable through any ingress rule
    pub fn exposed_ports(&self) -> BTreeSet<u16> {
        self.ingress.iter().map(|rule| rule.port).collect()
    }

    /// Findings for rules that open a port to the whole internet
    pub fn findings(&self, logical_id: &LogicalId) -> Vec<SecurityFinding> {
        self.ingress
            .iter()
            .filter(|rule| rule.peer.is_any_ipv4())
            .map(|rule| {
                let message = if rule.port == SSH_PORT {
                    "SSH (TCP/22) is reachable from 0.0.0.0/0; restrict it with --ssh-cidr or use Session Manager instead".to_string()
                } else {
                    format!("TCP/{} is reachable from 0.0.0.0/0", rule.port)
                };
                SecurityFinding {
                    resource: logical_id.clone(),
                    port: rule.port,
                    source: Ipv4Cidr::ANY,
                    message,
                }
            })
            .collect()
    }
}

/// A firewall rule worth a human's attention before deploying
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityFinding {
    pub resource: LogicalId,
    pub port: u16,
    pub source: Ipv4Cidr,
    pub message: String,
}
