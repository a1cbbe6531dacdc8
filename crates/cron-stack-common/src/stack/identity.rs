//! Execution identity: the IAM role the instance runs as

use serde::Serialize;
use serde_json::json;

/// A provider-maintained policy attached by name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedPolicy {
    pub name: String,
}

impl ManagedPolicy {
    pub fn aws_managed(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn arn(&self) -> String {
        format!("arn:aws:iam::aws:policy/{}", self.name)
    }
}

/// An IAM role assumable by one service principal
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionIdentity {
    pub service_principal: String,
    pub managed_policies: Vec<ManagedPolicy>,
}

impl ExecutionIdentity {
    pub fn assumed_by(service_principal: impl Into<String>) -> Self {
        Self {
            service_principal: service_principal.into(),
            managed_policies: Vec::new(),
        }
    }

    pub fn with_managed_policy(mut self, policy: ManagedPolicy) -> Self {
        if !self.managed_policies.contains(&policy) {
            self.managed_policies.push(policy);
        }
        self
    }

    /// The role's assume-role policy document
    pub fn trust_policy_document(&self) -> serde_json::Value {
        json!({
            "Version": "2012-10-17",
            "Statement": [{
                "Effect": "Allow",
                "Principal": { "Service": self.service_principal },
                "Action": "sts:AssumeRole"
            }]
        })
    }
}
