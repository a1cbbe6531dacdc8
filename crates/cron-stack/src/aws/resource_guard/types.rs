//! Identifiers and metadata for tracked resources

use chrono::{DateTime, Utc};
use cron_stack_common::ResourceKind;

/// A created AWS resource that may need rolling back
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceId {
    Ec2Instance(String),
    /// Role name; the instance profile shares it and goes with the role
    IamRole(String),
    SecurityGroup(String),
}

impl ResourceId {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceId::Ec2Instance(_) => ResourceKind::Ec2Instance,
            ResourceId::IamRole(_) => ResourceKind::IamRole,
            ResourceId::SecurityGroup(_) => ResourceKind::SecurityGroup,
        }
    }

    /// Lower = cleaned up first
    pub fn cleanup_priority(&self) -> u8 {
        self.kind().cleanup_priority()
    }

    /// Instance ID, role name or group ID
    pub fn raw_id(&self) -> &str {
        match self {
            ResourceId::Ec2Instance(id)
            | ResourceId::IamRole(id)
            | ResourceId::SecurityGroup(id) => id,
        }
    }

    /// Human-readable description for logging
    pub fn description(&self) -> String {
        format!("{} {}", self.kind(), self.raw_id())
    }
}

/// Where and when a tracked resource was created
#[derive(Debug, Clone)]
pub struct ResourceMeta {
    pub stack_name: String,
    pub region: String,
    pub created_at: DateTime<Utc>,
}

impl ResourceMeta {
    /// Metadata for a resource created now
    pub fn new(stack_name: String, region: String) -> Self {
        Self {
            stack_name,
            region,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_follows_dependencies() {
        let instance = ResourceId::Ec2Instance("i-1".into());
        let role = ResourceId::IamRole("Ec2Stack-InstanceRole".into());
        let group = ResourceId::SecurityGroup("sg-1".into());

        assert!(instance.cleanup_priority() < role.cleanup_priority());
        assert!(role.cleanup_priority() < group.cleanup_priority());
    }

    #[test]
    fn test_description() {
        let group = ResourceId::SecurityGroup("sg-0abc".into());
        assert_eq!(group.description(), "Security Group sg-0abc");
        assert_eq!(group.raw_id(), "sg-0abc");
    }
}
