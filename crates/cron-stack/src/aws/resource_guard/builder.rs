//! Builder stamping every guard of one deployment with the same metadata

use super::guard::{Ec2InstanceGuard, InstanceRoleGuard, ResourceGuard, SecurityGroupGuard};
use super::registry::ResourceRegistry;
use super::types::{ResourceId, ResourceMeta};
use crate::aws::iam::InstanceRole;

/// Creates guards for the resources of one stack in one region
pub struct ResourceGuardBuilder {
    registry: ResourceRegistry,
    stack_name: String,
    region: String,
}

impl ResourceGuardBuilder {
    pub fn new(
        registry: ResourceRegistry,
        stack_name: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            stack_name: stack_name.into(),
            region: region.into(),
        }
    }

    pub fn stack_name(&self) -> &str {
        &self.stack_name
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    fn meta(&self) -> ResourceMeta {
        ResourceMeta::new(self.stack_name.clone(), self.region.clone())
    }

    pub fn ec2_instance(&self, instance_id: impl Into<String>) -> Ec2InstanceGuard {
        let id = instance_id.into();
        ResourceGuard::new(
            id.clone(),
            ResourceId::Ec2Instance(id),
            self.meta(),
            self.registry.clone(),
        )
    }

    pub fn security_group(&self, group_id: impl Into<String>) -> SecurityGroupGuard {
        let id = group_id.into();
        ResourceGuard::new(
            id.clone(),
            ResourceId::SecurityGroup(id),
            self.meta(),
            self.registry.clone(),
        )
    }

    /// Guard a role together with its instance profile
    pub fn instance_role(&self, role: InstanceRole) -> InstanceRoleGuard {
        let id = ResourceId::IamRole(role.role_name.clone());
        ResourceGuard::new(role, id, self.meta(), self.registry.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_builder_creates_guards() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let registry = ResourceRegistry::new(tx);
        let builder = ResourceGuardBuilder::new(registry.clone(), "Ec2Stack", "us-east-2");

        let guard = builder.ec2_instance("i-12345678");
        assert_eq!(*guard, "i-12345678");
        assert_eq!(guard.meta().region, "us-east-2");
        guard.commit();

        let guard = builder.instance_role(InstanceRole {
            role_name: "Ec2Stack-InstanceRole".into(),
            role_arn: "arn:aws:iam::123456789012:role/cron-stack/Ec2Stack-InstanceRole".into(),
            instance_profile_name: "Ec2Stack-InstanceRole".into(),
        });
        assert_eq!(
            guard.resource_id(),
            &ResourceId::IamRole("Ec2Stack-InstanceRole".into())
        );
        assert_eq!(registry.outstanding().len(), 1);
        guard.commit();

        assert!(registry.outstanding().is_empty());
    }
}
