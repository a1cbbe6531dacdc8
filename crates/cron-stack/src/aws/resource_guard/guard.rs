//! RAII guard for a created resource

use std::ops::Deref;

use super::registry::ResourceRegistry;
use super::types::{ResourceId, ResourceMeta};
use crate::aws::iam::InstanceRole;

/// Wraps the handle of a created resource
///
/// Dropping the guard without calling [`commit`](Self::commit) queues the
/// resource for deletion.
///
/// # Example
///
/// ```ignore
/// let builder = ResourceGuardBuilder::new(registry, "Ec2Stack", "us-east-2");
///
/// let group_id = ec2.create_security_group(...).await?;
/// let group = builder.security_group(group_id);
///
/// // An error here drops `group` and the security group is deleted
/// let instance = ec2.launch_instance(config.with_security_group(&*group), None).await?;
///
/// let group_id = group.commit(); // kept
/// ```
pub struct ResourceGuard<T> {
    value: T,
    tracker: Tracker,
}

/// The drop side of a guard, split out so `commit` can move `value` out
struct Tracker {
    resource_id: ResourceId,
    meta: ResourceMeta,
    registry: ResourceRegistry,
    committed: bool,
}

impl Drop for Tracker {
    fn drop(&mut self) {
        if !self.committed {
            self.registry
                .on_drop(self.resource_id.clone(), self.meta.clone());
        }
    }
}

impl<T> ResourceGuard<T> {
    /// Register and wrap a resource (use [`ResourceGuardBuilder`](super::ResourceGuardBuilder))
    pub(crate) fn new(
        value: T,
        resource_id: ResourceId,
        meta: ResourceMeta,
        registry: ResourceRegistry,
    ) -> Self {
        registry.register(resource_id.clone(), meta.clone());

        Self {
            value,
            tracker: Tracker {
                resource_id,
                meta,
                registry,
                committed: false,
            },
        }
    }

    /// Keep the resource; dropping afterwards does nothing
    pub fn commit(self) -> T {
        let ResourceGuard { value, mut tracker } = self;
        tracker.committed = true;
        tracker.registry.commit(&tracker.resource_id);
        value
    }

    pub fn inner(&self) -> &T {
        &self.value
    }

    pub fn resource_id(&self) -> &ResourceId {
        &self.tracker.resource_id
    }

    pub fn meta(&self) -> &ResourceMeta {
        &self.tracker.meta
    }
}

impl<T> Deref for ResourceGuard<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

pub type Ec2InstanceGuard = ResourceGuard<String>;
pub type SecurityGroupGuard = ResourceGuard<String>;
pub type InstanceRoleGuard = ResourceGuard<InstanceRole>;

#[cfg(test)]
mod tests {
    use super::super::registry::CleanupMessage;
    use super::*;
    use tokio::sync::mpsc;

    fn test_registry() -> (ResourceRegistry, mpsc::UnboundedReceiver<CleanupMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ResourceRegistry::new(tx), rx)
    }

    fn meta() -> ResourceMeta {
        ResourceMeta::new("Ec2Stack".into(), "us-east-2".into())
    }

    #[test]
    fn test_commit_prevents_cleanup() {
        let (registry, mut rx) = test_registry();
        let guard = ResourceGuard::new(
            "i-123".to_string(),
            ResourceId::Ec2Instance("i-123".into()),
            meta(),
            registry.clone(),
        );
        assert_eq!(
            registry.outstanding(),
            vec![ResourceId::Ec2Instance("i-123".into())]
        );

        assert_eq!(guard.commit(), "i-123");
        assert!(registry.outstanding().is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_drop_triggers_cleanup() {
        let (registry, mut rx) = test_registry();
        let resource_id = ResourceId::SecurityGroup("sg-123".into());

        {
            let _guard = ResourceGuard::new(
                "sg-123".to_string(),
                resource_id.clone(),
                meta(),
                registry.clone(),
            );
        }

        match rx.try_recv().unwrap() {
            CleanupMessage::ResourceDropped { resource, meta } => {
                assert_eq!(resource, resource_id);
                assert_eq!(meta.stack_name, "Ec2Stack");
            }
            other => panic!("Expected ResourceDropped, got {other:?}"),
        }
        assert!(registry.outstanding().is_empty());
    }

    #[test]
    fn test_deref() {
        let (registry, _rx) = test_registry();
        let guard = ResourceGuard::new(
            "sg-9".to_string(),
            ResourceId::SecurityGroup("sg-9".into()),
            meta(),
            registry,
        );

        assert_eq!(&*guard, "sg-9");
        assert_eq!(guard.resource_id().raw_id(), "sg-9");
        guard.commit();
    }
}
