//! Registry of uncommitted resources, shared by all guards of a deployment

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::warn;

use super::types::{ResourceId, ResourceMeta};

/// Message sent to the cleanup executor
#[derive(Debug)]
pub enum CleanupMessage {
    /// A guard was dropped without commit
    ResourceDropped {
        resource: ResourceId,
        meta: ResourceMeta,
    },
    /// Deployment finished; process what is queued and stop
    Shutdown,
}

/// Live resources that have not been committed yet
#[derive(Clone)]
pub struct ResourceRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    resources: Mutex<HashMap<ResourceId, ResourceMeta>>,
    cleanup_tx: mpsc::UnboundedSender<CleanupMessage>,
}

impl ResourceRegistry {
    pub fn new(cleanup_tx: mpsc::UnboundedSender<CleanupMessage>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                resources: Mutex::new(HashMap::new()),
                cleanup_tx,
            }),
        }
    }

    // A panic while holding the lock leaves the map itself intact
    fn resources(&self) -> MutexGuard<'_, HashMap<ResourceId, ResourceMeta>> {
        self.inner
            .resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Track a resource; call right after AWS reports it created
    pub fn register(&self, resource: ResourceId, meta: ResourceMeta) {
        self.resources().insert(resource, meta);
    }

    /// Stop tracking a resource without cleaning it up
    pub fn commit(&self, resource: &ResourceId) -> Option<ResourceMeta> {
        self.resources().remove(resource)
    }

    /// Called when a guard is dropped without commit
    pub fn on_drop(&self, resource: ResourceId, meta: ResourceMeta) {
        self.resources().remove(&resource);

        // The executor may already be gone; the resource then stays tagged
        // `creating` and `destroy` finds it
        let _ = self
            .inner
            .cleanup_tx
            .send(CleanupMessage::ResourceDropped { resource, meta });
    }

    /// Resources whose guard is still alive, in cleanup order
    pub fn outstanding(&self) -> Vec<ResourceId> {
        let mut resources: Vec<ResourceId> = self.resources().keys().cloned().collect();
        resources.sort_by(|a, b| {
            a.cleanup_priority()
                .cmp(&b.cleanup_priority())
                .then_with(|| a.raw_id().cmp(b.raw_id()))
        });
        resources
    }

    /// Ask the cleanup executor to finish.
    ///
    /// Returns the resources still guarded at this point. The executor never
    /// hears about them, so they are not rolled back.
    pub fn shutdown(&self) -> Vec<ResourceId> {
        let _ = self.inner.cleanup_tx.send(CleanupMessage::Shutdown);

        let outstanding = self.outstanding();
        for resource in &outstanding {
            let meta = self.resources().get(resource).cloned();
            warn!(
                resource = %resource.description(),
                created_at = ?meta.map(|m| m.created_at),
                "Guard still alive at shutdown; resource will not be rolled back"
            );
        }
        outstanding
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_commit() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let registry = ResourceRegistry::new(tx);
        let id = ResourceId::SecurityGroup("sg-1".into());

        registry.register(id.clone(), ResourceMeta::new("s".into(), "us-east-2".into()));
        assert_eq!(registry.outstanding(), vec![id.clone()]);

        assert!(registry.commit(&id).is_some());
        assert!(registry.outstanding().is_empty());
        assert!(registry.commit(&id).is_none());
        assert!(registry.shutdown().is_empty());
    }

    #[test]
    fn test_on_drop_sends_message() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let registry = ResourceRegistry::new(tx);
        let id = ResourceId::Ec2Instance("i-1".into());
        let meta = ResourceMeta::new("s".into(), "us-east-2".into());

        registry.register(id.clone(), meta.clone());
        registry.on_drop(id.clone(), meta);

        assert!(registry.shutdown().is_empty());
        assert!(matches!(
            rx.try_recv(),
            Ok(CleanupMessage::ResourceDropped { resource, .. }) if resource == id
        ));
        assert!(matches!(rx.try_recv(), Ok(CleanupMessage::Shutdown)));
    }

    #[test]
    fn test_shutdown_reports_live_guards() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let registry = ResourceRegistry::new(tx);
        let meta = ResourceMeta::new("s".into(), "us-east-2".into());
        let group = ResourceId::SecurityGroup("sg-1".into());
        let instance = ResourceId::Ec2Instance("i-1".into());

        registry.register(group.clone(), meta.clone());
        registry.register(instance.clone(), meta);

        // Neither committed nor dropped: the executor gets only the shutdown
        assert_eq!(registry.shutdown(), vec![instance, group]);
        assert!(matches!(rx.try_recv(), Ok(CleanupMessage::Shutdown)));
        assert!(rx.try_recv().is_err());
    }
}
