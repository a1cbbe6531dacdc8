//! Background executor deleting dropped resources in dependency order

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::registry::{CleanupMessage, ResourceRegistry};
use super::types::{ResourceId, ResourceMeta};
use crate::aws::error::classify_anyhow_error;

/// Deletes one resource; implemented over the EC2 and IAM operations
pub trait ResourceCleaner: Send + Sync + 'static {
    fn cleanup(&self, resource: &ResourceId) -> impl Future<Output = Result<()>> + Send;
}

struct CleanupItem {
    resource: ResourceId,
    meta: ResourceMeta,
}

impl PartialEq for CleanupItem {
    fn eq(&self, other: &Self) -> bool {
        self.resource.cleanup_priority() == other.resource.cleanup_priority()
    }
}

impl Eq for CleanupItem {}

impl PartialOrd for CleanupItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CleanupItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; lowest priority number pops first
        other
            .resource
            .cleanup_priority()
            .cmp(&self.resource.cleanup_priority())
    }
}

/// What the executor did before it stopped
#[derive(Debug, Default)]
pub struct CleanupReport {
    pub cleaned: Vec<ResourceId>,
    /// Resources left behind, with the error that stopped their deletion
    pub failed: Vec<(ResourceId, String)>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Receives dropped resources and deletes them
pub struct CleanupExecutor<C> {
    rx: mpsc::UnboundedReceiver<CleanupMessage>,
    cleaner: C,
}

impl<C: ResourceCleaner> CleanupExecutor<C> {
    pub fn new(rx: mpsc::UnboundedReceiver<CleanupMessage>, cleaner: C) -> Self {
        Self { rx, cleaner }
    }

    /// Run until `Shutdown` or until every registry handle is gone
    pub async fn run(mut self) -> CleanupReport {
        let mut pending: BinaryHeap<CleanupItem> = BinaryHeap::new();
        let mut report = CleanupReport::default();

        loop {
            tokio::select! {
                msg = self.rx.recv() => {
                    match msg {
                        Some(CleanupMessage::ResourceDropped { resource, meta }) => {
                            debug!(resource = %resource.description(), "Queued for cleanup");
                            pending.push(CleanupItem { resource, meta });
                        }
                        Some(CleanupMessage::Shutdown) | None => break,
                    }
                }
                // Guards of one failed step drop together; wait for the batch
                _ = tokio::time::sleep(Duration::from_millis(100)), if !pending.is_empty() => {
                    self.process_pending(&mut pending, &mut report).await;
                }
            }
        }

        // Anything sent before Shutdown is still buffered
        while let Ok(msg) = self.rx.try_recv() {
            if let CleanupMessage::ResourceDropped { resource, meta } = msg {
                pending.push(CleanupItem { resource, meta });
            }
        }

        if !pending.is_empty() {
            info!(count = pending.len(), "Rolling back remaining resources");
            self.process_pending(&mut pending, &mut report).await;
        }

        debug!(
            cleaned = report.cleaned.len(),
            failed = report.failed.len(),
            "Cleanup executor finished"
        );
        report
    }

    async fn process_pending(
        &self,
        pending: &mut BinaryHeap<CleanupItem>,
        report: &mut CleanupReport,
    ) {
        while let Some(item) = pending.pop() {
            let description = item.resource.description();
            match self.cleaner.cleanup(&item.resource).await {
                Ok(()) => {
                    info!(
                        resource = %description,
                        stack = %item.meta.stack_name,
                        region = %item.meta.region,
                        "Rolled back resource"
                    );
                    report.cleaned.push(item.resource);
                }
                Err(e) if classify_anyhow_error(&e).is_not_found() => {
                    debug!(resource = %description, "Resource already deleted");
                    report.cleaned.push(item.resource);
                }
                Err(e) => {
                    warn!(resource = %description, error = ?e, "Failed to roll back resource");
                    report.failed.push((item.resource, format!("{e:#}")));
                }
            }
        }
    }
}

/// Create a registry and the executor draining it
///
/// The executor is meant to be spawned; guards use the registry.
pub fn create_cleanup_system<C: ResourceCleaner>(
    cleaner: C,
) -> (ResourceRegistry, CleanupExecutor<C>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ResourceRegistry::new(tx), CleanupExecutor::new(rx, cleaner))
}
