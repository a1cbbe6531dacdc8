//! Tag-based teardown of a deployed stack
//!
//! Nothing about a deployment is stored locally, so teardown rediscovers
//! the stack's resources through their `cron-stack:stack` tag and deletes
//! them in dependency order. Deletes are idempotent; a resource that is
//! already gone counts as deleted.

use anyhow::{Result, bail};
use cron_stack_common::ResourceKind;
use futures::future::join_all;
use serde::Serialize;
use tracing::{info, warn};

use crate::aws::ec2::Ec2Operations;
use crate::aws::iam::IamOperations;
use crate::aws::scanner::DiscoveredResource;

/// Fail if any resource of `stack_name` already exists
///
/// Deployments only create; updating a live stack in place is not supported.
pub fn ensure_not_deployed(stack_name: &str, existing: &[DiscoveredResource]) -> Result<()> {
    if existing.is_empty() {
        return Ok(());
    }

    let listed = existing
        .iter()
        .map(|r| format!("{} {}", r.kind, r.resource_id))
        .collect::<Vec<_>>()
        .join(", ");
    bail!(
        "Stack {stack_name} already has {} resource(s) ({listed}); run `cron-stack destroy --execute` first",
        existing.len()
    )
}

/// Order resources for deletion: instances, instance profiles, roles, security groups
pub fn plan_teardown(mut resources: Vec<DiscoveredResource>) -> Vec<DiscoveredResource> {
    resources.sort_by_key(|r| r.kind.cleanup_priority());
    resources
}

/// Outcome of a teardown
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct TeardownReport {
    pub total_found: usize,
    pub instances: usize,
    pub instance_profiles: usize,
    pub roles: usize,
    pub security_groups: usize,
    pub deleted: usize,
    pub failed: usize,
    /// Left alone because of a dry run
    pub skipped: usize,
}

impl TeardownReport {
    fn count(&mut self, kind: ResourceKind) {
        match kind {
            ResourceKind::Ec2Instance => self.instances += 1,
            ResourceKind::IamInstanceProfile => self.instance_profiles += 1,
            ResourceKind::IamRole => self.roles += 1,
            ResourceKind::SecurityGroup => self.security_groups += 1,
        }
    }
}

/// Deletes the discovered resources of one stack
pub struct StackDestroyer<E, I> {
    ec2: E,
    iam: I,
}

impl<E: Ec2Operations, I: IamOperations> StackDestroyer<E, I> {
    pub fn new(ec2: E, iam: I) -> Self {
        Self { ec2, iam }
    }

    /// Delete `resources` in teardown order; with `dry_run` only count them.
    ///
    /// A failed delete is counted and teardown moves on to the next resource.
    pub async fn destroy(
        &self,
        stack_name: &str,
        resources: Vec<DiscoveredResource>,
        dry_run: bool,
    ) -> Result<TeardownReport> {
        let resources = plan_teardown(resources);

        let mut report = TeardownReport {
            total_found: resources.len(),
            ..Default::default()
        };
        if resources.is_empty() {
            info!(stack = %stack_name, "No resources found");
            return Ok(report);
        }

        let mut terminated: Vec<String> = Vec::new();

        for resource in &resources {
            report.count(resource.kind);
            let id = resource.resource_id.as_str();

            if dry_run {
                info!(kind = %resource.kind, id = %id, "[DRY RUN] Would delete");
                report.skipped += 1;
                continue;
            }

            let result = match resource.kind {
                ResourceKind::Ec2Instance => {
                    let result = self.ec2.terminate_instance(id).await;
                    if result.is_ok() {
                        terminated.push(id.to_string());
                    }
                    result
                }
                ResourceKind::IamInstanceProfile => self.iam.delete_instance_profile(id).await,
                ResourceKind::IamRole => self.iam.delete_role(id).await,
                ResourceKind::SecurityGroup => {
                    // Groups stay in use until their instances are gone
                    self.wait_for_terminated(terminated.drain(..)).await;
                    self.ec2.delete_security_group(id).await
                }
            };

            match result {
                Ok(()) => {
                    info!(kind = %resource.kind, id = %id, "Deleted");
                    report.deleted += 1;
                }
                Err(e) => {
                    warn!(kind = %resource.kind, id = %id, error = ?e, "Failed to delete");
                    report.failed += 1;
                }
            }
        }

        // Instances of a stack whose group was already gone
        self.wait_for_terminated(terminated.drain(..)).await;

        info!(
            stack = %stack_name,
            deleted = report.deleted,
            failed = report.failed,
            skipped = report.skipped,
            "Teardown finished"
        );
        Ok(report)
    }

    async fn wait_for_terminated(&self, instance_ids: impl Iterator<Item = String>) {
        let waits = instance_ids.map(|instance_id| async move {
            if let Err(e) = self.ec2.wait_for_terminated(&instance_id).await {
                warn!(instance_id = %instance_id, error = ?e, "Instance did not terminate");
            }
        });
        join_all(waits).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CallLog, FakeEc2, FakeIam, fakes};

    fn resource(kind: ResourceKind, id: &str) -> DiscoveredResource {
        DiscoveredResource {
            kind,
            resource_id: id.to_string(),
            region: "us-east-2".to_string(),
            stack_name: "Ec2Stack".to_string(),
            logical_id: None,
            created_at: None,
            status: None,
        }
    }

    #[test]
    fn test_teardown_order() {
        let plan = plan_teardown(vec![
            resource(ResourceKind::SecurityGroup, "sg-1"),
            resource(ResourceKind::IamRole, "Ec2Stack-InstanceRole"),
            resource(ResourceKind::Ec2Instance, "i-1"),
            resource(ResourceKind::IamInstanceProfile, "Ec2Stack-InstanceRole"),
        ]);

        let kinds: Vec<_> = plan.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ResourceKind::Ec2Instance,
                ResourceKind::IamInstanceProfile,
                ResourceKind::IamRole,
                ResourceKind::SecurityGroup,
            ]
        );
    }

    #[test]
    fn test_teardown_order_is_stable() {
        let plan = plan_teardown(vec![
            resource(ResourceKind::Ec2Instance, "i-2"),
            resource(ResourceKind::SecurityGroup, "sg-1"),
            resource(ResourceKind::Ec2Instance, "i-1"),
        ]);
        let ids: Vec<_> = plan.iter().map(|r| r.resource_id.as_str()).collect();
        assert_eq!(ids, vec!["i-2", "i-1", "sg-1"]);
    }

    #[test]
    fn test_existing_resources_block_deploy() {
        assert!(ensure_not_deployed("Ec2Stack", &[]).is_ok());

        let err = ensure_not_deployed("Ec2Stack", &[resource(ResourceKind::SecurityGroup, "sg-1")])
            .unwrap_err()
            .to_string();
        assert!(err.contains("Security Group sg-1"));
        assert!(err.contains("destroy --execute"));
    }

    #[test]
    fn test_report_counts_kinds() {
        let mut report = TeardownReport::default();
        report.count(ResourceKind::Ec2Instance);
        report.count(ResourceKind::IamRole);
        report.count(ResourceKind::IamRole);
        assert_eq!(report.instances, 1);
        assert_eq!(report.roles, 2);
        assert_eq!(report.security_groups, 0);
    }

    fn deployed_stack() -> Vec<DiscoveredResource> {
        vec![
            resource(ResourceKind::SecurityGroup, "sg-1"),
            resource(ResourceKind::IamRole, "Ec2Stack-InstanceRole"),
            resource(ResourceKind::IamInstanceProfile, "Ec2Stack-InstanceRole"),
            resource(ResourceKind::Ec2Instance, "i-1"),
        ]
    }

    fn destroyer() -> (CallLog, StackDestroyer<FakeEc2, FakeIam>) {
        let (log, ec2, iam, _) = fakes();
        (log, StackDestroyer::new(ec2, iam))
    }

    #[tokio::test]
    async fn test_dry_run_deletes_nothing() {
        let (log, destroyer) = destroyer();
        let report = destroyer
            .destroy("Ec2Stack", deployed_stack(), true)
            .await
            .unwrap();

        assert!(log.calls().is_empty(), "{:?}", log.calls());
        assert_eq!(report.total_found, 4);
        assert_eq!(report.skipped, 4);
        assert_eq!(report.deleted, 0);
        assert_eq!(report.instances, 1);
        assert_eq!(report.instance_profiles, 1);
        assert_eq!(report.roles, 1);
        assert_eq!(report.security_groups, 1);
    }

    #[tokio::test]
    async fn test_security_group_deleted_after_instance_terminated() {
        let (log, destroyer) = destroyer();
        let report = destroyer
            .destroy("Ec2Stack", deployed_stack(), false)
            .await
            .unwrap();

        let order = [
            "ec2:terminate_instance:i-1",
            "iam:delete_instance_profile:Ec2Stack-InstanceRole",
            "iam:delete_role:Ec2Stack-InstanceRole",
            "ec2:wait_for_terminated:i-1",
            "ec2:delete_security_group:sg-1",
        ];
        let positions: Vec<usize> = order
            .iter()
            .map(|prefix| log.position(prefix).unwrap_or_else(|| panic!("missing {prefix}")))
            .collect();
        assert!(
            positions.windows(2).all(|w| w[0] < w[1]),
            "unexpected order: {:?}",
            log.calls()
        );
        assert_eq!(report.deleted, 4);
        assert_eq!(report.failed, 0);
        assert_eq!(report.skipped, 0);
    }

    #[tokio::test]
    async fn test_failed_delete_counted_and_teardown_continues() {
        let (log, ec2, mut iam, _) = fakes();
        iam.fail_delete_role = true;
        let report = StackDestroyer::new(ec2, iam)
            .destroy("Ec2Stack", deployed_stack(), false)
            .await
            .unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.deleted, 3);
        assert!(log.contains("ec2:delete_security_group:sg-1"));
    }

    #[tokio::test]
    async fn test_instances_waited_on_without_security_group() {
        let (log, destroyer) = destroyer();
        let report = destroyer
            .destroy("Ec2Stack", vec![resource(ResourceKind::Ec2Instance, "i-1")], false)
            .await
            .unwrap();

        assert_eq!(report.deleted, 1);
        assert!(log.contains("ec2:wait_for_terminated:i-1"));
    }

    #[tokio::test]
    async fn test_nothing_found() {
        let (log, destroyer) = destroyer();
        let report = destroyer.destroy("Ec2Stack", Vec::new(), false).await.unwrap();
        assert_eq!(report, TeardownReport::default());
        assert!(log.calls().is_empty());
    }
}
