//! Tag-based discovery of a stack's resources
//!
//! The deployed stack keeps no local state. `status`, `destroy` and the
//! pre-flight check of `deploy` all find resources through their tags.

use std::collections::HashMap;

use anyhow::{Context, Result};
use aws_sdk_ec2::types::Filter;
use chrono::{DateTime, Utc};
use cron_stack_common::ResourceKind;
use cron_stack_common::defaults::IAM_PATH;
use serde::Serialize;
use tracing::debug;

use crate::aws::context::{AwsContext, FromAwsContext};
use crate::aws::tags::{
    self, TAG_CREATED_AT, TAG_LOGICAL_ID, TAG_REGION, TAG_STACK, TAG_STATUS, TAG_TOOL,
    TAG_TOOL_VALUE,
};

/// A cron-stack resource found in AWS
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredResource {
    pub kind: ResourceKind,
    /// Instance ID, security group ID, or IAM name
    pub resource_id: String,
    pub region: String,
    pub stack_name: String,
    pub logical_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub status: Option<String>,
}

/// Build a resource from its tags, if they mark it as part of a cron stack.
///
/// With `stack_name` set, resources of other stacks are skipped too. IAM
/// lists the same roles and profiles from every region, so global kinds
/// must carry a region tag naming `region`.
pub fn resource_from_tags(
    kind: ResourceKind,
    resource_id: &str,
    region: &str,
    tags: &HashMap<String, String>,
    stack_name: Option<&str>,
) -> Option<DiscoveredResource> {
    if tags.get(TAG_TOOL).map(String::as_str) != Some(TAG_TOOL_VALUE) {
        return None;
    }
    let stack = tags.get(TAG_STACK)?;
    if stack_name.is_some_and(|wanted| wanted != stack) {
        return None;
    }
    if kind.is_global() && tags.get(TAG_REGION).map(String::as_str) != Some(region) {
        return None;
    }

    Some(DiscoveredResource {
        kind,
        resource_id: resource_id.to_string(),
        region: region.to_string(),
        stack_name: stack.clone(),
        logical_id: tags.get(TAG_LOGICAL_ID).cloned(),
        created_at: tags
            .get(TAG_CREATED_AT)
            .and_then(|s| tags::parse_created_at(s)),
        status: tags.get(TAG_STATUS).cloned(),
    })
}

fn ec2_tag_map(tags: &[aws_sdk_ec2::types::Tag]) -> HashMap<String, String> {
    tags.iter()
        .filter_map(|t| Some((t.key()?.to_string(), t.value()?.to_string())))
        .collect()
}

fn iam_tag_map(tags: &[aws_sdk_iam::types::Tag]) -> HashMap<String, String> {
    tags.iter()
        .map(|t| (t.key().to_string(), t.value().to_string()))
        .collect()
}

/// Finds cron-stack resources in one region
pub struct StackScanner {
    ctx: AwsContext,
}

impl FromAwsContext for StackScanner {
    fn from_context(ctx: &AwsContext) -> Self {
        Self { ctx: ctx.clone() }
    }
}

impl StackScanner {
    /// All resources of `stack_name`, or of every cron stack when `None`
    pub async fn scan(&self, stack_name: Option<&str>) -> Result<Vec<DiscoveredResource>> {
        let (instances, groups, roles, profiles) = tokio::join!(
            self.scan_instances(stack_name),
            self.scan_security_groups(stack_name),
            self.scan_roles(stack_name),
            self.scan_instance_profiles(stack_name),
        );

        let mut resources = instances?;
        resources.extend(groups?);
        resources.extend(roles?);
        resources.extend(profiles?);
        Ok(resources)
    }

    async fn scan_instances(&self, stack_name: Option<&str>) -> Result<Vec<DiscoveredResource>> {
        let mut filters = tags::ec2_stack_filters(stack_name);
        filters.push(
            Filter::builder()
                .name("instance-state-name")
                .values("pending")
                .values("running")
                .values("shutting-down")
                .values("stopping")
                .values("stopped")
                .build(),
        );

        let response = self
            .ctx
            .ec2_client()
            .describe_instances()
            .set_filters(Some(filters))
            .send()
            .await
            .context("Failed to describe instances")?;

        let resources: Vec<_> = response
            .reservations()
            .iter()
            .flat_map(|r| r.instances())
            .filter_map(|instance| {
                resource_from_tags(
                    ResourceKind::Ec2Instance,
                    instance.instance_id()?,
                    self.ctx.region(),
                    &ec2_tag_map(instance.tags()),
                    stack_name,
                )
            })
            .collect();

        debug!(count = resources.len(), "Found EC2 instances");
        Ok(resources)
    }

    async fn scan_security_groups(
        &self,
        stack_name: Option<&str>,
    ) -> Result<Vec<DiscoveredResource>> {
        let response = self
            .ctx
            .ec2_client()
            .describe_security_groups()
            .set_filters(Some(tags::ec2_stack_filters(stack_name)))
            .send()
            .await
            .context("Failed to describe security groups")?;

        let resources: Vec<_> = response
            .security_groups()
            .iter()
            .filter_map(|group| {
                resource_from_tags(
                    ResourceKind::SecurityGroup,
                    group.group_id()?,
                    self.ctx.region(),
                    &ec2_tag_map(group.tags()),
                    stack_name,
                )
            })
            .collect();

        debug!(count = resources.len(), "Found security groups");
        Ok(resources)
    }

    async fn scan_roles(&self, stack_name: Option<&str>) -> Result<Vec<DiscoveredResource>> {
        let client = self.ctx.iam_client();
        let mut resources = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let response = client
                .list_roles()
                .path_prefix(IAM_PATH)
                .set_marker(marker.take())
                .send()
                .await
                .context("Failed to list IAM roles")?;

            for role in response.roles() {
                // ListRoles does not return tags
                let tags = client
                    .list_role_tags()
                    .role_name(role.role_name())
                    .send()
                    .await
                    .with_context(|| format!("Failed to list tags of role {}", role.role_name()))?;
                resources.extend(resource_from_tags(
                    ResourceKind::IamRole,
                    role.role_name(),
                    self.ctx.region(),
                    &iam_tag_map(tags.tags()),
                    stack_name,
                ));
            }

            if !response.is_truncated() {
                break;
            }
            marker = response.marker().map(str::to_string);
        }

        debug!(count = resources.len(), "Found IAM roles");
        Ok(resources)
    }

    async fn scan_instance_profiles(
        &self,
        stack_name: Option<&str>,
    ) -> Result<Vec<DiscoveredResource>> {
        let client = self.ctx.iam_client();
        let mut resources = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let response = client
                .list_instance_profiles()
                .path_prefix(IAM_PATH)
                .set_marker(marker.take())
                .send()
                .await
                .context("Failed to list instance profiles")?;

            for profile in response.instance_profiles() {
                let name = profile.instance_profile_name();
                let tags = client
                    .list_instance_profile_tags()
                    .instance_profile_name(name)
                    .send()
                    .await
                    .with_context(|| format!("Failed to list tags of instance profile {name}"))?;
                resources.extend(resource_from_tags(
                    ResourceKind::IamInstanceProfile,
                    name,
                    self.ctx.region(),
                    &iam_tag_map(tags.tags()),
                    stack_name,
                ));
            }

            if !response.is_truncated() {
                break;
            }
            marker = response.marker().map(str::to_string);
        }

        debug!(count = resources.len(), "Found instance profiles");
        Ok(resources)
    }
}
