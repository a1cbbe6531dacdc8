//! Security group management

use std::time::Duration;

use anyhow::{Context, Result};
use aws_sdk_ec2::types::{IpPermission, IpRange, ResourceType};
use backon::{ExponentialBuilder, Retryable};
use cron_stack_common::stack::{EgressPolicy, FirewallPolicy, ResolvedNetwork};
use tracing::{debug, info, warn};

use super::Ec2Client;
use crate::aws::error::{classify_anyhow_error, ignore_not_found};
use crate::aws::tags;

/// EC2 permission for each ingress rule, with peers resolved against `network`
pub(crate) fn ingress_permissions(
    policy: &FirewallPolicy,
    network: &ResolvedNetwork,
) -> Vec<IpPermission> {
    policy
        .ingress
        .iter()
        .map(|rule| {
            IpPermission::builder()
                .ip_protocol(rule.protocol.as_str())
                .from_port(i32::from(rule.port))
                .to_port(i32::from(rule.port))
                .ip_ranges(
                    IpRange::builder()
                        .cidr_ip(rule.peer.resolve(network).to_string())
                        .description(&rule.description)
                        .build(),
                )
                .build()
        })
        .collect()
}

impl Ec2Client {
    /// Create the security group for `policy` in `network` and authorize its ingress rules.
    ///
    /// A new group already allows all egress, which is what
    /// [`EgressPolicy::AllowAll`] asks for.
    pub async fn create_security_group(
        &self,
        stack_name: &str,
        logical_id: &str,
        policy: &FirewallPolicy,
        network: &ResolvedNetwork,
    ) -> Result<String> {
        let group_name = format!("{stack_name}-{logical_id}");
        info!(name = %group_name, vpc_id = %network.vpc_id, "Creating security group");

        let response = self
            .client
            .create_security_group()
            .group_name(&group_name)
            .description(&policy.description)
            .vpc_id(&network.vpc_id)
            .tag_specifications(tags::ec2_tag_spec(
                ResourceType::SecurityGroup,
                stack_name,
                logical_id,
                &self.region,
            ))
            .send()
            .await
            .context("Failed to create security group")?;

        let sg_id = response
            .group_id()
            .context("No security group ID in response")?
            .to_string();

        let permissions = ingress_permissions(policy, network);
        if !permissions.is_empty() {
            let authorized = self
                .client
                .authorize_security_group_ingress()
                .group_id(&sg_id)
                .set_ip_permissions(Some(permissions))
                .send()
                .await
                .with_context(|| format!("Failed to add ingress rules to security group {sg_id}"));
            if let Err(e) = authorized {
                warn!(sg_id = %sg_id, error = %e, "Removing half-configured security group");
                if let Err(cleanup) = self.delete_security_group(&sg_id).await {
                    warn!(sg_id = %sg_id, error = ?cleanup, "Failed to remove security group");
                }
                return Err(e);
            }
        }

        match policy.egress {
            EgressPolicy::AllowAll => {}
        }

        info!(
            sg_id = %sg_id,
            rules = policy.ingress.len(),
            "Security group created"
        );

        Ok(sg_id)
    }

    /// Delete a security group.
    ///
    /// Already-deleted groups count as success. Retries on
    /// `DependencyViolation` while ENIs of a terminated instance are released.
    pub async fn delete_security_group(&self, security_group_id: &str) -> Result<()> {
        info!(sg_id = %security_group_id, "Deleting security group");

        (|| async {
            let result = self
                .client
                .delete_security_group()
                .group_id(security_group_id)
                .send()
                .await;
            match ignore_not_found(result).context("Failed to delete security group")? {
                Some(_) => info!(sg_id = %security_group_id, "Security group deleted"),
                None => debug!(sg_id = %security_group_id, "Security group already deleted"),
            }
            Ok::<_, anyhow::Error>(())
        })
        .retry(
            ExponentialBuilder::default()
                .with_min_delay(Duration::from_secs(10))
                .with_max_delay(Duration::from_secs(60))
                .with_max_times(6),
        )
        .when(|e| classify_anyhow_error(e).is_retryable())
        .notify(|e, delay| {
            warn!(
                sg_id = %security_group_id,
                delay = ?delay,
                error = %e,
                "Security group still in use, retrying..."
            );
        })
        .await
    }
}
