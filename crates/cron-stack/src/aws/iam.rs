//! IAM role and instance profile management

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use aws_sdk_iam::Client;
use cron_stack_common::defaults::IAM_PATH;
use cron_stack_common::stack::ExecutionIdentity;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::aws::context::{AwsContext, FromAwsContext};
use crate::aws::error::ignore_not_found;
use crate::aws::tags;
use crate::wait::{WaitConfig, poll_until};

/// A role together with the instance profile that carries it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRole {
    pub role_name: String,
    pub role_arn: String,
    pub instance_profile_name: String,
}

/// IAM name for a stack resource; role and profile share it
pub fn iam_resource_name(stack_name: &str, logical_id: &str) -> String {
    format!("{stack_name}-{logical_id}")
}

/// IAM calls made by the deployment engine and its rollback
pub trait IamOperations: Send + Sync + 'static {
    /// Create the role for `identity` plus an instance profile holding it
    fn create_instance_role(
        &self,
        stack_name: &str,
        logical_id: &str,
        identity: &ExecutionIdentity,
        cancel: Option<&CancellationToken>,
    ) -> impl Future<Output = Result<InstanceRole>> + Send;

    /// Put an inline policy on a role
    fn put_role_policy(
        &self,
        role_name: &str,
        policy_name: &str,
        document: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Delete a role and the instance profile of the same name
    fn delete_instance_role(&self, role_name: &str) -> impl Future<Output = Result<()>> + Send;

    /// Delete an instance profile on its own; an already deleted one is fine
    fn delete_instance_profile(
        &self,
        profile_name: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Delete a role on its own; an already deleted one is fine
    fn delete_role(&self, role_name: &str) -> impl Future<Output = Result<()>> + Send;

    /// Set the `cron-stack:status` tag on a role and its instance profile
    fn set_status(&self, role_name: &str, status: &str) -> impl Future<Output = Result<()>> + Send;
}

/// IAM client for roles and instance profiles under the cron-stack path
pub struct IamClient {
    client: Client,
    /// Deployment region, tagged onto the global IAM resources
    region: String,
}

impl FromAwsContext for IamClient {
    fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.iam_client(),
            region: ctx.region().to_string(),
        }
    }
}

impl IamClient {
    pub async fn create_instance_role(
        &self,
        stack_name: &str,
        logical_id: &str,
        identity: &ExecutionIdentity,
        cancel: Option<&CancellationToken>,
    ) -> Result<InstanceRole> {
        let name = iam_resource_name(stack_name, logical_id);
        info!(role_name = %name, "Creating IAM role");

        let created = self
            .client
            .create_role()
            .role_name(&name)
            .path(IAM_PATH)
            .assume_role_policy_document(identity.trust_policy_document().to_string())
            .description(format!("{stack_name} instance role"))
            .set_tags(Some(tags::iam_tags(stack_name, logical_id, &self.region)?))
            .send()
            .await
            .context("Failed to create IAM role")?;
        let role_arn = created
            .role()
            .map(|role| role.arn().to_string())
            .context("No role in CreateRole response")?;

        // From here on the role exists; undo it if the rest fails
        let result = self
            .finish_instance_role(stack_name, logical_id, &name, identity, cancel)
            .await;
        if let Err(e) = result {
            warn!(role_name = %name, error = %e, "Removing partially created role");
            if let Err(cleanup) = self.delete_instance_role(&name).await {
                warn!(role_name = %name, error = ?cleanup, "Failed to remove role");
            }
            return Err(e);
        }

        info!(role_name = %name, "IAM role and instance profile created");

        Ok(InstanceRole {
            role_name: name.clone(),
            role_arn,
            instance_profile_name: name,
        })
    }

    async fn finish_instance_role(
        &self,
        stack_name: &str,
        logical_id: &str,
        name: &str,
        identity: &ExecutionIdentity,
        cancel: Option<&CancellationToken>,
    ) -> Result<()> {
        for policy in &identity.managed_policies {
            self.client
                .attach_role_policy()
                .role_name(name)
                .policy_arn(policy.arn())
                .send()
                .await
                .with_context(|| format!("Failed to attach managed policy {}", policy.name))?;
            debug!(role_name = %name, policy = %policy.name, "Managed policy attached");
        }

        self.client
            .create_instance_profile()
            .instance_profile_name(name)
            .path(IAM_PATH)
            .set_tags(Some(tags::iam_tags(stack_name, logical_id, &self.region)?))
            .send()
            .await
            .context("Failed to create instance profile")?;

        self.client
            .add_role_to_instance_profile()
            .instance_profile_name(name)
            .role_name(name)
            .send()
            .await
            .context("Failed to add role to instance profile")?;

        // EC2 may still not see the profile after this; launch retries for that
        poll_until(
            WaitConfig {
                initial_delay: Duration::from_millis(500),
                max_delay: Duration::from_secs(5),
                timeout: Duration::from_secs(60),
            },
            cancel,
            || async {
                let visible = self
                    .client
                    .get_instance_profile()
                    .instance_profile_name(name)
                    .send()
                    .await
                    .ok()
                    .and_then(|resp| resp.instance_profile().map(|p| !p.roles().is_empty()))
                    .unwrap_or(false);
                Ok(visible.then_some(()))
            },
            "IAM instance profile",
        )
        .await
        .context("Waiting for IAM instance profile to be ready")
    }

    pub async fn put_role_policy(
        &self,
        role_name: &str,
        policy_name: &str,
        document: &str,
    ) -> Result<()> {
        self.client
            .put_role_policy()
            .role_name(role_name)
            .policy_name(policy_name)
            .policy_document(document)
            .send()
            .await
            .with_context(|| format!("Failed to put inline policy {policy_name} on {role_name}"))?;
        debug!(role_name = %role_name, policy_name = %policy_name, "Inline policy attached");
        Ok(())
    }

    /// Delete an instance profile, detaching any roles it holds first
    pub async fn delete_instance_profile(&self, profile_name: &str) -> Result<()> {
        let profile = ignore_not_found(
            self.client
                .get_instance_profile()
                .instance_profile_name(profile_name)
                .send()
                .await,
        )
        .context("Failed to get instance profile")?;
        let Some(profile) = profile else {
            debug!(profile_name = %profile_name, "Instance profile already deleted");
            return Ok(());
        };

        let roles: Vec<String> = profile
            .instance_profile()
            .map(|p| p.roles().iter().map(|r| r.role_name().to_string()).collect())
            .unwrap_or_default();
        for role in roles {
            ignore_not_found(
                self.client
                    .remove_role_from_instance_profile()
                    .instance_profile_name(profile_name)
                    .role_name(&role)
                    .send()
                    .await,
            )
            .context("Failed to remove role from instance profile")?;
        }

        ignore_not_found(
            self.client
                .delete_instance_profile()
                .instance_profile_name(profile_name)
                .send()
                .await,
        )
        .context("Failed to delete instance profile")?;
        info!(profile_name = %profile_name, "Instance profile deleted");
        Ok(())
    }

    /// Delete a role after detaching its managed policies and deleting its inline policies
    pub async fn delete_role(&self, role_name: &str) -> Result<()> {
        let attached = ignore_not_found(
            self.client
                .list_attached_role_policies()
                .role_name(role_name)
                .send()
                .await,
        )
        .context("Failed to list attached role policies")?;
        let Some(attached) = attached else {
            debug!(role_name = %role_name, "IAM role already deleted");
            return Ok(());
        };
        for arn in attached.attached_policies().iter().filter_map(|p| p.policy_arn()) {
            ignore_not_found(
                self.client
                    .detach_role_policy()
                    .role_name(role_name)
                    .policy_arn(arn)
                    .send()
                    .await,
            )
            .with_context(|| format!("Failed to detach {arn}"))?;
        }

        let inline = self
            .client
            .list_role_policies()
            .role_name(role_name)
            .send()
            .await
            .context("Failed to list inline role policies")?;
        for policy_name in inline.policy_names() {
            ignore_not_found(
                self.client
                    .delete_role_policy()
                    .role_name(role_name)
                    .policy_name(policy_name)
                    .send()
                    .await,
            )
            .with_context(|| format!("Failed to delete inline policy {policy_name}"))?;
        }

        ignore_not_found(self.client.delete_role().role_name(role_name).send().await)
            .context("Failed to delete IAM role")?;
        info!(role_name = %role_name, "IAM role deleted");
        Ok(())
    }

    pub async fn delete_instance_role(&self, role_name: &str) -> Result<()> {
        self.delete_instance_profile(role_name).await?;
        self.delete_role(role_name).await
    }

    pub async fn set_status(&self, role_name: &str, status: &str) -> Result<()> {
        let tag = aws_sdk_iam::types::Tag::builder()
            .key(tags::TAG_STATUS)
            .value(status)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build IAM tag: {e}"))?;

        self.client
            .tag_role()
            .role_name(role_name)
            .tags(tag.clone())
            .send()
            .await
            .context("Failed to tag IAM role")?;
        self.client
            .tag_instance_profile()
            .instance_profile_name(role_name)
            .tags(tag)
            .send()
            .await
            .context("Failed to tag instance profile")?;
        Ok(())
    }
}

impl IamOperations for IamClient {
    async fn create_instance_role(
        &self,
        stack_name: &str,
        logical_id: &str,
        identity: &ExecutionIdentity,
        cancel: Option<&CancellationToken>,
    ) -> Result<InstanceRole> {
        IamClient::create_instance_role(self, stack_name, logical_id, identity, cancel).await
    }

    async fn put_role_policy(&self, role_name: &str, policy_name: &str, document: &str) -> Result<()> {
        IamClient::put_role_policy(self, role_name, policy_name, document).await
    }

    async fn delete_instance_role(&self, role_name: &str) -> Result<()> {
        IamClient::delete_instance_role(self, role_name).await
    }

    async fn delete_instance_profile(&self, profile_name: &str) -> Result<()> {
        IamClient::delete_instance_profile(self, profile_name).await
    }

    async fn delete_role(&self, role_name: &str) -> Result<()> {
        IamClient::delete_role(self, role_name).await
    }

    async fn set_status(&self, role_name: &str, status: &str) -> Result<()> {
        IamClient::set_status(self, role_name, status).await
    }
}
