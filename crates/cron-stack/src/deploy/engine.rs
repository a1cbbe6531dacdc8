//! Deployment engine
//!
//! [`StackDeployer`] creates the resources of a [`StackDefinition`] one by
//! one in declaration order. Every created resource is held by a resource
//! guard until the whole stack is up; an error or cancellation drops the
//! guards and the cleanup executor deletes what was created.
//!
//! Cancellation is checked between steps and handed to the waits inside a
//! step. A step is never dropped halfway, so a resource AWS has created
//! always gets its guard before the deployment stops.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use cron_stack_common::stack::{
    AssetLocation, AssetLocations, LogicalId, ResolvedNetwork, ResourceSpec, ResourceType,
    StackDefinition,
};
use cron_stack_common::tags::status;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::outputs::StackOutputs;
use super::progress::{DeployPhase, DeployReporter, ResourceStatus, ResourceUpdate};
use crate::aws::ec2::{Ec2Operations, LaunchInstanceConfig};
use crate::aws::iam::{IamOperations, InstanceRole};
use crate::aws::resource_guard::{
    CleanupReport, Ec2InstanceGuard, InstanceRoleGuard, ResourceCleaner, ResourceGuardBuilder,
    ResourceId, SecurityGroupGuard, create_cleanup_system,
};
use crate::aws::s3::S3Operations;

/// Deletes rolled-back resources through the same backends that created them
pub struct RollbackCleaner<E, I> {
    ec2: Arc<E>,
    iam: Arc<I>,
}

impl<E: Ec2Operations, I: IamOperations> ResourceCleaner for RollbackCleaner<E, I> {
    async fn cleanup(&self, resource: &ResourceId) -> Result<()> {
        match resource {
            ResourceId::Ec2Instance(id) => {
                self.ec2.terminate_instance(id).await?;
                // The security group stays in use until the instance is gone
                self.ec2.wait_for_terminated(id).await
            }
            ResourceId::IamRole(name) => self.iam.delete_instance_role(name).await,
            ResourceId::SecurityGroup(id) => self.ec2.delete_security_group(id).await,
        }
    }
}

/// Guards of everything created so far
#[derive(Default)]
struct ResourceGuards {
    security_groups: Vec<SecurityGroupGuard>,
    roles: Vec<InstanceRoleGuard>,
    instances: Vec<Ec2InstanceGuard>,
}

impl ResourceGuards {
    fn commit_all(&mut self) {
        for guard in self.instances.drain(..) {
            guard.commit();
        }
        for guard in self.roles.drain(..) {
            guard.commit();
        }
        for guard in self.security_groups.drain(..) {
            guard.commit();
        }
    }
}

/// Physical resources created so far, by logical id
#[derive(Default)]
struct Applied {
    networks: HashMap<LogicalId, ResolvedNetwork>,
    security_groups: HashMap<LogicalId, String>,
    roles: HashMap<LogicalId, InstanceRole>,
    locations: AssetLocations,
    instances: Vec<(String, Option<String>)>,
}

fn lookup<'a, T>(
    map: &'a HashMap<LogicalId, T>,
    id: &LogicalId,
    expected: ResourceType,
) -> Result<&'a T> {
    map.get(id)
        .ok_or_else(|| anyhow!("{id} is not {expected} created earlier in this stack"))
}

/// Deploys stacks against EC2, IAM and S3 backends
pub struct StackDeployer<E, I, S> {
    ec2: Arc<E>,
    iam: Arc<I>,
    s3: Arc<S>,
    region: String,
    asset_bucket: String,
    wait: bool,
    instance_timeout: Option<u64>,
}

impl<E, I, S> StackDeployer<E, I, S>
where
    E: Ec2Operations,
    I: IamOperations,
    S: S3Operations,
{
    pub fn new(
        ec2: Arc<E>,
        iam: Arc<I>,
        s3: Arc<S>,
        region: impl Into<String>,
        asset_bucket: impl Into<String>,
    ) -> Self {
        Self {
            ec2,
            iam,
            s3,
            region: region.into(),
            asset_bucket: asset_bucket.into(),
            wait: true,
            instance_timeout: None,
        }
    }

    /// Whether to wait for the instance to reach `running` (default: yes)
    pub fn with_wait(mut self, wait: bool) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_instance_timeout(mut self, timeout_secs: Option<u64>) -> Self {
        self.instance_timeout = timeout_secs;
        self
    }

    /// Create every resource of `stack`; on failure delete what was created
    #[instrument(skip_all, fields(stack = %stack.name(), region = %self.region))]
    pub async fn deploy<R: DeployReporter>(
        &self,
        stack: &StackDefinition,
        reporter: &R,
        cancel: &CancellationToken,
    ) -> Result<StackOutputs> {
        let (registry, executor) = create_cleanup_system(RollbackCleaner {
            ec2: Arc::clone(&self.ec2),
            iam: Arc::clone(&self.iam),
        });
        let executor_handle = tokio::spawn(executor.run());
        let builder = ResourceGuardBuilder::new(registry.clone(), stack.name(), &self.region);
        let mut guards = ResourceGuards::default();

        reporter.report_phase(DeployPhase::Provisioning);
        let result = match self.apply(stack, &builder, &mut guards, reporter, cancel).await {
            Err(e) if cancel.is_cancelled() => {
                Err(e.context(format!("Deployment of {} cancelled", stack.name())))
            }
            result => result,
        };

        match &result {
            Ok(_) => {
                guards.commit_all();
                debug!("All resource guards committed");
            }
            Err(e) => {
                reporter.report_phase(DeployPhase::RollingBack);
                warn!(error = %e, "Deployment failed, rolling back");
            }
        }
        // Uncommitted guards queue their resources here
        drop(guards);
        let still_guarded = registry.shutdown();

        let report = match executor_handle.await {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "Cleanup executor did not finish");
                CleanupReport::default()
            }
        };
        if !report.is_clean() || !still_guarded.is_empty() {
            for (resource, error) in &report.failed {
                warn!(resource = %resource.description(), error = %error, "Left behind after rollback");
            }
            return result.context(format!(
                "Rollback left {} resource(s) behind; run `cron-stack destroy --execute`",
                report.failed.len() + still_guarded.len()
            ));
        }

        result
    }

    async fn apply<R: DeployReporter>(
        &self,
        stack: &StackDefinition,
        builder: &ResourceGuardBuilder,
        guards: &mut ResourceGuards,
        reporter: &R,
        cancel: &CancellationToken,
    ) -> Result<StackOutputs> {
        let mut applied = Applied::default();

        for resource in stack.resources() {
            let id = &resource.logical_id;
            if cancel.is_cancelled() {
                bail!("Stopped before creating {id}");
            }
            reporter.report_resource(ResourceUpdate {
                logical_id: id.clone(),
                resource_type: resource.resource_type(),
                status: ResourceStatus::CreateInProgress,
            });

            let status = match &resource.spec {
                ResourceSpec::Network(network) => {
                    let resolved = self
                        .ec2
                        .resolve_network(&network.lookup)
                        .await
                        .with_context(|| format!("Failed to resolve {id}"))?;
                    let vpc_id = resolved.vpc_id.clone();
                    applied.networks.insert(id.clone(), resolved);
                    ResourceStatus::Resolved { physical_id: vpc_id }
                }
                ResourceSpec::Firewall(policy) => {
                    let network = lookup(&applied.networks, &policy.network, ResourceType::Network)?;
                    let group_id = self
                        .ec2
                        .create_security_group(stack.name(), id.as_str(), policy, network)
                        .await
                        .with_context(|| format!("Failed to create {id}"))?;
                    guards
                        .security_groups
                        .push(builder.security_group(group_id.clone()));
                    applied.security_groups.insert(id.clone(), group_id.clone());
                    ResourceStatus::CreateComplete {
                        physical_id: group_id,
                    }
                }
                ResourceSpec::Identity(identity) => {
                    let role = self
                        .iam
                        .create_instance_role(stack.name(), id.as_str(), identity, Some(cancel))
                        .await
                        .with_context(|| format!("Failed to create {id}"))?;
                    guards.roles.push(builder.instance_role(role.clone()));
                    let role_name = role.role_name.clone();
                    applied.roles.insert(id.clone(), role);
                    ResourceStatus::CreateComplete {
                        physical_id: role_name,
                    }
                }
                ResourceSpec::Asset(asset) => {
                    self.s3
                        .ensure_bucket(&self.asset_bucket)
                        .await
                        .context("Failed to prepare the asset bucket")?;
                    let location = AssetLocation::new(&self.asset_bucket, asset.object_key());
                    let uploaded = self
                        .s3
                        .publish_asset(&location, asset.contents())
                        .await
                        .with_context(|| format!("Failed to publish {id}"))?;
                    let url = location.s3_url();
                    applied.locations.insert(id.clone(), location);
                    if uploaded {
                        ResourceStatus::CreateComplete { physical_id: url }
                    } else {
                        ResourceStatus::Resolved { physical_id: url }
                    }
                }
                ResourceSpec::BootConfiguration(boot) => {
                    let role = lookup(&applied.roles, &boot.role, ResourceType::Identity)?;
                    let policy = boot.read_grant_policy(&applied.locations)?;
                    let policy_name = format!("{id}-read-assets");
                    self.iam
                        .put_role_policy(&role.role_name, &policy_name, &policy.to_string())
                        .await
                        .with_context(|| format!("Failed to grant asset access for {id}"))?;
                    ResourceStatus::CreateComplete {
                        physical_id: policy_name,
                    }
                }
                ResourceSpec::Instance(instance) => {
                    let network =
                        lookup(&applied.networks, &instance.network, ResourceType::Network)?;
                    let group_id =
                        lookup(&applied.security_groups, &instance.firewall, ResourceType::Firewall)?;
                    let role = lookup(&applied.roles, &instance.role, ResourceType::Identity)?;
                    let user_data = stack.render_user_data(&applied.locations)?;
                    let ami_id = self
                        .ec2
                        .latest_ami(instance.machine_image, instance.architecture)
                        .await?;

                    let config = LaunchInstanceConfig::new(
                        stack.name(),
                        id.as_str(),
                        &instance.instance_type,
                        ami_id,
                        user_data,
                    )
                    .with_security_group(group_id)
                    .with_subnet(&network.subnet_id)
                    .with_iam_profile(&role.instance_profile_name);
                    let launched = self
                        .ec2
                        .launch_instance(config, Some(cancel))
                        .await
                        .with_context(|| format!("Failed to launch {id}"))?;
                    guards
                        .instances
                        .push(builder.ec2_instance(launched.instance_id.clone()));

                    let public_ip = if self.wait {
                        reporter.report_phase(DeployPhase::WaitingForInstance);
                        self.ec2
                            .wait_for_running(
                                &launched.instance_id,
                                self.instance_timeout,
                                Some(cancel),
                            )
                            .await?
                    } else {
                        None
                    };
                    applied
                        .instances
                        .push((launched.instance_id.clone(), public_ip));
                    ResourceStatus::CreateComplete {
                        physical_id: launched.instance_id,
                    }
                }
            };

            reporter.report_resource(ResourceUpdate {
                logical_id: id.clone(),
                resource_type: resource.resource_type(),
                status,
            });
        }

        if cancel.is_cancelled() {
            bail!("Stopped before marking {} active", stack.name());
        }
        reporter.report_phase(DeployPhase::Finalizing);
        self.mark_active(&applied).await?;

        let outputs = self.outputs(stack, applied)?;
        info!(instance_id = %outputs.instance_id, "Stack deployed");
        Ok(outputs)
    }

    async fn mark_active(&self, applied: &Applied) -> Result<()> {
        let ec2_ids: Vec<String> = applied
            .security_groups
            .values()
            .cloned()
            .chain(applied.instances.iter().map(|(id, _)| id.clone()))
            .collect();
        if !ec2_ids.is_empty() {
            self.ec2.set_status(&ec2_ids, status::ACTIVE).await?;
        }
        for role in applied.roles.values() {
            self.iam.set_status(&role.role_name, status::ACTIVE).await?;
        }
        Ok(())
    }

    fn outputs(&self, stack: &StackDefinition, mut applied: Applied) -> Result<StackOutputs> {
        let missing = |kind: ResourceType| anyhow!("Stack {} declares no {kind}", stack.name());

        let (network_id, _) = stack.network().ok_or_else(|| missing(ResourceType::Network))?;
        let (firewall_id, _) = stack.firewall().ok_or_else(|| missing(ResourceType::Firewall))?;
        let (identity_id, _) = stack.identity().ok_or_else(|| missing(ResourceType::Identity))?;
        let (asset_id, _) = stack.asset().ok_or_else(|| missing(ResourceType::Asset))?;

        let vpc_id = lookup(&applied.networks, network_id, ResourceType::Network)?
            .vpc_id
            .clone();
        let security_group_id =
            lookup(&applied.security_groups, firewall_id, ResourceType::Firewall)?.clone();
        let role = lookup(&applied.roles, identity_id, ResourceType::Identity)?.clone();
        let location = applied
            .locations
            .get(asset_id)
            .cloned()
            .ok_or_else(|| missing(ResourceType::Asset))?;
        let (instance_id, public_ip) = applied
            .instances
            .pop()
            .ok_or_else(|| missing(ResourceType::Instance))?;

        Ok(StackOutputs {
            stack_name: stack.name().to_string(),
            region: self.region.clone(),
            vpc_id,
            security_group_id,
            role_name: role.role_name,
            instance_profile_name: role.instance_profile_name,
            asset_url: location.s3_url(),
            asset_bucket: location.bucket,
            asset_key: location.key,
            instance_id,
            public_ip,
        })
    }
}
