//! EC2 operations trait, so the deployment engine can run against fakes

use std::future::Future;

use anyhow::Result;
use cron_stack_common::stack::{
    Architecture, FirewallPolicy, MachineImage, ResolvedNetwork, VpcLookup,
};
use tokio_util::sync::CancellationToken;

use super::Ec2Client;
use super::types::{LaunchInstanceConfig, LaunchedInstance};

/// EC2 calls made by the deployment engine and its rollback
pub trait Ec2Operations: Send + Sync + 'static {
    fn resolve_network(
        &self,
        lookup: &VpcLookup,
    ) -> impl Future<Output = Result<ResolvedNetwork>> + Send;

    /// Create a security group and authorize its ingress rules; returns the group ID
    fn create_security_group(
        &self,
        stack_name: &str,
        logical_id: &str,
        policy: &FirewallPolicy,
        network: &ResolvedNetwork,
    ) -> impl Future<Output = Result<String>> + Send;

    fn delete_security_group(
        &self,
        security_group_id: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    fn latest_ami(
        &self,
        image: MachineImage,
        arch: Architecture,
    ) -> impl Future<Output = Result<String>> + Send;

    /// Launch an instance. `cancel` stops retries but never abandons a
    /// launch EC2 has accepted; the instance ID is always returned.
    fn launch_instance(
        &self,
        config: LaunchInstanceConfig,
        cancel: Option<&CancellationToken>,
    ) -> impl Future<Output = Result<LaunchedInstance>> + Send;

    /// Wait for `running`; returns the public IP if the instance has one
    fn wait_for_running(
        &self,
        instance_id: &str,
        timeout_secs: Option<u64>,
        cancel: Option<&CancellationToken>,
    ) -> impl Future<Output = Result<Option<String>>> + Send;

    fn terminate_instance(&self, instance_id: &str) -> impl Future<Output = Result<()>> + Send;

    fn wait_for_terminated(&self, instance_id: &str) -> impl Future<Output = Result<()>> + Send;

    /// Set the `cron-stack:status` tag on instances and security groups
    fn set_status(
        &self,
        resource_ids: &[String],
        status: &str,
    ) -> impl Future<Output = Result<()>> + Send;
}

impl Ec2Operations for Ec2Client {
    async fn resolve_network(&self, lookup: &VpcLookup) -> Result<ResolvedNetwork> {
        Ec2Client::resolve_network(self, lookup).await
    }

    async fn create_security_group(
        &self,
        stack_name: &str,
        logical_id: &str,
        policy: &FirewallPolicy,
        network: &ResolvedNetwork,
    ) -> Result<String> {
        Ec2Client::create_security_group(self, stack_name, logical_id, policy, network).await
    }

    async fn delete_security_group(&self, security_group_id: &str) -> Result<()> {
        Ec2Client::delete_security_group(self, security_group_id).await
    }

    async fn latest_ami(&self, image: MachineImage, arch: Architecture) -> Result<String> {
        Ec2Client::latest_ami(self, image, arch).await
    }

    async fn launch_instance(
        &self,
        config: LaunchInstanceConfig,
        cancel: Option<&CancellationToken>,
    ) -> Result<LaunchedInstance> {
        Ec2Client::launch_instance(self, config, cancel).await
    }

    async fn wait_for_running(
        &self,
        instance_id: &str,
        timeout_secs: Option<u64>,
        cancel: Option<&CancellationToken>,
    ) -> Result<Option<String>> {
        Ec2Client::wait_for_running(self, instance_id, timeout_secs, cancel).await
    }

    async fn terminate_instance(&self, instance_id: &str) -> Result<()> {
        Ec2Client::terminate_instance(self, instance_id).await
    }

    async fn wait_for_terminated(&self, instance_id: &str) -> Result<()> {
        Ec2Client::wait_for_terminated(self, instance_id).await
    }

    async fn set_status(&self, resource_ids: &[String], status: &str) -> Result<()> {
        Ec2Client::set_status(self, resource_ids, status).await
    }
}
