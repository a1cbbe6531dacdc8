//! Synthesis, deployment, status and teardown of the cron stack
//!
//! The functions here wire the configuration to the AWS clients. The
//! engine itself lives in [`engine`] and only sees the operations traits.

pub mod destroy;
pub mod engine;
pub mod outputs;
pub mod progress;

pub use destroy::{StackDestroyer, TeardownReport, ensure_not_deployed, plan_teardown};
pub use engine::StackDeployer;
pub use outputs::StackOutputs;
pub use progress::{DeployPhase, DeployReporter, LogReporter, ResourceStatus, ResourceUpdate};

use std::sync::Arc;

use anyhow::{Context, Result};
use cron_stack_common::StackDefinition;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::aws::s3::asset_bucket_name;
use crate::aws::{
    AwsContext, DiscoveredResource, Ec2Client, FromAwsContext, IamClient, S3Client, StackScanner,
    get_current_account_id,
};
use crate::config::{AwsConfig, DeployConfig};

fn warn_findings(stack: &StackDefinition) {
    for finding in stack.security_findings() {
        warn!(
            resource = %finding.resource,
            port = finding.port,
            source = %finding.source,
            "{}",
            finding.message
        );
    }
}

/// Declare the stack and return its synthesized JSON; touches no AWS API
pub fn synthesize(config: &DeployConfig) -> Result<serde_json::Value> {
    let stack = config.definition().context("Failed to declare the stack")?;
    warn_findings(&stack);
    Ok(stack.synth())
}

/// Deploy the configured stack
///
/// Returns `None` for a dry run, which stops after the pre-flight checks.
pub async fn deploy_stack(
    config: &DeployConfig,
    cancel: &CancellationToken,
) -> Result<Option<StackOutputs>> {
    let stack = config.definition().context("Failed to declare the stack")?;
    warn_findings(&stack);

    let reporter = LogReporter::new();
    reporter.report_phase(DeployPhase::Preflight);

    let aws = AwsContext::new(config.region(), config.aws_profile()).await;
    let account_id = get_current_account_id(&aws).await?;
    info!(stack = %stack.name(), region = %config.region(), "Checking for an existing deployment");

    let existing = StackScanner::from_context(&aws)
        .scan(Some(stack.name()))
        .await?;
    ensure_not_deployed(stack.name(), &existing)?;

    let ec2 = Ec2Client::from_context(&aws);

    if config.flags.dry_run {
        let (_, network) = stack.network().context("Stack declares no network")?;
        let resolved = ec2.resolve_network(&network.lookup).await?;
        info!(
            stack = %stack.name(),
            vpc_id = %resolved.vpc_id,
            cidr = %resolved.cidr_block,
            subnet_id = %resolved.subnet_id,
            resources = stack.resources().len(),
            "[DRY RUN] Stack can be deployed"
        );
        return Ok(None);
    }

    let deployer = StackDeployer::new(
        Arc::new(ec2),
        Arc::new(IamClient::from_context(&aws)),
        Arc::new(S3Client::from_context(&aws)),
        config.region(),
        asset_bucket_name(&account_id, config.region()),
    )
    .with_wait(config.flags.wait)
    .with_instance_timeout(config.flags.instance_timeout);

    let outputs = deployer.deploy(&stack, &reporter, cancel).await?;
    Ok(Some(outputs))
}

/// Delete every resource of `stack_name`; only reports when `dry_run`
pub async fn destroy_stack(
    aws: &AwsConfig,
    stack_name: &str,
    dry_run: bool,
) -> Result<TeardownReport> {
    let ctx = AwsContext::new(&aws.region, aws.aws_profile.as_deref()).await;
    info!(stack = %stack_name, dry_run, "Scanning stack resources");
    let resources = StackScanner::from_context(&ctx)
        .scan(Some(stack_name))
        .await?;

    StackDestroyer::new(Ec2Client::from_context(&ctx), IamClient::from_context(&ctx))
        .destroy(stack_name, resources, dry_run)
        .await
}

/// Tagged resources of `stack_name`, in teardown order
pub async fn stack_status(aws: &AwsConfig, stack_name: &str) -> Result<Vec<DiscoveredResource>> {
    let ctx = AwsContext::new(&aws.region, aws.aws_profile.as_deref()).await;
    let resources = StackScanner::from_context(&ctx)
        .scan(Some(stack_name))
        .await?;
    Ok(plan_teardown(resources))
}
