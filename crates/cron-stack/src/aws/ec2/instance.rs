//! EC2 instance lifecycle operations

use std::time::Duration;

use anyhow::{Context, Result, bail};
use aws_sdk_ec2::operation::describe_instances::DescribeInstancesOutput;
use aws_sdk_ec2::types::{
    IamInstanceProfileSpecification, InstanceStateName, InstanceType, ResourceType,
};
use backon::{ExponentialBuilder, Retryable};
use base64::Engine;
use cron_stack_common::defaults::DEFAULT_INSTANCE_TIMEOUT;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::Ec2Client;
use super::types::{LaunchInstanceConfig, LaunchedInstance};
use crate::aws::error::{AwsError, classify_anyhow_error, ignore_not_found};
use crate::aws::tags;
use crate::wait::{WaitConfig, poll_until};

/// How long to wait for a terminated instance to disappear
const TERMINATION_TIMEOUT: Duration = Duration::from_secs(300);

/// IAM propagation delay and throttling are worth another attempt
fn is_retryable_launch_error(e: &anyhow::Error) -> bool {
    matches!(
        classify_anyhow_error(e),
        AwsError::IamPropagationDelay | AwsError::Throttled
    )
}

impl Ec2Client {
    /// Launch the instance described by `config`.
    ///
    /// Retries while EC2 cannot see a just-created instance profile yet and
    /// when rate limited. No further attempt starts once `cancel` fires.
    pub async fn launch_instance(
        &self,
        config: LaunchInstanceConfig,
        cancel: Option<&CancellationToken>,
    ) -> Result<LaunchedInstance> {
        info!(
            instance_type = %config.instance_type,
            ami = %config.ami_id,
            "Launching instance"
        );

        let user_data_b64 =
            base64::engine::general_purpose::STANDARD.encode(config.user_data.as_bytes());

        (|| self.run_instance(&config, &user_data_b64))
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(Duration::from_secs(2))
                    .with_max_delay(Duration::from_secs(30))
                    .with_max_times(8),
            )
            .when(|e| {
                is_retryable_launch_error(e) && !cancel.is_some_and(CancellationToken::is_cancelled)
            })
            .notify(|e, delay| match classify_anyhow_error(e) {
                AwsError::IamPropagationDelay => warn!(
                    delay = ?delay,
                    error = %e,
                    "IAM instance profile not yet visible to EC2, retrying..."
                ),
                _ => warn!(delay = ?delay, error = %e, "AWS rate limited, backing off..."),
            })
            .await
    }

    async fn run_instance(
        &self,
        config: &LaunchInstanceConfig,
        user_data_b64: &str,
    ) -> Result<LaunchedInstance> {
        let mut request = self
            .client
            .run_instances()
            .image_id(&config.ami_id)
            .instance_type(InstanceType::from(config.instance_type.as_str()))
            .min_count(1)
            .max_count(1)
            .user_data(user_data_b64)
            .tag_specifications(tags::ec2_tag_spec(
                ResourceType::Instance,
                &config.stack_name,
                &config.logical_id,
                &self.region,
            ));

        if let Some(sg) = &config.security_group_id {
            request = request.security_group_ids(sg);
        }
        if let Some(subnet) = &config.subnet_id {
            request = request.subnet_id(subnet);
        }
        if let Some(profile) = &config.iam_instance_profile {
            request = request.iam_instance_profile(
                IamInstanceProfileSpecification::builder()
                    .name(profile)
                    .build(),
            );
        }

        let response = request.send().await.context("Failed to launch instance")?;

        let instance_id = response
            .instances()
            .first()
            .and_then(|i| i.instance_id())
            .context("No instance ID in RunInstances response")?
            .to_string();

        info!(instance_id = %instance_id, "Instance launched");

        Ok(LaunchedInstance {
            instance_id,
            ami_id: config.ami_id.clone(),
        })
    }

    /// Wait for an instance to reach `running` and return its public IP, if any.
    ///
    /// A just-launched instance may not be visible to `DescribeInstances`
    /// yet; that counts as still pending.
    pub async fn wait_for_running(
        &self,
        instance_id: &str,
        timeout_secs: Option<u64>,
        cancel: Option<&CancellationToken>,
    ) -> Result<Option<String>> {
        let timeout = Duration::from_secs(timeout_secs.unwrap_or(DEFAULT_INSTANCE_TIMEOUT));
        info!(
            instance_id = %instance_id,
            timeout_secs = timeout.as_secs(),
            "Waiting for instance to be running"
        );

        poll_until(
            WaitConfig::ec2_state(timeout),
            cancel,
            || async {
                let response = self
                    .client
                    .describe_instances()
                    .instance_ids(instance_id)
                    .send()
                    .await;
                let response =
                    ignore_not_found(response).context("Failed to describe instance")?;
                running_state(instance_id, response.as_ref())
            },
            &format!("EC2 instance {instance_id} running"),
        )
        .await
    }

    /// Terminate an instance. An instance that no longer exists counts as terminated.
    pub async fn terminate_instance(&self, instance_id: &str) -> Result<()> {
        info!(instance_id = %instance_id, "Terminating instance");

        let result = self
            .client
            .terminate_instances()
            .instance_ids(instance_id)
            .send()
            .await;
        if ignore_not_found(result)
            .context("Failed to terminate instance")?
            .is_none()
        {
            debug!(instance_id = %instance_id, "Instance already gone");
        }
        Ok(())
    }

    /// Wait until an instance is `terminated` or no longer known to EC2
    pub async fn wait_for_terminated(&self, instance_id: &str) -> Result<()> {
        poll_until(
            WaitConfig::ec2_state(TERMINATION_TIMEOUT),
            None,
            || async {
                let response = self
                    .client
                    .describe_instances()
                    .instance_ids(instance_id)
                    .send()
                    .await;

                let response = match ignore_not_found(response) {
                    Ok(Some(response)) => response,
                    Ok(None) => return Ok(Some(())),
                    Err(e) => {
                        warn!(instance_id = %instance_id, error = ?e, "Error checking instance state");
                        return Ok(None);
                    }
                };

                let state = response
                    .reservations()
                    .first()
                    .and_then(|r| r.instances().first())
                    .and_then(|i| i.state())
                    .and_then(|s| s.name());

                match state {
                    Some(InstanceStateName::Terminated) | None => {
                        debug!(instance_id = %instance_id, "Instance terminated");
                        Ok(Some(()))
                    }
                    Some(_) => Ok(None),
                }
            },
            &format!("EC2 instance {instance_id} terminated"),
        )
        .await
    }
}

/// Interpret a `DescribeInstances` response while waiting for `running`.
///
/// `Ok(None)` means keep waiting, `Ok(Some(ip))` means running. An instance
/// that stopped or terminated on its way up is an error.
fn running_state(
    instance_id: &str,
    response: Option<&DescribeInstancesOutput>,
) -> Result<Option<Option<String>>> {
    let Some(instance) = response
        .and_then(|r| r.reservations().first())
        .and_then(|r| r.instances().first())
    else {
        debug!(instance_id = %instance_id, "Instance not visible yet");
        return Ok(None);
    };

    let state = instance
        .state()
        .and_then(|s| s.name())
        .unwrap_or(&InstanceStateName::Pending);

    match state {
        InstanceStateName::Running => {
            let public_ip = instance.public_ip_address().map(str::to_string);
            info!(instance_id = %instance_id, public_ip = ?public_ip, "Instance is running");
            Ok(Some(public_ip))
        }
        InstanceStateName::Pending => Ok(None),
        other => {
            let reason = instance
                .state_reason()
                .and_then(|r| r.message())
                .unwrap_or("no reason provided");
            bail!("Instance {instance_id} entered state {other:?}: {reason}")
        }
    }
}
