//! In-memory AWS backends for engine tests

use std::sync::{Arc, Mutex};

use anyhow::{Result, bail};
use cron_stack_common::stack::{
    Architecture, AssetLocation, ExecutionIdentity, FirewallPolicy, MachineImage,
    ResolvedNetwork, ScriptAsset, VpcLookup,
};
use cron_stack_common::{StackDefinition, StackProps, define_stack};
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use crate::aws::ec2::{Ec2Operations, LaunchInstanceConfig, LaunchedInstance};
use crate::aws::iam::{IamOperations, InstanceRole, iam_resource_name};
use crate::aws::s3::S3Operations;
use crate::deploy::progress::{DeployPhase, DeployReporter, ResourceUpdate};

/// Calls made against the fakes, in order, shared between them
#[derive(Clone, Default)]
pub(crate) struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    fn push(&self, call: impl Into<String>) {
        self.0.lock().unwrap().push(call.into());
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Position of the first call starting with `prefix`
    pub(crate) fn position(&self, prefix: &str) -> Option<usize> {
        self.calls().iter().position(|c| c.starts_with(prefix))
    }

    pub(crate) fn contains(&self, prefix: &str) -> bool {
        self.position(prefix).is_some()
    }
}

pub(crate) fn test_stack() -> StackDefinition {
    let asset = ScriptAsset::from_bytes("simple.py", b"print('hello')\n");
    define_stack(&StackProps::default(), asset).unwrap()
}

#[derive(Default)]
pub(crate) struct FakeEc2 {
    pub log: CallLog,
    pub fail_launch: bool,
    /// Cancel this token while the instance launch is in flight; the launch still succeeds
    pub cancel_on_launch: Option<CancellationToken>,
    /// Cancel this token while waiting for `running`
    pub cancel_on_wait: Option<CancellationToken>,
}

impl Ec2Operations for FakeEc2 {
    async fn resolve_network(&self, _lookup: &VpcLookup) -> Result<ResolvedNetwork> {
        self.log.push("ec2:resolve_network");
        Ok(ResolvedNetwork {
            vpc_id: "vpc-0test".into(),
            cidr_block: "172.31.0.0/16".parse().unwrap(),
            subnet_id: "subnet-0test".into(),
        })
    }

    async fn create_security_group(
        &self,
        _stack_name: &str,
        logical_id: &str,
        policy: &FirewallPolicy,
        _network: &ResolvedNetwork,
    ) -> Result<String> {
        self.log.push(format!(
            "ec2:create_security_group:{logical_id}:{}",
            policy.ingress.len()
        ));
        Ok("sg-0test".into())
    }

    async fn delete_security_group(&self, security_group_id: &str) -> Result<()> {
        self.log
            .push(format!("ec2:delete_security_group:{security_group_id}"));
        Ok(())
    }

    async fn latest_ami(&self, _image: MachineImage, arch: Architecture) -> Result<String> {
        self.log.push(format!("ec2:latest_ami:{}", arch.as_str()));
        Ok("ami-0test".into())
    }

    async fn launch_instance(
        &self,
        config: LaunchInstanceConfig,
        _cancel: Option<&CancellationToken>,
    ) -> Result<LaunchedInstance> {
        self.log.push(format!(
            "ec2:launch_instance:{}:{}:{}:{}",
            config.instance_type,
            config.security_group_id.as_deref().unwrap_or("-"),
            config.iam_instance_profile.as_deref().unwrap_or("-"),
            config.subnet_id.as_deref().unwrap_or("-"),
        ));
        if self.fail_launch {
            bail!("InsufficientInstanceCapacity");
        }
        if let Some(token) = &self.cancel_on_launch {
            token.cancel();
        }
        Ok(LaunchedInstance {
            instance_id: "i-0test".into(),
            ami_id: config.ami_id,
        })
    }

    async fn wait_for_running(
        &self,
        instance_id: &str,
        _timeout_secs: Option<u64>,
        cancel: Option<&CancellationToken>,
    ) -> Result<Option<String>> {
        self.log.push(format!("ec2:wait_for_running:{instance_id}"));
        if let Some(token) = &self.cancel_on_wait {
            token.cancel();
        }
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            bail!("Cancelled while waiting for EC2 instance {instance_id} running");
        }
        Ok(Some("203.0.113.10".into()))
    }

    async fn terminate_instance(&self, instance_id: &str) -> Result<()> {
        self.log.push(format!("ec2:terminate_instance:{instance_id}"));
        Ok(())
    }

    async fn wait_for_terminated(&self, instance_id: &str) -> Result<()> {
        self.log.push(format!("ec2:wait_for_terminated:{instance_id}"));
        Ok(())
    }

    async fn set_status(&self, resource_ids: &[String], status: &str) -> Result<()> {
        self.log
            .push(format!("ec2:set_status:{}:{status}", resource_ids.join(",")));
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeIam {
    pub log: CallLog,
    /// Cancel this token while the role is being created; the role still gets created
    pub cancel_on_create: Option<CancellationToken>,
    pub fail_delete_role: bool,
}

impl IamOperations for FakeIam {
    async fn create_instance_role(
        &self,
        stack_name: &str,
        logical_id: &str,
        identity: &ExecutionIdentity,
        _cancel: Option<&CancellationToken>,
    ) -> Result<InstanceRole> {
        self.log.push(format!(
            "iam:create_instance_role:{logical_id}:{}",
            identity.managed_policies.len()
        ));
        if let Some(token) = &self.cancel_on_create {
            token.cancel();
        }
        let name = iam_resource_name(stack_name, logical_id);
        Ok(InstanceRole {
            role_arn: format!("arn:aws:iam::123456789012:role/cron-stack/{name}"),
            role_name: name.clone(),
            instance_profile_name: name,
        })
    }

    async fn put_role_policy(&self, role_name: &str, policy_name: &str, document: &str) -> Result<()> {
        self.log
            .push(format!("iam:put_role_policy:{role_name}:{policy_name}"));
        // The engine passes serialized JSON
        serde_json::from_str::<serde_json::Value>(document)?;
        Ok(())
    }

    async fn delete_instance_role(&self, role_name: &str) -> Result<()> {
        self.log.push(format!("iam:delete_instance_role:{role_name}"));
        Ok(())
    }

    async fn delete_instance_profile(&self, profile_name: &str) -> Result<()> {
        self.log
            .push(format!("iam:delete_instance_profile:{profile_name}"));
        Ok(())
    }

    async fn delete_role(&self, role_name: &str) -> Result<()> {
        self.log.push(format!("iam:delete_role:{role_name}"));
        if self.fail_delete_role {
            bail!("DeleteConflict: role is still in an instance profile");
        }
        Ok(())
    }

    async fn set_status(&self, role_name: &str, status: &str) -> Result<()> {
        self.log.push(format!("iam:set_status:{role_name}:{status}"));
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeS3 {
    pub log: CallLog,
}

impl S3Operations for FakeS3 {
    async fn ensure_bucket(&self, bucket: &str) -> Result<()> {
        self.log.push(format!("s3:ensure_bucket:{bucket}"));
        Ok(())
    }

    async fn publish_asset(&self, location: &AssetLocation, contents: &[u8]) -> Result<bool> {
        self.log.push(format!(
            "s3:publish_asset:{}:{}",
            location.key,
            hex::encode(Sha256::digest(contents))
        ));
        Ok(true)
    }
}

/// Reporter remembering phases and resource updates
#[derive(Default)]
pub(crate) struct RecordingReporter {
    pub phases: Mutex<Vec<DeployPhase>>,
    pub updates: Mutex<Vec<ResourceUpdate>>,
}

impl DeployReporter for RecordingReporter {
    fn report_phase(&self, phase: DeployPhase) {
        self.phases.lock().unwrap().push(phase);
    }

    fn report_resource(&self, update: ResourceUpdate) {
        self.updates.lock().unwrap().push(update);
    }
}

/// Fakes sharing one call log
pub(crate) fn fakes() -> (CallLog, FakeEc2, FakeIam, FakeS3) {
    let log = CallLog::default();
    (
        log.clone(),
        FakeEc2 {
            log: log.clone(),
            ..Default::default()
        },
        FakeIam {
            log: log.clone(),
            ..Default::default()
        },
        FakeS3 { log: log.clone() },
    )
}
