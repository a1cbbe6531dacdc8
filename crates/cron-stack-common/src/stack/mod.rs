//! Declarative stack definition
//!
//! [`define_stack`] composes the six resources of the cron stack, in this
//! order:
//!
//! 1. `DefaultVPC` - lookup of the default VPC
//! 2. `SecurityGroup` - SSH from the configured CIDR, HTTPS from the VPC, all egress
//! 3. `InstanceRole` - assumable by EC2, with `AmazonSSMManagedInstanceCore`
//! 4. `PythonScript` - the local script, uploaded to S3
//! 5. `InstanceInit` - places the script on the instance
//! 6. `PythonEnvEC2Instance` - Amazon Linux 2023 instance running the script from cron
//!
//! Nothing here talks to AWS. The deployer in the `cron-stack` crate turns a
//! [`StackDefinition`] into real resources.

mod asset;
mod boot;
mod cidr;
mod cron;
mod error;
mod firewall;
mod graph;
mod identity;
mod instance;
mod network;
mod user_data;

pub use asset::{AssetLocation, AssetLocations, ScriptAsset};
pub use boot::{BootConfiguration, InitFile};
pub use cidr::Ipv4Cidr;
pub use cron::{CronJob, CronSchedule, SCHEDULER_PACKAGE, SCHEDULER_SERVICE};
pub use error::StackError;
pub use firewall::{EgressPolicy, FirewallPolicy, IngressRule, Peer, Protocol, SecurityFinding};
pub use graph::{
    LogicalId, Resource, ResourceSpec, ResourceType, StackBuilder, StackDefinition,
    validate_stack_name,
};
pub use identity::{ExecutionIdentity, ManagedPolicy};
pub use instance::{Architecture, ComputeInstance, MachineImage, validate_instance_type};
pub use network::{NetworkReference, ResolvedNetwork, VpcLookup};
pub use user_data::{UserData, validate_shell_input};

use crate::defaults;

/// Logical ids of the resources declared by [`define_stack`]
pub mod ids {
    pub const NETWORK: &str = "DefaultVPC";
    pub const FIREWALL: &str = "SecurityGroup";
    pub const IDENTITY: &str = "InstanceRole";
    pub const ASSET: &str = "PythonScript";
    pub const BOOT: &str = "InstanceInit";
    pub const INSTANCE: &str = "PythonEnvEC2Instance";
}

/// Inputs of the stack declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackProps {
    pub stack_name: String,
    pub instance_type: String,
    pub vpc: VpcLookup,
    /// Source allowed to reach TCP/22
    pub ssh_cidr: Ipv4Cidr,
    /// Where the script is placed on the instance
    pub script_destination: String,
    /// Where cron appends the script's output
    pub log_path: String,
    pub schedule: CronSchedule,
    pub interpreter: String,
}

impl Default for StackProps {
    fn default() -> Self {
        Self {
            stack_name: defaults::DEFAULT_STACK_NAME.to_string(),
            instance_type: defaults::DEFAULT_INSTANCE_TYPE.to_string(),
            vpc: VpcLookup::Default,
            ssh_cidr: Ipv4Cidr::ANY,
            script_destination: defaults::DEFAULT_SCRIPT_DESTINATION.to_string(),
            log_path: defaults::DEFAULT_LOG_PATH.to_string(),
            schedule: CronSchedule::every_minute(),
            interpreter: defaults::DEFAULT_INTERPRETER.to_string(),
        }
    }
}

/// Declare the cron stack for `props`, with `asset` as the scheduled script.
///
/// Deterministic: equal inputs always give equal definitions.
pub fn define_stack(props: &StackProps, asset: ScriptAsset) -> Result<StackDefinition, StackError> {
    validate_instance_type(&props.instance_type)?;

    let network_id = LogicalId::new(ids::NETWORK);
    let firewall_id = LogicalId::new(ids::FIREWALL);
    let identity_id = LogicalId::new(ids::IDENTITY);
    let asset_id = LogicalId::new(ids::ASSET);
    let boot_id = LogicalId::new(ids::BOOT);
    let instance_id = LogicalId::new(ids::INSTANCE);

    let mut firewall = FirewallPolicy::new(network_id.clone(), "Allow SSH and SSM access");
    let ssh_description = if props.ssh_cidr.is_any() {
        "Allow SSH access from anywhere".to_string()
    } else {
        format!("Allow SSH access from {}", props.ssh_cidr)
    };
    firewall
        .add_ingress_rule(Peer::ipv4(props.ssh_cidr), defaults::SSH_PORT, ssh_description)
        .add_ingress_rule(
            Peer::NetworkCidr(network_id.clone()),
            defaults::HTTPS_PORT,
            "Allow SSM access within the VPC",
        );

    let identity = ExecutionIdentity::assumed_by(defaults::EC2_SERVICE_PRINCIPAL)
        .with_managed_policy(ManagedPolicy::aws_managed(defaults::SSM_MANAGED_POLICY));

    let boot = BootConfiguration::new(identity_id.clone()).with_file(
        InitFile::from_existing_asset(&props.script_destination, asset_id.clone()),
    );

    let job = CronJob::new(
        props.schedule.clone(),
        &props.interpreter,
        &props.script_destination,
        &props.log_path,
    )?;
    let mut user_data = UserData::for_linux();
    user_data.add_commands(job.install_commands());

    let instance = ComputeInstance {
        network: network_id.clone(),
        firewall: firewall_id.clone(),
        role: identity_id.clone(),
        init: boot_id.clone(),
        machine_image: MachineImage::LatestAmazonLinux2023,
        instance_type: props.instance_type.clone(),
        architecture: Architecture::for_instance_type(&props.instance_type),
        user_data,
    };

    Ok(StackDefinition::builder(&props.stack_name)?
        .add(network_id, NetworkReference::vpc(props.vpc.clone()))?
        .add(firewall_id, firewall)?
        .add(identity_id, identity)?
        .add(asset_id, asset)?
        .add(boot_id, boot)?
        .add(instance_id, instance)?
        .build())
}
