//! EC2: VPC lookup, security groups, AMI lookup and instances

mod instance;
mod operations;
mod security_group;
mod types;

pub use operations::Ec2Operations;
pub use types::{LaunchInstanceConfig, LaunchedInstance};

use anyhow::{Context, Result};
use aws_sdk_ec2::Client;
use aws_sdk_ec2::types::{Filter, Subnet, SubnetState};
use cron_stack_common::stack::{Architecture, Ipv4Cidr, MachineImage, ResolvedNetwork, VpcLookup};
use tracing::{debug, info};

use crate::aws::context::{AwsContext, FromAwsContext};

/// EC2 client for the stack's network, firewall and instance
pub struct Ec2Client {
    pub(crate) client: Client,
    /// Region the client talks to, recorded in resource tags
    pub(crate) region: String,
}

impl FromAwsContext for Ec2Client {
    fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.ec2_client(),
            region: ctx.region().to_string(),
        }
    }
}

/// Subnet to launch into: an available one, preferring the AZ default
/// subnets and then subnets that assign public IPs, ties broken by ID.
fn pick_subnet(subnets: &[Subnet]) -> Option<&Subnet> {
    subnets
        .iter()
        .filter(|s| s.state() == Some(&SubnetState::Available))
        .filter(|s| s.subnet_id().is_some())
        .min_by_key(|&s| {
            (
                !s.default_for_az().unwrap_or(false),
                !s.map_public_ip_on_launch().unwrap_or(false),
                s.subnet_id().unwrap_or_default(),
            )
        })
}

impl Ec2Client {
    /// Find the VPC described by `lookup`, its primary IPv4 CIDR block and
    /// the subnet the instance goes into
    pub async fn resolve_network(&self, lookup: &VpcLookup) -> Result<ResolvedNetwork> {
        let request = self.client.describe_vpcs();
        let request = match lookup {
            VpcLookup::Default => {
                request.filters(Filter::builder().name("isDefault").values("true").build())
            }
            VpcLookup::ById(vpc_id) => request.vpc_ids(vpc_id),
        };
        let response = request.send().await.context("Failed to describe VPCs")?;

        let vpc = response.vpcs().first().with_context(|| match lookup {
            VpcLookup::Default => {
                "No default VPC in this region; pass --vpc-id to use another VPC".to_string()
            }
            VpcLookup::ById(vpc_id) => format!("VPC {vpc_id} not found"),
        })?;
        let vpc_id = vpc.vpc_id().context("VPC has no ID")?;
        let cidr_block: Ipv4Cidr = vpc
            .cidr_block()
            .context("VPC has no IPv4 CIDR block")?
            .parse()
            .with_context(|| format!("VPC {vpc_id} has an unexpected CIDR block"))?;

        let subnet_id = self.select_subnet(vpc_id).await?;

        info!(vpc_id = %vpc_id, cidr = %cidr_block, subnet_id = %subnet_id, "Resolved VPC");

        Ok(ResolvedNetwork {
            vpc_id: vpc_id.to_string(),
            cidr_block,
            subnet_id,
        })
    }

    async fn select_subnet(&self, vpc_id: &str) -> Result<String> {
        let response = self
            .client
            .describe_subnets()
            .filters(Filter::builder().name("vpc-id").values(vpc_id).build())
            .send()
            .await
            .context("Failed to describe subnets")?;

        let subnet = pick_subnet(response.subnets())
            .with_context(|| format!("VPC {vpc_id} has no available subnet"))?;
        let subnet_id = subnet.subnet_id().context("Subnet has no ID")?;
        debug!(
            subnet_id = %subnet_id,
            availability_zone = ?subnet.availability_zone(),
            "Selected subnet"
        );
        Ok(subnet_id.to_string())
    }

    /// Newest image matching `image` for `arch`
    pub async fn latest_ami(&self, image: MachineImage, arch: Architecture) -> Result<String> {
        let response = self
            .client
            .describe_images()
            .owners(image.owner())
            .filters(
                Filter::builder()
                    .name("name")
                    .values(image.name_pattern(arch))
                    .build(),
            )
            .filters(Filter::builder().name("state").values("available").build())
            .filters(
                Filter::builder()
                    .name("architecture")
                    .values(arch.as_str())
                    .build(),
            )
            .send()
            .await
            .context("Failed to describe images")?;

        // creation_date is ISO 8601, so the lexicographic maximum is the newest
        let ami = response
            .images()
            .iter()
            .max_by(|a, b| {
                a.creation_date()
                    .unwrap_or_default()
                    .cmp(b.creation_date().unwrap_or_default())
            })
            .and_then(|image| image.image_id())
            .with_context(|| format!("No Amazon Linux 2023 AMI found for {}", arch.as_str()))?;

        debug!(ami = %ami, arch = %arch.as_str(), "Found AMI");

        Ok(ami.to_string())
    }

    /// Set the lifecycle status tag on EC2 resources
    pub async fn set_status(&self, resource_ids: &[String], status: &str) -> Result<()> {
        use aws_sdk_ec2::types::Tag;
        use cron_stack_common::tags::TAG_STATUS;

        if resource_ids.is_empty() {
            return Ok(());
        }
        self.client
            .create_tags()
            .set_resources(Some(resource_ids.to_vec()))
            .tags(Tag::builder().key(TAG_STATUS).value(status).build())
            .send()
            .await
            .context("Failed to update status tag")?;
        Ok(())
    }
}
