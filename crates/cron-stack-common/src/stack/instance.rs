//! Compute instance: the EC2 instance that runs the scheduled script

use serde::Serialize;

use super::{LogicalId, StackError, UserData};

/// CPU architecture of an instance type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Architecture {
    X86_64,
    Arm64,
}

impl Architecture {
    /// Architecture of an instance type, from its family name.
    ///
    /// Graviton families carry a `g` after the generation digit (`t4g`,
    /// `c7g`, `m6gd`, `r8g`); `g4dn` and other GPU families start with the
    /// letter and stay x86_64. First-generation Graviton (`a1`) predates
    /// the naming scheme.
    pub fn for_instance_type(instance_type: &str) -> Self {
        let family = instance_type.split('.').next().unwrap_or_default();
        if family == "a1" {
            return Architecture::Arm64;
        }
        let after_generation = family
            .char_indices()
            .find(|(_, c)| c.is_ascii_digit())
            .map(|(i, _)| &family[i..])
            .and_then(|rest| rest.trim_start_matches(|c: char| c.is_ascii_digit()).chars().next());
        match after_generation {
            Some('g') => Architecture::Arm64,
            _ => Architecture::X86_64,
        }
    }

    /// Name used in AMI names and the EC2 `architecture` filter
    pub fn as_str(self) -> &'static str {
        match self {
            Architecture::X86_64 => "x86_64",
            Architecture::Arm64 => "arm64",
        }
    }
}

/// Image an instance boots from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MachineImage {
    /// Newest Amazon Linux 2023 standard image published by Amazon
    LatestAmazonLinux2023,
}

impl MachineImage {
    /// AMI owner alias
    pub fn owner(self) -> &'static str {
        match self {
            MachineImage::LatestAmazonLinux2023 => "amazon",
        }
    }

    /// `describe_images` name filter; excludes the minimal images
    pub fn name_pattern(self, arch: Architecture) -> String {
        match self {
            MachineImage::LatestAmazonLinux2023 => {
                format!("al2023-ami-2023.*-kernel-*-{}", arch.as_str())
            }
        }
    }
}

/// An EC2 instance wired to the stack's network, firewall, role and boot configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeInstance {
    pub network: LogicalId,
    pub firewall: LogicalId,
    pub role: LogicalId,
    pub init: LogicalId,
    pub machine_image: MachineImage,
    pub instance_type: String,
    pub architecture: Architecture,
    pub user_data: UserData,
}

/// Check an instance type looks like `<family>.<size>`
pub fn validate_instance_type(instance_type: &str) -> Result<(), StackError> {
    let valid = match instance_type.split_once('.') {
        Some((family, size)) => {
            !family.is_empty()
                && !size.is_empty()
                && family.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
                && size.chars().all(|c| c.is_ascii_alphanumeric())
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(StackError::InvalidInstanceType(instance_type.to_string()))
    }
}
