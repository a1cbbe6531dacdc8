//! AWS resource kinds and teardown ordering
//!
//! Rollback and `destroy` both delete resources through this ordering, so a
//! resource is never deleted while something created after it still uses it.

use serde::Serialize;

/// Kinds of AWS resources a deployment creates and can delete again
///
/// The VPC is only looked up and the asset object is retained, so neither
/// has a kind here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    /// EC2 instance (must be terminated before its security group can go)
    Ec2Instance,
    /// IAM instance profile (must lose its role before the role can go)
    IamInstanceProfile,
    /// IAM role
    IamRole,
    /// Security group (depends on instances being terminated)
    SecurityGroup,
}

impl ResourceKind {
    /// Get cleanup priority (lower number = cleanup first)
    ///
    /// - 0: Terminate EC2 instances
    /// - 1: Delete instance profiles
    /// - 2: Delete roles (after their policies are detached)
    /// - 3: Delete security groups
    pub fn cleanup_priority(self) -> u8 {
        match self {
            ResourceKind::Ec2Instance => 0,
            ResourceKind::IamInstanceProfile => 1,
            ResourceKind::IamRole => 2,
            ResourceKind::SecurityGroup => 3,
        }
    }

    /// IAM resources are not regional; the same one is listed from every region
    pub fn is_global(self) -> bool {
        matches!(self, ResourceKind::IamInstanceProfile | ResourceKind::IamRole)
    }

    /// Short human readable name used in reports
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Ec2Instance => "EC2 Instance",
            ResourceKind::IamInstanceProfile => "Instance Profile",
            ResourceKind::IamRole => "IAM Role",
            ResourceKind::SecurityGroup => "Security Group",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instances_before_security_groups() {
        assert!(
            ResourceKind::Ec2Instance.cleanup_priority()
                < ResourceKind::SecurityGroup.cleanup_priority(),
            "Instances must be cleaned before security groups"
        );
    }

    #[test]
    fn test_profiles_before_roles() {
        assert!(
            ResourceKind::IamInstanceProfile.cleanup_priority()
                < ResourceKind::IamRole.cleanup_priority(),
            "A role cannot be deleted while a profile still holds it"
        );
    }

    #[test]
    fn test_priority_values() {
        assert_eq!(ResourceKind::Ec2Instance.cleanup_priority(), 0);
        assert_eq!(ResourceKind::IamInstanceProfile.cleanup_priority(), 1);
        assert_eq!(ResourceKind::IamRole.cleanup_priority(), 2);
        assert_eq!(ResourceKind::SecurityGroup.cleanup_priority(), 3);
    }

    #[test]
    fn test_only_iam_is_global() {
        assert!(ResourceKind::IamRole.is_global());
        assert!(ResourceKind::IamInstanceProfile.is_global());
        assert!(!ResourceKind::Ec2Instance.is_global());
        assert!(!ResourceKind::SecurityGroup.is_global());
    }
}
