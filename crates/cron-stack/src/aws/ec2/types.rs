//! EC2 types and configuration

/// A launched instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchedInstance {
    pub instance_id: String,
    pub ami_id: String,
}

/// Configuration for launching the stack's instance
#[derive(Debug, Clone)]
pub struct LaunchInstanceConfig {
    /// Owning stack, for tagging
    pub stack_name: String,
    /// Logical id of the declaring resource, for tagging
    pub logical_id: String,
    /// EC2 instance type (e.g., "t3.micro")
    pub instance_type: String,
    pub ami_id: String,
    /// User data script (will be base64 encoded)
    pub user_data: String,
    pub security_group_id: Option<String>,
    /// Subnet to launch into; without one EC2 picks the default VPC's default subnet
    pub subnet_id: Option<String>,
    /// IAM instance profile name
    pub iam_instance_profile: Option<String>,
}

impl LaunchInstanceConfig {
    pub fn new(
        stack_name: impl Into<String>,
        logical_id: impl Into<String>,
        instance_type: impl Into<String>,
        ami_id: impl Into<String>,
        user_data: impl Into<String>,
    ) -> Self {
        Self {
            stack_name: stack_name.into(),
            logical_id: logical_id.into(),
            instance_type: instance_type.into(),
            ami_id: ami_id.into(),
            user_data: user_data.into(),
            security_group_id: None,
            subnet_id: None,
            iam_instance_profile: None,
        }
    }

    pub fn with_security_group(mut self, security_group_id: impl Into<String>) -> Self {
        self.security_group_id = Some(security_group_id.into());
        self
    }

    pub fn with_subnet(mut self, subnet_id: impl Into<String>) -> Self {
        self.subnet_id = Some(subnet_id.into());
        self
    }

    pub fn with_iam_profile(mut self, profile_name: impl Into<String>) -> Self {
        self.iam_instance_profile = Some(profile_name.into());
        self
    }
}
