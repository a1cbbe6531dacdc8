//! Default configuration values for the cron stack
//!
//! The CLI and [`StackProps::default`](crate::StackProps) both read from
//! here so the declared stack and the command-line defaults never drift.

/// Default stack name
pub const DEFAULT_STACK_NAME: &str = "Ec2Stack";

/// Default AWS region
pub const DEFAULT_REGION: &str = "us-east-2";

/// Default EC2 instance type
pub const DEFAULT_INSTANCE_TYPE: &str = "t3.micro";

/// Default local path of the script uploaded as the stack's asset
pub const DEFAULT_SCRIPT_PATH: &str = "assets/python-scripts/simple.py";

/// Where the boot configuration places the script on the instance
pub const DEFAULT_SCRIPT_DESTINATION: &str = "/home/ec2-user/simple.py";

/// File the cron job appends the script's output to
pub const DEFAULT_LOG_PATH: &str = "/home/ec2-user/output.log";

/// Interpreter the cron job runs the script with
pub const DEFAULT_INTERPRETER: &str = "python3";

/// Cron expression for "every minute"
pub const CRON_EVERY_MINUTE: &str = "* * * * *";

/// SSH port
pub const SSH_PORT: u16 = 22;

/// HTTPS port, used by the SSM agent to reach its endpoints
pub const HTTPS_PORT: u16 = 443;

/// Source CIDR of the default SSH rule
pub const ANY_IPV4: &str = "0.0.0.0/0";

/// Service principal allowed to assume the instance role
pub const EC2_SERVICE_PRINCIPAL: &str = "ec2.amazonaws.com";

/// AWS managed policy granting Systems Manager access
pub const SSM_MANAGED_POLICY: &str = "AmazonSSMManagedInstanceCore";

/// IAM path under which roles and instance profiles are created
pub const IAM_PATH: &str = "/cron-stack/";

/// Prefix of the per account/region asset bucket
pub const ASSET_BUCKET_PREFIX: &str = "cron-stack-assets";

/// Prefix of content-addressed asset object keys
pub const ASSET_KEY_PREFIX: &str = "assets";

/// Default timeout for waiting on the instance to reach `running` (seconds)
pub const DEFAULT_INSTANCE_TIMEOUT: u64 = 600;

/// Longest stack name accepted, so derived IAM names stay within 64 characters
pub const MAX_STACK_NAME_LEN: usize = 40;
