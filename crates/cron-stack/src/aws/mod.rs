//! AWS client modules
//!
//! Wrappers around the AWS SDK clients the stack needs:
//! - EC2: VPC lookup, security groups, AMI lookup, instances
//! - IAM: Role and instance profile management
//! - S3: Asset bucket and script upload
//! - STS: Account ID lookup
//! - scanner: Tag-based discovery of deployed stacks
//! - resource_guard: Rollback of half-created resources

pub mod account;
pub mod context;
pub mod ec2;
pub mod error;
pub mod iam;
pub mod resource_guard;
pub mod s3;
pub mod scanner;
pub mod tags;

// Core clients
pub use account::{AccountId, get_current_account_id};
pub use context::{AwsContext, FromAwsContext};
pub use ec2::{Ec2Client, Ec2Operations, LaunchInstanceConfig, LaunchedInstance};
pub use iam::{IamClient, IamOperations, InstanceRole};
pub use s3::{S3Client, S3Operations};
pub use scanner::{DiscoveredResource, StackScanner};

// Error handling
pub use error::{AwsError, classify_anyhow_error, classify_aws_error, ignore_not_found};
