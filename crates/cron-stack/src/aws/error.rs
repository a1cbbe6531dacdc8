//! AWS error classification
//!
//! SDK errors are classified by their service error code (through
//! `ProvideErrorMetadata`), never by matching on their Debug output.

use aws_sdk_ec2::error::{ProvideErrorMetadata, SdkError};
use thiserror::Error;

/// AWS error categories that drive retry and teardown decisions
#[derive(Debug, Clone, Error)]
pub enum AwsError {
    /// Resource does not exist (success for a delete)
    #[error("Resource not found: {message}")]
    NotFound { message: String },

    /// Resource already exists
    #[error("Resource already exists: {message}")]
    AlreadyExists { message: String },

    /// Instance profile not yet visible to EC2 (eventual consistency, retryable)
    #[error("IAM instance profile not yet visible to EC2")]
    IamPropagationDelay,

    /// Rate limit exceeded (retryable with backoff)
    #[error("Rate limit exceeded")]
    Throttled,

    /// Resource still in use, e.g. a security group with a live ENI (retryable)
    #[error("Resource has dependent objects")]
    DependencyViolation,

    /// Any other SDK error
    #[error("AWS error: {message}")]
    Sdk {
        code: Option<String>,
        message: String,
    },
}

impl AwsError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, AwsError::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, AwsError::AlreadyExists { .. })
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AwsError::IamPropagationDelay | AwsError::Throttled | AwsError::DependencyViolation
        )
    }

    /// Hint for resolving this error, if one is known
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            AwsError::Sdk { code: Some(code), .. } => suggestion_for_code(code),
            AwsError::AlreadyExists { .. } => Some(
                "A resource with this name already exists. Run `cron-stack destroy --execute` or pick another --stack-name.",
            ),
            _ => None,
        }
    }
}

const NOT_FOUND_CODES: &[&str] = &[
    "InvalidInstanceID.NotFound",
    "InvalidGroup.NotFound",
    "InvalidVpcID.NotFound",
    "NoSuchBucket",
    "NoSuchKey",
    "NotFound",
    "NoSuchEntity",
];

const ALREADY_EXISTS_CODES: &[&str] = &[
    "InvalidPermission.Duplicate",
    "InvalidGroup.Duplicate",
    "EntityAlreadyExists",
    "BucketAlreadyOwnedByYou",
];

const THROTTLING_CODES: &[&str] = &["Throttling", "ThrottlingException", "RequestLimitExceeded"];

const DEPENDENCY_CODES: &[&str] = &["DependencyViolation", "DeleteConflict"];

/// Classify an error from its service error code and message.
pub fn classify_aws_error(code: Option<&str>, message: Option<&str>) -> AwsError {
    let message = message.unwrap_or("Unknown error").to_string();

    match code {
        Some(c) if NOT_FOUND_CODES.contains(&c) => AwsError::NotFound { message },
        Some(c) if ALREADY_EXISTS_CODES.contains(&c) => AwsError::AlreadyExists { message },
        Some(c) if THROTTLING_CODES.contains(&c) => AwsError::Throttled,
        Some(c) if DEPENDENCY_CODES.contains(&c) => AwsError::DependencyViolation,
        Some("InvalidParameterValue") if message.contains("iamInstanceProfile") => {
            AwsError::IamPropagationDelay
        }
        Some(_) if message.contains("Invalid IAM Instance Profile") => {
            AwsError::IamPropagationDelay
        }
        _ => AwsError::Sdk {
            code: code.map(str::to_string),
            message,
        },
    }
}

/// Try each listed SDK error type against `$cause`, classifying the first match.
macro_rules! classify_sdk_errors {
    ($cause:expr, $($op:ty),+ $(,)?) => {
        $(
            if let Some(e) = $cause.downcast_ref::<SdkError<$op>>() {
                return classify_aws_error(e.code(), e.message());
            }
        )+
    };
}

/// Classify the first AWS SDK error found in an `anyhow` error chain.
pub fn classify_anyhow_error(error: &anyhow::Error) -> AwsError {
    use aws_sdk_ec2::operation as ec2;
    use aws_sdk_iam::operation as iam;
    use aws_sdk_s3::operation as s3;

    for cause in error.chain() {
        if let Some(aws) = cause.downcast_ref::<AwsError>() {
            return aws.clone();
        }
        classify_sdk_errors!(
            cause,
            ec2::run_instances::RunInstancesError,
            ec2::describe_instances::DescribeInstancesError,
            ec2::terminate_instances::TerminateInstancesError,
            ec2::create_security_group::CreateSecurityGroupError,
            ec2::delete_security_group::DeleteSecurityGroupError,
            ec2::authorize_security_group_ingress::AuthorizeSecurityGroupIngressError,
            ec2::describe_vpcs::DescribeVpcsError,
            iam::create_role::CreateRoleError,
            iam::delete_role::DeleteRoleError,
            iam::create_instance_profile::CreateInstanceProfileError,
            iam::delete_instance_profile::DeleteInstanceProfileError,
            iam::remove_role_from_instance_profile::RemoveRoleFromInstanceProfileError,
            iam::get_instance_profile::GetInstanceProfileError,
            s3::create_bucket::CreateBucketError,
            s3::head_object::HeadObjectError,
            s3::put_object::PutObjectError,
        );
    }

    AwsError::Sdk {
        code: None,
        message: error.to_string(),
    }
}

/// Turn a not-found SDK error into `Ok(None)`, for idempotent deletes and
/// reads that may run ahead of eventual consistency.
pub fn ignore_not_found<T, E>(result: Result<T, E>) -> Result<Option<T>, E>
where
    E: ProvideErrorMetadata,
{
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if classify_aws_error(e.code(), e.message()).is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

const SUGGESTIONS: &[(&str, &str)] = &[
    (
        "InsufficientInstanceCapacity",
        "Try a different availability zone or instance type.",
    ),
    (
        "InstanceLimitExceeded",
        "Request a service limit increase via the AWS Service Quotas console.",
    ),
    (
        "VcpuLimitExceeded",
        "Request a service limit increase via the AWS Service Quotas console.",
    ),
    (
        "Unsupported",
        "This instance type may not be available in this region/AZ.",
    ),
    (
        "UnauthorizedOperation",
        "The credentials lack EC2 permissions for this operation.",
    ),
    (
        "AccessDenied",
        "The credentials lack IAM or S3 permissions for this operation.",
    ),
    (
        "ExpiredToken",
        "Refresh your AWS credentials (e.g. `aws sso login`).",
    ),
];

fn suggestion_for_code(code: &str) -> Option<&'static str> {
    SUGGESTIONS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, s)| *s)
}
