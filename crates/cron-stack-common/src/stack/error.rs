//! Errors raised while declaring a stack

use std::path::PathBuf;

use thiserror::Error;

use super::{LogicalId, ResourceType};

/// Errors raised while declaring or rendering a stack
#[derive(Debug, Error)]
pub enum StackError {
    #[error("invalid stack name '{name}': {reason}")]
    InvalidStackName { name: String, reason: &'static str },

    #[error("invalid CIDR block '{value}': {reason}")]
    InvalidCidr { value: String, reason: &'static str },

    #[error("invalid cron schedule '{value}': {reason}")]
    InvalidSchedule { value: String, reason: String },

    #[error("invalid instance type '{0}': expected <family>.<size>")]
    InvalidInstanceType(String),

    #[error("{field} contains forbidden character {found:?}")]
    UnsafeShellInput { field: &'static str, found: char },

    #[error("{field} cannot be empty")]
    EmptyValue { field: &'static str },

    #[error("duplicate logical id '{0}'")]
    DuplicateLogicalId(LogicalId),

    #[error("'{from}' references '{to}', which is not declared before it")]
    DanglingReference { from: LogicalId, to: LogicalId },

    #[error("'{from}' references '{to}' as {expected}, but it is {actual}")]
    WrongReferenceType {
        from: LogicalId,
        to: LogicalId,
        expected: ResourceType,
        actual: ResourceType,
    },

    #[error("stack '{stack}' declares no {missing}")]
    MissingResource {
        stack: String,
        missing: ResourceType,
    },

    #[error("no uploaded location known for asset '{0}'")]
    UnresolvedAsset(LogicalId),

    #[error("failed to read asset file {path}")]
    AssetRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
