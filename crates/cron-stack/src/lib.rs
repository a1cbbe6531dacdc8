//! cron-stack - Deploy a scheduled Python script onto EC2
//!
//! This crate turns the [`StackDefinition`](cron_stack_common::StackDefinition)
//! declared by `cron-stack-common` into real AWS resources and removes them
//! again. It is also the library behind the `cron-stack` binary.
//!
//! ## Modules
//!
//! - [`aws`]: AWS SDK wrappers (EC2, IAM, S3, STS), tag scanning and resource guards
//! - [`config`]: Deployment configuration assembled from CLI arguments
//! - [`deploy`]: Deployment engine, progress reporting and teardown
//! - [`wait`]: Polling with exponential backoff and cancellation

pub mod aws;
pub mod config;
pub mod deploy;
pub mod wait;

#[cfg(test)]
pub(crate) mod testing;
