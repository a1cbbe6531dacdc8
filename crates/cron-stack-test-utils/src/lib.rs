//! Shared test utilities for cron-stack
//!
//! ## Modules
//!
//! - [`aws`]: AWS region detection and unique stack names
//! - [`script`]: Throwaway Python scripts to deploy

pub mod aws;
pub mod script;

pub use aws::{get_test_region, test_stack_name};
pub use script::test_script;
