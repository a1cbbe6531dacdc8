//! AWS test utilities

use chrono::Utc;

/// Get the AWS region for tests.
///
/// Checks `AWS_REGION`, then `AWS_DEFAULT_REGION`, then falls back to
/// us-east-2.
pub fn get_test_region() -> String {
    std::env::var("AWS_REGION")
        .or_else(|_| std::env::var("AWS_DEFAULT_REGION"))
        .unwrap_or_else(|_| "us-east-2".to_string())
}

/// Unique stack name for test deployments.
///
/// Format: `cron-stack-test-{timestamp_ms}-{counter}`, short enough that
/// `{name}-InstanceRole` still fits IAM's name limit.
///
/// # Example
///
/// ```
/// use cron_stack_test_utils::aws::test_stack_name;
///
/// let name = test_stack_name();
/// assert!(name.starts_with("cron-stack-test-"));
/// ```
pub fn test_stack_name() -> String {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let ts = Utc::now().timestamp_millis();
    let counter = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("cron-stack-test-{ts}-{counter}")
}
