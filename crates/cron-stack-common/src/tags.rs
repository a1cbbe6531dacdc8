//! AWS resource tag constants for cron-stack
//!
//! Every resource a deployment creates carries these tags. Teardown and
//! `status` find a stack's resources through them, so the stack itself keeps
//! no local state.
//!
//! ## Tag Schema
//!
//! | Tag Key | Description |
//! |---------|-------------|
//! | `cron-stack:tool` | Static identifier ("cron-stack") |
//! | `cron-stack:stack` | Stack name |
//! | `cron-stack:logical-id` | Logical id of the declaring resource |
//! | `cron-stack:region` | Deployment region; IAM is global, so scans filter on it |
//! | `cron-stack:created-at` | RFC 3339 creation timestamp |
//! | `cron-stack:status` | Lifecycle status (creating/active) |
//! | `Name` | `<stack>/<logical id>`, for the EC2 console |

/// Tag key for tool identification - all cron-stack resources have this
pub const TAG_TOOL: &str = "cron-stack:tool";

/// Tag value for tool identification
pub const TAG_TOOL_VALUE: &str = "cron-stack";

/// Tag key for the owning stack
pub const TAG_STACK: &str = "cron-stack:stack";

/// Tag key for the logical id inside the stack
pub const TAG_LOGICAL_ID: &str = "cron-stack:logical-id";

/// Tag key for the region the stack was deployed to
pub const TAG_REGION: &str = "cron-stack:region";

/// Tag key for creation timestamp (RFC 3339 format)
pub const TAG_CREATED_AT: &str = "cron-stack:created-at";

/// Tag key for resource lifecycle status
pub const TAG_STATUS: &str = "cron-stack:status";

/// Console display name
pub const TAG_NAME: &str = "Name";

/// Resource lifecycle status values
pub mod status {
    /// Created by a deployment that has not finished yet
    pub const CREATING: &str = "creating";

    /// Part of a successfully deployed stack
    pub const ACTIVE: &str = "active";
}

/// Value of the `Name` tag for a resource
pub fn display_name(stack_name: &str, logical_id: &str) -> String {
    format!("{stack_name}/{logical_id}")
}

/// Helper to format creation timestamp for tags
pub fn format_created_at(time: chrono::DateTime<chrono::Utc>) -> String {
    time.to_rfc3339()
}

/// Helper to parse creation timestamp from tags
pub fn parse_created_at(s: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&chrono::Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_created_at_is_rfc3339() {
        let time = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(format_created_at(time), "2024-03-01T12:30:00+00:00");
        assert_eq!(parse_created_at("2024-03-01T12:30:00+00:00"), Some(time));
    }

    #[test]
    fn test_parse_normalizes_offset() {
        let parsed = parse_created_at("2024-03-01T14:30:00+02:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap());
    }

    #[test]
    fn test_parse_invalid() {
        assert!(parse_created_at("not a timestamp").is_none());
        assert!(parse_created_at("").is_none());
    }

    #[test]
    fn test_display_name() {
        assert_eq!(
            display_name("Ec2Stack", "PythonEnvEC2Instance"),
            "Ec2Stack/PythonEnvEC2Instance"
        );
    }
}
