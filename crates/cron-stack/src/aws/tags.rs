//! Tag builders for the EC2, IAM and S3 SDKs
//!
//! The tag keys live in [`cron_stack_common::tags`]; this module turns them
//! into each SDK's tag types.

use anyhow::Result;
use chrono::Utc;
pub use cron_stack_common::tags::*;

/// The tags every resource of a stack carries, in order
pub fn standard_tags(
    stack_name: &str,
    logical_id: &str,
    region: &str,
) -> Vec<(&'static str, String)> {
    vec![
        (TAG_TOOL, TAG_TOOL_VALUE.to_string()),
        (TAG_STACK, stack_name.to_string()),
        (TAG_LOGICAL_ID, logical_id.to_string()),
        (TAG_REGION, region.to_string()),
        (TAG_CREATED_AT, format_created_at(Utc::now())),
        (TAG_STATUS, status::CREATING.to_string()),
        (TAG_NAME, display_name(stack_name, logical_id)),
    ]
}

/// EC2 `TagSpecification` applying the standard tags at creation
pub fn ec2_tag_spec(
    resource_type: aws_sdk_ec2::types::ResourceType,
    stack_name: &str,
    logical_id: &str,
    region: &str,
) -> aws_sdk_ec2::types::TagSpecification {
    use aws_sdk_ec2::types::{Tag, TagSpecification};

    standard_tags(stack_name, logical_id, region)
        .into_iter()
        .fold(
            TagSpecification::builder().resource_type(resource_type),
            |builder, (key, value)| builder.tags(Tag::builder().key(key).value(value).build()),
        )
        .build()
}

/// IAM tags for a role or instance profile
pub fn iam_tags(
    stack_name: &str,
    logical_id: &str,
    region: &str,
) -> Result<Vec<aws_sdk_iam::types::Tag>> {
    standard_tags(stack_name, logical_id, region)
        .into_iter()
        .map(|(key, value)| {
            aws_sdk_iam::types::Tag::builder()
                .key(key)
                .value(value)
                .build()
                .map_err(|e| anyhow::anyhow!("Failed to build IAM tag: {e}"))
        })
        .collect()
}

/// Tagging for the shared asset bucket, which belongs to no single stack
pub fn s3_bucket_tagging() -> Result<aws_sdk_s3::types::Tagging> {
    use aws_sdk_s3::types::{Tag, Tagging};

    Ok(Tagging::builder()
        .tag_set(Tag::builder().key(TAG_TOOL).value(TAG_TOOL_VALUE).build()?)
        .tag_set(
            Tag::builder()
                .key(TAG_CREATED_AT)
                .value(format_created_at(Utc::now()))
                .build()?,
        )
        .build()?)
}

/// EC2 tag filter selecting a stack's resources (or every cron-stack resource)
pub fn ec2_stack_filters(stack_name: Option<&str>) -> Vec<aws_sdk_ec2::types::Filter> {
    use aws_sdk_ec2::types::Filter;

    let mut filters = vec![
        Filter::builder()
            .name(format!("tag:{TAG_TOOL}"))
            .values(TAG_TOOL_VALUE)
            .build(),
    ];
    if let Some(stack) = stack_name {
        filters.push(
            Filter::builder()
                .name(format!("tag:{TAG_STACK}"))
                .values(stack)
                .build(),
        );
    }
    filters
}
