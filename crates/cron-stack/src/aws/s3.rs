//! S3 asset bucket and asset objects

use std::future::Future;

use anyhow::{Context, Result};
use aws_sdk_s3::types::{
    BucketLocationConstraint, CreateBucketConfiguration, PublicAccessBlockConfiguration,
};
use aws_sdk_s3::{Client, primitives::ByteStream};
use cron_stack_common::defaults::ASSET_BUCKET_PREFIX;
use cron_stack_common::stack::AssetLocation;
use tracing::{debug, info};

use crate::aws::account::AccountId;
use crate::aws::context::{AwsContext, FromAwsContext};
use crate::aws::error::{classify_anyhow_error, ignore_not_found};
use crate::aws::tags;

/// Name of the asset bucket shared by every stack in one account and region
pub fn asset_bucket_name(account: &AccountId, region: &str) -> String {
    format!("{ASSET_BUCKET_PREFIX}-{account}-{region}")
}

/// S3 calls made by the deployment engine
pub trait S3Operations: Send + Sync + 'static {
    /// Create the asset bucket unless it already exists
    fn ensure_bucket(&self, bucket: &str) -> impl Future<Output = Result<()>> + Send;

    /// Upload `contents` to `location` unless the object is already there.
    ///
    /// Returns `true` if an upload happened.
    fn publish_asset(
        &self,
        location: &AssetLocation,
        contents: &[u8],
    ) -> impl Future<Output = Result<bool>> + Send;
}

/// S3 client for the asset bucket
pub struct S3Client {
    client: Client,
    region: String,
}

impl FromAwsContext for S3Client {
    fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.s3_client(),
            region: ctx.region().to_string(),
        }
    }
}

impl S3Client {
    pub async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        let head = ignore_not_found(self.client.head_bucket().bucket(bucket).send().await)
            .with_context(|| format!("Failed to check bucket {bucket}"))?;
        Ok(head.is_some())
    }

    /// Create a private bucket in this client's region
    pub async fn create_bucket(&self, bucket: &str) -> Result<()> {
        info!(bucket = %bucket, region = %self.region, "Creating asset bucket");

        let mut request = self.client.create_bucket().bucket(bucket);
        // us-east-1 rejects an explicit location constraint
        if self.region != "us-east-1" {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        if let Err(e) = request.send().await {
            let e = anyhow::Error::from(e);
            if classify_anyhow_error(&e).is_already_exists() {
                debug!(bucket = %bucket, "Bucket already owned by this account");
                return Ok(());
            }
            return Err(e.context("Failed to create bucket"));
        }

        self.client
            .put_public_access_block()
            .bucket(bucket)
            .public_access_block_configuration(
                PublicAccessBlockConfiguration::builder()
                    .block_public_acls(true)
                    .ignore_public_acls(true)
                    .block_public_policy(true)
                    .restrict_public_buckets(true)
                    .build(),
            )
            .send()
            .await
            .context("Failed to block public access on bucket")?;

        self.client
            .put_bucket_tagging()
            .bucket(bucket)
            .tagging(tags::s3_bucket_tagging()?)
            .send()
            .await
            .context("Failed to tag bucket")?;

        Ok(())
    }

    pub async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool> {
        let head = ignore_not_found(
            self.client
                .head_object()
                .bucket(bucket)
                .key(key)
                .send()
                .await,
        )
        .with_context(|| format!("Failed to check s3://{bucket}/{key}"))?;
        Ok(head.is_some())
    }

    /// Upload an object from memory
    pub async fn upload_bytes(&self, bucket: &str, key: &str, contents: &[u8]) -> Result<()> {
        debug!(bucket = %bucket, key = %key, size = contents.len(), "Uploading object");

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(contents.to_vec()))
            .send()
            .await
            .with_context(|| format!("Failed to upload s3://{bucket}/{key}"))?;

        Ok(())
    }
}

impl S3Operations for S3Client {
    async fn ensure_bucket(&self, bucket: &str) -> Result<()> {
        if self.bucket_exists(bucket).await? {
            debug!(bucket = %bucket, "Asset bucket exists");
            return Ok(());
        }
        self.create_bucket(bucket).await
    }

    async fn publish_asset(&self, location: &AssetLocation, contents: &[u8]) -> Result<bool> {
        if self.object_exists(&location.bucket, &location.key).await? {
            info!(url = %location.s3_url(), "Asset already uploaded");
            return Ok(false);
        }
        self.upload_bytes(&location.bucket, &location.key, contents)
            .await?;
        info!(url = %location.s3_url(), "Asset uploaded");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_bucket_name() {
        let account = AccountId::new("123456789012");
        assert_eq!(
            asset_bucket_name(&account, "us-east-2"),
            "cron-stack-assets-123456789012-us-east-2"
        );
        // S3 bucket names are at most 63 characters
        assert!(asset_bucket_name(&account, "ap-southeast-3").len() <= 63);
    }
}
