//! AWS account identity

use anyhow::{Context, Result};
use tracing::info;

use super::context::AwsContext;

/// 12-digit AWS account ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display, derive_more::Deref)]
pub struct AccountId(String);

impl AccountId {
    #[cfg(test)]
    pub fn new(s: impl Into<String>) -> Self {
        AccountId(s.into())
    }
}

/// Look up the account behind the current credentials with STS GetCallerIdentity.
///
/// Needs no permissions, so it doubles as the credentials check before any
/// other call is made.
pub async fn get_current_account_id(ctx: &AwsContext) -> Result<AccountId> {
    let identity = ctx
        .sts_client()
        .get_caller_identity()
        .send()
        .await
        .context("Failed to get AWS caller identity - check credentials")?;

    let account = identity
        .account()
        .context("No account ID returned from STS GetCallerIdentity")?;

    info!(account_id = %account, "AWS account validated");

    Ok(AccountId(account.to_string()))
}
