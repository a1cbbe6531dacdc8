//! End-to-end deployment against real AWS
//!
//! These tests create real resources and are marked `#[ignore]`. Run with:
//! ```text
//! AWS_PROFILE=your_profile cargo test --test aws_deploy_integration -- --ignored
//! ```

use cron_stack::config::{AwsConfig, DeployConfig, RuntimeFlags};
use cron_stack::deploy::{deploy_stack, destroy_stack, stack_status};
use cron_stack_common::{ResourceKind, StackProps};
use cron_stack_test_utils::{get_test_region, test_script, test_stack_name};
use tokio_util::sync::CancellationToken;

fn config(script: &std::path::Path, stack_name: String, dry_run: bool) -> DeployConfig {
    DeployConfig {
        aws: AwsConfig {
            region: get_test_region(),
            aws_profile: None,
        },
        stack: StackProps {
            stack_name,
            // Restrict SSH for test stacks
            ssh_cidr: "203.0.113.0/24".parse().unwrap(),
            ..StackProps::default()
        },
        script: script.to_path_buf(),
        flags: RuntimeFlags {
            dry_run,
            ..RuntimeFlags::default()
        },
    }
}

/// Dry run resolves the default VPC and creates nothing
#[tokio::test]
#[ignore]
async fn test_dry_run_creates_nothing() {
    let script = test_script("print('dry run')\n").unwrap();
    let config = config(script.path(), test_stack_name(), true);

    let outputs = deploy_stack(&config, &CancellationToken::new())
        .await
        .expect("AWS credentials required - set AWS_PROFILE or AWS_ACCESS_KEY_ID");
    assert!(outputs.is_none());

    let resources = stack_status(&config.aws, config.stack_name()).await.unwrap();
    assert!(resources.is_empty());
}

/// Deploy, list, refuse a second deploy, destroy
#[tokio::test]
#[ignore]
async fn test_deploy_status_destroy() {
    let script = test_script("print('integration')\n").unwrap();
    let config = config(script.path(), test_stack_name(), false);
    let aws: AwsConfig = config.aws.clone();
    let stack_name = config.stack_name().to_string();

    let outputs = deploy_stack(&config, &CancellationToken::new())
        .await
        .expect("Deploy should succeed")
        .expect("Not a dry run");
    assert!(outputs.instance_id.starts_with("i-"));
    assert!(outputs.security_group_id.starts_with("sg-"));
    assert!(outputs.asset_url.starts_with("s3://"));

    let resources = stack_status(&aws, &stack_name).await.unwrap();
    for kind in [
        ResourceKind::Ec2Instance,
        ResourceKind::IamInstanceProfile,
        ResourceKind::IamRole,
        ResourceKind::SecurityGroup,
    ] {
        assert!(
            resources.iter().any(|r| r.kind == kind),
            "{kind} not found in {resources:?}"
        );
    }
    assert!(
        resources
            .iter()
            .all(|r| r.status.as_deref() == Some("active"))
    );

    let second = deploy_stack(&config, &CancellationToken::new()).await;
    assert!(second.is_err(), "Existing stack must block a second deploy");

    let report = destroy_stack(&aws, &stack_name, false).await.unwrap();
    assert_eq!(report.failed, 0, "Teardown failed: {report:?}");
    assert_eq!(report.deleted, resources.len());

    // Terminated instances drop out of the scan
    let remaining = stack_status(&aws, &stack_name).await.unwrap();
    assert!(remaining.is_empty(), "Left behind: {remaining:?}");
}
