//! cron-stack: deploy a Python script onto EC2 and run it from cron
//!
//! `synth` prints the declared stack, `deploy` creates it, `status` lists
//! what is deployed, and `destroy` removes it again.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use cron_stack::aws::classify_anyhow_error;
use cron_stack::aws::scanner::DiscoveredResource;
use cron_stack::config::{AwsConfig, DeployConfig, RuntimeFlags};
use cron_stack::deploy;
use cron_stack_common::StackProps;
use cron_stack_common::defaults::{
    ANY_IPV4, DEFAULT_INSTANCE_TIMEOUT, DEFAULT_INSTANCE_TYPE, DEFAULT_REGION,
    DEFAULT_SCRIPT_PATH, DEFAULT_STACK_NAME,
};
use cron_stack_common::stack::{Ipv4Cidr, VpcLookup};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "cron-stack")]
#[command(about = "Run a Python script every minute on an EC2 instance")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

/// Which deployed stack to act on
#[derive(clap::Args, Debug)]
struct TargetArgs {
    /// Stack name; also the prefix of every physical resource name
    #[arg(long, default_value = DEFAULT_STACK_NAME)]
    stack_name: String,

    /// AWS region
    #[arg(long, env = "AWS_REGION", default_value = DEFAULT_REGION)]
    region: String,

    /// AWS profile to use
    #[arg(long, env = "AWS_PROFILE")]
    aws_profile: Option<String>,
}

impl TargetArgs {
    fn aws(&self) -> AwsConfig {
        AwsConfig {
            region: self.region.clone(),
            aws_profile: self.aws_profile.clone(),
        }
    }
}

/// Inputs of the stack declaration
#[derive(clap::Args, Debug)]
struct StackArgs {
    #[command(flatten)]
    target: TargetArgs,

    /// Local Python script to schedule
    #[arg(long, default_value = DEFAULT_SCRIPT_PATH)]
    script: PathBuf,

    /// EC2 instance type
    #[arg(long, default_value = DEFAULT_INSTANCE_TYPE)]
    instance_type: String,

    /// Source CIDR allowed to reach SSH (port 22)
    #[arg(long, default_value = ANY_IPV4)]
    ssh_cidr: Ipv4Cidr,

    /// Deploy into this VPC instead of the default VPC
    #[arg(long)]
    vpc_id: Option<String>,
}

impl StackArgs {
    fn into_config(self, flags: RuntimeFlags) -> DeployConfig {
        let aws = self.target.aws();
        DeployConfig {
            aws,
            stack: StackProps {
                stack_name: self.target.stack_name,
                instance_type: self.instance_type,
                vpc: self.vpc_id.map_or(VpcLookup::Default, VpcLookup::ById),
                ssh_cidr: self.ssh_cidr,
                ..StackProps::default()
            },
            script: self.script,
            flags,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the declared stack as JSON without touching AWS
    Synth {
        #[command(flatten)]
        stack: StackArgs,

        /// Write the JSON to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Create the stack in AWS
    Deploy {
        #[command(flatten)]
        stack: StackArgs,

        /// Check credentials and the VPC without creating anything
        #[arg(long)]
        dry_run: bool,

        /// Return once the instance is launched instead of waiting for it to run
        #[arg(long)]
        no_wait: bool,

        /// Seconds to wait for the instance to reach `running`
        #[arg(long, default_value_t = DEFAULT_INSTANCE_TIMEOUT)]
        instance_timeout: u64,

        /// Write the stack outputs as JSON to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Delete every resource of the stack (dry run unless --execute)
    Destroy {
        #[command(flatten)]
        target: TargetArgs,

        /// Actually delete resources
        #[arg(long)]
        execute: bool,
    },

    /// List the deployed resources of the stack
    Status {
        #[command(flatten)]
        target: TargetArgs,

        /// Output format
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&e);
        std::process::exit(1);
    }
}

/// Print error in a user-friendly way
fn print_error(e: &anyhow::Error) {
    use std::io::Write;

    let mut stderr = std::io::stderr();

    let _ = writeln!(stderr, "\n\x1b[1;31mError:\x1b[0m {e}");

    let mut source = e.source();
    while let Some(cause) = source {
        let _ = writeln!(stderr, "  \x1b[33mCaused by:\x1b[0m {cause}");
        source = cause.source();
    }

    if let Some(hint) = classify_anyhow_error(e).suggestion() {
        let _ = writeln!(stderr, "\n\x1b[36mHint:\x1b[0m {hint}");
    }

    if std::env::var("RUST_BACKTRACE").is_err() {
        let _ = writeln!(
            stderr,
            "\n\x1b[2mSet RUST_BACKTRACE=1 for a detailed backtrace\x1b[0m"
        );
    } else {
        let backtrace = e.backtrace();
        if backtrace.status() == std::backtrace::BacktraceStatus::Captured {
            let _ = writeln!(stderr, "\n\x1b[2mBacktrace:\x1b[0m\n{backtrace}");
        }
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into())
                // Keep the AWS SDK quiet unless something goes wrong
                .add_directive("aws_config=warn".parse()?)
                .add_directive("aws_smithy_runtime=warn".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Command::Synth { stack, output } => {
            let config = stack.into_config(RuntimeFlags::default());
            let template = deploy::synthesize(&config)?;
            let json = serde_json::to_string_pretty(&template)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    info!(path = %path.display(), "Synthesized stack written");
                }
                None => println!("{json}"),
            }
        }

        Command::Deploy {
            stack,
            dry_run,
            no_wait,
            instance_timeout,
            output,
        } => {
            let config = stack.into_config(RuntimeFlags {
                dry_run,
                wait: !no_wait,
                instance_timeout: Some(instance_timeout),
                output,
            });
            handle_deploy(&config).await?;
        }

        Command::Destroy { target, execute } => {
            if !execute {
                info!("Dry run; pass --execute to delete resources");
            }
            let report = deploy::destroy_stack(&target.aws(), &target.stack_name, !execute).await?;
            println!(
                "Found {} resource(s): {} deleted, {} failed, {} skipped",
                report.total_found, report.deleted, report.failed, report.skipped
            );
            if report.failed > 0 {
                anyhow::bail!(
                    "{} resource(s) of {} could not be deleted",
                    report.failed,
                    target.stack_name
                );
            }
        }

        Command::Status { target, format } => {
            let resources = deploy::stack_status(&target.aws(), &target.stack_name).await?;
            print_status(&target.stack_name, &resources, format)?;
        }
    }

    Ok(())
}

async fn handle_deploy(config: &DeployConfig) -> Result<()> {
    let cancel = CancellationToken::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, rolling back");
            signal.cancel();
        }
    });

    let Some(outputs) = deploy::deploy_stack(config, &cancel).await? else {
        println!("Dry run complete; nothing was created.");
        return Ok(());
    };

    print!("{outputs}");
    if let Some(path) = &config.flags.output {
        std::fs::write(path, serde_json::to_string_pretty(&outputs)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(path = %path.display(), "Stack outputs written");
    }
    Ok(())
}

fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() > width {
        let kept: String = value.chars().take(width - 3).collect();
        format!("{kept}...")
    } else {
        value.to_string()
    }
}

fn print_status(
    stack_name: &str,
    resources: &[DiscoveredResource],
    format: OutputFormat,
) -> Result<()> {
    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(resources)?);
        return Ok(());
    }

    if resources.is_empty() {
        println!("Stack {stack_name} has no deployed resources.");
        return Ok(());
    }

    println!(
        "{:<18} {:<32} {:<22} {:<20} {:<10}",
        "TYPE", "ID", "LOGICAL_ID", "CREATED_AT", "STATUS"
    );
    println!("{}", "-".repeat(106));
    for r in resources {
        println!(
            "{:<18} {:<32} {:<22} {:<20} {:<10}",
            r.kind.as_str(),
            truncate(&r.resource_id, 32),
            truncate(r.logical_id.as_deref().unwrap_or("-"), 22),
            r.created_at
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string()),
            r.status.as_deref().unwrap_or("-"),
        );
    }
    println!("\nTotal: {} resources", resources.len());

    Ok(())
}
