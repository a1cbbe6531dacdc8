//! Configuration types for deployments

use std::path::PathBuf;

use cron_stack_common::StackDefinition;
use cron_stack_common::stack::{ScriptAsset, StackError, StackProps, define_stack};

/// Where to talk to AWS
#[derive(Debug, Clone)]
pub struct AwsConfig {
    pub region: String,
    /// AWS profile name (overrides default credential resolution)
    pub aws_profile: Option<String>,
}

/// Runtime behavior flags
#[derive(Debug, Clone)]
pub struct RuntimeFlags {
    /// Validate and resolve without creating anything
    pub dry_run: bool,
    /// Wait for the instance to reach `running`
    pub wait: bool,
    /// Seconds to wait for `running`
    pub instance_timeout: Option<u64>,
    /// Write outputs as JSON to this path
    pub output: Option<PathBuf>,
}

impl Default for RuntimeFlags {
    fn default() -> Self {
        Self {
            dry_run: false,
            wait: true,
            instance_timeout: None,
            output: None,
        }
    }
}

/// Everything needed to synthesize or deploy one stack
#[derive(Debug, Clone)]
pub struct DeployConfig {
    pub aws: AwsConfig,
    pub stack: StackProps,
    /// Local script uploaded as the stack's asset
    pub script: PathBuf,
    pub flags: RuntimeFlags,
}

impl DeployConfig {
    pub fn region(&self) -> &str {
        &self.aws.region
    }

    pub fn aws_profile(&self) -> Option<&str> {
        self.aws.aws_profile.as_deref()
    }

    pub fn stack_name(&self) -> &str {
        &self.stack.stack_name
    }

    /// Read and hash the script
    pub fn load_asset(&self) -> Result<ScriptAsset, StackError> {
        ScriptAsset::from_path(&self.script)
    }

    /// Declare the stack for the configured script
    pub fn definition(&self) -> Result<StackDefinition, StackError> {
        define_stack(&self.stack, self.load_asset()?)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn config(script: PathBuf) -> DeployConfig {
        DeployConfig {
            aws: AwsConfig {
                region: "us-east-2".into(),
                aws_profile: None,
            },
            stack: StackProps::default(),
            script,
            flags: RuntimeFlags::default(),
        }
    }

    #[test]
    fn test_definition_from_script() {
        let mut script = tempfile::Builder::new().suffix(".py").tempfile().unwrap();
        writeln!(script, "print('hello')").unwrap();

        let config = config(script.path().to_path_buf());
        let stack = config.definition().unwrap();
        assert_eq!(stack.name(), config.stack_name());
        assert_eq!(stack.resources().len(), 6);
    }

    #[test]
    fn test_missing_script() {
        let config = config(PathBuf::from("/nonexistent/simple.py"));
        assert!(matches!(
            config.definition(),
            Err(StackError::AssetRead { .. })
        ));
    }

    #[test]
    fn test_flags_default_to_waiting() {
        let flags = RuntimeFlags::default();
        assert!(flags.wait);
        assert!(!flags.dry_run);
    }
}
