//! Boot configuration: files placed on the instance before its own commands run

use std::path::Path;

use serde::{Serialize, Serializer};
use serde_json::json;

use super::{AssetLocations, LogicalId, StackError, validate_shell_input};

/// A file written from an uploaded asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitFile {
    /// Absolute path on the instance
    pub target: String,
    pub asset: LogicalId,
    #[serde(serialize_with = "octal_mode")]
    pub mode: u32,
    pub owner: String,
    pub group: String,
}

impl InitFile {
    /// Place `asset` at `target`, owned by root with mode 0644
    pub fn from_existing_asset(target: impl Into<String>, asset: LogicalId) -> Self {
        Self {
            target: target.into(),
            asset,
            mode: 0o644,
            owner: "root".to_string(),
            group: "root".to_string(),
        }
    }

    fn render(&self, locations: &AssetLocations) -> Result<Vec<String>, StackError> {
        let location = locations
            .get(&self.asset)
            .ok_or_else(|| StackError::UnresolvedAsset(self.asset.clone()))?;
        validate_shell_input(&self.target, "file target")?;
        validate_shell_input(&self.owner, "file owner")?;
        validate_shell_input(&self.group, "file group")?;
        validate_shell_input(&location.s3_url(), "asset url")?;

        let mut commands = Vec::with_capacity(4);
        let parent = Path::new(&self.target)
            .parent()
            .and_then(|p| p.to_str())
            .filter(|p| !p.is_empty() && *p != "/");
        if let Some(parent) = parent {
            commands.push(format!("mkdir -p {parent}"));
        }
        commands.push(format!("aws s3 cp {} {}", location.s3_url(), self.target));
        commands.push(format!("chown {}:{} {}", self.owner, self.group, self.target));
        commands.push(format!("chmod {:o} {}", self.mode, self.target));
        Ok(commands)
    }
}

fn octal_mode<S: Serializer>(mode: &u32, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&format_args!("{mode:06o}"))
}

/// Files to place on first boot, fetched with the bound role's credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BootConfiguration {
    /// Role granted read access to the referenced assets
    pub role: LogicalId,
    pub files: Vec<InitFile>,
}

impl BootConfiguration {
    pub fn new(role: LogicalId) -> Self {
        Self {
            role,
            files: Vec::new(),
        }
    }

    pub fn with_file(mut self, file: InitFile) -> Self {
        self.files.push(file);
        self
    }

    /// Assets referenced by any file, in declaration order without repeats
    pub fn assets(&self) -> Vec<&LogicalId> {
        let mut assets: Vec<&LogicalId> = Vec::new();
        for file in &self.files {
            if !assets.contains(&&file.asset) {
                assets.push(&file.asset);
            }
        }
        assets
    }

    /// Shell commands that place every file, in declaration order
    pub fn render_commands(&self, locations: &AssetLocations) -> Result<Vec<String>, StackError> {
        let mut commands = Vec::new();
        for file in &self.files {
            commands.extend(file.render(locations)?);
        }
        Ok(commands)
    }

    /// Inline policy letting the bound role read the referenced asset objects
    pub fn read_grant_policy(
        &self,
        locations: &AssetLocations,
    ) -> Result<serde_json::Value, StackError> {
        let resources = self
            .assets()
            .into_iter()
            .map(|asset| {
                locations
                    .get(asset)
                    .map(|location| location.object_arn())
                    .ok_or_else(|| StackError::UnresolvedAsset(asset.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(json!({
            "Version": "2012-10-17",
            "Statement": [{
                "Effect": "Allow",
                "Action": ["s3:GetObject"],
                "Resource": resources
            }]
        }))
    }
}
