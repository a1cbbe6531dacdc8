//! Script assets: local files uploaded to S3 under a content-addressed key

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};

use super::{LogicalId, StackError};
use crate::defaults::ASSET_KEY_PREFIX;

/// A local file that deployment uploads verbatim
///
/// The contents are read once at declaration; the upload sends those same
/// bytes, so the object always matches its content-addressed key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptAsset {
    #[serde(serialize_with = "lossy_path")]
    pub source_path: PathBuf,
    /// Hex SHA-256 of the file contents
    pub sha256: String,
    pub size: u64,
    #[serde(skip)]
    contents: Vec<u8>,
}

impl ScriptAsset {
    /// Read and hash the file at `path`
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, StackError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| StackError::AssetRead {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_bytes(path, &bytes))
    }

    /// Describe an asset whose contents are already in memory
    pub fn from_bytes(source_path: impl Into<PathBuf>, bytes: &[u8]) -> Self {
        Self {
            source_path: source_path.into(),
            sha256: hex::encode(Sha256::digest(bytes)),
            size: bytes.len() as u64,
            contents: bytes.to_vec(),
        }
    }

    /// The bytes that were hashed
    pub fn contents(&self) -> &[u8] {
        &self.contents
    }

    /// `assets/<sha256>.<ext>`, or `assets/<sha256>` for files without an extension
    pub fn object_key(&self) -> String {
        match self.source_path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if !ext.is_empty() => format!("{ASSET_KEY_PREFIX}/{}.{ext}", self.sha256),
            _ => format!("{ASSET_KEY_PREFIX}/{}", self.sha256),
        }
    }
}

fn lossy_path<S: Serializer>(path: &Path, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&path.to_string_lossy())
}

/// Where an asset ended up after upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetLocation {
    pub bucket: String,
    pub key: String,
}

impl AssetLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    pub fn s3_url(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }

    pub fn object_arn(&self) -> String {
        format!("arn:aws:s3:::{}/{}", self.bucket, self.key)
    }
}

/// Uploaded locations keyed by the asset's logical id
pub type AssetLocations = BTreeMap<LogicalId, AssetLocation>;
