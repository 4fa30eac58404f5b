use crate::core::interfaces::FileSystemService;
use crate::core::models::EmittedAsset;
use crate::utils::{Result, TailpackError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Logical asset name -> emitted filename (relative to the output directory).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    entries: BTreeMap<String, String>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the manifest for one output set, enforcing both uniqueness rules.
    pub fn from_assets(assets: &[EmittedAsset]) -> Result<Self> {
        let mut manifest = Self::new();
        for asset in assets {
            manifest.insert(&asset.logical_name, &asset.filename)?;
        }
        manifest.ensure_unique_filenames()?;
        Ok(manifest)
    }

    pub fn insert(&mut self, logical_name: &str, filename: &str) -> Result<()> {
        if self.entries.contains_key(logical_name) {
            return Err(TailpackError::build(format!(
                "duplicate manifest entry '{}'",
                logical_name
            )));
        }
        self.entries
            .insert(logical_name.to_string(), filename.to_string());
        Ok(())
    }

    /// Two logical assets must never share an emitted filename.
    pub fn ensure_unique_filenames(&self) -> Result<()> {
        let mut seen: HashMap<&str, &str> = HashMap::new();
        for (name, filename) in &self.entries {
            if let Some(other) = seen.insert(filename.as_str(), name.as_str()) {
                return Err(TailpackError::build(format!(
                    "'{}' and '{}' both emit '{}'; add [contenthash] to the filename template",
                    other, name, filename
                )));
            }
        }
        Ok(())
    }

    pub fn get(&self, logical_name: &str) -> Option<&str> {
        self.entries.get(logical_name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Public URL of a logical asset.
    pub fn url_for(&self, logical_name: &str, public_path: &str) -> Option<String> {
        self.get(logical_name)
            .map(|filename| join_public_path(public_path, filename))
    }

    /// Logical names whose filename differs from `previous` (added, changed or removed).
    pub fn changed_since(&self, previous: &Manifest) -> Vec<String> {
        let mut changed: Vec<String> = self
            .entries
            .iter()
            .filter(|(name, filename)| previous.entries.get(*name) != Some(*filename))
            .map(|(name, _)| name.clone())
            .collect();

        changed.extend(
            previous
                .entries
                .keys()
                .filter(|name| !self.entries.contains_key(*name))
                .cloned(),
        );

        changed.sort();
        changed
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| TailpackError::build(format!("manifest serialization failed: {}", e)))
    }

    /// Replace the manifest on disk. Readers see either the old or the new file.
    pub async fn write(&self, fs: &dyn FileSystemService, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        fs.write_file_atomic(path, &json).await
    }
}

pub fn join_public_path(public_path: &str, filename: &str) -> String {
    if public_path.ends_with('/') {
        format!("{}{}", public_path, filename)
    } else {
        format!("{}/{}", public_path, filename)
    }
}

/// Stats file in the shape consumed by bundle-tracker style template loaders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StatsFile {
    Done {
        #[serde(rename = "publicPath")]
        public_path: String,
        chunks: BTreeMap<String, Vec<StatsChunkFile>>,
    },
    Error {
        error: String,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsChunkFile {
    pub name: String,
    pub path: String,
    #[serde(rename = "publicPath")]
    pub public_path: String,
}

impl StatsFile {
    pub fn done(assets: &[EmittedAsset], output_dir: &Path, public_path: &str) -> Self {
        let mut chunks: BTreeMap<String, Vec<StatsChunkFile>> = BTreeMap::new();
        for asset in assets {
            chunks
                .entry(asset.chunk.clone())
                .or_default()
                .push(StatsChunkFile {
                    name: asset.filename.clone(),
                    path: output_dir.join(&asset.filename).display().to_string(),
                    public_path: join_public_path(public_path, &asset.filename),
                });
        }
        StatsFile::Done {
            public_path: public_path.to_string(),
            chunks,
        }
    }

    pub fn error(err: &TailpackError) -> Self {
        let kind = match err {
            TailpackError::Config { .. } => "ConfigError",
            TailpackError::Transform { .. } => "TransformError",
            TailpackError::Proxy { .. } => "ProxyError",
            _ => "BuildError",
        };
        StatsFile::Error {
            error: kind.to_string(),
            message: err.to_string(),
        }
    }

    pub async fn write(&self, fs: &dyn FileSystemService, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| TailpackError::build(format!("stats serialization failed: {}", e)))?;
        fs.write_file_atomic(path, &json).await
    }
}
