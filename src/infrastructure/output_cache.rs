//! In-memory build output shared between the rebuild loop and the dev server.
//!
//! Uses `arc-swap`: the single writer builds a complete snapshot and swaps it
//! in, readers load the current `Arc` without locking and never observe a
//! half-published build.

use crate::core::graph::ModuleGraph;
use crate::core::manifest::{join_public_path, Manifest};
use crate::core::models::BuildOutput;
use arc_swap::ArcSwap;
use axum::body::Bytes;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct ServedAsset {
    pub logical_name: String,
    pub content: Bytes,
    pub content_type: &'static str,
}

/// One complete, immutable build output
#[derive(Debug, Clone, Default)]
pub struct BuildSnapshot {
    pub generation: u64,
    /// URL path (public path included) -> asset
    pub assets: HashMap<String, ServedAsset>,
    pub manifest: Manifest,
    pub graph: ModuleGraph,
}

/// Path part of the public prefix; a CDN-style absolute URL keeps only its path.
pub fn public_url_path(public_path: &str) -> String {
    if public_path.contains("://") {
        if let Ok(url) = reqwest::Url::parse(public_path) {
            return url.path().to_string();
        }
    }
    public_path.to_string()
}

impl BuildSnapshot {
    pub fn from_output(output: &BuildOutput, public_path: &str, generation: u64) -> Self {
        let prefix = public_url_path(public_path);
        let assets = output
            .assets
            .iter()
            .map(|asset| {
                (
                    join_public_path(&prefix, &asset.filename),
                    ServedAsset {
                        logical_name: asset.logical_name.clone(),
                        content: Bytes::from(asset.content.clone()),
                        content_type: asset.kind.content_type(),
                    },
                )
            })
            .collect();

        Self {
            generation,
            assets,
            manifest: output.manifest.clone(),
            graph: output.graph.clone(),
        }
    }

    pub fn get(&self, url_path: &str) -> Option<&ServedAsset> {
        self.assets.get(url_path)
    }

    pub fn is_empty(&self) -> bool {
        self.generation == 0
    }
}

/// Holds exactly one snapshot at a time
pub struct OutputCache {
    current: ArcSwap<BuildSnapshot>,
}

impl OutputCache {
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(BuildSnapshot::default()),
        }
    }

    #[inline]
    pub fn load(&self) -> Arc<BuildSnapshot> {
        self.current.load_full()
    }

    /// Swap in a new snapshot, returning the one it replaced.
    pub fn publish(&self, snapshot: BuildSnapshot) -> Arc<BuildSnapshot> {
        self.current.swap(Arc::new(snapshot))
    }

    pub fn generation(&self) -> u64 {
        self.current.load().generation
    }
}

impl Default for OutputCache {
    fn default() -> Self {
        Self::new()
    }
}
