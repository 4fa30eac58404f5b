use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::graph::ModuleGraph;
use crate::core::manifest::Manifest;

/// Environment the build runs for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Development,
    Production,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Development => "development",
            Mode::Production => "production",
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Mode::Production)
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stylesheet transforms, applied in the order they are declared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StyleTransformKind {
    /// Utility-class expansion (`@tailwind`, `@apply`)
    Utilities,
    /// Vendor prefixing for the configured browser targets
    Autoprefixer,
}

impl StyleTransformKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "utilities" | "tailwindcss" => Some(Self::Utilities),
            "autoprefixer" => Some(Self::Autoprefixer),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Utilities => "utilities",
            Self::Autoprefixer => "autoprefixer",
        }
    }
}

/// Fully composed build configuration. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfig {
    pub root: PathBuf,
    pub mode: Mode,
    pub entries: BTreeMap<String, PathBuf>,
    pub output: OutputOptions,
    pub style_transforms: Vec<StyleTransformKind>,
    pub targets: Vec<String>,
    pub utilities: UtilitiesConfig,
    pub resolve: ResolveConfig,
    pub minify: bool,
    pub vendor_chunk: bool,
    pub write_to_disk: bool,
    pub manifest_path: PathBuf,
    pub stats_path: Option<PathBuf>,
    pub dev_server: DevServerConfig,
    pub watch: WatchConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputOptions {
    pub path: PathBuf,
    pub public_path: String,
    pub filename: String,
    pub css_filename: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UtilitiesConfig {
    /// Globs (relative to root) scanned for utility class candidates
    pub content: Vec<String>,
    /// Extra utilities: class name -> declarations
    pub custom: BTreeMap<String, String>,
    /// Component classes emitted by `@tailwind components`: selector -> utility list
    pub components: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveConfig {
    pub extensions: Vec<String>,
    pub modules: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DevServerConfig {
    pub host: String,
    pub port: u16,
    pub proxy: Vec<ProxyRule>,
    pub live_reload: bool,
    pub overlay: bool,
    pub cors: bool,
}

/// One reverse-proxy rule. `context` entries are globs; a leading `!` negates.
/// A rule without a `target` forwards to the configured backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyRule {
    pub context: Vec<String>,
    #[serde(default)]
    pub target: String,
    #[serde(default = "default_true")]
    pub secure: bool,
    #[serde(default)]
    pub change_origin: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchConfig {
    pub debounce_ms: u64,
    /// Extra paths watched besides the project root
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ModuleInfo {
    pub path: PathBuf,
    /// Stable module id inside a bundle (root-relative path, `/` separated)
    pub id: String,
    pub content: String,
    pub module_type: ModuleType,
    /// Resolved paths of the modules this one imports
    pub dependencies: Vec<PathBuf>,
    /// Import specifier -> id of the script module it resolves to
    pub import_ids: HashMap<String, String>,
}

impl ModuleInfo {
    pub fn new(path: PathBuf, root: &Path, content: String) -> Self {
        Self {
            id: module_id(root, &path),
            module_type: ModuleType::from_path(&path),
            path,
            content,
            dependencies: Vec::new(),
            import_ids: HashMap::new(),
        }
    }

    pub fn is_vendor(&self) -> bool {
        self.path
            .components()
            .any(|c| c.as_os_str() == "node_modules")
    }
}

/// Root-relative id of a module, independent of the host path separator.
pub fn module_id(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleType {
    JavaScript,
    Css,
    Scss,
    Unknown,
}

impl ModuleType {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "js" | "jsx" | "mjs" => ModuleType::JavaScript,
            "css" => ModuleType::Css,
            "scss" | "sass" => ModuleType::Scss,
            _ => ModuleType::Unknown,
        }
    }

    pub fn from_path(path: &Path) -> Self {
        Self::from_extension(path.extension().and_then(|s| s.to_str()).unwrap_or(""))
    }

    pub fn is_stylesheet(&self) -> bool {
        matches!(self, ModuleType::Css | ModuleType::Scss)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Script,
    Stylesheet,
}

impl AssetKind {
    pub fn content_type(&self) -> &'static str {
        match self {
            AssetKind::Script => "application/javascript; charset=utf-8",
            AssetKind::Stylesheet => "text/css; charset=utf-8",
        }
    }
}

/// One artifact produced by a build
#[derive(Debug, Clone, PartialEq)]
pub struct EmittedAsset {
    /// Manifest key, e.g. `main.css`
    pub logical_name: String,
    /// Chunk the asset belongs to, e.g. `main` or `vendors`
    pub chunk: String,
    pub kind: AssetKind,
    /// Path relative to the output directory, hash included
    pub filename: String,
    pub content: String,
}

impl EmittedAsset {
    pub fn size(&self) -> usize {
        self.content.len()
    }
}

/// Staged result of a build; nothing is visible to readers until it is emitted.
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub assets: Vec<EmittedAsset>,
    pub manifest: Manifest,
    pub graph: ModuleGraph,
    /// Entries that were recompiled (all of them for a full build)
    pub compiled_entries: Vec<String>,
    pub build_time: Duration,
}

impl BuildOutput {
    pub fn asset(&self, logical_name: &str) -> Option<&EmittedAsset> {
        self.assets.iter().find(|a| a.logical_name == logical_name)
    }
}
