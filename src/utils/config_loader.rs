use crate::core::models::*;
use crate::infrastructure::node_resolver::find_file;
use crate::utils::{Logger, Result, TailpackError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const BASE_CONFIG_FILE: &str = "tailpack.config.json";

const DEFAULT_JS_FILENAME: &str = "js/[name]-[contenthash].js";
const DEFAULT_CSS_FILENAME: &str = "css/[name].[contenthash].css";

/// Configuration file format (`tailpack.config.json`, `tailpack.<mode>.json`).
///
/// Every field is optional so the same schema validates the base file and the
/// per-environment overrides. Defaults are applied in [`ConfigFile::resolve`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
    /// Logical entry name -> source path (relative to the project root)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style_transforms: Option<Vec<String>>,
    /// Browserslist queries for vendor prefixing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub targets: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utilities: Option<UtilitiesSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolve: Option<ResolveSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minify: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_chunk: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_to_disk: Option<bool>,
    /// Manifest location (relative to the project root)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest: Option<String>,
    /// Optional bundle-tracker style stats file (relative to the project root)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dev_server: Option<DevServerSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watch: Option<WatchSection>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub css_filename: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UtilitiesSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modules: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevServerSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Backend origin; used for the default proxy rule
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<Vec<ProxyRule>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub live_reload: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlay: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cors: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debounce_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paths: Option<Vec<String>>,
}

/// Deep-merge `overlay` into `base`.
///
/// Objects are overlaid key by key, arrays are concatenated (base first) and
/// any other value in the overlay replaces the base value.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (Value::Array(base_items), Value::Array(overlay_items)) => {
            base_items.extend(overlay_items);
        }
        (slot, value) => *slot = value,
    }
}

/// Check one configuration layer against the schema.
///
/// Every unknown key is reported, with its full path, in a single error.
pub fn validate_layer(value: &Value, source: &Path) -> Result<ConfigFile> {
    let mut unknown = Vec::new();
    let parsed: ConfigFile = serde_ignored::deserialize(value.clone(), |path| {
        unknown.push(path.to_string());
    })
    .map_err(|e| TailpackError::config(source, e.to_string()))?;

    if !unknown.is_empty() {
        return Err(TailpackError::config(
            source,
            format!("unknown configuration key(s): {}", unknown.join(", ")),
        ));
    }

    Ok(parsed)
}

/// Compose a base layer with an override layer.
///
/// Both layers are validated first; composing the same inputs always yields
/// the same result.
pub fn compose(base: (&Path, &Value), overlay: (&Path, &Value)) -> Result<ConfigFile> {
    compose_layers(&[base, overlay])
}

pub fn compose_layers(layers: &[(&Path, &Value)]) -> Result<ConfigFile> {
    let mut merged = Value::Object(Map::new());
    for (source, layer) in layers {
        validate_layer(layer, source)?;
        deep_merge(&mut merged, (*layer).clone());
    }

    let source = layers
        .first()
        .map(|(p, _)| p.to_path_buf())
        .unwrap_or_default();
    validate_layer(&merged, &source)
}

/// Startup inputs that override the configuration files.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub outdir: Option<String>,
    pub public_path: Option<String>,
    pub backend: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl CliOverrides {
    fn to_layer(&self, mode: Mode) -> Value {
        let mut layer = serde_json::json!({ "mode": mode });

        let mut output = Map::new();
        if let Some(ref outdir) = self.outdir {
            output.insert("path".into(), Value::String(outdir.clone()));
        }
        if let Some(ref public_path) = self.public_path {
            output.insert("publicPath".into(), Value::String(public_path.clone()));
        }
        if !output.is_empty() {
            layer["output"] = Value::Object(output);
        }

        let mut dev_server = Map::new();
        if let Some(ref host) = self.host {
            dev_server.insert("host".into(), Value::String(host.clone()));
        }
        if let Some(port) = self.port {
            dev_server.insert("port".into(), Value::from(port));
        }
        if let Some(ref backend) = self.backend {
            dev_server.insert("backend".into(), Value::String(backend.clone()));
        }
        if !dev_server.is_empty() {
            layer["devServer"] = Value::Object(dev_server);
        }

        layer
    }
}

/// What to load and from where
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub root: PathBuf,
    pub config_path: Option<PathBuf>,
    pub mode: Mode,
    pub overrides: CliOverrides,
}

/// Config loader: base file, then the mode file, then startup inputs.
pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load(options: &LoadOptions) -> Result<BuildConfig> {
        let root = options
            .root
            .canonicalize()
            .map_err(|e| TailpackError::config(&options.root, format!("invalid root: {}", e)))?;

        let base_path = match options.config_path {
            Some(ref path) if path.is_absolute() => path.clone(),
            Some(ref path) => root.join(path),
            None => root.join(BASE_CONFIG_FILE),
        };

        let base = Self::read_layer(&base_path)?.ok_or_else(|| {
            TailpackError::config(&base_path, "configuration file not found")
        })?;

        let mut layers: Vec<(PathBuf, Value)> = vec![(base_path.clone(), base)];

        let mode_path = Self::mode_file_path(&base_path, options.mode);
        if let Some(mode_layer) = Self::read_layer(&mode_path)? {
            Logger::debug(&format!("Loading {} overrides from {}", options.mode, mode_path.display()));
            layers.push((mode_path, mode_layer));
        }

        layers.push((
            PathBuf::from("<command line>"),
            options.overrides.to_layer(options.mode),
        ));

        let borrowed: Vec<(&Path, &Value)> = layers
            .iter()
            .map(|(p, v)| (p.as_path(), v))
            .collect();
        let composed = compose_layers(&borrowed)?;

        composed.resolve(&root, options.mode, &base_path)
    }

    /// `tailpack.config.json` -> `tailpack.development.json`
    pub fn mode_file_path(base_path: &Path, mode: Mode) -> PathBuf {
        base_path.with_file_name(format!("tailpack.{}.json", mode))
    }

    fn read_layer(path: &Path) -> Result<Option<Value>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| TailpackError::config(path, format!("cannot read: {}", e)))?;
        let value: Value = serde_json::from_str(&content)
            .map_err(|e| TailpackError::config(path, format!("invalid JSON: {}", e)))?;

        if !value.is_object() {
            return Err(TailpackError::config(path, "top level must be an object"));
        }

        Ok(Some(value))
    }
}

fn normalize_public_path(public_path: &str) -> String {
    let mut normalized = public_path.trim().to_string();
    if !normalized.starts_with('/') && !normalized.contains("://") {
        normalized.insert(0, '/');
    }
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    normalized
}

fn absolute(root: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

impl ConfigFile {
    /// Apply defaults and validate, producing the immutable build configuration.
    pub fn resolve(self, root: &Path, fallback_mode: Mode, source: &Path) -> Result<BuildConfig> {
        let mode = self.mode.unwrap_or(fallback_mode);
        let production = mode.is_production();

        let resolve_section = self.resolve.unwrap_or_default();
        let resolve = ResolveConfig {
            extensions: resolve_section
                .extensions
                .unwrap_or_else(|| vec![".js".into(), ".jsx".into(), ".mjs".into()]),
            modules: resolve_section
                .modules
                .unwrap_or_else(|| vec!["node_modules".into()]),
        };

        let entry_map = self.entry.unwrap_or_default();
        if entry_map.is_empty() {
            return Err(TailpackError::config(source, "no entry points configured"));
        }

        let mut entries = BTreeMap::new();
        for (name, path) in entry_map {
            if name.is_empty() || name.contains('/') {
                return Err(TailpackError::config(
                    source,
                    format!("invalid entry name '{}'", name),
                ));
            }
            let candidate = absolute(root, &path);
            let resolved = find_file(&candidate, &resolve.extensions).ok_or_else(|| {
                TailpackError::config(
                    source,
                    format!("entry '{}' not found: {}", name, candidate.display()),
                )
            })?;
            entries.insert(name, resolved);
        }

        let output_section = self.output.unwrap_or_default();
        let output = OutputOptions {
            path: absolute(root, output_section.path.as_deref().unwrap_or("dist")),
            public_path: normalize_public_path(
                output_section.public_path.as_deref().unwrap_or("/static/"),
            ),
            filename: output_section
                .filename
                .unwrap_or_else(|| DEFAULT_JS_FILENAME.to_string()),
            css_filename: output_section
                .css_filename
                .unwrap_or_else(|| DEFAULT_CSS_FILENAME.to_string()),
        };

        let transform_names = self
            .style_transforms
            .unwrap_or_else(|| vec!["utilities".into(), "autoprefixer".into()]);
        let mut style_transforms = Vec::with_capacity(transform_names.len());
        for name in &transform_names {
            let kind = StyleTransformKind::from_name(name).ok_or_else(|| {
                TailpackError::config(
                    source,
                    format!(
                        "unknown style transform '{}' (expected 'utilities' or 'autoprefixer')",
                        name
                    ),
                )
            })?;
            style_transforms.push(kind);
        }

        let utilities_section = self.utilities.unwrap_or_default();
        let utilities = UtilitiesConfig {
            content: utilities_section.content.unwrap_or_default(),
            custom: utilities_section.custom.unwrap_or_default(),
            components: utilities_section.components.unwrap_or_default(),
        };

        let dev_section = self.dev_server.unwrap_or_default();
        let mut proxy = dev_section.proxy.unwrap_or_default();
        if let Some(ref backend) = dev_section.backend {
            if proxy.is_empty() {
                proxy.push(ProxyRule {
                    context: vec![format!("!{}**", output.public_path)],
                    target: backend.clone(),
                    secure: false,
                    change_origin: false,
                });
            } else {
                for rule in proxy.iter_mut().filter(|rule| rule.target.is_empty()) {
                    rule.target = backend.clone();
                }
            }
        }
        for rule in &proxy {
            if rule.target.is_empty() {
                return Err(TailpackError::config(
                    source,
                    format!(
                        "proxy rule for {:?} has no target and no backend is configured",
                        rule.context
                    ),
                ));
            }
            if reqwest::Url::parse(&rule.target).is_err() {
                return Err(TailpackError::config(
                    source,
                    format!("proxy target '{}' is not a valid URL", rule.target),
                ));
            }
            if rule.context.is_empty() {
                return Err(TailpackError::config(
                    source,
                    format!("proxy rule for '{}' has an empty context", rule.target),
                ));
            }
        }

        let dev_server = DevServerConfig {
            host: dev_section.host.unwrap_or_else(|| "127.0.0.1".to_string()),
            port: dev_section.port.unwrap_or(3000),
            proxy,
            live_reload: dev_section.live_reload.unwrap_or(true),
            overlay: dev_section.overlay.unwrap_or(true),
            cors: dev_section.cors.unwrap_or(false),
        };

        let watch_section = self.watch.unwrap_or_default();
        let watch = WatchConfig {
            debounce_ms: watch_section.debounce_ms.unwrap_or(100),
            paths: watch_section
                .paths
                .unwrap_or_default()
                .iter()
                .map(|p| absolute(root, p))
                .collect(),
        };

        Ok(BuildConfig {
            root: root.to_path_buf(),
            mode,
            entries,
            output,
            style_transforms,
            targets: self.targets.unwrap_or_else(|| vec!["defaults".to_string()]),
            utilities,
            resolve,
            minify: self.minify.unwrap_or(production),
            vendor_chunk: self.vendor_chunk.unwrap_or(true),
            write_to_disk: self.write_to_disk.unwrap_or(production),
            manifest_path: absolute(root, self.manifest.as_deref().unwrap_or("manifest.json")),
            stats_path: self.stats_file.as_deref().map(|p| absolute(root, p)),
            dev_server,
            watch,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> Value {
        json!({
            "entry": { "project": "src/project.js" },
            "output": { "path": "dist", "publicPath": "/static/bundles/" },
            "styleTransforms": ["utilities"],
            "utilities": { "custom": { "btn": "padding: 1rem" } },
            "minify": true
        })
    }

    #[test]
    fn test_scalars_replace_maps_overlay_lists_append() {
        let overlay = json!({
            "minify": false,
            "output": { "path": "build" },
            "styleTransforms": ["autoprefixer"],
            "utilities": { "custom": { "card": "margin: 0" } }
        });

        let composed = compose((Path::new("base.json"), &base()), (Path::new("dev.json"), &overlay)).unwrap();

        assert_eq!(composed.minify, Some(false));
        let output = composed.output.unwrap();
        assert_eq!(output.path.as_deref(), Some("build"));
        assert_eq!(output.public_path.as_deref(), Some("/static/bundles/"));
        assert_eq!(
            composed.style_transforms.unwrap(),
            vec!["utilities".to_string(), "autoprefixer".to_string()]
        );
        let custom = composed.utilities.unwrap().custom.unwrap();
        assert_eq!(custom.len(), 2);
        assert!(custom.contains_key("btn") && custom.contains_key("card"));
    }

    #[test]
    fn test_compose_is_deterministic() {
        let overlay = json!({ "devServer": { "port": 4000, "proxy": [{ "context": ["/api/**"], "target": "http://app:8000" }] } });
        let a = compose((Path::new("b"), &base()), (Path::new("o"), &overlay)).unwrap();
        let b = compose((Path::new("b"), &base()), (Path::new("o"), &overlay)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_unknown_override_key_is_rejected_with_path() {
        let overlay = json!({ "devServer": { "prot": 3000 }, "bogus": true });
        let err = compose((Path::new("base.json"), &base()), (Path::new("tailpack.development.json"), &overlay))
            .unwrap_err();

        match err {
            TailpackError::Config { source_file, message } => {
                assert_eq!(source_file, PathBuf::from("tailpack.development.json"));
                assert!(message.contains("devServer.prot"), "{}", message);
                assert!(message.contains("bogus"), "{}", message);
            }
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_key_inside_proxy_rule_is_rejected() {
        let overlay = json!({ "devServer": { "proxy": [{ "context": ["/"], "target": "http://x", "ws": true }] } });
        assert!(compose((Path::new("b"), &base()), (Path::new("o"), &overlay)).is_err());
    }

    #[test]
    fn test_null_override_clears_value() {
        let mut merged = base();
        deep_merge(&mut merged, json!({ "minify": null }));
        assert_eq!(merged["minify"], Value::Null);
    }

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/project.js"), "console.log(1);").unwrap();
        std::fs::write(
            dir.path().join(BASE_CONFIG_FILE),
            serde_json::to_string(&base()).unwrap(),
        )
        .unwrap();
        dir
    }

    #[test]
    fn test_load_applies_mode_file_and_cli_layers() {
        let dir = project();
        std::fs::write(
            dir.path().join("tailpack.development.json"),
            r#"{ "devServer": { "port": 4000, "backend": "http://app:8000" } }"#,
        )
        .unwrap();

        let config = ConfigLoader::load(&LoadOptions {
            root: dir.path().to_path_buf(),
            config_path: None,
            mode: Mode::Development,
            overrides: CliOverrides {
                port: Some(5000),
                ..Default::default()
            },
        })
        .unwrap();

        assert_eq!(config.mode, Mode::Development);
        assert_eq!(config.dev_server.port, 5000);
        assert_eq!(config.output.public_path, "/static/bundles/");
        assert_eq!(config.dev_server.proxy.len(), 1);
        assert_eq!(config.dev_server.proxy[0].context, vec!["!/static/bundles/**".to_string()]);
        assert!(!config.dev_server.proxy[0].secure);
        assert!(config.entries["project"].ends_with("src/project.js"));
        // explicit base value wins over the mode default
        assert!(config.minify);
        assert!(!config.write_to_disk);
    }

    #[test]
    fn test_entry_without_extension_gets_one_appended() {
        let dir = project();
        std::fs::write(
            dir.path().join(BASE_CONFIG_FILE),
            r#"{ "entry": { "project": "src/project" } }"#,
        )
        .unwrap();

        let config = ConfigLoader::load(&LoadOptions {
            root: dir.path().to_path_buf(),
            config_path: None,
            mode: Mode::Production,
            overrides: CliOverrides::default(),
        })
        .unwrap();

        assert!(config.entries["project"].ends_with("project.js"));
        assert!(config.minify);
        assert!(config.write_to_disk);
        assert_eq!(
            config.style_transforms,
            vec![StyleTransformKind::Utilities, StyleTransformKind::Autoprefixer]
        );
    }

    #[test]
    fn test_missing_entry_file_is_config_error() {
        let dir = project();
        std::fs::write(
            dir.path().join(BASE_CONFIG_FILE),
            r#"{ "entry": { "main": "src/missing.js" } }"#,
        )
        .unwrap();

        let err = ConfigLoader::load(&LoadOptions {
            root: dir.path().to_path_buf(),
            config_path: None,
            mode: Mode::Production,
            overrides: CliOverrides::default(),
        })
        .unwrap_err();

        assert!(matches!(err, TailpackError::Config { .. }));
        assert!(err.to_string().contains("missing.js"));
    }

    #[test]
    fn test_unknown_transform_name_is_rejected() {
        let dir = project();
        let file = ConfigFile {
            entry: Some([("project".to_string(), "src/project.js".to_string())].into()),
            style_transforms: Some(vec!["postcss-nesting".into()]),
            ..Default::default()
        };
        let err = file
            .resolve(dir.path(), Mode::Production, Path::new("cfg.json"))
            .unwrap_err();
        assert!(err.to_string().contains("postcss-nesting"));
    }

    #[test]
    fn test_public_path_is_normalized() {
        assert_eq!(normalize_public_path("static/x"), "/static/x/");
        assert_eq!(normalize_public_path("/static/"), "/static/");
        assert_eq!(normalize_public_path("https://cdn.example.com/a"), "https://cdn.example.com/a/");
    }

    #[test]
    fn test_backend_only_fills_rules_without_target() {
        let dir = project();
        std::fs::write(
            dir.path().join(BASE_CONFIG_FILE),
            r#"{
                "entry": { "project": "src/project.js" },
                "devServer": { "proxy": [
                    { "context": ["/api/**"], "target": "http://api:9000" },
                    { "context": ["!/static/**"] }
                ] }
            }"#,
        )
        .unwrap();

        let load = |backend: Option<&str>| {
            ConfigLoader::load(&LoadOptions {
                root: dir.path().to_path_buf(),
                config_path: None,
                mode: Mode::Development,
                overrides: CliOverrides {
                    backend: backend.map(str::to_string),
                    ..Default::default()
                },
            })
        };

        let config = load(Some("http://app:8000")).unwrap();
        let targets: Vec<&str> = config
            .dev_server
            .proxy
            .iter()
            .map(|rule| rule.target.as_str())
            .collect();
        assert_eq!(targets, vec!["http://api:9000", "http://app:8000"]);

        let err = load(None).unwrap_err();
        assert!(matches!(err, TailpackError::Config { .. }));
        assert!(err.to_string().contains("no target"));
    }
}
