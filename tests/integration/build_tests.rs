use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tailpack::core::interfaces::BuildService;
use tailpack::core::models::{BuildConfig, Mode};
use tailpack::core::services::{emit, TailpackBuildService};
use tailpack::infrastructure::{LightningCssProcessor, OxcJsProcessor, TokioFileSystemService};
use tailpack::utils::config_loader::{CliOverrides, ConfigLoader, LoadOptions};
use tailpack::utils::TailpackError;
use tempfile::TempDir;

const BASE_CONFIG: &str = r#"{
    "entry": { "project": "./src/project.js" },
    "output": { "path": "project/static/bundles", "publicPath": "/static/bundles/" },
    "targets": ["safari 12"],
    "utilities": { "content": ["templates/**/*.html"] }
}"#;

fn write(root: &Path, path: &str, content: &str) {
    let full = root.join(path);
    fs::create_dir_all(full.parent().unwrap()).unwrap();
    fs::write(full, content).unwrap();
}

fn fixture() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "tailpack.config.json", BASE_CONFIG);
    write(
        root,
        "src/project.js",
        "import '../css/project.css';\nimport { mount } from './components/mount';\nimport Alpine from 'alpinejs';\nmount(Alpine);\n",
    );
    write(
        root,
        "src/components/mount.js",
        "export function mount(alpine) { window.Alpine = alpine; alpine.start(); }\n",
    );
    write(
        root,
        "css/project.css",
        "@tailwind base;\n@tailwind components;\n@tailwind utilities;\n.card { @apply p-4 rounded select-none; }\n",
    );
    write(
        root,
        "templates/index.html",
        r#"<div class="flex items-center md:p-8 hover:bg-blue-500">hi</div>"#,
    );
    write(
        root,
        "node_modules/alpinejs/package.json",
        r#"{ "name": "alpinejs", "module": "dist/module.esm.js", "main": "dist/module.cjs.js" }"#,
    );
    write(
        root,
        "node_modules/alpinejs/dist/module.esm.js",
        "var Alpine = { start() { return true; } };\nexport default Alpine;\n",
    );
    dir
}

fn load(dir: &TempDir, mode: Mode, overrides: CliOverrides) -> Result<BuildConfig, TailpackError> {
    ConfigLoader::load(&LoadOptions {
        root: dir.path().to_path_buf(),
        config_path: None,
        mode,
        overrides,
    })
}

fn service(config: &Arc<BuildConfig>) -> TailpackBuildService {
    TailpackBuildService::new(
        Arc::clone(config),
        Arc::new(TokioFileSystemService),
        Arc::new(OxcJsProcessor::new()),
        Arc::new(LightningCssProcessor::from_config(config).unwrap()),
    )
}

fn read_manifest(config: &BuildConfig) -> serde_json::Map<String, serde_json::Value> {
    let text = fs::read_to_string(&config.manifest_path).unwrap();
    serde_json::from_str::<serde_json::Value>(&text)
        .unwrap()
        .as_object()
        .unwrap()
        .clone()
}

#[tokio::test]
async fn test_production_build_writes_assets_and_manifest() {
    let dir = fixture();
    let config = Arc::new(load(&dir, Mode::Production, CliOverrides::default()).unwrap());
    let output = service(&config).build().await.unwrap();
    emit(&output, &config, &TokioFileSystemService).await.unwrap();

    let manifest = read_manifest(&config);
    let names: Vec<&String> = manifest.keys().collect();
    assert_eq!(names, vec!["project.css", "project.js", "vendors.js"]);

    let filenames: HashSet<&str> = manifest.values().map(|v| v.as_str().unwrap()).collect();
    assert_eq!(filenames.len(), manifest.len(), "emitted filenames are unique");

    for filename in &filenames {
        assert!(config.output.path.join(filename).is_file(), "{} missing", filename);
    }

    let css = fs::read_to_string(
        config
            .output
            .path
            .join(manifest["project.css"].as_str().unwrap()),
    )
    .unwrap();
    assert!(!css.contains("@tailwind"));
    assert!(!css.contains("@apply"));
    assert!(css.contains("-webkit-user-select"));
    assert!(css.contains(".flex{display:flex}"));
    assert!(css.contains("md\\:p-8"));
    assert!(css.contains("hover\\:bg-blue-500:hover"));
    // Media queries come after the unconditional utilities
    assert!(css.find(".flex").unwrap() < css.find("@media").unwrap());
}

#[tokio::test]
async fn test_css_hash_changes_only_with_content() {
    let dir = fixture();
    let config = Arc::new(load(&dir, Mode::Production, CliOverrides::default()).unwrap());
    let mut service = service(&config);

    let first = service.build().await.unwrap();
    let second = service.build().await.unwrap();
    assert_eq!(first.manifest, second.manifest, "same inputs, same filenames");

    // A new utility class in a template only affects the stylesheet
    let template = config.root.join("templates/index.html");
    fs::write(&template, r#"<div class="flex items-center md:p-8 hover:bg-blue-500 mt-2">hi</div>"#)
        .unwrap();
    let changed: HashSet<PathBuf> = [template].into_iter().collect();
    let third = service.rebuild(&changed).await.unwrap();

    assert_ne!(first.manifest.get("project.css"), third.manifest.get("project.css"));
    assert_eq!(first.manifest.get("project.js"), third.manifest.get("project.js"));
    assert_eq!(first.manifest.get("vendors.js"), third.manifest.get("vendors.js"));
}

#[tokio::test]
async fn test_failed_build_leaves_previous_manifest_in_place() {
    let dir = fixture();
    let config = Arc::new(load(&dir, Mode::Production, CliOverrides::default()).unwrap());

    let output = service(&config).build().await.unwrap();
    emit(&output, &config, &TokioFileSystemService).await.unwrap();
    let before = fs::read_to_string(&config.manifest_path).unwrap();

    write(dir.path(), "css/project.css", ".card { @apply not-a-utility; }\n");
    let err = service(&config).build().await.unwrap_err();
    match err {
        TailpackError::Transform { stage, asset, .. } => {
            assert_eq!(stage, "utilities");
            assert!(asset.ends_with("css/project.css"));
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(fs::read_to_string(&config.manifest_path).unwrap(), before);
}

#[tokio::test]
async fn test_mode_files_and_startup_inputs_compose() {
    let dir = fixture();
    write(
        dir.path(),
        "tailpack.development.json",
        r#"{ "targets": ["chrome 120"], "devServer": { "port": 4000 } }"#,
    );
    write(dir.path(), "tailpack.production.json", r#"{ "minify": false }"#);

    let dev = load(
        &dir,
        Mode::Development,
        CliOverrides {
            backend: Some("http://app:8000".into()),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(dev.mode, Mode::Development);
    // Lists append across layers
    assert_eq!(dev.targets, vec!["safari 12", "chrome 120"]);
    assert_eq!(dev.dev_server.port, 4000);
    assert_eq!(dev.dev_server.proxy.len(), 1);
    assert_eq!(dev.dev_server.proxy[0].context, vec!["!/static/bundles/**"]);
    assert_eq!(dev.dev_server.proxy[0].target, "http://app:8000");
    assert!(!dev.write_to_disk);

    let prod = load(
        &dir,
        Mode::Production,
        CliOverrides {
            outdir: Some("out".into()),
            public_path: Some("https://cdn.example.com/assets".into()),
            ..Default::default()
        },
    )
    .unwrap();
    assert!(!prod.minify);
    assert_eq!(prod.targets, vec!["safari 12"]);
    assert!(prod.output.path.ends_with("out"));
    assert_eq!(prod.output.public_path, "https://cdn.example.com/assets/");
}

#[tokio::test]
async fn test_unknown_override_key_aborts_before_building() {
    let dir = fixture();
    write(dir.path(), "tailpack.production.json", r#"{ "output": { "pubicPath": "/x/" } }"#);

    let err = load(&dir, Mode::Production, CliOverrides::default()).unwrap_err();
    match err {
        TailpackError::Config { source_file, message } => {
            assert!(source_file.ends_with("tailpack.production.json"));
            assert!(message.contains("output.pubicPath"));
        }
        other => panic!("unexpected error: {other}"),
    }
}
