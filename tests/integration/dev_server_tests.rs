use futures::StreamExt;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tailpack::core::models::{BuildConfig, Mode};
use tailpack::core::services::TailpackBuildService;
use tailpack::infrastructure::{
    generate_client_code, DevServer, HmrBroadcaster, LightningCssProcessor, OutputCache,
    OxcJsProcessor, TokioFileSystemService,
};
use tailpack::utils::config_loader::{CliOverrides, ConfigLoader, LoadOptions};
use tailpack::utils::watch::DevLoop;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;

fn write(root: &Path, path: &str, content: &str) {
    let full = root.join(path);
    fs::create_dir_all(full.parent().unwrap()).unwrap();
    fs::write(full, content).unwrap();
}

/// Backend that answers every request and counts them.
async fn spawn_backend(hits: Arc<AtomicUsize>) -> String {
    let app = axum::Router::new().fallback(move |uri: axum::http::Uri| {
        let hits = Arc::clone(&hits);
        async move {
            hits.fetch_add(1, Ordering::SeqCst);
            format!("backend page {}", uri.path())
        }
    });
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

struct DevHarness {
    _dir: TempDir,
    config: Arc<BuildConfig>,
    cache: Arc<OutputCache>,
    dev_loop: DevLoop<TailpackBuildService>,
    base_url: String,
}

impl DevHarness {
    async fn start(backend: String) -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(
            root,
            "tailpack.config.json",
            r#"{
                "entry": { "main": "./src/main.js" },
                "output": { "publicPath": "/static/bundles/" },
                "targets": ["safari 12"]
            }"#,
        );
        write(root, "src/main.js", "import '../css/main.css';\nconsole.log('app');\n");
        write(root, "css/main.css", ".btn { @apply px-4 select-none; }\n");

        let config = Arc::new(
            ConfigLoader::load(&LoadOptions {
                root: root.to_path_buf(),
                config_path: None,
                mode: Mode::Development,
                overrides: CliOverrides {
                    backend: Some(backend),
                    ..Default::default()
                },
            })
            .unwrap(),
        );

        let service = TailpackBuildService::new(
            Arc::clone(&config),
            Arc::new(TokioFileSystemService),
            Arc::new(OxcJsProcessor::new()),
            Arc::new(LightningCssProcessor::from_config(&config).unwrap()),
        )
        .with_client_script(generate_client_code(config.dev_server.overlay));

        let cache = Arc::new(OutputCache::new());
        let hmr = HmrBroadcaster::new();
        let mut dev_loop = DevLoop::new(
            service,
            Arc::clone(&config),
            Arc::clone(&cache),
            hmr.clone(),
            Arc::new(TokioFileSystemService),
        );
        dev_loop.initial_build().await.unwrap();

        let server = DevServer::new(&config, Arc::clone(&cache), hmr).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(server.serve(listener, std::future::pending::<()>()));

        Self {
            _dir: dir,
            config,
            cache,
            dev_loop,
            base_url: format!("http://{}", addr),
        }
    }

    fn url_of(&self, logical_name: &str) -> String {
        self.cache
            .load()
            .manifest
            .url_for(logical_name, &self.config.output.public_path)
            .unwrap()
    }

    fn css_path(&self) -> PathBuf {
        self.config.root.join("css/main.css")
    }

    fn manifest_on_disk(&self) -> serde_json::Value {
        serde_json::from_str(&fs::read_to_string(&self.config.manifest_path).unwrap()).unwrap()
    }

    /// Send a request line verbatim, bypassing client-side URL normalization.
    async fn raw_get(&self, target: &str) -> String {
        let addr = self.base_url.trim_start_matches("http://");
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n", target, addr);
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }
}

async fn next_json<S>(ws: &mut S) -> serde_json::Value
where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a live reload message")
            .unwrap()
            .unwrap();
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn test_assets_are_served_from_memory_and_pages_are_proxied() {
    let hits = Arc::new(AtomicUsize::new(0));
    let backend = spawn_backend(Arc::clone(&hits)).await;
    let harness = DevHarness::start(backend).await;

    // Assets stay in memory, the manifest is on disk for the backend
    assert!(!harness.config.output.path.exists());
    let manifest = harness.manifest_on_disk();
    assert_eq!(
        manifest["main.css"].as_str(),
        harness.cache.load().manifest.get("main.css")
    );

    let css = reqwest::get(format!("{}{}", harness.base_url, harness.url_of("main.css")))
        .await
        .unwrap();
    assert_eq!(css.status(), 200);
    assert!(css.text().await.unwrap().contains("-webkit-user-select"));

    let js = reqwest::get(format!("{}{}", harness.base_url, harness.url_of("main.js")))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(js.contains("/__tailpack/ws"), "client script is prepended");

    let missing = reqwest::get(format!("{}/static/bundles/css/nope.css", harness.base_url))
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
    assert_eq!(hits.load(Ordering::SeqCst), 0, "asset requests never reach the backend");

    let page = reqwest::get(format!("{}/accounts/login/", harness.base_url))
        .await
        .unwrap();
    assert_eq!(page.status(), 200);
    assert_eq!(page.text().await.unwrap(), "backend page /accounts/login/");
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stylesheet_edit_pushes_css_update_and_failure_keeps_snapshot() {
    let backend = spawn_backend(Arc::new(AtomicUsize::new(0))).await;
    let mut harness = DevHarness::start(backend).await;

    let ws_url = format!("{}/__tailpack/ws", harness.base_url.replacen("http", "ws", 1));
    let (mut ws, _) = tokio_tungstenite::connect_async(ws_url).await.unwrap();

    let hello = next_json(&mut ws).await;
    assert_eq!(hello["type"], "connected");
    assert_eq!(hello["generation"], 1);

    let old_css = harness.url_of("main.css");
    let old_js = harness.url_of("main.js");

    write(&harness.config.root, "css/main.css", ".btn { @apply px-6 select-none; }\n");
    let changed: HashSet<PathBuf> = [harness.css_path()].into_iter().collect();
    harness.dev_loop.recompile(changed.clone()).await.unwrap();

    let update = next_json(&mut ws).await;
    assert_eq!(update["type"], "css-update");
    assert_eq!(update["updates"][0]["name"], "main.css");
    assert_eq!(update["updates"][0]["previousUrl"], old_css.as_str());
    let new_css = harness.url_of("main.css");
    assert_eq!(update["updates"][0]["url"], new_css.as_str());
    assert_eq!(
        format!("/static/bundles/{}", harness.manifest_on_disk()["main.css"].as_str().unwrap()),
        new_css
    );
    assert_ne!(old_css, new_css);
    assert_eq!(harness.url_of("main.js"), old_js, "script untouched by a stylesheet edit");

    let ok = next_json(&mut ws).await;
    assert_eq!(ok["type"], "ok");
    assert_eq!(ok["generation"], 2);

    // A broken edit: error pushed, previous snapshot still served
    write(&harness.config.root, "css/main.css", ".btn { @apply no-such-thing; }\n");
    assert!(harness.dev_loop.recompile(changed).await.is_err());

    let error = next_json(&mut ws).await;
    assert_eq!(error["type"], "error");
    assert!(error["file"].as_str().unwrap().ends_with("main.css"));
    assert!(error["message"].as_str().unwrap().contains("no-such-thing"));

    assert_eq!(harness.cache.generation(), 2);
    let still = reqwest::get(format!("{}{}", harness.base_url, new_css)).await.unwrap();
    assert_eq!(still.status(), 200);
}

#[tokio::test]
async fn test_odd_request_paths_never_leave_the_configured_backend() {
    let hits = Arc::new(AtomicUsize::new(0));
    let backend = spawn_backend(Arc::clone(&hits)).await;

    let stray_hits = Arc::new(AtomicUsize::new(0));
    let stray = spawn_backend(Arc::clone(&stray_hits)).await;
    let stray_authority = stray.trim_start_matches("http://").to_string();

    let harness = DevHarness::start(backend).await;

    // Scheme-relative path: forwarded as a path, to the configured backend
    let response = harness.raw_get(&format!("//{}/x", stray_authority)).await;
    assert!(response.starts_with("HTTP/1.1 200"), "{}", response);
    assert!(response.contains(&format!("backend page //{}/x", stray_authority)));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(stray_hits.load(Ordering::SeqCst), 0);

    // Dot segments under the asset prefix are looked up in memory only
    let response = harness.raw_get("/static/bundles/../../tailpack.config.json").await;
    assert!(response.starts_with("HTTP/1.1 404"), "{}", response);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}
