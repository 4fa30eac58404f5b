use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

pub struct Logger;

impl Logger {
    /// Install the global subscriber. `RUST_LOG` wins over the default filter.
    pub fn init() {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("tailpack=info"));

        // A second init (tests, embedding) is not an error worth surfacing.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init();
    }

    pub fn build_start(mode: &str, root: &str, outdir: &str) {
        info!("🔨 tailpack {} build", mode);
        info!("📁 Root: {}", root);
        info!("📦 Output: {}", outdir);
    }

    pub fn resolving_entry(name: &str, path: &str) {
        debug!("🔍 Resolving entry {} -> {}", name, path);
    }

    pub fn found_modules(entry: &str, scripts: usize, styles: usize) {
        debug!("📦 {}: {} script modules, {} stylesheets", entry, scripts, styles);
    }

    pub fn processing_script(name: &str) {
        debug!("⚡ Processing script: {}", name);
    }

    pub fn processing_css(name: &str, stage: &str) {
        debug!("🎨 {} <- {}", name, stage);
    }

    pub fn manifest_written(path: &str, entries: usize) {
        info!("🗺️  Manifest {} ({} assets)", path, entries);
    }

    pub fn rebuild_start(changed: usize) {
        info!("🔄 Recompiling ({} files changed)", changed);
    }

    pub fn rebuild_complete(generation: u64, elapsed: std::time::Duration) {
        info!("✅ Build #{} ready in {:.0?}", generation, elapsed);
    }

    pub fn proxying(method: &str, path: &str, target: &str) {
        debug!("↪️  {} {} -> {}", method, path, target);
    }

    pub fn info(msg: &str) {
        info!("{}", msg);
    }

    pub fn debug(msg: &str) {
        debug!("{}", msg);
    }

    pub fn error(msg: &str) {
        error!("❌ {}", msg);
    }

    pub fn warn(msg: &str) {
        warn!("⚠️  {}", msg);
    }
}

pub struct Timer {
    start: Instant,
    name: String,
}

impl Timer {
    pub fn start(name: &str) -> Self {
        debug!("⏱️  Starting: {}", name);
        Self {
            start: Instant::now(),
            name: name.to_string(),
        }
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        debug!("⏱️  Completed: {} in {:.2?}", self.name, self.elapsed());
    }
}
