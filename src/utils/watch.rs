//! Development loop: file watching, debouncing and the single-writer
//! recompile coordinator.
//!
//! ```text
//! notify → std mpsc → bridge thread → tokio mpsc → Debouncer → DevLoop::recompile
//!                                                                 │
//!                                          OutputCache::publish ◄─┴─► HmrBroadcaster
//! ```
//!
//! Recompiles are never cancelled. Changes that land while one runs queue up
//! in the channel and are folded into a single follow-up recompile.

use crate::core::interfaces::{BuildService, FileSystemService};
use crate::core::models::{BuildConfig, BuildOutput};
use crate::core::services::{emit, emit_error};
use crate::infrastructure::hmr::{HmrBroadcaster, HmrMessage};
use crate::infrastructure::output_cache::{BuildSnapshot, OutputCache};
use crate::utils::{Logger, Result, TailpackError};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Idle wait when nothing is pending
const IDLE_SLEEP: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevState {
    Idle,
    Recompiling,
}

/// Collects changed paths until the tree has been quiet for `delay`.
#[derive(Debug)]
pub struct Debouncer {
    changes: HashSet<PathBuf>,
    last_event: Option<Instant>,
    delay: Duration,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            changes: HashSet::new(),
            last_event: None,
            delay,
        }
    }

    pub fn add(&mut self, paths: impl IntoIterator<Item = PathBuf>) {
        self.changes.extend(paths);
        self.last_event = Some(Instant::now());
    }

    pub fn is_pending(&self) -> bool {
        !self.changes.is_empty()
    }

    pub fn sleep_duration(&self) -> Duration {
        match self.last_event {
            Some(at) if self.is_pending() => self.delay.saturating_sub(at.elapsed()),
            _ => IDLE_SLEEP,
        }
    }

    pub fn take_if_ready(&mut self) -> Option<HashSet<PathBuf>> {
        let ready = self
            .last_event
            .map(|at| at.elapsed() >= self.delay)
            .unwrap_or(false);
        if ready && self.is_pending() {
            self.take()
        } else {
            None
        }
    }

    /// Drain regardless of timing.
    pub fn take(&mut self) -> Option<HashSet<PathBuf>> {
        self.last_event = None;
        if self.changes.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.changes))
        }
    }
}

/// Paths that must never trigger a recompile: our own output and editor noise.
#[derive(Debug, Clone)]
pub struct IgnoreRules {
    output_dir: PathBuf,
    generated: Vec<PathBuf>,
}

impl IgnoreRules {
    pub fn from_config(config: &BuildConfig) -> Self {
        let mut generated = vec![config.manifest_path.clone()];
        generated.extend(config.stats_path.clone());
        Self {
            output_dir: config.output.path.clone(),
            generated,
        }
    }

    pub fn is_ignored(&self, path: &Path) -> bool {
        if path.starts_with(&self.output_dir) || self.generated.iter().any(|g| g == path) {
            return true;
        }
        if path
            .components()
            .any(|c| matches!(c.as_os_str().to_str(), Some(".git" | "node_modules")))
        {
            return true;
        }
        is_temp_file(path)
    }
}

/// Editor and atomic-write artifacts
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bak" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}

fn is_relevant(event: &Event) -> bool {
    !matches!(event.kind, EventKind::Access(_) | EventKind::Other)
}

/// Keeps the notify watcher alive; dropping it stops the event stream.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
}

impl FileWatcher {
    /// Start watching the project root and `watch.paths`. Events buffer in
    /// the returned channel until the loop starts reading them.
    pub fn start(config: &BuildConfig) -> Result<(Self, mpsc::Receiver<Vec<PathBuf>>)> {
        let (notify_tx, notify_rx) = std::sync::mpsc::channel();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = notify_tx.send(res);
        })
        .map_err(|e| TailpackError::build(format!("Failed to create watcher: {}", e)))?;

        let mut roots = vec![config.root.clone()];
        roots.extend(config.watch.paths.iter().cloned());
        for path in &roots {
            if path.exists() {
                watcher
                    .watch(path, RecursiveMode::Recursive)
                    .map_err(|e| {
                        TailpackError::build(format!("Failed to watch {}: {}", path.display(), e))
                    })?;
            }
        }

        let ignore = IgnoreRules::from_config(config);
        let (async_tx, async_rx) = mpsc::channel::<Vec<PathBuf>>(256);

        // notify is sync; bridge it onto the runtime
        std::thread::spawn(move || {
            while let Ok(result) = notify_rx.recv() {
                let event: Event = match result {
                    Ok(event) => event,
                    Err(e) => {
                        Logger::warn(&format!("watch error: {}", e));
                        continue;
                    }
                };
                if !is_relevant(&event) {
                    continue;
                }

                let paths: Vec<PathBuf> = event
                    .paths
                    .into_iter()
                    .map(|p| p.canonicalize().unwrap_or(p))
                    .filter(|p| !ignore.is_ignored(p))
                    .collect();
                if paths.is_empty() {
                    continue;
                }
                if async_tx.blocking_send(paths).is_err() {
                    break;
                }
            }
        });

        Logger::info(&format!(
            "👀 Watching {}",
            roots
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ));

        Ok((Self { _watcher: watcher }, async_rx))
    }
}

/// Sole writer of the output cache during development.
pub struct DevLoop<B: BuildService> {
    service: B,
    config: Arc<BuildConfig>,
    cache: Arc<OutputCache>,
    hmr: HmrBroadcaster,
    fs_service: Arc<dyn FileSystemService>,
    state: Arc<Mutex<DevState>>,
}

impl<B: BuildService> DevLoop<B> {
    pub fn new(
        service: B,
        config: Arc<BuildConfig>,
        cache: Arc<OutputCache>,
        hmr: HmrBroadcaster,
        fs_service: Arc<dyn FileSystemService>,
    ) -> Self {
        Self {
            service,
            config,
            cache,
            hmr,
            fs_service,
            state: Arc::new(Mutex::new(DevState::Idle)),
        }
    }

    pub fn state(&self) -> DevState {
        *self.state.lock()
    }

    /// Full build before serving. A failure is reported like any other and
    /// the next change retries.
    pub async fn initial_build(&mut self) -> Result<()> {
        *self.state.lock() = DevState::Recompiling;
        let outcome = match self.service.build().await {
            Ok(output) => self.commit(output).await,
            Err(err) => Err(err),
        };
        self.finish(outcome).await
    }

    /// Consume change batches until the channel closes.
    pub async fn run(&mut self, mut events: mpsc::Receiver<Vec<PathBuf>>) {
        let mut debouncer = Debouncer::new(Duration::from_millis(self.config.watch.debounce_ms));

        loop {
            tokio::select! {
                biased;
                received = events.recv() => match received {
                    Some(paths) => debouncer.add(paths),
                    None => {
                        if let Some(changed) = debouncer.take() {
                            let _ = self.recompile(changed).await;
                        }
                        break;
                    }
                },
                _ = tokio::time::sleep(debouncer.sleep_duration()) => {
                    if let Some(changed) = debouncer.take_if_ready() {
                        let _ = self.recompile(changed).await;
                    }
                }
            }
        }
    }

    pub async fn recompile(&mut self, changed: HashSet<PathBuf>) -> Result<()> {
        *self.state.lock() = DevState::Recompiling;
        Logger::rebuild_start(changed.len());
        for path in &changed {
            Logger::debug(&format!("  • {}", path.display()));
        }

        let outcome = match self.service.rebuild(&changed).await {
            Ok(output) => self.commit(output).await,
            Err(err) => Err(err),
        };
        self.finish(outcome).await
    }

    /// Make a successful build visible: manifest on disk (and the assets too
    /// when `write_to_disk` is set), then memory, then connected browsers.
    async fn commit(&self, output: BuildOutput) -> Result<()> {
        emit(&output, &self.config, self.fs_service.as_ref()).await?;

        let public_path = &self.config.output.public_path;
        let generation = self.cache.generation() + 1;
        let snapshot = BuildSnapshot::from_output(&output, public_path, generation);
        let previous = self.cache.publish(snapshot);
        Logger::rebuild_complete(generation, output.build_time);

        // Nothing was loaded from an empty snapshot, so only `ok` goes out
        if self.config.dev_server.live_reload && !previous.is_empty() {
            if let Some(update) = HmrMessage::for_update(&previous.manifest, &output.manifest, public_path) {
                self.hmr.send(update);
            }
        }
        if self.config.dev_server.live_reload {
            self.hmr.send(HmrMessage::Ok { generation });
        }
        Ok(())
    }

    async fn finish(&self, outcome: Result<()>) -> Result<()> {
        if let Err(ref err) = outcome {
            // Previous snapshot stays published
            Logger::error(&err.format_detailed());
            self.hmr.send(HmrMessage::from_error(err));
            if let Err(stats_err) = emit_error(err, &self.config, self.fs_service.as_ref()).await {
                Logger::warn(&format!("could not write stats file: {}", stats_err));
            }
        }
        *self.state.lock() = DevState::Idle;
        outcome
    }
}
