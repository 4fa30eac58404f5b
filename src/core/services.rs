use crate::core::graph::ModuleGraph;
use crate::core::manifest::{Manifest, StatsFile};
use crate::core::{interfaces::*, models::*};
use crate::infrastructure::processors::assemble_chunk;
use crate::infrastructure::ModuleResolver;
use crate::utils::hash::{combined_hash, content_hash, render_filename};
use crate::utils::{Logger, Result, TailpackError, Timer};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

pub const VENDOR_CHUNK: &str = "vendors";

/// What one entry compiled to, before hashing
#[derive(Debug, Clone, Default)]
struct EntryArtifacts {
    modules: Vec<PathBuf>,
    script: Option<String>,
    style: Option<String>,
    /// Transformed `node_modules` scripts, in dependency order
    vendor_modules: Vec<(String, String)>,
}

/// Last good compilation, reused by incremental rebuilds
#[derive(Debug, Clone, Default)]
struct CompiledState {
    artifacts: BTreeMap<String, EntryArtifacts>,
}

/// Main build service implementation
pub struct TailpackBuildService {
    config: Arc<BuildConfig>,
    fs_service: Arc<dyn FileSystemService>,
    js_processor: Arc<dyn JsProcessor>,
    css_processor: Arc<dyn CssProcessor>,
    resolver: Arc<ModuleResolver>,
    client_script: Option<String>,
    previous: Option<CompiledState>,
}

impl TailpackBuildService {
    pub fn new(
        config: Arc<BuildConfig>,
        fs_service: Arc<dyn FileSystemService>,
        js_processor: Arc<dyn JsProcessor>,
        css_processor: Arc<dyn CssProcessor>,
    ) -> Self {
        let resolver = Arc::new(ModuleResolver::new(
            config.resolve.extensions.clone(),
            config.resolve.modules.clone(),
        ));

        Self {
            config,
            fs_service,
            js_processor,
            css_processor,
            resolver,
            client_script: None,
            previous: None,
        }
    }

    /// Prepend the live-reload client to every script entry.
    pub fn with_client_script(mut self, script: String) -> Self {
        self.client_script = Some(script);
        self
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    async fn load_module(&self, path: &Path) -> Result<ModuleInfo> {
        let content = self.fs_service.read_file(path).await?;
        let mut module = ModuleInfo::new(path.to_path_buf(), &self.config.root, content);

        let specifiers = match module.module_type {
            ModuleType::JavaScript => {
                let js = self.js_processor.clone();
                let path = module.path.clone();
                let content = module.content.clone();
                tokio::task::spawn_blocking(move || js.extract_dependencies(&path, &content))
                    .await
                    .map_err(|e| {
                        TailpackError::build(format!("Dependency extraction failed: {}", e))
                    })??
            }
            ModuleType::Css | ModuleType::Scss => self
                .css_processor
                .extract_dependencies(&module.path, &module.content),
            ModuleType::Unknown => {
                return Err(TailpackError::build_in(
                    path,
                    format!("unsupported module type: {}", path.display()),
                ))
            }
        };

        for specifier in specifiers {
            let resolved = self.resolve_import(&module, &specifier).ok_or_else(|| {
                TailpackError::build_in(
                    &module.path,
                    format!(
                        "cannot resolve '{}' imported from {}",
                        specifier,
                        module.path.display()
                    ),
                )
            })?;
            Logger::debug(&format!("Resolved '{}' to: {}", specifier, resolved.display()));

            if ModuleType::from_path(&resolved) == ModuleType::JavaScript {
                module
                    .import_ids
                    .insert(specifier, module_id(&self.config.root, &resolved));
            }
            if !module.dependencies.contains(&resolved) {
                module.dependencies.push(resolved);
            }
        }

        Ok(module)
    }

    fn resolve_import(&self, module: &ModuleInfo, specifier: &str) -> Option<PathBuf> {
        let root = &self.config.root;

        // `@import "x.css"` is relative in CSS
        if module.module_type.is_stylesheet()
            && ModuleResolver::is_bare(specifier)
            && !specifier.starts_with('~')
        {
            if let Some(found) = self.resolver.resolve(&format!("./{}", specifier), &module.path, root) {
                return Some(found);
            }
        }

        self.resolver.resolve(specifier, &module.path, root)
    }

    /// Modules reachable from `entry`, dependencies before dependents.
    async fn collect_modules(&self, entry: &Path) -> Result<Vec<ModuleInfo>> {
        let mut modules: HashMap<PathBuf, ModuleInfo> = HashMap::new();
        let mut visited: HashSet<PathBuf> = HashSet::new();
        let mut order: Vec<PathBuf> = Vec::new();

        modules.insert(entry.to_path_buf(), self.load_module(entry).await?);
        visited.insert(entry.to_path_buf());
        let mut stack: Vec<(PathBuf, usize)> = vec![(entry.to_path_buf(), 0)];

        while let Some((path, idx)) = stack.last().cloned() {
            let next = modules
                .get(&path)
                .and_then(|m| m.dependencies.get(idx))
                .cloned();

            match next {
                Some(dep) => {
                    if let Some(top) = stack.last_mut() {
                        top.1 += 1;
                    }
                    if visited.insert(dep.clone()) {
                        let module = self.load_module(&dep).await?;
                        modules.insert(dep.clone(), module);
                        stack.push((dep, 0));
                    }
                }
                None => {
                    stack.pop();
                    order.push(path);
                }
            }
        }

        Ok(order
            .into_iter()
            .filter_map(|path| modules.remove(&path))
            .collect())
    }

    async fn compile(&self, names: &BTreeSet<String>) -> Result<BTreeMap<String, EntryArtifacts>> {
        let mut jobs = Vec::with_capacity(names.len());
        for name in names {
            let Some(entry_path) = self.config.entries.get(name) else {
                continue;
            };
            Logger::resolving_entry(name, &entry_path.display().to_string());
            let modules = self.collect_modules(entry_path).await?;
            Logger::found_modules(
                name,
                modules.iter().filter(|m| m.module_type == ModuleType::JavaScript).count(),
                modules.iter().filter(|m| m.module_type.is_stylesheet()).count(),
            );
            jobs.push((name.clone(), entry_path.clone(), modules));
        }

        let js = self.js_processor.clone();
        let css = self.css_processor.clone();
        let client_script = self.client_script.clone();
        let vendor_chunk = self.config.vendor_chunk;
        let minify = self.config.minify;

        let compiled: Vec<Result<(String, EntryArtifacts)>> = tokio::task::spawn_blocking(move || {
            jobs.into_par_iter()
                .map(|(name, entry_path, modules)| -> Result<(String, EntryArtifacts)> {
                    let artifacts = compile_entry(
                        js.as_ref(),
                        css.as_ref(),
                        &entry_path,
                        &modules,
                        client_script.as_deref(),
                        vendor_chunk,
                        minify,
                    )?;
                    Ok((name, artifacts))
                })
                .collect()
        })
        .await
        .map_err(|e| TailpackError::build(format!("Parallel compilation failed: {}", e)))?;

        compiled.into_iter().collect()
    }

    fn assemble(&self, artifacts: &BTreeMap<String, EntryArtifacts>) -> Result<Vec<EmittedAsset>> {
        let mut staged: Vec<(String, String, AssetKind, String)> = Vec::new();

        // An entry named `vendors` absorbs the shared chunk instead of clashing with it
        let vendor_entry_has_script = artifacts
            .get(VENDOR_CHUNK)
            .map_or(false, |a| a.script.is_some());
        let mut shared_vendor_code = None;

        if self.config.vendor_chunk {
            let mut seen = HashSet::new();
            let vendor_modules: Vec<String> = artifacts
                .values()
                .flat_map(|a| a.vendor_modules.iter())
                .filter(|(id, _)| seen.insert(id.clone()))
                .map(|(_, code)| code.clone())
                .collect();

            if !vendor_modules.is_empty() {
                let mut chunk = assemble_chunk(None, &vendor_modules, None);
                if self.config.minify {
                    chunk = self
                        .js_processor
                        .minify(Path::new("vendors.js"), &chunk)?;
                }
                if vendor_entry_has_script {
                    shared_vendor_code = Some(chunk);
                } else {
                    staged.push((
                        format!("{}.js", VENDOR_CHUNK),
                        VENDOR_CHUNK.to_string(),
                        AssetKind::Script,
                        chunk,
                    ));
                }
            }
        }

        for (name, artifact) in artifacts {
            if let Some(ref script) = artifact.script {
                let content = match shared_vendor_code {
                    Some(ref shared) if name == VENDOR_CHUNK => format!("{};\n{}", shared, script),
                    _ => script.clone(),
                };
                staged.push((format!("{}.js", name), name.clone(), AssetKind::Script, content));
            }
            if let Some(ref style) = artifact.style {
                staged.push((format!("{}.css", name), name.clone(), AssetKind::Stylesheet, style.clone()));
            }
        }

        let hashes: Vec<String> = staged
            .iter()
            .map(|(_, _, _, content)| content_hash(content.as_bytes()))
            .collect();
        let fullhash = combined_hash(hashes.iter().map(String::as_str));

        Ok(staged
            .into_iter()
            .zip(hashes)
            .map(|((logical_name, chunk, kind, content), hash)| {
                let template = match kind {
                    AssetKind::Script => &self.config.output.filename,
                    AssetKind::Stylesheet => &self.config.output.css_filename,
                };
                EmittedAsset {
                    filename: render_filename(template, &chunk, &hash, &fullhash),
                    logical_name,
                    chunk,
                    kind,
                    content,
                }
            })
            .collect())
    }

    async fn run(&mut self, names: BTreeSet<String>, start: Instant) -> Result<BuildOutput> {
        let compiled = self.compile(&names).await?;

        let mut artifacts = self
            .previous
            .as_ref()
            .map(|p| p.artifacts.clone())
            .unwrap_or_default();
        artifacts.retain(|name, _| self.config.entries.contains_key(name));
        artifacts.extend(compiled);

        let assets = self.assemble(&artifacts)?;
        let manifest = Manifest::from_assets(&assets)?;

        let mut graph = ModuleGraph::new();
        for (name, artifact) in &artifacts {
            graph.set_entry(name, artifact.modules.clone());
        }

        // Only a fully successful build replaces the reusable state
        self.previous = Some(CompiledState { artifacts });

        Ok(BuildOutput {
            assets,
            manifest,
            graph,
            compiled_entries: names.into_iter().collect(),
            build_time: start.elapsed(),
        })
    }

    fn all_entries(&self) -> BTreeSet<String> {
        self.config.entries.keys().cloned().collect()
    }
}

fn compile_entry(
    js: &dyn JsProcessor,
    css: &dyn CssProcessor,
    entry_path: &Path,
    modules: &[ModuleInfo],
    client_script: Option<&str>,
    vendor_chunk: bool,
    minify: bool,
) -> Result<EntryArtifacts> {
    let mut app_modules = Vec::new();
    let mut vendor_modules = Vec::new();
    let mut styles = Vec::new();

    for module in modules {
        match module.module_type {
            ModuleType::JavaScript => {
                let code = js.transform_module(module)?;
                if vendor_chunk && module.is_vendor() {
                    vendor_modules.push((module.id.clone(), code));
                } else {
                    app_modules.push(code);
                }
            }
            ModuleType::Css | ModuleType::Scss => {
                styles.push(css.process_stylesheet(module)?);
            }
            ModuleType::Unknown => {}
        }
    }

    let entry_is_script = ModuleType::from_path(entry_path) == ModuleType::JavaScript;
    let script = if entry_is_script {
        let entry_id = modules.last().map(|m| m.id.as_str());
        let chunk = assemble_chunk(client_script, &app_modules, entry_id);
        Some(if minify {
            js.minify(entry_path, &chunk)?
        } else {
            chunk
        })
    } else {
        None
    };

    let style = if styles.is_empty() {
        None
    } else {
        Some(css.finalize(entry_path, &styles.join("\n"))?)
    };

    Ok(EntryArtifacts {
        modules: modules.iter().map(|m| m.path.clone()).collect(),
        script,
        style,
        vendor_modules,
    })
}

#[async_trait::async_trait]
impl BuildService for TailpackBuildService {
    async fn build(&mut self) -> Result<BuildOutput> {
        let _timer = Timer::start("Build");
        let start = Instant::now();
        self.previous = None;
        self.run(self.all_entries(), start).await
    }

    async fn rebuild(&mut self, changed: &HashSet<PathBuf>) -> Result<BuildOutput> {
        let _timer = Timer::start("Rebuild");
        let start = Instant::now();

        let Some(ref previous) = self.previous else {
            return self.build().await;
        };

        let mut graph = ModuleGraph::new();
        for (name, artifact) in &previous.artifacts {
            graph.set_entry(name, artifact.modules.clone());
        }

        let names = match graph.affected_entries(changed) {
            Some(names) => names,
            None => self.all_entries(),
        };
        self.run(names, start).await
    }
}

/// Make a staged build visible: assets first, then the manifest, then stats.
///
/// Asset files are skipped when `write_to_disk` is off (development serves
/// them from memory); the manifest and stats file are always written.
pub async fn emit(
    output: &BuildOutput,
    config: &BuildConfig,
    fs_service: &dyn FileSystemService,
) -> Result<()> {
    let _timer = Timer::start("Writing output files");

    if config.write_to_disk {
        for asset in &output.assets {
            let path = config.output.path.join(&asset.filename);
            fs_service.write_file(&path, &asset.content).await?;
        }
    }

    output.manifest.write(fs_service, &config.manifest_path).await?;
    Logger::manifest_written(
        &config.manifest_path.display().to_string(),
        output.manifest.len(),
    );

    if let Some(ref stats_path) = config.stats_path {
        StatsFile::done(&output.assets, &config.output.path, &config.output.public_path)
            .write(fs_service, stats_path)
            .await?;
    }

    Ok(())
}

/// Record a failed build in the stats file, if one is configured.
pub async fn emit_error(
    err: &TailpackError,
    config: &BuildConfig,
    fs_service: &dyn FileSystemService,
) -> Result<()> {
    if let Some(ref stats_path) = config.stats_path {
        StatsFile::error(err).write(fs_service, stats_path).await?;
    }
    Ok(())
}
