use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// The package.json fields that matter for picking an entry file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageJson {
    #[serde(default)]
    pub main: Option<String>,
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub browser: Option<BrowserField>,
    #[serde(default)]
    pub style: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BrowserField {
    String(String),
    Object(HashMap<String, serde_json::Value>),
}

/// Find an existing file for `path`: as-is, then with each extension appended.
///
/// The result is canonicalized so the same module always has the same key.
pub fn find_file(path: &Path, extensions: &[String]) -> Option<PathBuf> {
    if path.is_file() {
        return path.canonicalize().ok();
    }

    for ext in extensions {
        let mut candidate = OsString::from(path.as_os_str());
        candidate.push(ext);
        let candidate = PathBuf::from(candidate);
        if candidate.is_file() {
            return candidate.canonicalize().ok();
        }
    }

    None
}

/// Node-style module resolution for scripts and stylesheets
pub struct ModuleResolver {
    extensions: Vec<String>,
    module_dirs: Vec<String>,
    /// Cache of package.json files
    package_cache: Mutex<HashMap<PathBuf, Option<PackageJson>>>,
}

impl ModuleResolver {
    pub fn new(extensions: Vec<String>, module_dirs: Vec<String>) -> Self {
        let mut extensions = extensions;
        for style_ext in [".css", ".scss"] {
            if !extensions.iter().any(|e| e == style_ext) {
                extensions.push(style_ext.to_string());
            }
        }

        Self {
            extensions,
            module_dirs,
            package_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve an import specifier seen in `from_file`.
    pub fn resolve(&self, specifier: &str, from_file: &Path, project_root: &Path) -> Option<PathBuf> {
        // Handle relative imports
        if specifier.starts_with("./") || specifier.starts_with("../") {
            let base = from_file.parent()?.join(specifier);
            return self.resolve_file_or_directory(&base);
        }

        // Root-relative imports
        if let Some(rest) = specifier.strip_prefix('/') {
            return self.resolve_file_or_directory(&project_root.join(rest));
        }

        // A stylesheet `@import "~pkg/x.css"` names a package explicitly
        let bare = specifier.strip_prefix('~').unwrap_or(specifier);
        self.resolve_package(bare, from_file, project_root)
    }

    pub fn is_bare(specifier: &str) -> bool {
        !specifier.starts_with("./") && !specifier.starts_with("../") && !specifier.starts_with('/')
    }

    fn resolve_package(&self, specifier: &str, from_file: &Path, project_root: &Path) -> Option<PathBuf> {
        let (pkg_name, subpath) = Self::parse_package_specifier(specifier);

        // Walk up directory tree looking for module directories
        let mut current_dir = from_file.parent()?;
        loop {
            for module_dir in &self.module_dirs {
                let package_dir = current_dir.join(module_dir).join(&pkg_name);
                if package_dir.is_dir() {
                    if let Some(entry) = self.resolve_package_entry(&package_dir, subpath.as_deref()) {
                        return Some(entry);
                    }
                }
            }

            if current_dir == project_root {
                break;
            }
            current_dir = current_dir.parent()?;
        }

        None
    }

    /// Split `@scope/pkg/sub/path` into (`@scope/pkg`, `sub/path`)
    fn parse_package_specifier(specifier: &str) -> (String, Option<String>) {
        let mut parts = specifier.splitn(if specifier.starts_with('@') { 3 } else { 2 }, '/');
        let name = if specifier.starts_with('@') {
            let scope = parts.next().unwrap_or_default();
            let pkg = parts.next().unwrap_or_default();
            format!("{}/{}", scope, pkg)
        } else {
            parts.next().unwrap_or_default().to_string()
        };
        let subpath = parts.next().filter(|s| !s.is_empty()).map(str::to_string);
        (name, subpath)
    }

    fn resolve_package_entry(&self, package_dir: &Path, subpath: Option<&str>) -> Option<PathBuf> {
        if let Some(subpath) = subpath {
            return self.resolve_file_or_directory(&package_dir.join(subpath));
        }

        if let Some(pkg) = self.read_package_json(&package_dir.join("package.json")) {
            let browser = match pkg.browser {
                Some(BrowserField::String(ref path)) => Some(path.clone()),
                _ => None,
            };
            // browser, then module, then main; `style` last for CSS-only packages
            for field in [browser, pkg.module.clone(), pkg.main.clone(), pkg.style.clone()]
                .into_iter()
                .flatten()
            {
                if let Some(resolved) = find_file(&package_dir.join(&field), &self.extensions) {
                    return Some(resolved);
                }
            }
        }

        self.resolve_index(package_dir)
    }

    fn resolve_file_or_directory(&self, path: &Path) -> Option<PathBuf> {
        if let Some(file) = find_file(path, &self.extensions) {
            return Some(file);
        }

        if !path.is_dir() {
            return None;
        }

        if let Some(pkg) = self.read_package_json(&path.join("package.json")) {
            if let Some(main) = pkg.module.or(pkg.main) {
                if let Some(resolved) = find_file(&path.join(main), &self.extensions) {
                    return Some(resolved);
                }
            }
        }

        self.resolve_index(path)
    }

    fn resolve_index(&self, dir: &Path) -> Option<PathBuf> {
        find_file(&dir.join("index"), &self.extensions)
    }

    fn read_package_json(&self, path: &Path) -> Option<PackageJson> {
        let mut cache = self.package_cache.lock();
        if let Some(cached) = cache.get(path) {
            return cached.clone();
        }

        let parsed = std::fs::read_to_string(path)
            .ok()
            .and_then(|content| serde_json::from_str::<PackageJson>(&content).ok());
        cache.insert(path.to_path_buf(), parsed.clone());
        parsed
    }
}
