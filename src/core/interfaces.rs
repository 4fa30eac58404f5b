use crate::core::models::*;
use crate::utils::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// File system operations interface
#[async_trait]
pub trait FileSystemService: Send + Sync {
    async fn read_file(&self, path: &Path) -> Result<String>;
    async fn write_file(&self, path: &Path, content: &str) -> Result<()>;
    /// Write through a sibling temp file and rename over `path`.
    async fn write_file_atomic(&self, path: &Path, content: &str) -> Result<()>;
    async fn create_directory(&self, path: &Path) -> Result<()>;
}

/// One stylesheet transform stage. Pure: text in, text out.
pub trait StyleTransform: Send + Sync {
    fn name(&self) -> &'static str;
    fn apply(&self, asset: &Path, css: &str) -> Result<String>;
}

/// Stylesheet processing interface
pub trait CssProcessor: Send + Sync {
    /// Turn one source stylesheet into plain CSS that has passed every transform.
    fn process_stylesheet(&self, module: &ModuleInfo) -> Result<String>;
    /// Final extraction step for a concatenated entry stylesheet.
    fn finalize(&self, asset: &Path, css: &str) -> Result<String>;
    /// Local `@import` specifiers the bundler must resolve.
    fn extract_dependencies(&self, path: &Path, content: &str) -> Vec<String>;
}

/// Script processing interface
pub trait JsProcessor: Send + Sync {
    /// Import specifiers of a script module, in source order.
    fn extract_dependencies(&self, path: &Path, content: &str) -> Result<Vec<String>>;
    /// Module body ready for concatenation (imports dropped, exports unwrapped).
    fn transform_module(&self, module: &ModuleInfo) -> Result<String>;
    fn minify(&self, asset: &Path, code: &str) -> Result<String>;
}

/// Build service interface
#[async_trait]
pub trait BuildService: Send + Sync {
    /// Compile every entry point.
    async fn build(&mut self) -> Result<BuildOutput>;
    /// Recompile only what `changed` can affect.
    async fn rebuild(&mut self, changed: &HashSet<PathBuf>) -> Result<BuildOutput>;
}
