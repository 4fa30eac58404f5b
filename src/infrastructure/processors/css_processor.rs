use crate::core::interfaces::{CssProcessor, StyleTransform};
use crate::core::models::{BuildConfig, ModuleInfo, ModuleType, StyleTransformKind};
use crate::infrastructure::processors::{UtilityClassTransform, VendorPrefixTransform};
use crate::utils::{Logger, Result, TailpackError};
use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleSheet};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

static IMPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"@import\s+(?:url\(\s*)?["']?([^"')\s;]+)["']?\s*\)?[^;]*;"#)
        .expect("valid @import pattern")
});

fn is_remote(specifier: &str) -> bool {
    specifier.starts_with("http://")
        || specifier.starts_with("https://")
        || specifier.starts_with("//")
        || specifier.starts_with("data:")
}

/// Ordered stylesheet transforms. Each stage consumes the previous stage's output.
pub struct StylePipeline {
    transforms: Vec<Box<dyn StyleTransform>>,
}

impl StylePipeline {
    pub fn new(transforms: Vec<Box<dyn StyleTransform>>) -> Self {
        Self { transforms }
    }

    pub fn from_config(config: &BuildConfig) -> Result<Self> {
        let mut transforms: Vec<Box<dyn StyleTransform>> = Vec::new();
        for kind in &config.style_transforms {
            match kind {
                StyleTransformKind::Utilities => transforms.push(Box::new(
                    UtilityClassTransform::new(&config.root, config.utilities.clone()),
                )),
                StyleTransformKind::Autoprefixer => {
                    transforms.push(Box::new(VendorPrefixTransform::new(&config.targets)?))
                }
            }
        }
        Ok(Self::new(transforms))
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.transforms.iter().map(|t| t.name()).collect()
    }

    pub fn run(&self, asset: &Path, css: &str) -> Result<String> {
        let name = asset
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown");

        let mut current = css.to_string();
        for transform in &self.transforms {
            Logger::processing_css(name, transform.name());
            current = transform.apply(asset, &current)?;
        }
        Ok(current)
    }
}

pub struct LightningCssProcessor {
    pipeline: StylePipeline,
    minify: bool,
}

impl LightningCssProcessor {
    pub fn new(pipeline: StylePipeline, minify: bool) -> Self {
        Self { pipeline, minify }
    }

    pub fn from_config(config: &BuildConfig) -> Result<Self> {
        Ok(Self::new(StylePipeline::from_config(config)?, config.minify))
    }

    fn compile_scss(&self, module: &ModuleInfo) -> Result<String> {
        let _timer = crate::utils::Timer::start(&format!("Compiling SCSS {}", module.id));

        let syntax = if module.path.extension().and_then(|s| s.to_str()) == Some("sass") {
            grass::InputSyntax::Sass
        } else {
            grass::InputSyntax::Scss
        };

        let mut options = grass::Options::default()
            .input_syntax(syntax)
            .style(grass::OutputStyle::Expanded);
        if let Some(parent) = module.path.parent() {
            options = options.load_path(parent);
        }

        grass::from_string(module.content.clone(), &options)
            .map_err(|e| TailpackError::transform(&module.path, "scss", e.to_string()))
    }

    /// Drop `@import` rules the bundler inlines; remote imports stay.
    fn strip_local_imports(css: &str) -> String {
        IMPORT_RE
            .replace_all(css, |caps: &regex::Captures| {
                if is_remote(&caps[1]) {
                    caps[0].to_string()
                } else {
                    String::new()
                }
            })
            .into_owned()
    }

    /// Move remote `@import` rules to the top, where CSS requires them.
    pub fn hoist_remote_imports(css: &str) -> String {
        let mut imports = Vec::new();
        let body = IMPORT_RE.replace_all(css, |caps: &regex::Captures| {
            let rule = caps[0].to_string();
            if !imports.contains(&rule) {
                imports.push(rule);
            }
            String::new()
        });

        if imports.is_empty() {
            return css.to_string();
        }
        format!("{}\n{}", imports.join("\n"), body)
    }

    fn minify_css(asset: &Path, css: &str) -> Result<String> {
        let stylesheet = StyleSheet::parse(css, ParserOptions::default())
            .map_err(|e| TailpackError::transform(asset, "minify", e.to_string()))?;
        let printed = stylesheet
            .to_css(PrinterOptions {
                minify: true,
                ..Default::default()
            })
            .map_err(|e| TailpackError::transform(asset, "minify", e.to_string()))?;
        Ok(printed.code)
    }
}

impl CssProcessor for LightningCssProcessor {
    fn process_stylesheet(&self, module: &ModuleInfo) -> Result<String> {
        let css = match module.module_type {
            ModuleType::Scss => self.compile_scss(module)?,
            ModuleType::Css => module.content.clone(),
            other => {
                return Err(TailpackError::build_in(
                    &module.path,
                    format!("not a stylesheet: {:?}", other),
                ))
            }
        };

        let css = Self::strip_local_imports(&css);
        self.pipeline.run(&module.path, &css)
    }

    fn finalize(&self, asset: &Path, css: &str) -> Result<String> {
        let css = Self::hoist_remote_imports(css);
        if self.minify {
            Self::minify_css(asset, &css)
        } else {
            Ok(css)
        }
    }

    fn extract_dependencies(&self, path: &Path, content: &str) -> Vec<String> {
        // grass resolves partials itself
        if ModuleType::from_path(path) == ModuleType::Scss {
            return Vec::new();
        }

        IMPORT_RE
            .captures_iter(content)
            .map(|caps| caps[1].to_string())
            .filter(|specifier| !is_remote(specifier))
            .collect()
    }
}
