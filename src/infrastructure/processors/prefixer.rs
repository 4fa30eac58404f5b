use crate::core::interfaces::StyleTransform;
use crate::utils::{Result, TailpackError};
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use std::path::Path;

pub const STAGE: &str = "autoprefixer";

/// Adds vendor prefixes for the configured browserslist targets
pub struct VendorPrefixTransform {
    targets: Targets,
}

impl VendorPrefixTransform {
    pub fn new(queries: &[String]) -> Result<Self> {
        let browsers = Browsers::from_browserslist(queries.iter().map(String::as_str))
            .map_err(|e| {
                TailpackError::config(
                    "targets",
                    format!("invalid browserslist query {:?}: {}", queries, e),
                )
            })?;

        Ok(Self {
            targets: browsers.map(Targets::from).unwrap_or_default(),
        })
    }
}

impl StyleTransform for VendorPrefixTransform {
    fn name(&self) -> &'static str {
        STAGE
    }

    fn apply(&self, asset: &Path, css: &str) -> Result<String> {
        let options = ParserOptions {
            filename: asset.display().to_string(),
            ..ParserOptions::default()
        };
        let mut stylesheet = StyleSheet::parse(css, options)
            .map_err(|e| TailpackError::transform(asset, STAGE, e.to_string()))?;

        stylesheet
            .minify(MinifyOptions {
                targets: self.targets,
                ..MinifyOptions::default()
            })
            .map_err(|e| TailpackError::transform(asset, STAGE, e.to_string()))?;

        let printed = stylesheet
            .to_css(PrinterOptions {
                minify: false,
                targets: self.targets,
                ..PrinterOptions::default()
            })
            .map_err(|e| TailpackError::transform(asset, STAGE, e.to_string()))?;

        Ok(printed.code)
    }
}
