use std::path::{Path, PathBuf};
use thiserror::Error;

/// File attached to build errors
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorContext {
    pub file_path: Option<PathBuf>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: PathBuf) -> Self {
        self.file_path = Some(path);
        self
    }
}

#[derive(Error, Debug)]
pub enum TailpackError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or unknown configuration. Raised before any build work starts.
    #[error("Configuration error in {}: {message}", source_file.display())]
    Config {
        source_file: PathBuf,
        message: String,
    },

    /// A stylesheet or script failed one stage of its transform chain.
    #[error("Transform error in {} ({stage}): {message}", asset.display())]
    Transform {
        asset: PathBuf,
        stage: String,
        message: String,
    },

    /// The proxied backend could not be reached.
    #[error("Proxy error for {target}: {message}")]
    Proxy { target: String, message: String },

    #[error("Build error: {message}")]
    Build {
        message: String,
        context: Option<ErrorContext>,
    },
}

impl TailpackError {
    pub fn config(source_file: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Config {
            source_file: source_file.into(),
            message: message.into(),
        }
    }

    pub fn transform(asset: &Path, stage: &str, message: impl Into<String>) -> Self {
        Self::Transform {
            asset: asset.to_path_buf(),
            stage: stage.to_string(),
            message: message.into(),
        }
    }

    pub fn proxy(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Proxy {
            target: target.into(),
            message: message.into(),
        }
    }

    pub fn build(message: impl Into<String>) -> Self {
        Self::Build {
            message: message.into(),
            context: None,
        }
    }

    pub fn build_in(file: &Path, message: impl Into<String>) -> Self {
        Self::Build {
            message: message.into(),
            context: Some(ErrorContext::new().with_file(file.to_path_buf())),
        }
    }

    /// The file this error is about, if any.
    pub fn file(&self) -> Option<&Path> {
        match self {
            TailpackError::Config { source_file, .. } => Some(source_file),
            TailpackError::Transform { asset, .. } => Some(asset),
            TailpackError::Build {
                context: Some(ctx), ..
            } => ctx.file_path.as_deref(),
            _ => None,
        }
    }

    /// Format error with enhanced context display
    pub fn format_detailed(&self) -> String {
        match self {
            TailpackError::Build { message, context } => {
                self.format_error_with_context("Build Error", message, context)
            }
            TailpackError::Transform {
                asset,
                stage,
                message,
            } => {
                let ctx = Some(ErrorContext::new().with_file(asset.clone()));
                self.format_error_with_context(&format!("Transform Error [{}]", stage), message, &ctx)
            }
            _ => self.to_string(),
        }
    }

    fn format_error_with_context(
        &self,
        error_type: &str,
        message: &str,
        context: &Option<ErrorContext>,
    ) -> String {
        let mut output = format!("❌ {}: {}", error_type, message);

        if let Some(ctx) = context {
            if let Some(ref file_path) = ctx.file_path {
                output.push_str(&format!("\n📁 File: {}", file_path.display()));
            }
        }

        output
    }
}

pub type Result<T> = std::result::Result<T, TailpackError>;
