use crate::core::interfaces::FileSystemService;
use crate::utils::{Result, TailpackError};
use std::path::{Path, PathBuf};
use tokio::fs;

pub struct TokioFileSystemService;

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4().simple()))
}

#[async_trait::async_trait]
impl FileSystemService for TokioFileSystemService {
    async fn read_file(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).await.map_err(|e| {
            TailpackError::build_in(path, format!("cannot read {}: {}", path.display(), e))
        })
    }

    async fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            self.create_directory(parent).await?;
        }

        fs::write(path, content).await.map_err(TailpackError::Io)
    }

    async fn write_file_atomic(&self, path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            self.create_directory(parent).await?;
        }

        let tmp = temp_sibling(path);
        if let Err(e) = fs::write(&tmp, content).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(TailpackError::Io(e));
        }

        if let Err(e) = fs::rename(&tmp, path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(TailpackError::Io(e));
        }

        Ok(())
    }

    async fn create_directory(&self, path: &Path) -> Result<()> {
        if path.as_os_str().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(path).await.map_err(TailpackError::Io)
    }
}
