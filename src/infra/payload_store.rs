use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};

use super::PayloadFetcher;
use crate::error::{LinesError, Result};
use crate::types::SourceId;

fn snapshot_path(root: &Path, source: SourceId) -> PathBuf {
    root.join(format!("{}.{}", source, source.payload_extension()))
}

/// Serves payloads saved by an earlier run, `<dir>/<source>.<json|html>`
pub struct DirectoryFetcher {
    root: PathBuf,
}

impl DirectoryFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl PayloadFetcher for DirectoryFetcher {
    async fn fetch(&self, source: SourceId) -> Result<Vec<u8>> {
        let path = snapshot_path(&self.root, source);
        tokio::fs::read(&path).await.map_err(|e| {
            LinesError::unavailable(source.as_str(), format!("{}: {}", path.display(), e))
        })
    }
}

/// Keep this run's raw payload so the run can be replayed offline
pub fn save_snapshot(root: &Path, source: SourceId, bytes: &[u8]) -> Result<PathBuf> {
    fs::create_dir_all(root)?;
    let path = snapshot_path(root, source);
    fs::write(&path, bytes)?;
    Ok(path)
}
