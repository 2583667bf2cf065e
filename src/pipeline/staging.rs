//! Transient local copies used while a thumbnail is rendered.
//!
//! Each invocation gets its own directory under the staging root. Files and
//! the directory are released when their guards drop, on every exit path.
//! Release failures are logged and otherwise ignored.

use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

/// Per-invocation staging directory.
#[derive(Debug)]
pub struct StagingDir {
    path: PathBuf,
}

impl StagingDir {
    /// Create a fresh directory beneath `root`.
    pub async fn create(root: &Path) -> io::Result<Self> {
        let path = root.join(format!("invocation-{}", Uuid::new_v4()));
        fs::create_dir_all(&path).await?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `data` to `file_name` inside the directory.
    ///
    /// The guard exists before the first byte is written, so a partial file
    /// is still released.
    pub async fn stage(&self, file_name: &str, data: &[u8]) -> io::Result<StagedFile> {
        let staged = StagedFile {
            path: self.path.join(file_name),
        };
        fs::write(&staged.path, data).await?;
        debug!("staged {} bytes at {}", data.len(), staged.path.display());
        Ok(staged)
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => warn!(
                "failed to remove staging directory {}: {}",
                self.path.display(),
                err
            ),
        }
    }
}

/// A local file owned by one invocation.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read(&self) -> io::Result<Vec<u8>> {
        fs::read(&self.path).await
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("released {}", self.path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => warn!(
                "failed to remove staged file {}: {}",
                self.path.display(),
                err
            ),
        }
    }
}
