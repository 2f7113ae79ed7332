//! Local-disk file store for uploaded documents.

use eventhaiti_core::files::{FileFuture, FileStore, FileStoreError, StoragePath, StoredFile, check_upload_size};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

/// Stores objects as files under a root directory.
#[derive(Clone, Debug)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    /// Store rooted at `root`. The directory is created on first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Filesystem location of `path`, refusing anything that escapes the root.
    fn resolve(&self, path: &StoragePath) -> Result<PathBuf, FileStoreError> {
        let relative = Path::new(path.as_str());
        let safe = !path.as_str().is_empty()
            && relative.components().all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(FileStoreError::Storage(format!("invalid storage path: {path}")));
        }
        Ok(self.root.join(relative))
    }
}

fn io_error(path: &StoragePath, e: &std::io::Error) -> FileStoreError {
    FileStoreError::Storage(format!("{path}: {e}"))
}

impl FileStore for LocalFileStore {
    fn put(&self, path: StoragePath, bytes: Vec<u8>, content_type: String) -> FileFuture<'_, StoredFile> {
        Box::pin(async move {
            check_upload_size(bytes.len())?;
            let target = self.resolve(&path)?;
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| io_error(&path, &e))?;
            }
            tokio::fs::write(&target, &bytes).await.map_err(|e| io_error(&path, &e))?;
            tracing::debug!(%path, size = bytes.len(), "File stored");
            Ok(StoredFile {
                path,
                size: bytes.len(),
                content_type,
            })
        })
    }

    fn delete(&self, path: StoragePath) -> FileFuture<'_, ()> {
        Box::pin(async move {
            let target = self.resolve(&path)?;
            match tokio::fs::remove_file(&target).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(io_error(&path, &e)),
            }
        })
    }

    fn exists(&self, path: StoragePath) -> FileFuture<'_, bool> {
        Box::pin(async move {
            let target = self.resolve(&path)?;
            tokio::fs::try_exists(&target).await.map_err(|e| io_error(&path, &e))
        })
    }
}
