//! File store trait for uploaded documents.
//!
//! Verification uploads (government ids, selfies, payout proofs) are stored
//! under `verification/{userId}/{documentType}_{timestamp}.{ext}`.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by [`FileStore`] methods.
pub type FileFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, FileStoreError>> + Send + 'a>>;

/// Largest accepted upload (10 MiB).
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Errors that can occur during file store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FileStoreError {
    /// Upload exceeded [`MAX_UPLOAD_BYTES`].
    #[error("File too large: {size} bytes (max {max})")]
    TooLarge {
        /// Received size.
        size: usize,
        /// Allowed size.
        max: usize,
    },

    /// Empty upload.
    #[error("File is empty")]
    Empty,

    /// Underlying storage failure.
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Path of a stored object.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct StoragePath(String);

impl StoragePath {
    /// Wrap an already-built path.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// `verification/{userId}/{documentType}_{timestamp}.{ext}`
    ///
    /// The extension is lowercased and stripped of anything but ASCII
    /// alphanumerics; an empty result falls back to `bin`.
    #[must_use]
    pub fn verification(user_id: &str, document_type: &str, timestamp_ms: i64, extension: &str) -> Self {
        let ext: String = extension
            .trim_start_matches('.')
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .map(|c| c.to_ascii_lowercase())
            .collect();
        let ext = if ext.is_empty() { "bin".to_string() } else { ext };
        Self(format!("verification/{user_id}/{document_type}_{timestamp_ms}.{ext}"))
    }

    /// Path as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoragePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Metadata of a stored object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredFile {
    /// Where it was written.
    pub path: StoragePath,
    /// Size in bytes.
    pub size: usize,
    /// MIME type supplied by the uploader.
    pub content_type: String,
}

/// A file received from a client, not yet stored.
#[derive(Clone, PartialEq, Eq)]
pub struct FileUpload {
    /// Name the client gave the file.
    pub file_name: String,
    /// MIME type supplied by the uploader.
    pub content_type: String,
    /// Raw contents.
    pub bytes: Vec<u8>,
}

impl FileUpload {
    /// Build an upload.
    #[must_use]
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// Extension of the client file name, or the MIME subtype when the name has none.
    #[must_use]
    pub fn extension(&self) -> &str {
        self.file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.is_empty())
            .or_else(|| self.content_type.split_once('/').map(|(_, sub)| sub))
            .unwrap_or("bin")
    }

    /// Check the upload against the size limits.
    ///
    /// # Errors
    ///
    /// [`FileStoreError::Empty`] or [`FileStoreError::TooLarge`].
    pub fn check_size(&self) -> Result<(), FileStoreError> {
        check_upload_size(self.bytes.len())
    }
}

// Uploads travel inside actions, which are logged at debug level.
impl fmt::Debug for FileUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileUpload")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("size", &self.bytes.len())
            .finish()
    }
}

/// Check an upload against the size limits.
///
/// # Errors
///
/// [`FileStoreError::Empty`] or [`FileStoreError::TooLarge`].
pub const fn check_upload_size(size: usize) -> Result<(), FileStoreError> {
    if size == 0 {
        return Err(FileStoreError::Empty);
    }
    if size > MAX_UPLOAD_BYTES {
        return Err(FileStoreError::TooLarge {
            size,
            max: MAX_UPLOAD_BYTES,
        });
    }
    Ok(())
}

/// Binary object storage (Firebase Storage replacement).
pub trait FileStore: Send + Sync {
    /// Write an object, replacing any existing one at `path`.
    fn put(&self, path: StoragePath, bytes: Vec<u8>, content_type: String) -> FileFuture<'_, StoredFile>;

    /// Remove an object. Missing objects are not an error.
    fn delete(&self, path: StoragePath) -> FileFuture<'_, ()>;

    /// Whether an object exists.
    fn exists(&self, path: StoragePath) -> FileFuture<'_, bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_paths_follow_the_upload_layout() {
        let path = StoragePath::verification("uid_42", "governmentIdFront", 1_700_000_000_000, ".JPG");
        assert_eq!(path.as_str(), "verification/uid_42/governmentIdFront_1700000000000.jpg");
    }

    #[test]
    fn odd_extensions_are_sanitised() {
        let path = StoragePath::verification("u", "selfie", 1, "../");
        assert_eq!(path.as_str(), "verification/u/selfie_1.bin");
    }

    #[test]
    fn upload_extension_falls_back_to_mime_subtype() {
        assert_eq!(FileUpload::new("id.PNG", "image/png", vec![1]).extension(), "PNG");
        assert_eq!(FileUpload::new("blob", "application/pdf", vec![1]).extension(), "pdf");
        assert_eq!(FileUpload::new("blob", "", vec![1]).extension(), "bin");
    }

    #[test]
    fn upload_debug_hides_bytes() {
        let upload = FileUpload::new("a.jpg", "image/jpeg", vec![7; 2048]);
        let rendered = format!("{upload:?}");
        assert!(rendered.contains("size: 2048"));
        assert!(!rendered.contains("7, 7"));
    }

    #[test]
    fn upload_size_limits() {
        assert_eq!(check_upload_size(0), Err(FileStoreError::Empty));
        assert!(check_upload_size(1).is_ok());
        assert!(matches!(
            check_upload_size(MAX_UPLOAD_BYTES + 1),
            Err(FileStoreError::TooLarge { .. })
        ));
    }
}
