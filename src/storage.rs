//! Storage interface
//!
//! [`Storage`] is the surface callers program against; backends such as
//! [`S3Storage`](crate::S3Storage) implement it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;
use crate::stream::FileStream;

/// A path that could not be deleted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteFileError {
    pub path: String,
    pub message: String,
}

/// Outcome of [`Storage::delete_files`]
///
/// Deletion continues past failures; every path that could not be removed is
/// reported here in request order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteFilesResponse {
    pub errors: Vec<DeleteFileError>,
}

impl DeleteFilesResponse {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// File storage operations
#[async_trait]
pub trait Storage: Send + Sync {
    /// Display name of the storage
    fn name(&self) -> &str;

    /// Delete every path independently, collecting failures
    async fn delete_files(&self, paths: &[&str]) -> DeleteFilesResponse;

    /// Download the file at `src` to the local path `dst`
    async fn download_file(&self, src: &str, dst: &Path) -> Result<()>;

    async fn file_exists(&self, path: &str) -> Result<bool>;

    /// Time-limited public URL for an existing file
    async fn get_link(&self, path: &str) -> Result<String>;

    /// Stream the content of `src` without loading it into memory
    async fn get_file(&self, src: &str) -> Result<FileStream>;

    /// All files below `path`, recursively
    async fn list_files(&self, path: &str) -> Result<Vec<String>>;

    /// Upload the local file `src` to `dst`
    async fn upload_file(&self, src: &Path, dst: &str) -> Result<()>;

    /// Size of `src` in bytes
    async fn size(&self, src: &str) -> Result<u64>;
}
