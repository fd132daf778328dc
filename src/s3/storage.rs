use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::client::{AwsClient, ObjectClient};
use crate::config::S3Config;
use crate::error::{Result, StorageError};
use crate::storage::{DeleteFileError, DeleteFilesResponse, Storage};
use crate::stream::FileStream;

/// Validity of links returned by [`Storage::get_link`] (7 days)
pub const LINK_EXPIRY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// [`Storage`] backed by an S3-compatible bucket
///
/// Each operation maps onto a single request of the wrapped [`ObjectClient`];
/// errors from the client are passed through as [`StorageError::S3`] unless
/// they mean the file is missing.
#[derive(Debug)]
pub struct S3Storage<C = AwsClient> {
    config: S3Config,
    client: C,
}

impl S3Storage<AwsClient> {
    /// Create a storage talking to the configured S3 endpoint
    pub async fn new(config: S3Config) -> Self {
        let client = AwsClient::new(&config).await;
        Self::with_client(config, client)
    }
}

impl<C: ObjectClient> S3Storage<C> {
    pub fn with_client(config: S3Config, client: C) -> Self {
        Self { config, client }
    }

    pub fn config(&self) -> &S3Config {
        &self.config
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn bucket(&self) -> &str {
        &self.config.bucket_name
    }
}

#[async_trait]
impl<C: ObjectClient> Storage for S3Storage<C> {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn delete_files(&self, paths: &[&str]) -> DeleteFilesResponse {
        let mut errors = Vec::new();

        for path in paths {
            debug!("Deleting s3://{}/{}", self.bucket(), path);
            if let Err(e) = self.client.remove_object(self.bucket(), path).await {
                warn!("Failed to delete {}: {}", path, e);
                errors.push(DeleteFileError {
                    path: path.to_string(),
                    message: e.to_string(),
                });
            }
        }

        DeleteFilesResponse { errors }
    }

    async fn download_file(&self, src: &str, dst: &Path) -> Result<()> {
        let written = self.client.fget_object(self.bucket(), src, dst).await?;
        info!(
            "Downloaded s3://{}/{} -> {} ({} bytes)",
            self.bucket(),
            src,
            dst.display(),
            written
        );
        Ok(())
    }

    async fn file_exists(&self, path: &str) -> Result<bool> {
        match self.client.stat_object(self.bucket(), path).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_no_such_key() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_link(&self, path: &str) -> Result<String> {
        if !self.file_exists(path).await? {
            return Err(StorageError::NotFound(path.to_string()));
        }

        Ok(self
            .client
            .presigned_get_object(self.bucket(), path, LINK_EXPIRY)
            .await?)
    }

    async fn get_file(&self, src: &str) -> Result<FileStream> {
        debug!("Opening s3://{}/{}", self.bucket(), src);
        let body = self.client.get_object(self.bucket(), src).await?;
        Ok(FileStream::new(src, body))
    }

    async fn list_files(&self, path: &str) -> Result<Vec<String>> {
        let files: Vec<String> = self
            .client
            .list_objects(self.bucket(), path, true)
            .await?
            .into_iter()
            .map(|entry| entry.object_name)
            .collect();

        // An empty prefix and a missing one look the same to S3
        if files.is_empty() {
            return Err(StorageError::DirectoryNotFound(path.to_string()));
        }

        Ok(files)
    }

    async fn upload_file(&self, src: &Path, dst: &str) -> Result<()> {
        self.client
            .put_object(self.bucket(), dst, src, self.config.multipart_chunksize)
            .await?;
        info!(
            "Uploaded {} -> s3://{}/{}",
            src.display(),
            self.bucket(),
            dst
        );
        Ok(())
    }

    async fn size(&self, src: &str) -> Result<u64> {
        let stat = match self.client.stat_object(self.bucket(), src).await {
            Ok(stat) => stat,
            Err(e) if e.is_no_such_key() => return Err(StorageError::NotFound(src.to_string())),
            Err(e) => return Err(e.into()),
        };

        // A zero size is reported as missing, including for empty objects
        if stat.size == 0 {
            return Err(StorageError::NotFound(src.to_string()));
        }

        Ok(stat.size)
    }
}
