use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::error::{never_missing, S3Error};
use super::multipart::{upload_multipart, MIN_PART_SIZE};
use super::presign::generate_presigned_url;
use crate::config::S3Config;

/// Body of a GET response, read chunk by chunk
///
/// Dropping the stream releases the underlying connection.
pub type ObjectBody = BoxStream<'static, Result<Bytes, S3Error>>;

/// Metadata returned by a HEAD request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectStat {
    pub size: u64,
}

/// One entry of a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    pub object_name: String,
    pub size: u64,
    /// Common prefix reported by a non-recursive listing
    pub is_dir: bool,
}

/// Operations the storage adapter needs from an S3 client
#[async_trait]
pub trait ObjectClient: Send + Sync {
    /// Upload a local file, split into `part_size` parts when larger
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        local_path: &Path,
        part_size: u64,
    ) -> Result<(), S3Error>;

    /// Open an object for streaming
    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectBody, S3Error>;

    async fn stat_object(&self, bucket: &str, key: &str) -> Result<ObjectStat, S3Error>;

    async fn remove_object(&self, bucket: &str, key: &str) -> Result<(), S3Error>;

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        recursive: bool,
    ) -> Result<Vec<ObjectEntry>, S3Error>;

    async fn presigned_get_object(
        &self,
        bucket: &str,
        key: &str,
        expires: Duration,
    ) -> Result<String, S3Error>;

    /// Download an object into a local file
    ///
    /// The body is written to a `.part` file next to `local_path` and renamed
    /// once complete, so a failed download never leaves a truncated file
    /// behind. Returns the number of bytes written.
    async fn fget_object(&self, bucket: &str, key: &str, local_path: &Path) -> Result<u64, S3Error> {
        let body = self.get_object(bucket, key).await?;

        if let Some(parent) = local_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let part_path = part_file_path(local_path);
        match write_body(body, &part_path).await {
            Ok(written) => match tokio::fs::rename(&part_path, local_path).await {
                Ok(()) => Ok(written),
                Err(e) => {
                    let _ = tokio::fs::remove_file(&part_path).await;
                    Err(e.into())
                }
            },
            Err(e) => {
                let _ = tokio::fs::remove_file(&part_path).await;
                Err(e)
            }
        }
    }
}

/// Part size to use for a multipart upload, or `None` for a single PUT
///
/// Part sizes below the S3 minimum are raised to [`MIN_PART_SIZE`].
fn multipart_part_size(file_size: u64, part_size: u64) -> Option<u64> {
    let part_size = part_size.max(MIN_PART_SIZE);
    (file_size > part_size).then_some(part_size)
}

fn part_file_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

async fn write_body(mut body: ObjectBody, path: &Path) -> Result<u64, S3Error> {
    let mut file = File::create(path).await?;
    let mut written = 0u64;

    while let Some(chunk) = body.try_next().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    Ok(written)
}

/// [`ObjectClient`] backed by the AWS SDK
#[derive(Debug, Clone)]
pub struct AwsClient {
    client: Client,
}

impl AwsClient {
    /// Build a client for the configured endpoint and static credentials
    ///
    /// No request is sent; connection problems surface on the first call.
    pub async fn new(config: &S3Config) -> Self {
        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "s3-storage-config",
        );

        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .endpoint_url(config.endpoint_url())
            .credentials_provider(credentials)
            .load()
            .await;

        // MinIO and most S3-compatible servers only support path-style addressing
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(s3_config),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl ObjectClient for AwsClient {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        local_path: &Path,
        part_size: u64,
    ) -> Result<(), S3Error> {
        let file_size = tokio::fs::metadata(local_path).await?.len();
        let content_type = mime_guess::from_path(local_path)
            .first_or_octet_stream()
            .to_string();

        if let Some(part_size) = multipart_part_size(file_size, part_size) {
            return upload_multipart(
                &self.client,
                bucket,
                key,
                local_path,
                part_size,
                &content_type,
            )
            .await;
        }

        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| S3Error::other(format!("Failed to read {}: {}", local_path.display(), e)))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .content_length(file_size as i64)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| S3Error::from_sdk(e, never_missing))?;

        debug!("Uploaded {} ({} bytes) in a single request", key, file_size);

        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectBody, S3Error> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| S3Error::from_sdk(e, GetObjectError::is_no_such_key))?;

        let body = stream::unfold(output.body, |mut body| async move {
            match body.next().await {
                Some(Ok(chunk)) => Some((Ok(chunk), body)),
                Some(Err(e)) => Some((Err(S3Error::other(format!("Failed to read body: {}", e))), body)),
                None => None,
            }
        });

        Ok(body.boxed())
    }

    async fn stat_object(&self, bucket: &str, key: &str) -> Result<ObjectStat, S3Error> {
        let head = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| S3Error::from_sdk(e, HeadObjectError::is_not_found))?;

        Ok(ObjectStat {
            size: head.content_length().unwrap_or(0) as u64,
        })
    }

    async fn remove_object(&self, bucket: &str, key: &str) -> Result<(), S3Error> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| S3Error::from_sdk(e, never_missing))?;

        Ok(())
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        recursive: bool,
    ) -> Result<Vec<ObjectEntry>, S3Error> {
        let mut entries = Vec::new();
        let mut continuation_token = None;

        loop {
            let mut request = self.client.list_objects_v2().bucket(bucket).prefix(prefix);
            if !recursive {
                request = request.delimiter("/");
            }
            if let Some(token) = continuation_token {
                request = request.continuation_token(token);
            }

            let response = request.send().await.map_err(|e| S3Error::from_sdk(e, never_missing))?;

            entries.extend(response.common_prefixes().iter().filter_map(|p| {
                p.prefix().map(|name| ObjectEntry {
                    object_name: name.to_string(),
                    size: 0,
                    is_dir: true,
                })
            }));
            entries.extend(response.contents().iter().filter_map(|obj| {
                obj.key().map(|name| ObjectEntry {
                    object_name: name.to_string(),
                    size: obj.size().unwrap_or(0) as u64,
                    is_dir: false,
                })
            }));

            continuation_token = response.next_continuation_token().map(str::to_string);
            if continuation_token.is_none() {
                break;
            }
        }

        debug!("Listed {} entries under s3://{}/{}", entries.len(), bucket, prefix);

        Ok(entries)
    }

    async fn presigned_get_object(
        &self,
        bucket: &str,
        key: &str,
        expires: Duration,
    ) -> Result<String, S3Error> {
        generate_presigned_url(&self.client, bucket, key, expires).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_file_path() {
        assert_eq!(
            part_file_path(Path::new("/tmp/out/video.mp4")),
            PathBuf::from("/tmp/out/video.mp4.part")
        );
        assert_eq!(part_file_path(Path::new("notes")), PathBuf::from("notes.part"));
    }

    #[test]
    fn test_multipart_part_size() {
        const MIB: u64 = 1024 * 1024;

        // At or below the part size a single PUT is used
        assert_eq!(multipart_part_size(64 * MIB, 64 * MIB), None);
        assert_eq!(multipart_part_size(0, 64 * MIB), None);
        assert_eq!(multipart_part_size(64 * MIB + 1, 64 * MIB), Some(64 * MIB));

        // Part sizes under the S3 minimum are raised to 5 MiB
        assert_eq!(multipart_part_size(4 * MIB, MIB), None);
        assert_eq!(multipart_part_size(5 * MIB, 0), None);
        assert_eq!(multipart_part_size(20 * MIB, MIB), Some(5 * MIB));
    }

    #[tokio::test]
    async fn test_aws_client_builds_without_network() {
        let config = S3Config {
            secure: false,
            ..S3Config::default()
        };

        let client = AwsClient::new(&config).await;
        let conf = client.client().config();

        assert_eq!(conf.region().map(|r| r.as_ref()), Some("eu-central-1"));
    }
}
