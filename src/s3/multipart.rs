use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

use super::error::{never_missing, S3Error};

/// Smallest part size S3 accepts for all but the last part (5 MiB)
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Upload a large file using S3 multipart upload
///
/// The file is sent in parts of `part_size` bytes (the last part may be
/// shorter). If any part fails the upload is aborted so no orphaned parts
/// stay behind on the server.
pub async fn upload_multipart(
    client: &Client,
    bucket: &str,
    s3_key: &str,
    local_path: &Path,
    part_size: u64,
    content_type: &str,
) -> Result<(), S3Error> {
    let file_size = tokio::fs::metadata(local_path).await?.len();

    info!(
        "Starting multipart upload for {} ({} bytes, {} parts)",
        local_path.display(),
        file_size,
        file_size.div_ceil(part_size)
    );

    let multipart = client
        .create_multipart_upload()
        .bucket(bucket)
        .key(s3_key)
        .content_type(content_type)
        .send()
        .await
        .map_err(|e| S3Error::from_sdk(e, never_missing))?;

    let upload_id = multipart
        .upload_id()
        .ok_or_else(|| S3Error::other("No upload ID returned from S3"))?
        .to_string();

    debug!("Multipart upload initiated with ID: {}", upload_id);

    let parts = match upload_parts(client, bucket, s3_key, local_path, part_size, &upload_id).await
    {
        Ok(parts) => parts,
        Err(e) => {
            warn!("Multipart upload of {} failed: {}", s3_key, e);
            if let Err(abort_err) = abort_multipart_upload(client, bucket, s3_key, &upload_id).await
            {
                warn!("Failed to abort multipart upload {}: {}", upload_id, abort_err);
            }
            return Err(e);
        }
    };

    debug!(
        "All {} parts uploaded, completing multipart upload",
        parts.len()
    );

    let completed_multipart = CompletedMultipartUpload::builder()
        .set_parts(Some(parts))
        .build();

    client
        .complete_multipart_upload()
        .bucket(bucket)
        .key(s3_key)
        .upload_id(&upload_id)
        .multipart_upload(completed_multipart)
        .send()
        .await
        .map_err(|e| S3Error::from_sdk(e, never_missing))?;

    info!(
        "Successfully completed multipart upload: {} -> s3://{}/{}",
        local_path.display(),
        bucket,
        s3_key
    );

    Ok(())
}

async fn upload_parts(
    client: &Client,
    bucket: &str,
    s3_key: &str,
    local_path: &Path,
    part_size: u64,
    upload_id: &str,
) -> Result<Vec<CompletedPart>, S3Error> {
    let mut file = tokio::fs::File::open(local_path).await?;
    let mut parts = Vec::new();
    let mut part_number = 1i32;

    loop {
        let mut buffer = Vec::with_capacity(part_size as usize);
        let bytes_read = (&mut file).take(part_size).read_to_end(&mut buffer).await?;

        if bytes_read == 0 {
            break; // EOF
        }

        debug!("Uploading part {} ({} bytes)", part_number, bytes_read);

        let part_result = client
            .upload_part()
            .bucket(bucket)
            .key(s3_key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(buffer))
            .send()
            .await
            .map_err(|e| S3Error::from_sdk(e, never_missing))?;

        parts.push(
            CompletedPart::builder()
                .part_number(part_number)
                .e_tag(part_result.e_tag().unwrap_or(""))
                .build(),
        );

        part_number += 1;
    }

    Ok(parts)
}

/// Abort a multipart upload (for cleanup on error)
pub async fn abort_multipart_upload(
    client: &Client,
    bucket: &str,
    s3_key: &str,
    upload_id: &str,
) -> Result<(), S3Error> {
    client
        .abort_multipart_upload()
        .bucket(bucket)
        .key(s3_key)
        .upload_id(upload_id)
        .send()
        .await
        .map_err(|e| S3Error::from_sdk(e, never_missing))?;

    debug!("Aborted multipart upload {}", upload_id);

    Ok(())
}
