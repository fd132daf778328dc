use aws_sdk_s3::{operation::get_object::GetObjectError, presigning::PresigningConfig, Client};
use std::time::Duration;

use super::error::S3Error;

/// Longest expiry S3 accepts for a pre-signed URL (7 days)
pub const MAX_PRESIGN_EXPIRY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Generate a pre-signed GET URL
///
/// # Arguments
///
/// * `client` - AWS S3 client
/// * `bucket` - S3 bucket name
/// * `s3_key` - S3 object key
/// * `expires` - Validity of the URL
///
/// # Notes
///
/// AWS limits pre-signed URLs to a maximum of 7 days; longer durations are
/// capped at [`MAX_PRESIGN_EXPIRY`].
pub async fn generate_presigned_url(
    client: &Client,
    bucket: &str,
    s3_key: &str,
    expires: Duration,
) -> Result<String, S3Error> {
    let presigning_config = PresigningConfig::expires_in(expires.min(MAX_PRESIGN_EXPIRY))
        .map_err(|e| S3Error::other(format!("Invalid presigning config: {}", e)))?;

    let presigned_request = client
        .get_object()
        .bucket(bucket)
        .key(s3_key)
        .presigned(presigning_config)
        .await
        .map_err(|e| S3Error::from_sdk(e, GetObjectError::is_no_such_key))?;

    Ok(presigned_request.uri().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::S3Config;
    use crate::s3::AwsClient;

    #[tokio::test]
    async fn test_presigned_url_is_signed_locally() {
        let config = S3Config {
            secure: false,
            ..S3Config::default()
        };
        let client = AwsClient::new(&config).await;

        let url = generate_presigned_url(
            client.client(),
            "esperoj",
            "docs/report.pdf",
            Duration::from_secs(30 * 24 * 60 * 60),
        )
        .await
        .unwrap();

        assert!(url.starts_with("http://localhost:9000/esperoj/docs/report.pdf"));
        assert!(url.contains("X-Amz-Expires=604800"));
        assert!(url.contains("X-Amz-Signature="));
    }
}
