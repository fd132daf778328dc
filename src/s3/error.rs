use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use thiserror::Error;

/// Error code reported for a missing object
pub const NO_SUCH_KEY: &str = "NoSuchKey";

/// Error returned by an [`ObjectClient`](super::ObjectClient)
///
/// `code` carries the S3 error code when the service produced one; transport
/// failures have no code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct S3Error {
    pub code: Option<String>,
    pub message: String,
}

impl S3Error {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    pub fn no_such_key(bucket: &str, key: &str) -> Self {
        Self::new(
            NO_SUCH_KEY,
            format!("NoSuchKey: the object '{}' does not exist in bucket '{}'", key, bucket),
        )
    }

    /// Error without a service code, e.g. a local read failure
    pub fn other(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn is_no_such_key(&self) -> bool {
        self.code() == Some(NO_SUCH_KEY)
    }

    /// Convert an AWS SDK error
    ///
    /// `missing` tells whether the operation-specific service error means the
    /// object does not exist (`NoSuchKey` for GET, `NotFound` for HEAD). A bare
    /// 404 without a service code is treated the same way.
    pub(crate) fn from_sdk<E>(error: SdkError<E, HttpResponse>, missing: fn(&E) -> bool) -> Self
    where
        E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    {
        let message = DisplayErrorContext(&error).to_string();
        let status = error.raw_response().map(|r| r.status().as_u16());

        let code = match error.as_service_error() {
            Some(service) if missing(service) => Some(NO_SUCH_KEY.to_string()),
            Some(service) => service.code().map(str::to_string),
            None => None,
        };
        let code = match (code, status) {
            (None, Some(404)) => Some(NO_SUCH_KEY.to_string()),
            (code, _) => code,
        };

        Self { code, message }
    }
}

/// Used for operations whose service errors never mean "missing object"
pub(crate) fn never_missing<E>(_: &E) -> bool {
    false
}

impl From<std::io::Error> for S3Error {
    fn from(error: std::io::Error) -> Self {
        Self::other(format!("IO error: {}", error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_such_key() {
        let err = S3Error::no_such_key("bucket", "a/b.txt");
        assert!(err.is_no_such_key());
        assert_eq!(err.code(), Some("NoSuchKey"));
        assert!(err.to_string().contains("a/b.txt"));
    }

    #[test]
    fn test_other_codes() {
        assert!(!S3Error::new("AccessDenied", "denied").is_no_such_key());
        assert!(!S3Error::other("connection reset").is_no_such_key());
        assert_eq!(S3Error::other("connection reset").code(), None);
    }
}
