use thiserror::Error;

use crate::s3::S3Error;

/// Errors returned by [`Storage`](crate::Storage) operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// The requested file does not exist
    #[error("No such file: '{0}'")]
    NotFound(String),

    /// Nothing is stored under the requested prefix
    #[error("No such directory: '{0}'")]
    DirectoryNotFound(String),

    /// Failure reported by the object store client
    #[error("S3 error: {0}")]
    S3(#[from] S3Error),

    /// Local filesystem failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// True for both missing files and empty prefixes
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::DirectoryNotFound(_))
    }
}

/// Errors raised while building an [`S3Config`](crate::S3Config)
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value '{value}' for {key}")]
    Invalid { key: String, value: String },

    #[error("Invalid configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_kinds() {
        assert!(StorageError::NotFound("a".into()).is_not_found());
        assert!(StorageError::DirectoryNotFound("a/".into()).is_not_found());
        assert!(!StorageError::S3(S3Error::no_such_key("b", "a")).is_not_found());
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            StorageError::NotFound("docs/a.txt".into()).to_string(),
            "No such file: 'docs/a.txt'"
        );
        assert_eq!(
            StorageError::DirectoryNotFound("docs/".into()).to_string(),
            "No such directory: 'docs/'"
        );
    }
}
