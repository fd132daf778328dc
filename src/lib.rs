//! File storage on S3-compatible object stores
//!
//! [`S3Storage`] implements the [`Storage`] interface (upload, download,
//! streaming reads, listing, deletion, existence and size checks, pre-signed
//! links) on top of an [`ObjectClient`](s3::ObjectClient). The default client
//! wraps the AWS SDK; [`MemoryClient`](s3::MemoryClient) keeps everything in
//! memory.
//!
//! ```no_run
//! use s3_storage::{S3Config, S3Storage, Storage};
//!
//! # async fn run() -> s3_storage::Result<()> {
//! let storage = S3Storage::new(S3Config::default()).await;
//! if storage.file_exists("reports/2024.pdf").await? {
//!     println!("{}", storage.get_link("reports/2024.pdf").await?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod s3;
pub mod storage;
pub mod stream;

pub use config::S3Config;
pub use error::{ConfigError, Result, StorageError};
pub use s3::S3Storage;
pub use storage::{DeleteFileError, DeleteFilesResponse, Storage};
pub use stream::FileStream;
