pub mod client;
pub mod error;
pub mod memory;
pub mod multipart;
pub mod presign;
pub mod storage;

pub use client::{AwsClient, ObjectBody, ObjectClient, ObjectEntry, ObjectStat};
pub use error::S3Error;
pub use memory::MemoryClient;
pub use presign::{generate_presigned_url, MAX_PRESIGN_EXPIRY};
pub use storage::{S3Storage, LINK_EXPIRY};
