//! Storage provider contract (spec §4.6 "Storage provider contract").

pub mod filesystem;
pub mod s3;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;

use crate::error::CoreResult;

pub use filesystem::FilesystemStorage;
pub use s3::S3Storage;

#[derive(Debug, Clone)]
pub struct StorageMetadata {
    pub size_bytes: u64,
    pub last_modified: DateTime<Utc>,
}

pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

#[async_trait]
pub trait StorageProvider: Send + Sync {
    async fn upload(&self, key: &str, stream: ByteStream) -> CoreResult<String>;
    async fn download(&self, storage_path: &str) -> CoreResult<ByteStream>;
    async fn delete(&self, storage_path: &str) -> CoreResult<()>;
    async fn exists(&self, storage_path: &str) -> CoreResult<bool>;
    async fn metadata(&self, storage_path: &str) -> CoreResult<StorageMetadata>;
}
