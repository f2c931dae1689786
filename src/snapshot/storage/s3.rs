//! S3-compatible object storage provider (spec §4.6 "object store with
//! S3-compatible API, with optional custom endpoint for self-hosted").

use async_trait::async_trait;
use aws_sdk_s3::config::{Credentials, Region, SharedCredentialsProvider};
use aws_sdk_s3::primitives::ByteStream as AwsByteStream;
use aws_sdk_s3::Client;
use futures_util::StreamExt;

use crate::config::S3StorageConfig;
use crate::error::{CoreError, CoreResult};

use super::{ByteStream, StorageMetadata, StorageProvider};

pub struct S3Storage {
    client: Client,
    bucket: String,
}

impl S3Storage {
    pub async fn new(config: &S3StorageConfig) -> CoreResult<Self> {
        let credentials = Credentials::new(&config.access_key, &config.secret_key, None, None, "pinacle-snapshot");
        let mut builder = aws_sdk_s3::config::Builder::new()
            .region(Region::new(config.region.clone()))
            .credentials_provider(SharedCredentialsProvider::new(credentials))
            .force_path_style(true)
            .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest());
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint.clone());
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
        })
    }
}

#[async_trait]
impl StorageProvider for S3Storage {
    async fn upload(&self, key: &str, mut stream: ByteStream) -> CoreResult<String> {
        // The SDK wants ownership of the whole body for a single PutObject;
        // buffering here keeps the "commit only on stream completion"
        // invariant simple (no partial key is ever visible under `key`).
        let mut buffer = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| CoreError::Other(e.into()))?;
            buffer.extend_from_slice(&chunk);
        }

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(AwsByteStream::from(buffer))
            .send()
            .await
            .map_err(|e| CoreError::transient(format!("s3 put_object {key}: {e}")))?;
        Ok(key.to_string())
    }

    async fn download(&self, storage_path: &str) -> CoreResult<ByteStream> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(storage_path)
            .send()
            .await
            .map_err(|e| CoreError::NotFound(format!("{storage_path}: {e}")))?;

        let stream = output
            .body
            .map(|result| result.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)))
            .boxed();
        Ok(stream)
    }

    async fn delete(&self, storage_path: &str) -> CoreResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(storage_path)
            .send()
            .await
            .map_err(|e| CoreError::transient(format!("s3 delete_object {storage_path}: {e}")))?;
        Ok(())
    }

    async fn exists(&self, storage_path: &str) -> CoreResult<bool> {
        // A 404 and a genuine transport failure both surface as `Err` from
        // the SDK; since `exists` is only ever used as a pre-flight check
        // before `download`/`delete`, treating any failure as "absent" is
        // safe here.
        Ok(self.client.head_object().bucket(&self.bucket).key(storage_path).send().await.is_ok())
    }

    async fn metadata(&self, storage_path: &str) -> CoreResult<StorageMetadata> {
        let head = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(storage_path)
            .send()
            .await
            .map_err(|e| CoreError::NotFound(format!("{storage_path}: {e}")))?;

        let last_modified = head
            .last_modified()
            .and_then(|dt| chrono::DateTime::from_timestamp(dt.secs(), 0))
            .unwrap_or_else(chrono::Utc::now);

        Ok(StorageMetadata {
            size_bytes: head.content_length().unwrap_or(0) as u64,
            last_modified,
        })
    }
}
