//! Local filesystem storage provider (spec §4.6 "local filesystem under a
//! configured base directory"). Uploads are written to a sibling `.part`
//! file and renamed into place only on stream completion, so a failed or
//! cancelled create never leaves a half-written key reachable.

use async_trait::async_trait;
use futures_util::StreamExt;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use crate::error::{CoreError, CoreResult};

use super::{ByteStream, StorageMetadata, StorageProvider};

pub struct FilesystemStorage {
    base_path: PathBuf,
}

impl FilesystemStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self { base_path: base_path.into() }
    }

    fn resolve(&self, key: &str) -> CoreResult<PathBuf> {
        if key.contains("..") {
            return Err(CoreError::Invariant(format!("storage key {key:?} must not contain '..'")));
        }
        Ok(self.base_path.join(key))
    }
}

#[async_trait]
impl StorageProvider for FilesystemStorage {
    async fn upload(&self, key: &str, mut stream: ByteStream) -> CoreResult<String> {
        let target = self.resolve(key)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| CoreError::Other(e.into()))?;
        }
        let tmp_path = target.with_extension("part");
        let mut file = tokio::fs::File::create(&tmp_path).await.map_err(|e| CoreError::Other(e.into()))?;

        let write_result: CoreResult<()> = async {
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| CoreError::Other(e.into()))?;
                file.write_all(&chunk).await.map_err(|e| CoreError::Other(e.into()))?;
            }
            file.flush().await.map_err(|e| CoreError::Other(e.into()))?;
            Ok(())
        }
        .await;

        if let Err(err) = write_result {
            tokio::fs::remove_file(&tmp_path).await.ok();
            return Err(err);
        }

        tokio::fs::rename(&tmp_path, &target).await.map_err(|e| CoreError::Other(e.into()))?;
        Ok(key.to_string())
    }

    async fn download(&self, storage_path: &str) -> CoreResult<ByteStream> {
        let path = self.resolve(storage_path)?;
        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| CoreError::NotFound(format!("{storage_path}: {e}")))?;
        let stream = ReaderStream::new(file).boxed();
        Ok(stream)
    }

    async fn delete(&self, storage_path: &str) -> CoreResult<()> {
        let path = self.resolve(storage_path)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CoreError::Other(e.into())),
        }
    }

    async fn exists(&self, storage_path: &str) -> CoreResult<bool> {
        let path = self.resolve(storage_path)?;
        Ok(tokio::fs::metadata(&path).await.is_ok())
    }

    async fn metadata(&self, storage_path: &str) -> CoreResult<StorageMetadata> {
        let path = self.resolve(storage_path)?;
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| CoreError::NotFound(format!("{storage_path}: {e}")))?;
        let modified = meta.modified().map_err(|e| CoreError::Other(e.into()))?;
        Ok(StorageMetadata {
            size_bytes: meta.len(),
            last_modified: chrono::DateTime::from(modified),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures_util::stream;

    fn byte_stream(chunks: Vec<&'static [u8]>) -> ByteStream {
        stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from(c)))).boxed()
    }

    #[tokio::test]
    async fn upload_then_download_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FilesystemStorage::new(dir.path());

        let path = storage.upload("snapshots/a.tar.gz", byte_stream(vec![b"hello ", b"world"])).await.unwrap();
        assert!(storage.exists(&path).await.unwrap());

        let mut downloaded = storage.download(&path).await.unwrap();
        let mut bytes = Vec::new();
        while let Some(chunk) = downloaded.next().await {
            bytes.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(bytes, b"hello world");
    }

    #[tokio::test]
    async fn rejects_keys_that_escape_the_base_directory() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FilesystemStorage::new(dir.path());
        let result = storage.upload("../escape.tar.gz", byte_stream(vec![b"x"])).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FilesystemStorage::new(dir.path());
        storage.delete("missing.tar.gz").await.unwrap();
    }
}
