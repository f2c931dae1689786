//! Snapshot Engine (spec §4.6, C6): archive format, object storage
//! backends, and the create/restore orchestration built on top of them.

pub mod archive;
pub mod engine;
pub mod storage;

pub use engine::SnapshotEngine;
pub use storage::{ByteStream, FilesystemStorage, S3Storage, StorageMetadata, StorageProvider};
