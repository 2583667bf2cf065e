//! Collaborator seams for the thumbnail pipeline.
//!
//! The pipeline only ever talks to a blob store and a gallery document store
//! through these traits, so production clients and in-memory fakes are
//! interchangeable.

use crate::models::gallery::{GalleryRecord, NewGalleryRecord};
use crate::services::{gallery_service::GalleryError, storage_service::StorageError};
use async_trait::async_trait;
use bytes::Bytes;

/// Object storage addressed by bucket and key.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Read the full body of an object.
    async fn download(&self, bucket: &str, key: &str) -> Result<Bytes, StorageError>;

    /// Write an object, replacing any existing one under the same key.
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError>;
}

/// Append-only collection of gallery records.
#[async_trait]
pub trait GalleryStore: Send + Sync {
    /// Insert a record; the store assigns its id and creation timestamp.
    async fn insert(&self, record: NewGalleryRecord) -> Result<GalleryRecord, GalleryError>;

    /// Most recent records first.
    async fn list(&self, limit: usize) -> Result<Vec<GalleryRecord>, GalleryError>;
}
