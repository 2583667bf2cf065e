//! GalleryService — append-only gallery collection in SQLite.
//!
//! `created_at` comes from the column default, so the timestamp is assigned by
//! the database rather than by whichever process performed the insert.

use crate::models::gallery::{GalleryRecord, NewGalleryRecord};
use crate::services::traits::GalleryStore;
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum GalleryError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

#[derive(Clone)]
pub struct GalleryService {
    pub db: Arc<SqlitePool>,
}

impl GalleryService {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl GalleryStore for GalleryService {
    async fn insert(&self, record: NewGalleryRecord) -> Result<GalleryRecord, GalleryError> {
        let inserted = sqlx::query_as::<_, GalleryRecord>(
            r#"
            INSERT INTO gallery (id, original_path, thumbnail_path, content_type, size)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id, original_path, thumbnail_path, content_type, size, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&record.original_path)
        .bind(&record.thumbnail_path)
        .bind(&record.content_type)
        .bind(record.size)
        .fetch_one(&*self.db)
        .await?;

        Ok(inserted)
    }

    async fn list(&self, limit: usize) -> Result<Vec<GalleryRecord>, GalleryError> {
        let rows = sqlx::query_as::<_, GalleryRecord>(
            "SELECT id, original_path, thumbnail_path, content_type, size, created_at
             FROM gallery
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&*self.db)
        .await?;

        Ok(rows)
    }
}
