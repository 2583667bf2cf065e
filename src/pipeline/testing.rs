//! In-memory collaborators and image fixtures for pipeline tests.

use crate::models::gallery::{GalleryRecord, NewGalleryRecord};
use crate::services::{
    gallery_service::GalleryError,
    storage_service::StorageError,
    traits::{BlobStore, GalleryStore},
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgb, RgbImage, Rgba, RgbaImage};
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    io::{self, Cursor},
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};
use uuid::Uuid;

/// Gradient JPEG of the given size.
pub fn jpeg_fixture(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    encode(DynamicImage::ImageRgb8(img), ImageFormat::Jpeg)
}

/// Translucent RGBA image encoded in `format`.
pub fn encoded_fixture(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba([200, 30, 90, 128]));
    encode(DynamicImage::ImageRgba8(img), format)
}

/// Grayscale PNG, for extreme aspect ratios.
pub fn tall_png(width: u32, height: u32) -> Vec<u8> {
    let img = GrayImage::from_fn(width, height, |_, y| Luma([(y % 256) as u8]));
    encode(DynamicImage::ImageLuma8(img), ImageFormat::Png)
}

fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, format).unwrap();
    out.into_inner()
}

#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub data: Bytes,
    pub content_type: String,
}

#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<(String, String), StoredBlob>>,
    downloads: AtomicUsize,
    uploads: AtomicUsize,
    fail_uploads: AtomicBool,
}

impl MemoryBlobStore {
    pub fn put(&self, bucket: &str, key: &str, data: impl Into<Bytes>, content_type: &str) {
        self.objects.lock().insert(
            (bucket.to_string(), key.to_string()),
            StoredBlob {
                data: data.into(),
                content_type: content_type.to_string(),
            },
        );
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<StoredBlob> {
        self.objects
            .lock()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().len()
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn fail_uploads(&self) {
        self.fail_uploads.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn download(&self, bucket: &str, key: &str) -> Result<Bytes, StorageError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        self.get(bucket, key)
            .map(|blob| blob.data)
            .ok_or_else(|| StorageError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(StorageError::Io(io::Error::new(
                io::ErrorKind::Other,
                "quota exceeded",
            )));
        }
        self.uploads.fetch_add(1, Ordering::SeqCst);
        self.put(bucket, key, data, content_type);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryGallery {
    records: Mutex<Vec<GalleryRecord>>,
    fail_inserts: AtomicBool,
}

impl MemoryGallery {
    pub fn records(&self) -> Vec<GalleryRecord> {
        self.records.lock().clone()
    }

    pub fn fail_inserts(&self) {
        self.fail_inserts.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl GalleryStore for MemoryGallery {
    async fn insert(&self, record: NewGalleryRecord) -> Result<GalleryRecord, GalleryError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(GalleryError::Sqlx(sqlx::Error::PoolTimedOut));
        }
        let stored = GalleryRecord {
            id: Uuid::new_v4(),
            original_path: record.original_path,
            thumbnail_path: record.thumbnail_path,
            content_type: record.content_type,
            size: record.size,
            created_at: Utc::now(),
        };
        self.records.lock().push(stored.clone());
        Ok(stored)
    }

    async fn list(&self, limit: usize) -> Result<Vec<GalleryRecord>, GalleryError> {
        Ok(self
            .records
            .lock()
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }
}
