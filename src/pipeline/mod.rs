//! The upload-triggered thumbnail pipeline.
//!
//! One invocation per finalize event:
//! filter → stage the source locally → render a 320px JPEG → upload it to
//! `thumbnails/` → append a gallery record. Staged files are released when the
//! invocation ends, whatever the outcome. Failures are absorbed here and
//! reported as an [`Outcome`], never retried.

pub mod filter;
pub mod staging;
pub mod transform;

#[cfg(test)]
pub(crate) mod testing;

use crate::models::{
    event::UploadEvent,
    gallery::{GalleryRecord, NewGalleryRecord},
};
use crate::services::{
    gallery_service::GalleryError,
    storage_service::StorageError,
    traits::{BlobStore, GalleryStore},
};
use bytes::Bytes;
use filter::{AcceptedEvent, FilterConfig, SkipReason};
use image::{ImageError, ImageFormat};
use serde::Serialize;
use staging::StagingDir;
use std::{
    fmt, io,
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::{sync::mpsc::UnboundedReceiver, task::JoinHandle};
use tracing::{debug, error, info};

/// Step that was running when an invocation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Staging,
    Transforming,
    Publishing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Staging => "staging",
            Stage::Transforming => "transforming",
            Stage::Publishing => "publishing",
        })
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to download source object: {0}")]
    Download(#[source] StorageError),
    #[error("local file error while {stage}: {source}")]
    LocalIo {
        stage: Stage,
        #[source]
        source: io::Error,
    },
    #[error("failed to render thumbnail: {0}")]
    Render(#[source] ImageError),
    #[error("thumbnail task did not complete: {0}")]
    RenderTask(#[source] tokio::task::JoinError),
    #[error("failed to upload thumbnail: {0}")]
    Upload(#[source] StorageError),
    #[error("failed to record gallery entry: {0}")]
    Record(#[source] GalleryError),
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Download(_) => Stage::Staging,
            PipelineError::LocalIo { stage, .. } => *stage,
            PipelineError::Render(_) | PipelineError::RenderTask(_) => Stage::Transforming,
            PipelineError::Upload(_) | PipelineError::Record(_) => Stage::Publishing,
        }
    }

    fn local(stage: Stage) -> impl FnOnce(io::Error) -> Self {
        move |source| PipelineError::LocalIo { stage, source }
    }
}

/// How an invocation ended.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Skipped { reason: SkipReason },
    Published { record: GalleryRecord },
    Failed { stage: Stage, message: String },
}

/// The thumbnail pipeline with its collaborators injected.
#[derive(Clone)]
pub struct Pipeline {
    storage: Arc<dyn BlobStore>,
    gallery: Arc<dyn GalleryStore>,
    filter: FilterConfig,
    staging_root: PathBuf,
}

impl Pipeline {
    pub fn new(
        storage: Arc<dyn BlobStore>,
        gallery: Arc<dyn GalleryStore>,
        filter: FilterConfig,
        staging_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            storage,
            gallery,
            filter,
            staging_root: staging_root.into(),
        }
    }

    pub fn staging_root(&self) -> &Path {
        &self.staging_root
    }

    /// Run one invocation for `event`. Never returns an error: skips and
    /// failures are logged and reported in the outcome.
    pub async fn handle(&self, event: UploadEvent) -> Outcome {
        let accepted = match filter::evaluate(&event, &self.filter) {
            Ok(accepted) => accepted,
            Err(reason) => {
                info!(
                    bucket = event.bucket.as_deref().unwrap_or("-"),
                    key = event.name.as_deref().unwrap_or("-"),
                    %reason,
                    "skipping upload event"
                );
                return Outcome::Skipped { reason };
            }
        };

        match self.run(&accepted).await {
            Ok(record) => {
                info!(
                    bucket = %accepted.bucket,
                    key = %accepted.key,
                    thumbnail = %record.thumbnail_path,
                    "thumbnail published"
                );
                Outcome::Published { record }
            }
            Err(err) => {
                let stage = err.stage();
                error!(
                    bucket = %accepted.bucket,
                    key = %accepted.key,
                    %stage,
                    error = %err,
                    "thumbnail generation failed"
                );
                Outcome::Failed {
                    stage,
                    message: err.to_string(),
                }
            }
        }
    }

    async fn run(&self, event: &AcceptedEvent) -> Result<GalleryRecord, PipelineError> {
        // Guards drop in reverse order: thumbnail, source, then the directory.
        let staging = StagingDir::create(&self.staging_root)
            .await
            .map_err(PipelineError::local(Stage::Staging))?;
        debug!(dir = %staging.path().display(), key = %event.key, "staging directory ready");

        let body = self
            .storage
            .download(&event.bucket, &event.key)
            .await
            .map_err(PipelineError::Download)?;
        let source = staging
            .stage(&event.file_name, &body)
            .await
            .map_err(PipelineError::local(Stage::Staging))?;
        drop(body);
        debug!(path = %source.path().display(), "source staged");

        let source_bytes = source
            .read()
            .await
            .map_err(PipelineError::local(Stage::Transforming))?;
        let rendered =
            tokio::task::spawn_blocking(move || transform::render_thumbnail(&source_bytes))
                .await
                .map_err(PipelineError::RenderTask)?
                .map_err(PipelineError::Render)?;
        let thumbnail = staging
            .stage(event.thumbnail_file_name(), &rendered)
            .await
            .map_err(PipelineError::local(Stage::Transforming))?;
        drop(rendered);

        let thumbnail_bytes = thumbnail
            .read()
            .await
            .map_err(PipelineError::local(Stage::Publishing))?;
        self.storage
            .upload(
                &event.bucket,
                &event.thumbnail_key,
                Bytes::from(thumbnail_bytes),
                transform::THUMBNAIL_CONTENT_TYPE,
            )
            .await
            .map_err(PipelineError::Upload)?;

        let record = NewGalleryRecord {
            original_path: event.key.clone(),
            thumbnail_path: event.thumbnail_key.clone(),
            content_type: source_content_type(event),
            size: event.size,
        };
        self.gallery
            .insert(record)
            .await
            .map_err(PipelineError::Record)
    }
}

/// The uploader's content type, or one inferred from the key's extension.
fn source_content_type(event: &AcceptedEvent) -> String {
    event
        .content_type
        .clone()
        .or_else(|| {
            ImageFormat::from_path(&event.key)
                .ok()
                .map(|format| format.to_mime_type().to_string())
        })
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

/// Run one independent invocation per received event until the sender side
/// closes.
pub fn spawn_dispatcher(
    pipeline: Pipeline,
    mut rx: UnboundedReceiver<UploadEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let pipeline = pipeline.clone();
            tokio::spawn(async move {
                pipeline.handle(event).await;
            });
        }
        info!("finalize event channel closed, dispatcher exiting");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::testing::{
        MemoryBlobStore, MemoryGallery, encoded_fixture, jpeg_fixture, tall_png,
    };
    use crate::{
        db::memory_pool,
        services::{gallery_service::GalleryService, storage_service::StorageService},
    };
    use async_trait::async_trait;
    use image::GenericImageView;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct Harness {
        storage: Arc<MemoryBlobStore>,
        gallery: Arc<MemoryGallery>,
        pipeline: Pipeline,
        staging: tempfile::TempDir,
    }

    fn harness(filter: FilterConfig) -> Harness {
        let storage = Arc::new(MemoryBlobStore::default());
        let gallery = Arc::new(MemoryGallery::default());
        let staging = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(storage.clone(), gallery.clone(), filter, staging.path());
        Harness {
            storage,
            gallery,
            pipeline,
            staging,
        }
    }

    impl Harness {
        fn assert_no_side_effects(&self) {
            assert_eq!(self.storage.downloads(), 0);
            assert_eq!(self.storage.uploads(), 0);
            assert!(self.gallery.records().is_empty());
        }

        fn assert_staging_empty(&self) {
            assert_eq!(std::fs::read_dir(self.staging.path()).unwrap().count(), 0);
        }
    }

    fn photo_event() -> UploadEvent {
        UploadEvent::new("b", "gallery/photo.jpg")
            .with_content_type("image/jpeg")
            .with_size(500_000)
    }

    #[tokio::test]
    async fn end_to_end_publishes_thumbnail_and_record() {
        let h = harness(FilterConfig::gallery_scoped());
        h.storage
            .put("b", "gallery/photo.jpg", jpeg_fixture(1000, 800), "image/jpeg");

        let outcome = h.pipeline.handle(photo_event()).await;
        let Outcome::Published { record } = outcome else {
            panic!("expected publish, got {:?}", outcome);
        };

        let thumb = h.storage.get("b", "thumbnails/photo-320.jpg").unwrap();
        assert_eq!(thumb.content_type, "image/jpeg");
        let decoded = image::load_from_memory(&thumb.data).unwrap();
        assert_eq!(decoded.dimensions(), (320, 256));
        let expected = transform::render_thumbnail(&jpeg_fixture(1000, 800)).unwrap();
        assert_eq!(thumb.data, Bytes::from(expected));

        assert_eq!(h.storage.uploads(), 1);
        let records = h.gallery.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0], record);
        assert_eq!(record.original_path, "gallery/photo.jpg");
        assert_eq!(record.thumbnail_path, "thumbnails/photo-320.jpg");
        assert_eq!(record.content_type, "image/jpeg");
        assert_eq!(record.size, Some(500_000));

        h.assert_staging_empty();
    }

    #[tokio::test]
    async fn png_source_maps_to_jpeg_thumbnail_key() {
        let h = harness(FilterConfig::unscoped());
        h.storage.put(
            "b",
            "gallery/sunset.png",
            encoded_fixture(640, 480, ImageFormat::Png),
            "image/png",
        );

        let outcome = h
            .pipeline
            .handle(UploadEvent::new("b", "gallery/sunset.png").with_content_type("image/png"))
            .await;

        assert!(matches!(outcome, Outcome::Published { .. }));
        let thumb = h.storage.get("b", "thumbnails/sunset-320.jpg").unwrap();
        assert_eq!(image::load_from_memory(&thumb.data).unwrap().dimensions(), (320, 240));
        assert_eq!(h.gallery.records()[0].size, None);
    }

    #[tokio::test]
    async fn missing_content_type_is_inferred_from_extension() {
        let h = harness(FilterConfig::unscoped());
        h.storage
            .put("b", "gallery/toast.jpg", jpeg_fixture(400, 300), "");

        let outcome = h
            .pipeline
            .handle(UploadEvent::new("b", "gallery/toast.jpg"))
            .await;
        let Outcome::Published { record } = outcome else {
            panic!("expected publish, got {:?}", outcome);
        };
        assert_eq!(record.content_type, "image/jpeg");
    }

    #[tokio::test]
    async fn events_without_bucket_or_name_do_nothing() {
        let h = harness(FilterConfig::unscoped());

        let mut no_bucket = photo_event();
        no_bucket.bucket = None;
        let mut no_name = photo_event();
        no_name.name = None;

        for event in [no_bucket, no_name, UploadEvent::default()] {
            let outcome = h.pipeline.handle(event).await;
            assert!(matches!(outcome, Outcome::Skipped { .. }));
        }
        h.assert_no_side_effects();
        h.assert_staging_empty();
    }

    #[tokio::test]
    async fn thumbnails_never_retrigger() {
        let h = harness(FilterConfig::unscoped());
        h.storage
            .put("b", "thumbnails/photo-320.jpg", jpeg_fixture(320, 256), "image/jpeg");

        let outcome = h
            .pipeline
            .handle(UploadEvent::new("b", "thumbnails/photo-320.jpg").with_content_type("image/jpeg"))
            .await;

        assert!(matches!(
            outcome,
            Outcome::Skipped {
                reason: SkipReason::DerivedOutput
            }
        ));
        h.assert_no_side_effects();
    }

    #[tokio::test]
    async fn non_image_uploads_do_nothing() {
        let h = harness(FilterConfig::unscoped());
        h.storage.put("b", "gallery/notes.txt", "hello", "text/plain");

        let outcome = h
            .pipeline
            .handle(UploadEvent::new("b", "gallery/notes.txt").with_content_type("text/plain"))
            .await;

        assert!(matches!(
            outcome,
            Outcome::Skipped {
                reason: SkipReason::NotAnImage
            }
        ));
        h.assert_no_side_effects();
    }

    #[tokio::test]
    async fn scoped_pipeline_ignores_other_prefixes() {
        let h = harness(FilterConfig::gallery_scoped());
        h.storage
            .put("b", "avatars/me.jpg", jpeg_fixture(100, 100), "image/jpeg");

        let outcome = h
            .pipeline
            .handle(UploadEvent::new("b", "avatars/me.jpg").with_content_type("image/jpeg"))
            .await;

        assert!(matches!(
            outcome,
            Outcome::Skipped {
                reason: SkipReason::OutOfScope
            }
        ));
        h.assert_no_side_effects();
    }

    #[tokio::test]
    async fn undecodable_image_is_absorbed_without_side_effects() {
        let h = harness(FilterConfig::unscoped());
        h.storage
            .put("b", "gallery/empty.jpg", Vec::<u8>::new(), "image/jpeg");
        h.storage
            .put("b", "gallery/garbage.jpg", "not really a jpeg", "image/jpeg");

        for key in ["gallery/empty.jpg", "gallery/garbage.jpg"] {
            let outcome = h
                .pipeline
                .handle(UploadEvent::new("b", key).with_content_type("image/jpeg"))
                .await;
            assert!(
                matches!(
                    outcome,
                    Outcome::Failed {
                        stage: Stage::Transforming,
                        ..
                    }
                ),
                "{key}: {outcome:?}"
            );
        }

        assert_eq!(h.storage.uploads(), 0);
        assert_eq!(h.storage.object_count(), 2);
        assert!(h.gallery.records().is_empty());
        h.assert_staging_empty();
    }

    #[tokio::test]
    async fn unencodable_thumbnail_height_fails_while_transforming() {
        let h = harness(FilterConfig::unscoped());
        h.storage
            .put("b", "gallery/sliver.png", tall_png(1, 20_000), "image/png");

        let outcome = h
            .pipeline
            .handle(UploadEvent::new("b", "gallery/sliver.png").with_content_type("image/png"))
            .await;

        assert!(matches!(
            outcome,
            Outcome::Failed {
                stage: Stage::Transforming,
                ..
            }
        ));
        assert_eq!(h.storage.uploads(), 0);
        assert!(h.gallery.records().is_empty());
        h.assert_staging_empty();
    }

    /// Swaps every staged `photo.jpg` for a non-empty directory on upload, so
    /// releasing the staged source fails with something other than NotFound.
    struct BlockingRelease {
        inner: Arc<MemoryBlobStore>,
        staging_root: PathBuf,
    }

    #[async_trait]
    impl BlobStore for BlockingRelease {
        async fn download(&self, bucket: &str, key: &str) -> Result<Bytes, StorageError> {
            self.inner.download(bucket, key).await
        }

        async fn upload(
            &self,
            bucket: &str,
            key: &str,
            data: Bytes,
            content_type: &str,
        ) -> Result<(), StorageError> {
            for dir in std::fs::read_dir(&self.staging_root)? {
                let staged = dir?.path().join("photo.jpg");
                std::fs::remove_file(&staged)?;
                std::fs::create_dir(&staged)?;
                std::fs::write(staged.join("keep"), b"x")?;
            }
            self.inner.upload(bucket, key, data, content_type).await
        }
    }

    #[tokio::test]
    async fn failed_release_does_not_change_the_outcome() {
        let storage = Arc::new(MemoryBlobStore::default());
        let gallery = Arc::new(MemoryGallery::default());
        let staging = tempfile::tempdir().unwrap();
        storage.put("b", "gallery/photo.jpg", jpeg_fixture(600, 400), "image/jpeg");

        let blocking = Arc::new(BlockingRelease {
            inner: storage.clone(),
            staging_root: staging.path().to_path_buf(),
        });
        let pipeline = Pipeline::new(
            blocking,
            gallery.clone(),
            FilterConfig::unscoped(),
            staging.path(),
        );

        let outcome = pipeline.handle(photo_event()).await;

        assert!(matches!(outcome, Outcome::Published { .. }), "{outcome:?}");
        assert!(storage.get("b", "thumbnails/photo-320.jpg").is_some());
        assert_eq!(gallery.records().len(), 1);
        // The directory guard still sweeps what the file guard could not.
        assert_eq!(std::fs::read_dir(staging.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn missing_source_fails_while_staging() {
        let h = harness(FilterConfig::unscoped());

        let outcome = h.pipeline.handle(photo_event()).await;

        assert!(matches!(
            outcome,
            Outcome::Failed {
                stage: Stage::Staging,
                ..
            }
        ));
        assert_eq!(h.storage.downloads(), 1);
        assert!(h.gallery.records().is_empty());
        h.assert_staging_empty();
    }

    #[tokio::test]
    async fn failed_upload_writes_no_record() {
        let h = harness(FilterConfig::unscoped());
        h.storage
            .put("b", "gallery/photo.jpg", jpeg_fixture(600, 400), "image/jpeg");
        h.storage.fail_uploads();

        let outcome = h.pipeline.handle(photo_event()).await;

        let Outcome::Failed { stage, message } = outcome else {
            panic!("expected failure, got {:?}", outcome);
        };
        assert_eq!(stage, Stage::Publishing);
        assert!(message.contains("quota exceeded"));
        assert!(h.storage.get("b", "thumbnails/photo-320.jpg").is_none());
        assert!(h.gallery.records().is_empty());
        h.assert_staging_empty();
    }

    #[tokio::test]
    async fn failed_record_leaves_orphan_thumbnail() {
        let h = harness(FilterConfig::unscoped());
        h.storage
            .put("b", "gallery/photo.jpg", jpeg_fixture(600, 400), "image/jpeg");
        h.gallery.fail_inserts();

        let outcome = h.pipeline.handle(photo_event()).await;

        assert!(matches!(
            outcome,
            Outcome::Failed {
                stage: Stage::Publishing,
                ..
            }
        ));
        assert!(h.storage.get("b", "thumbnails/photo-320.jpg").is_some());
        assert!(h.gallery.records().is_empty());
        h.assert_staging_empty();
    }

    #[tokio::test]
    async fn duplicate_events_produce_duplicate_records() {
        let h = harness(FilterConfig::unscoped());
        h.storage
            .put("b", "gallery/photo.jpg", jpeg_fixture(1000, 800), "image/jpeg");

        h.pipeline.handle(photo_event()).await;
        h.pipeline.handle(photo_event()).await;

        let records = h.gallery.records();
        assert_eq!(records.len(), 2);
        assert_ne!(records[0].id, records[1].id);
        assert!(
            records
                .iter()
                .all(|r| r.thumbnail_path == "thumbnails/photo-320.jpg")
        );
        assert_eq!(h.storage.uploads(), 2);
        // source plus the single overwritten thumbnail
        assert_eq!(h.storage.object_count(), 2);
    }

    #[tokio::test]
    async fn dispatcher_processes_store_notifications_once() {
        let pool = Arc::new(memory_pool().await);
        let objects = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();

        let (tx, rx) = mpsc::unbounded_channel();
        let storage = StorageService::new(pool.clone(), objects.path()).with_notifier(tx);
        storage.create_bucket("wedding").await.unwrap();
        let gallery = Arc::new(GalleryService::new(pool.clone()));

        let pipeline = Pipeline::new(
            Arc::new(storage.clone()),
            gallery.clone(),
            FilterConfig::gallery_scoped(),
            staging.path(),
        );
        let dispatcher = spawn_dispatcher(pipeline, rx);

        storage
            .upload_object_bytes(
                "wedding",
                "gallery/vows.jpg",
                Some("image/jpeg".into()),
                Bytes::from(jpeg_fixture(800, 600)),
            )
            .await
            .unwrap();

        let records = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let records = gallery.list(10).await.unwrap();
                if !records.is_empty() {
                    return records;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(records[0].thumbnail_path, "thumbnails/vows-320.jpg");
        assert_eq!(records[0].size, Some(jpeg_fixture(800, 600).len() as i64));

        let thumb = storage
            .read_object("wedding", "thumbnails/vows-320.jpg")
            .await
            .unwrap();
        assert_eq!(image::load_from_memory(&thumb).unwrap().dimensions(), (320, 240));

        // The thumbnail write is itself announced and must be skipped.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(gallery.list(10).await.unwrap().len(), 1);

        dispatcher.abort();
    }
}
