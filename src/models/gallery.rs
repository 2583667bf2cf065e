//! Gallery documents appended after a thumbnail is published.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A gallery record as stored, with its server-assigned creation time.
///
/// Records are append-only: nothing in this service updates or deletes them.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GalleryRecord {
    pub id: Uuid,

    /// Key of the uploaded source image.
    pub original_path: String,

    /// Key of the generated thumbnail in the same bucket.
    pub thumbnail_path: String,

    /// MIME type of the source image.
    pub content_type: String,

    /// Source size in bytes, when the notification carried it.
    pub size: Option<i64>,

    /// Assigned by the document store at insert time.
    pub created_at: DateTime<Utc>,
}

/// The fields the pipeline supplies when appending a record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewGalleryRecord {
    pub original_path: String,
    pub thumbnail_path: String,
    pub content_type: String,
    pub size: Option<i64>,
}
