//! Decides whether a finalize notification should produce a thumbnail.
//!
//! Rules run in order and the first match wins. The structural checks come
//! before the content type is looked at, so malformed events never reach
//! storage.

use crate::models::event::UploadEvent;
use serde::Serialize;
use std::{fmt, path::Path};

/// Prefix reserved for generated thumbnails.
pub const THUMBNAIL_PREFIX: &str = "thumbnails/";

/// Source prefix used by the gallery-scoped deployment.
pub const GALLERY_PREFIX: &str = "gallery/";

/// Output width in pixels, also the literal suffix of every thumbnail key.
pub const THUMBNAIL_WIDTH: u32 = 320;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterConfig {
    /// Only keys under this prefix are processed. `None` accepts any prefix.
    pub scope_prefix: Option<String>,
}

impl FilterConfig {
    pub fn unscoped() -> Self {
        Self { scope_prefix: None }
    }

    pub fn gallery_scoped() -> Self {
        Self {
            scope_prefix: Some(GALLERY_PREFIX.to_string()),
        }
    }
}

/// Why an event was ignored. Skips are not failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MissingBucket,
    MissingName,
    DerivedOutput,
    OutOfScope,
    NotAnImage,
    NoFileName,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::MissingBucket => "event has no bucket",
            SkipReason::MissingName => "event has no object name",
            SkipReason::DerivedOutput => "object is a generated thumbnail",
            SkipReason::OutOfScope => "object is outside the configured prefix",
            SkipReason::NotAnImage => "content type is not an image",
            SkipReason::NoFileName => "object name has no file name",
        };
        f.write_str(text)
    }
}

/// An event that passed the filter, with everything the later stages need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedEvent {
    pub bucket: String,
    pub key: String,
    pub content_type: Option<String>,
    pub size: Option<i64>,
    /// Last path segment of `key`, used to name the staged source copy.
    pub file_name: String,
    /// `thumbnails/<stem>-320.jpg`
    pub thumbnail_key: String,
}

impl AcceptedEvent {
    /// Local file name for the rendered thumbnail.
    pub fn thumbnail_file_name(&self) -> &str {
        self.thumbnail_key
            .strip_prefix(THUMBNAIL_PREFIX)
            .unwrap_or(&self.thumbnail_key)
    }
}

/// Apply the acceptance rules to `event`.
pub fn evaluate(event: &UploadEvent, config: &FilterConfig) -> Result<AcceptedEvent, SkipReason> {
    let bucket = match event.bucket.as_deref() {
        Some(b) if !b.is_empty() => b,
        _ => return Err(SkipReason::MissingBucket),
    };
    let key = match event.name.as_deref() {
        Some(k) if !k.is_empty() => k,
        _ => return Err(SkipReason::MissingName),
    };

    if key.starts_with(THUMBNAIL_PREFIX) {
        return Err(SkipReason::DerivedOutput);
    }

    if let Some(prefix) = config.scope_prefix.as_deref() {
        if !key.starts_with(prefix) {
            return Err(SkipReason::OutOfScope);
        }
    }

    if let Some(content_type) = event.content_type.as_deref() {
        if !content_type.starts_with("image/") {
            return Err(SkipReason::NotAnImage);
        }
    }

    let file_name = Path::new(key)
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or(SkipReason::NoFileName)?;
    let thumbnail_key = thumbnail_key(key).ok_or(SkipReason::NoFileName)?;

    Ok(AcceptedEvent {
        bucket: bucket.to_string(),
        key: key.to_string(),
        content_type: event.content_type.clone(),
        size: event.size,
        file_name: file_name.to_string(),
        thumbnail_key,
    })
}

/// Derive the thumbnail key for a source key.
///
/// The source directory and extension are dropped:
/// `gallery/sunset.png` becomes `thumbnails/sunset-320.jpg`.
pub fn thumbnail_key(source_key: &str) -> Option<String> {
    let stem = Path::new(source_key).file_stem()?.to_str()?;
    Some(format!("{}{}-{}.jpg", THUMBNAIL_PREFIX, stem, THUMBNAIL_WIDTH))
}
