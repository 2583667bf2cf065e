//! Defines routes for the gallery upload store.
//!
//! ## Structure
//! - **Probes**
//!   - `GET    /healthz`, `GET /readyz`
//!
//! - **Finalize push adapters**
//!   - `POST   /events/storage` — storage object resource
//!   - `POST   /events/pubsub`  — Pub/Sub push envelope
//!
//! - **Gallery**
//!   - `GET    /gallery` — records, newest first
//!
//! - **Bucket and object endpoints**
//!   - `PUT    /{bucket}` — create bucket
//!   - `PUT    /{bucket}/{*key}` — upload object (rate limited, fires finalize)
//!   - `GET    /{bucket}/{*key}` — download object
//!   - `HEAD   /{bucket}/{*key}` — retrieve metadata only
//!
//! The wildcard `*key` allows nested keys like `gallery/2025/img.jpg`.
//! Bucket names that collide with the fixed routes are refused at creation.

use crate::{
    handlers::{
        event_handlers::{pubsub_event, storage_event},
        gallery_handlers::list_gallery,
        health_handlers::{healthz, readyz},
        object_handlers::{create_bucket, get_object, head_object, upload_object},
    },
    state::AppState,
};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Build and return the router. Static paths are matched before the
/// `/{bucket}` captures.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/events/storage", post(storage_event))
        .route("/events/pubsub", post(pubsub_event))
        .route("/gallery", get(list_gallery))
        .route(
            "/{bucket}/{*key}",
            put(upload_object).get(get_object).head(head_object),
        )
        .route("/{bucket}", put(create_bucket))
}
