//! Push endpoints for finalize notifications coming from outside the process.
//!
//! Both adapters always answer 200 with the invocation outcome: the platform
//! must not redeliver, whatever happened. A body that does not decode becomes
//! an event with every field missing, which the filter skips.

use crate::{
    models::event::{PubSubEnvelope, StorageObjectPayload, UploadEvent},
    pipeline::Outcome,
    state::AppState,
};
use axum::{Json, extract::State, extract::rejection::JsonRejection};

/// `POST /events/storage` — a storage object resource as the request body.
pub async fn storage_event(
    State(state): State<AppState>,
    payload: Result<Json<StorageObjectPayload>, JsonRejection>,
) -> Json<Outcome> {
    let event = match payload {
        Ok(Json(payload)) => UploadEvent::from(payload),
        Err(rejection) => {
            tracing::warn!("undecodable storage event: {}", rejection.body_text());
            UploadEvent::default()
        }
    };
    Json(state.pipeline.handle(event).await)
}

/// `POST /events/pubsub` — a Pub/Sub push envelope wrapping the object resource.
pub async fn pubsub_event(
    State(state): State<AppState>,
    envelope: Result<Json<PubSubEnvelope>, JsonRejection>,
) -> Json<Outcome> {
    let envelope = match envelope {
        Ok(Json(envelope)) => envelope,
        Err(rejection) => {
            tracing::warn!("undecodable pubsub envelope: {}", rejection.body_text());
            return Json(state.pipeline.handle(UploadEvent::default()).await);
        }
    };

    let message_id = envelope.message.message_id.clone();
    tracing::debug!(
        subscription = envelope.subscription.as_deref().unwrap_or("-"),
        message_id = message_id.as_deref().unwrap_or("-"),
        "pubsub push received"
    );
    let event = match envelope.message.into_event() {
        Ok(event) => event,
        Err(err) => {
            tracing::warn!(
                message_id = message_id.as_deref().unwrap_or("-"),
                "undecodable pubsub message: {}",
                err
            );
            UploadEvent::default()
        }
    };
    Json(state.pipeline.handle(event).await)
}
