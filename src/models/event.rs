//! Finalize notifications emitted when an object upload completes.
//!
//! `UploadEvent` is the normalized form the pipeline consumes. The wire types
//! below it mirror what a cloud storage trigger actually delivers, either as a
//! plain object resource or wrapped in a Pub/Sub push envelope.

use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A finalize notification as seen by the pipeline.
///
/// Every field is optional because the platform does not promise any of them;
/// the event filter decides what a usable event looks like.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct UploadEvent {
    /// Bucket the object was written to.
    pub bucket: Option<String>,

    /// Object key within the bucket.
    pub name: Option<String>,

    /// MIME type reported by the uploader, if any.
    pub content_type: Option<String>,

    /// Object size in bytes.
    pub size: Option<i64>,
}

impl UploadEvent {
    pub fn new(bucket: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            bucket: Some(bucket.into()),
            name: Some(name.into()),
            content_type: None,
            size: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_size(mut self, size: i64) -> Self {
        self.size = Some(size);
        self
    }
}

/// Object size as it appears on the wire.
///
/// Storage object resources encode `size` as a decimal string, while other
/// emitters send a plain number. Anything else is carried along and ignored.
#[derive(Deserialize, Clone, Debug)]
#[serde(untagged)]
pub enum WireSize {
    Number(i64),
    Text(String),
    Other(serde_json::Value),
}

impl WireSize {
    fn into_bytes(self) -> Option<i64> {
        match self {
            WireSize::Number(n) => Some(n),
            WireSize::Text(s) => s.trim().parse().ok(),
            WireSize::Other(_) => None,
        }
    }
}

/// The storage object resource delivered by a finalize trigger.
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct StorageObjectPayload {
    pub bucket: Option<String>,
    pub name: Option<String>,
    pub content_type: Option<String>,
    pub size: Option<WireSize>,
}

impl From<StorageObjectPayload> for UploadEvent {
    fn from(payload: StorageObjectPayload) -> Self {
        Self {
            bucket: non_empty(payload.bucket),
            name: non_empty(payload.name),
            content_type: non_empty(payload.content_type),
            size: payload.size.and_then(WireSize::into_bytes),
        }
    }
}

/// Pub/Sub push delivery wrapping a storage object resource.
#[derive(Deserialize, Clone, Debug)]
pub struct PubSubEnvelope {
    pub message: PubSubMessage,
    pub subscription: Option<String>,
}

#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PubSubMessage {
    /// Base64-encoded JSON object resource.
    pub data: Option<String>,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    pub message_id: Option<String>,
}

impl PubSubMessage {
    /// Decode the message into an upload event.
    ///
    /// Falls back to the `bucketId` / `objectId` notification attributes when the
    /// payload is absent or cannot be decoded.
    pub fn into_event(self) -> Result<UploadEvent, String> {
        let decoded = match self.data.as_deref() {
            Some(data) if !data.is_empty() => general_purpose::STANDARD
                .decode(data)
                .map_err(|err| format!("invalid base64 payload: {}", err))
                .and_then(|bytes| {
                    serde_json::from_slice::<StorageObjectPayload>(&bytes)
                        .map_err(|err| format!("invalid object payload: {}", err))
                }),
            _ => Ok(StorageObjectPayload::default()),
        };

        let mut attributes = self.attributes;
        let (payload, failure) = match decoded {
            Ok(payload) => (payload, None),
            Err(err) => (StorageObjectPayload::default(), Some(err)),
        };

        let mut event = UploadEvent::from(payload);
        if event.bucket.is_none() {
            event.bucket = non_empty(attributes.remove("bucketId"));
        }
        if event.name.is_none() {
            event.name = non_empty(attributes.remove("objectId"));
        }

        match failure {
            Some(err) if event.bucket.is_none() || event.name.is_none() => Err(err),
            _ => Ok(event),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_payload_accepts_string_size() {
        let payload: StorageObjectPayload = serde_json::from_str(
            r#"{"bucket":"b","name":"gallery/photo.jpg","contentType":"image/jpeg","size":"500000"}"#,
        )
        .unwrap();
        let event = UploadEvent::from(payload);
        assert_eq!(
            event,
            UploadEvent::new("b", "gallery/photo.jpg")
                .with_content_type("image/jpeg")
                .with_size(500_000)
        );
    }

    #[test]
    fn storage_payload_treats_empty_strings_as_missing() {
        let payload: StorageObjectPayload =
            serde_json::from_str(r#"{"bucket":"","name":"a.jpg","size":12}"#).unwrap();
        let event = UploadEvent::from(payload);
        assert_eq!(event.bucket, None);
        assert_eq!(event.name.as_deref(), Some("a.jpg"));
        assert_eq!(event.size, Some(12));
    }

    #[test]
    fn unparsable_size_is_dropped() {
        let payload: StorageObjectPayload =
            serde_json::from_str(r#"{"bucket":"b","name":"a.jpg","size":"lots"}"#).unwrap();
        assert_eq!(UploadEvent::from(payload).size, None);
    }

    #[test]
    fn odd_size_shapes_keep_the_rest_of_the_payload() {
        for size in ["1.5", "-3.0e2", "true", "[1]", r#"{"bytes":1}"#] {
            let body = format!(r#"{{"bucket":"b","name":"gallery/a.jpg","size":{size}}}"#);
            let payload: StorageObjectPayload = serde_json::from_str(&body).unwrap();
            let event = UploadEvent::from(payload);
            assert_eq!(event, UploadEvent::new("b", "gallery/a.jpg"), "{size}");
        }
    }

    #[test]
    fn pubsub_message_decodes_payload() {
        let data = general_purpose::STANDARD
            .encode(r#"{"bucket":"b","name":"gallery/x.png","contentType":"image/png"}"#);
        let message = PubSubMessage {
            data: Some(data),
            attributes: HashMap::new(),
            message_id: Some("1".into()),
        };
        let event = message.into_event().unwrap();
        assert_eq!(event.name.as_deref(), Some("gallery/x.png"));
        assert_eq!(event.content_type.as_deref(), Some("image/png"));
    }

    #[test]
    fn pubsub_message_falls_back_to_attributes() {
        let attributes = HashMap::from([
            ("bucketId".to_string(), "b".to_string()),
            ("objectId".to_string(), "gallery/y.jpg".to_string()),
        ]);
        let message = PubSubMessage {
            data: Some("%%%not-base64%%%".into()),
            attributes,
            message_id: None,
        };
        let event = message.into_event().unwrap();
        assert_eq!(event, UploadEvent::new("b", "gallery/y.jpg"));
    }

    #[test]
    fn pubsub_message_reports_undecodable_payload() {
        let message = PubSubMessage {
            data: Some("%%%not-base64%%%".into()),
            attributes: HashMap::new(),
            message_id: None,
        };
        assert!(message.into_event().is_err());
    }
}
