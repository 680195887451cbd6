use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::Reading;

/// Measurement fields embedded in a stored broker message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MessagePayload {
    pub co2: f64,
    pub temperature: f64,
    pub humidity: f64,
}

/// One stored broker message as the backend returns it.
///
/// The `id` is backend-owned and opaque; it is round-tripped when a message
/// set is persisted into a snapshot, never interpreted here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub topic: String,
    pub deserialized_payload: MessagePayload,
}

impl Message {
    /// View the stored record as a domain reading.
    pub fn reading(&self) -> Reading {
        Reading {
            timestamp: self.timestamp,
            co2: self.deserialized_payload.co2,
            temperature: self.deserialized_payload.temperature,
            humidity: self.deserialized_payload.humidity,
        }
    }
}

/// A persisted, named collection of messages.
///
/// `description` holds rich-text HTML produced by the editor and is stored
/// verbatim. The message set is fixed when the snapshot is created; only
/// title and description can change afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Snapshot {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// Body for `POST /snapshots`.
#[derive(Debug, Serialize)]
pub struct SaveSnapshotRequest {
    pub title: String,
    pub description: String,
    pub messages: Vec<Message>,
}

/// Body for `PUT /snapshot/{id}`.
///
/// Deliberately has no `messages` field: the embedded message set cannot be
/// replaced after creation.
#[derive(Debug, Serialize)]
pub struct UpdateSnapshotRequest {
    pub title: String,
    pub description: String,
}
