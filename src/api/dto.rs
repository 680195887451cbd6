use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{backend::models::Snapshot, snapshots, telemetry::ConnectionState};

/// Query parameters for `GET /history`.
#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    /// First day of the range (YYYY-MM-DD).
    pub from: Option<NaiveDate>,
    /// Last day of the range (YYYY-MM-DD); defaults to `from`.
    pub to: Option<NaiveDate>,
}

/// Body for `POST /snapshots` and `PUT /snapshot/{id}`.
///
/// The message set is never part of this body: creation takes it from the
/// last successful historical query, and updates cannot replace it.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SnapshotForm {
    pub title: String,
    /// Rich-text HTML from the editor, stored verbatim.
    pub description: String,
}

/// Response for `GET /live/status`.
#[derive(Debug, Serialize, ToSchema)]
pub struct LiveStatus {
    pub state: ConnectionState,
}

/// Snapshot list entry with its display time range precomputed.
#[derive(Debug, Serialize, ToSchema)]
pub struct SnapshotSummary {
    pub id: String,
    pub title: String,
    pub description: String,
    /// Earliest message timestamp; absent for an empty snapshot.
    pub first_message_at: Option<DateTime<Utc>>,
    /// Latest message timestamp; absent for an empty snapshot.
    pub last_message_at: Option<DateTime<Utc>>,
}

impl From<Snapshot> for SnapshotSummary {
    fn from(s: Snapshot) -> Self {
        let range = snapshots::time_range(&s.messages);
        Self {
            id: s.id,
            title: s.title,
            description: s.description,
            first_message_at: range.map(|(min, _)| min),
            last_message_at: range.map(|(_, max)| max),
        }
    }
}
