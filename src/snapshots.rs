use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::backend::{
    models::{Message, SaveSnapshotRequest, Snapshot, UpdateSnapshotRequest},
    BackendClient, BackendError,
};

#[derive(Debug, Error, PartialEq)]
pub enum SnapshotError {
    #[error("cannot create a snapshot from an empty message set")]
    EmptyMessageSet,
    #[error("snapshot not found")]
    NotFound,
    #[error("snapshot request failed: {0}")]
    Persistence(String),
}

impl From<BackendError> for SnapshotError {
    fn from(e: BackendError) -> Self {
        if e.status() == Some(StatusCode::NOT_FOUND) {
            Self::NotFound
        } else {
            Self::Persistence(e.detail())
        }
    }
}

/// Which snapshot's detail a consumer is currently looking at.
///
/// Kept so that deleting the displayed snapshot also invalidates the held
/// detail reference; the next read sees nothing selected.
#[derive(Clone, Default)]
pub struct ViewedDetail {
    inner: Arc<RwLock<Option<String>>>,
}

impl ViewedDetail {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn current(&self) -> Option<String> {
        self.inner.read().await.clone()
    }

    async fn record(&self, id: &str) {
        *self.inner.write().await = Some(id.to_owned());
    }

    /// Clear only when `id` is the snapshot being viewed.
    async fn forget(&self, id: &str) {
        let mut current = self.inner.write().await;
        if current.as_deref() == Some(id) {
            *current = None;
        }
    }
}

/// CRUD over persisted snapshots.
#[derive(Clone)]
pub struct SnapshotService {
    backend: BackendClient,
    viewed: ViewedDetail,
}

impl SnapshotService {
    pub fn new(backend: BackendClient) -> Self {
        Self {
            backend,
            viewed: ViewedDetail::new(),
        }
    }

    pub fn viewed(&self) -> &ViewedDetail {
        &self.viewed
    }

    /// Persist a new snapshot. An empty message set is rejected locally,
    /// before any backend round-trip.
    pub async fn create(
        &self,
        title: &str,
        description: &str,
        messages: Vec<Message>,
    ) -> Result<(), SnapshotError> {
        if messages.is_empty() {
            return Err(SnapshotError::EmptyMessageSet);
        }

        let count = messages.len();
        self.backend
            .create_snapshot(&SaveSnapshotRequest {
                title: title.to_owned(),
                description: description.to_owned(),
                messages,
            })
            .await?;
        info!(title = %title, messages = count, "snapshot created");
        Ok(())
    }

    /// All persisted snapshots, in backend order.
    ///
    /// A response without a `snapshots` array is an anomaly, not a failure:
    /// it is logged and rendered as zero results.
    pub async fn list(&self) -> Result<Vec<Snapshot>, SnapshotError> {
        let body = self.backend.list_snapshots().await?;

        match body.get("snapshots") {
            Some(value) => match serde_json::from_value::<Vec<Snapshot>>(value.clone()) {
                Ok(snapshots) => Ok(snapshots),
                Err(e) => {
                    warn!(error = %e, "snapshot list has unexpected shape; treating as empty");
                    Ok(Vec::new())
                }
            },
            None => {
                warn!("snapshot list response is missing the `snapshots` array; treating as empty");
                Ok(Vec::new())
            }
        }
    }

    /// One snapshot with its full embedded message set. Records the id as
    /// the currently viewed detail.
    pub async fn detail(&self, id: &str) -> Result<Snapshot, SnapshotError> {
        let snapshot = self.backend.snapshot_detail(id).await?;
        self.viewed.record(id).await;
        Ok(snapshot)
    }

    /// Rename or re-describe a snapshot. The message set stays as created.
    pub async fn update(
        &self,
        id: &str,
        title: &str,
        description: &str,
    ) -> Result<(), SnapshotError> {
        self.backend
            .update_snapshot(
                id,
                &UpdateSnapshotRequest {
                    title: title.to_owned(),
                    description: description.to_owned(),
                },
            )
            .await?;
        info!(id = %id, "snapshot updated");
        Ok(())
    }

    /// Delete a snapshot. When it was the currently viewed detail, that
    /// reference is dropped so consumers stop showing a dead snapshot.
    pub async fn delete(&self, id: &str) -> Result<(), SnapshotError> {
        self.backend.delete_snapshot(id).await?;
        self.viewed.forget(id).await;
        info!(id = %id, "snapshot deleted");
        Ok(())
    }
}

/// Display range of a message set: earliest and latest timestamp.
///
/// `None` for an empty set; the UI shows "n/a" instead of a range.
pub fn time_range(messages: &[Message]) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let min = messages.iter().map(|m| m.timestamp).min()?;
    let max = messages.iter().map(|m| m.timestamp).max()?;
    Some((min, max))
}
