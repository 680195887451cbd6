pub mod models;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use self::models::{Message, SaveSnapshotRequest, Snapshot, UpdateSnapshotRequest};

/// Failure of one backend request.
///
/// `Status` carries whatever detail the backend put in its error body so
/// callers can surface it; the other variants wrap the underlying cause.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend returned {status}: {detail}")]
    Status { status: StatusCode, detail: String },
    #[error("failed to decode backend response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl BackendError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Human-readable failure detail for caller-facing errors.
    pub fn detail(&self) -> String {
        match self {
            Self::Status { detail, .. } => detail.clone(),
            other => other.to_string(),
        }
    }
}

/// HTTP client for the durable message store.
///
/// Cheap to clone; all clones share one connection pool.
#[derive(Debug, Clone)]
pub struct BackendClient {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    http: Client,
    base_url: Url,
}

impl BackendClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("invalid backend base URL: {base_url:?}"))?;
        anyhow::ensure!(
            base_url.path_segments().is_some(),
            "backend base URL must be an http(s) URL, got: {base_url}"
        );
        Ok(Self {
            inner: Arc::new(Inner {
                http: Client::new(),
                base_url,
            }),
        })
    }

    /// Fetch every stored message on `topic` with a timestamp inside
    /// `[start, end]`. Results come back in backend order; no re-sort.
    pub async fn messages_by_time_range(
        &self,
        topic: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Message>, BackendError> {
        let mut url = self.url(&["mqtt", topic, "messages-by-time-range"]);
        url.query_pairs_mut()
            .append_pair("start", &start.to_rfc3339_opts(SecondsFormat::Millis, true))
            .append_pair("end", &end.to_rfc3339_opts(SecondsFormat::Millis, true));
        debug!(url = %url, "fetching stored messages");

        let resp = self.inner.http.get(url).send().await?;
        read_json(resp).await
    }

    pub async fn create_snapshot(&self, body: &SaveSnapshotRequest) -> Result<(), BackendError> {
        let url = self.url(&["snapshots"]);
        debug!(url = %url, messages = body.messages.len(), "persisting snapshot");

        let resp = self.inner.http.post(url).json(body).send().await?;
        read_empty(resp).await
    }

    /// Raw list response; the snapshot service owns the shape check.
    pub async fn list_snapshots(&self) -> Result<serde_json::Value, BackendError> {
        let resp = self.inner.http.get(self.url(&["snapshot"])).send().await?;
        read_json(resp).await
    }

    pub async fn snapshot_detail(&self, id: &str) -> Result<Snapshot, BackendError> {
        let resp = self
            .inner
            .http
            .get(self.url(&["snapshot", id]))
            .send()
            .await?;
        read_json(resp).await
    }

    pub async fn update_snapshot(
        &self,
        id: &str,
        body: &UpdateSnapshotRequest,
    ) -> Result<(), BackendError> {
        let resp = self
            .inner
            .http
            .put(self.url(&["snapshot", id]))
            .json(body)
            .send()
            .await?;
        read_empty(resp).await
    }

    pub async fn delete_snapshot(&self, id: &str) -> Result<(), BackendError> {
        let resp = self
            .inner
            .http
            .delete(self.url(&["snapshot", id]))
            .send()
            .await?;
        read_empty(resp).await
    }

    /// Join path segments onto the base URL. Each segment is percent-encoded
    /// as a whole, so a topic like `z2m/air-monitor` stays one segment.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.inner.base_url.clone();
        url.path_segments_mut()
            .expect("base URL validated at construction")
            .pop_if_empty()
            .extend(segments);
        url
    }
}

async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, BackendError> {
    let status = resp.status();
    let bytes = resp.bytes().await?;
    if !status.is_success() {
        return Err(BackendError::Status {
            status,
            detail: error_detail(&bytes),
        });
    }
    Ok(serde_json::from_slice(&bytes)?)
}

/// Like `read_json` but for endpoints whose success body is irrelevant
/// (create/update return a reference we do not consume, delete returns
/// no content).
async fn read_empty(resp: reqwest::Response) -> Result<(), BackendError> {
    let status = resp.status();
    if !status.is_success() {
        let bytes = resp.bytes().await?;
        return Err(BackendError::Status {
            status,
            detail: error_detail(&bytes),
        });
    }
    Ok(())
}

/// Pull the backend's own error message out of a failure body.
///
/// The store is inconsistent about casing (`Message` on the range endpoint,
/// `error`/`message` elsewhere), so try the known spellings before giving up.
fn error_detail(bytes: &[u8]) -> String {
    serde_json::from_slice::<serde_json::Value>(bytes)
        .ok()
        .and_then(|body| {
            ["Message", "message", "error"]
                .iter()
                .find_map(|key| body.get(key)?.as_str().map(str::to_owned))
        })
        .unwrap_or_else(|| "no detail provided".to_owned())
}
