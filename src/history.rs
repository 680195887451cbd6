use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use reqwest::StatusCode;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::backend::{models::Message, BackendClient, BackendError};

#[derive(Debug, Error, PartialEq)]
pub enum HistoryError {
    #[error("date range is missing a start date")]
    InvalidRange,
    #[error("historical query failed: {0}")]
    QueryFailed(String),
}

/// Caller-supplied calendar date range.
///
/// `to = None` means "same day as `from`". The dates carry no zone; they
/// are interpreted as UTC calendar days when resolved.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// Closed UTC interval covering whole calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UtcInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl UtcInterval {
    /// Resolve a date range: start is 00:00:00.000 on the first day, end is
    /// 23:59:59.999 on the last, both taken as UTC calendar dates no matter
    /// what zone the caller picked them in. Days after today (UTC) clamp to
    /// today, matching the date picker's upper bound.
    pub fn from_range(range: &DateRange) -> Result<Self, HistoryError> {
        let from = range.from.ok_or(HistoryError::InvalidRange)?;
        let today = Utc::now().date_naive();
        let from = from.min(today);
        let to = range.to.unwrap_or(from).min(today);

        let start = from
            .and_hms_milli_opt(0, 0, 0, 0)
            .expect("midnight exists on every date")
            .and_utc();
        let end = to
            .and_hms_milli_opt(23, 59, 59, 999)
            .expect("end of day exists on every date")
            .and_utc();
        Ok(Self { start, end })
    }
}

/// Most recent successful historical query result.
///
/// Two overlapping fetches can complete out of order. Every fetch draws a
/// token before touching the network; a result is applied only while its
/// token is still the newest drawn, so a slow early response can never
/// overwrite a later one. Snapshot creation reads its message set from here.
#[derive(Clone, Default)]
pub struct LastQueryStore {
    inner: Arc<RwLock<StoreInner>>,
}

#[derive(Default)]
struct StoreInner {
    latest_token: u64,
    applied: Option<(u64, Vec<Message>)>,
}

impl LastQueryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draw the token for a fetch that is about to start.
    pub async fn begin(&self) -> u64 {
        let mut store = self.inner.write().await;
        store.latest_token += 1;
        store.latest_token
    }

    /// Offer a finished fetch's result. Returns whether it was applied.
    pub async fn apply(&self, token: u64, messages: Vec<Message>) -> bool {
        let mut store = self.inner.write().await;
        if token < store.latest_token {
            debug!(
                token,
                latest = store.latest_token,
                "discarding stale historical query result"
            );
            return false;
        }
        store.applied = Some((token, messages));
        true
    }

    /// Message set of the newest applied query; empty when none succeeded yet.
    pub async fn messages(&self) -> Vec<Message> {
        self.inner
            .read()
            .await
            .applied
            .as_ref()
            .map(|(_, messages)| messages.clone())
            .unwrap_or_default()
    }
}

/// Resolves date ranges and fetches matching stored messages.
#[derive(Clone)]
pub struct HistoryService {
    backend: BackendClient,
    topic: String,
    store: LastQueryStore,
}

impl HistoryService {
    pub fn new(backend: BackendClient, topic: impl Into<String>, store: LastQueryStore) -> Self {
        Self {
            backend,
            topic: topic.into(),
            store,
        }
    }

    /// Fetch every stored message for the configured topic within `range`.
    ///
    /// A backend 404 means nothing was stored in the interval and yields an
    /// empty set; only transport or server failures are errors. The result
    /// is offered to the last-query store, which keeps whichever concurrent
    /// fetch was issued last.
    pub async fn fetch(&self, range: &DateRange) -> Result<Vec<Message>, HistoryError> {
        let interval = UtcInterval::from_range(range)?;
        let token = self.store.begin().await;

        let messages = match self
            .backend
            .messages_by_time_range(&self.topic, interval.start, interval.end)
            .await
        {
            Ok(messages) => messages,
            Err(e) if e.status() == Some(StatusCode::NOT_FOUND) => Vec::new(),
            Err(e) => return Err(HistoryError::QueryFailed(e.detail())),
        };

        info!(
            topic = %self.topic,
            start = %interval.start,
            end = %interval.end,
            count = messages.len(),
            "historical query completed"
        );
        self.store.apply(token, messages.clone()).await;
        Ok(messages)
    }
}
