use std::{collections::VecDeque, sync::Arc};

use tokio::sync::RwLock;

use crate::models::Reading;

/// Bounded in-memory window over the most recent `Reading`s.
///
/// The telemetry session is the single writer; display consumers read
/// concurrently via copy-on-read snapshots and never observe a half-applied
/// append. Once `capacity` readings are held, each append evicts the oldest
/// entry, so contents are always the last `capacity` readings in arrival
/// order (which is delivery order, not necessarily timestamp order).
///
/// Wrapped in `Arc` so it can be cheaply cloned and shared across tasks.
#[derive(Clone)]
pub struct LiveBuffer {
    inner: Arc<RwLock<VecDeque<Reading>>>,
    capacity: usize,
}

impl LiveBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append one reading, evicting from the front when over capacity.
    pub async fn append(&self, reading: Reading) {
        let mut buf = self.inner.write().await;
        buf.push_back(reading);
        while buf.len() > self.capacity {
            buf.pop_front();
        }
    }

    /// Copy of the current contents, oldest first.
    pub async fn snapshot(&self) -> Vec<Reading> {
        self.inner.read().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn make_reading(co2: f64) -> Reading {
        Reading {
            timestamp: Utc::now(),
            co2,
            temperature: 21.0,
            humidity: 50.0,
        }
    }

    #[tokio::test]
    async fn empty_buffer_returns_nothing() {
        let buffer = LiveBuffer::new(3);
        assert!(buffer.is_empty().await);
        assert!(buffer.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn appends_below_capacity_keep_everything() {
        let buffer = LiveBuffer::new(3);
        buffer.append(make_reading(400.0)).await;
        buffer.append(make_reading(410.0)).await;

        let contents = buffer.snapshot().await;
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[0].co2, 400.0);
        assert_eq!(contents[1].co2, 410.0);
    }

    #[tokio::test]
    async fn overflow_keeps_exactly_the_last_capacity_in_arrival_order() {
        let buffer = LiveBuffer::new(3);
        for co2 in [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0] {
            buffer.append(make_reading(co2)).await;
        }

        let contents = buffer.snapshot().await;
        assert_eq!(contents.len(), 3);
        let co2s: Vec<f64> = contents.iter().map(|r| r.co2).collect();
        assert_eq!(co2s, vec![5.0, 6.0, 7.0]);
    }

    #[tokio::test]
    async fn snapshot_never_exceeds_capacity() {
        let buffer = LiveBuffer::new(5);
        for co2 in 0..50 {
            buffer.append(make_reading(co2 as f64)).await;
            assert!(buffer.len().await <= 5);
        }
        assert_eq!(buffer.snapshot().await.len(), 5);
    }

    #[tokio::test]
    async fn snapshot_is_a_copy_not_a_view() {
        let buffer = LiveBuffer::new(3);
        buffer.append(make_reading(400.0)).await;

        let before = buffer.snapshot().await;
        buffer.append(make_reading(410.0)).await;

        assert_eq!(before.len(), 1);
        assert_eq!(buffer.len().await, 2);
    }

    #[tokio::test]
    async fn clone_shares_state() {
        let buffer = LiveBuffer::new(3);
        let clone = buffer.clone();

        buffer.append(make_reading(400.0)).await;

        let seen = clone.snapshot().await;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].co2, 400.0);
    }
}
