use std::{fmt, sync::Arc};

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use utoipa::ToSchema;

use crate::{live_buffer::LiveBuffer, models::SensorPayload};

/// Lifecycle of the broker subscription.
///
/// `Disconnected` is both the initial state and the terminal one reached
/// when the reconnect budget runs out or the session is torn down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        };
        f.write_str(s)
    }
}

/// Shared read view of the session's connection state.
///
/// The session task writes it, API readers poll it. Cheap to clone.
#[derive(Clone, Default)]
pub struct StatusHandle {
    inner: Arc<RwLock<ConnectionState>>,
}

impl StatusHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self) -> ConnectionState {
        *self.inner.read().await
    }

    pub(crate) async fn set(&self, state: ConnectionState) {
        *self.inner.write().await = state;
    }
}

/// What the driver loop must do after feeding an event through the machine.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Step {
    /// Nothing to do; keep polling.
    Continue,
    /// Broker acknowledged the connection; (re)issue the subscription.
    Subscribe,
    /// Transport dropped; wait out the reconnect delay, then poll again.
    Backoff,
    /// Done for good; close the connection and stop the loop.
    Shutdown,
}

/// Connection state machine for one subscription session.
///
/// All transitions run here, fed by the driver loop, so the reconnect
/// ceiling and the terminal transition are testable without a broker.
pub(crate) struct Session {
    topic: String,
    max_reconnects: u32,
    reconnects: u32,
    state: ConnectionState,
    buffer: LiveBuffer,
    status: StatusHandle,
}

impl Session {
    pub(crate) fn new(
        topic: String,
        max_reconnects: u32,
        buffer: LiveBuffer,
        status: StatusHandle,
    ) -> Self {
        Self {
            topic,
            max_reconnects,
            reconnects: 0,
            state: ConnectionState::Disconnected,
            buffer,
            status,
        }
    }

    pub(crate) fn topic(&self) -> &str {
        &self.topic
    }

    #[allow(dead_code)]
    pub(crate) fn state(&self) -> ConnectionState {
        self.state
    }

    async fn transition(&mut self, state: ConnectionState) {
        self.state = state;
        self.status.set(state).await;
    }

    pub(crate) async fn connecting(&mut self) {
        self.transition(ConnectionState::Connecting).await;
    }

    /// Broker accepted the connection (first connect or a reconnect).
    pub(crate) async fn on_connack(&mut self) -> Step {
        self.reconnects = 0;
        self.transition(ConnectionState::Connected).await;
        info!(topic = %self.topic, "broker connection established");
        Step::Subscribe
    }

    /// A publish arrived. Only payloads on the subscribed topic are decoded;
    /// a malformed payload is logged and dropped without touching the
    /// connection state.
    pub(crate) async fn on_publish(&mut self, topic: &str, payload: &[u8]) -> Step {
        // Late delivery after the session has been closed must not write.
        if self.state == ConnectionState::Disconnected {
            return Step::Continue;
        }
        if topic != self.topic {
            return Step::Continue;
        }

        match serde_json::from_slice::<SensorPayload>(payload) {
            Ok(payload) => self.buffer.append(payload.into_reading()).await,
            Err(e) => warn!(topic = %topic, error = %e, "discarding malformed telemetry payload"),
        }
        Step::Continue
    }

    /// The transport dropped. Retry until the attempt budget is spent, then
    /// park in terminal `Disconnected`.
    pub(crate) async fn on_transport_error(&mut self, error: impl fmt::Display) -> Step {
        self.reconnects += 1;
        if self.reconnects > self.max_reconnects {
            error!(
                attempts = self.reconnects - 1,
                error = %error,
                "reconnect budget exhausted; giving up on broker connection"
            );
            self.transition(ConnectionState::Disconnected).await;
            Step::Shutdown
        } else {
            warn!(
                attempt = self.reconnects,
                max = self.max_reconnects,
                error = %error,
                "broker transport dropped; will reconnect"
            );
            self.transition(ConnectionState::Reconnecting).await;
            Step::Backoff
        }
    }

    /// The subscribe request could not even be handed to the event loop.
    /// That only happens when the loop itself is gone, so stop.
    pub(crate) async fn on_subscribe_error(&mut self, error: impl fmt::Display) -> Step {
        error!(topic = %self.topic, error = %error, "failed to issue subscribe request");
        self.transition(ConnectionState::Disconnected).await;
        Step::Shutdown
    }
}
