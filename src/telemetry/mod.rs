pub mod session;

pub use session::{ConnectionState, StatusHandle};

use std::{sync::Arc, time::Duration};

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::{sync::Mutex, task::JoinHandle, time};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{config::Config, live_buffer::LiveBuffer};

use self::session::{Session, Step};

/// Long-lived broker subscription feeding the live buffer.
///
/// At most one session runs at a time: `connect` is a no-op while a session
/// is alive, and replaces a session that has already ended (teardown or
/// exhausted reconnect budget). Expected network failures never surface as
/// errors from this type; they show up only as connection state changes.
///
/// Cheap to clone; all clones drive the same session.
#[derive(Clone)]
pub struct TelemetryClient {
    inner: Arc<Inner>,
}

struct Inner {
    broker_host: String,
    broker_port: u16,
    topic: String,
    max_reconnects: u32,
    reconnect_delay: Duration,
    buffer: LiveBuffer,
    status: StatusHandle,
    active: Mutex<Option<ActiveSession>>,
}

struct ActiveSession {
    mqtt: AsyncClient,
    task: JoinHandle<()>,
}

impl TelemetryClient {
    pub fn new(config: &Config, buffer: LiveBuffer, status: StatusHandle) -> Self {
        Self {
            inner: Arc::new(Inner {
                broker_host: config.mqtt_broker_host.clone(),
                broker_port: config.mqtt_broker_port,
                topic: config.mqtt_topic.clone(),
                max_reconnects: config.mqtt_max_reconnects,
                reconnect_delay: Duration::from_secs(config.mqtt_reconnect_delay_secs),
                buffer,
                status,
                active: Mutex::new(None),
            }),
        }
    }

    /// Start the subscription unless one is already running.
    pub async fn connect(&self) {
        let mut active = self.inner.active.lock().await;
        if let Some(session) = active.as_ref() {
            if !session.task.is_finished() {
                debug!("telemetry session already running");
                return;
            }
        }

        let client_id = format!("air-monitor-{}", Uuid::new_v4().simple());
        let mut options = MqttOptions::new(
            client_id,
            &self.inner.broker_host,
            self.inner.broker_port,
        );
        options.set_keep_alive(Duration::from_secs(30));

        let (mqtt, eventloop) = AsyncClient::new(options, 64);

        let mut session = Session::new(
            self.inner.topic.clone(),
            self.inner.max_reconnects,
            self.inner.buffer.clone(),
            self.inner.status.clone(),
        );
        session.connecting().await;
        info!(
            host = %self.inner.broker_host,
            port = self.inner.broker_port,
            topic = %self.inner.topic,
            "connecting to MQTT broker"
        );

        let task = tokio::spawn(run_session(
            session,
            mqtt.clone(),
            eventloop,
            self.inner.reconnect_delay,
        ));
        *active = Some(ActiveSession { mqtt, task });
    }

    /// Tear the subscription down.
    ///
    /// Awaits the session task, so once this returns the session can no
    /// longer write to the live buffer or fire any other callback.
    pub async fn disconnect(&self) {
        let Some(ActiveSession { mqtt, task }) = self.inner.active.lock().await.take() else {
            return;
        };

        // Best-effort MQTT DISCONNECT; the broker may already be gone.
        let _ = mqtt.disconnect().await;
        task.abort();
        let _ = task.await;

        self.inner.status.set(ConnectionState::Disconnected).await;
        info!("telemetry session closed");
    }
}

/// Single event-processing loop for one session.
///
/// Maps raw transport events onto the state machine and carries out the
/// step it asks for. rumqttc re-establishes the connection on the next
/// `poll` after an error, so backoff here is just a delay before polling.
async fn run_session(
    mut session: Session,
    mqtt: AsyncClient,
    mut eventloop: EventLoop,
    reconnect_delay: Duration,
) {
    loop {
        let step = match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => session.on_connack().await,
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                session.on_publish(&publish.topic, &publish.payload).await
            }
            Ok(_) => Step::Continue,
            Err(e) => session.on_transport_error(e).await,
        };

        match step {
            Step::Continue => {}
            Step::Subscribe => {
                if let Err(e) = mqtt.subscribe(session.topic(), QoS::AtLeastOnce).await {
                    if session.on_subscribe_error(e).await == Step::Shutdown {
                        break;
                    }
                }
            }
            Step::Backoff => time::sleep(reconnect_delay).await,
            Step::Shutdown => {
                let _ = mqtt.disconnect().await;
                break;
            }
        }
    }
}
