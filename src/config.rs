use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the durable message store, e.g. `https://localhost:443/api`.
    pub backend_base_url: String,
    pub mqtt_broker_host: String,
    pub mqtt_broker_port: u16,
    /// Broker topic carrying the air monitor's readings.
    pub mqtt_topic: String,
    /// Reconnect attempts allowed before the session gives up for good.
    pub mqtt_max_reconnects: u32,
    /// Delay between a transport drop and the next reconnect attempt.
    pub mqtt_reconnect_delay_secs: u64,
    /// Number of recent readings held for the live view.
    pub live_buffer_capacity: usize,
    pub server_host: String,
    pub server_port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            backend_base_url: required("BACKEND_BASE_URL")?,
            mqtt_broker_host: optional("MQTT_BROKER_HOST", "localhost"),
            mqtt_broker_port: optional("MQTT_BROKER_PORT", "1883")
                .parse()
                .context("MQTT_BROKER_PORT must be a valid port number")?,
            mqtt_topic: optional("MQTT_TOPIC", "z2m/air-monitor"),
            mqtt_max_reconnects: optional("MQTT_MAX_RECONNECTS", "5")
                .parse()
                .context("MQTT_MAX_RECONNECTS must be a non-negative integer")?,
            mqtt_reconnect_delay_secs: optional("MQTT_RECONNECT_DELAY_SECS", "2")
                .parse()
                .context("MQTT_RECONNECT_DELAY_SECS must be a positive integer")?,
            live_buffer_capacity: parse_capacity(&optional("LIVE_BUFFER_CAPACITY", "100"))?,
            server_host: optional("SERVER_HOST", "0.0.0.0"),
            server_port: optional("SERVER_PORT", "8080")
                .parse()
                .context("SERVER_PORT must be a valid port number")?,
        })
    }
}

/// A zero-capacity buffer would silently drop every reading, so reject it
/// at startup rather than serving an always-empty live view.
fn parse_capacity(raw: &str) -> Result<usize> {
    let capacity: usize = raw
        .parse()
        .context("LIVE_BUFFER_CAPACITY must be a positive integer")?;
    anyhow::ensure!(capacity > 0, "LIVE_BUFFER_CAPACITY must be at least 1");
    Ok(capacity)
}

fn required(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("missing required env var: {key}"))
}

fn optional(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}
