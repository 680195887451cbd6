use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One timestamped air-quality sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Reading {
    pub timestamp: DateTime<Utc>,
    /// CO2 concentration in ppm.
    pub co2: f64,
    /// Temperature in °C.
    pub temperature: f64,
    /// Relative humidity in %.
    pub humidity: f64,
}

/// Raw JSON payload as published on the broker topic.
///
/// zigbee2mqtt-style sensors emit extra fields (battery, link quality)
/// which are ignored, and usually no timestamp of their own.
#[derive(Debug, Deserialize)]
pub struct SensorPayload {
    pub co2: f64,
    pub temperature: f64,
    pub humidity: f64,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl SensorPayload {
    /// Promote the payload to a `Reading`, stamping the arrival time when
    /// the sensor did not provide one.
    pub fn into_reading(self) -> Reading {
        Reading {
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            co2: self.co2,
            temperature: self.temperature,
            humidity: self.humidity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_without_timestamp_is_stamped_on_arrival() {
        let payload: SensorPayload =
            serde_json::from_str(r#"{"co2": 640.0, "temperature": 21.4, "humidity": 48.0}"#)
                .unwrap();
        let before = Utc::now();
        let reading = payload.into_reading();
        assert!(reading.timestamp >= before);
        assert_eq!(reading.co2, 640.0);
    }

    #[test]
    fn payload_timestamp_is_preserved() {
        let payload: SensorPayload = serde_json::from_str(
            r#"{"co2": 640.0, "temperature": 21.4, "humidity": 48.0,
                "timestamp": "2024-01-01T12:00:00Z"}"#,
        )
        .unwrap();
        let reading = payload.into_reading();
        assert_eq!(reading.timestamp.to_rfc3339(), "2024-01-01T12:00:00+00:00");
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let payload: SensorPayload = serde_json::from_str(
            r#"{"co2": 640.0, "temperature": 21.4, "humidity": 48.0,
                "battery": 97, "linkquality": 120}"#,
        )
        .unwrap();
        assert_eq!(payload.humidity, 48.0);
    }

    #[test]
    fn missing_measurement_field_is_an_error() {
        let result =
            serde_json::from_str::<SensorPayload>(r#"{"co2": 640.0, "temperature": 21.4}"#);
        assert!(result.is_err());
    }
}
