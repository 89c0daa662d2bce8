use chrono::{DateTime, FixedOffset, Local};
use serde::{Deserialize, Serialize};

use crate::probe::SelectedServer;

/// Record of one complete measurement run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementResult {
    /// Base URL of the server measured against.
    pub server: String,
    pub ping_ms: i64,
    pub download_mbps: f64,
    pub upload_mbps: f64,
    /// Serialized as RFC 3339 with the local UTC offset.
    pub timestamp: DateTime<FixedOffset>,
}

impl MeasurementResult {
    pub fn new(selected: &SelectedServer, download_mbps: f64, upload_mbps: f64) -> Self {
        MeasurementResult {
            server: selected.server.server.clone(),
            ping_ms: selected.latency.as_millis() as i64,
            download_mbps,
            upload_mbps,
            timestamp: Local::now().fixed_offset(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::server::Server;

    #[test]
    fn serializes_with_rfc3339_timestamp() {
        let selected = SelectedServer {
            server: Server {
                id: 3,
                name: "n".into(),
                server: "https://speed.example.com".into(),
                dl_url: String::new(),
                ul_url: String::new(),
                ping_url: String::new(),
            },
            latency: Duration::from_micros(42_900),
        };
        let mut result = MeasurementResult::new(&selected, 93.5, 12.25);
        result.timestamp = DateTime::parse_from_rfc3339("2026-10-17T09:30:00+02:00").unwrap();

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["server"], "https://speed.example.com");
        assert_eq!(json["ping_ms"], 42);
        assert_eq!(json["download_mbps"], 93.5);
        assert_eq!(json["upload_mbps"], 12.25);
        assert_eq!(json["timestamp"], "2026-10-17T09:30:00+02:00");

        let back: MeasurementResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, result);
    }
}
