use serde::{Deserialize, Serialize};

/// Client configuration for one analysis session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Analysis service endpoint, `host:port`.
    pub endpoint: String,
    /// Flat delay between reconnect attempts, in milliseconds.
    #[serde(alias = "retryDelayMs")]
    pub retry_delay_ms: u64,
    /// Dial timeout for a single connect attempt, in milliseconds.
    #[serde(alias = "connectTimeoutMs")]
    pub connect_timeout_ms: u64,
    /// Period between capture ticks while streaming, in milliseconds.
    #[serde(alias = "captureIntervalMs")]
    pub capture_interval_ms: u64,
    /// Whether outbound requests ask the service for landmarks by default.
    #[serde(alias = "requestLandmarks")]
    pub request_landmarks: bool,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            endpoint:            "127.0.0.1:9460".to_owned(),
            retry_delay_ms:      3_000,
            connect_timeout_ms:  5_000,
            capture_interval_ms: 250,
            request_landmarks:   true,
        }
    }
}

impl ClientSettings {
    pub fn retry_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.retry_delay_ms)
    }

    pub fn connect_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn capture_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.capture_interval_ms)
    }
}
