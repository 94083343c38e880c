use std::{collections::HashMap, fs, time::Duration};

use shared::domain::RoomId;
use url::Url;

use crate::error::ConnectError;

/// Exponential backoff bounds for automatic reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Consecutive reconnect attempts before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(4),
            max_attempts: 3,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (1-based): doubles per
    /// attempt from `base_delay`, capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    /// Base `http(s)://` URL of the backend; the websocket endpoint is
    /// derived from it.
    pub server_url: String,
    /// History page size for recent/before fetches.
    pub page_size: u32,
    /// Bound on the credential handshake after the transport opens.
    pub handshake_timeout: Duration,
    /// Bound on how long an optimistic send may stay pending before it is
    /// marked failed. Independent of the reconnect backoff.
    pub send_timeout: Duration,
    /// Clock-skew window when matching an optimistic entry against its
    /// server-confirmed counterpart.
    pub dedup_tolerance: Duration,
    pub reconnect: ReconnectPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8080".into(),
            page_size: 20,
            handshake_timeout: Duration::from_secs(5),
            send_timeout: Duration::from_secs(12),
            dedup_tolerance: Duration::from_secs(5),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl Settings {
    /// Loads settings from `chat.toml` (when present) with environment
    /// variable overrides on top.
    pub fn load() -> Self {
        let mut settings = Self::default();

        if let Ok(raw) = fs::read_to_string("chat.toml") {
            if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(&raw) {
                settings.apply(&file_cfg);
            }
        }

        let mut env_cfg = HashMap::new();
        for key in ["server_url", "page_size"] {
            let var = format!("CHAT_{}", key.to_uppercase());
            if let Ok(value) = std::env::var(var) {
                env_cfg.insert(key.to_string(), value);
            }
        }
        settings.apply(&env_cfg);

        settings
    }

    fn apply(&mut self, cfg: &HashMap<String, String>) {
        if let Some(v) = cfg.get("server_url") {
            self.server_url = v.clone();
        }
        if let Some(v) = cfg.get("page_size") {
            if let Ok(parsed) = v.parse::<u32>() {
                self.page_size = parsed.max(1);
            }
        }
    }

    /// The live-channel endpoint for a room, derived from `server_url`
    /// (`http` becomes `ws`, `https` becomes `wss`).
    pub fn ws_endpoint(&self, room: RoomId) -> Result<String, ConnectError> {
        let base = self.server_url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            return Err(ConnectError::InvalidUrl(self.server_url.clone()));
        };
        let endpoint = format!("{ws_base}/ws/chat/{}", room.0);
        Url::parse(&endpoint).map_err(|err| ConnectError::InvalidUrl(err.to_string()))?;
        Ok(endpoint)
    }

    /// REST base with any trailing slash removed.
    pub(crate) fn rest_base(&self) -> String {
        self.server_url.trim_end_matches('/').to_string()
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
