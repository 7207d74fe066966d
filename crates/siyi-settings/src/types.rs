//! Settings type definitions.
//!
//! Field names are camelCase on disk. Every struct is `#[serde(default)]`, so
//! a partial file only needs the keys it changes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default command name of liveness probes.
pub const DEFAULT_HEARTBEAT_COMMAND: &str = "heartbeat";

/// Root settings.
///
/// ```json
/// {
///   "client": { "url": "ws://10.0.0.5:8765", "agentId": "survival" },
///   "server": { "port": 9000, "heartbeatIntervalSecs": 0 }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SiyiSettings {
    /// Connecting side.
    pub client: ClientSettings,
    /// Accepting side.
    pub server: ServerSettings,
}

/// Settings of a connecting client engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// Server URL.
    pub url: String,
    /// Identity an agent reports in its events.
    pub agent_id: String,
    /// Command name treated as a liveness probe.
    pub heartbeat_command: String,
    /// Delay between reconnect attempts, in seconds.
    pub reconnect_interval_secs: f64,
    /// Default request timeout, in seconds.
    pub request_timeout_secs: f64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8765".to_owned(),
            agent_id: "default_server".to_owned(),
            heartbeat_command: DEFAULT_HEARTBEAT_COMMAND.to_owned(),
            reconnect_interval_secs: 5.0,
            request_timeout_secs: 30.0,
        }
    }
}

impl ClientSettings {
    /// Reconnect delay as a [`Duration`].
    pub fn reconnect_interval(&self) -> Duration {
        secs(self.reconnect_interval_secs)
    }

    /// Request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        secs(self.request_timeout_secs)
    }
}

/// Settings of an accepting server registry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port. `0` picks an ephemeral port.
    pub port: u16,
    /// Command name sent as a liveness probe.
    pub heartbeat_command: String,
    /// Seconds between probes; `0` disables heartbeats.
    pub heartbeat_interval_secs: f64,
    /// Default request timeout, in seconds.
    pub request_timeout_secs: f64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8765,
            heartbeat_command: DEFAULT_HEARTBEAT_COMMAND.to_owned(),
            heartbeat_interval_secs: 30.0,
            request_timeout_secs: 30.0,
        }
    }
}

impl ServerSettings {
    /// Heartbeat period, or `None` when disabled.
    ///
    /// A value too small to be represented as a non-zero [`Duration`]
    /// counts as disabled.
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        Some(secs(self.heartbeat_interval_secs)).filter(|d| !d.is_zero())
    }

    /// Request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        secs(self.request_timeout_secs)
    }

    /// `host:port` bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// Values are validated on load; clamp anyway so a hand-built struct cannot panic.
fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}
