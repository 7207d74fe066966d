//! Server registry configuration.

use std::time::Duration;

use siyi_settings::ServerSettings;

/// Runtime configuration of a [`ServerRegistry`](crate::ServerRegistry).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Bind host (default `"127.0.0.1"`).
    pub host: String,
    /// Bind port (`0` auto-assigns).
    pub port: u16,
    /// Command sent as a liveness probe, and answered automatically inbound.
    pub heartbeat_command: String,
    /// Probe period. `None` disables heartbeats.
    pub heartbeat_interval: Option<Duration>,
    /// Timeout applied when a call site passes none, heartbeats included.
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_settings(&ServerSettings::default())
    }
}

impl ServerConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            heartbeat_command: settings.heartbeat_command.clone(),
            heartbeat_interval: settings.heartbeat_interval(),
            request_timeout: settings.request_timeout(),
        }
    }

    /// `host:port`.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
