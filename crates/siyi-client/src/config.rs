//! Client engine configuration.

use std::time::Duration;

use siyi_settings::ClientSettings;

/// Runtime configuration of a [`ClientEngine`](crate::ClientEngine).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    /// Server URL, used when the engine builds its own WebSocket connector.
    pub url: String,
    /// Inbound requests with this command are answered automatically.
    pub heartbeat_command: String,
    /// Fixed delay between reconnect attempts.
    pub reconnect_interval: Duration,
    /// Timeout applied when a call site passes none.
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::from_settings(&ClientSettings::default())
    }
}

impl ClientConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &ClientSettings) -> Self {
        Self {
            url: settings.url.clone(),
            heartbeat_command: settings.heartbeat_command.clone(),
            reconnect_interval: settings.reconnect_interval(),
            request_timeout: settings.request_timeout(),
        }
    }

    /// Same configuration pointed at another URL.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

impl From<&ClientSettings> for ClientConfig {
    fn from(settings: &ClientSettings) -> Self {
        Self::from_settings(settings)
    }
}
