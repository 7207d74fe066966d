//! # siyi-settings
//!
//! Layered configuration for Siyi clients and servers.
//!
//! Layers, lowest priority first:
//! 1. compiled defaults ([`SiyiSettings::default()`])
//! 2. `~/.siyi/settings.json`, deep-merged over the defaults
//! 3. `SIYI_*` environment variables
//!
//! Loading returns an owned value. Callers pass it to the engines they build.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides_from, deep_merge, load_settings, load_settings_from_path,
    settings_path, validate,
};
pub use types::{ClientSettings, DEFAULT_HEARTBEAT_COMMAND, ServerSettings, SiyiSettings};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_path_is_under_dot_siyi() {
        let path = settings_path();
        assert!(path.ends_with(".siyi/settings.json"));
    }

    #[test]
    fn defaults_validate() {
        assert!(validate(&SiyiSettings::default()).is_ok());
    }
}
