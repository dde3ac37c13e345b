use std::{fs, path::Path, time::Duration};

use serde::Deserialize;
use tracing::warn;

pub const SETTINGS_FILE: &str = "patient_client.toml";
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub api_base_url: String,
    pub poll_interval_ms: u64,
    /// Upper bound for every HTTP call; unset means requests may wait indefinitely.
    pub request_timeout_secs: Option<u64>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.into(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            request_timeout_secs: None,
        }
    }
}

impl ClientSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    api_base_url: Option<String>,
    poll_interval_ms: Option<u64>,
    request_timeout_secs: Option<u64>,
}

pub fn load_settings() -> ClientSettings {
    load_settings_from(Path::new(SETTINGS_FILE), |key| std::env::var(key).ok())
}

/// Defaults, then the optional TOML file, then environment overrides.
pub fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> ClientSettings {
    let mut settings = ClientSettings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<FileSettings>(&raw) {
            Ok(file_cfg) => {
                if let Some(v) = file_cfg.api_base_url {
                    settings.api_base_url = v;
                }
                if let Some(v) = file_cfg.poll_interval_ms {
                    settings.poll_interval_ms = v;
                }
                if let Some(secs) = file_cfg.request_timeout_secs {
                    // Zero means no timeout, same as the environment override.
                    settings.request_timeout_secs = (secs > 0).then_some(secs);
                }
            }
            Err(err) => warn!(path = %path.display(), error = %err, "ignoring malformed settings file"),
        }
    }

    if let Some(v) = env("VITE_API_BASE_URL") {
        settings.api_base_url = v;
    }
    if let Some(v) = env("API_BASE_URL") {
        settings.api_base_url = v;
    }
    if let Some(v) = env("APP__API_BASE_URL") {
        settings.api_base_url = v;
    }

    if let Some(v) = env("APP__POLL_INTERVAL_MS") {
        match v.parse::<u64>() {
            Ok(parsed) => settings.poll_interval_ms = parsed,
            Err(_) => warn!(value = %v, "ignoring invalid APP__POLL_INTERVAL_MS"),
        }
    }

    if let Some(v) = env("APP__REQUEST_TIMEOUT_SECS") {
        match v.parse::<u64>() {
            Ok(0) => settings.request_timeout_secs = None,
            Ok(parsed) => settings.request_timeout_secs = Some(parsed),
            Err(_) => warn!(value = %v, "ignoring invalid APP__REQUEST_TIMEOUT_SECS"),
        }
    }

    settings
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
