use std::{fs, path::Path, time::Duration};

use anyhow::Context;
use serde::Deserialize;

pub const DEFAULT_SETTINGS_FILE: &str = "flashloan.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub api_base_url: String,
    pub history_poll_interval_secs: u64,
    /// Unset by default: flash loan calls wait for the backend.
    pub request_timeout_ms: Option<u64>,
    /// Explorer link for a transaction; `{tx}` is replaced by the hash,
    /// otherwise the hash is appended as a path segment.
    pub explorer_tx_url: Option<String>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:3000".into(),
            history_poll_interval_secs: 30,
            request_timeout_ms: None,
            explorer_tx_url: None,
        }
    }
}

impl ClientSettings {
    pub fn history_poll_interval(&self) -> Duration {
        Duration::from_secs(self.history_poll_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    api_base_url: Option<String>,
    history_poll_interval_secs: Option<u64>,
    request_timeout_ms: Option<u64>,
    explorer_tx_url: Option<String>,
}

/// Defaults, then `flashloan.toml` in the working directory, then environment.
pub fn load_settings() -> anyhow::Result<ClientSettings> {
    load_settings_from(Path::new(DEFAULT_SETTINGS_FILE), |key| std::env::var(key).ok())
}

pub fn load_settings_from(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<ClientSettings> {
    let mut settings = ClientSettings::default();

    if path.exists() {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file '{}'", path.display()))?;
        let file_cfg: SettingsFile = toml::from_str(&raw)
            .with_context(|| format!("failed to parse settings file '{}'", path.display()))?;
        apply_file(&mut settings, file_cfg);
    }

    apply_env(&mut settings, env);
    Ok(settings)
}

fn apply_file(settings: &mut ClientSettings, file_cfg: SettingsFile) {
    if let Some(v) = file_cfg.api_base_url {
        settings.api_base_url = v;
    }
    if let Some(v) = file_cfg.history_poll_interval_secs {
        settings.history_poll_interval_secs = v;
    }
    if let Some(v) = file_cfg.request_timeout_ms {
        settings.request_timeout_ms = Some(v);
    }
    if let Some(v) = file_cfg.explorer_tx_url {
        settings.explorer_tx_url = Some(v);
    }
}

fn apply_env(settings: &mut ClientSettings, env: impl Fn(&str) -> Option<String>) {
    if let Some(v) = env("FLASHLOAN_API_URL") {
        settings.api_base_url = v;
    }
    if let Some(v) = env("APP__API_BASE_URL") {
        settings.api_base_url = v;
    }

    if let Some(v) = env("APP__HISTORY_POLL_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.history_poll_interval_secs = parsed;
        }
    }

    if let Some(v) = env("APP__REQUEST_TIMEOUT_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.request_timeout_ms = Some(parsed);
        }
    }

    if let Some(v) = env("APP__EXPLORER_TX_URL") {
        settings.explorer_tx_url = Some(v);
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
