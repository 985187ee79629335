use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::settings::ViewMode;

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 9001;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;
const MIN_CONNECT_TIMEOUT_MS: u64 = 500;
const DEFAULT_PLACEHOLDER_GRACE_MS: u64 = 30_000;

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum AppProfile {
    #[default]
    Dev,
    Prod,
}

impl AppProfile {
    pub fn from_env(value: Option<String>) -> Self {
        match value.as_deref().map(str::trim) {
            Some("prod") | Some("production") => Self::Prod,
            _ => Self::Dev,
        }
    }

    pub fn log_level(self) -> tracing::Level {
        match self {
            AppProfile::Dev => tracing::Level::DEBUG,
            AppProfile::Prod => tracing::Level::INFO,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub profile: AppProfile,
    pub connect_timeout: Duration,
    pub placeholder_grace: Duration,
    pub view_mode: ViewMode,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            profile: AppProfile::Dev,
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            placeholder_grace: Duration::from_millis(DEFAULT_PLACEHOLDER_GRACE_MS),
            view_mode: ViewMode::Separate,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        #[cfg(not(target_arch = "wasm32"))]
        crate::config::load_dotenv();

        Self::from_lookup(read_env)
    }

    /// Builds a config from an arbitrary key lookup; unparsable values keep
    /// their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(host) = lookup("TRACE_CONSOLE_HOST").filter(|host| !host.trim().is_empty()) {
            config.host = host.trim().to_string();
        }

        if let Some(port) = lookup("TRACE_CONSOLE_PORT")
            .and_then(|value| value.trim().parse::<u16>().ok())
            .filter(|port| *port != 0)
        {
            config.port = port;
        }

        config.profile = AppProfile::from_env(lookup("TRACE_CONSOLE_PROFILE"));

        if let Some(ms) = lookup("TRACE_CONSOLE_CONNECT_TIMEOUT_MS")
            .and_then(|value| value.trim().parse::<u64>().ok())
        {
            config.connect_timeout = Duration::from_millis(ms.max(MIN_CONNECT_TIMEOUT_MS));
        }

        if let Some(ms) = lookup("TRACE_CONSOLE_PLACEHOLDER_GRACE_MS")
            .and_then(|value| value.trim().parse::<u64>().ok())
        {
            config.placeholder_grace = Duration::from_millis(ms);
        }

        if let Some(mode) = lookup("TRACE_CONSOLE_VIEW_MODE").and_then(|value| ViewMode::parse(&value)) {
            config.view_mode = mode;
        }

        config
    }
}

fn read_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .or_else(|| option_env_from_build(key).map(|s| s.to_string()))
}

fn option_env_from_build(key: &str) -> Option<&'static str> {
    match key {
        "TRACE_CONSOLE_HOST" => option_env!("TRACE_CONSOLE_HOST"),
        "TRACE_CONSOLE_PORT" => option_env!("TRACE_CONSOLE_PORT"),
        "TRACE_CONSOLE_PROFILE" => option_env!("TRACE_CONSOLE_PROFILE"),
        "TRACE_CONSOLE_CONNECT_TIMEOUT_MS" => option_env!("TRACE_CONSOLE_CONNECT_TIMEOUT_MS"),
        "TRACE_CONSOLE_PLACEHOLDER_GRACE_MS" => option_env!("TRACE_CONSOLE_PLACEHOLDER_GRACE_MS"),
        "TRACE_CONSOLE_VIEW_MODE" => option_env!("TRACE_CONSOLE_VIEW_MODE"),
        _ => None,
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub fn load_dotenv() {
    if let Err(err) = dotenvy::dotenv() {
        if !matches!(err, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            tracing::warn!("failed to load .env: {err}");
        }
    }
}

#[cfg(target_arch = "wasm32")]
#[inline]
pub fn load_dotenv() {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = AppConfig::from_lookup(|_| None);
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
    }

    #[test]
    fn reads_overrides_and_clamps_timeout() {
        let config = AppConfig::from_lookup(lookup(&[
            ("TRACE_CONSOLE_HOST", " traces.internal "),
            ("TRACE_CONSOLE_PORT", "8080"),
            ("TRACE_CONSOLE_PROFILE", "production"),
            ("TRACE_CONSOLE_CONNECT_TIMEOUT_MS", "10"),
            ("TRACE_CONSOLE_PLACEHOLDER_GRACE_MS", "0"),
            ("TRACE_CONSOLE_VIEW_MODE", "timeline"),
        ]));
        assert_eq!(config.host, "traces.internal");
        assert_eq!(config.port, 8080);
        assert_eq!(config.profile, AppProfile::Prod);
        assert_eq!(config.connect_timeout, Duration::from_millis(500));
        assert_eq!(config.placeholder_grace, Duration::ZERO);
        assert_eq!(config.view_mode, ViewMode::Timeline);
    }

    #[test]
    fn garbage_values_keep_defaults() {
        let config = AppConfig::from_lookup(lookup(&[
            ("TRACE_CONSOLE_PORT", "0"),
            ("TRACE_CONSOLE_CONNECT_TIMEOUT_MS", "soon"),
            ("TRACE_CONSOLE_VIEW_MODE", "sideways"),
        ]));
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.connect_timeout, Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS));
        assert_eq!(config.view_mode, ViewMode::Separate);
    }
}
