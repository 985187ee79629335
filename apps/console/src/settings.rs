use serde::{Deserialize, Serialize};

use crate::config::AppConfig;

#[cfg(target_arch = "wasm32")]
const STORAGE_KEY: &str = "trace-console.settings";

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    /// Nested context tree.
    #[default]
    Separate,
    /// Flat, time-ordered event list.
    Timeline,
}

impl ViewMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "separate" | "tree" => Some(Self::Separate),
            "timeline" => Some(Self::Timeline),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ViewMode::Separate => "Tree",
            ViewMode::Timeline => "Timeline",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            ViewMode::Separate => ViewMode::Timeline,
            ViewMode::Timeline => ViewMode::Separate,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }

    pub fn root_class(self) -> &'static str {
        match self {
            Theme::Light => "min-h-screen bg-slate-50 text-slate-900",
            Theme::Dark => "dark min-h-screen bg-slate-900 text-slate-100",
        }
    }
}

/// Operator preferences. Only these are persisted; trace data never is.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ViewSettings {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub view_mode: ViewMode,
    #[serde(default)]
    pub theme: Theme,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl ViewSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            view_mode: config.view_mode,
            theme: Theme::default(),
        }
    }

    /// Stored settings win over the config defaults; anything unreadable
    /// falls back to `config`.
    pub fn load_or(config: &AppConfig) -> Self {
        match load_stored() {
            Ok(Some(settings)) => settings,
            Ok(None) => Self::from_config(config),
            Err(err) => {
                tracing::warn!("ignoring stored view settings: {err:#}");
                Self::from_config(config)
            }
        }
    }

    pub fn persist(&self) {
        if let Err(err) = store(self) {
            tracing::warn!("failed to persist view settings: {err:#}");
        }
    }
}

pub fn parse_port(text: &str) -> Option<u16> {
    text.trim().parse::<u16>().ok().filter(|port| *port != 0)
}

#[cfg(target_arch = "wasm32")]
fn load_stored() -> anyhow::Result<Option<ViewSettings>> {
    use anyhow::Context;
    use gloo_storage::{errors::StorageError, LocalStorage, Storage};

    match LocalStorage::get::<ViewSettings>(STORAGE_KEY) {
        Ok(settings) => Ok(Some(settings)),
        Err(StorageError::KeyNotFound(_)) => Ok(None),
        Err(err) => Err(err).context("reading view settings from local storage"),
    }
}

#[cfg(target_arch = "wasm32")]
fn store(settings: &ViewSettings) -> anyhow::Result<()> {
    use anyhow::Context;
    use gloo_storage::{LocalStorage, Storage};

    LocalStorage::set(STORAGE_KEY, settings).context("writing view settings to local storage")
}

#[cfg(not(target_arch = "wasm32"))]
fn load_stored() -> anyhow::Result<Option<ViewSettings>> {
    Ok(None)
}

#[cfg(not(target_arch = "wasm32"))]
fn store(_settings: &ViewSettings) -> anyhow::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_follow_config_when_nothing_stored() {
        let config = AppConfig {
            host: "traces.local".into(),
            port: 7000,
            view_mode: ViewMode::Timeline,
            ..AppConfig::default()
        };
        let settings = ViewSettings::load_or(&config);
        assert_eq!(settings.host, "traces.local");
        assert_eq!(settings.port, 7000);
        assert_eq!(settings.view_mode, ViewMode::Timeline);
        assert_eq!(settings.theme, Theme::Light);
    }

    #[test]
    fn older_payloads_without_theme_still_load() {
        let settings: ViewSettings =
            serde_json::from_str(r#"{"host":"h","port":1}"#).unwrap();
        assert_eq!(settings.view_mode, ViewMode::Separate);
        assert_eq!(settings.theme, Theme::Light);
    }

    #[test]
    fn port_parsing_rejects_zero_and_junk() {
        assert_eq!(parse_port(" 9001 "), Some(9001));
        assert_eq!(parse_port("0"), None);
        assert_eq!(parse_port("70000"), None);
        assert_eq!(parse_port("abc"), None);
    }
}
