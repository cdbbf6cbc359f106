use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_DIR_NAME: &str = "concierge-voice";
const SETTINGS_FILE_NAME: &str = "settings.json";

/// Environment variable that overrides `api_base`.
pub const API_BASE_ENV: &str = "CONCIERGE_API_BASE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Base URL of the conversational backend, without a trailing slash.
    pub api_base: String,

    /// Recordings are stopped automatically after this many seconds. 0 disables the guard.
    pub max_recording_secs: u64,

    /// Waveform repaint interval.
    pub refresh_interval_ms: u64,

    /// A new ripple is emitted this often while recording.
    pub ripple_cadence_ms: u64,

    /// Each ripple disappears this long after it was emitted.
    pub ripple_lifetime_ms: u64,

    /// Waveform surface size in pixels (columns for the terminal surface).
    pub waveform_width: u32,
    pub waveform_height: u32,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:8000/api".to_string(),
            max_recording_secs: 120,
            refresh_interval_ms: 16,
            ripple_cadence_ms: 400,
            ripple_lifetime_ms: 1000,
            waveform_width: 220,
            waveform_height: 60,
        }
    }
}

impl AppSettings {
    pub fn max_recording(&self) -> Option<u64> {
        (self.max_recording_secs > 0).then_some(self.max_recording_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms.max(1))
    }

    pub fn ripple_cadence(&self) -> Duration {
        Duration::from_millis(self.ripple_cadence_ms)
    }

    pub fn ripple_lifetime(&self) -> Duration {
        Duration::from_millis(self.ripple_lifetime_ms)
    }

    /// Apply environment overrides on top of persisted values.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(api_base) = std::env::var(API_BASE_ENV) {
            let api_base = api_base.trim();
            if !api_base.is_empty() {
                log::debug!("Settings: {} overrides api_base", API_BASE_ENV);
                self.api_base = api_base.to_string();
            }
        }
        self
    }

    /// `api_base` without a trailing slash.
    pub fn api_base(&self) -> &str {
        self.api_base.trim_end_matches('/')
    }
}

pub fn settings_path() -> Result<PathBuf, String> {
    let dir = dirs::config_dir().ok_or_else(|| "Could not determine config directory".to_string())?;
    Ok(dir.join(APP_DIR_NAME).join(SETTINGS_FILE_NAME))
}

/// Load persisted settings and apply environment overrides. Never fails:
/// missing or unreadable files fall back to defaults.
pub fn load_settings() -> AppSettings {
    let settings = match settings_path() {
        Ok(path) => load_settings_from(&path),
        Err(e) => {
            log::warn!("Settings: {}", e);
            AppSettings::default()
        }
    };
    settings.with_env_overrides()
}

pub fn load_settings_from(path: &Path) -> AppSettings {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<AppSettings>(&contents) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Settings: failed to parse {:?}: {}", path, e);
                AppSettings::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => AppSettings::default(),
        Err(e) => {
            log::warn!("Settings: failed to read {:?}: {}", path, e);
            AppSettings::default()
        }
    }
}

pub fn save_settings(settings: &AppSettings) -> Result<(), String> {
    save_settings_to(&settings_path()?, settings)
}

pub fn save_settings_to(path: &Path, settings: &AppSettings) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory {:?}: {}", parent, e))?;
    }

    let contents =
        serde_json::to_string_pretty(settings).map_err(|e| format!("Serialize settings: {}", e))?;

    // Write to a temp file in the same directory, then rename over the target.
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &contents)
        .map_err(|e| format!("Write temp settings {:?}: {}", tmp_path, e))?;

    // Windows rename fails if the destination exists.
    if cfg!(windows) && path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(format!("Remove existing settings file {:?}: {}", path, e));
            }
        }
    }

    std::fs::rename(&tmp_path, path)
        .map_err(|e| format!("Rename temp settings {:?} to {:?}: {}", tmp_path, path, e))?;
    Ok(())
}
