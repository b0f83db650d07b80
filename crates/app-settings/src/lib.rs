//! Process-wide configuration: the active catalog, its cache directory,
//! and a small most-recently-used list. The pipeline itself takes all of
//! this as explicit constructor arguments; only the CLI reads it.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

const MAX_RECENT: usize = 5;

pub type Result<T> = std::result::Result<T, SettingsError>;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid settings data: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(not(target_os = "windows"))]
    #[error("Unable to locate configuration directory")]
    MissingSettingsPath,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppSettings {
    pub active_catalog: Option<PathBuf>,
    #[serde(default)]
    pub recent_catalogs: Vec<PathBuf>,
    /// Overrides the default `<catalog>.renditions` cache location.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

impl AppSettings {
    pub fn record_catalog(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        self.active_catalog = Some(path.clone());
        self.recent_catalogs.retain(|existing| existing != &path);
        self.recent_catalogs.insert(0, path);
        if self.recent_catalogs.len() > MAX_RECENT {
            self.recent_catalogs.truncate(MAX_RECENT);
        }
    }
}

/// Shared handle over [`AppSettings`], persisted on every mutation.
#[derive(Clone)]
pub struct SettingsStore {
    inner: Arc<Mutex<AppSettings>>,
}

impl SettingsStore {
    pub fn load() -> Result<Self> {
        let settings = load_impl()?;
        Ok(Self::from_settings(settings))
    }

    pub fn from_settings(settings: AppSettings) -> Self {
        Self {
            inner: Arc::new(Mutex::new(settings)),
        }
    }

    pub fn snapshot(&self) -> AppSettings {
        self.inner.lock().expect("settings poisoned").clone()
    }

    pub fn active_catalog(&self) -> Option<PathBuf> {
        self.inner
            .lock()
            .expect("settings poisoned")
            .active_catalog
            .clone()
    }

    pub fn cache_dir(&self) -> Option<PathBuf> {
        self.inner
            .lock()
            .expect("settings poisoned")
            .cache_dir
            .clone()
    }

    pub fn record_catalog(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut guard = self.inner.lock().expect("settings poisoned");
        guard.record_catalog(path);
        save_impl(&guard)
    }
}

#[cfg(target_os = "windows")]
fn load_impl() -> Result<AppSettings> {
    use winreg::enums::{HKEY_CURRENT_USER, KEY_READ};
    use winreg::RegKey;

    let hkcu = RegKey::predef(HKEY_CURRENT_USER);
    let key = hkcu
        .open_subkey_with_flags("Software\\Lumina", KEY_READ)
        .ok();

    if let Some(key) = key {
        if let Ok(payload) = key.get_value::<String, _>("AppSettings") {
            return Ok(serde_json::from_str(&payload)?);
        }
    }

    Ok(AppSettings::default())
}

#[cfg(target_os = "windows")]
fn save_impl(settings: &AppSettings) -> Result<()> {
    use winreg::enums::{HKEY_CURRENT_USER, KEY_WRITE};
    use winreg::RegKey;

    let hkcu = RegKey::predef(HKEY_CURRENT_USER);
    let (key, _) = hkcu.create_subkey_with_flags("Software\\Lumina", KEY_WRITE)?;
    let payload = serde_json::to_string(settings)?;
    key.set_value("AppSettings", &payload)?;
    Ok(())
}

#[cfg(not(target_os = "windows"))]
fn load_impl() -> Result<AppSettings> {
    let path = settings_file_path()?;
    if path.exists() {
        let payload = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&payload)?)
    } else {
        Ok(AppSettings::default())
    }
}

#[cfg(not(target_os = "windows"))]
fn save_impl(settings: &AppSettings) -> Result<()> {
    let path = settings_file_path()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let payload = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, payload)?;
    Ok(())
}

#[cfg(not(target_os = "windows"))]
fn settings_file_path() -> Result<PathBuf> {
    use directories::ProjectDirs;

    let proj_dirs =
        ProjectDirs::from("com", "Lumina", "Lumina").ok_or(SettingsError::MissingSettingsPath)?;
    let mut path = proj_dirs.config_dir().to_path_buf();
    std::fs::create_dir_all(&path)?;
    path.push("settings.json");
    Ok(path)
}
