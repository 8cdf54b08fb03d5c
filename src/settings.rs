use anyhow::{anyhow, Result};
use log::{info, warn};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::transport::Endpoints;

pub const MIN_POLL_INTERVAL_SECS: u64 = 10;
pub const MAX_POLL_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

pub const ENV_READ_URL: &str = "SMSDECK_READ_URL";
pub const ENV_WRITE_URL: &str = "SMSDECK_WRITE_URL";
pub const ENV_POLL_INTERVAL: &str = "SMSDECK_POLL_INTERVAL";

/// User settings, persisted as a JSON blob
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub read_url: String,
    pub write_url: String,
    pub poll_interval_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            read_url: String::new(),
            write_url: String::new(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
        }
    }
}

impl Settings {
    /// Polling interval clamped to the supported range
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(
            self.poll_interval_secs
                .clamp(MIN_POLL_INTERVAL_SECS, MAX_POLL_INTERVAL_SECS),
        )
    }

    pub fn endpoints(&self) -> Endpoints {
        Endpoints {
            read_url: self.read_url.trim().to_string(),
            write_url: self.write_url.trim().to_string(),
        }
    }

    /// Apply environment variable overrides on top of the stored values
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var(ENV_READ_URL) {
            self.read_url = url;
        }
        if let Ok(url) = std::env::var(ENV_WRITE_URL) {
            self.write_url = url;
        }
        if let Ok(interval) = std::env::var(ENV_POLL_INTERVAL) {
            match interval.trim().parse::<u64>() {
                Ok(secs) => self.poll_interval_secs = secs,
                Err(e) => warn!("Ignoring {}='{}': {}", ENV_POLL_INTERVAL, interval, e),
            }
        }
        self
    }
}

static SETTINGS_PATH_OVERRIDE: OnceCell<PathBuf> = OnceCell::new();

/// Use `path` for the settings file for the rest of the process
pub fn set_settings_path_override(path: PathBuf) {
    if SETTINGS_PATH_OVERRIDE.set(path).is_err() {
        warn!("Settings path override already set, ignoring");
    }
}

pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| anyhow!("Could not determine config directory"))?
        .join("smsdeck");

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

fn get_settings_path() -> Result<PathBuf> {
    if let Some(path) = SETTINGS_PATH_OVERRIDE.get() {
        return Ok(path.clone());
    }
    Ok(get_config_dir()?.join("settings.json"))
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    save_settings_to(&get_settings_path()?, settings)
}

pub fn load_settings() -> Result<Settings> {
    load_settings_from(&get_settings_path()?)
}

pub fn save_settings_to(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, settings)?;

    info!("Settings saved to {}", path.display());
    Ok(())
}

/// Load settings from `path`; a missing file yields the defaults
pub fn load_settings_from(path: &Path) -> Result<Settings> {
    if !path.exists() {
        info!("No settings file at {}, using defaults", path.display());
        return Ok(Settings::default());
    }

    let mut file = File::open(path)?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;

    let settings: Settings = serde_json::from_str(&contents)
        .map_err(|e| anyhow!("Invalid settings file {}: {}", path.display(), e))?;
    info!("Loaded settings from {}", path.display());

    Ok(settings)
}
