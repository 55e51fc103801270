use std::{
    env, fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{
    client::previz::DEFAULT_API_ROOT,
    error::{Error, Result},
    manager::{pump::PumpConfig, task_runner::RunnerConfig},
};

pub const API_ROOT_ENV: &str = "PREVIZ_API_ROOT";
pub const API_TOKEN_ENV: &str = "PREVIZ_API_TOKEN";

/// User settings, read from `settings.toml`. Every field is optional in
/// the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api_root: String,
    pub api_token: String,
    pub polling_interval_ms: u64,
    pub keep_finished_task_timeout_ms: u64,
    pub progress_notify_interval_ms: u64,
    pub cleanup_export: bool,
    pub retain_failed_tasks: bool,
    pub temporary_directory: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_root: DEFAULT_API_ROOT.to_string(),
            api_token: String::new(),
            polling_interval_ms: 250,
            keep_finished_task_timeout_ms: 2000,
            progress_notify_interval_ms: 250,
            cleanup_export: true,
            retain_failed_tasks: false,
            temporary_directory: None,
        }
    }
}

impl Settings {
    /// `<config dir>/previz/settings.toml`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("previz").join("settings.toml"))
    }

    /// Loads settings from `path`, or from the default location when `None`,
    /// then applies environment overrides.
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => Self::read(path)?,
            None => match Self::default_path() {
                Some(path) => match Self::read(&path) {
                    Err(Error::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                        debug!("No settings at {}, using defaults.", path.display());
                        Self::default()
                    }
                    other => other?,
                },
                None => Self::default(),
            },
        };
        settings.apply_overrides(|key| env::var(key).ok());
        Ok(settings)
    }

    fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let settings = Self::from_toml(&text, path)?;
        info!("Loaded settings from {}.", path.display());
        Ok(settings)
    }

    pub fn from_toml(text: &str, path: &Path) -> Result<Self> {
        toml::from_str(text).map_err(|source| Error::Settings {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies `PREVIZ_API_ROOT` and `PREVIZ_API_TOKEN` as returned by `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(root) = lookup(API_ROOT_ENV).filter(|v| !v.is_empty()) {
            self.api_root = root;
        }
        if let Some(token) = lookup(API_TOKEN_ENV).filter(|v| !v.is_empty()) {
            self.api_token = token;
        }
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            keep_finished_task_timeout: Duration::from_millis(self.keep_finished_task_timeout_ms),
            retain_failed_tasks: self.retain_failed_tasks,
        }
    }

    pub fn pump_config(&self) -> PumpConfig {
        PumpConfig {
            polling_interval: Duration::from_millis(self.polling_interval_ms),
            ..PumpConfig::default()
        }
    }

    pub fn progress_notify_interval(&self) -> Duration {
        Duration::from_millis(self.progress_notify_interval_ms)
    }

    pub fn temporary_directory(&self) -> PathBuf {
        self.temporary_directory.clone().unwrap_or_else(env::temp_dir)
    }

    /// Where a scene is exported before being uploaded.
    pub fn export_path(&self, scene_id: &str) -> PathBuf {
        self.temporary_directory().join(format!("previz-scene-{}.json", scene_id))
    }
}
