//! Runtime configuration: `.env` loading and persisted settings

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const DB_PATH_VAR: &str = "SHEET_LIBRARY_DB";
const ENV_FILE: &str = ".env";
const SETTINGS_FILE: &str = "settings.json";
const ENV_TEMPLATE: &str = "# Path to the users database (defaults to the app data directory)\nSHEET_LIBRARY_DB=\n";

/// Load environment variables for this run.
///
/// Development builds read `.env` from the working directory. Packaged builds
/// read `<config_dir>/.env`, writing an empty template there on first run.
pub fn load_runtime_env(config_dir: &Path, packaged: bool) -> io::Result<()> {
    if !packaged {
        dotenv::dotenv().ok();
        return Ok(());
    }

    let env_path = config_dir.join(ENV_FILE);
    if env_path.exists() {
        if let Err(e) = dotenv::from_path(&env_path) {
            warn!(path = %env_path.display(), error = %e, "Failed to parse env file");
        }
    } else {
        fs::create_dir_all(config_dir)?;
        fs::write(&env_path, ENV_TEMPLATE)?;
        info!(path = %env_path.display(), "Wrote env template");
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    pub path: PathBuf,
}

impl DbConfig {
    /// Database location from the environment, or `default_path` when unset.
    pub fn from_env(default_path: PathBuf) -> Self {
        Self::from_value(std::env::var(DB_PATH_VAR).ok(), default_path)
    }

    fn from_value(value: Option<String>, default_path: PathBuf) -> Self {
        let path = value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or(default_path);
        Self { path }
    }
}

/// Settings persisted between launches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub library_root: Option<String>,
}

impl Settings {
    /// Missing or unreadable files give defaults.
    pub fn load(config_dir: &Path) -> Self {
        let path = config_dir.join(SETTINGS_FILE);
        let Ok(raw) = fs::read_to_string(&path) else {
            return Self::default();
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "Ignoring malformed settings");
            Self::default()
        })
    }

    pub fn save(&self, config_dir: &Path) -> io::Result<()> {
        fs::create_dir_all(config_dir)?;
        let json = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        fs::write(config_dir.join(SETTINGS_FILE), json)
    }
}
