/// Configuration for the funnel backend.
/// Reads backend.json from ~/.config/funnel/backend.json (or platform equivalent).
use funnel_core::config::UserIdentity;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Base URL of the record store. Absent means local-only mode.
    #[serde(default)]
    pub store_url: Option<String>,
    #[serde(default)]
    pub store_token: Option<String>,
    /// Pipeline slug opened when the UI state has none.
    #[serde(default)]
    pub pipeline: Option<String>,
    #[serde(default)]
    pub poll_interval_secs: Option<u64>,
}

fn default_port() -> u16 {
    8080
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            store_url: None,
            store_token: None,
            pipeline: None,
            poll_interval_secs: None,
        }
    }
}

impl BackendConfig {
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(funnel_core::config::UNREAD_POLL_INTERVAL)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// ~/.config/funnel
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("funnel")
}

pub fn default_config_path() -> PathBuf {
    config_dir().join("backend.json")
}

pub fn default_identity_path() -> PathBuf {
    config_dir().join("identity.json")
}

/// Load config from path. Returns default if the file is missing or invalid.
pub fn load_config(path: &Path) -> BackendConfig {
    match fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
            log::warn!("[funnel.config] Failed to parse config {}: {}", path.display(), e);
            BackendConfig::default()
        }),
        Err(_) => {
            log::info!("[funnel.config] No config at {}, using defaults", path.display());
            BackendConfig::default()
        }
    }
}

/// Read the acting user, creating a staff identity on first run.
pub fn load_or_create_identity(path: &Path) -> Result<UserIdentity, ConfigError> {
    match fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let identity = UserIdentity {
                id: uuid::Uuid::new_v4().to_string(),
                name: whoami_fallback(),
                email: None,
                manager: false,
            };
            write_json(path, &identity)?;
            log::info!(
                "[funnel.config] Created identity {} at {}",
                identity.id,
                path.display()
            );
            Ok(identity)
        }
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn whoami_fallback() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "Local user".to_string())
}

pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ConfigError> {
    let io_err = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let json = serde_json::to_string_pretty(value).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, json).map_err(io_err)
}
