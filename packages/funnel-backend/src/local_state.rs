/// UX continuity state kept on this machine. Never a source of board data.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{config_dir, write_json, ConfigError};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiState {
    #[serde(default)]
    pub last_pipeline: Option<String>,
}

pub fn default_ui_state_path() -> PathBuf {
    config_dir().join("ui-state.json")
}

/// Missing or unreadable state is treated as empty.
pub fn load(path: &Path) -> UiState {
    let Ok(content) = fs::read_to_string(path) else {
        return UiState::default();
    };
    serde_json::from_str(&content).unwrap_or_else(|e| {
        log::debug!("[funnel.local_state] Ignoring unreadable {}: {}", path.display(), e);
        UiState::default()
    })
}

pub fn save(path: &Path, state: &UiState) -> Result<(), ConfigError> {
    write_json(path, state)
}

/// Record the pipeline being viewed. Failures are only logged.
pub fn remember_pipeline(path: &Path, slug: &str) {
    let mut state = load(path);
    if state.last_pipeline.as_deref() == Some(slug) {
        return;
    }
    state.last_pipeline = Some(slug.to_string());
    if let Err(e) = save(path, &state) {
        log::warn!("[funnel.local_state] {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remember_pipeline_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ui-state.json");
        assert_eq!(load(&path), UiState::default());

        remember_pipeline(&path, "sales");
        assert_eq!(load(&path).last_pipeline.as_deref(), Some("sales"));
        remember_pipeline(&path, "renewals");
        assert_eq!(load(&path).last_pipeline.as_deref(), Some("renewals"));
    }

    #[test]
    fn test_corrupt_state_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ui-state.json");
        fs::write(&path, "garbage").unwrap();
        assert_eq!(load(&path), UiState::default());
    }
}
