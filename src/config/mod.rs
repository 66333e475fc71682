//! Runtime tuning configuration
//!
//! Page sizes, refresh gating, and reconciliation timing for the stores.
//! Every field has a default so a missing or partial TOML file is fine.
//! There is no process-global config cell: stores receive their tuning by
//! value at construction.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::types::error::{ChatError, Result};

/// Store tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncTuning {
    /// Page size for conversation-list fetches.
    #[serde(default = "default_conversation_page")]
    pub conversation_page_size: usize,

    /// Page size for thread message fetches.
    #[serde(default = "default_thread_page")]
    pub thread_page_size: usize,

    /// Row count reloaded by a silent refresh.
    #[serde(default = "default_refresh_window")]
    pub refresh_window: usize,

    /// Minimum milliseconds between successful silent refreshes.
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_min_interval_ms: u64,

    /// Delay before the post-send reconciliation fetch.
    #[serde(default = "default_reconcile_delay_ms")]
    pub send_reconcile_delay_ms: u64,
}

fn default_conversation_page() -> usize {
    30
}

fn default_thread_page() -> usize {
    25
}

fn default_refresh_window() -> usize {
    30
}

fn default_refresh_interval_ms() -> u64 {
    2_000
}

fn default_reconcile_delay_ms() -> u64 {
    1_500
}

impl Default for SyncTuning {
    fn default() -> Self {
        Self {
            conversation_page_size: default_conversation_page(),
            thread_page_size: default_thread_page(),
            refresh_window: default_refresh_window(),
            refresh_min_interval_ms: default_refresh_interval_ms(),
            send_reconcile_delay_ms: default_reconcile_delay_ms(),
        }
    }
}

impl SyncTuning {
    pub fn refresh_min_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_min_interval_ms)
    }

    pub fn send_reconcile_delay(&self) -> Duration {
        Duration::from_millis(self.send_reconcile_delay_ms)
    }

    /// Load tuning from the first default path that exists, falling back
    /// to defaults when no file is found or a file is unreadable.
    pub fn load() -> Self {
        for path in default_config_paths() {
            if path.exists() {
                info!("Loading sync tuning from: {:?}", path);
                match Self::load_from_path(&path) {
                    Ok(tuning) => return tuning,
                    Err(e) => warn!("Ignoring unreadable tuning file: {e}"),
                }
            }
        }
        Self::default()
    }

    /// Load tuning from a specific TOML file.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| ChatError::Config(format!("Failed to read config: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| ChatError::Config(format!("Failed to parse config: {}", e)))
    }
}

/// Get default config paths
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // XDG config path
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("pebble.chat").join("sync.toml"));
    }

    // Home directory fallback
    if let Some(home_dir) = dirs::home_dir() {
        paths.push(
            home_dir
                .join(".config")
                .join("pebble.chat")
                .join("sync.toml"),
        );
    }

    paths
}
