use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub mod dead_links;
pub mod dedupe;
pub mod grouping;
pub mod importer;
pub mod navigator;
pub mod session;
pub mod storage;
pub mod tree;

#[cfg(feature = "desktop")]
mod commands;

pub use dead_links::{filter_dead_links, DeadLinkReport, HttpProbe, LinkProbe, ProbeProgress};
pub use dedupe::dedupe;
pub use grouping::group_by_site;
pub use importer::{parse, parse_bytes, ParseError};
pub use navigator::Navigator;
pub use session::{DedupeOutcome, Session, SessionError};
pub use storage::{FileStore, KeyValueStore, MemoryStore, StorageError};
pub use tree::{flatten, Bookmark, Folder, Node, SortOrder, Tree};

pub const DEFAULT_STORAGE_KEY: &str = "bookmarksData";

// App settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Key the bookmark tree is stored under.
    pub storage_key: String,
    /// Pause between two reachability probes, in milliseconds.
    pub probe_pace_ms: u64,
    pub probe_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            probe_pace_ms: 1000,
            probe_timeout_secs: 10,
        }
    }
}

impl Settings {
    pub fn probe_pace(&self) -> Duration {
        Duration::from_millis(self.probe_pace_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs.max(1))
    }
}

// Load settings from disk, falling back to defaults
pub fn load_settings(path: &Path) -> Settings {
    if path.exists() {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default()
    } else {
        Settings::default()
    }
}

// Save settings to disk
pub fn save_settings(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(feature = "desktop")]
pub use commands::run;
