//! Workspace path layout and user settings.
//!
//! # Responsibility
//! - Derive every on-disk location from the workspace root.
//! - Read `metro.*` keys from the workspace editor settings file.
//!
//! # Invariants
//! - Settings loading never fails; unreadable settings fall back to defaults.

use log::{info, warn};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

pub const LAYOUT_DIR_NAME: &str = ".vscode";
pub const LAYOUT_FILE_NAME: &str = "metro-layout.json";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const STATE_DB_FILE_NAME: &str = "metro-state.sqlite3";
pub const LOG_DIR_NAME: &str = "metro-logs";
pub const NOTE_DIR_NAME: &str = ".Note";
pub const TASK_DIR_NAME: &str = "task";

const SHOW_INACTIVE_STATIONS_KEY: &str = "metro.showInactiveStations";
const ARCHIVE_AFTER_HOURS_KEY: &str = "metro.archiveAfterHours";
const DEFAULT_ARCHIVE_AFTER_HOURS: f64 = 24.0;
const HOUR_MS: f64 = 60.0 * 60.0 * 1000.0;

/// Filesystem locations for one workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspacePaths {
    pub root: PathBuf,
    pub layout_dir: PathBuf,
    pub layout_file: PathBuf,
    pub settings_file: PathBuf,
    pub state_db: PathBuf,
    pub log_dir: PathBuf,
    pub note_dir: PathBuf,
    pub task_dir: PathBuf,
}

impl WorkspacePaths {
    /// Relative roots are resolved against the current directory, so every
    /// derived path (and every bound `filePath`) is absolute.
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = std::path::absolute(&root).unwrap_or(root);
        let layout_dir = root.join(LAYOUT_DIR_NAME);
        let note_dir = root.join(NOTE_DIR_NAME);
        Self {
            layout_file: layout_dir.join(LAYOUT_FILE_NAME),
            settings_file: layout_dir.join(SETTINGS_FILE_NAME),
            state_db: layout_dir.join(STATE_DB_FILE_NAME),
            log_dir: layout_dir.join(LOG_DIR_NAME),
            task_dir: note_dir.join(TASK_DIR_NAME),
            layout_dir,
            note_dir,
            root,
        }
    }

    /// Whether `path` lives under the task directory.
    pub fn is_task_path(&self, path: &Path) -> bool {
        path.starts_with(&self.task_dir)
    }
}

/// User-tunable behavior read from editor settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetroSettings {
    /// Whether the canvas renders `missing` stations.
    pub show_inactive_stations: bool,
    /// Completed tasks older than this move from the open list to done.
    pub archive_after_ms: i64,
}

impl Default for MetroSettings {
    fn default() -> Self {
        Self {
            show_inactive_stations: true,
            archive_after_ms: (DEFAULT_ARCHIVE_AFTER_HOURS * HOUR_MS) as i64,
        }
    }
}

impl MetroSettings {
    /// Loads settings for a workspace, falling back to defaults.
    pub fn load(paths: &WorkspacePaths) -> Self {
        let content = match std::fs::read_to_string(&paths.settings_file) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(err) => {
                warn!(
                    "event=settings_load module=config status=error path={} error={}",
                    paths.settings_file.display(),
                    err
                );
                return Self::default();
            }
        };

        match serde_json::from_str::<Map<String, Value>>(&content) {
            Ok(map) => {
                let settings = Self::from_map(&map);
                info!(
                    "event=settings_load module=config status=ok show_inactive={} archive_after_ms={}",
                    settings.show_inactive_stations, settings.archive_after_ms
                );
                settings
            }
            Err(err) => {
                warn!(
                    "event=settings_load module=config status=error path={} error={}",
                    paths.settings_file.display(),
                    err
                );
                Self::default()
            }
        }
    }

    fn from_map(map: &Map<String, Value>) -> Self {
        let defaults = Self::default();
        let show_inactive_stations = map
            .get(SHOW_INACTIVE_STATIONS_KEY)
            .and_then(Value::as_bool)
            .unwrap_or(defaults.show_inactive_stations);
        let archive_after_ms = map
            .get(ARCHIVE_AFTER_HOURS_KEY)
            .and_then(Value::as_f64)
            .filter(|hours| hours.is_finite() && *hours >= 0.0)
            .map(|hours| (hours * HOUR_MS) as i64)
            .unwrap_or(defaults.archive_after_ms);
        Self {
            show_inactive_stations,
            archive_after_ms,
        }
    }
}
