// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! User settings: which games are monitored, how often, and the widget's
//! window preferences.
//!
//! The settings file is a JSON object keyed by game key, plus two
//! top-level window preferences:
//!
//! ```json
//! {
//!     "css": { "enabled": true, "interval": 60 },
//!     "main_window_transparency": 128,
//!     "window_width": 600
//! }
//! ```
//!
//! Live settings are shared as `Arc<Settings>` and never mutated in place.
//! Edits go through a [`SettingsSession`], which holds the snapshot taken
//! when editing began and a copy-on-write draft. Committing persists the
//! draft and hands it back as the new live value; cancelling hands back the
//! untouched snapshot.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use gamestate_client::PollInterval;
use log::{info, warn};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub const MIN_WINDOW_WIDTH: u32 = 200;
pub const MAX_WINDOW_WIDTH: u32 = 2000;
const DEFAULT_WINDOW_WIDTH: u32 = 600;
const DEFAULT_TRANSPARENCY: u8 = 128;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write settings file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Per-game monitoring settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSettings {
    #[serde(default)]
    pub enabled: bool,

    /// Poll interval in seconds (1-3600)
    #[serde(default = "default_interval")]
    pub interval: u64,
}

fn default_interval() -> u64 {
    PollInterval::DEFAULT_SECS
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: default_interval(),
        }
    }
}

impl GameSettings {
    #[must_use]
    pub fn poll_interval(&self) -> PollInterval {
        PollInterval::clamped(self.interval)
    }
}

/// All user settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Background alpha of the main window (0-255)
    #[serde(default = "default_transparency", deserialize_with = "saturating_u8")]
    pub main_window_transparency: u8,

    /// Window width in pixels (200-2000)
    #[serde(default = "default_window_width")]
    pub window_width: u32,

    /// Per-game settings keyed by game key
    #[serde(flatten)]
    pub games: BTreeMap<String, GameSettings>,
}

fn default_transparency() -> u8 {
    DEFAULT_TRANSPARENCY
}

fn default_window_width() -> u32 {
    DEFAULT_WINDOW_WIDTH
}

fn saturating_u8<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let value = i64::deserialize(deserializer)?;
    Ok(u8::try_from(value.clamp(0, 255)).unwrap_or(u8::MAX))
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            main_window_transparency: DEFAULT_TRANSPARENCY,
            window_width: DEFAULT_WINDOW_WIDTH,
            games: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Settings for `game`, falling back to the defaults (disabled, 60s)
    #[must_use]
    pub fn game(&self, game: &str) -> GameSettings {
        self.games.get(game).copied().unwrap_or_default()
    }

    /// Add default entries for games that have none yet
    pub fn ensure_games<'a>(&mut self, games: impl IntoIterator<Item = &'a str>) {
        for game in games {
            self.games.entry(game.to_string()).or_default();
        }
    }

    /// Keys of all enabled games
    pub fn enabled_games(&self) -> impl Iterator<Item = &str> {
        self.games
            .iter()
            .filter(|(_, game)| game.enabled)
            .map(|(key, _)| key.as_str())
    }

    /// Clamp every value into its accepted range, logging what changed
    pub fn normalize(&mut self) {
        let width = self.window_width.clamp(MIN_WINDOW_WIDTH, MAX_WINDOW_WIDTH);
        if width != self.window_width {
            warn!("window_width {} out of range, using {}", self.window_width, width);
            self.window_width = width;
        }

        for (key, game) in &mut self.games {
            let interval = game.poll_interval().as_secs();
            if interval != game.interval {
                warn!("[{}] interval {}s out of range, using {}s", key, game.interval, interval);
                game.interval = interval;
            }
        }
    }
}

/// Reads and writes the settings file
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load settings. A missing file yields defaults.
    pub fn load(&self) -> Result<Settings, SettingsError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Settings::default()),
            Err(source) => {
                return Err(SettingsError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let mut settings: Settings =
            serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
                path: self.path.clone(),
                source,
            })?;
        settings.normalize();
        Ok(settings)
    }

    /// Load settings, falling back to defaults when the file is unusable
    pub fn load_or_default(&self) -> Settings {
        match self.load() {
            Ok(settings) => settings,
            Err(e) => {
                warn!("{}; using default settings", e);
                Settings::default()
            }
        }
    }

    /// Write settings as pretty-printed JSON, replacing the file atomically
    pub fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        let json = serde_json::to_string_pretty(settings)?;
        let write_err = |source| SettingsError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }

        let mut tmp = self.path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, json).map_err(write_err)?;
        std::fs::rename(&tmp, &self.path).map_err(write_err)?;

        info!("Settings saved to {}", self.path.display());
        Ok(())
    }
}

/// An edit session over the live settings
#[derive(Debug)]
pub struct SettingsSession {
    snapshot: Arc<Settings>,
    draft: Arc<Settings>,
}

impl SettingsSession {
    /// Start editing. The snapshot is the live value as of now.
    pub fn begin(live: &Arc<Settings>) -> Self {
        Self {
            snapshot: Arc::clone(live),
            draft: Arc::clone(live),
        }
    }

    fn draft_mut(&mut self) -> &mut Settings {
        Arc::make_mut(&mut self.draft)
    }

    pub fn set_game_enabled(&mut self, game: &str, enabled: bool) {
        self.draft_mut().games.entry(game.to_string()).or_default().enabled = enabled;
    }

    /// Set a game's poll interval, clamped to 1-3600 seconds
    pub fn set_game_interval(&mut self, game: &str, secs: u64) {
        let interval = PollInterval::clamped(secs).as_secs();
        self.draft_mut().games.entry(game.to_string()).or_default().interval = interval;
    }

    pub fn set_transparency(&mut self, alpha: u8) {
        self.draft_mut().main_window_transparency = alpha;
    }

    /// Set the window width, clamped to 200-2000 pixels
    pub fn set_window_width(&mut self, width: u32) {
        self.draft_mut().window_width = width.clamp(MIN_WINDOW_WIDTH, MAX_WINDOW_WIDTH);
    }

    /// Draft for temporary application (window alpha and width) while
    /// editing; nothing is persisted
    pub fn preview(&self) -> &Settings {
        &self.draft
    }

    /// Whether the draft differs from the snapshot
    pub fn is_dirty(&self) -> bool {
        *self.draft != *self.snapshot
    }

    /// Persist the draft and return it as the new live settings. On error
    /// the caller keeps its current live settings.
    pub fn commit(self, store: &SettingsStore) -> Result<Arc<Settings>, SettingsError> {
        store.save(&self.draft)?;
        Ok(self.draft)
    }

    /// Discard the draft and return the snapshot taken at `begin`
    pub fn cancel(self) -> Arc<Settings> {
        self.snapshot
    }
}
