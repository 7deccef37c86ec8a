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

//! Application configuration management.
//!
//! Endpoint URLs, resource locations and the request timeout, stored in
//! TOML through confy. Reachability probes always use the fixed 2 s
//! timeout. Per-game monitoring choices and window preferences live
//! in the separate settings file (see `settings`).

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

const APP_NAME: &str = "gamestates-desktop";

/// Default status API endpoint
pub const DEFAULT_API_BASE_URL: &str = "http://gamestates.ru:8000/";

/// Default host serving game icons and map thumbnails
pub const DEFAULT_IMAGE_BASE_URL: &str = "https://gamestates.ru";

/// Application configuration stored in TOML format
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AppConfig {
    /// Status API base URL
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Image host base URL
    #[serde(default = "default_image_base_url")]
    pub image_base_url: String,

    /// Directory holding cached icons and map thumbnails
    #[serde(default)]
    pub resources_dir: Option<PathBuf>,

    /// Settings file path (defaults next to this config)
    #[serde(default)]
    pub settings_path: Option<PathBuf>,

    /// Timeout for status and image requests, in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Number of panels expanded when the widget opens
    #[serde(default = "default_expanded_panels")]
    pub expanded_panels: usize,
}

// Default value functions for serde
fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_image_base_url() -> String {
    DEFAULT_IMAGE_BASE_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    5
}

fn default_expanded_panels() -> usize {
    5
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            image_base_url: default_image_base_url(),
            resources_dir: None,
            settings_path: None,
            request_timeout_secs: default_request_timeout_secs(),
            expanded_panels: default_expanded_panels(),
        }
    }
}

impl AppConfig {
    /// Load configuration from disk, writing defaults on first run
    pub fn load() -> Result<Self, confy::ConfyError> {
        confy::load(APP_NAME, "config")
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<(), confy::ConfyError> {
        confy::store(APP_NAME, "config", self)
    }

    /// Get the config file path for display to user
    pub fn get_config_path() -> Result<PathBuf, confy::ConfyError> {
        confy::get_configuration_file_path(APP_NAME, "config")
    }

    /// Request timeout, never below one second
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Resolved resources directory
    pub fn resources_dir(&self) -> PathBuf {
        self.resources_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from(".cache"))
                .join(APP_NAME)
                .join("resources")
        })
    }

    /// Resolved settings file path
    pub fn settings_path(&self) -> PathBuf {
        self.settings_path.clone().unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_NAME)
                .join("settings.json")
        })
    }
}
