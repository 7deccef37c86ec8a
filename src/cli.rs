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

use clap::Parser;
use std::path::PathBuf;

use gamestate_client::PollInterval;

/// GameStates Desktop: live player counts, maps and latency for game servers
///
/// Polls the status API for every enabled game, probes each server's
/// reachability and prints a panel per server until interrupted.
#[derive(Debug, Parser, Clone)]
#[command(about, long_about, version)]
pub struct Cli {
    /// Settings file (per-game enabled/interval, window preferences).
    #[arg(short, long)]
    pub settings: Option<PathBuf>,

    /// Status API base URL.
    #[arg(short, long)]
    pub base_url: Option<String>,

    /// Directory for cached icons and map thumbnails.
    #[arg(short, long)]
    pub resources_dir: Option<PathBuf>,

    /// Enable a game, optionally with its poll interval in seconds.
    ///
    /// May be repeated.
    #[arg(short, long, value_name = "GAME[:SECONDS]", value_parser = parse_enable)]
    pub enable: Vec<GameToggle>,

    /// Disable a game. May be repeated.
    #[arg(short, long, value_name = "GAME")]
    pub disable: Vec<String>,

    /// Window width in pixels (200-2000).
    #[arg(short, long)]
    pub width: Option<u32>,

    /// Main window background alpha (0-255).
    #[arg(short, long)]
    pub transparency: Option<u8>,

    /// Print the server list and exit.
    #[arg(short, long)]
    pub list_games: bool,

    /// Write the effective application config back to disk.
    #[arg(long)]
    pub save_config: bool,
}

impl Cli {
    /// Whether any flag edits the persisted settings
    pub fn edits_settings(&self) -> bool {
        !self.enable.is_empty()
            || !self.disable.is_empty()
            || self.width.is_some()
            || self.transparency.is_some()
    }
}

/// `--enable` argument: game key plus optional interval
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameToggle {
    pub game: String,
    pub interval: Option<u64>,
}

fn parse_enable(arg: &str) -> Result<GameToggle, String> {
    let (game, interval) = match arg.split_once(':') {
        Some((game, secs)) => {
            let secs: u64 = secs
                .parse()
                .map_err(|e| format!("`{secs}` is not a valid interval: {e}"))?;
            let interval = PollInterval::from_secs(secs).map_err(|e| e.to_string())?;
            (game, Some(interval.as_secs()))
        }
        None => (arg, None),
    };

    if game.is_empty() {
        return Err("game key must not be empty".to_string());
    }

    Ok(GameToggle {
        game: game.to_string(),
        interval,
    })
}
