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

mod cli;
mod config;
mod monitor_manager;
mod settings;
mod status;
mod status_pane;

use clap::Parser;
use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use gamestate_client::{
    CacheError, FetchError, HttpDataSource, HttpImageFetcher, ImageCache, ImageKey, MonitorEvent,
    PollInterval, PollerConfig, ServerListSource,
};

use cli::Cli;
use config::AppConfig;
use monitor_manager::{MonitorManager, Reconciled};
use settings::{Settings, SettingsSession, SettingsStore};
use status::{DiagnosticLevel, StatusBoard};
use status_pane::StatusPane;

// Diagnostics shown under the panels
const DIAGNOSTIC_LINES: usize = 5;

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error("status API unavailable: {0}")]
    Fetch(#[from] FetchError),

    #[error("image cache unavailable: {0}")]
    Cache(#[from] CacheError),

    #[error("failed to wait for shutdown signal: {0}")]
    Signal(#[from] std::io::Error),
}

/// Which panel slot a resolved image belongs to
#[derive(Debug)]
enum ResolvedImage {
    Icon {
        game: String,
        generation: u64,
        path: PathBuf,
    },
    MapThumbnail {
        game: String,
        generation: u64,
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    debug!("{:?}", cli);

    if let Err(e) = run(cli).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> AppConfig {
    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!("Failed to load config ({}), using defaults", e);
        AppConfig::default()
    });

    if let Some(url) = &cli.base_url {
        config.api_base_url.clone_from(url);
    }
    if let Some(dir) = &cli.resources_dir {
        config.resources_dir = Some(dir.clone());
    }
    if let Some(path) = &cli.settings {
        config.settings_path = Some(path.clone());
    }

    if cli.save_config {
        match (config.save(), AppConfig::get_config_path()) {
            (Ok(()), Ok(path)) => info!("Config saved to {}", path.display()),
            (Ok(()), Err(_)) => info!("Config saved"),
            (Err(e), _) => warn!("Failed to save config: {}", e),
        }
    }

    config
}

/// Apply the CLI's settings edits through an edit session. The live
/// settings are only replaced once the edit is persisted.
fn apply_cli_edits(cli: &Cli, live: Arc<Settings>, store: &SettingsStore) -> Arc<Settings> {
    let mut session = SettingsSession::begin(&live);

    for toggle in &cli.enable {
        session.set_game_enabled(&toggle.game, true);
        if let Some(interval) = toggle.interval {
            session.set_game_interval(&toggle.game, interval);
        }
    }
    for game in &cli.disable {
        session.set_game_enabled(game, false);
    }
    if let Some(width) = cli.width {
        session.set_window_width(width);
    }
    if let Some(alpha) = cli.transparency {
        session.set_transparency(alpha);
    }

    if !session.is_dirty() {
        return session.cancel();
    }
    debug!("Settings draft: {:?}", session.preview());

    match session.commit(store) {
        Ok(settings) => settings,
        Err(e) => {
            warn!("{}; keeping previous settings", e);
            live
        }
    }
}

fn spawn_image_resolve(
    cache: &ImageCache,
    key: ImageKey,
    game: String,
    generation: u64,
    tx: mpsc::Sender<ResolvedImage>,
) {
    let cache = cache.clone();
    tokio::spawn(async move {
        let is_map = matches!(key, ImageKey::Map { .. });
        let path = cache.resolve(&key).await;
        let resolved = if is_map {
            ResolvedImage::MapThumbnail {
                game,
                generation,
                path,
            }
        } else {
            ResolvedImage::Icon {
                game,
                generation,
                path,
            }
        };
        let _ = tx.send(resolved).await;
    });
}

fn apply_reconciled(
    board: &mut StatusBoard,
    reconciled: &Reconciled,
    cache: &ImageCache,
    images: &mpsc::Sender<ResolvedImage>,
) {
    for game in &reconciled.stopped {
        board.unregister_panel(game);
    }
    for started in &reconciled.started {
        board.register_panel(&started.game, &started.address, started.generation);
        spawn_image_resolve(
            cache,
            ImageKey::icon(started.game.as_str()),
            started.game.clone(),
            started.generation,
            images.clone(),
        );
    }
}

fn redraw(pane: &StatusPane, board: &StatusBoard) {
    print!("\x1b[2J\x1b[H");
    println!("{}", pane.render_board(board));
    let diagnostics = pane.render_diagnostics(board, DIAGNOSTIC_LINES);
    if !diagnostics.is_empty() {
        println!("{}\n{diagnostics}", "─".repeat(pane.columns()));
    }
}

/// A typed line is a panel number (1-based) or a game key
fn panel_for_input<'a>(board: &'a StatusBoard, input: &str) -> Option<&'a str> {
    let input = input.trim();
    let panel = match input.parse::<usize>() {
        Ok(n) => board.panels().get(n.checked_sub(1)?),
        Err(_) => board.panel(input),
    };
    panel.map(|p| p.game.as_str())
}

/// Fetch the server list and bring pollers and panels in line with it.
/// A failure leaves everything as it was.
async fn sync_servers(
    manager: &mut MonitorManager<HttpDataSource>,
    source: &HttpDataSource,
    live: &mut Arc<Settings>,
    board: &mut StatusBoard,
    cache: &ImageCache,
    images: &mpsc::Sender<ResolvedImage>,
) {
    match manager.sync_servers(source, live).await {
        Ok(reconciled) => apply_reconciled(board, &reconciled, cache, images),
        Err(e) => {
            warn!("Failed to fetch server list ({:?}): {}", e.kind(), e);
            board.add_diagnostic(DiagnosticLevel::Warning, format!("Server list unavailable: {e}"));
        }
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let config = load_config(&cli);
    let source = Arc::new(HttpDataSource::new(
        config.api_base_url.as_str(),
        config.request_timeout(),
    )?);

    if cli.list_games {
        for server in source.fetch_server_list().await? {
            println!("{}\t{}", server.game, server.address);
        }
        return Ok(());
    }

    let store = SettingsStore::new(config.settings_path());
    let mut live = Arc::new(store.load_or_default());
    if cli.edits_settings() {
        live = apply_cli_edits(&cli, live, &store);
    }
    info!(
        "Settings from {}: window {}px wide, background alpha {}, enabled: [{}]",
        store.path().display(),
        live.window_width,
        live.main_window_transparency,
        live.enabled_games().collect::<Vec<_>>().join(", ")
    );

    let cache = ImageCache::new(
        config.resources_dir(),
        config.image_base_url.as_str(),
        HttpImageFetcher::new(config.request_timeout())?,
    )?;

    let (event_tx, mut event_rx) = mpsc::channel::<MonitorEvent>(256);
    let (image_tx, mut image_rx) = mpsc::channel::<ResolvedImage>(64);

    let mut manager = MonitorManager::new(Arc::clone(&source), event_tx, PollerConfig::default());
    let mut board = StatusBoard::new(config.expanded_panels);
    let pane = StatusPane::new(&live);

    sync_servers(&mut manager, &source, &mut live, &mut board, &cache, &image_tx).await;
    redraw(&pane, &board);

    // Server list retries while none has been fetched yet
    let retry_period = PollInterval::default().as_duration();
    let mut retry = tokio::time::interval_at(tokio::time::Instant::now() + retry_period, retry_period);
    retry.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let mut input_open = true;

    loop {
        tokio::select! {
            Some(event) = event_rx.recv() => {
                let previous_map = board
                    .panel(event.game())
                    .and_then(|p| p.record.as_ref())
                    .map(|r| r.current_map.clone());

                if !board.apply_event(&event) {
                    continue;
                }

                if let MonitorEvent::StatusUpdated { game, generation, record } = &event {
                    if !record.current_map.is_empty()
                        && previous_map.as_deref() != Some(record.current_map.as_str())
                    {
                        spawn_image_resolve(
                            &cache,
                            ImageKey::map(game.as_str(), record.current_map.as_str()),
                            game.clone(),
                            *generation,
                            image_tx.clone(),
                        );
                    }
                }
                redraw(&pane, &board);
            }
            Some(resolved) = image_rx.recv() => {
                match resolved {
                    ResolvedImage::Icon { game, generation, path } => {
                        debug!("[{}] Icon at {}", game, path.display());
                        board.set_icon(&game, generation, path);
                    }
                    ResolvedImage::MapThumbnail { game, generation, path } => {
                        debug!("[{}] Map thumbnail at {}", game, path.display());
                        board.set_map_thumbnail(&game, generation, path);
                    }
                }
            }
            _ = retry.tick(), if !manager.servers_loaded() => {
                sync_servers(&mut manager, &source, &mut live, &mut board, &cache, &image_tx).await;
                redraw(&pane, &board);
            }
            line = input.next_line(), if input_open => {
                match line {
                    Ok(Some(line)) => {
                        let game = panel_for_input(&board, &line).map(str::to_string);
                        if let Some(game) = game {
                            board.toggle(&game);
                            redraw(&pane, &board);
                        }
                    }
                    Ok(None) => input_open = false,
                    Err(e) => {
                        warn!("Failed to read input: {}", e);
                        input_open = false;
                    }
                }
            }
            result = &mut shutdown => {
                result?;
                info!("Interrupted, shutting down");
                break;
            }
        }
    }

    for game in manager.running_games() {
        if let Some(record) = manager.latest_record(&game) {
            info!("[{}] Last seen {} on {}", game, record.players_label(), record.current_map);
        }
    }
    manager.stop_all();
    Ok(())
}
