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

use log::{info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;

use gamestate_client::{
    FetchError, GameServer, MonitorEvent, MonitoredEntity, Poller, PollerConfig, ServerAddress,
    ServerListSource, StatusRecord, StatusSource,
};

use crate::settings::Settings;

/// A poller started by [`MonitorManager::apply_settings`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedEntity {
    pub game: String,
    pub address: String,
    pub generation: u64,
}

/// Outcome of reconciling pollers against settings
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Reconciled {
    /// Newly started or restarted pollers, in server-list order
    pub started: Vec<StartedEntity>,

    /// Games whose poller was stopped and not restarted
    pub stopped: Vec<String>,
}

/// Owns one poller per enabled game, each with its own lifecycle
pub struct MonitorManager<S> {
    /// Running pollers keyed by game
    pollers: HashMap<String, Poller>,

    source: Arc<S>,
    events: mpsc::Sender<MonitorEvent>,
    config: PollerConfig,

    /// Last server list fetched by `sync_servers`
    servers: Vec<GameServer>,

    /// Generation handed to the next poller started
    next_generation: u64,
}

impl<S> std::fmt::Debug for MonitorManager<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorManager")
            .field("pollers", &self.pollers)
            .field("servers", &self.servers.len())
            .field("next_generation", &self.next_generation)
            .finish_non_exhaustive()
    }
}

impl<S: StatusSource> MonitorManager<S> {
    pub fn new(source: Arc<S>, events: mpsc::Sender<MonitorEvent>, config: PollerConfig) -> Self {
        Self {
            pollers: HashMap::new(),
            source,
            events,
            config,
            servers: Vec::new(),
            next_generation: 1,
        }
    }

    /// Bring the running pollers in line with `settings` and the server
    /// list. Unchanged pollers keep running; changed ones are restarted
    /// with a new generation.
    pub fn apply_settings(&mut self, settings: &Settings, servers: &[GameServer]) -> Reconciled {
        let mut desired = Vec::new();
        let mut seen = HashSet::new();

        for server in servers {
            let game = settings.game(&server.game);
            if !game.enabled || !seen.insert(server.game.as_str()) {
                continue;
            }

            match ServerAddress::parse(&server.address) {
                Ok(address) => desired.push(MonitoredEntity::new(
                    server.game.clone(),
                    address,
                    game.poll_interval(),
                )),
                Err(e) => warn!("[{}] Skipping server '{}': {}", server.game, server.address, e),
            }
        }

        let mut result = Reconciled::default();

        // Stop pollers for games that are disabled or gone
        let retired: Vec<String> = self
            .pollers
            .keys()
            .filter(|game| !desired.iter().any(|entity| &entity.game == *game))
            .cloned()
            .collect();
        for game in retired {
            self.stop(&game);
            result.stopped.push(game);
        }

        for entity in desired {
            if self
                .pollers
                .get(&entity.game)
                .is_some_and(|poller| *poller.entity() == entity)
            {
                continue;
            }
            result.started.push(self.start(entity));
        }

        result.stopped.sort();
        result
    }

    /// Fetch the server list and reconcile against it. Listed games missing
    /// from `live` get default entries. On failure nothing changes and the
    /// caller retries later.
    pub async fn sync_servers<L: ServerListSource>(
        &mut self,
        list: &L,
        live: &mut Arc<Settings>,
    ) -> Result<Reconciled, FetchError> {
        let servers = list.fetch_server_list().await?;
        info!("Server list has {} game(s)", servers.len());

        Arc::make_mut(live).ensure_games(servers.iter().map(|s| s.game.as_str()));
        let reconciled = self.apply_settings(live, &servers);
        self.servers = servers;
        Ok(reconciled)
    }

    /// Whether a non-empty server list has been fetched
    pub fn servers_loaded(&self) -> bool {
        !self.servers.is_empty()
    }

    /// Start (or replace) the poller for `entity`
    pub fn start(&mut self, entity: MonitoredEntity) -> StartedEntity {
        let generation = self.next_generation;
        self.next_generation += 1;

        let game = entity.game.clone();
        if let Some(previous) = self.pollers.remove(&game) {
            info!(
                "[{}] Restarting poller ({} every {} -> {} every {})",
                game,
                previous.entity().address,
                previous.entity().interval,
                entity.address,
                entity.interval
            );
            previous.stop();
        }

        let started = StartedEntity {
            game: game.clone(),
            address: entity.address.to_string(),
            generation,
        };
        let poller = Poller::spawn(
            entity,
            generation,
            Arc::clone(&self.source),
            self.events.clone(),
            self.config.clone(),
        );
        self.pollers.insert(game, poller);
        started
    }

    /// Stop the poller for `game`. Returns false if none was running.
    pub fn stop(&mut self, game: &str) -> bool {
        if let Some(poller) = self.pollers.remove(game) {
            info!("[{}] Stopping poller", game);
            poller.stop();
            true
        } else {
            warn!("Attempted to stop non-existent poller: {}", game);
            false
        }
    }

    /// Stop every poller
    pub fn stop_all(&mut self) {
        if !self.pollers.is_empty() {
            info!("Stopping {} poller(s)", self.pollers.len());
        }
        for (_, poller) in self.pollers.drain() {
            poller.stop();
        }
    }

    /// Games with a running poller, sorted
    pub fn running_games(&self) -> Vec<String> {
        let mut games: Vec<String> = self.pollers.keys().cloned().collect();
        games.sort();
        games
    }

    /// Last successfully fetched record for `game`
    pub fn latest_record(&self, game: &str) -> Option<Arc<StatusRecord>> {
        self.pollers.get(game).and_then(Poller::latest)
    }
}

impl<S> Drop for MonitorManager<S> {
    fn drop(&mut self) {
        info!("Shutting down MonitorManager - stopping all pollers");
        for (_, poller) in self.pollers.drain() {
            poller.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::GameSettings;
    use crate::status::StatusBoard;
    use gamestate_client::FetchError;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Serves scripted responses in order, repeating the last one
    struct FakeSource {
        responses: Mutex<VecDeque<Result<StatusRecord, u16>>>,
        hosts: Mutex<Vec<String>>,
    }

    impl FakeSource {
        fn new(responses: Vec<Result<StatusRecord, u16>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                hosts: Mutex::new(Vec::new()),
            })
        }
    }

    impl StatusSource for FakeSource {
        async fn fetch_status(&self, host: &str) -> Result<StatusRecord, FetchError> {
            self.hosts.lock().unwrap().push(host.to_string());
            let mut responses = self.responses.lock().unwrap();
            let next = if responses.len() > 1 {
                responses.pop_front().unwrap()
            } else {
                responses.front().cloned().unwrap()
            };
            next.map_err(FetchError::Status)
        }
    }

    /// Serves scripted server lists in order, repeating the last one
    struct FakeList {
        lists: Mutex<VecDeque<Result<Vec<GameServer>, String>>>,
        calls: AtomicUsize,
    }

    impl FakeList {
        fn new(lists: Vec<Result<Vec<GameServer>, String>>) -> Self {
            Self {
                lists: Mutex::new(lists.into()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl ServerListSource for FakeList {
        async fn fetch_server_list(&self) -> Result<Vec<GameServer>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut lists = self.lists.lock().unwrap();
            let next = if lists.len() > 1 {
                lists.pop_front().unwrap()
            } else {
                lists.front().cloned().unwrap()
            };
            next.map_err(FetchError::Network)
        }
    }

    fn served() -> StatusRecord {
        serde_json::from_str(
            r#"{"name":"Server A","current_map":"de_dust2","num_players":10,"max_players":20,"players_detailed":{}}"#,
        )
        .unwrap()
    }

    fn server(game: &str, address: &str) -> GameServer {
        GameServer {
            game: game.to_string(),
            address: address.to_string(),
        }
    }

    fn settings(games: &[(&str, bool, u64)]) -> Settings {
        let mut settings = Settings::default();
        for &(game, enabled, interval) in games {
            settings
                .games
                .insert(game.to_string(), GameSettings { enabled, interval });
        }
        settings
    }

    fn manager(
        source: Arc<FakeSource>,
    ) -> (MonitorManager<FakeSource>, mpsc::Receiver<MonitorEvent>) {
        let (tx, rx) = mpsc::channel(64);
        let config = PollerConfig {
            probe_on_refresh: false,
            ..Default::default()
        };
        (MonitorManager::new(source, tx, config), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_survives_later_failure() {
        let source = FakeSource::new(vec![Ok(served()), Err(500)]);
        let (mut manager, mut rx) = manager(Arc::clone(&source));
        let mut board = StatusBoard::new(5);

        let result = manager.apply_settings(
            &settings(&[("css", true, 60)]),
            &[server("css", "1.2.3.4:27015")],
        );
        assert_eq!(result.started.len(), 1);
        let started = &result.started[0];
        board.register_panel(&started.game, &started.address, started.generation);

        let event = rx.recv().await.unwrap();
        assert!(board.apply_event(&event));
        assert_eq!(manager.latest_record("css").as_deref(), Some(&served()));

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(*source.hosts.lock().unwrap(), ["1.2.3.4", "1.2.3.4"]);
        assert!(rx.try_recv().is_err());
        assert_eq!(manager.latest_record("css").as_deref(), Some(&served()));
        assert_eq!(
            board.panel("css").unwrap().record.as_deref(),
            Some(&served())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_enabled_games_start() {
        let (mut manager, _rx) = manager(FakeSource::new(vec![Ok(served())]));
        let result = manager.apply_settings(
            &settings(&[("css", true, 60), ("tf2", false, 60)]),
            &[
                server("css", "1.2.3.4:27015"),
                server("tf2", "5.6.7.8:27015"),
                server("cs2", "9.9.9.9:27015"),
            ],
        );

        assert_eq!(result.started.len(), 1);
        assert_eq!(manager.running_games(), ["css"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconcile_restarts_changed_and_stops_disabled() {
        let (mut manager, _rx) = manager(FakeSource::new(vec![Ok(served())]));
        let servers = [server("css", "1.2.3.4:27015"), server("tf2", "5.6.7.8:27015")];

        let first = manager.apply_settings(&settings(&[("css", true, 60), ("tf2", true, 60)]), &servers);
        assert_eq!(first.started.len(), 2);

        // Unchanged settings leave everything alone
        let same = manager.apply_settings(&settings(&[("css", true, 60), ("tf2", true, 60)]), &servers);
        assert_eq!(same, Reconciled::default());

        let changed = manager.apply_settings(&settings(&[("css", true, 30), ("tf2", false, 60)]), &servers);
        assert_eq!(changed.stopped, ["tf2"]);
        assert_eq!(changed.started.len(), 1);
        assert_eq!(changed.started[0].game, "css");
        assert!(changed.started[0].generation > first.started[1].generation);
        assert_eq!(manager.running_games(), ["css"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_address_change_restarts_poller() {
        let (mut manager, _rx) = manager(FakeSource::new(vec![Ok(served())]));
        let settings = settings(&[("css", true, 60)]);

        manager.apply_settings(&settings, &[server("css", "1.2.3.4:27015")]);
        let moved = manager.apply_settings(&settings, &[server("css", "1.2.3.5:27015")]);
        assert_eq!(moved.started[0].address, "1.2.3.5:27015");
        assert!(moved.stopped.is_empty());

        let gone = manager.apply_settings(&settings, &[]);
        assert_eq!(gone.stopped, ["css"]);
        assert!(manager.running_games().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_address_is_skipped() {
        let (mut manager, _rx) = manager(FakeSource::new(vec![Ok(served())]));
        let result = manager.apply_settings(
            &settings(&[("css", true, 60), ("tf2", true, 60)]),
            &[server("css", "no-port"), server("tf2", "5.6.7.8:27015")],
        );
        assert_eq!(manager.running_games(), ["tf2"]);
        assert_eq!(result.started.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_all_discards_late_results() {
        let source = FakeSource::new(vec![Ok(served())]);
        let (mut manager, mut rx) = manager(Arc::clone(&source));
        manager.apply_settings(&settings(&[("css", true, 1)]), &[server("css", "1.2.3.4:27015")]);
        rx.recv().await.unwrap();

        manager.stop_all();
        assert!(manager.running_games().is_empty());
        assert!(!manager.stop("css"));

        let calls = source.hosts.lock().unwrap().len();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(source.hosts.lock().unwrap().len(), calls);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_list_failure_then_success() {
        let (mut manager, mut rx) = manager(FakeSource::new(vec![Ok(served())]));
        let list = FakeList::new(vec![
            Err("connection refused".to_string()),
            Ok(vec![server("css", "1.2.3.4:27015"), server("tf2", "5.6.7.8:27015")]),
        ]);
        let mut live = Arc::new(settings(&[("css", true, 60)]));

        let err = manager.sync_servers(&list, &mut live).await.unwrap_err();
        assert!(matches!(err, FetchError::Network(_)));
        assert!(!manager.servers_loaded());
        assert!(manager.running_games().is_empty());

        let reconciled = manager.sync_servers(&list, &mut live).await.unwrap();
        assert_eq!(list.calls.load(Ordering::SeqCst), 2);
        assert!(manager.servers_loaded());
        assert_eq!(reconciled.started.len(), 1);
        assert_eq!(manager.running_games(), ["css"]);

        // Games only the server knows about get disabled defaults
        assert_eq!(live.game("tf2"), GameSettings::default());
        assert!(live.games.contains_key("tf2"));

        let mut board = StatusBoard::new(5);
        let started = &reconciled.started[0];
        board.register_panel(&started.game, &started.address, started.generation);
        assert!(board.apply_event(&rx.recv().await.unwrap()));
        assert_eq!(board.panel("css").unwrap().record.as_deref(), Some(&served()));
    }
}
