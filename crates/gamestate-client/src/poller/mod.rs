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

//! Per-entity status polling.
//!
//! A [`Poller`] owns one background task that ticks at the entity's
//! interval. Every tick spawns an independent fetch, so a slow request
//! never delays the next tick; when fetches overlap the last one to finish
//! wins. Successful fetches replace the stored record wholesale and emit a
//! [`MonitorEvent`]; failures are logged and leave the stored record alone.
//!
//! Stopping the poller (explicitly or by dropping it) cancels the ticker
//! and any in-flight fetch or probe; nothing is emitted after that.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::entity::MonitoredEntity;
use crate::probe::{self, ProbeResult, PROBE_TIMEOUT};
use crate::protocol::{StatusRecord, StatusSource};

/// Update pushed to the presentation side.
///
/// `generation` identifies which start of the entity's poller produced the
/// event, so a receiver can drop stragglers from a poller it already
/// replaced.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    StatusUpdated {
        game: String,
        generation: u64,
        record: Arc<StatusRecord>,
    },
    ProbeCompleted {
        game: String,
        generation: u64,
        result: ProbeResult,
    },
}

impl MonitorEvent {
    #[must_use]
    pub fn game(&self) -> &str {
        match self {
            Self::StatusUpdated { game, .. } | Self::ProbeCompleted { game, .. } => game,
        }
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        match self {
            Self::StatusUpdated { generation, .. } | Self::ProbeCompleted { generation, .. } => {
                *generation
            }
        }
    }
}

/// Poller tuning.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Timeout for each reachability probe.
    pub probe_timeout: Duration,
    /// Probe after every successful refresh. The first fetch is immediate,
    /// so the first probe follows it.
    pub probe_on_refresh: bool,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            probe_timeout: PROBE_TIMEOUT,
            probe_on_refresh: true,
        }
    }
}

type RecordSlot = Arc<RwLock<Option<Arc<StatusRecord>>>>;

struct PollContext<S> {
    entity: MonitoredEntity,
    generation: u64,
    source: Arc<S>,
    latest: RecordSlot,
    events: mpsc::Sender<MonitorEvent>,
    cancel_token: CancellationToken,
    config: PollerConfig,
}

impl<S: StatusSource> PollContext<S> {
    async fn poll_once(self: Arc<Self>) {
        let game = &self.entity.game;

        let result = tokio::select! {
            result = self.source.fetch_status(self.entity.address.host()) => result,
            () = self.cancel_token.cancelled() => {
                debug!("[{}] Poll abandoned, poller stopped", game);
                return;
            }
        };

        let record = match result {
            Ok(record) => Arc::new(record),
            Err(e) => {
                warn!("[{}] Status poll failed ({:?}): {}", game, e.kind(), e);
                return;
            }
        };

        if self.cancel_token.is_cancelled() {
            return;
        }

        if let Ok(mut slot) = self.latest.write() {
            *slot = Some(Arc::clone(&record));
        }
        debug!("[{}] Status refreshed: {} on {}", game, record.players_label(), record.current_map);

        self.emit(MonitorEvent::StatusUpdated {
            game: game.clone(),
            generation: self.generation,
            record,
        })
        .await;

        if self.config.probe_on_refresh {
            Arc::clone(&self).spawn_probe();
        }
    }

    fn spawn_probe(self: Arc<Self>) {
        let mut handle = probe::spawn_probe(self.entity.address.to_string(), self.config.probe_timeout);
        tokio::spawn(async move {
            let joined = tokio::select! {
                joined = &mut handle => Some(joined),
                () = self.cancel_token.cancelled() => None,
            };
            let result = match joined {
                Some(Ok(result)) => result,
                Some(Err(e)) => {
                    debug!("[{}] Probe task ended early: {}", self.entity.game, e);
                    return;
                }
                None => {
                    handle.abort();
                    return;
                }
            };

            self.emit(MonitorEvent::ProbeCompleted {
                game: self.entity.game.clone(),
                generation: self.generation,
                result,
            })
            .await;
        });
    }

    async fn emit(&self, event: MonitorEvent) {
        if self.cancel_token.is_cancelled() {
            return;
        }
        if self.events.send(event).await.is_err() {
            debug!("[{}] Event receiver dropped", self.entity.game);
        }
    }
}

async fn poll_loop<S: StatusSource>(ctx: Arc<PollContext<S>>) {
    let mut ticker = tokio::time::interval(ctx.entity.interval.as_duration());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                tokio::spawn(Arc::clone(&ctx).poll_once());
            }
            () = ctx.cancel_token.cancelled() => {
                info!("[{}] Poller stopped", ctx.entity.game);
                return;
            }
        }
    }
}

/// Handle to a running per-entity poller.
pub struct Poller {
    entity: MonitoredEntity,
    generation: u64,
    latest: RecordSlot,
    cancel_token: CancellationToken,
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("game", &self.entity.game)
            .field("generation", &self.generation)
            .field("cancel_token", &self.cancel_token)
            .finish_non_exhaustive()
    }
}

impl Poller {
    /// Start polling `entity`. The first fetch happens immediately, then
    /// once per interval. Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn<S: StatusSource>(
        entity: MonitoredEntity,
        generation: u64,
        source: Arc<S>,
        events: mpsc::Sender<MonitorEvent>,
        config: PollerConfig,
    ) -> Self {
        let latest: RecordSlot = Arc::new(RwLock::new(None));
        let cancel_token = CancellationToken::new();

        info!(
            "[{}] Starting poller for {} every {}",
            entity.game, entity.address, entity.interval
        );

        let ctx = Arc::new(PollContext {
            entity: entity.clone(),
            generation,
            source,
            latest: Arc::clone(&latest),
            events,
            cancel_token: cancel_token.clone(),
            config,
        });
        tokio::spawn(poll_loop(ctx));

        Self {
            entity,
            generation,
            latest,
            cancel_token,
        }
    }

    #[must_use]
    pub fn entity(&self) -> &MonitoredEntity {
        &self.entity
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Last successfully fetched record, if any.
    #[must_use]
    pub fn latest(&self) -> Option<Arc<StatusRecord>> {
        self.latest.read().map(|slot| slot.clone()).unwrap_or(None)
    }

    /// Cancel the ticker and any in-flight work.
    pub fn stop(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{PollInterval, ServerAddress};
    use crate::error::FetchError;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Serves scripted responses in order, repeating the last one.
    struct ScriptedSource {
        responses: Mutex<VecDeque<Result<StatusRecord, u16>>>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(responses: Vec<Result<StatusRecord, u16>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl StatusSource for ScriptedSource {
        async fn fetch_status(&self, _host: &str) -> Result<StatusRecord, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = {
                let mut responses = self.responses.lock().unwrap();
                if responses.len() > 1 {
                    responses.pop_front().unwrap()
                } else {
                    responses.front().cloned().unwrap()
                }
            };
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            next.map_err(FetchError::Status)
        }
    }

    fn record(name: &str, players: u32) -> StatusRecord {
        StatusRecord {
            name: name.to_string(),
            current_map: "de_dust2".to_string(),
            num_players: players,
            max_players: 20,
            players_detailed: Vec::new(),
        }
    }

    fn entity(interval: u64) -> MonitoredEntity {
        MonitoredEntity::new(
            "css",
            ServerAddress::parse("1.2.3.4:27015").unwrap(),
            PollInterval::from_secs(interval).unwrap(),
        )
    }

    fn no_probe() -> PollerConfig {
        PollerConfig {
            probe_on_refresh: false,
            ..Default::default()
        }
    }

    async fn next_status(rx: &mut mpsc::Receiver<MonitorEvent>) -> Arc<StatusRecord> {
        loop {
            match rx.recv().await.expect("channel closed") {
                MonitorEvent::StatusUpdated { record, .. } => return record,
                MonitorEvent::ProbeCompleted { .. } => {}
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_then_failure_keeps_record() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(record("Server A", 10)), Err(500)]));
        let (tx, mut rx) = mpsc::channel(16);
        let poller = Poller::spawn(entity(60), 1, Arc::clone(&source), tx, no_probe());

        let first = next_status(&mut rx).await;
        assert_eq!(*first, record("Server A", 10));
        assert_eq!(poller.latest().as_deref(), Some(&record("Server A", 10)));

        // Second tick serves HTTP 500
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(source.calls(), 2);
        assert_eq!(poller.latest().as_deref(), Some(&record("Server A", 10)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_replaces_whole_record() {
        let mut replacement = record("Server B", 3);
        replacement.current_map = "cs_office".to_string();
        replacement.max_players = 16;

        let source = Arc::new(ScriptedSource::new(vec![
            Ok(record("Server A", 10)),
            Ok(replacement.clone()),
        ]));
        let (tx, mut rx) = mpsc::channel(16);
        let poller = Poller::spawn(entity(5), 1, source, tx, no_probe());

        next_status(&mut rx).await;
        let second = next_status(&mut rx).await;
        assert_eq!(*second, replacement);
        assert_eq!(poller.latest().as_deref(), Some(&replacement));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_at_configured_interval() {
        for interval in [1_u64, 7, 3600] {
            let source = Arc::new(ScriptedSource::new(vec![Ok(record("A", 1))]));
            let (tx, _rx) = mpsc::channel(64);
            let _poller = Poller::spawn(entity(interval), 1, Arc::clone(&source), tx, no_probe());

            tokio::time::sleep(Duration::from_millis(10)).await;
            assert_eq!(source.calls(), 1, "immediate first fetch for {interval}s");

            tokio::time::sleep(Duration::from_secs(interval) * 3).await;
            assert_eq!(source.calls(), 4, "three more fetches for {interval}s");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_fetch_never_notifies() {
        let source = Arc::new(ScriptedSource::new(vec![Err(503)]));
        let (tx, mut rx) = mpsc::channel(16);
        let poller = Poller::spawn(entity(1), 1, Arc::clone(&source), tx, no_probe());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(source.calls() >= 5);
        assert!(poller.latest().is_none());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_discards_in_flight_poll() {
        let source = Arc::new(
            ScriptedSource::new(vec![Ok(record("Server A", 10))]).with_delay(Duration::from_secs(3)),
        );
        let (tx, mut rx) = mpsc::channel(16);
        let poller = Poller::spawn(entity(60), 1, Arc::clone(&source), tx, no_probe());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(source.calls(), 1);
        poller.stop();
        assert!(poller.is_stopped());

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(source.calls(), 1);
        assert!(poller.latest().is_none());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_polling() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(record("A", 1))]));
        let (tx, _rx) = mpsc::channel(16);
        let poller = Poller::spawn(entity(1), 1, Arc::clone(&source), tx, no_probe());

        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(poller);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_polls_do_not_wait() {
        // Each fetch takes longer than the interval
        let source = Arc::new(
            ScriptedSource::new(vec![Ok(record("A", 1))]).with_delay(Duration::from_secs(5)),
        );
        let (tx, _rx) = mpsc::channel(16);
        let _poller = Poller::spawn(entity(2), 1, Arc::clone(&source), tx, no_probe());

        tokio::time::sleep(Duration::from_millis(4_100)).await;
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn test_probe_event_carries_generation() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let source = Arc::new(ScriptedSource::new(vec![Ok(record("Server A", 10))]));
        let (tx, mut rx) = mpsc::channel(16);
        let mut local = entity(60);
        local.address = ServerAddress::parse(&listener.local_addr().unwrap().to_string()).unwrap();
        let _poller = Poller::spawn(local, 7, source, tx, PollerConfig::default());

        assert!(matches!(rx.recv().await.unwrap(), MonitorEvent::StatusUpdated { .. }));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.game(), "css");
        assert_eq!(event.generation(), 7);
        assert!(matches!(
            event,
            MonitorEvent::ProbeCompleted { result: ProbeResult::Latency(_), .. }
        ));
    }

    #[tokio::test]
    async fn test_one_reachability_check_after_first_refresh() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let source = Arc::new(ScriptedSource::new(vec![Ok(record("Server A", 10))]));
        let (tx, mut rx) = mpsc::channel(16);
        let mut local = entity(60);
        local.address = ServerAddress::parse(&listener.local_addr().unwrap().to_string()).unwrap();
        let _poller = Poller::spawn(local, 1, source, tx, PollerConfig::default());

        let mut probes = 0;
        while let Ok(Some(event)) = tokio::time::timeout(Duration::from_millis(500), rx.recv()).await {
            if matches!(event, MonitorEvent::ProbeCompleted { .. }) {
                probes += 1;
            }
        }
        assert_eq!(probes, 1);
    }

    #[test]
    fn test_default_reachability_timeout_is_two_seconds() {
        assert_eq!(PollerConfig::default().probe_timeout, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_failed_fetch_skips_reachability_check() {
        let source = Arc::new(ScriptedSource::new(vec![Err(500)]));
        let (tx, mut rx) = mpsc::channel(16);
        let _poller = Poller::spawn(entity(60), 1, source, tx, PollerConfig::default());

        let next = tokio::time::timeout(Duration::from_millis(300), rx.recv()).await;
        assert!(next.is_err());
    }
}
