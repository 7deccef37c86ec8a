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

use chrono::{DateTime, Utc};
use gamestate_client::{MonitorEvent, ProbeResult, StatusRecord};
use log::debug;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

/// Reachability indicator shown next to a panel header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    /// No probe result yet
    Unknown,
    Up,
    Down,
}

/// Diagnostic message with timestamp
#[derive(Debug, Clone)]
pub struct DiagnosticMessage {
    pub timestamp: DateTime<Utc>,
    pub level: DiagnosticLevel,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DiagnosticLevel {
    Info,
    Warning,
}

/// What one collapsible panel currently shows
#[derive(Debug, Clone)]
pub struct PanelState {
    /// Game key
    pub game: String,

    /// Server address (host:port)
    pub address: String,

    /// Generation of the poller feeding this panel
    pub generation: u64,

    /// Last successfully fetched record
    pub record: Option<Arc<StatusRecord>>,

    /// Last probe outcome
    pub probe: Option<ProbeResult>,

    /// Game icon on disk
    pub icon: Option<PathBuf>,

    /// Map thumbnail on disk
    pub map_thumbnail: Option<PathBuf>,

    /// Whether the chart section is visible
    pub expanded: bool,

    /// When the record was last replaced
    pub last_updated: Option<DateTime<Utc>>,
}

impl PanelState {
    fn new(game: String, address: String, generation: u64, expanded: bool) -> Self {
        Self {
            game,
            address,
            generation,
            record: None,
            probe: None,
            icon: None,
            map_thumbnail: None,
            expanded,
            last_updated: None,
        }
    }

    pub fn indicator(&self) -> Indicator {
        match self.probe {
            None => Indicator::Unknown,
            Some(ProbeResult::Latency(_)) => Indicator::Up,
            Some(ProbeResult::Unreachable) => Indicator::Down,
        }
    }

    /// Latency label: "-- ms" until the first probe completes
    pub fn latency_label(&self) -> String {
        self.probe
            .map_or_else(|| "-- ms".to_string(), |result| result.to_string())
    }
}

/// Presentation-side state for every monitored server.
///
/// Updates addressed to a game that has no panel, or to an older poller
/// generation than the panel's, are dropped: they come from pollers that
/// were already torn down.
#[derive(Debug)]
pub struct StatusBoard {
    panels: Vec<PanelState>,
    expanded_limit: usize,

    // Diagnostic messages (keep last 50)
    pub diagnostics: VecDeque<DiagnosticMessage>,
    max_diagnostics: usize,
}

impl StatusBoard {
    /// Create a board that opens up to `expanded_limit` panels expanded
    pub fn new(expanded_limit: usize) -> Self {
        Self {
            panels: Vec::new(),
            expanded_limit,
            diagnostics: VecDeque::with_capacity(50),
            max_diagnostics: 50,
        }
    }

    pub fn panels(&self) -> &[PanelState] {
        &self.panels
    }

    pub fn panel(&self, game: &str) -> Option<&PanelState> {
        self.panels.iter().find(|p| p.game == game)
    }

    fn panel_mut(&mut self, game: &str, generation: u64) -> Option<&mut PanelState> {
        self.panels
            .iter_mut()
            .find(|p| p.game == game && p.generation == generation)
    }

    /// Create (or recreate) the panel for a freshly started poller
    pub fn register_panel(&mut self, game: &str, address: &str, generation: u64) {
        let expanded = self.panels.iter().filter(|p| p.expanded).count() < self.expanded_limit;

        if let Some(panel) = self.panels.iter_mut().find(|p| p.game == game) {
            let expanded = panel.expanded;
            *panel = PanelState::new(game.to_string(), address.to_string(), generation, expanded);
        } else {
            self.panels.push(PanelState::new(
                game.to_string(),
                address.to_string(),
                generation,
                expanded,
            ));
        }

        self.add_diagnostic(DiagnosticLevel::Info, format!("Monitoring {game} at {address}"));
    }

    /// Tear down the panel for a stopped poller
    pub fn unregister_panel(&mut self, game: &str) -> bool {
        let before = self.panels.len();
        self.panels.retain(|p| p.game != game);
        let removed = self.panels.len() != before;
        if removed {
            self.add_diagnostic(DiagnosticLevel::Info, format!("Stopped monitoring {game}"));
        }
        removed
    }

    /// Apply a poller event. Returns false if the event was stale.
    pub fn apply_event(&mut self, event: &MonitorEvent) -> bool {
        let Some(panel) = self.panel_mut(event.game(), event.generation()) else {
            debug!(
                "[{}] Dropping event from retired poller generation {}",
                event.game(),
                event.generation()
            );
            return false;
        };

        let message = match event {
            MonitorEvent::StatusUpdated { record, .. } => {
                panel.record = Some(Arc::clone(record));
                panel.last_updated = Some(Utc::now());
                None
            }
            MonitorEvent::ProbeCompleted { result, .. } => {
                let became_unreachable = *result == ProbeResult::Unreachable
                    && panel.probe != Some(ProbeResult::Unreachable);
                panel.probe = Some(*result);
                became_unreachable.then(|| format!("{} is unreachable", panel.address))
            }
        };

        if let Some(message) = message {
            self.add_diagnostic(DiagnosticLevel::Warning, message);
        }
        true
    }

    pub fn set_icon(&mut self, game: &str, generation: u64, path: PathBuf) -> bool {
        self.panel_mut(game, generation)
            .map(|panel| panel.icon = Some(path))
            .is_some()
    }

    pub fn set_map_thumbnail(&mut self, game: &str, generation: u64, path: PathBuf) -> bool {
        self.panel_mut(game, generation)
            .map(|panel| panel.map_thumbnail = Some(path))
            .is_some()
    }

    /// Accordion toggle: expanding a panel collapses all others
    pub fn toggle(&mut self, game: &str) -> bool {
        let Some(index) = self.panels.iter().position(|p| p.game == game) else {
            return false;
        };

        if self.panels[index].expanded {
            self.panels[index].expanded = false;
        } else {
            for (i, panel) in self.panels.iter_mut().enumerate() {
                panel.expanded = i == index;
            }
        }
        true
    }

    /// Add a diagnostic message
    pub fn add_diagnostic(&mut self, level: DiagnosticLevel, message: String) {
        self.diagnostics.push_back(DiagnosticMessage {
            timestamp: Utc::now(),
            level,
            message,
        });

        // Keep only last N messages
        while self.diagnostics.len() > self.max_diagnostics {
            self.diagnostics.pop_front();
        }
    }
}
