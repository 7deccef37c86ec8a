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

//! Text rendering of the status board.
//!
//! Each panel is a header line (indicator, server name, players, latency),
//! a detail line (game, map, address, age), and, when expanded, a sparkline
//! of the historical player counts.

use chrono::Utc;
use gamestate_client::PlayerSample;

use crate::settings::{Settings, MAX_WINDOW_WIDTH, MIN_WINDOW_WIDTH};
use crate::status::{DiagnosticLevel, Indicator, PanelState, StatusBoard};

const SPARK_LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

// Approximate pixel width of one monospace cell
const PIXELS_PER_COLUMN: u32 = 8;

const INDENT: &str = "       ";

#[derive(Debug)]
pub struct StatusPane {
    columns: usize,
}

impl StatusPane {
    pub fn new(settings: &Settings) -> Self {
        let mut pane = Self { columns: 0 };
        pane.apply_settings(settings);
        pane
    }

    /// Follow the configured window width
    fn apply_settings(&mut self, settings: &Settings) {
        let width = settings.window_width.clamp(MIN_WINDOW_WIDTH, MAX_WINDOW_WIDTH);
        self.columns = usize::try_from(width / PIXELS_PER_COLUMN).unwrap_or(usize::MAX);
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Render every panel, separated by blank lines
    pub fn render_board(&self, board: &StatusBoard) -> String {
        if board.panels().is_empty() {
            return "No games enabled. Use --enable GAME[:SECONDS] to add one.".to_string();
        }

        board
            .panels()
            .iter()
            .map(|panel| self.render_panel(panel))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Render one panel
    pub fn render_panel(&self, panel: &PanelState) -> String {
        let indicator = match panel.indicator() {
            Indicator::Up => "[up]",
            Indicator::Down => "[down]",
            Indicator::Unknown => "[--]",
        };

        let (title, players) = match &panel.record {
            Some(record) => (record.name.clone(), record.players_label()),
            None => (format!("{} (waiting for data)", panel.game), "-/-".to_string()),
        };

        let right = format!("{players}  {}", panel.latency_label());
        let left_width = self
            .columns
            .saturating_sub(INDENT.len() + right.chars().count() + 1);
        let header = format!(
            "{indicator:<7}{:<left_width$} {right}",
            truncate(&title, left_width)
        );

        let mut details = vec![panel.game.clone()];
        if let Some(record) = &panel.record {
            details.push(record.current_map.clone());
        }
        details.push(panel.address.clone());
        if let Some(updated) = panel.last_updated {
            let age = (Utc::now() - updated).num_seconds().max(0);
            details.push(format!("updated {} ago", format_duration(age.unsigned_abs())));
        }
        let detail_width = self.columns.saturating_sub(INDENT.len());
        let mut lines = vec![
            header,
            format!("{INDENT}{}", truncate(&details.join(" · "), detail_width)),
        ];

        if panel.expanded {
            if let Some(record) = panel.record.as_ref().filter(|r| !r.players_detailed.is_empty()) {
                let samples = &record.players_detailed;
                let peak = samples.iter().map(|s| s.count).max().unwrap_or(0);
                let suffix = format!("  peak {peak}");
                let chart_width = detail_width.saturating_sub(suffix.len()).max(1);
                lines.push(format!("{INDENT}{}{suffix}", sparkline(samples, chart_width)));
            }

            let images: Vec<String> = [("icon", &panel.icon), ("map", &panel.map_thumbnail)]
                .into_iter()
                .filter_map(|(label, path)| {
                    let name = path.as_ref()?.file_name()?.to_string_lossy().into_owned();
                    Some(format!("{label} {name}"))
                })
                .collect();
            if !images.is_empty() {
                lines.push(format!("{INDENT}{}", truncate(&images.join(" · "), detail_width)));
            }
        }

        lines.join("\n")
    }

    /// Render the newest `limit` diagnostics, oldest first
    pub fn render_diagnostics(&self, board: &StatusBoard, limit: usize) -> String {
        let skip = board.diagnostics.len().saturating_sub(limit);
        board
            .diagnostics
            .iter()
            .skip(skip)
            .map(|d| {
                let level = match d.level {
                    DiagnosticLevel::Info => "info",
                    DiagnosticLevel::Warning => "warn",
                };
                let line = format!("{} {level} {}", d.timestamp.format("%H:%M:%S"), d.message);
                truncate(&line, self.columns)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Player-count chart scaled to the series maximum, newest samples last.
/// Only the most recent `width` samples are drawn.
pub fn sparkline(samples: &[PlayerSample], width: usize) -> String {
    let visible = &samples[samples.len().saturating_sub(width)..];
    let max = visible.iter().map(|s| s.count).max().unwrap_or(0).max(1);
    let top = SPARK_LEVELS.len() - 1;

    visible
        .iter()
        .map(|s| {
            let level = u64::from(s.count) * top as u64 / u64::from(max);
            SPARK_LEVELS[usize::try_from(level).unwrap_or(top).min(top)]
        })
        .collect()
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars == 0 {
        return String::new();
    }
    let mut out: String = text.chars().take(max_chars - 1).collect();
    out.push('…');
    out
}

fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}
