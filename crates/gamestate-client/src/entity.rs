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

//! Monitored entities: a game key, the server address and its poll interval.

use std::fmt;
use std::time::Duration;

use crate::error::{AddressError, IntervalError};

/// Validated poll interval in whole seconds (1..=3600).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PollInterval(u64);

impl PollInterval {
    pub const MIN_SECS: u64 = 1;
    pub const MAX_SECS: u64 = 3600;
    pub const DEFAULT_SECS: u64 = 60;

    /// Create an interval, rejecting values outside the accepted range.
    pub fn from_secs(secs: u64) -> Result<Self, IntervalError> {
        if (Self::MIN_SECS..=Self::MAX_SECS).contains(&secs) {
            Ok(Self(secs))
        } else {
            Err(IntervalError {
                value: secs,
                min: Self::MIN_SECS,
                max: Self::MAX_SECS,
            })
        }
    }

    /// Create an interval, saturating into the accepted range.
    #[must_use]
    pub fn clamped(secs: u64) -> Self {
        Self(secs.clamp(Self::MIN_SECS, Self::MAX_SECS))
    }

    #[must_use]
    pub fn as_secs(self) -> u64 {
        self.0
    }

    #[must_use]
    pub fn as_duration(self) -> Duration {
        Duration::from_secs(self.0)
    }
}

impl Default for PollInterval {
    fn default() -> Self {
        Self(Self::DEFAULT_SECS)
    }
}

impl fmt::Display for PollInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

/// Server address in `host:port` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerAddress {
    host: String,
    port: u16,
}

impl ServerAddress {
    /// Parse `host:port`. Exactly one colon is accepted, so bare IPv6
    /// literals are rejected the same way the status API rejects them.
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let mut parts = input.trim().split(':');
        let (Some(host), Some(port), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(AddressError::Format(input.to_string()));
        };
        if host.is_empty() {
            return Err(AddressError::Format(input.to_string()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| AddressError::Port(input.to_string()))?;

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One monitored game server. Immutable for the lifetime of its poller;
/// a configuration change replaces the entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoredEntity {
    /// Game key as used by the status API (e.g. "css").
    pub game: String,
    pub address: ServerAddress,
    pub enabled: bool,
    pub interval: PollInterval,
}

impl MonitoredEntity {
    #[must_use]
    pub fn new(game: impl Into<String>, address: ServerAddress, interval: PollInterval) -> Self {
        Self {
            game: game.into(),
            address,
            enabled: true,
            interval,
        }
    }
}
