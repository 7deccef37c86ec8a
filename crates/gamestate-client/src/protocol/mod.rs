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

//! Status API wire format and the data source abstraction.
//!
//! The API serves two documents:
//!
//! ```text
//! GET {base}/        -> { "<game>": "<host>:<port>", ... }
//! GET {base}/{host}  -> { "name", "current_map", "num_players", "max_players",
//!                         "players_detailed": { "<timestamp>": <count>, ... } }
//! ```
//!
//! Both maps are order-sensitive (the sample series is chronological), so
//! they are decoded into vectors in document order rather than hash maps.

mod http;

pub use http::HttpDataSource;

use std::fmt;
use std::future::Future;

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::Deserialize;

use crate::error::FetchError;

/// One historical player-count sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerSample {
    pub timestamp: String,
    pub count: u32,
}

/// Latest known snapshot of a game server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StatusRecord {
    pub name: String,
    pub current_map: String,
    #[serde(deserialize_with = "lenient_count")]
    pub num_players: u32,
    #[serde(deserialize_with = "lenient_count")]
    pub max_players: u32,
    /// Historical player counts, oldest first.
    #[serde(default, deserialize_with = "ordered_samples")]
    pub players_detailed: Vec<PlayerSample>,
}

impl StatusRecord {
    /// Decode a status document.
    pub fn from_json(body: &str) -> Result<Self, FetchError> {
        serde_json::from_str(body).map_err(|e| FetchError::Payload(e.to_string()))
    }

    /// Players formatted as `current/max`.
    #[must_use]
    pub fn players_label(&self) -> String {
        format!("{}/{}", self.num_players, self.max_players)
    }
}

/// One entry of the server list: game key and its raw `host:port` address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameServer {
    pub game: String,
    pub address: String,
}

/// Decode the server list document, preserving document order.
pub fn parse_server_list(body: &str) -> Result<Vec<GameServer>, FetchError> {
    let ServerList(servers) =
        serde_json::from_str(body).map_err(|e| FetchError::Payload(e.to_string()))?;
    Ok(servers)
}

/// Source of status records for a host.
///
/// Implemented by [`HttpDataSource`] for the live API; tests provide their
/// own implementations.
pub trait StatusSource: Send + Sync + 'static {
    /// Fetch the current status record for `host`.
    fn fetch_status(&self, host: &str)
        -> impl Future<Output = Result<StatusRecord, FetchError>> + Send;
}

/// Source of the game key to server address list.
pub trait ServerListSource: Send + Sync + 'static {
    /// Fetch the server list in document order.
    fn fetch_server_list(&self) -> impl Future<Output = Result<Vec<GameServer>, FetchError>> + Send;
}

struct ServerList(Vec<GameServer>);

impl<'de> Deserialize<'de> for ServerList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ServerListVisitor;

        impl<'de> Visitor<'de> for ServerListVisitor {
            type Value = ServerList;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of game key to server address")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<ServerList, A::Error> {
                let mut servers = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((game, address)) = map.next_entry::<String, String>()? {
                    servers.push(GameServer { game, address });
                }
                Ok(ServerList(servers))
            }
        }

        deserializer.deserialize_map(ServerListVisitor)
    }
}

/// Player counts arrive as numbers or as numeric strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum Count {
    Number(u64),
    Text(String),
}

impl Count {
    fn into_u32<E: de::Error>(self) -> Result<u32, E> {
        match self {
            Count::Number(n) => {
                u32::try_from(n).map_err(|_| E::custom(format!("player count out of range: {n}")))
            }
            Count::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("not a player count: {s:?}"))),
        }
    }
}

fn lenient_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    Count::deserialize(deserializer)?.into_u32()
}

fn ordered_samples<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<PlayerSample>, D::Error> {
    struct SamplesVisitor;

    impl<'de> Visitor<'de> for SamplesVisitor {
        type Value = Vec<PlayerSample>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of timestamp to player count")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut samples = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((timestamp, count)) = map.next_entry::<String, Count>()? {
                samples.push(PlayerSample {
                    timestamp,
                    count: count.into_u32()?,
                });
            }
            Ok(samples)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }
    }

    deserializer.deserialize_any(SamplesVisitor)
}
