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

//! Client library for game-server status feeds.
//!
//! The library is split into layers that can be used independently:
//!
//! - **Protocol layer**: the status API wire format and [`StatusSource`],
//!   with [`HttpDataSource`] for the live endpoint
//! - **Probe layer**: one-shot TCP reachability/latency probes
//! - **Poller layer**: per-entity interval polling with cancellation,
//!   pushing [`MonitorEvent`]s to the presentation side
//! - **Cache layer**: on-disk icon and map thumbnail cache
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use gamestate_client::{
//!     HttpDataSource, MonitorEvent, MonitoredEntity, PollInterval, Poller, PollerConfig,
//!     ServerAddress,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let source = Arc::new(
//!         HttpDataSource::new("http://gamestates.ru:8000/", Duration::from_secs(5)).unwrap(),
//!     );
//!     let (tx, mut rx) = tokio::sync::mpsc::channel(64);
//!
//!     let entity = MonitoredEntity::new(
//!         "css",
//!         ServerAddress::parse("1.2.3.4:27015").unwrap(),
//!         PollInterval::from_secs(60).unwrap(),
//!     );
//!     let _poller = Poller::spawn(entity, 1, source, tx, PollerConfig::default());
//!
//!     while let Some(event) = rx.recv().await {
//!         match event {
//!             MonitorEvent::StatusUpdated { record, .. } => {
//!                 println!("{}: {}", record.name, record.players_label());
//!             }
//!             MonitorEvent::ProbeCompleted { result, .. } => println!("ping {result}"),
//!         }
//!     }
//! }
//! ```
//!
//! # Probe Layer Only
//!
//! ```no_run
//! use gamestate_client::probe::{probe, PROBE_TIMEOUT};
//!
//! # async fn example() {
//! let result = probe("1.2.3.4:27015", PROBE_TIMEOUT).await;
//! println!("{result}");
//! # }
//! ```

pub mod cache;
pub mod entity;
pub mod error;
pub mod poller;
pub mod probe;
pub mod protocol;

pub use cache::{FetchedImage, HttpImageFetcher, ImageCache, ImageFetcher, ImageKey};
pub use entity::{MonitoredEntity, PollInterval, ServerAddress};
pub use error::{AddressError, CacheError, FailureKind, FetchError, IntervalError};
pub use poller::{MonitorEvent, Poller, PollerConfig};
pub use probe::{ProbeResult, PROBE_TIMEOUT};
pub use protocol::{
    GameServer, HttpDataSource, PlayerSample, ServerListSource, StatusRecord, StatusSource,
};
