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

//! Reachability probe.
//!
//! A probe is a single TCP handshake against the server's `host:port`,
//! timed from connect start to the host's answer. An accepted connection
//! and a refused one (the host replied with a reset, as UDP-only game
//! servers do) both count as a round trip. Timeouts, resolution failures,
//! other connect errors and malformed addresses all collapse into
//! [`ProbeResult::Unreachable`]. There are no retries; the caller probes
//! again on its next refresh.

use std::fmt;
use std::io::ErrorKind;
use std::time::{Duration, Instant};

use log::debug;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use crate::entity::ServerAddress;

/// Fixed probe timeout.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Outcome of one probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    /// Round trip in whole milliseconds.
    Latency(u32),
    Unreachable,
}

impl ProbeResult {
    #[must_use]
    pub fn is_reachable(self) -> bool {
        matches!(self, Self::Latency(_))
    }
}

impl fmt::Display for ProbeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latency(ms) => write!(f, "{ms} ms"),
            Self::Unreachable => f.write_str("unreachable"),
        }
    }
}

/// Probe `address` once, giving up after `timeout`.
pub async fn probe(address: &str, timeout: Duration) -> ProbeResult {
    let target = match ServerAddress::parse(address) {
        Ok(target) => target,
        Err(e) => {
            debug!("Probe skipped: {}", e);
            return ProbeResult::Unreachable;
        }
    };

    let start = Instant::now();
    let connect = TcpStream::connect((target.host(), target.port()));

    match tokio::time::timeout(timeout, connect).await {
        Ok(Ok(_stream)) => ProbeResult::Latency(round_millis(start.elapsed())),
        Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => {
            debug!("Probe to {} refused, host is up", target);
            ProbeResult::Latency(round_millis(start.elapsed()))
        }
        Ok(Err(e)) => {
            debug!("Probe to {} failed: {}", target, e);
            ProbeResult::Unreachable
        }
        Err(_) => {
            debug!("Probe to {} timed out after {:?}", target, timeout);
            ProbeResult::Unreachable
        }
    }
}

/// Run a probe on its own task; the caller continues immediately and
/// collects the result from the handle.
#[must_use]
pub fn spawn_probe(address: String, timeout: Duration) -> JoinHandle<ProbeResult> {
    tokio::spawn(async move { probe(&address, timeout).await })
}

fn round_millis(elapsed: Duration) -> u32 {
    let millis = (elapsed.as_micros() + 500) / 1000;
    u32::try_from(millis).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_round_millis() {
        assert_eq!(round_millis(Duration::from_micros(0)), 0);
        assert_eq!(round_millis(Duration::from_micros(1_499)), 1);
        assert_eq!(round_millis(Duration::from_micros(1_500)), 2);
        assert_eq!(round_millis(Duration::from_millis(42)), 42);
    }

    #[test]
    fn test_display() {
        assert_eq!(ProbeResult::Latency(17).to_string(), "17 ms");
        assert_eq!(ProbeResult::Unreachable.to_string(), "unreachable");
    }

    #[tokio::test]
    async fn test_probe_listening_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let result = probe(&address, PROBE_TIMEOUT).await;
        assert!(result.is_reachable());
    }

    #[tokio::test]
    async fn test_refused_port_counts_as_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let start = Instant::now();
        let result = probe(&address, PROBE_TIMEOUT).await;
        assert!(result.is_reachable(), "refused handshake reported as {result}");
        assert!(start.elapsed() < PROBE_TIMEOUT);
    }

    #[tokio::test]
    async fn test_udp_only_server_is_reachable() {
        // A game server answering on UDP only; its TCP port is closed
        let socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let address = socket.local_addr().unwrap().to_string();

        let result = probe(&address, PROBE_TIMEOUT).await;
        assert!(matches!(result, ProbeResult::Latency(ms) if ms < 2_000));
    }

    #[tokio::test]
    async fn test_probe_malformed_address() {
        assert_eq!(probe("not an address", PROBE_TIMEOUT).await, ProbeResult::Unreachable);
        assert_eq!(probe("1.2.3.4", PROBE_TIMEOUT).await, ProbeResult::Unreachable);
    }

    #[tokio::test]
    async fn test_probe_unroutable_respects_timeout() {
        // TEST-NET-1, never routed
        let start = Instant::now();
        let result = probe("192.0.2.1:27015", Duration::from_millis(300)).await;
        assert_eq!(result, ProbeResult::Unreachable);
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_spawn_probe_does_not_block_caller() {
        let handle = spawn_probe("192.0.2.1:27015".to_string(), PROBE_TIMEOUT);
        // Caller regains control before the probe can possibly finish
        assert!(!handle.is_finished());
        assert_eq!(handle.await.unwrap(), ProbeResult::Unreachable);
    }
}
