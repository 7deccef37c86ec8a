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

//! Error types shared by the fetch, probe and cache layers.
//!
//! Every failure collapses into one of three kinds so callers can decide
//! how to degrade without matching on transport details.

use std::path::PathBuf;

use thiserror::Error;

/// Coarse failure classification used for logging and degrade decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Timeout, connection refused, DNS failure.
    Network,
    /// Non-2xx status or a payload of the wrong shape.
    Protocol,
    /// No cached file and nothing to fall back on.
    ResourceMissing,
}

/// Errors from the HTTP data source.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Network(String),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("malformed payload: {0}")]
    Payload(String),
}

impl FetchError {
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Network(_) => FailureKind::Network,
            Self::Status(_) | Self::Payload(_) => FailureKind::Protocol,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::Status(status.as_u16()),
            None => Self::Network(err.to_string()),
        }
    }
}

/// Errors from the image cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("download failed: {0}")]
    Network(String),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("response is not an image (content type: {0:?})")]
    NotAnImage(Option<String>),

    #[error("cache write failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("download already in progress")]
    InFlight,

    #[error("resource missing: {0}")]
    ResourceMissing(PathBuf),
}

impl CacheError {
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Network(_) => FailureKind::Network,
            Self::Status(_) | Self::NotAnImage(_) => FailureKind::Protocol,
            Self::Io { .. } | Self::InFlight | Self::ResourceMissing(_) => {
                FailureKind::ResourceMissing
            }
        }
    }
}

impl From<reqwest::Error> for CacheError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::Status(status.as_u16()),
            None => Self::Network(err.to_string()),
        }
    }
}

/// A `host:port` string that could not be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("expected host:port, got {0:?}")]
    Format(String),

    #[error("invalid port in {0:?}")]
    Port(String),
}

/// Poll interval outside the accepted range.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("poll interval must be between {min} and {max} seconds, got {value}")]
pub struct IntervalError {
    pub value: u64,
    pub min: u64,
    pub max: u64,
}
