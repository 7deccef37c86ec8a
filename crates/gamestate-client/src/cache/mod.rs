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

//! Game icon and map thumbnail cache.
//!
//! Files live under the resources directory using fixed names
//! (`icons/{game}.png`, `map_icons/{game}_{map}.jpg`). A hit returns the
//! local path immediately. A miss downloads the image once; anything that
//! is not a successful image response falls back to the default resource
//! for that kind of key. Failures are never remembered, so the next lookup
//! tries again. There is no eviction.

use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, info, warn};

use crate::error::CacheError;

const ICON_DIR: &str = "icons";
const MAP_DIR: &str = "map_icons";
const DEFAULT_ICON: &str = "default.png";
const DEFAULT_MAP: &str = "default_map.png";

/// Cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImageKey {
    /// Game icon.
    Icon { game: String },
    /// Square map thumbnail for a game.
    Map { game: String, map: String },
}

impl ImageKey {
    #[must_use]
    pub fn icon(game: impl Into<String>) -> Self {
        Self::Icon { game: game.into() }
    }

    #[must_use]
    pub fn map(game: impl Into<String>, map: impl Into<String>) -> Self {
        Self::Map {
            game: game.into(),
            map: map.into(),
        }
    }

    /// Path relative to the resources directory. Map names are stored
    /// with spaces encoded as `%20`, the same form used in the remote URL.
    #[must_use]
    pub fn relative_path(&self) -> PathBuf {
        match self {
            Self::Icon { game } => Path::new(ICON_DIR).join(format!("{}.png", file_safe(game))),
            Self::Map { game, map } => Path::new(MAP_DIR).join(format!(
                "{}_{}.jpg",
                file_safe(game),
                file_safe(&encode_spaces(map))
            )),
        }
    }

    /// Fallback resource, relative to the resources directory.
    #[must_use]
    pub fn default_relative_path(&self) -> PathBuf {
        match self {
            Self::Icon { .. } => Path::new(ICON_DIR).join(DEFAULT_ICON),
            Self::Map { .. } => Path::new(ICON_DIR).join(DEFAULT_MAP),
        }
    }

    /// Remote location under the image host.
    #[must_use]
    pub fn remote_url(&self, image_base_url: &str) -> String {
        let base = image_base_url.trim_end_matches('/');
        match self {
            Self::Icon { game } => format!("{base}/img/110x95/{game}.png"),
            Self::Map { game, map } => {
                format!("{base}/img/{game}/sq/{}.jpg", encode_spaces(map))
            }
        }
    }
}

fn encode_spaces(id: &str) -> String {
    id.replace(' ', "%20")
}

/// Keep identifiers inside their cache directory.
fn file_safe(id: &str) -> String {
    id.chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect()
}

/// Raw download result.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    /// Declared `Content-Type`, if any.
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl FetchedImage {
    fn is_image(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.trim().to_ascii_lowercase().starts_with("image/"))
    }
}

/// Downloads image bytes. Non-2xx responses must be reported as errors.
pub trait ImageFetcher: Send + Sync + 'static {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<FetchedImage, CacheError>> + Send;
}

/// [`ImageFetcher`] backed by reqwest.
#[derive(Debug, Clone)]
pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    pub fn new(timeout: Duration) -> Result<Self, CacheError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CacheError::Network(e.to_string()))?;
        Ok(Self { client })
    }
}

impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedImage, CacheError> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(CacheError::Status(response.status().as_u16()));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?.to_vec();

        Ok(FetchedImage {
            content_type,
            bytes,
        })
    }
}

/// Removes a path from the pending set when the download finishes.
struct PendingGuard<'a> {
    pending: &'a Mutex<HashSet<PathBuf>>,
    path: PathBuf,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(&self.path);
        }
    }
}

/// On-disk image cache.
pub struct ImageCache<F = HttpImageFetcher> {
    root: PathBuf,
    image_base_url: String,
    fetcher: Arc<F>,
    pending: Arc<Mutex<HashSet<PathBuf>>>,
}

impl<F> Clone for ImageCache<F> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            image_base_url: self.image_base_url.clone(),
            fetcher: Arc::clone(&self.fetcher),
            pending: Arc::clone(&self.pending),
        }
    }
}

impl<F> std::fmt::Debug for ImageCache<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageCache")
            .field("root", &self.root)
            .field("image_base_url", &self.image_base_url)
            .finish_non_exhaustive()
    }
}

impl<F: ImageFetcher> ImageCache<F> {
    /// Create a cache rooted at `root`, creating its directories.
    pub fn new(
        root: impl Into<PathBuf>,
        image_base_url: impl Into<String>,
        fetcher: F,
    ) -> Result<Self, CacheError> {
        let root = root.into();
        for dir in [ICON_DIR, MAP_DIR] {
            let path = root.join(dir);
            std::fs::create_dir_all(&path).map_err(|source| CacheError::Io { path, source })?;
        }

        Ok(Self {
            root,
            image_base_url: image_base_url.into(),
            fetcher: Arc::new(fetcher),
            pending: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Local path for `key` if it is already cached.
    #[must_use]
    pub fn cached_path(&self, key: &ImageKey) -> Option<PathBuf> {
        let path = self.root.join(key.relative_path());
        path.is_file().then_some(path)
    }

    /// Fallback path for `key`. May not exist.
    #[must_use]
    pub fn default_path(&self, key: &ImageKey) -> PathBuf {
        self.root.join(key.default_relative_path())
    }

    /// Local path for `key`: the cached file, a fresh download, or the
    /// default resource when the download fails.
    pub async fn resolve(&self, key: &ImageKey) -> PathBuf {
        match self.fetch(key).await {
            Ok(path) => path,
            Err(e) => {
                match e {
                    CacheError::InFlight => debug!("Image {:?} still downloading", key),
                    ref e => warn!("Image {:?} unavailable ({:?}): {}", key, e.kind(), e),
                }
                let fallback = self.default_path(key);
                if !fallback.is_file() {
                    warn!("{}", CacheError::ResourceMissing(fallback.clone()));
                }
                fallback
            }
        }
    }

    /// Cached path for `key`, downloading it if needed.
    pub async fn fetch(&self, key: &ImageKey) -> Result<PathBuf, CacheError> {
        if let Some(path) = self.cached_path(key) {
            return Ok(path);
        }

        let path = self.root.join(key.relative_path());
        let _guard = {
            let mut pending = self.pending.lock().expect("Image cache pending set poisoned");
            if !pending.insert(path.clone()) {
                return Err(CacheError::InFlight);
            }
            PendingGuard {
                pending: &self.pending,
                path: path.clone(),
            }
        };

        let url = key.remote_url(&self.image_base_url);
        let image = self.fetcher.fetch(&url).await?;
        if !image.is_image() {
            return Err(CacheError::NotAnImage(image.content_type));
        }

        write_atomic(&path, &image.bytes).await?;
        info!("Cached image {}", path.display());
        Ok(path)
    }
}

/// Write to a sibling temp file, then rename into place.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".part");
    let tmp = PathBuf::from(tmp);

    if let Err(source) = tokio::fs::write(&tmp, bytes).await {
        return Err(CacheError::Io { path: tmp, source });
    }
    if let Err(source) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(CacheError::Io {
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(())
}
