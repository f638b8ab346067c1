use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use md5::{Digest, Md5};
use tracing::{debug, warn};

use super::errors::LoaderResult;
use super::{DataLoader, Protocol};

/// Replace every character outside `[A-Za-z0-9_]` with `_`.
pub fn normalize_file_name(url: &str) -> String {
    url.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Cache file name for a request. POST requests append the MD5 of their body
/// so different queries to the same responder do not collide.
pub fn cache_file_name(url: &str, body: Option<&[u8]>) -> String {
    let mut name = normalize_file_name(url);
    if let Some(body) = body {
        let mut hasher = Md5::new();
        hasher.update(body);
        name.push('.');
        name.push_str(&hex::encode(hasher.finalize()));
    }
    name
}

/// Caches responses of an inner loader in a directory.
#[derive(Clone)]
pub struct FileCacheDataLoader {
    inner: Arc<dyn DataLoader>,
    cache_dir: PathBuf,
    to_be_loaded: Option<HashSet<String>>,
    to_ignore: HashSet<String>,
}

impl FileCacheDataLoader {
    pub fn new(inner: Arc<dyn DataLoader>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            cache_dir: cache_dir.into(),
            to_be_loaded: None,
            to_ignore: HashSet::new(),
        }
    }

    /// Restrict `get` to the listed URLs; anything else yields `None`.
    pub fn with_allowed_urls<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.to_be_loaded = Some(urls.into_iter().map(Into::into).collect());
        self
    }

    /// URLs for which `get` always yields `None`.
    pub fn with_ignored_urls<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.to_ignore.extend(urls.into_iter().map(Into::into));
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn is_filtered(&self, url: &str) -> bool {
        if let Some(allowed) = &self.to_be_loaded
            && !allowed.contains(url)
        {
            debug!("URL not in allow-list, skipping: {}", url);
            return true;
        }
        if self.to_ignore.contains(url) {
            debug!("URL ignored: {}", url);
            return true;
        }
        false
    }

    async fn read_cached(&self, file: &Path) -> Option<Vec<u8>> {
        match tokio::fs::read(file).await {
            Ok(bytes) if !bytes.is_empty() => Some(bytes),
            _ => None,
        }
    }

    async fn store(&self, file: &Path, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        if let Err(e) = tokio::fs::create_dir_all(&self.cache_dir).await {
            warn!("Failed to create cache directory {:?}: {}", self.cache_dir, e);
            return;
        }
        // Concurrent writers for the same key write identical content
        if let Err(e) = tokio::fs::write(file, bytes).await {
            warn!("Failed to write cache file {:?}: {}", file, e);
        }
    }
}

fn bypasses_cache(url: &str) -> bool {
    !Protocol::from_url(url).is_some_and(|p| p.is_network())
}

#[async_trait]
impl DataLoader for FileCacheDataLoader {
    async fn get(&self, url: &str, refresh: bool) -> LoaderResult<Option<Vec<u8>>> {
        if self.is_filtered(url) {
            return Ok(None);
        }
        if bypasses_cache(url) {
            return self.inner.get(url, refresh).await;
        }

        let file = self.cache_dir.join(cache_file_name(url, None));
        if !refresh
            && let Some(bytes) = self.read_cached(&file).await
        {
            debug!("Cache hit for {} ({:?})", url, file);
            return Ok(Some(bytes));
        }

        let bytes = self.inner.get(url, refresh).await?;
        if let Some(bytes) = &bytes {
            self.store(&file, bytes).await;
        }
        Ok(bytes)
    }

    async fn post(&self, url: &str, body: &[u8], refresh: bool) -> LoaderResult<Vec<u8>> {
        if bypasses_cache(url) {
            return self.inner.post(url, body, refresh).await;
        }

        let file = self.cache_dir.join(cache_file_name(url, Some(body)));
        if !refresh
            && let Some(bytes) = self.read_cached(&file).await
        {
            debug!("Cache hit for POST {} ({:?})", url, file);
            return Ok(bytes);
        }

        let bytes = self.inner.post(url, body, refresh).await?;
        self.store(&file, &bytes).await;
        Ok(bytes)
    }
}
