//! In-memory cache of generated pages
//!
//! Listing pages are served from memory until they are revalidated or grow
//! older than the cache TTL. Each path is replaced as a whole, so readers see
//! either the old page or the new one, never a mix.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::config::CacheConfig;

/// A generated page and when it was built
#[derive(Debug, Clone)]
pub struct CachedPage {
    pub html: Arc<str>,
    pub generated_at: DateTime<Utc>,
}

impl CachedPage {
    /// Younger than `ttl` at `now`. Timestamps in the future count as fresh.
    pub fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        match now.signed_duration_since(self.generated_at).to_std() {
            Ok(age) => age < ttl,
            Err(_) => true,
        }
    }
}

/// Shared page cache keyed by site path. Clones share entries.
#[derive(Debug, Clone)]
pub struct PageCache {
    pages: Arc<RwLock<HashMap<String, CachedPage>>>,
    ttl: Duration,
}

impl Default for PageCache {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

impl PageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::with_ttl(Duration::from_secs(config.ttl_secs))
    }

    /// Pages older than `ttl` are dropped on lookup; zero disables caching
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            pages: Arc::default(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// A fresh page for `path`. Expired pages are evicted.
    pub async fn get(&self, path: &str) -> Option<CachedPage> {
        let path = normalize_path(path);
        let page = self.pages.read().await.get(&path).cloned()?;
        if page.is_fresh(self.ttl, Utc::now()) {
            return Some(page);
        }
        tracing::debug!("Cached page {} expired", path);
        self.invalidate(&path).await;
        None
    }

    /// Store a page, replacing any previous version
    pub async fn insert(&self, path: &str, html: String) -> CachedPage {
        let page = CachedPage {
            html: Arc::from(html),
            generated_at: Utc::now(),
        };
        let path = normalize_path(path);
        tracing::debug!("Caching page {}", path);
        self.pages.write().await.insert(path, page.clone());
        page
    }

    /// Drop a page; returns whether it was cached
    pub async fn invalidate(&self, path: &str) -> bool {
        self.pages
            .write()
            .await
            .remove(&normalize_path(path))
            .is_some()
    }

    /// Cached paths, sorted
    pub async fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.pages.read().await.keys().cloned().collect();
        paths.sort();
        paths
    }
}

/// "/news/" and "news" both key as "/news"
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim().trim_matches('/');
    format!("/{}", trimmed)
}
