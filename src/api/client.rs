//! HTTP client for the backend content service

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{Collection, PostQuery, PostSource};
use crate::config::ApiConfig;
use crate::content::Post;
use crate::error::{Error, Result};
use crate::helpers::encode_segment;

/// Client for the content API.
///
/// Every call is a single attempt: no retries, no caching.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    /// Build a client from the startup configuration
    pub fn new(config: &ApiConfig) -> Result<Self> {
        if config.base_url.trim().is_empty() {
            return Err(Error::Config("api.base_url is empty".to_string()));
        }
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(Error::Network)?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET /posts`
    pub async fn list_posts(
        &self,
        query: &PostQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<Post>> {
        self.get_json(&with_query("/posts", query), cancel).await
    }

    /// `GET /posts/by-slug/{slug}`
    pub async fn get_post_by_slug(&self, slug: &str, cancel: &CancellationToken) -> Result<Post> {
        let path = format!("/posts/by-slug/{}", encode_segment(slug));
        self.get_json(&path, cancel).await
    }

    /// `GET /posts/news`
    pub async fn list_news_posts(
        &self,
        query: &PostQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<Post>> {
        self.get_json(&with_query("/posts/news", query), cancel)
            .await
    }

    /// `GET /posts/ai101`
    pub async fn list_ai101_posts(
        &self,
        query: &PostQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<Post>> {
        self.get_json(&with_query("/posts/ai101", query), cancel)
            .await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        cancel: &CancellationToken,
    ) -> Result<T> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        tracing::debug!("GET {}", endpoint);
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = self.fetch(endpoint) => result,
        };

        if let Err(e) = &result {
            if !matches!(e, Error::Cancelled) {
                tracing::warn!("API fetch error: {}: {}", endpoint, e);
            }
        }
        result
    }

    async fn fetch<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, endpoint);
        let response = self.http.get(&url).send().await.map_err(Error::Network)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Request {
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(Error::Network)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl PostSource for ApiClient {
    async fn fetch_page(
        &self,
        collection: Collection,
        query: &PostQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<Post>> {
        match collection {
            Collection::Posts => self.list_posts(query, cancel).await,
            Collection::News => self.list_news_posts(query, cancel).await,
            Collection::Ai101 => self.list_ai101_posts(query, cancel).await,
        }
    }

    async fn fetch_post(&self, slug: &str, cancel: &CancellationToken) -> Result<Post> {
        self.get_post_by_slug(slug, cancel).await
    }
}

fn with_query(path: &str, query: &PostQuery) -> String {
    let query = query.to_query_string();
    if query.is_empty() {
        path.to_string()
    } else {
        format!("{}?{}", path, query)
    }
}
