//! HTTP server: site pages plus the newsletter and revalidation API

mod api;
mod subscription;

use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::{StatusCode, Uri},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

pub use subscription::{Beehiiv, SubscribeError, SubscribeRequest, SubscriptionProvider};

use crate::api::{ApiClient, PostSource};
use crate::cache::PageCache;
use crate::config::SiteConfig;
use crate::content::MarkdownPipeline;
use crate::generator::{PageGenerator, PageOutput, StaticPage};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    config: Arc<SiteConfig>,
    source: Arc<dyn PostSource>,
    subscriptions: Option<Arc<dyn SubscriptionProvider>>,
    generator: Arc<PageGenerator>,
    cache: PageCache,
}

impl AppState {
    pub fn new(
        config: Arc<SiteConfig>,
        source: Arc<dyn PostSource>,
        subscriptions: Option<Arc<dyn SubscriptionProvider>>,
        pipeline: MarkdownPipeline,
    ) -> Result<Self> {
        let generator = PageGenerator::new(config.clone(), source.clone(), pipeline)?;
        let cache = PageCache::from_config(&config.cache);
        Ok(Self {
            config,
            source,
            subscriptions,
            generator: Arc::new(generator),
            cache,
        })
    }

    /// State backed by the content API and, if configured, Beehiiv
    pub fn from_config(config: SiteConfig) -> Result<Self> {
        let source: Arc<dyn PostSource> = Arc::new(ApiClient::new(&config.api)?);
        let subscriptions = Beehiiv::from_config(&config.subscription)
            .map(|provider| Arc::new(provider) as Arc<dyn SubscriptionProvider>);
        if subscriptions.is_none() {
            tracing::warn!("Beehiiv credentials missing; subscriptions will fail");
        }
        let pipeline = MarkdownPipeline::new(&config.markdown);
        Self::new(Arc::new(config), source, subscriptions, pipeline)
    }

    pub fn cache(&self) -> &PageCache {
        &self.cache
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(listing_page))
        .route("/news", get(listing_page))
        .route("/curated", get(listing_page))
        .route("/post/:slug", get(post_page))
        .route("/health", get(health))
        .route("/api/subscribe", post(api::subscribe))
        .route("/api/newsletter-html", get(api::newsletter_html))
        .route("/api/revalidate", post(api::revalidate))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the server
pub async fn start(config: SiteConfig, ip: &str, port: u16) -> Result<()> {
    let state = AppState::from_config(config)?;
    warm_cache(&state);

    let app = router(state);

    // Parse address - handle "localhost" specially
    let bind_ip = if ip == "localhost" { "127.0.0.1" } else { ip };
    let addr: SocketAddr = format!("{}:{}", bind_ip, port).parse()?;

    println!("Server running at http://{}:{}", ip, port);
    println!("Press Ctrl+C to stop.");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Generate the listing pages in the background so first visitors hit the cache
fn warm_cache(state: &AppState) {
    let generator = state.generator.clone();
    let cache = state.cache.clone();
    tokio::spawn(async move {
        let paths: Vec<String> = StaticPage::ALL
            .iter()
            .filter(|p| p.is_cached())
            .map(|p| p.path().to_string())
            .collect();
        if let Err(e) = generator.revalidate(&cache, &paths).await {
            tracing::warn!("Failed to pre-render pages: {}", e);
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutting down");
}

#[derive(Debug, Deserialize)]
struct ListingParams {
    offset: Option<u32>,
}

/// `/`, `/news`, `/curated`. The first page of a cached listing is served
/// from the cache until it expires; later pages and `/curated` are not cached.
async fn listing_page(
    State(state): State<AppState>,
    uri: Uri,
    Query(params): Query<ListingParams>,
) -> Response {
    let Some(page) = StaticPage::from_path(uri.path()) else {
        return not_found(State(state)).await;
    };
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let offset = params.offset.unwrap_or(0);
    let cacheable = offset == 0 && page.is_cached();
    if cacheable {
        if let Some(cached) = state.cache.get(page.path()).await {
            return Html(cached.html.to_string()).into_response();
        }
    }

    match state.generator.listing(page, offset, &cancel).await {
        Ok(output) => {
            if cacheable && output.status == 200 {
                state.cache.insert(page.path(), output.html.clone()).await;
            }
            html_response(output)
        }
        Err(e) => internal_error(e),
    }
}

async fn post_page(State(state): State<AppState>, Path(slug): Path<String>) -> Response {
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    match state.generator.post(&slug, &cancel).await {
        Ok(output) => html_response(output),
        Err(e) => internal_error(e),
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn not_found(State(state): State<AppState>) -> Response {
    match state.generator.error_page(
        "/",
        "Page not found",
        "The page you're looking for doesn't exist.",
        false,
    ) {
        Ok(html) => (StatusCode::NOT_FOUND, Html(html)).into_response(),
        Err(e) => internal_error(e),
    }
}

fn html_response(output: PageOutput) -> Response {
    let status = StatusCode::from_u16(output.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Html(output.html)).into_response()
}

fn internal_error(e: anyhow::Error) -> Response {
    tracing::error!("Failed to render page: {:#}", e);
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
}
