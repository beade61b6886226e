//! JSON endpoints under `/api`

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use super::subscription::{SubscribeError, SubscribeRequest};
use super::AppState;
use crate::newsletter;

fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Pull a plausible email address out of the request body
fn extract_email(payload: Result<Json<Value>, JsonRejection>) -> Option<String> {
    let Json(body) = payload.ok()?;
    let email = body.get("email")?.as_str()?.trim();
    email.contains('@').then(|| email.to_string())
}

/// `POST /api/subscribe`
pub(super) async fn subscribe(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let Some(email) = extract_email(payload) else {
        return json_error(StatusCode::BAD_REQUEST, "Valid email is required");
    };

    let Some(provider) = state.subscriptions.as_ref() else {
        tracing::error!("Subscription requested but no provider is configured");
        return json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Subscription provider configuration missing",
        );
    };

    let request = SubscribeRequest {
        email,
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    };

    match provider.subscribe(&request).await {
        Ok(()) => Json(json!({ "ok": true })).into_response(),
        Err(SubscribeError::Rejected { status, message }) => {
            tracing::warn!("Subscription rejected ({}): {}", status, message);
            json_error(StatusCode::BAD_GATEWAY, &message)
        }
        Err(e) => {
            tracing::error!("Subscription request failed: {}", e);
            json_error(StatusCode::BAD_GATEWAY, "Subscription failed")
        }
    }
}

/// `GET /api/newsletter-html`
pub(super) async fn newsletter_html(State(state): State<AppState>) -> Response {
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let issue = match newsletter::build_issue(state.source.as_ref(), &state.config, &cancel).await {
        Ok(issue) => issue,
        Err(e) => {
            tracing::error!("newsletter-html error: {}", e);
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to render newsletter");
        }
    };

    match issue.render(state.generator.templates(), &state.config) {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::error!("newsletter-html error: {:#}", e);
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to render newsletter")
        }
    }
}

/// Compare without an early exit on the first differing byte
fn secrets_match(expected: &str, given: &str) -> bool {
    let (expected, given) = (expected.as_bytes(), given.as_bytes());
    if expected.len() != given.len() {
        return false;
    }
    expected
        .iter()
        .zip(given)
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}

#[derive(Debug, Deserialize)]
pub(super) struct RevalidateParams {
    secret: Option<String>,
}

/// `POST /api/revalidate?secret=...`
pub(super) async fn revalidate(
    State(state): State<AppState>,
    Query(params): Query<RevalidateParams>,
) -> Response {
    let authorized = match (&state.config.revalidation.secret, &params.secret) {
        (Some(expected), Some(given)) => !expected.is_empty() && secrets_match(expected, given),
        _ => false,
    };
    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "Invalid token" })),
        )
            .into_response();
    }

    match state
        .generator
        .revalidate(&state.cache, &state.config.revalidation.paths)
        .await
    {
        Ok(paths) => Json(json!({
            "revalidated": true,
            "paths": paths,
            "timestamp": chrono::Utc::now().timestamp_millis(),
        }))
        .into_response(),
        Err(e) => {
            tracing::error!("Revalidation failed: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error revalidating: {}", e),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::{router, AppState, SubscriptionProvider};
    use super::*;
    use crate::api::{Collection, PostQuery, PostSource};
    use crate::config::SiteConfig;
    use crate::content::{DiagramRenderer, MarkdownPipeline, Post};
    use crate::error::Error;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use axum::Router;
    use http_body_util::BodyExt;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tower::ServiceExt;

    struct NoDiagrams;

    #[async_trait]
    impl DiagramRenderer for NoDiagrams {
        async fn render(&self, _language: &str, _source: &str) -> crate::error::Result<String> {
            Ok("<svg></svg>".to_string())
        }
    }

    #[derive(Default)]
    struct StubSource {
        fail_news: AtomicBool,
        fail_ai101: AtomicBool,
        calls: AtomicUsize,
        /// Bumped to simulate new posts landing in the backend
        version: AtomicUsize,
    }

    fn post(slug: &str, kind: &str) -> Post {
        serde_json::from_value(json!({
            "id": slug,
            "slug": slug,
            "title": format!("Post {}", slug),
            "content": { "body": "Some *body*" },
            "ai_metadata": { "post_type": kind }
        }))
        .unwrap()
    }

    #[async_trait]
    impl PostSource for StubSource {
        async fn fetch_page(
            &self,
            collection: Collection,
            _query: &PostQuery,
            _cancel: &CancellationToken,
        ) -> crate::error::Result<Vec<Post>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match collection {
                Collection::News if self.fail_news.load(Ordering::SeqCst) => {
                    Err(Error::Request { status: 500 })
                }
                Collection::Ai101 if self.fail_ai101.load(Ordering::SeqCst) => {
                    Err(Error::Request { status: 500 })
                }
                Collection::News => Ok(vec![post("n1", "news"), post("n2", "news")]),
                Collection::Ai101 => Ok(vec![post("basics", "ai101")]),
                Collection::Posts => {
                    let version = self.version.load(Ordering::SeqCst);
                    Ok(vec![post(&format!("paper-v{}", version), "regular")])
                }
            }
        }

        async fn fetch_post(
            &self,
            slug: &str,
            _cancel: &CancellationToken,
        ) -> crate::error::Result<Post> {
            match slug {
                "gone" => Err(Error::Request { status: 404 }),
                _ => Ok(post(slug, "regular")),
            }
        }
    }

    #[derive(Default)]
    struct FakeProvider {
        requests: Mutex<Vec<SubscribeRequest>>,
        reject: bool,
    }

    #[async_trait]
    impl SubscriptionProvider for FakeProvider {
        async fn subscribe(&self, request: &SubscribeRequest) -> Result<(), SubscribeError> {
            self.requests.lock().unwrap().push(request.clone());
            if self.reject {
                return Err(SubscribeError::Rejected {
                    status: 400,
                    message: "Already subscribed".to_string(),
                });
            }
            Ok(())
        }
    }

    struct Harness {
        app: Router,
        state: AppState,
        source: Arc<StubSource>,
        provider: Arc<FakeProvider>,
    }

    fn harness_with(config: SiteConfig, provider: Option<FakeProvider>) -> Harness {
        let source = Arc::new(StubSource::default());
        let has_provider = provider.is_some();
        let provider = Arc::new(provider.unwrap_or_default());
        let subscriptions =
            has_provider.then(|| provider.clone() as Arc<dyn SubscriptionProvider>);
        let pipeline = MarkdownPipeline::with_diagrams(&config.markdown, Arc::new(NoDiagrams));
        let state = AppState::new(Arc::new(config), source.clone(), subscriptions, pipeline).unwrap();
        Harness {
            app: router(state.clone()),
            state,
            source,
            provider,
        }
    }

    fn harness() -> Harness {
        let mut config = SiteConfig::default();
        config.revalidation.secret = Some("s3cret".to_string());
        harness_with(config, Some(FakeProvider::default()))
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, String) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn subscribe_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/subscribe")
            .header("content-type", "application/json")
            .header("user-agent", "rex-test")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_subscribe_success() {
        let h = harness();
        let (status, body) = send(&h.app, subscribe_request(r#"{"email":"rex@example.com"}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(serde_json::from_str::<Value>(&body).unwrap(), json!({"ok": true}));

        let requests = h.provider.requests.lock().unwrap();
        assert_eq!(
            requests.as_slice(),
            &[SubscribeRequest {
                email: "rex@example.com".to_string(),
                user_agent: Some("rex-test".to_string()),
            }]
        );
    }

    #[tokio::test]
    async fn test_subscribe_rejects_invalid_email_without_calling_provider() {
        let h = harness();
        for body in [
            r#"{"email":"not-an-email"}"#,
            r#"{"email":42}"#,
            r#"{}"#,
            "not json",
        ] {
            let (status, body) = send(&h.app, subscribe_request(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(
                serde_json::from_str::<Value>(&body).unwrap(),
                json!({"error": "Valid email is required"})
            );
        }
        assert!(h.provider.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_subscribe_without_provider() {
        let h = harness_with(SiteConfig::default(), None);
        let (status, body) = send(&h.app, subscribe_request(r#"{"email":"a@b.c"}"#)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("configuration missing"));
    }

    #[tokio::test]
    async fn test_subscribe_upstream_rejection() {
        let h = harness_with(
            SiteConfig::default(),
            Some(FakeProvider {
                reject: true,
                ..Default::default()
            }),
        );
        let (status, body) = send(&h.app, subscribe_request(r#"{"email":"a@b.c"}"#)).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body.contains("Already subscribed"));
    }

    #[tokio::test]
    async fn test_subscribe_wrong_method() {
        let h = harness();
        let request = Request::builder()
            .uri("/api/subscribe")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&h.app, request).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    fn revalidate_request(query: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(format!("/api/revalidate{}", query))
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_revalidate_requires_secret() {
        let h = harness();
        for query in ["", "?secret=wrong", "?secret="] {
            let (status, body) = send(&h.app, revalidate_request(query)).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert_eq!(
                serde_json::from_str::<Value>(&body).unwrap(),
                json!({"message": "Invalid token"})
            );
        }
        assert_eq!(h.source.calls.load(Ordering::SeqCst), 0);

        // no configured secret means nothing is accepted
        let unconfigured = harness_with(SiteConfig::default(), None);
        let (status, _) = send(&unconfigured.app, revalidate_request("?secret=")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_revalidate_regenerates_pages() {
        let h = harness();
        h.state.cache().insert("/news", "stale".to_string()).await;

        let (status, body) = send(&h.app, revalidate_request("?secret=s3cret")).await;
        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body["revalidated"], json!(true));
        assert!(body["timestamp"].is_i64());

        let news = h.state.cache().get("/news").await.unwrap();
        assert!(news.html.contains("Post n1"));
        assert!(h.state.cache().get("/").await.is_some());
    }

    #[test]
    fn test_secrets_match() {
        assert!(secrets_match("s3cret", "s3cret"));
        assert!(!secrets_match("s3cret", "s3creT"));
        assert!(!secrets_match("s3cret", "s3cre"));
        assert!(!secrets_match("s3cret", ""));
    }

    #[tokio::test]
    async fn test_revalidate_failure() {
        let h = harness();
        h.source.fail_news.store(true, Ordering::SeqCst);
        let (status, body) = send(&h.app, revalidate_request("?secret=s3cret")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.starts_with("Error revalidating:"));
    }

    #[tokio::test]
    async fn test_newsletter_html() {
        let h = harness();
        h.source.fail_ai101.store(true, Ordering::SeqCst);
        let response = h
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/newsletter-html")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/html; charset=utf-8"
        );
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let html = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(html.contains("Post n1"));
        assert!(html.contains("Catch the latest AI 101 explainer."));
    }

    #[tokio::test]
    async fn test_newsletter_news_failure() {
        let h = harness();
        h.source.fail_news.store(true, Ordering::SeqCst);
        let request = Request::builder()
            .uri("/api/newsletter-html")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&h.app, request).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            serde_json::from_str::<Value>(&body).unwrap(),
            json!({"error": "Failed to render newsletter"})
        );
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_listing_page_is_cached() {
        let h = harness();
        let (status, body) = send(&h.app, get("/news")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Post n1"));
        assert_eq!(h.source.calls.load(Ordering::SeqCst), 1);

        let (status, _) = send(&h.app, get("/news")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(h.source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_curated_is_rendered_per_request() {
        let h = harness();
        let (_, body) = send(&h.app, get("/curated")).await;
        assert!(body.contains("Post paper-v0"));

        h.source.version.store(1, Ordering::SeqCst);
        let (status, _) = send(&h.app, revalidate_request("?secret=s3cret")).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&h.app, get("/curated")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Post paper-v1"));
        assert!(h.state.cache().get("/curated").await.is_none());
    }

    #[tokio::test]
    async fn test_expired_listing_is_regenerated() {
        let mut config = SiteConfig::default();
        config.cache.ttl_secs = 0;
        let h = harness_with(config, None);

        let (_, body) = send(&h.app, get("/")).await;
        assert!(body.contains("Post paper-v0"));
        h.source.version.store(1, Ordering::SeqCst);

        let (_, body) = send(&h.app, get("/")).await;
        assert!(body.contains("Post paper-v1"));
        assert_eq!(h.source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_listing_is_not_cached() {
        let h = harness();
        h.source.fail_news.store(true, Ordering::SeqCst);
        let (status, body) = send(&h.app, get("/news")).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body.contains("Try again"));
        assert!(h.state.cache().get("/news").await.is_none());
    }

    #[tokio::test]
    async fn test_post_pages_and_health() {
        let h = harness();
        let (status, body) = send(&h.app, get("/post/attention")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("<em>body</em>"));

        let (status, body) = send(&h.app, get("/post/gone")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.contains("Post not found"));

        let (status, _) = send(&h.app, get("/nowhere")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(&h.app, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("ok"));
    }
}
