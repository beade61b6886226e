//! Incremental loading of post collections ("load more" feeds)
//!
//! A `PostFeed` tracks the posts loaded so far and the offset of the next
//! page. Only one request per feed is ever in flight; extra calls are
//! skipped, never queued. Errors are kept in the feed state instead of being
//! returned, so a page can show them next to whatever already loaded.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;

use crate::api::{Collection, PostQuery, PostSource};
use crate::config::PaginationConfig;
use crate::content::{Post, PostType};
use crate::error::Error;

/// Snapshot of a feed
#[derive(Debug, Clone)]
pub struct FeedState {
    pub items: Vec<Post>,
    /// Number of posts loaded; the next page starts here
    pub offset: u32,
    pub has_more: bool,
    pub is_loading_initial: bool,
    pub is_loading_more: bool,
    pub error: Option<Arc<Error>>,
}

impl Default for FeedState {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            offset: 0,
            has_more: true,
            is_loading_initial: false,
            is_loading_more: false,
            error: None,
        }
    }
}

impl FeedState {
    pub fn is_loading(&self) -> bool {
        self.is_loading_initial || self.is_loading_more
    }
}

/// What a load call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A page arrived with this many posts
    Loaded(usize),
    /// Nothing was requested: a load was in flight or the feed is exhausted
    Skipped,
    /// The request failed; the error is in the feed state
    Failed,
    /// The feed was cancelled; the result was discarded
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadKind {
    Initial,
    More,
}

/// Paginated view over one backend collection. Clones share state.
pub struct PostFeed<S: PostSource + ?Sized> {
    source: Arc<S>,
    collection: Collection,
    state: Arc<Mutex<FeedState>>,
    cancel: CancellationToken,
}

impl<S: PostSource + ?Sized> Clone for PostFeed<S> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            collection: self.collection,
            state: self.state.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl<S: PostSource + ?Sized> PostFeed<S> {
    pub fn new(source: Arc<S>, collection: Collection) -> Self {
        Self {
            source,
            collection,
            state: Arc::new(Mutex::new(FeedState::default())),
            cancel: CancellationToken::new(),
        }
    }

    /// Continue a listing whose first `offset` posts were served elsewhere,
    /// e.g. an "older posts" page. `load_more` starts at `offset`.
    pub fn resume_at(self, offset: u32) -> Self {
        self.lock().offset = offset;
        self
    }

    /// Use `cancel` for this feed's requests, e.g. a child of a request token
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn lock(&self) -> MutexGuard<'_, FeedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn collection(&self) -> Collection {
        self.collection
    }

    pub fn state(&self) -> FeedState {
        self.lock().clone()
    }

    /// Stop the feed: in-flight and later results are discarded
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Load the first page, replacing whatever is loaded
    pub async fn load_initial(&self, filters: &PostQuery, page_size: u32) -> LoadOutcome {
        self.load(LoadKind::Initial, filters, page_size).await
    }

    /// Load the next page and append it
    pub async fn load_more(&self, filters: &PostQuery, page_size: u32) -> LoadOutcome {
        self.load(LoadKind::More, filters, page_size).await
    }

    async fn load(&self, kind: LoadKind, filters: &PostQuery, page_size: u32) -> LoadOutcome {
        if self.cancel.is_cancelled() {
            return LoadOutcome::Cancelled;
        }

        let (offset, _guard) = {
            let mut state = self.lock();
            if state.is_loading() || (kind == LoadKind::More && !state.has_more) {
                return LoadOutcome::Skipped;
            }
            let offset = match kind {
                LoadKind::Initial => {
                    state.is_loading_initial = true;
                    0
                }
                LoadKind::More => {
                    state.is_loading_more = true;
                    state.offset
                }
            };
            (offset, LoadingGuard { state: &self.state, kind })
        };

        let query = filters.page(page_size, offset);
        tracing::debug!(
            "Loading {:?} page of {:?} at offset {}",
            kind,
            self.collection,
            offset
        );
        let result = self
            .source
            .fetch_page(self.collection, &query, &self.cancel)
            .await;

        if self.cancel.is_cancelled() {
            return LoadOutcome::Cancelled;
        }

        let mut state = self.lock();
        match result {
            Ok(posts) => {
                let received = posts.len();
                match kind {
                    LoadKind::Initial => {
                        state.items = posts;
                        state.offset = received as u32;
                    }
                    LoadKind::More => {
                        state.items.extend(posts);
                        state.offset = state.offset.saturating_add(received as u32);
                    }
                }
                state.has_more = received as u32 == page_size;
                state.error = None;
                LoadOutcome::Loaded(received)
            }
            Err(Error::Cancelled) => LoadOutcome::Cancelled,
            Err(e) => {
                tracing::error!("Failed to fetch {:?} posts: {}", self.collection, e);
                state.error = Some(Arc::new(e));
                LoadOutcome::Failed
            }
        }
    }
}

/// Clears the loading flag it set, on every exit path
struct LoadingGuard<'a> {
    state: &'a Mutex<FeedState>,
    kind: LoadKind,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match self.kind {
            LoadKind::Initial => state.is_loading_initial = false,
            LoadKind::More => state.is_loading_more = false,
        }
    }
}

/// The feeds the site shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedKind {
    /// Research analyses on the home page
    Home,
    Curated,
    News,
    Ai101,
}

impl FeedKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "home" | "regular" | "research" => Some(FeedKind::Home),
            "curated" => Some(FeedKind::Curated),
            "news" => Some(FeedKind::News),
            "ai101" => Some(FeedKind::Ai101),
            _ => None,
        }
    }

    /// Collection and base filters for this feed
    pub fn source(&self, config: &PaginationConfig) -> (Collection, PostQuery) {
        match self {
            FeedKind::Home => (
                Collection::Posts,
                PostQuery::new().with_types(&[PostType::Regular]),
            ),
            FeedKind::Curated => (
                Collection::Posts,
                PostQuery::new()
                    .with_types(&[PostType::Curated])
                    .with_sort_by(config.curated_sort_by.as_deref()),
            ),
            FeedKind::News => (Collection::News, PostQuery::new()),
            FeedKind::Ai101 => (Collection::Ai101, PostQuery::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::PostId;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    fn post(slug: &str) -> Post {
        serde_json::from_value(serde_json::json!({
            "id": slug, "slug": slug, "title": slug.to_uppercase()
        }))
        .unwrap()
    }

    fn slugs(state: &FeedState) -> Vec<&str> {
        state.items.iter().map(|p| p.slug.as_str()).collect()
    }

    /// Hands out scripted responses in order and records each query
    #[derive(Default)]
    struct FakeSource {
        responses: Mutex<VecDeque<Result<Vec<Post>, Error>>>,
        queries: Mutex<Vec<PostQuery>>,
        calls: AtomicUsize,
        hold: Option<(Notify, Notify)>,
    }

    impl FakeSource {
        fn with(responses: Vec<Result<Vec<Post>, Error>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                ..Default::default()
            }
        }

        fn holding(mut self) -> Self {
            self.hold = Some((Notify::new(), Notify::new()));
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PostSource for FakeSource {
        async fn fetch_page(
            &self,
            _collection: Collection,
            query: &PostQuery,
            cancel: &CancellationToken,
        ) -> crate::error::Result<Vec<Post>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.queries.lock().unwrap().push(query.clone());
            if let Some((started, release)) = &self.hold {
                started.notify_one();
                tokio::select! {
                    _ = release.notified() => {}
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                }
            }
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }

        async fn fetch_post(
            &self,
            slug: &str,
            _cancel: &CancellationToken,
        ) -> crate::error::Result<Post> {
            Ok(post(slug))
        }
    }

    #[tokio::test]
    async fn test_load_initial_replaces_items() {
        let source = Arc::new(FakeSource::with(vec![
            Ok(vec![post("a"), post("b")]),
            Ok(vec![post("c")]),
        ]));
        let feed = PostFeed::new(source.clone(), Collection::Posts);
        let filters = PostQuery::new();

        assert_eq!(feed.load_initial(&filters, 2).await, LoadOutcome::Loaded(2));
        assert_eq!(feed.load_initial(&filters, 2).await, LoadOutcome::Loaded(1));

        let state = feed.state();
        assert_eq!(slugs(&state), vec!["c"]);
        assert_eq!(state.offset, 1);
        assert!(!state.has_more);
        assert!(!state.is_loading_initial);

        let queries = source.queries.lock().unwrap();
        assert!(queries.iter().all(|q| q.offset == Some(0)));
    }

    #[tokio::test]
    async fn test_load_more_appends() {
        let source = Arc::new(FakeSource::with(vec![
            Ok(vec![post("a"), post("b")]),
            Ok(vec![post("c"), post("d")]),
        ]));
        let feed = PostFeed::new(source.clone(), Collection::Posts);
        let filters = PostQuery::new().with_types(&[PostType::Curated]);

        feed.load_initial(&filters, 2).await;
        assert_eq!(feed.load_more(&filters, 2).await, LoadOutcome::Loaded(2));

        let state = feed.state();
        assert_eq!(slugs(&state), vec!["a", "b", "c", "d"]);
        assert_eq!(state.offset, 4);
        assert!(state.has_more);

        let queries = source.queries.lock().unwrap();
        assert_eq!(queries[1].offset, Some(2));
        assert_eq!(queries[1].limit, Some(2));
        assert_eq!(queries[1].post_types.as_deref(), Some("curated"));
    }

    #[tokio::test]
    async fn test_short_page_ends_feed() {
        let full: Vec<Post> = (0..21).map(|i| post(&format!("p{}", i))).collect();
        let short: Vec<Post> = (0..14).map(|i| post(&format!("q{}", i))).collect();
        let source = Arc::new(FakeSource::with(vec![Ok(full), Ok(short)]));
        let feed = PostFeed::new(source.clone(), Collection::Posts);
        let filters = PostQuery::new();

        feed.load_initial(&filters, 21).await;
        assert!(feed.state().has_more);

        feed.load_more(&filters, 21).await;
        let state = feed.state();
        assert!(!state.has_more);
        assert_eq!(state.offset, 35);

        // exhausted feeds never ask again
        assert_eq!(feed.load_more(&filters, 21).await, LoadOutcome::Skipped);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_failed_load_more_keeps_progress() {
        let source = Arc::new(FakeSource::with(vec![
            Ok(vec![post("a"), post("b")]),
            Err(Error::Request { status: 500 }),
            Ok(vec![post("c")]),
        ]));
        let feed = PostFeed::new(source.clone(), Collection::News);
        let filters = PostQuery::new();

        feed.load_initial(&filters, 2).await;
        assert_eq!(feed.load_more(&filters, 2).await, LoadOutcome::Failed);

        let state = feed.state();
        assert_eq!(slugs(&state), vec!["a", "b"]);
        assert_eq!(state.offset, 2);
        assert!(state.has_more);
        assert!(!state.is_loading_more);
        assert_eq!(state.error.as_ref().and_then(|e| e.status()), Some(500));

        // retry uses the same offset and clears the error
        assert_eq!(feed.load_more(&filters, 2).await, LoadOutcome::Loaded(1));
        let state = feed.state();
        assert_eq!(slugs(&state), vec!["a", "b", "c"]);
        assert!(state.error.is_none());
        let queries = source.queries.lock().unwrap();
        assert_eq!(queries[1].offset, Some(2));
        assert_eq!(queries[2].offset, Some(2));
    }

    #[tokio::test]
    async fn test_failed_initial_load_keeps_items() {
        let source = Arc::new(FakeSource::with(vec![
            Ok(vec![post("seed")]),
            Err(Error::Request { status: 502 }),
        ]));
        let feed = PostFeed::new(source, Collection::Posts);
        feed.load_initial(&PostQuery::new(), 21).await;
        assert_eq!(feed.load_initial(&PostQuery::new(), 21).await, LoadOutcome::Failed);

        let state = feed.state();
        assert_eq!(slugs(&state), vec!["seed"]);
        assert!(state.error.is_some());
        assert!(!state.is_loading_initial);
    }

    #[tokio::test]
    async fn test_concurrent_load_more_is_ignored() {
        let source = Arc::new(
            FakeSource::with(vec![Ok(vec![post("a"), post("b")])]).holding(),
        );
        let feed = PostFeed::new(source.clone(), Collection::Posts).resume_at(2);
        let filters = PostQuery::new();

        let first = {
            let feed = feed.clone();
            let filters = filters.clone();
            tokio::spawn(async move { feed.load_more(&filters, 2).await })
        };
        let (started, release) = source.hold.as_ref().unwrap();
        started.notified().await;
        assert!(feed.state().is_loading_more);

        assert_eq!(feed.load_more(&filters, 2).await, LoadOutcome::Skipped);
        assert_eq!(feed.load_initial(&filters, 2).await, LoadOutcome::Skipped);
        assert_eq!(source.calls(), 1);

        release.notify_one();
        assert_eq!(first.await.unwrap(), LoadOutcome::Loaded(2));
        let state = feed.state();
        assert_eq!(slugs(&state), vec!["a", "b"]);
        assert_eq!(state.offset, 4);
        assert_eq!(source.queries.lock().unwrap()[0].offset, Some(2));
    }

    #[tokio::test]
    async fn test_cancel_discards_in_flight_result() {
        let source = Arc::new(FakeSource::with(vec![Ok(vec![post("late")])]).holding());
        let feed = PostFeed::new(source.clone(), Collection::News);

        let pending = {
            let feed = feed.clone();
            tokio::spawn(async move { feed.load_initial(&PostQuery::new(), 5).await })
        };
        source.hold.as_ref().unwrap().0.notified().await;

        feed.cancel();
        assert_eq!(pending.await.unwrap(), LoadOutcome::Cancelled);

        let state = feed.state();
        assert!(state.items.is_empty());
        assert!(state.error.is_none());
        assert!(!state.is_loading_initial);
        assert_eq!(feed.load_more(&PostQuery::new(), 5).await, LoadOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_resumed_feed_pages_from_offset() {
        let source = Arc::new(FakeSource::with(vec![Ok(vec![post("a")])]));
        let feed = PostFeed::new(source.clone(), Collection::Posts).resume_at(21);
        assert_eq!(feed.load_more(&PostQuery::new(), 21).await, LoadOutcome::Loaded(1));

        let state = feed.state();
        assert_eq!(state.offset, 22);
        assert!(!state.has_more);
        assert_eq!(state.items[0].id, PostId::from("a"));
        assert_eq!(source.queries.lock().unwrap()[0].offset, Some(21));
    }

    #[tokio::test]
    async fn test_offset_saturates() {
        let source = Arc::new(FakeSource::with(vec![Ok(vec![post("a"), post("b")])]));
        let feed = PostFeed::new(source, Collection::Posts).resume_at(u32::MAX - 1);
        assert_eq!(feed.load_more(&PostQuery::new(), 2).await, LoadOutcome::Loaded(2));
        assert_eq!(feed.state().offset, u32::MAX);
    }

    #[test]
    fn test_feed_kind_filters() {
        let config = PaginationConfig::default();
        let (collection, query) = FeedKind::Curated.source(&config);
        assert_eq!(collection, Collection::Posts);
        assert_eq!(
            query.to_query_string(),
            "post_types=curated&sort_by=published_date"
        );

        let (collection, query) = FeedKind::News.source(&config);
        assert_eq!(collection, Collection::News);
        assert_eq!(query, PostQuery::default());
        assert_eq!(FeedKind::parse("AI101"), Some(FeedKind::Ai101));
        assert_eq!(FeedKind::parse("podcasts"), None);
    }
}
