//! Generator module - renders site pages from the content API with Tera

use anyhow::{bail, Result};
use std::sync::Arc;
use tera::Context;
use tokio_util::sync::CancellationToken;

use crate::api::PostSource;
use crate::cache::{normalize_path, PageCache};
use crate::config::SiteConfig;
use crate::content::{MarkdownPipeline, MarkdownView, Post};
use crate::error::Error;
use crate::feed::{FeedKind, LoadOutcome, PostFeed};
use crate::templates::{
    base_context, ErrorData, ListingData, NavItem, PostCard, PostDetail, TemplateRenderer,
};

/// Listing pages served by the site
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaticPage {
    Home,
    Curated,
    News,
}

impl StaticPage {
    pub const ALL: [StaticPage; 3] = [StaticPage::Home, StaticPage::Curated, StaticPage::News];

    pub fn from_path(path: &str) -> Option<Self> {
        match normalize_path(path).as_str() {
            "/" => Some(StaticPage::Home),
            "/curated" => Some(StaticPage::Curated),
            "/news" => Some(StaticPage::News),
            _ => None,
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            StaticPage::Home => "/",
            StaticPage::Curated => "/curated",
            StaticPage::News => "/news",
        }
    }

    /// Curated listings are rendered on every request
    pub fn is_cached(&self) -> bool {
        !matches!(self, StaticPage::Curated)
    }

    pub fn feed(&self) -> FeedKind {
        match self {
            StaticPage::Home => FeedKind::Home,
            StaticPage::Curated => FeedKind::Curated,
            StaticPage::News => FeedKind::News,
        }
    }

    fn heading(&self) -> &'static str {
        match self {
            StaticPage::Home => "Research",
            StaticPage::Curated => "Curated",
            StaticPage::News => "AI News",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            StaticPage::Home => "In-depth analyses of the latest AI research papers.",
            StaticPage::Curated => "Hand-picked papers worth your time.",
            StaticPage::News => {
                "Latest artificial intelligence and technology news, analyzed by AI."
            }
        }
    }
}

/// A rendered page with the HTTP status it should be served with
#[derive(Debug, Clone)]
pub struct PageOutput {
    pub status: u16,
    pub html: String,
}

impl PageOutput {
    fn ok(html: String) -> Self {
        Self { status: 200, html }
    }
}

struct Listing {
    posts: Vec<Post>,
    has_more: bool,
    next_offset: u32,
}

/// Renders site pages from a post source
pub struct PageGenerator {
    config: Arc<SiteConfig>,
    source: Arc<dyn PostSource>,
    templates: TemplateRenderer,
    pipeline: MarkdownPipeline,
}

impl PageGenerator {
    pub fn new(
        config: Arc<SiteConfig>,
        source: Arc<dyn PostSource>,
        pipeline: MarkdownPipeline,
    ) -> Result<Self> {
        Ok(Self {
            config,
            source,
            templates: TemplateRenderer::new()?,
            pipeline,
        })
    }

    pub fn templates(&self) -> &TemplateRenderer {
        &self.templates
    }

    pub fn pipeline(&self) -> &MarkdownPipeline {
        &self.pipeline
    }

    /// Generate the first page of a listing. Fails if the posts can't be
    /// fetched, so an error page never ends up in the cache.
    pub async fn generate(&self, page: StaticPage, cancel: &CancellationToken) -> Result<String> {
        let listing = self.fetch_listing(page, 0, cancel).await?;
        self.render_listing(page, Ok(listing))
    }

    /// Render any page of a listing; fetch failures become an inline error
    pub async fn listing(
        &self,
        page: StaticPage,
        offset: u32,
        cancel: &CancellationToken,
    ) -> Result<PageOutput> {
        let result = self.fetch_listing(page, offset, cancel).await;
        let status = match &result {
            Ok(_) => 200,
            Err(e) => upstream_status(e),
        };
        Ok(PageOutput {
            status,
            html: self.render_listing(page, result)?,
        })
    }

    async fn fetch_listing(
        &self,
        page: StaticPage,
        offset: u32,
        cancel: &CancellationToken,
    ) -> std::result::Result<Listing, Arc<Error>> {
        let page_size = self.config.pagination.page_size;
        let (collection, filters) = page.feed().source(&self.config.pagination);

        let feed = PostFeed::new(self.source.clone(), collection)
            .with_cancel(cancel.child_token())
            .resume_at(offset);
        let outcome = if offset == 0 {
            feed.load_initial(&filters, page_size).await
        } else {
            feed.load_more(&filters, page_size).await
        };
        let state = feed.state();
        match outcome {
            LoadOutcome::Loaded(_) => Ok(Listing {
                posts: state.items,
                has_more: state.has_more,
                next_offset: state.offset,
            }),
            LoadOutcome::Failed => Err(state
                .error
                .unwrap_or_else(|| Arc::new(Error::Cancelled))),
            LoadOutcome::Cancelled | LoadOutcome::Skipped => Err(Arc::new(Error::Cancelled)),
        }
    }

    fn render_listing(
        &self,
        page: StaticPage,
        result: std::result::Result<Listing, Arc<Error>>,
    ) -> Result<String> {
        let (posts, error, next_page) = match result {
            Ok(listing) => {
                let next = listing
                    .has_more
                    .then(|| format!("{}?offset={}", page.path(), listing.next_offset));
                let cards = listing
                    .posts
                    .iter()
                    .map(|post| PostCard::from_post(&self.config, post))
                    .collect();
                (cards, None, next)
            }
            Err(e) => (Vec::new(), Some(e.user_message()), None),
        };

        let mut context = base_context(&self.config, page.path());
        context.insert(
            "listing",
            &ListingData {
                heading: page.heading().to_string(),
                description: page.description().to_string(),
                posts,
                error,
                next_page,
            },
        );
        self.templates.render("listing.html", &context)
    }

    /// Render a single post page
    pub async fn post(&self, slug: &str, cancel: &CancellationToken) -> Result<PageOutput> {
        let path = format!("/post/{}", crate::helpers::encode_segment(slug));
        let post = match self.source.fetch_post(slug, cancel).await {
            Ok(post) => post,
            Err(e) if e.is_not_found() => {
                return Ok(PageOutput {
                    status: 404,
                    html: self.error_page(&path, "Post not found", &e.user_message(), false)?,
                });
            }
            Err(e) => {
                return Ok(PageOutput {
                    status: upstream_status(&e),
                    html: self.error_page(
                        &path,
                        "Something went wrong",
                        &e.user_message(),
                        e.is_retryable(),
                    )?,
                });
            }
        };

        let view = MarkdownView::new(self.pipeline.clone());
        view.set_input(post.body().unwrap_or_default()).await;

        let back = if post.is_news() {
            NavItem {
                name: "Back to news".to_string(),
                path: crate::helpers::url_for(&self.config, "/news"),
            }
        } else {
            NavItem {
                name: "Back to home".to_string(),
                path: crate::helpers::url_for(&self.config, "/"),
            }
        };

        let mut context = base_context(&self.config, &path);
        context.insert("post", &PostDetail::from_post(&post));
        context.insert("body", &view.display_html());
        context.insert("back", &back);
        Ok(PageOutput::ok(self.templates.render("post.html", &context)?))
    }

    pub fn error_page(&self, path: &str, heading: &str, message: &str, retry: bool) -> Result<String> {
        let mut context: Context = base_context(&self.config, path);
        context.insert(
            "error",
            &ErrorData {
                heading: heading.to_string(),
                message: message.to_string(),
                retry,
            },
        );
        self.templates.render("error.html", &context)
    }

    /// Regenerate each cached path and swap it into the cache. Pages that are
    /// rendered per request are only dropped.
    pub async fn revalidate(&self, cache: &PageCache, paths: &[String]) -> Result<Vec<String>> {
        let cancel = CancellationToken::new();
        let mut done = Vec::with_capacity(paths.len());
        for path in paths {
            let Some(page) = StaticPage::from_path(path) else {
                bail!("Unknown page: {}", path);
            };
            if !page.is_cached() {
                cache.invalidate(page.path()).await;
                done.push(page.path().to_string());
                continue;
            }
            let html = self.generate(page, &cancel).await?;
            cache.insert(page.path(), html).await;
            tracing::info!("Revalidated {}", page.path());
            done.push(page.path().to_string());
        }
        Ok(done)
    }
}

/// Status for a page whose content could not be fetched
fn upstream_status(e: &Error) -> u16 {
    match e {
        Error::Request { status: 404 } => 404,
        _ => 502,
    }
}
