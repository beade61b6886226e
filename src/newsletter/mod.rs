//! Daily newsletter email
//!
//! The issue is laid out from the latest news posts:
//! - the first two posts are the main stories
//! - the fifth post, when there is one, is the spotlight
//! - everything else (up to ten) goes in the "Latest News" column, the first
//!   two of those with an image

use chrono::{DateTime, Utc};
use serde::Serialize;
use tera::Context;
use tokio_util::sync::CancellationToken;

use crate::api::{Collection, PostQuery, PostSource};
use crate::config::SiteConfig;
use crate::content::Post;
use crate::error::Result;
use crate::helpers::{email_date, full_url_for, post_url};
use crate::templates::TemplateRenderer;

const MAIN_STORIES: usize = 2;
const SPOTLIGHT_INDEX: usize = 4;
const SIDEBAR_LIMIT: usize = 10;
const FEATURED_LATEST: usize = 2;

const DEFAULT_REX_TAKE: &str = "Staying sharp on the latest AI move.";
const DEFAULT_AI101_TITLE: &str = "AI 101";
const DEFAULT_AI101_SUMMARY: &str = "Catch the latest AI 101 explainer.";

#[derive(Debug, Clone, Serialize)]
pub struct MainStory {
    pub title: String,
    pub summary: Option<String>,
    pub image: String,
    pub url: String,
    pub rex_take: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Spotlight {
    pub title: String,
    pub summary: Option<String>,
    pub image: String,
    pub url: String,
    pub rex_take: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LatestItem {
    pub title: String,
    pub url: String,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Ai101Card {
    pub title: String,
    pub summary: String,
    pub image: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct Links {
    home: String,
    news: String,
    subscribe: String,
    unsubscribe: String,
}

/// One newsletter issue, ready to render
#[derive(Debug, Clone, Serialize)]
pub struct NewsletterIssue {
    /// Header date, e.g. "Mon Jan 15 2024"
    pub date: String,
    pub main_stories: Vec<MainStory>,
    pub spotlight: Option<Spotlight>,
    /// Latest news shown with an image
    pub featured: Vec<LatestItem>,
    /// Latest news shown as a plain list
    pub latest: Vec<LatestItem>,
    pub ai101: Ai101Card,
}

impl NewsletterIssue {
    pub fn compose(
        posts: &[Post],
        ai101: Option<&Post>,
        generated_at: DateTime<Utc>,
        config: &SiteConfig,
    ) -> Self {
        let placeholder = |index: usize| placeholder_image(config, index);
        let image_or_placeholder = |post: &Post, index: usize| {
            post.featured_image_url
                .clone()
                .unwrap_or_else(|| placeholder(index))
        };

        let main: Vec<&Post> = posts.iter().take(MAIN_STORIES).collect();
        let spotlight = posts.get(SPOTLIGHT_INDEX);

        let main_stories = main
            .iter()
            .enumerate()
            .map(|(index, post)| MainStory {
                title: post.title.clone(),
                summary: post.summary.clone(),
                image: image_or_placeholder(post, index),
                url: post_url(config, &post.slug),
                rex_take: post.rex_take().unwrap_or(DEFAULT_REX_TAKE).to_string(),
            })
            .collect();

        let sidebar: Vec<&Post> = posts
            .iter()
            .filter(|post| spotlight.map_or(true, |s| s.slug != post.slug))
            .filter(|post| !main.iter().any(|m| m.slug == post.slug))
            .take(SIDEBAR_LIMIT)
            .collect();

        let featured = sidebar
            .iter()
            .take(FEATURED_LATEST)
            .enumerate()
            .map(|(index, post)| LatestItem {
                title: post.title.clone(),
                url: post_url(config, &post.slug),
                image: Some(image_or_placeholder(post, index)),
            })
            .collect();
        let latest = sidebar
            .iter()
            .skip(FEATURED_LATEST)
            .map(|post| LatestItem {
                title: post.title.clone(),
                url: post_url(config, &post.slug),
                image: None,
            })
            .collect();

        let spotlight = spotlight.map(|post| Spotlight {
            title: post.title.clone(),
            summary: post.summary.clone(),
            image: image_or_placeholder(post, SPOTLIGHT_INDEX),
            url: post_url(config, &post.slug),
            rex_take: post.rex_take().map(str::to_string),
        });

        let ai101 = match ai101 {
            Some(post) => Ai101Card {
                title: non_blank(&post.title).unwrap_or(DEFAULT_AI101_TITLE).to_string(),
                summary: post
                    .summary
                    .as_deref()
                    .and_then(non_blank)
                    .unwrap_or(DEFAULT_AI101_SUMMARY)
                    .to_string(),
                image: post.featured_image_url.clone(),
                url: Some(post_url(config, &post.slug)),
            },
            None => Ai101Card {
                title: DEFAULT_AI101_TITLE.to_string(),
                summary: DEFAULT_AI101_SUMMARY.to_string(),
                image: None,
                url: None,
            },
        };

        Self {
            date: email_date(&generated_at),
            main_stories,
            spotlight,
            featured,
            latest,
            ai101,
        }
    }

    /// Render the issue as a standalone HTML document
    pub fn render(&self, templates: &TemplateRenderer, config: &SiteConfig) -> anyhow::Result<String> {
        let links = Links {
            home: full_url_for(config, "/"),
            news: full_url_for(config, "/news"),
            subscribe: format!("{}#subscribe", full_url_for(config, "/")),
            unsubscribe: full_url_for(config, "/unsubscribe"),
        };
        let mut context = Context::new();
        context.insert("issue", self);
        context.insert("links", &links);
        templates.render("newsletter.html", &context)
    }
}

fn non_blank(s: &str) -> Option<&str> {
    Some(s).filter(|s| !s.trim().is_empty())
}

fn placeholder_image(config: &SiteConfig, index: usize) -> String {
    let images = &config.newsletter.placeholder_images;
    if images.is_empty() {
        return String::new();
    }
    images[index % images.len()].clone()
}

/// Fetch today's news and AI 101 explainer concurrently and lay out an issue.
///
/// A failed news fetch fails the issue; a failed AI 101 fetch only drops the
/// explainer card back to its default text.
pub async fn build_issue(
    source: &dyn PostSource,
    config: &SiteConfig,
    cancel: &CancellationToken,
) -> Result<NewsletterIssue> {
    let news_query = PostQuery::new().with_limit(config.newsletter.news_limit);
    let ai101_query = PostQuery::new().with_limit(config.newsletter.ai101_limit);

    let (news, ai101) = tokio::join!(
        source.fetch_page(Collection::News, &news_query, cancel),
        source.fetch_page(Collection::Ai101, &ai101_query, cancel),
    );

    let news = news?;
    let ai101 = match ai101 {
        Ok(posts) => posts.into_iter().next(),
        Err(e) => {
            tracing::warn!("AI 101 fetch failed, using default card: {}", e);
            None
        }
    };

    Ok(NewsletterIssue::compose(
        &news,
        ai101.as_ref(),
        Utc::now(),
        config,
    ))
}
