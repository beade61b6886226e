//! Built-in site templates using the Tera template engine
//!
//! Page and email templates are embedded in the binary, so serving the site
//! needs nothing on disk but the optional config file.

use anyhow::Result;
use chrono::{DateTime, Datelike, Local, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tera::{Context, Tera};

use crate::config::SiteConfig;
use crate::content::Post;
use crate::helpers::{self, long_weekday_date, post_path, url_for};

/// Template renderer with the embedded site theme
pub struct TemplateRenderer {
    tera: Tera,
}

impl TemplateRenderer {
    /// Create a new renderer with all templates loaded
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();

        // Autoescaping would also encode the `/` in every link. Templates
        // escape API-provided fields explicitly with `esc` instead.
        tera.autoescape_on(vec![]);

        tera.add_raw_templates(vec![
            ("layout.html", include_str!("site/layout.html")),
            ("macros.html", include_str!("site/macros.html")),
            ("listing.html", include_str!("site/listing.html")),
            ("post.html", include_str!("site/post.html")),
            ("error.html", include_str!("site/error.html")),
            ("newsletter.html", include_str!("site/newsletter.html")),
            // Partials
            (
                "partials/header.html",
                include_str!("site/partials/header.html"),
            ),
            (
                "partials/footer.html",
                include_str!("site/partials/footer.html"),
            ),
        ])?;

        tera.register_filter("esc", esc_filter);
        tera.register_filter("strip_html", strip_html_filter);
        tera.register_filter("truncate_chars", truncate_chars_filter);
        tera.register_filter("display_date", display_date_filter);
        tera.register_filter("time_tag", time_tag_filter);
        tera.register_filter("relative_date", relative_date_filter);

        Ok(Self { tera })
    }

    /// Render a template with given context
    pub fn render(&self, template_name: &str, context: &Context) -> Result<String> {
        Ok(self.tera.render(template_name, context)?)
    }
}

/// Tera filter: escape text for HTML content and quoted attributes
fn esc_filter(
    value: &tera::Value,
    _args: &HashMap<String, tera::Value>,
) -> tera::Result<tera::Value> {
    let s = tera::try_get_value!("esc", "value", String, value);
    Ok(tera::Value::String(helpers::html_escape(&s)))
}

/// Tera filter: strip HTML tags
fn strip_html_filter(
    value: &tera::Value,
    _args: &HashMap<String, tera::Value>,
) -> tera::Result<tera::Value> {
    let s = tera::try_get_value!("strip_html", "value", String, value);
    Ok(tera::Value::String(helpers::strip_html(&s)))
}

/// Tera filter: truncate by character count
fn truncate_chars_filter(
    value: &tera::Value,
    args: &HashMap<String, tera::Value>,
) -> tera::Result<tera::Value> {
    let s = tera::try_get_value!("truncate_chars", "value", String, value);
    let length = match args.get("length") {
        Some(val) => tera::try_get_value!("truncate_chars", "length", usize, val),
        None => 150,
    };
    let omission = match args.get("omission") {
        Some(val) => Some(tera::try_get_value!(
            "truncate_chars",
            "omission",
            String,
            val
        )),
        None => None,
    };
    Ok(tera::Value::String(helpers::truncate(
        &s,
        length,
        omission.as_deref(),
    )))
}

/// Tera filter: backend timestamp to "January 15, 2024"
fn display_date_filter(
    value: &tera::Value,
    _args: &HashMap<String, tera::Value>,
) -> tera::Result<tera::Value> {
    let s = tera::try_get_value!("display_date", "value", String, value);
    Ok(tera::Value::String(helpers::format_display_date(&s)))
}

/// Tera filter: backend timestamp to a `<time>` element
fn time_tag_filter(
    value: &tera::Value,
    _args: &HashMap<String, tera::Value>,
) -> tera::Result<tera::Value> {
    let s = tera::try_get_value!("time_tag", "value", String, value);
    Ok(tera::Value::String(helpers::time_tag(&s)))
}

/// Tera filter: backend timestamp to "2 hours ago"; empty when unparsable
fn relative_date_filter(
    value: &tera::Value,
    _args: &HashMap<String, tera::Value>,
) -> tera::Result<tera::Value> {
    let s = tera::try_get_value!("relative_date", "value", String, value);
    let relative = helpers::parse_timestamp(&s)
        .map(|date| helpers::relative_date(&date.with_timezone(&Local)))
        .unwrap_or_default();
    Ok(tera::Value::String(relative))
}

/// Data structures for template context

#[derive(Debug, Clone, Serialize)]
pub struct SiteData {
    pub title: String,
    pub tagline: String,
    pub url: String,
    pub root: String,
    pub nav: Vec<NavItem>,
}

impl SiteData {
    pub fn from_config(config: &SiteConfig) -> Self {
        let nav = [("Research", "/"), ("Curated", "/curated"), ("News", "/news")]
            .iter()
            .map(|(name, path)| NavItem {
                name: name.to_string(),
                path: url_for(config, path),
            })
            .collect();
        Self {
            title: config.title.clone(),
            tagline: config.tagline.clone(),
            url: config.url.clone(),
            root: url_for(config, "/"),
            nav,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NavItem {
    pub name: String,
    pub path: String,
}

/// Per-request page data shared by every site template
#[derive(Debug, Clone, Serialize)]
pub struct PageData {
    pub path: String,
    pub url: String,
    pub masthead_date: String,
    pub year: i32,
}

impl PageData {
    pub fn new(config: &SiteConfig, path: &str, now: DateTime<Utc>) -> Self {
        Self {
            path: url_for(config, path),
            url: helpers::full_url_for(config, path),
            masthead_date: long_weekday_date(&now),
            year: now.year(),
        }
    }
}

/// A post as shown in listings
#[derive(Debug, Clone, Serialize)]
pub struct PostCard {
    pub title: String,
    pub path: String,
    pub summary: Option<String>,
    pub date: String,
    pub image: Option<String>,
    pub post_type: &'static str,
    /// Original publisher, for news posts
    pub source: Option<String>,
}

impl PostCard {
    pub fn from_post(config: &SiteConfig, post: &Post) -> Self {
        let source = match post.kind() {
            crate::content::PostKind::News {
                original_article_source,
                ..
            } => original_article_source.clone(),
            _ => None,
        };
        Self {
            title: post.title.clone(),
            path: post_path(config, &post.slug),
            summary: post.summary.clone(),
            date: post.display_timestamp().to_string(),
            image: post.featured_image_url.clone(),
            post_type: post.post_type().as_str(),
            source,
        }
    }
}

/// A post as shown on its own page
#[derive(Debug, Clone, Serialize)]
pub struct PostDetail {
    pub title: String,
    pub summary: Option<String>,
    pub date: String,
    pub image: Option<String>,
    pub is_news: bool,
    pub source: Option<String>,
    pub source_url: Option<String>,
    pub rex_take: Option<String>,
    pub paper_url: Option<String>,
}

impl PostDetail {
    pub fn from_post(post: &Post) -> Self {
        let (source, source_url) = match post.kind() {
            crate::content::PostKind::News {
                original_article_source,
                original_article_url,
                ..
            } => (original_article_source.clone(), original_article_url.clone()),
            _ => (None, None),
        };
        Self {
            title: post.title.clone(),
            summary: post.summary.clone(),
            date: post.display_timestamp().to_string(),
            image: post.featured_image_url.clone(),
            is_news: post.is_news(),
            source,
            source_url,
            rex_take: post.rex_take().map(str::to_string),
            paper_url: post.paper_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ListingData {
    pub heading: String,
    pub description: String,
    pub posts: Vec<PostCard>,
    pub error: Option<String>,
    pub next_page: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorData {
    pub heading: String,
    pub message: String,
    pub retry: bool,
}

/// Context with the site and page data every site template expects
pub fn base_context(config: &SiteConfig, path: &str) -> Context {
    let mut context = Context::new();
    context.insert("site", &SiteData::from_config(config));
    context.insert("page", &PageData::new(config, path, Utc::now()));
    context
}
