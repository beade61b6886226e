//! Site configuration (_config.yml)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Main site configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    // Site
    pub title: String,
    pub tagline: String,
    /// Public URL of the site, used for links in emails
    pub url: String,
    pub root: String,
    pub date_format: String,

    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub markdown: MarkdownConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
    #[serde(default)]
    pub newsletter: NewsletterConfig,
    #[serde(default)]
    pub subscription: SubscriptionConfig,
    #[serde(default)]
    pub revalidation: RevalidationConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            title: "RecursivAI".to_string(),
            tagline: "Who better to keep up with AI than AI itself?".to_string(),
            url: "https://recursivai.vercel.app".to_string(),
            root: "/".to_string(),
            date_format: "MMMM DD, YYYY".to_string(),
            api: ApiConfig::default(),
            server: ServerConfig::default(),
            markdown: MarkdownConfig::default(),
            pagination: PaginationConfig::default(),
            newsletter: NewsletterConfig::default(),
            subscription: SubscriptionConfig::default(),
            revalidation: RevalidationConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl SiteConfig {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: SiteConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Apply environment overrides for the API location and secrets.
    ///
    /// Called once at startup; the resulting config is passed around
    /// explicitly afterwards.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = lookup("API_BASE_URL") {
            self.api.base_url = url;
        }
        if let Some(key) = lookup("BEEHIIV_API_KEY") {
            self.subscription.api_key = Some(key);
        }
        if let Some(id) = lookup("BEEHIIV_PUBLICATION_ID") {
            self.subscription.publication_id = Some(id);
        }
        if let Some(secret) = lookup("REVALIDATION_SECRET") {
            self.revalidation.secret = Some(secret);
        }
    }
}

/// Backend content API location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// Per-request timeout; a timeout surfaces as a network error
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 15,
        }
    }
}

/// Listen address for the HTTP surface
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub ip: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ip: "localhost".to_string(),
            port: 3000,
        }
    }
}

/// Markdown rendering options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkdownConfig {
    /// Let raw HTML in post bodies through untouched
    pub allow_raw_html: bool,
    /// Fenced code block languages rendered as diagrams
    pub diagram_languages: Vec<String>,
    #[serde(default)]
    pub highlight: HighlightConfig,
    /// Mermaid CLI executable used by the diagram pass
    pub mermaid_cli: String,
    /// Documents larger than this fail to render
    pub max_input_bytes: usize,
}

impl Default for MarkdownConfig {
    fn default() -> Self {
        Self {
            allow_raw_html: false,
            diagram_languages: vec!["mermaid".to_string()],
            highlight: HighlightConfig::default(),
            mermaid_cli: "mmdc".to_string(),
            max_input_bytes: 1024 * 1024,
        }
    }
}

/// Syntax highlighting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HighlightConfig {
    pub enable: bool,
    pub theme: String,
    pub line_numbers: bool,
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self {
            enable: true,
            theme: "base16-ocean.dark".to_string(),
            line_numbers: false,
        }
    }
}

/// Feed pagination configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    pub page_size: u32,
    /// `sort_by` sent with curated listings; `None` leaves ordering to the backend
    pub curated_sort_by: Option<String>,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_size: 21,
            curated_sort_by: Some("published_date".to_string()),
        }
    }
}

/// Newsletter email configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsletterConfig {
    pub news_limit: u32,
    pub ai101_limit: u32,
    pub placeholder_images: Vec<String>,
}

impl Default for NewsletterConfig {
    fn default() -> Self {
        Self {
            news_limit: 12,
            ai101_limit: 1,
            placeholder_images: vec![
                "https://recursivai-assets.s3.amazonaws.com/images/placeholder-1.jpeg".to_string(),
                "https://recursivai-assets.s3.amazonaws.com/images/placeholder-2.jpg".to_string(),
                "https://recursivai-assets.s3.amazonaws.com/images/placeholder-3.png".to_string(),
                "https://recursivai-assets.s3.amazonaws.com/images/placeholder-4.jpg".to_string(),
            ],
        }
    }
}

/// Newsletter subscription provider (Beehiiv)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub publication_id: Option<String>,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.beehiiv.com/v2".to_string(),
            api_key: None,
            publication_id: None,
        }
    }
}

/// On-demand regeneration of cached pages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RevalidationConfig {
    pub secret: Option<String>,
    pub paths: Vec<String>,
}

impl Default for RevalidationConfig {
    fn default() -> Self {
        Self {
            secret: None,
            paths: vec!["/news".to_string(), "/".to_string()],
        }
    }
}

/// Rendered listing page cache
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Seconds a cached page is served before it is regenerated
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 300 }
    }
}
