//! recursivai: reader-facing side of an AI-written publication
//!
//! Fetches posts from the content API, renders their markdown (diagrams
//! included), pages through collections, and serves the site, the
//! newsletter email and the subscription endpoints.

pub mod api;
pub mod cache;
pub mod commands;
pub mod config;
pub mod content;
pub mod error;
pub mod feed;
pub mod generator;
pub mod helpers;
pub mod newsletter;
pub mod server;
pub mod templates;

pub use error::{Error, Result};

use std::path::{Path, PathBuf};

/// Config file looked up in the base directory
pub const CONFIG_FILE: &str = "_config.yml";

/// The main application handle
#[derive(Clone)]
pub struct Site {
    /// Site configuration, with environment overrides applied
    pub config: config::SiteConfig,
    /// Base directory
    pub base_dir: PathBuf,
}

impl Site {
    /// Load `_config.yml` from a directory, falling back to defaults
    pub fn new<P: AsRef<Path>>(base_dir: P) -> anyhow::Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        let config_path = base_dir.join(CONFIG_FILE);
        let config_path = config_path.exists().then_some(config_path);
        Self::with_config_file(base_dir, config_path.as_deref())
    }

    /// Load an explicit config file; `None` means defaults
    pub fn with_config_file<P: AsRef<Path>>(
        base_dir: P,
        config_path: Option<&Path>,
    ) -> anyhow::Result<Self> {
        let mut config = match config_path {
            Some(path) => {
                tracing::debug!("Loading config from {:?}", path);
                config::SiteConfig::load(path)?
            }
            None => config::SiteConfig::default(),
        };
        config.apply_env();

        Ok(Self {
            config,
            base_dir: base_dir.as_ref().to_path_buf(),
        })
    }

    /// HTTP client for the content API
    pub fn client(&self) -> Result<api::ApiClient> {
        api::ApiClient::new(&self.config.api)
    }

    /// Markdown pipeline using the process-wide diagram engine
    pub fn pipeline(&self) -> content::MarkdownPipeline {
        content::MarkdownPipeline::new(&self.config.markdown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_defaults_without_config() {
        let dir = tempfile::tempdir().unwrap();
        let site = Site::new(dir.path()).unwrap();
        assert_eq!(site.config.pagination.page_size, 21);
        assert_eq!(site.base_dir, dir.path());
    }

    #[test]
    fn test_site_reads_config_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "title: Rex Reads\npagination:\n  page_size: 9\n",
        )
        .unwrap();
        let site = Site::new(dir.path()).unwrap();
        assert_eq!(site.config.title, "Rex Reads");
        assert_eq!(site.config.pagination.page_size, 9);
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.yml");
        assert!(Site::with_config_file(dir.path(), Some(&missing)).is_err());
    }
}
