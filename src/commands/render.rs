//! Render a local markdown file

use anyhow::{Context, Result};
use std::path::Path;

use crate::Site;

/// Render `path` to HTML on stdout, diagrams included
pub async fn run(site: &Site, path: &Path) -> Result<()> {
    let markdown = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {:?}", path))?;

    let html = site.pipeline().render_isolated(markdown).await?;
    println!("{}", html);
    Ok(())
}
