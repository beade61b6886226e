//! Build the newsletter email

use anyhow::Result;
use std::path::Path;
use tokio_util::sync::CancellationToken;

use crate::newsletter::build_issue;
use crate::templates::TemplateRenderer;
use crate::Site;

/// Render today's issue to stdout or a file
pub async fn run(site: &Site, output: Option<&Path>) -> Result<()> {
    let client = site.client()?;
    let issue = build_issue(&client, &site.config, &CancellationToken::new()).await?;
    let html = issue.render(&TemplateRenderer::new()?, &site.config)?;

    match output {
        Some(path) => {
            tokio::fs::write(path, html).await?;
            println!("Newsletter written to {:?}", path);
        }
        None => println!("{}", html),
    }
    Ok(())
}
