//! Print a single post

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::api::PostSource;
use crate::helpers::format_display_date;
use crate::Site;

/// Fetch a post by slug and print its rendered body
pub async fn run(site: &Site, slug: &str) -> Result<()> {
    let client = site.client()?;
    let post = client.fetch_post(slug, &CancellationToken::new()).await?;

    println!("{}", post.title);
    println!("{}", format_display_date(post.display_timestamp()));
    if let Some(url) = post.paper_url() {
        println!("Paper: {}", url);
    }
    println!();

    match post.body() {
        Some(body) => println!("{}", site.pipeline().render(body).await?),
        None => println!("(no content)"),
    }
    Ok(())
}
