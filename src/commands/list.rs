//! List posts from a feed

use anyhow::{anyhow, bail, Result};
use std::sync::Arc;

use crate::feed::{FeedKind, LoadOutcome, PostFeed};
use crate::helpers::{format_date, parse_timestamp};
use crate::Site;

/// Page through a feed and print each post
pub async fn run(site: &Site, kind: &str, pages: u32, page_size: Option<u32>) -> Result<()> {
    let kind = FeedKind::parse(kind).ok_or_else(|| {
        anyhow!(
            "Unknown type: {}. Available: home, curated, news, ai101",
            kind
        )
    })?;
    let page_size = page_size.unwrap_or(site.config.pagination.page_size);
    let (collection, filters) = kind.source(&site.config.pagination);

    let feed = PostFeed::new(Arc::new(site.client()?), collection);
    let interrupt = feed.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let mut outcome = feed.load_initial(&filters, page_size).await;
    for _ in 1..pages.max(1) {
        if outcome != LoadOutcome::Loaded(page_size as usize) {
            break;
        }
        outcome = feed.load_more(&filters, page_size).await;
    }

    let state = feed.state();
    if outcome == LoadOutcome::Cancelled {
        bail!("Cancelled");
    }
    if let Some(e) = &state.error {
        if state.items.is_empty() {
            bail!("Failed to load posts: {}", e);
        }
        tracing::warn!("Stopped early: {}", e);
    }

    println!("{:?} posts ({}):", kind, state.items.len());
    for post in &state.items {
        let date = parse_timestamp(post.display_timestamp())
            .map(|d| format_date(&d, &site.config.date_format))
            .unwrap_or_default();
        println!("  {} - {} [{}]", date, post.title, post.slug);
    }
    if state.has_more {
        println!("  ... more available (next offset {})", state.offset);
    }

    Ok(())
}
