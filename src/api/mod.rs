//! Content API access
//!
//! `PostSource` is the seam between the backend and everything that
//! displays posts; `ApiClient` is the HTTP implementation.

mod client;
mod query;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub use client::ApiClient;
pub use query::PostQuery;

use crate::content::Post;
use crate::error::Result;

/// Backend post collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// `/posts`
    Posts,
    /// `/posts/news`
    News,
    /// `/posts/ai101`
    Ai101,
}

impl Collection {
    pub fn path(&self) -> &'static str {
        match self {
            Collection::Posts => "/posts",
            Collection::News => "/posts/news",
            Collection::Ai101 => "/posts/ai101",
        }
    }
}

/// Anything that can serve posts: the HTTP client, or a fake in tests.
///
/// Implementations must give up with `Error::Cancelled` once `cancel`
/// fires, and must not retry on their own.
#[async_trait]
pub trait PostSource: Send + Sync {
    /// One page of a collection, in backend order
    async fn fetch_page(
        &self,
        collection: Collection,
        query: &PostQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<Post>>;

    /// A single post by slug
    async fn fetch_post(&self, slug: &str, cancel: &CancellationToken) -> Result<Post>;
}
